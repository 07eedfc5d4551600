//! Wire-level integration tests: bind a real server on an ephemeral port
//! and drive it with a minimal RESP client, the way the ecosystem's network
//! services test themselves end to end rather than through an in-process
//! API.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use emberkv::config::Config;
use emberkv::persistence::NullPersistence;
use emberkv::server::{self, ServerContext};

async fn spawn_server() -> TcpStream {
    let mut config = Config::default();
    config.port = 0;
    let ctx = ServerContext::new(config, Arc::new(NullPersistence));
    let listener = TcpListener::bind((ctx.config.bind_addr.clone(), 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(ctx, listener));
    TcpStream::connect(addr).await.unwrap()
}

fn encode_command(parts: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn roundtrip(stream: &mut TcpStream, parts: &[&str]) -> String {
    stream.write_all(&encode_command(parts)).await.unwrap();
    read_reply(stream).await
}

/// Reads exactly one RESP reply off the stream. Not a general-purpose
/// parser: good enough for the fixed-shape replies these tests expect.
async fn read_reply(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server did not reply in time")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).to_string()
}

#[tokio::test]
async fn ping_and_echo() {
    let mut stream = spawn_server().await;
    assert_eq!(roundtrip(&mut stream, &["PING"]).await, "+PONG\r\n");
    assert_eq!(
        roundtrip(&mut stream, &["ECHO", "hello"]).await,
        "$5\r\nhello\r\n"
    );
}

#[tokio::test]
async fn set_get_incr_roundtrip() {
    let mut stream = spawn_server().await;
    assert_eq!(roundtrip(&mut stream, &["SET", "k", "1"]).await, "+OK\r\n");
    assert_eq!(roundtrip(&mut stream, &["GET", "k"]).await, "$1\r\n1\r\n");
    assert_eq!(roundtrip(&mut stream, &["INCR", "k"]).await, ":2\r\n");
    assert_eq!(roundtrip(&mut stream, &["EXISTS", "k"]).await, ":1\r\n");
    assert_eq!(roundtrip(&mut stream, &["DEL", "k"]).await, ":1\r\n");
    assert_eq!(roundtrip(&mut stream, &["GET", "k"]).await, "$-1\r\n");
}

#[tokio::test]
async fn incr_on_non_integer_is_an_error() {
    let mut stream = spawn_server().await;
    roundtrip(&mut stream, &["SET", "k", "notanumber"]).await;
    let reply = roundtrip(&mut stream, &["INCR", "k"]).await;
    assert!(reply.starts_with('-'), "expected an error reply, got {reply:?}");
}

#[tokio::test]
async fn list_push_pop_and_range() {
    let mut stream = spawn_server().await;
    assert_eq!(
        roundtrip(&mut stream, &["RPUSH", "mylist", "a", "b", "c"]).await,
        ":3\r\n"
    );
    assert_eq!(roundtrip(&mut stream, &["LLEN", "mylist"]).await, ":3\r\n");
    assert_eq!(
        roundtrip(&mut stream, &["LRANGE", "mylist", "0", "-1"]).await,
        "*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
    );
    assert_eq!(roundtrip(&mut stream, &["LPOP", "mylist"]).await, "$1\r\na\r\n");
    // popping the list empty removes the key entirely
    roundtrip(&mut stream, &["LPOP", "mylist"]).await;
    roundtrip(&mut stream, &["LPOP", "mylist"]).await;
    assert_eq!(roundtrip(&mut stream, &["EXISTS", "mylist"]).await, ":0\r\n");
}

#[tokio::test]
async fn blpop_wakes_on_push_from_another_connection() {
    let mut a = spawn_server().await;
    let addr = a.peer_addr().unwrap();

    let blocker = tokio::spawn(async move {
        let mut c = TcpStream::connect(addr).await.unwrap();
        roundtrip(&mut c, &["BLPOP", "waitkey", "1"]).await
    });

    // give BLPOP time to register its wait before we push
    tokio::time::sleep(Duration::from_millis(50)).await;
    roundtrip(&mut a, &["RPUSH", "waitkey", "v"]).await;

    let reply = tokio::time::timeout(Duration::from_secs(2), blocker)
        .await
        .expect("blpop task timed out")
        .unwrap();
    assert_eq!(reply, "*2\r\n$7\r\nwaitkey\r\n$1\r\nv\r\n");
}

#[tokio::test]
async fn zset_add_range_and_score() {
    let mut stream = spawn_server().await;
    assert_eq!(
        roundtrip(&mut stream, &["ZADD", "z", "1", "one", "2", "two"]).await,
        ":2\r\n"
    );
    assert_eq!(
        roundtrip(&mut stream, &["ZSCORE", "z", "one"]).await,
        "$1\r\n1\r\n"
    );
    assert_eq!(
        roundtrip(&mut stream, &["ZRANGE", "z", "0", "-1"]).await,
        "*2\r\n$3\r\none\r\n$3\r\ntwo\r\n"
    );
    assert_eq!(roundtrip(&mut stream, &["ZRANK", "z", "two"]).await, ":1\r\n");
}

#[tokio::test]
async fn stream_add_and_range() {
    let mut stream = spawn_server().await;
    let reply = roundtrip(&mut stream, &["XADD", "s", "*", "field", "value"]).await;
    assert!(reply.starts_with('$'), "expected a bulk id reply, got {reply:?}");

    let reply = roundtrip(&mut stream, &["XADD", "s", "0-0", "field", "value"]).await;
    assert!(reply.starts_with('-'), "0-0 must be rejected, got {reply:?}");

    let reply = roundtrip(&mut stream, &["XRANGE", "s", "-", "+"]).await;
    assert!(reply.starts_with("*1"), "expected exactly one entry, got {reply:?}");
}

#[tokio::test]
async fn multi_exec_commits_queued_writes() {
    let mut stream = spawn_server().await;
    assert_eq!(roundtrip(&mut stream, &["MULTI"]).await, "+OK\r\n");
    assert_eq!(roundtrip(&mut stream, &["SET", "tk", "1"]).await, "+QUEUED\r\n");
    assert_eq!(roundtrip(&mut stream, &["INCR", "tk"]).await, "+QUEUED\r\n");
    let reply = roundtrip(&mut stream, &["EXEC"]).await;
    assert_eq!(reply, "*2\r\n+OK\r\n:2\r\n");
    assert_eq!(roundtrip(&mut stream, &["GET", "tk"]).await, "$1\r\n2\r\n");
}

#[tokio::test]
async fn watch_aborts_exec_when_key_changes_from_another_connection() {
    let mut a = spawn_server().await;
    let addr = a.peer_addr().unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();

    roundtrip(&mut a, &["SET", "wk", "1"]).await;
    roundtrip(&mut a, &["WATCH", "wk"]).await;
    roundtrip(&mut a, &["MULTI"]).await;
    roundtrip(&mut a, &["SET", "wk", "2"]).await; // queued on connection a

    // a concurrent write from another connection invalidates the watch
    roundtrip(&mut b, &["SET", "wk", "modified-elsewhere"]).await;

    let reply = roundtrip(&mut a, &["EXEC"]).await;
    assert_eq!(reply, "*-1\r\n");
    assert_eq!(
        roundtrip(&mut a, &["GET", "wk"]).await,
        "$18\r\nmodified-elsewhere\r\n"
    );
}

#[tokio::test]
async fn publish_with_no_subscribers_reports_zero() {
    let mut stream = spawn_server().await;
    assert_eq!(
        roundtrip(&mut stream, &["PUBLISH", "chan", "hi"]).await,
        ":0\r\n"
    );
}

#[tokio::test]
async fn unknown_command_is_an_error() {
    let mut stream = spawn_server().await;
    let reply = roundtrip(&mut stream, &["NOTACOMMAND"]).await;
    assert!(reply.starts_with('-'), "expected an error, got {reply:?}");
}
