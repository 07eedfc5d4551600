//! Replica-side handshake and streaming (spec.md §4.I).
//!
//! Grounded on `redis/client.rs::ReplState`, which declares the same state
//! names but never drives them; the state machine and handshake bytes here
//! are spec.md's own.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::ReplicationError;
use crate::protocol::{parse_request, Frame, ParseOutcome};
use crate::server::ServerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    Initial,
    Connecting,
    PingSent,
    ReplConfPortSent,
    ReplConfCapaSent,
    PsyncSent,
    RdbReceiving,
    Active,
}

async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Result<String, ReplicationError> {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        return Err(ReplicationError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "master closed connection",
        )));
    }
    Ok(line.trim_end().to_string())
}

async fn send(writer: &mut tokio::net::tcp::OwnedWriteHalf, argv: &[&[u8]]) -> Result<(), ReplicationError> {
    let mut buf = Vec::new();
    Frame::from_bulk_strs(argv.iter().map(|s| s.to_vec())).encode(&mut buf);
    writer.write_all(&buf).await?;
    Ok(())
}

fn expect_prefix(line: &str, prefix: char, state: &'static str) -> Result<(), ReplicationError> {
    if line.starts_with(prefix) {
        Ok(())
    } else {
        Err(ReplicationError::UnexpectedReply {
            state,
            reply: line.to_string(),
        })
    }
}

/// Drives the replica side of the handshake against `master_addr`, then
/// streams commands forever, applying each to `server`'s store. Returns on
/// any protocol deviation or I/O error; the caller decides whether/when to
/// retry (spec.md §4.I: "the engine re-enters Initial").
pub async fn run_replica(
    master_addr: &str,
    my_port: u16,
    server: Arc<ServerContext>,
) -> Result<(), ReplicationError> {
    let mut state = ReplicaState::Connecting;
    let stream = TcpStream::connect(master_addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    send(&mut write_half, &[b"PING"]).await?;
    state = ReplicaState::PingSent;
    let line = read_line(&mut reader).await?;
    expect_prefix(&line, '+', "PingSent")?;

    send(
        &mut write_half,
        &[b"REPLCONF", b"listening-port", my_port.to_string().as_bytes()],
    )
    .await?;
    state = ReplicaState::ReplConfPortSent;
    let line = read_line(&mut reader).await?;
    expect_prefix(&line, '+', "ReplConfPortSent")?;

    send(&mut write_half, &[b"REPLCONF", b"capa", b"eof", b"capa", b"psync2"]).await?;
    state = ReplicaState::ReplConfCapaSent;
    let line = read_line(&mut reader).await?;
    expect_prefix(&line, '+', "ReplConfCapaSent")?;

    send(&mut write_half, &[b"PSYNC", b"?", b"-1"]).await?;
    state = ReplicaState::PsyncSent;
    let line = read_line(&mut reader).await?;
    if !line.starts_with("+FULLRESYNC") {
        return Err(ReplicationError::UnexpectedReply {
            state: "PsyncSent",
            reply: line,
        });
    }

    state = ReplicaState::RdbReceiving;
    let header = read_line(&mut reader).await?;
    let len: usize = header
        .strip_prefix('$')
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ReplicationError::UnexpectedReply {
            state: "RdbReceiving",
            reply: header.clone(),
        })?;
    let mut rdb = vec![0u8; len];
    reader.read_exact(&mut rdb).await?;
    server.load_rdb_snapshot(&rdb);

    state = ReplicaState::Active;
    tracing::info!(?state, "replica entered Active state");

    let mut buf = BytesMut::with_capacity(16 * 1024);
    let mut chunk = [0u8; 4096];
    loop {
        match parse_request(&mut buf)? {
            ParseOutcome::Complete(Frame::Array(items)) => {
                let argv: Vec<Vec<u8>> = items
                    .into_iter()
                    .map(|f| match f {
                        Frame::Bulk(b) => b,
                        _ => Vec::new(),
                    })
                    .collect();
                server.apply_replicated_command(argv).await;
            }
            ParseOutcome::Complete(_) => {}
            ParseOutcome::NeedMore => {
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ReplicationError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "master closed connection",
                    )));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
