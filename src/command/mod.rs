//! Command registry & dispatcher (spec.md §4.G).
//!
//! Grounded on the teacher's `CMD_TABLE` (`once_cell::Lazy<HashMap<&str,
//! Arc<RedisCommand>>>` in `redis/cmd.rs`) and its `<name>_command` handler
//! naming, generalized into a `CommandHandler` trait object registry so one
//! handler instance can serve several command tokens that share an
//! implementation (LPUSH/RPUSH, LPOP/RPOP), the way spec.md requires.

pub mod connection;
pub mod keys;
pub mod lists;
pub mod pubsub_cmds;
pub mod replication_cmds;
pub mod server_admin;
pub mod streams;
pub mod strings;
pub mod transactions_cmds;
pub mod zsets;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ClientState;
use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::ServerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Read,
    Write,
    Blocking,
}

/// What a handler produced. `Async` means the handler already registered a
/// wait with the blocking manager and will deliver its own reply later; the
/// dispatcher must not write anything to the connection for it.
pub enum HandlerResult {
    Success(Frame),
    Error(CommandError),
    Async,
}

impl From<Result<Frame, CommandError>> for HandlerResult {
    fn from(r: Result<Frame, CommandError>) -> Self {
        match r {
            Ok(f) => HandlerResult::Success(f),
            Err(e) => HandlerResult::Error(e),
        }
    }
}

/// Everything a handler needs to run: the server's shared components and
/// the calling client's mutable session state.
pub struct ExecContext<'a> {
    pub server: &'a ServerContext,
    pub client: &'a mut ClientState,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Some commands (XREAD with BLOCK) are only blocking depending on
    /// their arguments, so the full argv is available here, not just `op`.
    fn category(&self, op: &str, argv: &[Vec<u8>]) -> Category;

    /// Structural validation only (arity, presence of a handler for `op`);
    /// must not touch the store. Run before queuing inside a transaction
    /// and again, implicitly, via `execute`.
    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError>;

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult;
}

fn wrong_arity(name: &str) -> CommandError {
    CommandError::WrongArity(name.to_string())
}

/// Checks `argv.len()` against `[min, max]` (`max = None` means unbounded),
/// the arity check every handler's `validate` starts with.
fn check_arity(op: &str, argv: &[Vec<u8>], min: usize, max: Option<usize>) -> Result<(), CommandError> {
    let n = argv.len();
    if n < min || max.map(|m| n > m).unwrap_or(false) {
        return Err(wrong_arity(op));
    }
    Ok(())
}

pub struct Registry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

const PUBSUB_WHITELIST: &[&str] = &["SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PING", "QUIT"];
const TRANSACTION_CONTROL: &[&str] = &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"];

impl Registry {
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Arc<dyn CommandHandler>> = HashMap::new();

        let mut register = |names: &[&str], handler: Arc<dyn CommandHandler>| {
            for name in names {
                handlers.insert(name.to_string(), handler.clone());
            }
        };

        register(&["PING", "ECHO", "QUIT"], Arc::new(connection::ConnectionHandler));
        register(
            &["EXISTS", "DEL", "TYPE", "KEYS", "FLUSHALL"],
            Arc::new(keys::KeysHandler),
        );
        register(&["GET", "SET", "INCR", "DECR"], Arc::new(strings::StringsHandler));
        register(
            &["LPUSH", "RPUSH", "LPOP", "RPOP", "LRANGE", "LLEN", "BLPOP"],
            Arc::new(lists::ListsHandler),
        );
        register(&["XADD", "XRANGE", "XREAD"], Arc::new(streams::StreamsHandler));
        register(
            &[
                "ZADD",
                "ZREM",
                "ZRANGE",
                "ZRANGEBYSCORE",
                "ZRANK",
                "ZSCORE",
                "ZPOPMIN",
                "ZPOPMAX",
            ],
            Arc::new(zsets::ZSetsHandler),
        );
        register(
            &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"],
            Arc::new(transactions_cmds::TransactionsHandler),
        );
        register(
            &["SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PUBLISH"],
            Arc::new(pubsub_cmds::PubSubHandler),
        );
        register(
            &["REPLCONF", "PSYNC"],
            Arc::new(replication_cmds::ReplicationHandler),
        );
        register(&["INFO", "CONFIG", "METRICS"], Arc::new(server_admin::ServerAdminHandler));

        Registry { handlers }
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

/// The result of dispatching one request: either a reply to write back
/// (including `+QUEUED` for a command queued inside a transaction), or
/// nothing, when a blocking handler has registered an async wait and will
/// deliver its own reply later over the client's push channel.
pub enum DispatchOutcome {
    Reply(Frame),
    NoReply,
}

/// Runs the full dispatch pipeline from spec.md §4.G for one parsed
/// request. `is_replica_inbound` skips event propagation to the
/// replication engine and AOF sink (those writes came from our own master).
pub async fn dispatch(
    server: &ServerContext,
    client: &mut ClientState,
    argv: Vec<Vec<u8>>,
    is_replica_inbound: bool,
) -> DispatchOutcome {
    if argv.is_empty() {
        return DispatchOutcome::Reply(Frame::Error(CommandError::Syntax.to_string()));
    }
    let op = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();

    if client.is_in_subscriber_context() && !PUBSUB_WHITELIST.contains(&op.as_str()) {
        return DispatchOutcome::Reply(Frame::Error(
            CommandError::PubSubContextError(op).to_string(),
        ));
    }

    let Some(handler) = server.registry.lookup(&op) else {
        if client.is_in_multi() && !TRANSACTION_CONTROL.contains(&op.as_str()) {
            client.multi.dirty = true;
        }
        return DispatchOutcome::Reply(Frame::Error(
            CommandError::UnknownCommand(op).to_string(),
        ));
    };

    if client.is_in_multi() && !TRANSACTION_CONTROL.contains(&op.as_str()) {
        match handler.validate(&op, &argv) {
            Ok(()) => {
                client.queue_command(argv);
                return DispatchOutcome::Reply(Frame::Simple("QUEUED".to_string()));
            }
            Err(e) => {
                client.multi.dirty = true;
                return DispatchOutcome::Reply(Frame::Error(e.to_string()));
            }
        }
    }

    if let Err(e) = handler.validate(&op, &argv) {
        return DispatchOutcome::Reply(Frame::Error(e.to_string()));
    }

    let category = handler.category(&op, &argv);
    let mut ctx = ExecContext { server, client };
    let result = handler.execute(&op, &argv, &mut ctx).await;

    // data_added/data_removed have already been published by `Db::compute`
    // itself (its `EventSink` is wired in at server construction), so only
    // replication fan-out and the AOF sink are driven from here.
    if category == Category::Write && !is_replica_inbound && !matches!(result, HandlerResult::Error(_)) {
        server.replication.propagate(&argv);
        server.persistence.append_command(0, &argv);
    }

    match result {
        HandlerResult::Success(frame) => DispatchOutcome::Reply(frame),
        HandlerResult::Error(e) => DispatchOutcome::Reply(Frame::Error(e.to_string())),
        HandlerResult::Async => DispatchOutcome::NoReply,
    }
}
