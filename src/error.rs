//! Typed error catalogue for the server.
//!
//! The teacher's command layer (`cmd.rs`, `redis/cmd.rs`) returns ad hoc
//! `Result<_, String>` and writes wire errors by hand with `format!`. Here
//! each wire-visible error is a `CommandError` variant whose `Display`
//! produces exactly the `-CODE message` text from spec.md §7, so handlers
//! return typed errors and the dispatcher is the only place that knows how
//! to serialize them.

use thiserror::Error;

/// Errors raised while validating or executing a command. Every variant maps
/// 1:1 to one of the wire error codes in spec.md §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}'")]
    WrongArity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("ERR {0} is not allowed in transaction context")]
    BlockingInTransaction(String),

    #[error("ERR Can't execute '{0}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context")]
    PubSubContextError(String),

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,

    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR {0}")]
    Other(String),
}

impl CommandError {
    /// The wire code (the token that precedes the message), used by clients
    /// that inspect the error class rather than the full text.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::WrongType => "WRONGTYPE",
            _ => "ERR",
        }
    }
}

/// Errors raised while parsing an inbound request frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Protocol error: invalid multibulk length")]
    InvalidMultibulkLength,

    #[error("Protocol error: invalid bulk length")]
    InvalidBulkLength,

    #[error("Protocol error: expected '{0}', got something else")]
    UnexpectedPrefix(char),

    #[error("Protocol error: frame exceeds configured maximum size")]
    FrameTooLarge,

    #[error("Protocol error: requests must be arrays of bulk strings")]
    NotAnArrayOfBulkStrings,
}

/// Errors raised while loading persisted state at startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error loading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt persisted entry at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Errors raised by the replica-side handshake state machine.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("io error during replication: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected reply from master during {state}: {reply}")]
    UnexpectedReply { state: &'static str, reply: String },
    #[error("protocol error from master: {0}")]
    Protocol(#[from] ProtocolError),
}
