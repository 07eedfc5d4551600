//! REPLCONF / PSYNC (spec.md §4.I).
//!
//! PSYNC can't be expressed as one reply frame: it answers with
//! `+FULLRESYNC`, then a raw (non-CRLF-terminated) RDB bulk, then an
//! unbounded stream of subsequently-propagated commands. All three go out
//! over the client's push channel (`Frame::Raw`, already RESP-encoded), and
//! a forwarding task is spawned to keep relaying the backlog stream for the
//! life of the connection.

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct ReplicationHandler;

#[async_trait]
impl CommandHandler for ReplicationHandler {
    fn category(&self, _op: &str, _argv: &[Vec<u8>]) -> Category {
        Category::Read
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "REPLCONF" => check_arity(op, argv, 3, None),
            "PSYNC" => check_arity(op, argv, 3, Some(3)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        match op {
            "REPLCONF" => {
                if argv[1].eq_ignore_ascii_case(b"listening-port") {
                    if let Some(port) = std::str::from_utf8(&argv[2]).ok().and_then(|s| s.parse().ok()) {
                        ctx.client.replica_listening_port = Some(port);
                    }
                }
                HandlerResult::Success(Frame::ok())
            }
            "PSYNC" => {
                let resync = ctx.server.replication.register_replica();
                ctx.client.repl_role = crate::client::ReplRole::Replica;

                let mut header = Vec::new();
                header.extend_from_slice(
                    format!("+FULLRESYNC {} {}\r\n", resync.repl_id, resync.offset).as_bytes(),
                );
                Frame::encode_raw_bulk(resync.rdb, &mut header);
                let _ = ctx.client.push_tx.send(Frame::Raw(header));

                let push_tx = ctx.client.push_tx.clone();
                let mut stream = resync.stream;
                tokio::spawn(async move {
                    while let Some(bytes) = stream.recv().await {
                        if push_tx.send(Frame::Raw(bytes)).is_err() {
                            break;
                        }
                    }
                });

                HandlerResult::Async
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
