//! MULTI / EXEC / DISCARD / WATCH / UNWATCH (spec.md §4.F, §6 "Transactions").

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::transactions::watch_still_valid;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct TransactionsHandler;

#[async_trait]
impl CommandHandler for TransactionsHandler {
    fn category(&self, _op: &str, _argv: &[Vec<u8>]) -> Category {
        Category::Write
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "MULTI" | "EXEC" | "DISCARD" | "UNWATCH" => check_arity(op, argv, 1, Some(1)),
            "WATCH" => check_arity(op, argv, 2, None),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        match op {
            "MULTI" => {
                if ctx.client.is_in_multi() {
                    return HandlerResult::Error(CommandError::NestedMulti);
                }
                ctx.client.start_multi();
                HandlerResult::Success(Frame::ok())
            }
            "DISCARD" => {
                if !ctx.client.is_in_multi() {
                    return HandlerResult::Error(CommandError::DiscardWithoutMulti);
                }
                ctx.client.discard_multi();
                HandlerResult::Success(Frame::ok())
            }
            "WATCH" => {
                if ctx.client.is_in_multi() {
                    return HandlerResult::Error(CommandError::WatchInsideMulti);
                }
                for key in &argv[1..] {
                    let version = ctx.server.db.version_of(key);
                    ctx.client.watch(key.clone(), version);
                }
                HandlerResult::Success(Frame::ok())
            }
            "UNWATCH" => {
                ctx.client.unwatch();
                HandlerResult::Success(Frame::ok())
            }
            "EXEC" => execute_exec(ctx).await,
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}

async fn execute_exec(ctx: &mut ExecContext<'_>) -> HandlerResult {
    if !ctx.client.is_in_multi() {
        return HandlerResult::Error(CommandError::ExecWithoutMulti);
    }

    let watched = std::mem::take(&mut ctx.client.watched);
    let dirty = ctx.client.multi.dirty;
    let queue = std::mem::take(&mut ctx.client.multi.queue);
    ctx.client.discard_multi();

    if dirty || !watch_still_valid(&ctx.server.db, &watched) {
        return HandlerResult::Success(Frame::NullArray);
    }

    let mut replies = Vec::with_capacity(queue.len());
    for queued in queue {
        let op = String::from_utf8_lossy(&queued.argv[0]).to_ascii_uppercase();
        let Some(handler) = ctx.server.registry.lookup(&op) else {
            replies.push(Frame::Error(CommandError::UnknownCommand(op).to_string()));
            continue;
        };
        if handler.category(&op, &queued.argv) == Category::Blocking {
            replies.push(Frame::Error(CommandError::BlockingInTransaction(op).to_string()));
            continue;
        }
        let is_write = handler.category(&op, &queued.argv) == Category::Write;
        match handler.execute(&op, &queued.argv, ctx).await {
            HandlerResult::Success(frame) => {
                if is_write {
                    ctx.server.replication.propagate(&queued.argv);
                    ctx.server.persistence.append_command(0, &queued.argv);
                }
                replies.push(frame);
            }
            HandlerResult::Error(e) => replies.push(Frame::Error(e.to_string())),
            HandlerResult::Async => unreachable!("blocking commands are rejected above"),
        }
    }
    HandlerResult::Success(Frame::Array(replies))
}
