//! PING / ECHO / QUIT (spec.md §6 "Connection").

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct ConnectionHandler;

#[async_trait]
impl CommandHandler for ConnectionHandler {
    fn category(&self, _op: &str, _argv: &[Vec<u8>]) -> Category {
        Category::Read
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "PING" => check_arity(op, argv, 1, Some(2)),
            "ECHO" => check_arity(op, argv, 2, Some(2)),
            "QUIT" => check_arity(op, argv, 1, Some(1)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        match op {
            "PING" => match argv.get(1) {
                Some(msg) => HandlerResult::Success(Frame::Bulk(msg.clone())),
                None => HandlerResult::Success(Frame::Simple("PONG".to_string())),
            },
            "ECHO" => HandlerResult::Success(Frame::Bulk(argv[1].clone())),
            "QUIT" => {
                ctx.client.should_close = true;
                HandlerResult::Success(Frame::ok())
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
