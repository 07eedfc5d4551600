//! EXISTS / DEL / TYPE / KEYS / FLUSHALL (spec.md §6 "Keys").

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct KeysHandler;

#[async_trait]
impl CommandHandler for KeysHandler {
    fn category(&self, op: &str, _argv: &[Vec<u8>]) -> Category {
        match op {
            "DEL" | "FLUSHALL" => Category::Write,
            _ => Category::Read,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "EXISTS" | "DEL" => check_arity(op, argv, 2, None),
            "TYPE" => check_arity(op, argv, 2, Some(2)),
            "KEYS" => check_arity(op, argv, 2, Some(2)),
            "FLUSHALL" => check_arity(op, argv, 1, Some(2)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        let db = &ctx.server.db;
        match op {
            "EXISTS" => {
                let n = argv[1..].iter().filter(|k| db.exists(k)).count();
                HandlerResult::Success(Frame::Integer(n as i64))
            }
            "DEL" => {
                let n = argv[1..].iter().filter(|k| db.delete(k)).count();
                HandlerResult::Success(Frame::Integer(n as i64))
            }
            "TYPE" => {
                let name = db.type_name(&argv[1]).unwrap_or("none");
                HandlerResult::Success(Frame::Simple(name.to_string()))
            }
            "KEYS" => {
                let keys = db.keys_matching(&argv[1]);
                HandlerResult::Success(Frame::from_bulk_strs(keys))
            }
            "FLUSHALL" => {
                for key in db.keys_matching(b"*") {
                    db.delete(&key);
                }
                HandlerResult::Success(Frame::ok())
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
