//! GET / SET / INCR / DECR (spec.md §6 "String").

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::store::{ExpiryPolicy, Mutation, Value};
use crate::util::now_millis;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct StringsHandler;

#[async_trait]
impl CommandHandler for StringsHandler {
    fn category(&self, op: &str, _argv: &[Vec<u8>]) -> Category {
        match op {
            "GET" => Category::Read,
            _ => Category::Write,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "GET" => check_arity(op, argv, 2, Some(2)),
            "SET" => check_arity(op, argv, 3, Some(5)),
            "INCR" | "DECR" => check_arity(op, argv, 2, Some(2)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        let db = &ctx.server.db;
        match op {
            "GET" => match db.get_string(&argv[1]) {
                Ok(Some(v)) => HandlerResult::Success(Frame::Bulk(v)),
                Ok(None) => HandlerResult::Success(Frame::NullBulk),
                Err(e) => HandlerResult::Error(e),
            },
            "SET" => {
                let mut expiry = ExpiryPolicy::Never;
                if argv.len() > 3 {
                    if argv.len() != 5 || !argv[3].eq_ignore_ascii_case(b"PX") {
                        return HandlerResult::Error(CommandError::Syntax);
                    }
                    let ms: u64 = match std::str::from_utf8(&argv[4]).ok().and_then(|s| s.parse().ok()) {
                        Some(ms) => ms,
                        None => return HandlerResult::Error(CommandError::NotAnInteger),
                    };
                    expiry = ExpiryPolicy::AtEpochMillis(now_millis() + ms);
                }
                db.put(&argv[1], Value::Str(argv[2].clone()), expiry);
                HandlerResult::Success(Frame::ok())
            }
            "INCR" | "DECR" => {
                let delta: i64 = if op == "INCR" { 1 } else { -1 };
                let result = db.compute(&argv[1], |slot| {
                    let current: i64 = match slot {
                        None => 0,
                        Some(Value::Str(s)) => match std::str::from_utf8(s).ok().and_then(|t| t.parse().ok()) {
                            Some(n) => n,
                            None => return Mutation::unchanged(Err(CommandError::NotAnInteger)),
                        },
                        Some(_) => return Mutation::unchanged(Err(CommandError::WrongType)),
                    };
                    match current.checked_add(delta) {
                        Some(next) => {
                            *slot = Some(Value::Str(next.to_string().into_bytes()));
                            Mutation::changed(Ok(next))
                        }
                        None => Mutation::unchanged(Err(CommandError::Overflow)),
                    }
                });
                match result {
                    Ok(n) => HandlerResult::Success(Frame::Integer(n)),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
