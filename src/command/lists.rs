//! LPUSH / RPUSH / LPOP / RPOP / LRANGE / LLEN / BLPOP (spec.md §6 "List").

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct ListsHandler;

fn parse_count(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

#[async_trait]
impl CommandHandler for ListsHandler {
    fn category(&self, op: &str, _argv: &[Vec<u8>]) -> Category {
        match op {
            "LRANGE" | "LLEN" => Category::Read,
            "BLPOP" => Category::Blocking,
            _ => Category::Write,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "LPUSH" | "RPUSH" => check_arity(op, argv, 3, None),
            "LPOP" | "RPOP" => check_arity(op, argv, 2, Some(3)),
            "LRANGE" => check_arity(op, argv, 4, Some(4)),
            "LLEN" => check_arity(op, argv, 2, Some(2)),
            "BLPOP" => check_arity(op, argv, 3, None),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        let db = &ctx.server.db;
        match op {
            "LPUSH" | "RPUSH" => {
                let key = &argv[1];
                let values: Vec<Vec<u8>> = argv[2..].to_vec();
                let result = db.with_list(key, true, true, |list| {
                    if op == "LPUSH" {
                        list.push_head(values);
                    } else {
                        list.push_tail(values);
                    }
                    list.len()
                });
                match result {
                    Ok(Some(len)) => HandlerResult::Success(Frame::Integer(len as i64)),
                    Ok(None) => unreachable!("create_if_missing=true never returns None"),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "LPOP" | "RPOP" => {
                let key = &argv[1];
                let count = match argv.get(2) {
                    Some(c) => match parse_count(c) {
                        Ok(n) if n >= 0 => Some(n as usize),
                        _ => return HandlerResult::Error(CommandError::NotAnInteger),
                    },
                    None => None,
                };
                let result = db.with_list(key, false, true, |list| match count {
                    None => {
                        let v = if op == "LPOP" { list.pop_head() } else { list.pop_tail() };
                        v.map(Frame::Bulk).unwrap_or(Frame::NullBulk)
                    }
                    Some(n) => {
                        let items = if op == "LPOP" { list.pop_head_n(n) } else { list.pop_tail_n(n) };
                        Frame::from_bulk_strs(items)
                    }
                });
                match result {
                    Ok(Some(frame)) => HandlerResult::Success(frame),
                    Ok(None) => HandlerResult::Success(if count.is_some() {
                        Frame::NullArray
                    } else {
                        Frame::NullBulk
                    }),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "LRANGE" => {
                let (Ok(start), Ok(end)) = (parse_count(&argv[2]), parse_count(&argv[3])) else {
                    return HandlerResult::Error(CommandError::NotAnInteger);
                };
                match db.with_list(&argv[1], false, false, |list| list.range(start, end)) {
                    Ok(Some(items)) => HandlerResult::Success(Frame::from_bulk_strs(items)),
                    Ok(None) => HandlerResult::Success(Frame::Array(vec![])),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "LLEN" => match db.with_list(&argv[1], false, false, |list| list.len()) {
                Ok(Some(len)) => HandlerResult::Success(Frame::Integer(len as i64)),
                Ok(None) => HandlerResult::Success(Frame::Integer(0)),
                Err(e) => HandlerResult::Error(e),
            },
            "BLPOP" => {
                let timeout_secs: f64 = match std::str::from_utf8(argv.last().unwrap())
                    .ok()
                    .and_then(|s| s.parse().ok())
                {
                    Some(t) => t,
                    None => return HandlerResult::Error(CommandError::NotAnInteger),
                };
                let keys: Vec<Vec<u8>> = argv[1..argv.len() - 1].to_vec();
                let deadline = if timeout_secs > 0.0 {
                    Some(Duration::from_secs_f64(timeout_secs))
                } else {
                    None
                };
                let got = ctx
                    .server
                    .blocking
                    .wait_for(&keys, deadline, || {
                        for key in &keys {
                            let popped = db.with_list(key, false, true, |list| list.pop_head()).ok().flatten().flatten();
                            if let Some(v) = popped {
                                return Some((key.clone(), v));
                            }
                        }
                        None
                    })
                    .await;
                match got {
                    Some((key, v)) => HandlerResult::Success(Frame::from_bulk_strs(vec![key, v])),
                    None => HandlerResult::Success(Frame::NullArray),
                }
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
