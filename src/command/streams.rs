//! XADD / XRANGE / XREAD (spec.md §6 "Stream").

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;
use crate::store::stream::{IdSpec, StreamId};
use crate::util::now_millis;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct StreamsHandler;

fn entry_to_frame(id: StreamId, fields: &[(Vec<u8>, Vec<u8>)]) -> Frame {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(f.clone());
        flat.push(v.clone());
    }
    Frame::Array(vec![
        Frame::Bulk(id.to_string().into_bytes()),
        Frame::from_bulk_strs(flat),
    ])
}

#[async_trait]
impl CommandHandler for StreamsHandler {
    fn category(&self, op: &str, argv: &[Vec<u8>]) -> Category {
        match op {
            "XADD" => Category::Write,
            "XREAD" if argv.iter().any(|a| a.eq_ignore_ascii_case(b"BLOCK")) => Category::Blocking,
            _ => Category::Read,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "XADD" => {
                check_arity(op, argv, 4, None)?;
                if (argv.len() - 3) % 2 != 0 {
                    return Err(CommandError::Syntax);
                }
                Ok(())
            }
            "XRANGE" => check_arity(op, argv, 4, Some(6)),
            "XREAD" => check_arity(op, argv, 4, None),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        let db = &ctx.server.db;
        match op {
            "XADD" => {
                let key = &argv[1];
                let id_str = String::from_utf8_lossy(&argv[2]).to_string();
                let spec = match IdSpec::parse(&id_str) {
                    Ok(s) => s,
                    Err(e) => return HandlerResult::Error(e),
                };
                if matches!(spec, IdSpec::Explicit(id) if id == StreamId::ZERO) {
                    return HandlerResult::Error(CommandError::StreamIdZero);
                }
                let mut fields = Vec::new();
                let mut i = 3;
                while i + 1 < argv.len() {
                    fields.push((argv[i].clone(), argv[i + 1].clone()));
                    i += 2;
                }
                let now = now_millis();
                let result = db.with_stream(key, true, true, |stream| stream.append(spec, fields, now));
                match result {
                    Ok(Some(Ok(id))) => HandlerResult::Success(Frame::Bulk(id.to_string().into_bytes())),
                    Ok(Some(Err(e))) => HandlerResult::Error(e),
                    Ok(None) => unreachable!("create_if_missing=true never returns None"),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "XRANGE" => {
                let key = &argv[1];
                let start = match StreamId::parse_range_bound(&String::from_utf8_lossy(&argv[2]), true) {
                    Some(id) => id,
                    None => return HandlerResult::Error(CommandError::Syntax),
                };
                let end = match StreamId::parse_range_bound(&String::from_utf8_lossy(&argv[3]), false) {
                    Some(id) => id,
                    None => return HandlerResult::Error(CommandError::Syntax),
                };
                let count = match argv.get(4) {
                    Some(tok) if tok.eq_ignore_ascii_case(b"COUNT") => match argv.get(5) {
                        Some(n) => std::str::from_utf8(n).ok().and_then(|s| s.parse::<usize>().ok()),
                        None => return HandlerResult::Error(CommandError::Syntax),
                    },
                    Some(_) => return HandlerResult::Error(CommandError::Syntax),
                    None => None,
                };
                let result = db.with_stream(key, false, false, |stream| {
                    let mut entries = stream.range(start, end);
                    if let Some(n) = count {
                        entries.truncate(n);
                    }
                    entries
                });
                match result {
                    Ok(Some(entries)) => HandlerResult::Success(Frame::Array(
                        entries.iter().map(|e| entry_to_frame(e.id, &e.fields)).collect(),
                    )),
                    Ok(None) => HandlerResult::Success(Frame::Array(vec![])),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "XREAD" => execute_xread(argv, ctx).await,
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}

async fn execute_xread(argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
    let db = &ctx.server.db;
    let mut count: Option<usize> = None;
    let mut block: Option<Option<Duration>> = None;
    let mut i = 1;
    while i < argv.len() {
        if argv[i].eq_ignore_ascii_case(b"COUNT") {
            count = std::str::from_utf8(&argv[i + 1]).ok().and_then(|s| s.parse().ok());
            i += 2;
        } else if argv[i].eq_ignore_ascii_case(b"BLOCK") {
            let ms: u64 = match std::str::from_utf8(&argv[i + 1]).ok().and_then(|s| s.parse().ok()) {
                Some(ms) => ms,
                None => return HandlerResult::Error(CommandError::NotAnInteger),
            };
            block = Some(if ms == 0 { None } else { Some(Duration::from_millis(ms)) });
            i += 2;
        } else if argv[i].eq_ignore_ascii_case(b"STREAMS") {
            i += 1;
            break;
        } else {
            return HandlerResult::Error(CommandError::Syntax);
        }
    }
    let rest = &argv[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return HandlerResult::Error(CommandError::Syntax);
    }
    let n = rest.len() / 2;
    let keys: Vec<Vec<u8>> = rest[..n].to_vec();
    let mut after_ids = Vec::with_capacity(n);
    for id_arg in &rest[n..] {
        match StreamId::parse_exact(&String::from_utf8_lossy(id_arg)) {
            Some(id) => after_ids.push(id),
            None => return HandlerResult::Error(CommandError::Syntax),
        }
    }

    let try_once = || {
        let mut per_stream = Vec::new();
        for (key, after) in keys.iter().zip(after_ids.iter()) {
            let entries = db
                .with_stream(key, false, false, |stream| stream.after(*after, count))
                .ok()
                .flatten()
                .unwrap_or_default();
            if !entries.is_empty() {
                per_stream.push((key.clone(), entries));
            }
        }
        if per_stream.is_empty() {
            None
        } else {
            Some(per_stream)
        }
    };

    let got = match block {
        None => try_once(),
        Some(deadline) => ctx.server.blocking.wait_for(&keys, deadline, try_once).await,
    };

    match got {
        None => HandlerResult::Success(Frame::NullArray),
        Some(per_stream) => HandlerResult::Success(Frame::Array(
            per_stream
                .into_iter()
                .map(|(key, entries)| {
                    Frame::Array(vec![
                        Frame::Bulk(key),
                        Frame::Array(entries.iter().map(|e| entry_to_frame(e.id, &e.fields)).collect()),
                    ])
                })
                .collect(),
        )),
    }
}
