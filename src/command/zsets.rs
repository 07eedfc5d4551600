//! ZADD / ZREM / ZRANGE / ZRANGEBYSCORE / ZRANK / ZSCORE / ZPOPMIN / ZPOPMAX
//! (spec.md §6 "Sorted Set").

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct ZSetsHandler;

fn parse_f64(arg: &[u8]) -> Result<f64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

fn parse_i64(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

fn member_score_frame(pairs: Vec<(Vec<u8>, f64)>) -> Frame {
    Frame::Array(
        pairs
            .into_iter()
            .flat_map(|(m, s)| vec![Frame::Bulk(m), Frame::Bulk(format_score(s).into_bytes())])
            .collect(),
    )
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.is_finite() {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

#[async_trait]
impl CommandHandler for ZSetsHandler {
    fn category(&self, op: &str, _argv: &[Vec<u8>]) -> Category {
        match op {
            "ZADD" | "ZREM" | "ZPOPMIN" | "ZPOPMAX" => Category::Write,
            _ => Category::Read,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "ZADD" => {
                check_arity(op, argv, 4, None)?;
                if (argv.len() - 2) % 2 != 0 {
                    return Err(CommandError::Syntax);
                }
                Ok(())
            }
            "ZREM" => check_arity(op, argv, 3, None),
            "ZRANGE" | "ZRANGEBYSCORE" => check_arity(op, argv, 4, Some(4)),
            "ZRANK" | "ZSCORE" => check_arity(op, argv, 3, Some(3)),
            "ZPOPMIN" | "ZPOPMAX" => check_arity(op, argv, 2, Some(2)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        let db = &ctx.server.db;
        match op {
            "ZADD" => {
                let mut pairs = Vec::new();
                let mut i = 2;
                while i + 1 < argv.len() {
                    let score = match parse_f64(&argv[i]) {
                        Ok(s) => s,
                        Err(e) => return HandlerResult::Error(e),
                    };
                    pairs.push((score, argv[i + 1].clone()));
                    i += 2;
                }
                let result = db.with_zset(&argv[1], true, true, |zset| {
                    pairs.into_iter().filter(|(score, member)| zset.add(member.clone(), *score)).count()
                });
                match result {
                    Ok(Some(added)) => HandlerResult::Success(Frame::Integer(added as i64)),
                    Ok(None) => unreachable!("create_if_missing=true never returns None"),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "ZREM" => {
                let members = &argv[2..];
                let result = db.with_zset(&argv[1], false, true, |zset| {
                    members.iter().filter(|m| zset.remove(m)).count()
                });
                match result {
                    Ok(Some(removed)) => HandlerResult::Success(Frame::Integer(removed as i64)),
                    Ok(None) => HandlerResult::Success(Frame::Integer(0)),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "ZRANGE" => {
                let (Ok(start), Ok(end)) = (parse_i64(&argv[2]), parse_i64(&argv[3])) else {
                    return HandlerResult::Error(CommandError::NotAnInteger);
                };
                match db.with_zset(&argv[1], false, false, |zset| zset.range_by_rank(start, end)) {
                    Ok(Some(pairs)) => HandlerResult::Success(Frame::from_bulk_strs(
                        pairs.into_iter().map(|(m, _)| m).collect::<Vec<_>>(),
                    )),
                    Ok(None) => HandlerResult::Success(Frame::Array(vec![])),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "ZRANGEBYSCORE" => {
                let (Ok(min), Ok(max)) = (parse_f64(&argv[2]), parse_f64(&argv[3])) else {
                    return HandlerResult::Error(CommandError::NotAnInteger);
                };
                match db.with_zset(&argv[1], false, false, |zset| zset.range_by_score(min, max)) {
                    Ok(Some(pairs)) => HandlerResult::Success(Frame::from_bulk_strs(
                        pairs.into_iter().map(|(m, _)| m).collect::<Vec<_>>(),
                    )),
                    Ok(None) => HandlerResult::Success(Frame::Array(vec![])),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            "ZRANK" => match db.with_zset(&argv[1], false, false, |zset| zset.rank(&argv[2])) {
                Ok(Some(Some(rank))) => HandlerResult::Success(Frame::Integer(rank as i64)),
                Ok(_) => HandlerResult::Success(Frame::NullBulk),
                Err(e) => HandlerResult::Error(e),
            },
            "ZSCORE" => match db.with_zset(&argv[1], false, false, |zset| zset.score(&argv[2])) {
                Ok(Some(Some(score))) => HandlerResult::Success(Frame::Bulk(format_score(score).into_bytes())),
                Ok(_) => HandlerResult::Success(Frame::NullBulk),
                Err(e) => HandlerResult::Error(e),
            },
            "ZPOPMIN" | "ZPOPMAX" => {
                let result = db.with_zset(&argv[1], false, true, |zset| {
                    if op == "ZPOPMIN" {
                        zset.pop_min()
                    } else {
                        zset.pop_max()
                    }
                });
                match result {
                    Ok(Some(Some((member, score)))) => {
                        HandlerResult::Success(member_score_frame(vec![(member, score)]))
                    }
                    Ok(_) => HandlerResult::Success(Frame::Array(vec![])),
                    Err(e) => HandlerResult::Error(e),
                }
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
