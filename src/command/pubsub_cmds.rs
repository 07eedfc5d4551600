//! SUBSCRIBE / UNSUBSCRIBE / PSUBSCRIBE / PUNSUBSCRIBE / PUBLISH
//! (spec.md §6 "Pub/Sub").
//!
//! Subscribe confirmations are delivered through the client's own push
//! channel rather than as the dispatcher's direct reply, since a single
//! SUBSCRIBE with several channel names produces one confirmation frame per
//! channel (spec.md's subscription contract, §1 "out of scope... Pub/Sub
//! pattern matching beyond the subscription contract" implies the contract
//! itself — one reply per (un)subscribed name — is in scope).

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct PubSubHandler;

fn confirmation(kind: &str, name: Vec<u8>, count: usize) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(kind.as_bytes().to_vec()),
        Frame::Bulk(name),
        Frame::Integer(count as i64),
    ])
}

#[async_trait]
impl CommandHandler for PubSubHandler {
    fn category(&self, op: &str, _argv: &[Vec<u8>]) -> Category {
        match op {
            "PUBLISH" => Category::Write,
            _ => Category::Read,
        }
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" => check_arity(op, argv, 2, None),
            "PUBLISH" => check_arity(op, argv, 3, Some(3)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        match op {
            "SUBSCRIBE" => {
                for channel in &argv[1..] {
                    ctx.client.subscribed_channels.insert(channel.clone());
                    ctx.server
                        .pubsub
                        .subscribe(channel.clone(), ctx.client.id, ctx.client.push_tx.clone());
                    let count = ctx.client.subscribed_channels.len() + ctx.client.subscribed_patterns.len();
                    let _ = ctx.client.push_tx.send(confirmation("subscribe", channel.clone(), count));
                }
                HandlerResult::Async
            }
            "UNSUBSCRIBE" => {
                let channels: Vec<Vec<u8>> = if argv.len() > 1 {
                    argv[1..].to_vec()
                } else {
                    ctx.client.subscribed_channels.iter().cloned().collect()
                };
                for channel in channels {
                    ctx.client.subscribed_channels.remove(&channel);
                    ctx.server.pubsub.unsubscribe(&channel, ctx.client.id);
                    let count = ctx.client.subscribed_channels.len() + ctx.client.subscribed_patterns.len();
                    let _ = ctx.client.push_tx.send(confirmation("unsubscribe", channel, count));
                }
                HandlerResult::Async
            }
            "PSUBSCRIBE" => {
                for pattern in &argv[1..] {
                    ctx.client.subscribed_patterns.insert(pattern.clone());
                    ctx.server
                        .pubsub
                        .psubscribe(pattern.clone(), ctx.client.id, ctx.client.push_tx.clone());
                    let count = ctx.client.subscribed_channels.len() + ctx.client.subscribed_patterns.len();
                    let _ = ctx.client.push_tx.send(confirmation("psubscribe", pattern.clone(), count));
                }
                HandlerResult::Async
            }
            "PUNSUBSCRIBE" => {
                let patterns: Vec<Vec<u8>> = if argv.len() > 1 {
                    argv[1..].to_vec()
                } else {
                    ctx.client.subscribed_patterns.iter().cloned().collect()
                };
                for pattern in patterns {
                    ctx.client.subscribed_patterns.remove(&pattern);
                    ctx.server.pubsub.punsubscribe(&pattern, ctx.client.id);
                    let count = ctx.client.subscribed_channels.len() + ctx.client.subscribed_patterns.len();
                    let _ = ctx.client.push_tx.send(confirmation("punsubscribe", pattern, count));
                }
                HandlerResult::Async
            }
            "PUBLISH" => {
                let delivered = ctx.server.pubsub.publish(&argv[1], &argv[2]);
                HandlerResult::Success(Frame::Integer(delivered as i64))
            }
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}
