//! INFO / CONFIG GET / METRICS (spec.md §6 "Server").
//!
//! Out of scope per spec's Non-goals beyond the interface: "Prometheus text
//! serialization... metrics collection internals are external". These
//! handlers return the thin, structurally-correct replies a client expects
//! without implementing a real metrics pipeline underneath.

use async_trait::async_trait;

use crate::error::CommandError;
use crate::protocol::Frame;

use super::{check_arity, Category, CommandHandler, ExecContext, HandlerResult};

pub struct ServerAdminHandler;

#[async_trait]
impl CommandHandler for ServerAdminHandler {
    fn category(&self, _op: &str, _argv: &[Vec<u8>]) -> Category {
        Category::Read
    }

    fn validate(&self, op: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
        match op {
            "INFO" => check_arity(op, argv, 1, Some(2)),
            "CONFIG" => check_arity(op, argv, 3, None),
            "METRICS" => check_arity(op, argv, 1, Some(1)),
            _ => Err(CommandError::UnknownCommand(op.to_string())),
        }
    }

    async fn execute(&self, op: &str, argv: &[Vec<u8>], ctx: &mut ExecContext<'_>) -> HandlerResult {
        match op {
            "INFO" => {
                let section = argv
                    .get(1)
                    .map(|s| String::from_utf8_lossy(s).to_ascii_lowercase());
                let body = render_info(ctx, section.as_deref());
                HandlerResult::Success(Frame::Bulk(body.into_bytes()))
            }
            "CONFIG" => {
                if !argv[1].eq_ignore_ascii_case(b"GET") {
                    return HandlerResult::Error(CommandError::Syntax);
                }
                let name = String::from_utf8_lossy(&argv[2]).to_string();
                let value = ctx.server.config.get(&name);
                match value {
                    Some(v) => HandlerResult::Success(Frame::from_bulk_strs(vec![name, v])),
                    None => HandlerResult::Success(Frame::Array(vec![])),
                }
            }
            "METRICS" => HandlerResult::Success(Frame::Bulk(
                format!("connected_clients_served_total {}\n", ctx.server.replication.replica_count())
                    .into_bytes(),
            )),
            _ => HandlerResult::Error(CommandError::UnknownCommand(op.to_string())),
        }
    }
}

fn render_info(ctx: &ExecContext<'_>, section: Option<&str>) -> String {
    let mut out = String::new();
    if section.is_none() || section == Some("replication") {
        out.push_str("# Replication\r\n");
        out.push_str(&format!("role:{}\r\n", if ctx.server.is_replica() { "slave" } else { "master" }));
        out.push_str(&format!("connected_slaves:{}\r\n", ctx.server.replication.replica_count()));
        out.push_str(&format!("master_replid:{}\r\n", ctx.server.replication.repl_id()));
        out.push_str(&format!("master_repl_offset:{}\r\n", ctx.server.replication.offset()));
    }
    if section.is_none() || section == Some("server") {
        out.push_str("# Server\r\n");
        out.push_str("redis_version:7.0.0\r\n");
        out.push_str(&format!("run_id:{}\r\n", ctx.server.replication.repl_id()));
    }
    out
}
