use clap::Parser;
use emberkv::config::{Cli, Config};
use emberkv::server::{self, ServerContext};

#[tokio::main]
async fn main() {
    emberkv::logging::init();

    let cli = Cli::parse();
    let config = match Config::load(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let persistence = server::default_persistence(&config);
    let replica_of = config.replica_of.clone();
    let appendonly_path = config.appendonly_path.clone();
    let ctx = ServerContext::new(config, persistence);

    if let Some(path) = &appendonly_path {
        tracing::info!(%path, "loading append-only file");
        if let Err(e) = ctx.persistence.load(path, &ctx).await {
            tracing::error!(error = %e, "failed to load append-only file");
            std::process::exit(1);
        }
    }

    tokio::spawn(emberkv::timeout::run(ctx.clone()));

    if let Some((host, port)) = replica_of {
        let ctx = ctx.clone();
        let my_port = ctx.config.port;
        ctx.mark_replica();
        tokio::spawn(async move {
            let master_addr = format!("{host}:{port}");
            loop {
                tracing::info!(%master_addr, "connecting to master");
                if let Err(e) = emberkv::replication::run_replica(&master_addr, my_port, ctx.clone()).await {
                    tracing::warn!(error = %e, "replication connection lost, retrying");
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });
    }

    if let Err(e) = server::run(ctx).await {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
