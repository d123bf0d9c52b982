use graph_cluster::config::ClusterConfig;
use graph_cluster::server::cluster::Cluster;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = ClusterConfig::from_env();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                let value = flag_value(&args, i)?;
                config.data_dir = PathBuf::from(value);
                i += 2;
            }
            "--secondaries" => {
                config.secondaries = flag_value(&args, i)?.parse()?;
                i += 2;
            }
            "--staging-capacity" => {
                config.staging_capacity = flag_value(&args, i)?.parse()?;
                i += 2;
            }
            "-h" | "--help" => {
                eprintln!(
                    "Usage: {} [--data-dir <dir>] [--secondaries <n>] [--staging-capacity <n>]",
                    args[0]
                );
                return Ok(());
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    tracing::info!("Starting graph cluster with {:?}", config);

    let cluster = Cluster::start(config).await?;
    tracing::info!("Press Ctrl+C to drain and stop");

    tokio::signal::ctrl_c().await?;

    let report = cluster.shutdown().await?;
    tracing::info!(
        "Shutdown complete: {} workers joined, {} panicked",
        report.joined,
        report.panicked
    );

    Ok(())
}

fn flag_value(args: &[String], i: usize) -> anyhow::Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))
}
