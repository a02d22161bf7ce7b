use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use timetable::config::Config;
use timetable::console;
use timetable::engine::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env();
    timetable::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let engine = Engine::new(config.wal_path())?;

    info!("timetable ready");
    info!("  wal: {}", config.wal_path().display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let Some(line) = line else { break };
        let statement = line.trim();
        if statement.is_empty() || statement.starts_with("--") {
            continue;
        }

        let response = console::handle_line(&engine, statement).await;
        stdout.write_all(format!("{response}\n").as_bytes()).await?;
        stdout.flush().await?;

        if let Err(e) = engine.maybe_compact(config.compact_threshold).await {
            tracing::error!("compaction failed: {e}");
        }
    }

    info!("timetable stopped");
    Ok(())
}
