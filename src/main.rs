use std::path::PathBuf;

use anyhow::{Context, Result};
use frontier_tab::channel::OutboundMessage;
use frontier_tab::script::{ScriptRunner, ScriptStep};
use frontier_tab::TabConfig;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let script_path = std::env::args().nth(1).map(PathBuf::from);

    // stdout carries the replay output, so logs go to stderr.
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config = TabConfig::from_env().context("failed to load tab config")?;

    // Tabs are single-threaded, so the whole replay runs on one thread.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(run(script_path, config))
}

async fn run(script_path: Option<PathBuf>, config: TabConfig) -> Result<()> {
    let mut runner = ScriptRunner::new(config);
    match script_path {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay(&mut runner, BufReader::new(file)).await
        }
        None => replay(&mut runner, BufReader::new(tokio::io::stdin())).await,
    }
}

async fn replay(runner: &mut ScriptRunner, reader: impl AsyncBufRead + Unpin) -> Result<()> {
    let mut lines = reader.lines();
    let mut line_number = 0;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read script")?,
            _ = tokio::signal::ctrl_c() => {
                info!(target: "tab", "interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        line_number += 1;
        let Some(step) = ScriptStep::parse_line(line_number, &line)? else {
            continue;
        };
        emit(&runner.apply(step)?)?;
    }
    emit(&runner.finish())?;
    info!(
        target: "tab",
        tabs = runner.process().tab_count(),
        visible = ?runner.process().registry().visible_surfaces(),
        "replay finished"
    );
    Ok(())
}

fn emit(messages: &[OutboundMessage]) -> Result<()> {
    for message in messages {
        println!("{}", serde_json::to_string(message)?);
    }
    Ok(())
}
