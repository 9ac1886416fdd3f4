use std::io::{self, Write};

use aero_capture_resolve::config::Config;
use aero_capture_resolve::{load_graph, resolve_graph};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let graph = load_graph(&config.graph)?;
    tracing::info!(
        records = graph.records.len(),
        path = %config.graph.display(),
        "loaded record graph"
    );
    let chunks = resolve_graph(&graph, &config.roots, config.all_records)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if config.json {
        let ids: Vec<u64> = chunks.iter().map(|id| id.0).collect();
        serde_json::to_writer(&mut out, &ids).context("writing chunk ids")?;
        writeln!(out)?;
    } else {
        for id in &chunks {
            writeln!(out, "{}", id.0)?;
        }
    }
    Ok(())
}
