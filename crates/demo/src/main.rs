//! Call-tree profiler demo
//!
//! Runs two jobs, each with its own named profiler from the global registry.
//! Inside a job, code finds its profiler through `Registry::current`, so no
//! profiler reference is passed down the call chain.
//!
//! Set `RUST_LOG=calltree=info` to see each top-level region as it stops.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use calltree::{profile_scope, ProfilerConfig, Registry, ReportOptions, SortKey};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Regions of one job with the work each stands for, in milliseconds.
const WORKLOAD: [(&str, u64); 3] = [("fast", 200), ("medium", 300), ("slow", 500)];

fn sleep_milliseconds(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

fn run() -> anyhow::Result<()> {
    let profiler = Registry::global()
        .current()
        .context("no profiler has been requested yet")?;
    profile_scope!(profiler, "run");

    for (name, repeats) in WORKLOAD {
        let mut region = profiler.push(name);
        sleep_milliseconds(repeats);
        region += repeats;
    }
    Ok(())
}

fn job(name: &str, description: &str) -> anyhow::Result<()> {
    let config = ProfilerConfig::new(description)
        .with_cpu(true)
        .with_stop_print(1)
        .with_report(ReportOptions::default().with_verbosity(2).with_sort(SortKey::Wall));
    let profiler = Registry::global().instance_with_config(name, config);

    tracing::info!(job = name, "starting job");
    run()?;

    println!("{}", profiler);
    Registry::global().reset(name);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    job("job 1", "Singleton Example: job 1")?;
    job("job 2", "Singleton Example: job 2")?;
    Ok(())
}
