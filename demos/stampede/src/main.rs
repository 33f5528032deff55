use clap::Parser;
use futures::future::join_all;
use keyflight::{Registry, RegistryConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stampede", about = "Simulate a cache stampede against a coalescing registry")]
struct Args {
    /// Distinct keys requested in every round.
    #[arg(long, default_value_t = 1000)]
    keys: usize,
    /// Concurrent callers asking for each key.
    #[arg(long, default_value_t = 8)]
    callers_per_key: usize,
    /// Simulated backend latency.
    #[arg(long, default_value_t = 25)]
    latency_ms: u64,
    /// Fail the backend call for every N-th key (0 disables failures).
    #[arg(long, default_value_t = 0)]
    fail_every: usize,
    #[arg(long, default_value_t = 2)]
    rounds: usize,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
#[error("backend rejected key {0}")]
struct BackendError(usize);

#[derive(Error, Debug)]
enum StampedeError {
    #[error("key {key} reached the backend {calls} times in round {round}")]
    Duplicated { key: usize, calls: usize, round: usize },
    #[error("{0} keys still in flight after round {1}")]
    Leaked(usize, usize),
}

/// Slow keyed backend that counts how often each key is requested.
struct Backend {
    latency: Duration,
    fail_every: usize,
    calls: Vec<AtomicUsize>,
}

impl Backend {
    fn new(keys: usize, latency: Duration, fail_every: usize) -> Self {
        Self { latency, fail_every, calls: (0..keys).map(|_| AtomicUsize::new(0)).collect() }
    }

    async fn fetch(self: Arc<Self>, key: usize) -> Result<String, BackendError> {
        tokio::time::sleep(self.latency).await;
        let call = self.calls[key].fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && key % self.fail_every == 0 {
            return Err(BackendError(key));
        }
        Ok(format!("{key}-{call}"))
    }

    fn snapshot(&self) -> Vec<usize> {
        self.calls.iter().map(|calls| calls.load(Ordering::SeqCst)).collect()
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "stampede=debug,keyflight=debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let backend =
        Arc::new(Backend::new(args.keys, Duration::from_millis(args.latency_ms), args.fail_every));
    let registry = Registry::<usize, String, BackendError>::with_config(RegistryConfig {
        initial_capacity: args.keys,
        label: "stampede".into(),
    });
    tracing::info!(
        keys = args.keys,
        callers_per_key = args.callers_per_key,
        rounds = args.rounds,
        "starting stampede"
    );

    for round in 1..=args.rounds {
        let before = backend.snapshot();
        let started = Instant::now();

        let mut pending = Vec::with_capacity(args.keys * args.callers_per_key);
        for key in 0..args.keys {
            for _ in 0..args.callers_per_key {
                let backend = Arc::clone(&backend);
                pending.push(registry.resolve(key, move |key| backend.fetch(key)));
            }
        }
        let outcomes = join_all(pending).await;

        let failures = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        let values =
            outcomes.iter().filter_map(|outcome| outcome.as_ref().ok()).collect::<HashSet<_>>();
        let after = backend.snapshot();
        let invocations = after.iter().sum::<usize>() - before.iter().sum::<usize>();
        tracing::info!(
            round,
            invocations,
            distinct_values = values.len(),
            failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "round finished"
        );

        if let Some((key, calls)) = after
            .iter()
            .zip(&before)
            .map(|(after, before)| after - before)
            .enumerate()
            .find(|(_, calls)| *calls > 1)
        {
            return Err(StampedeError::Duplicated { key, calls, round }.into());
        }
        if registry.in_flight() > 0 {
            return Err(StampedeError::Leaked(registry.in_flight(), round).into());
        }
    }
    Ok(())
}
