//! SweepCache - An In-Process TTL Cache
//!
//! This is a small driver for the library. It fills a cache with short-lived
//! keys from several threads, starts the expiry sweeper, and reports how the
//! entries are reclaimed over time.

use bytes::Bytes;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sweepcache::{Cache, Sweeper, SweeperConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Driver configuration
struct Config {
    /// Number of short-lived keys to write
    keys: usize,
    /// TTL of the short-lived keys
    ttl: Duration,
    /// Writer threads used to populate the cache
    writers: usize,
    /// Sweeper settings
    sweeper: SweeperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keys: 10_000,
            ttl: Duration::from_secs(1),
            writers: 4,
            sweeper: SweeperConfig::default().with_interval(Duration::from_millis(500)),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--keys" | "-k" => {
                    config.keys = parse_value(&args, i, "--keys");
                    i += 2;
                }
                "--ttl-ms" | "-t" => {
                    config.ttl = Duration::from_millis(parse_value(&args, i, "--ttl-ms"));
                    i += 2;
                }
                "--writers" => {
                    config.writers = parse_value(&args, i, "--writers");
                    i += 2;
                }
                "--interval-ms" | "-i" => {
                    config.sweeper.interval =
                        Duration::from_millis(parse_value(&args, i, "--interval-ms"));
                    i += 2;
                }
                "--workers" | "-w" => {
                    config.sweeper.workers = parse_value(&args, i, "--workers");
                    i += 2;
                }
                "--verify" => {
                    config.sweeper.verify_before_delete = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("SweepCache version {}", sweepcache::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

/// Parses the value following the flag at `i`, exiting on failure.
fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", flag, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
SweepCache - An In-Process TTL Cache

USAGE:
    sweepcache [OPTIONS]

OPTIONS:
    -k, --keys <N>            Short-lived keys to write (default: 10000)
    -t, --ttl-ms <MS>         TTL of those keys in milliseconds (default: 1000)
        --writers <N>         Writer threads (default: 4)
    -i, --interval-ms <MS>    Sweep interval in milliseconds (default: 500)
    -w, --workers <N>         Deletion workers (default: 4)
        --verify              Re-check expiry before each sweeper delete
    -v, --version             Print version information
    -h, --help                Print this help message

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=sweepcache=debug) for per-cycle sweeper output.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("SweepCache v{}", sweepcache::VERSION);

    let cache: Arc<Cache<Bytes>> = Arc::new(Cache::new());

    // One key that outlives the whole run
    cache.set("persistent", Bytes::from("still here"), Duration::from_secs(3600));

    populate(&cache, &config);
    info!(
        entries = cache.len(),
        ttl_ms = config.ttl.as_millis(),
        "Cache populated"
    );

    let sweeper = Sweeper::start(Arc::clone(&cache), config.sweeper.clone())?;

    // Wait for the TTL plus a couple of sweep cycles, or Ctrl+C
    let deadline = config.ttl + config.sweeper.interval * 3;
    tokio::select! {
        _ = report_until_drained(&cache, deadline) => {}
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping sweeper...");
        }
    }

    sweeper.stop();

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        sets = stats.sets,
        gets = stats.gets,
        hits = stats.hits,
        misses = stats.misses,
        swept = stats.swept,
        "Final cache statistics"
    );

    if cache.get("persistent").is_none() {
        warn!("Long-lived key went missing");
    }

    Ok(())
}

/// Writes `config.keys` short-lived entries from `config.writers` threads.
fn populate(cache: &Arc<Cache<Bytes>>, config: &Config) {
    let writers = config.writers.max(1);
    let per_writer = config.keys.div_ceil(writers);
    let ttl = config.ttl;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let cache = Arc::clone(cache);
            thread::spawn(move || {
                let value = Bytes::from("value");
                for n in 0..per_writer {
                    cache.set(format!("key:{}:{}", w, n), value.clone(), ttl);
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            warn!("Writer thread panicked");
        }
    }
}

/// Logs the cache size periodically until only live entries remain or `deadline` passes.
async fn report_until_drained(cache: &Cache<Bytes>, deadline: Duration) {
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        ticker.tick().await;

        let stats = cache.stats();
        info!(
            entries = stats.entries,
            swept = stats.swept,
            elapsed_ms = started.elapsed().as_millis(),
            "Sweep progress"
        );

        if stats.entries <= 1 {
            info!("All expired entries reclaimed");
            return;
        }
        if started.elapsed() >= deadline {
            warn!(
                remaining = stats.entries,
                "Deadline reached before every expired entry was reclaimed"
            );
            return;
        }
    }
}
