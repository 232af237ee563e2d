use anyhow::Context;
use gossip_kv::audit::Outcome;
use gossip_kv::config::ClusterConfig;
use gossip_kv::membership::types::Address;
use gossip_kv::network::Tick;
use gossip_kv::simulation::Simulation;
use gossip_kv::simulation::handlers::router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Args {
    config: ClusterConfig,
    ticks: u64,
    failures: Vec<(Address, Tick)>,
    serve: Option<SocketAddr>,
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage(&args[0]);
        return Ok(());
    }

    let args = parse_args(&args)?;

    match args.serve {
        Some(addr) => serve(args, addr).await,
        None => run_scenario(args),
    }
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {} [--config <file>] [--nodes <n>] [--ticks <n>] [--fail <id:port>@<tick>]... [--serve <addr:port>] [--tick-ms <ms>]",
        program
    );
    eprintln!("Example: {} --nodes 5 --ticks 120 --fail 2:0@40", program);
    eprintln!("Example: {} --nodes 5 --serve 127.0.0.1:8080", program);
}

fn flag_value<'a>(args: &'a [String], i: usize) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", args[i]))
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut config = ClusterConfig::default();
    let mut nodes: Option<usize> = None;
    let mut ticks: u64 = 100;
    let mut failures = Vec::new();
    let mut serve = None;
    let mut tick_ms: u64 = 100;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = flag_value(args, i)?;
                config = ClusterConfig::from_file(path)
                    .with_context(|| format!("loading config from {}", path))?;
                i += 2;
            }
            "--nodes" => {
                nodes = Some(flag_value(args, i)?.parse()?);
                i += 2;
            }
            "--ticks" => {
                ticks = flag_value(args, i)?.parse()?;
                i += 2;
            }
            "--fail" => {
                let raw = flag_value(args, i)?;
                let (node, tick) = raw
                    .split_once('@')
                    .with_context(|| format!("--fail expects <id:port>@<tick>, got {}", raw))?;
                let node: Address = node.parse().map_err(anyhow::Error::msg)?;
                failures.push((node, tick.parse()?));
                i += 2;
            }
            "--serve" => {
                serve = Some(flag_value(args, i)?.parse()?);
                i += 2;
            }
            "--tick-ms" => {
                tick_ms = flag_value(args, i)?.parse()?;
                i += 2;
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    if let Some(n) = nodes {
        config.simulation.nodes = n;
    }
    config.validate()?;

    Ok(Args {
        config,
        ticks,
        failures,
        serve,
        tick_ms,
    })
}

/// Scripted run: converge, write and read one key, apply the scheduled
/// failures and report.
fn run_scenario(args: Args) -> anyhow::Result<()> {
    let mut sim = Simulation::new(args.config)?;
    let audit = sim.audit();

    tracing::info!("Running {} ticks", args.ticks);
    let converged = sim.run_until(args.ticks, Simulation::is_converged);
    tracing::info!("Converged: {} at tick {}", converged, sim.now());

    let client = sim.introducer();
    let create = sim.create(&client, "demo", "hello");
    sim.run(2 * sim.config().replication.rtt);
    let read = sim.read(&Simulation::address_of(sim.nodes().len() - 1), "demo");

    let mut pending = args.failures;
    while sim.now() < args.ticks {
        let now = sim.now();
        pending.retain(|(node, at)| {
            if *at > now {
                return true;
            }
            if !sim.fail_node(node) {
                tracing::warn!("Cannot fail unknown node {}", node);
            }
            false
        });
        sim.step();
    }

    for (label, txn) in [("create", create), ("read", read)] {
        let outcome = txn.and_then(|t| audit.outcome(t));
        match outcome {
            Some(o) if o.outcome == Outcome::Success => {
                tracing::info!("demo {} succeeded (value {:?})", label, o.value);
            }
            Some(_) => tracing::warn!("demo {} failed", label),
            None => tracing::warn!("demo {} never decided", label),
        }
    }

    let stats = sim.stats();
    tracing::info!(
        "Cluster stats at tick {}: {} live nodes, converged={}",
        stats.tick,
        stats.live_nodes,
        stats.converged
    );
    for node in &stats.nodes {
        tracing::info!(
            "  - {} {:?} failed={} members={} keys={} sent={} received={} dropped={}",
            node.address,
            node.phase,
            node.failed,
            node.members,
            node.keys,
            node.network.sent,
            node.network.received,
            node.network.dropped
        );
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

async fn serve(args: Args, addr: SocketAddr) -> anyhow::Result<()> {
    let sim = Simulation::new(args.config)?;
    let audit = sim.audit();
    let sim = Arc::new(Mutex::new(sim));

    // 1. Ticker: drives logical time on a wall-clock interval.
    let ticker = sim.clone();
    let failures = args.failures;
    let tick_ms = args.tick_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        let mut pending = failures;

        loop {
            interval.tick().await;
            let mut sim = ticker.lock().await;
            let now = sim.now();
            pending.retain(|(node, at)| {
                if *at > now {
                    return true;
                }
                sim.fail_node(node);
                false
            });
            sim.step();
        }
    });

    // 2. Stats reporter:
    let reporter = sim.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let stats = reporter.lock().await.stats();
            tracing::info!(
                "Cluster stats at tick {}: {} live nodes, converged={}",
                stats.tick,
                stats.live_nodes,
                stats.converged
            );
        }
    });

    // 3. HTTP server:
    let app = router(sim, audit);

    tracing::info!("HTTP server listening on {}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
