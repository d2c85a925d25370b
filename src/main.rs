use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use society_simulator::config::{
    resolve_codec, resolve_http_port, resolve_log_level, resolve_ws_port, SimConfig,
};
use society_simulator::net::{self, Codec};
use society_simulator::simulation::{Simulation, TickRate};
use society_simulator::snapshot;

#[derive(Parser, Debug)]
#[command(
    name = "society-simulator",
    about = "Headless server core for an agent-based society simulation"
)]
struct Cli {
    /// HTTP admin port (overrides SOCIETY_SIM_HTTP_PORT)
    #[arg(long)]
    http_port: Option<u16>,

    /// WebSocket streaming port (overrides SOCIETY_SIM_WS_PORT)
    #[arg(long)]
    ws_port: Option<u16>,

    /// World seed (overrides WORLD_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Initial population to seed
    #[arg(long, default_value_t = 12)]
    population: usize,

    /// Load this snapshot file instead of seeding a fresh world
    #[arg(long)]
    load: Option<PathBuf>,

    /// Start ticking immediately
    #[arg(long, default_value_t = true)]
    autostart: bool,
}

fn spawn_rate_loop(sim: Arc<Mutex<Simulation>>, rate: TickRate, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Ok(mut sim) = sim.lock() {
                if sim.is_running() {
                    sim.tick(rate);
                }
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(resolve_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting society-simulator");

    let mut config = SimConfig::from_env();
    if let Some(seed) = cli.seed {
        config.world_seed = seed;
    }
    let rates = config.rates;
    let http_port = cli.http_port.unwrap_or_else(resolve_http_port);
    let ws_port = cli.ws_port.unwrap_or_else(resolve_ws_port);
    let codec = Codec::new(resolve_codec());

    let mut sim = Simulation::new(config);
    match &cli.load {
        Some(path) => {
            info!("loading snapshot from {}", path.display());
            let loaded = snapshot::load_from_file(path).and_then(|data| sim.import_snapshot(&data));
            if let Err(err) = loaded {
                error!("fatal: could not load snapshot: {}", err);
                std::process::exit(1);
            }
        }
        None => {
            if let Err(err) = sim.seed_world(cli.population) {
                error!("fatal: could not seed world: {}", err);
                std::process::exit(1);
            }
        }
    }
    if cli.autostart {
        sim.start();
    }

    let sim = Arc::new(Mutex::new(sim));

    net::start_http_server(sim.clone(), http_port);
    info!("admin surface at http://127.0.0.1:{}", http_port);

    spawn_rate_loop(sim.clone(), TickRate::Fast, rates.fast_ms);
    spawn_rate_loop(sim.clone(), TickRate::Medium, rates.medium_ms);
    spawn_rate_loop(sim.clone(), TickRate::Slow, rates.slow_ms);
    info!(
        "tick loops running at {}/{}/{} ms",
        rates.fast_ms, rates.medium_ms, rates.slow_ms
    );

    if let Err(err) = net::run_ws_server(sim, ws_port, codec).await {
        error!("fatal: WebSocket server failed: {}", err);
        std::process::exit(1);
    }
}
