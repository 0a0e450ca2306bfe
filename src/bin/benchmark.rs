use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use uct::games::stones::StonesBoard;
use uct::playout::LightPlayout;
use uct::{Stone, TimeInfo, UctConfig, UctEngine};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Board size (default: 9)
    #[arg(long, default_value_t = 9)]
    board_size: usize,

    /// Search duration in seconds (default: 5)
    #[arg(long, default_value_t = 5.0)]
    duration: f64,

    /// Number of worker threads (default: number of CPUs)
    #[arg(long)]
    threads: Option<usize>,

    /// Tree memory in MiB (default: 600 on 64-bit)
    #[arg(long)]
    max_tree_size: Option<usize>,

    /// Engine options, `key=value,...`
    #[arg(long, default_value = "")]
    options: String,

    /// Also run with a single thread to report the parallel speedup.
    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    speedup: bool,
}

fn main() -> uct::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let mut config = UctConfig::default();
    config.apply_options(&args.options)?;
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(size) = args.max_tree_size {
        config.max_tree_size = size;
    }
    // Stop on the clock only.
    config.sure_win_threshold = f32::INFINITY;
    config.max_maintime_ratio = 1.0;

    println!("Parallel UCT - Benchmark Tool");
    println!("=============================");
    println!("Board: {}x{}", args.board_size, args.board_size);
    println!("Duration: {} seconds", args.duration);
    println!("Threads: {}", config.threads);
    println!("Policy: {:?}", config.policy);
    println!("Max Tree Size: {} MiB", config.max_tree_size);
    println!("-----------------------------");

    #[cfg(debug_assertions)]
    println!("WARNING: Running in debug mode. Performance will be significantly lower.\nUse --release for accurate benchmarks.\n");

    let time: TimeInfo = args.duration.to_string().parse()?;
    let full = bench(&config, args.board_size, time)?;
    print_stats(&format!("{} threads", config.threads), &full);

    if args.speedup && config.threads > 1 {
        let single = bench(
            &UctConfig {
                threads: 1,
                ..config.clone()
            },
            args.board_size,
            time,
        )?;
        print_stats("1 thread", &single);
        if single.games > 0 {
            println!(
                "Speedup: {:.2}x",
                full.games_per_sec() / single.games_per_sec()
            );
        }
    }
    Ok(())
}

struct BenchStats {
    games: u32,
    nodes: usize,
    duration: Duration,
}

impl BenchStats {
    fn games_per_sec(&self) -> f64 {
        self.games as f64 / self.duration.as_secs_f64()
    }
}

fn bench(config: &UctConfig, size: usize, time: TimeInfo) -> uct::Result<BenchStats> {
    let mut engine = UctEngine::from_config(config.clone(), Arc::new(LightPlayout));
    let board = StonesBoard::new(size, 7.5);
    let start = Instant::now();
    engine.best_moves(&board, time, Stone::Black, 1)?;
    let duration = start.elapsed();
    let (games, nodes) = engine
        .last_search()
        .map_or((0, 0), |s| (s.games, s.nodes));
    Ok(BenchStats {
        games,
        nodes,
        duration,
    })
}

fn print_stats(name: &str, stats: &BenchStats) {
    let secs = stats.duration.as_secs_f64();
    println!("{} Results:", name);
    println!("  Games: {}", stats.games);
    println!("  Tree Nodes: {}", stats.nodes);
    println!("  Time: {:.3}s", secs);
    println!("  GPS: {:.0} games/sec", stats.games_per_sec());
    println!("  NPS: {:.0} nodes/sec", stats.nodes as f64 / secs);
}
