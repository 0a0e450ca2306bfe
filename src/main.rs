//! # UCT self-play
//!
//! Plays a game of stones-only Go between two instances of the search
//! engine and prints every position. Useful to watch the search at work
//! and to try engine options.
//!
//! ## Usage
//! `cargo run --release -- --size 7 --time 2 --options "policy=ucb1amaf,pondering"`
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uct::games::stones::StonesBoard;
use uct::playout::LightPlayout;
use uct::{Board, Coord, Move, Stone, TimeInfo, UctConfig, UctEngine};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Board size.
    #[clap(short, long, default_value_t = 9)]
    size: usize,

    #[clap(short, long, default_value_t = 7.5)]
    komi: f32,

    /// Thinking budget per move: seconds, or `=N` for N simulations.
    #[clap(short, long, default_value = "=5000")]
    time: TimeInfo,

    /// Worker threads per engine (default: number of CPUs).
    #[clap(short = 'j', long)]
    threads: Option<usize>,

    /// TOML file with engine settings.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Engine options, `key=value,...`, applied after the config file.
    #[clap(short, long, default_value = "")]
    options: String,

    /// Stop after this many moves.
    #[clap(long, default_value_t = 400)]
    max_moves: usize,

    /// Save the final tree of the Black engine as a book.
    #[clap(long)]
    save_book: Option<PathBuf>,
}

fn load_config(args: &Args) -> uct::Result<UctConfig> {
    let mut config = match &args.config {
        Some(path) => UctConfig::load_from_path(path)?,
        None => UctConfig::default(),
    };
    config.apply_options(&args.options)?;
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    Ok(config)
}

fn print_board(board: &StonesBoard, last: Option<Move>) {
    let size = board.size();
    for y in (0..size).rev() {
        let mut row = format!("{:>2} ", y + 1);
        for x in 0..size {
            let c = board.coord(x, y);
            let is_last = last.is_some_and(|m| m.coord == c);
            let cell = match board.at(c) {
                Stone::Black if is_last => "X".bright_red().bold(),
                Stone::Black => "X".bold(),
                Stone::White if is_last => "O".bright_red().bold(),
                Stone::White => "O".bright_white().bold(),
                Stone::None => ".".dimmed(),
            };
            row.push_str(&format!("{} ", cell));
        }
        println!("{}", row);
    }
    let columns: Vec<String> = (0..size)
        .map(|x| board.vertex(board.coord(x, 0)).chars().take(1).collect())
        .collect();
    println!("   {}", columns.join(" "));
}

fn run(args: Args) -> uct::Result<()> {
    let config = load_config(&args)?;
    let new_engine = || {
        UctEngine::from_config(config.clone(), Arc::new(LightPlayout))
    };
    let mut black = new_engine();
    let mut white = new_engine();

    let mut board = StonesBoard::new(args.size, args.komi);
    let mut color = Stone::Black;
    println!(
        "{} {}x{} komi {} budget {}",
        "Self-play".bold().cyan(),
        board.size(),
        board.size(),
        board.komi(),
        args.time
    );

    let mut resigned = None;
    while !board.is_game_over() && board.moves() < args.max_moves {
        let (me, other) = match color {
            Stone::White => (&mut white, &mut black),
            _ => (&mut black, &mut white),
        };
        let coord = me.genmove(&board, args.time, color, false)?;
        let mv = Move::new(coord, color);
        other.notify_play(&board, mv)?;
        if coord == Coord::Resign {
            resigned = Some(color);
            println!("{} {}", color.to_string().bold(), "resigns".red());
            break;
        }

        board.play(mv)?;
        let summary = me
            .result()
            .map(|r| format!("({} playouts, win rate {:.2})", r.playouts, r.value))
            .unwrap_or_default();
        println!(
            "\n{}. {} {} {}",
            board.moves(),
            color.to_string().bold(),
            board.vertex(coord).green(),
            summary.dimmed()
        );
        print_board(&board, Some(mv));
        color = color.other();
    }

    if let Some(path) = &args.save_book {
        let entries = black.save_book(path, 100)?;
        println!("saved {} book entries to {}", entries, path.display());
    }

    let winner = match resigned {
        Some(loser) => loser.other(),
        None => {
            let dead: Vec<Coord> = black
                .dead_group_list(&board)?
                .into_iter()
                .flat_map(|c| board.group_stones(c))
                .collect();
            let score = board.official_score(&dead);
            println!("final score: white leads by {:.1}", score.white_lead);
            if score.white_lead > 0.0 {
                Stone::White
            } else {
                Stone::Black
            }
        }
    };
    println!("{} {}", "Winner:".bold(), winner.to_string().green().bold());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
