mod game;
mod render;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use mancala_core::board::{Board, RuleSet};
use mancala_core::egdb::{BackendKind, Egdb};
use mancala_core::search::{Search, SolverConfig, SolverKind};

use render::{CHEAT_PREFIX, CONFIG_PREFIX, CliEgdbObserver, CliObserver, pit_label};

#[derive(Parser, Debug)]
#[command(name = "mancala-cli", about = "Perfect-play solver for 14-pit sowing games")]
struct Cli {
    #[command(subcommand)]
    command: Option<SubCommands>,
}

#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Evaluate a single position and print the move distribution.
    Analyze {
        /// Position code from `encode`; defaults to the uniform opening.
        #[arg(long)]
        code: Option<String>,

        #[arg(long, default_value_t = 4)]
        stones: u8,

        #[arg(long, default_value = "classic")]
        mode: String,

        #[arg(long, default_value = "local")]
        solver: String,

        /// Depth limit; 0 solves without a depth bound.
        #[arg(long, default_value_t = 0)]
        depth: u32,

        /// Time limit in seconds; 0 solves without a time bound.
        #[arg(long, default_value_t = 0.0)]
        time: f64,

        #[arg(long)]
        clip: bool,

        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Transposition cache size as a power-of-two exponent.
        #[arg(long, default_value_t = 24)]
        cache: u32,

        /// Probe endgame tables up to this many stones in play.
        #[arg(long, default_value_t = 0)]
        egdb: usize,
    },
    /// Generate or load the endgame tables.
    Egdb {
        #[arg(default_value_t = 8)]
        max_stones: usize,

        #[arg(long, default_value = "direct")]
        backend: String,
    },
}

fn parse_backend(name: &str) -> Option<BackendKind> {
    match name {
        "direct" => Some(BackendKind::Direct),
        "mmap" => Some(BackendKind::Mmap),
        "zstd" => Some(BackendKind::BlockCompressed),
        _ => None,
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match args.command {
        None => repl::run(),
        Some(SubCommands::Egdb {
            max_stones,
            backend,
        }) => {
            let Some(backend) = parse_backend(&backend) else {
                eprintln!("unknown backend \"{backend}\" (direct, mmap, zstd)");
                return ExitCode::FAILURE;
            };
            let mut egdb = Egdb::open("EGDB", backend);
            match egdb.ensure(max_stones, &CliEgdbObserver) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("endgame table build failed: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(SubCommands::Analyze {
            code,
            stones,
            mode,
            solver,
            depth,
            time,
            clip,
            threads,
            cache,
            egdb,
        }) => analyze(
            code, stones, &mode, &solver, depth, time, clip, threads, cache, egdb,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze(
    code: Option<String>,
    stones: u8,
    mode: &str,
    solver: &str,
    depth: u32,
    time: f64,
    clip: bool,
    threads: usize,
    cache: u32,
    egdb_stones: usize,
) -> ExitCode {
    let rules = match mode {
        "classic" => RuleSet::Classic,
        "avalanche" => RuleSet::Avalanche,
        _ => {
            eprintln!("unknown mode \"{mode}\" (classic, avalanche)");
            return ExitCode::FAILURE;
        }
    };
    let solver = match solver {
        "local" => SolverKind::LocalCached,
        "global" => SolverKind::GlobalUncached,
        _ => {
            eprintln!("unknown solver \"{solver}\" (local, global)");
            return ExitCode::FAILURE;
        }
    };

    let board = match &code {
        Some(code) => match Board::decode(code) {
            Some(board) => board,
            None => {
                eprintln!("invalid position code");
                return ExitCode::FAILURE;
            }
        },
        None => Board::uniform(stones),
    };

    let config = SolverConfig {
        solver,
        depth,
        time_limit: time,
        clip,
        threads,
        progress: true,
        ..SolverConfig::default()
    };

    let mut search = Search::new();
    search.set_observer(Arc::new(CliObserver::new()));
    search.cache_mut().set_size_pow(cache);

    if egdb_stones > 0 {
        let mut egdb = Egdb::open("EGDB", BackendKind::Direct);
        egdb.set_stones_per_pit(stones as u32);
        if let Err(err) = egdb.ensure(egdb_stones, &CliEgdbObserver) {
            eprintln!("endgame table build failed: {err}");
            return ExitCode::FAILURE;
        }
        search.set_egdb(Some(egdb));
    }

    render::render_board(&board);

    let result = match search.solve(&board, rules, &config) {
        Ok(result) => result,
        Err(err) => {
            render::output(CONFIG_PREFIX, &format!("Fatal: {err}"));
            return ExitCode::FAILURE;
        }
    };

    render::output(
        CHEAT_PREFIX,
        &format!(
            "eval {}{} | best pit {} | depth {} | {} nodes | {:.2}s",
            result.evaluation,
            if result.solved { " (solved)" } else { "" },
            result.best_move.map(pit_label).unwrap_or(0),
            result.depth,
            result.nodes,
            result.time,
        ),
    );

    match search.distribution(&board, rules, &config) {
        Ok(dist) => {
            for (offset, &score) in dist.scores.iter().enumerate() {
                let text = if score == mancala_core::search::Distribution::EMPTY {
                    "empty".to_string()
                } else {
                    format!("{score}")
                };
                render::output(CHEAT_PREFIX, &format!("  pit {}: {text}", offset + 1));
            }
        }
        Err(err) => {
            render::output(CONFIG_PREFIX, &format!("Fatal: {err}"));
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
