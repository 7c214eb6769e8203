//! Terminal rendering: board drawing, prefixed status lines, search and
//! generation progress, and the statistics tables.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use colored::Colorize;

use mancala_core::board::Board;
use mancala_core::cache::CacheStats;
use mancala_core::constants::*;
use mancala_core::egdb::{EgdbObserver, EgdbStats};
use mancala_core::search::{Prefix, SearchObserver, SolverConfig};
use mancala_core::types::{Depth, Score};

pub const OUTPUT_PREFIX: &str = ">> ";
pub const INPUT_PREFIX: &str = "<< ";
pub const CONFIG_PREFIX: &str = "(C) ";
pub const CHEAT_PREFIX: &str = "(G) ";
pub const PLAY_PREFIX: &str = "(P) ";

pub fn output(prefix: &str, text: &str) {
    let colored_prefix = match prefix {
        CONFIG_PREFIX => prefix.cyan(),
        CHEAT_PREFIX => prefix.yellow(),
        PLAY_PREFIX => prefix.green(),
        _ => prefix.normal(),
    };
    println!("{colored_prefix}{text}");
}

pub fn prefix_str(prefix: Prefix) -> &'static str {
    match prefix {
        Prefix::Config => CONFIG_PREFIX,
        Prefix::Cheat => CHEAT_PREFIX,
        Prefix::Play => PLAY_PREFIX,
    }
}

/// Draws the board with player two's pits on top, sowing direction
/// counter-clockwise. Pits are labeled 1-6 from each player's left.
pub fn render_board(board: &Board) {
    let p2: Vec<String> = (LBOUND_P2..=HBOUND_P2)
        .rev()
        .map(|i| format!("{:>3}", board.cells[i]))
        .collect();
    let p1: Vec<String> = (LBOUND_P1..=HBOUND_P1)
        .map(|i| format!("{:>3}", board.cells[i]))
        .collect();

    println!("        +-----+-----+-----+-----+-----+-----+");
    println!(
        "   P2   | {} |",
        p2.join(" | ")
    );
    println!("+-------+-----+-----+-----+-----+-----+-----+-------+");
    println!(
        "| {:>4}  |                                     |  {:>4} |",
        board.cells[STORE_P2], board.cells[STORE_P1]
    );
    println!("+-------+-----+-----+-----+-----+-----+-----+-------+");
    println!(
        "   P1   | {} |",
        p1.join(" | ")
    );
    println!("        +-----+-----+-----+-----+-----+-----+");

    let mover = if board.color == 1 { "P1" } else { "P2" };
    println!("          to move: {}", mover.bold());
}

fn log_notation(value: u64) -> String {
    if value == 0 {
        String::new()
    } else {
        format!("(~2^{})", 63 - value.leading_zeros())
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Search-side renderer wired into the core's observer callbacks.
pub struct CliObserver {
    progress_lines: AtomicU64,
}

impl CliObserver {
    pub fn new() -> CliObserver {
        CliObserver {
            progress_lines: AtomicU64::new(0),
        }
    }
}

impl SearchObserver for CliObserver {
    fn message(&self, prefix: Prefix, text: &str) {
        output(prefix_str(prefix), text);
    }

    fn progress_start(&self, config: &SolverConfig) {
        self.progress_lines.store(0, Ordering::Relaxed);
        let limit = match (config.depth, config.time_limit) {
            (0, t) if t > 0.0 => format!("{t:.1}s"),
            (0, _) => "unbounded".to_string(),
            (d, _) => format!("depth {d}"),
        };
        output(PLAY_PREFIX, &format!("Thinking... ({limit})"));
    }

    fn progress_update(&self, depth: Depth, best_move: Option<usize>, score: Score, nodes: u64) {
        self.progress_lines.fetch_add(1, Ordering::Relaxed);
        let mv = best_move
            .map(|m| format!("{}", pit_label(m)))
            .unwrap_or_else(|| "-".to_string());
        print!("\r{PLAY_PREFIX}depth {depth:>3} | best {mv} | eval {score:>5} | nodes {nodes:>12}");
        let _ = std::io::stdout().flush();
    }

    fn progress_finish(&self) {
        if self.progress_lines.load(Ordering::Relaxed) > 0 {
            println!();
        }
    }
}

/// Generation progress for the endgame tables.
pub struct CliEgdbObserver;

impl EgdbObserver for CliEgdbObserver {
    fn message(&self, text: &str) {
        output(CONFIG_PREFIX, text);
    }

    fn generation_progress(&self, stones: usize, current: u64, total: u64) {
        let pct = percent(current, total);
        print!("\r{CONFIG_PREFIX}layer {stones:>3}: {pct:>6.2}%");
        let _ = std::io::stdout().flush();
    }

    fn generation_finished(&self) {
        println!();
    }
}

/// A pit index as the player-relative label (1-6) used on the prompt.
pub fn pit_label(pit: usize) -> usize {
    if pit >= LBOUND_P2 {
        pit - LBOUND_P2 + 1
    } else {
        pit + 1
    }
}

pub fn render_cache_stats(stats: &CacheStats) {
    if stats.cache_size == 0 {
        output(CHEAT_PREFIX, "  Cache disabled.");
        return;
    }

    output(
        CHEAT_PREFIX,
        &format!("  Mode:       {} ({} Bytes)", stats.mode, stats.entry_bytes),
    );
    output(
        CHEAT_PREFIX,
        &format!(
            "  Cache size: {:<14}{} ({:.2}% used)",
            stats.cache_size,
            log_notation(stats.cache_size),
            percent(stats.set_entries, stats.cache_size)
        ),
    );
    if stats.has_depth {
        output(
            CHEAT_PREFIX,
            &format!(
                "  Solved:     {:<14}({:.2}% of used)",
                stats.solved_entries,
                percent(stats.solved_entries, stats.set_entries)
            ),
        );
    }

    let shallow = stats.hits - stats.hits_legal;
    output(CHEAT_PREFIX, &format!("  Hits:       {}", stats.hits));
    output(
        CHEAT_PREFIX,
        &format!(
            "    Shallow:  {:<14}({:.2}%)",
            shallow,
            percent(shallow, stats.hits)
        ),
    );
    output(
        CHEAT_PREFIX,
        &format!(
            "    LRU swap: {:<14}({:.2}%)",
            stats.lru_swaps,
            percent(stats.lru_swaps, stats.hits)
        ),
    );

    output(CHEAT_PREFIX, "  Overwrites:");
    output(
        CHEAT_PREFIX,
        &format!("    Improve:  {}", stats.overwrite_improve),
    );
    output(
        CHEAT_PREFIX,
        &format!("    Evict:    {}", stats.overwrite_evict),
    );

    if stats.fail_stones > 0 || stats.fail_range > 0 {
        output(CHEAT_PREFIX, "  Encoding failures:");
        output(CHEAT_PREFIX, &format!("    Stones:   {}", stats.fail_stones));
        output(CHEAT_PREFIX, &format!("    Value:    {}", stats.fail_range));
    }

    output(
        CHEAT_PREFIX,
        &format!(
            "  Bounds:     E {:.2}% | L {:.2}% | U {:.2}%",
            percent(stats.exact_count, stats.set_entries),
            percent(stats.lower_count, stats.set_entries),
            percent(stats.upper_count, stats.set_entries),
        ),
    );

    if stats.has_depth && stats.non_solved > 0 {
        output(
            CHEAT_PREFIX,
            &format!(
                "  Depth:      avg {:.2} | max {}",
                stats.depth_sum as f64 / stats.non_solved as f64,
                stats.max_depth
            ),
        );

        let bins = stats.depth_bins.len() as u32;
        let bin_width = (stats.max_depth as u32 + 1).div_ceil(bins).max(1);
        output(CHEAT_PREFIX, "  Depth range | Count        | Percent");
        for (bin, &count) in stats.depth_bins.iter().enumerate() {
            let lo = bin as u32 * bin_width;
            if lo > stats.max_depth as u32 {
                break;
            }
            let hi = (lo + bin_width - 1).min(stats.max_depth as u32);
            output(
                CHEAT_PREFIX,
                &format!(
                    "  {lo:>4}-{hi:<6} | {count:<12} | {:>6.2}%",
                    percent(count, stats.non_solved)
                ),
            );
        }
    }

    if !stats.chunks.is_empty() {
        output(CHEAT_PREFIX, "  Fragmentation");
        output(CHEAT_PREFIX, "  Chunk type | Start index       | Chunk size");
        for chunk in &stats.chunks {
            output(
                CHEAT_PREFIX,
                &format!(
                    "     {}   | {:>17} | {:>10}",
                    if chunk.set { "Set  " } else { "Unset" },
                    chunk.start,
                    chunk.size
                ),
            );
        }
    }

    let interesting: Vec<usize> = (0..BOARD_CELLS)
        .filter(|&k| k != STORE_P1 && k != STORE_P2 && stats.avg_stones[k] > 0.0)
        .collect();
    if !interesting.is_empty() {
        output(CHEAT_PREFIX, "  Cached stones per pit (avg | max):");
        for k in interesting {
            output(
                CHEAT_PREFIX,
                &format!(
                    "    pit {k:>2}:   {:>6.2} | {:>3}",
                    stats.avg_stones[k], stats.max_stones[k]
                ),
            );
        }
    }
}

pub fn render_egdb_stats(stats: &EgdbStats) {
    if stats.max_stones == 0 {
        output(CHEAT_PREFIX, "  Endgame tables not loaded.");
        return;
    }
    output(
        CHEAT_PREFIX,
        &format!("  Layers:     1..{}", stats.max_stones),
    );
    output(
        CHEAT_PREFIX,
        &format!("  Resident:   {} bytes", stats.resident_bytes),
    );
    output(
        CHEAT_PREFIX,
        &format!(
            "  Probes:     {:<14}hits {} ({:.2}%)",
            stats.probes,
            stats.hits,
            percent(stats.hits, stats.probes)
        ),
    );
}
