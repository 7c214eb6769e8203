//! The interactive REPL: a configuration prompt and a playing prompt.
//!
//! Configuration commands shape `GameSettings` and `SolverConfig`; `start`
//! switches into the playing loop where moves, analysis, and board editing
//! happen. `menu` drops back out.

use std::process::ExitCode;
use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use mancala_core::board::{Board, RuleSet};
use mancala_core::cache;
use mancala_core::egdb::{BackendKind, Egdb};
use mancala_core::search::{Search, SolverConfig, SolverKind, trace_root};

use crate::game::{Agent, Distribution, GameSettings, GameState, absolute_pit};
use crate::render::{
    self, CHEAT_PREFIX, CONFIG_PREFIX, CliEgdbObserver, CliObserver, INPUT_PREFIX, OUTPUT_PREFIX,
    PLAY_PREFIX, pit_label,
};

const EGDB_DIR: &str = "EGDB";

pub struct Repl {
    settings: GameSettings,
    solver: SolverConfig,
    autoplay: bool,
    search: Search,
    game: Option<GameState>,
}

enum Flow {
    Continue,
    Quit,
}

pub fn run() -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("failed to open terminal: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut repl = Repl::new();
    render::output(OUTPUT_PREFIX, "mancala solver. Type \"help\" for commands.");

    loop {
        match editor.readline(INPUT_PREFIX) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(input);
                match repl.dispatch(input) {
                    Flow::Continue => {}
                    Flow::Quit => return ExitCode::SUCCESS,
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                return ExitCode::SUCCESS;
            }
            Err(err) => {
                eprintln!("input error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}

impl Repl {
    pub fn new() -> Repl {
        let mut search = Search::new();
        search.set_observer(Arc::new(CliObserver::new()));
        Repl {
            settings: GameSettings::default(),
            solver: SolverConfig {
                progress: true,
                ..SolverConfig::default()
            },
            autoplay: true,
            search,
            game: None,
        }
    }

    fn dispatch(&mut self, input: &str) -> Flow {
        if self.game.is_some() {
            self.handle_playing(input)
        } else {
            self.handle_config(input)
        }
    }

    // ----- configuration prompt -----

    fn handle_config(&mut self, input: &str) -> Flow {
        let mut parts = input.split_whitespace();
        let verb = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match verb {
            "help" => self.config_help(),
            "quit" => return Flow::Quit,
            "display" => self.display_settings(),
            "start" => self.start_game(),
            "stones" => self.set_stones(&args),
            "mode" => self.set_mode(&args),
            "depth" => self.set_depth(&args),
            "time" => self.set_time(&args),
            "cache" => self.set_cache(&args),
            "solver" => self.set_solver(&args),
            "clip" => self.set_clip(&args),
            "threads" => self.set_threads(&args),
            "player" => self.set_player(&args),
            "autoplay" => self.set_autoplay(&args),
            "seed" => self.set_seed(&args),
            "distribution" => self.set_distribution(&args),
            "egdb" => self.build_egdb(&args),
            _ => render::output(
                OUTPUT_PREFIX,
                &format!("Unknown command \"{verb}\". Type \"help\" for all commands."),
            ),
        }
        Flow::Continue
    }

    fn config_help(&self) {
        for line in [
            "start                      begin playing with the current settings",
            "display                    show the current configuration",
            "stones N                   stones per pit (1-18)",
            "mode classic|avalanche     sowing rules",
            "distribution uniform|random  start layout",
            "seed N                     seed for random layouts and agents",
            "player 1|2 human|random|ai side assignment",
            "autoplay true|false        advance non-human turns automatically",
            "depth N                    search depth limit (0 = unlimited)",
            "time X                     search time limit in seconds (0 = unlimited)",
            "solver local|global        cached or uncached solver",
            "clip true|false            null-window (sign only) search",
            "threads N                  search threads",
            "cache t|s|n|l|e|POW        transposition cache size (2^POW entries)",
            "egdb N [direct|mmap|zstd]  load or generate endgame tables",
            "quit                       leave",
        ] {
            render::output(CONFIG_PREFIX, line);
        }
    }

    fn display_settings(&self) {
        let s = &self.settings;
        render::output(
            CONFIG_PREFIX,
            &format!(
                "game: {} stones, {} layout, {} rules, start {}",
                s.stones,
                match s.distribution {
                    Distribution::Uniform => "uniform",
                    Distribution::Random => "random",
                },
                s.rules.name(),
                if s.start_color == 1 { "P1" } else { "P2" },
            ),
        );
        render::output(
            CONFIG_PREFIX,
            &format!(
                "players: P1 {} / P2 {}, autoplay {}",
                s.player1.name(),
                s.player2.name(),
                self.autoplay
            ),
        );
        render::output(
            CONFIG_PREFIX,
            &format!(
                "solver: {}, depth {}, time {}, clip {}, threads {}",
                match self.solver.solver {
                    SolverKind::LocalCached => "local",
                    SolverKind::GlobalUncached => "global",
                },
                self.solver.depth,
                self.solver.time_limit,
                self.solver.clip,
                self.solver.threads,
            ),
        );
        render::output(
            CONFIG_PREFIX,
            &format!(
                "cache: 2^{} entries requested, active mode {}",
                self.search.cache().requested_size_pow(),
                self.search.cache().mode_name(),
            ),
        );
        if let Some(egdb) = self.search.egdb() {
            render::output(
                CONFIG_PREFIX,
                &format!("egdb: layers 1..{}", egdb.loaded_max_stones()),
            );
        }
    }

    fn start_game(&mut self) {
        if let Some(egdb) = self.search.egdb_mut() {
            egdb.set_stones_per_pit(self.settings.stones as u32);
        }
        let game = GameState::new(&self.settings);
        render::render_board(&game.board);
        self.game = Some(game);
        render::output(PLAY_PREFIX, "Game on. Type \"help\" for playing commands.");
        self.advance_agents();
    }

    fn set_stones(&mut self, args: &[&str]) {
        match args.first().and_then(|a| a.parse::<u8>().ok()) {
            Some(n) if (1..=18).contains(&n) => {
                self.settings.stones = n;
                render::output(CONFIG_PREFIX, &format!("stones per pit set to {n}"));
            }
            _ => render::output(CONFIG_PREFIX, "stones expects a number between 1 and 18"),
        }
    }

    fn set_mode(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"classic") => self.settings.rules = RuleSet::Classic,
            Some(&"avalanche") => self.settings.rules = RuleSet::Avalanche,
            _ => {
                render::output(CONFIG_PREFIX, "mode expects classic or avalanche");
                return;
            }
        }
        render::output(
            CONFIG_PREFIX,
            &format!("rules set to {}", self.settings.rules.name()),
        );
    }

    fn set_depth(&mut self, args: &[&str]) {
        match args.first().and_then(|a| a.parse::<u32>().ok()) {
            Some(depth) => {
                self.solver.depth = depth;
                render::output(CONFIG_PREFIX, &format!("depth limit set to {depth}"));
            }
            None => render::output(CONFIG_PREFIX, "depth expects a number"),
        }
    }

    fn set_time(&mut self, args: &[&str]) {
        match args.first().and_then(|a| a.parse::<f64>().ok()) {
            Some(time) if time >= 0.0 => {
                self.solver.time_limit = time;
                render::output(CONFIG_PREFIX, &format!("time limit set to {time}s"));
            }
            _ => render::output(CONFIG_PREFIX, "time expects a non-negative number"),
        }
    }

    fn set_cache(&mut self, args: &[&str]) {
        let pow = match args.first() {
            Some(&"t") => Some(cache::TINY_SIZE_POW),
            Some(&"s") => Some(cache::SMALL_SIZE_POW),
            Some(&"n") => Some(cache::NORMAL_SIZE_POW),
            Some(&"l") => Some(cache::LARGE_SIZE_POW),
            Some(&"e") => Some(cache::EXTREME_SIZE_POW),
            Some(other) => other.parse::<u32>().ok().filter(|&p| p <= 30),
            None => None,
        };
        match pow {
            Some(pow) => {
                self.search.cache_mut().set_size_pow(pow);
                render::output(CONFIG_PREFIX, &format!("cache set to 2^{pow} entries"));
            }
            None => render::output(
                CONFIG_PREFIX,
                "cache expects t, s, n, l, e, or a power of two exponent (0-30)",
            ),
        }
    }

    fn set_solver(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"local") => self.solver.solver = SolverKind::LocalCached,
            Some(&"global") => self.solver.solver = SolverKind::GlobalUncached,
            _ => {
                render::output(CONFIG_PREFIX, "solver expects local or global");
                return;
            }
        }
        render::output(CONFIG_PREFIX, "solver updated");
    }

    fn set_clip(&mut self, args: &[&str]) {
        match parse_bool(args.first()) {
            Some(value) => {
                self.solver.clip = value;
                render::output(CONFIG_PREFIX, &format!("clip set to {value}"));
            }
            None => render::output(CONFIG_PREFIX, "clip expects true or false"),
        }
    }

    fn set_threads(&mut self, args: &[&str]) {
        match args.first().and_then(|a| a.parse::<usize>().ok()) {
            Some(n) if n >= 1 => {
                self.solver.threads = n;
                render::output(CONFIG_PREFIX, &format!("threads set to {n}"));
            }
            _ => render::output(CONFIG_PREFIX, "threads expects a number >= 1"),
        }
    }

    fn set_player(&mut self, args: &[&str]) {
        let agent = match args.get(1) {
            Some(&"human") => Agent::Human,
            Some(&"random") => Agent::Random,
            Some(&"ai") => Agent::Ai,
            _ => {
                render::output(CONFIG_PREFIX, "player expects: player 1|2 human|random|ai");
                return;
            }
        };
        match args.first() {
            Some(&"1") => self.settings.player1 = agent,
            Some(&"2") => self.settings.player2 = agent,
            _ => {
                render::output(CONFIG_PREFIX, "player expects: player 1|2 human|random|ai");
                return;
            }
        }
        render::output(CONFIG_PREFIX, &format!("player set to {}", agent.name()));
    }

    fn set_autoplay(&mut self, args: &[&str]) {
        match parse_bool(args.first()) {
            Some(value) => {
                self.autoplay = value;
                render::output(CONFIG_PREFIX, &format!("autoplay set to {value}"));
            }
            None => render::output(CONFIG_PREFIX, "autoplay expects true or false"),
        }
    }

    fn set_seed(&mut self, args: &[&str]) {
        match args.first().and_then(|a| a.parse::<u64>().ok()) {
            Some(seed) => {
                self.settings.seed = seed;
                render::output(CONFIG_PREFIX, &format!("seed set to {seed}"));
            }
            None => render::output(CONFIG_PREFIX, "seed expects a number"),
        }
    }

    fn set_distribution(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"uniform") => self.settings.distribution = Distribution::Uniform,
            Some(&"random") => self.settings.distribution = Distribution::Random,
            _ => {
                render::output(CONFIG_PREFIX, "distribution expects uniform or random");
                return;
            }
        }
        render::output(CONFIG_PREFIX, "distribution updated");
    }

    fn build_egdb(&mut self, args: &[&str]) {
        let Some(max_stones) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
            render::output(CONFIG_PREFIX, "egdb expects a maximum stone count");
            return;
        };
        let backend = match args.get(1) {
            Some(&"mmap") => BackendKind::Mmap,
            Some(&"zstd") => BackendKind::BlockCompressed,
            Some(&"direct") | None => BackendKind::Direct,
            Some(other) => {
                render::output(
                    CONFIG_PREFIX,
                    &format!("unknown egdb backend \"{other}\" (direct, mmap, zstd)"),
                );
                return;
            }
        };

        let mut egdb = Egdb::open(EGDB_DIR, backend);
        egdb.set_stones_per_pit(self.settings.stones as u32);
        match egdb.ensure(max_stones, &CliEgdbObserver) {
            Ok(()) => self.search.set_egdb(Some(egdb)),
            Err(err) => {
                render::output(CONFIG_PREFIX, &format!("endgame table build failed: {err}"));
            }
        }
    }

    // ----- playing prompt -----

    fn handle_playing(&mut self, input: &str) -> Flow {
        let mut parts = input.split_whitespace();
        let verb = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        // A bare pit number is a move.
        if let Ok(label) = verb.parse::<usize>() {
            self.human_move(label);
            return Flow::Continue;
        }

        match verb {
            "help" => self.playing_help(),
            "quit" => return Flow::Quit,
            "menu" => {
                self.game = None;
                render::output(CONFIG_PREFIX, "Back in the configuration menu.");
            }
            "render" | "display" => {
                let game = self.game.as_ref().expect("playing mode");
                render::render_board(&game.board);
            }
            "step" => {
                self.step_once();
            }
            "undo" => {
                let game = self.game.as_mut().expect("playing mode");
                if game.undo() {
                    render::render_board(&game.board);
                } else {
                    render::output(PLAY_PREFIX, "Nothing to undo.");
                }
            }
            "switch" => {
                let game = self.game.as_mut().expect("playing mode");
                game.board.color = -game.board.color;
                render::render_board(&game.board);
            }
            "edit" => self.edit_cell(&args),
            "encode" => {
                let game = self.game.as_ref().expect("playing mode");
                render::output(PLAY_PREFIX, &game.board.encode());
            }
            "load" => self.load_board(&args),
            "analyze" => self.analyze(),
            "trace" => self.trace(),
            "stats" => self.show_stats(),
            _ => render::output(
                OUTPUT_PREFIX,
                &format!("Unknown command \"{verb}\". Type \"help\" for all commands."),
            ),
        }
        Flow::Continue
    }

    fn playing_help(&self) {
        for line in [
            "1-6            sow from that pit",
            "step           let the agent to move act once",
            "render         draw the board",
            "undo           take back the last move",
            "switch         flip the side to move",
            "edit P IDX V   set player P's pit IDX (1-6) to V stones",
            "encode         print the position code",
            "load CODE      restore a position code",
            "analyze        evaluate every move from this position",
            "trace          principal variation of the last search",
            "stats          cache and endgame table statistics",
            "menu           back to configuration",
            "quit           leave",
        ] {
            render::output(PLAY_PREFIX, line);
        }
    }

    fn human_move(&mut self, label: usize) {
        let game = self.game.as_mut().expect("playing mode");
        if game.is_over() {
            render::output(PLAY_PREFIX, "The game is over; \"menu\" to reconfigure.");
            return;
        }

        let Some(pit) = absolute_pit(&game.board, label) else {
            render::output(PLAY_PREFIX, "Moves are pit numbers 1-6.");
            return;
        };
        if !game.board.is_legal(pit) {
            render::output(PLAY_PREFIX, "That pit is empty.");
            return;
        }

        game.apply(pit);
        render::render_board(&game.board);
        if self.autoplay {
            self.advance_agents();
        }
        if let Some(game) = &self.game
            && game.is_over()
        {
            game.announce_result();
        }
    }

    fn step_once(&mut self) {
        let game = self.game.as_mut().expect("playing mode");
        if game.is_over() {
            game.announce_result();
            return;
        }
        if game.step(&self.settings, &mut self.search, &self.solver) {
            render::render_board(&game.board);
        } else {
            render::output(PLAY_PREFIX, "A human is to move; enter a pit number.");
        }
    }

    /// Runs random/ai turns until a human is to move or the game ends.
    fn advance_agents(&mut self) {
        loop {
            let game = self.game.as_mut().expect("playing mode");
            if game.is_over() {
                game.announce_result();
                break;
            }
            if self.settings.agent_for(game.board.color) == Agent::Human {
                break;
            }
            if !game.step(&self.settings, &mut self.search, &self.solver) {
                break;
            }
            render::render_board(&self.game.as_ref().expect("playing mode").board);
        }
    }

    fn edit_cell(&mut self, args: &[&str]) {
        let game = self.game.as_mut().expect("playing mode");
        let parsed = (
            args.first().and_then(|a| a.parse::<usize>().ok()),
            args.get(1).and_then(|a| a.parse::<usize>().ok()),
            args.get(2).and_then(|a| a.parse::<u8>().ok()),
        );
        match parsed {
            (Some(player @ 1..=2), Some(idx @ 1..=6), Some(value)) => {
                let cell = if player == 1 {
                    idx - 1
                } else {
                    mancala_core::constants::LBOUND_P2 + idx - 1
                };
                game.history.push(game.board);
                game.board.cells[cell] = value;
                render::render_board(&game.board);
            }
            _ => render::output(PLAY_PREFIX, "edit expects: edit 1|2 IDX(1-6) VALUE"),
        }
    }

    fn load_board(&mut self, args: &[&str]) {
        let game = self.game.as_mut().expect("playing mode");
        match args.first().and_then(|code| Board::decode(code)) {
            Some(board) => {
                game.history.push(game.board);
                game.board = board;
                render::render_board(&game.board);
            }
            None => render::output(PLAY_PREFIX, "load expects a valid position code"),
        }
    }

    fn analyze(&mut self) {
        let board = self.game.as_ref().expect("playing mode").board;
        let rules = self.game.as_ref().expect("playing mode").rules;

        let result = match self.search.solve(&board, rules, &self.solver) {
            Ok(result) => result,
            Err(err) => {
                render::output(CONFIG_PREFIX, &format!("Fatal: {err}"));
                std::process::exit(1);
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

        let dist = match self.search.distribution(&board, rules, &self.solver) {
            Ok(dist) => dist,
            Err(err) => {
                render::output(CONFIG_PREFIX, &format!("Fatal: {err}"));
                std::process::exit(1);
            }
        };
        for (offset, &score) in dist.scores.iter().enumerate() {
            let text = if score == mancala_core::search::Distribution::EMPTY {
                "empty".to_string()
            } else {
                format!("{score}")
            };
            render::output(CHEAT_PREFIX, &format!("  pit {}: {text}", offset + 1));
        }
        if !dist.solved {
            render::output(CHEAT_PREFIX, "  (distribution not solved to terminal)");
        }

        self.game.as_mut().expect("playing mode").last_result = Some((board, result));
    }

    fn trace(&mut self) {
        let game = self.game.as_ref().expect("playing mode");
        let Some((board, result)) = &game.last_result else {
            render::output(PLAY_PREFIX, "No completed search to trace; run \"analyze\".");
            return;
        };

        let trace = trace_root(board, game.rules, result.evaluation, result.depth);
        let line = trace.line();
        if line.is_empty() {
            render::output(CHEAT_PREFIX, "Trace: (no moves)");
            return;
        }
        let rendered: Vec<String> = line.iter().map(|&pit| pit_label(pit).to_string()).collect();
        render::output(
            CHEAT_PREFIX,
            &format!("Trace (score {}): {}", trace.score, rendered.join(" ")),
        );
    }

    fn show_stats(&self) {
        let stats = self.search.cache().collect_stats(true, true, true);
        render::render_cache_stats(&stats);
        if let Some(egdb) = self.search.egdb() {
            render::render_egdb_stats(&egdb.stats());
        }
    }
}

fn parse_bool(arg: Option<&&str>) -> Option<bool> {
    match arg {
        Some(&"true") | Some(&"1") => Some(true),
        Some(&"false") | Some(&"0") => Some(false),
        _ => None,
    }
}
