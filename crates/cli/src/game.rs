//! Game configuration and the human/random/ai turn loop.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use mancala_core::board::{Board, RuleSet};
use mancala_core::constants::*;
use mancala_core::search::{Search, SearchResult, SolverConfig};
use mancala_core::types::Color;

use crate::render::{self, PLAY_PREFIX, pit_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Agent {
    #[default]
    Human,
    Random,
    Ai,
}

impl Agent {
    pub fn name(self) -> &'static str {
        match self {
            Agent::Human => "human",
            Agent::Random => "random",
            Agent::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Uniform,
    Random,
}

#[derive(Debug, Clone)]
pub struct GameSettings {
    pub stones: u8,
    pub distribution: Distribution,
    pub seed: u64,
    pub start_color: Color,
    pub player1: Agent,
    pub player2: Agent,
    pub rules: RuleSet,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            stones: 4,
            distribution: Distribution::Uniform,
            seed: 0,
            start_color: 1,
            player1: Agent::Human,
            player2: Agent::Ai,
            rules: RuleSet::Classic,
        }
    }
}

impl GameSettings {
    pub fn initial_board(&self) -> Board {
        let mut board = match self.distribution {
            Distribution::Uniform => Board::uniform(self.stones),
            Distribution::Random => Board::random(self.stones, self.seed),
        };
        board.color = self.start_color;
        board
    }

    pub fn agent_for(&self, color: Color) -> Agent {
        if color == 1 { self.player1 } else { self.player2 }
    }
}

/// A running game: the live board, the undo stack, and the last solver run
/// (with the position it was computed on) for `trace`.
pub struct GameState {
    pub board: Board,
    pub history: Vec<Board>,
    pub rules: RuleSet,
    pub last_result: Option<(Board, SearchResult)>,
    rng: StdRng,
}

impl GameState {
    pub fn new(settings: &GameSettings) -> GameState {
        GameState {
            board: settings.initial_board(),
            history: Vec::new(),
            rules: settings.rules,
            last_result: None,
            rng: StdRng::seed_from_u64(settings.seed),
        }
    }

    pub fn is_over(&self) -> bool {
        self.board.is_terminal()
    }

    /// Applies a move (absolute pit index), recording the undo point.
    pub fn apply(&mut self, pit: usize) {
        self.history.push(self.board);
        self.board.play(self.rules, pit);
    }

    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(board) => {
                self.board = board;
                true
            }
            None => false,
        }
    }

    fn random_move(&mut self) -> usize {
        let (lo, hi) = self.board.own_pits();
        let moves: Vec<usize> = (lo..=hi).filter(|&p| self.board.cells[p] != 0).collect();
        moves[self.rng.random_range(0..moves.len())]
    }

    /// Lets the agent of the side to move act once. Human turns do nothing;
    /// the caller reads a move from the prompt instead. Returns whether a
    /// move was made.
    pub fn step(
        &mut self,
        settings: &GameSettings,
        search: &mut Search,
        config: &SolverConfig,
    ) -> bool {
        if self.is_over() {
            return false;
        }

        match settings.agent_for(self.board.color) {
            Agent::Human => false,
            Agent::Random => {
                let pit = self.random_move();
                render::output(
                    PLAY_PREFIX,
                    &format!("random plays pit {}", pit_label(pit)),
                );
                self.apply(pit);
                true
            }
            Agent::Ai => match search.solve(&self.board, self.rules, config) {
                Ok(result) => {
                    let Some(pit) = result.best_move else {
                        return false;
                    };
                    render::output(
                        PLAY_PREFIX,
                        &format!(
                            "ai plays pit {} (eval {}{}, depth {}, {} nodes, {:.2}s)",
                            pit_label(pit),
                            result.evaluation,
                            if result.solved { ", solved" } else { "" },
                            result.depth,
                            result.nodes,
                            result.time,
                        ),
                    );
                    self.last_result = Some((self.board, result));
                    self.apply(pit);
                    true
                }
                Err(err) => {
                    render::output(crate::render::CONFIG_PREFIX, &format!("Fatal: {err}"));
                    std::process::exit(1);
                }
            },
        }
    }

    /// Announces the final standing once the game has ended.
    pub fn announce_result(&self) {
        if !self.is_over() {
            return;
        }
        let mut settled = self.board;
        settled.process_terminal();
        let diff = settled.evaluate();
        let text = match diff.cmp(&0) {
            std::cmp::Ordering::Greater => format!("Player 1 wins by {diff}"),
            std::cmp::Ordering::Less => format!("Player 2 wins by {}", -diff),
            std::cmp::Ordering::Equal => "Draw".to_string(),
        };
        render::output(PLAY_PREFIX, &format!("Game over: {text}"));
    }
}

/// Converts a player-relative pit number (1-6) to the absolute cell index
/// for the side to move.
pub fn absolute_pit(board: &Board, label: usize) -> Option<usize> {
    if !(1..=PITS_PER_SIDE).contains(&label) {
        return None;
    }
    let (lo, _) = board.own_pits();
    Some(lo + label - 1)
}
