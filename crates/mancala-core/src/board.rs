//! Position representation and move application for both rulesets.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::constants::*;
use crate::types::{Color, Score};

/// A sowing-game position: 14 cells and a side-to-move tag.
///
/// Pits 0-5 and store 6 belong to player `+1`, pits 7-12 and store 13 to
/// player `-1`. The total stone count is conserved by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    pub cells: [u8; BOARD_CELLS],
    pub color: Color,
}

impl Default for Board {
    fn default() -> Self {
        Board::uniform(4)
    }
}

/// Move application strategy, monomorphized through the search.
///
/// `sow` applies a move without the terminal sweep; callers follow up with
/// [`Board::process_terminal`].
pub trait MoveRules {
    const NAME: &'static str;

    fn sow(board: &mut Board, pit: usize);
}

/// Classic rules: capture on landing in an own empty pit, extra turn on
/// landing in the own store.
pub struct Classic;

/// Avalanche rules: landing in a non-empty play pit chains into a fresh
/// sowing from that pit; the turn ends on an empty pit or the own store.
pub struct Avalanche;

/// Runtime selector between the two [`MoveRules`] strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSet {
    #[default]
    Classic,
    Avalanche,
}

impl RuleSet {
    pub fn apply(self, board: &mut Board, pit: usize) {
        match self {
            RuleSet::Classic => Classic::sow(board, pit),
            RuleSet::Avalanche => Avalanche::sow(board, pit),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RuleSet::Classic => Classic::NAME,
            RuleSet::Avalanche => Avalanche::NAME,
        }
    }
}

/// Walks `stones` stones counter-clockwise from `index`, skipping the cell
/// before the wrap at `blocked` (the opponent's store). Returns the landing
/// index.
#[inline]
fn sow_stones(cells: &mut [u8; BOARD_CELLS], blocked: usize, mut index: usize, stones: u8) -> usize {
    for _ in 0..stones {
        if index == blocked {
            index += 2;
        } else {
            index += 1;
        }
        if index >= BOARD_CELLS {
            index -= BOARD_CELLS;
        }
        cells[index] += 1;
    }
    index
}

impl MoveRules for Classic {
    const NAME: &'static str = "classic";

    fn sow(board: &mut Board, pit: usize) {
        let stones = board.cells[pit];
        board.cells[pit] = 0;

        let turn = board.color == 1;
        let blocked = if turn { STORE_P2 - 1 } else { STORE_P1 - 1 };
        let index = sow_stones(&mut board.cells, blocked, pit, stones);

        // Last stone in the own store grants another turn.
        if (index == STORE_P1 && turn) || (index == STORE_P2 && !turn) {
            return;
        }

        // Last stone in an own, previously empty pit steals the mirror pit.
        if board.cells[index] == 1 {
            let target = HBOUND_P2 - index;
            let captured = board.cells[target];

            if captured != 0 {
                if !turn && index > STORE_P1 {
                    board.cells[STORE_P2] += captured + 1;
                    board.cells[target] = 0;
                    board.cells[index] = 0;
                } else if turn && index < STORE_P1 {
                    board.cells[STORE_P1] += captured + 1;
                    board.cells[target] = 0;
                    board.cells[index] = 0;
                }
            }
        }

        board.color = -board.color;
    }
}

impl MoveRules for Avalanche {
    const NAME: &'static str = "avalanche";

    fn sow(board: &mut Board, pit: usize) {
        let turn = board.color == 1;
        let blocked = if turn { STORE_P2 - 1 } else { STORE_P1 - 1 };
        let mut index = pit;

        loop {
            let stones = board.cells[index];
            board.cells[index] = 0;

            index = sow_stones(&mut board.cells, blocked, index, stones);

            if (index == STORE_P1 && turn) || (index == STORE_P2 && !turn) {
                return;
            }

            // A non-empty landing pit becomes the next source.
            if board.cells[index] <= 1 {
                break;
            }
        }

        board.color = -board.color;
    }
}

impl Board {
    /// An empty board with player one to move.
    pub fn empty() -> Board {
        Board {
            cells: [0; BOARD_CELLS],
            color: 1,
        }
    }

    /// Every play pit starts with `stones` stones, stores empty.
    pub fn uniform(stones: u8) -> Board {
        let mut board = Board {
            cells: [stones; BOARD_CELLS],
            color: 1,
        };
        board.cells[STORE_P1] = 0;
        board.cells[STORE_P2] = 0;
        board
    }

    /// Randomized but mirrored start: both sides receive the same `6 * stones`
    /// stones, distributed by a seeded generator.
    pub fn random(stones: u8, seed: u64) -> Board {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut board = Board::empty();

        for _ in 0..(stones as usize * PITS_PER_SIDE) {
            let pit = rng.random_range(0..PITS_PER_SIDE);
            board.cells[pit] += 1;
            board.cells[pit + STORE_P1 + 1] += 1;
        }
        board
    }

    /// Store differential from player one's perspective.
    #[inline]
    pub fn evaluate(&self) -> Score {
        self.cells[STORE_P1] as Score - self.cells[STORE_P2] as Score
    }

    #[inline]
    pub fn side_one_empty(&self) -> bool {
        self.cells[LBOUND_P1..=HBOUND_P1].iter().all(|&c| c == 0)
    }

    #[inline]
    pub fn side_two_empty(&self) -> bool {
        self.cells[LBOUND_P2..=HBOUND_P2].iter().all(|&c| c == 0)
    }

    /// Whether one side has run out of stones (before any sweep).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.side_one_empty() || self.side_two_empty()
    }

    /// Sweeps the remaining stones into the non-empty side's store once a
    /// side has no stones left. Returns whether the game has ended.
    pub fn process_terminal(&mut self) -> bool {
        if self.side_one_empty() {
            for i in LBOUND_P2..=HBOUND_P2 {
                self.cells[STORE_P2] += self.cells[i];
                self.cells[i] = 0;
            }
            return true;
        }

        if self.side_two_empty() {
            for i in LBOUND_P1..=HBOUND_P1 {
                self.cells[STORE_P1] += self.cells[i];
                self.cells[i] = 0;
            }
            return true;
        }

        false
    }

    /// Applies a move and handles the terminal sweep.
    pub fn play(&mut self, rules: RuleSet, pit: usize) {
        rules.apply(self, pit);
        self.process_terminal();
    }

    /// The inclusive pit range of the side to move.
    #[inline]
    pub fn own_pits(&self) -> (usize, usize) {
        if self.color == 1 {
            (LBOUND_P1, HBOUND_P1)
        } else {
            (LBOUND_P2, HBOUND_P2)
        }
    }

    /// Whether `pit` is a legal move for the side to move.
    pub fn is_legal(&self, pit: usize) -> bool {
        let (lo, hi) = self.own_pits();
        (lo..=hi).contains(&pit) && self.cells[pit] != 0
    }

    /// Whether the side to move has any legal move.
    pub fn has_move(&self) -> bool {
        let (lo, hi) = self.own_pits();
        self.cells[lo..=hi].iter().any(|&c| c != 0)
    }

    /// Total stones still in play (stores excluded).
    pub fn stones_in_play(&self) -> u32 {
        let p1: u32 = self.cells[LBOUND_P1..=HBOUND_P1].iter().map(|&c| c as u32).sum();
        let p2: u32 = self.cells[LBOUND_P2..=HBOUND_P2].iter().map(|&c| c as u32).sum();
        p1 + p2
    }

    /// Total stones on the board including stores.
    pub fn total_stones(&self) -> u32 {
        self.cells.iter().map(|&c| c as u32).sum()
    }

    /// Swaps the two halves of the board and flips the side to move.
    pub fn mirrored(&self) -> Board {
        let mut cells = [0u8; BOARD_CELLS];
        for i in 0..=PITS_PER_SIDE {
            cells[i] = self.cells[i + STORE_P1 + 1];
            cells[i + STORE_P1 + 1] = self.cells[i];
        }
        Board {
            cells,
            color: -self.color,
        }
    }

    /// Reversible text encoding: the side to move in bit 0, then each cell
    /// in 8 bits, printed as lowercase hex without leading zero nibbles
    /// beyond 27 digits.
    pub fn encode(&self) -> String {
        let mut packed: u128 = u128::from(self.color == 1);
        for (i, &cell) in self.cells.iter().enumerate() {
            packed |= (cell as u128) << (1 + 8 * i);
        }
        format!("{packed:027x}")
    }

    /// Parses a position produced by [`Board::encode`].
    pub fn decode(code: &str) -> Option<Board> {
        let packed = u128::from_str_radix(code.trim(), 16).ok()?;

        let mut board = Board::empty();
        board.color = if packed & 1 == 1 { 1 } else { -1 };
        for i in 0..BOARD_CELLS {
            board.cells[i] = ((packed >> (1 + 8 * i)) & 0xFF) as u8;
        }
        Some(board)
    }
}
