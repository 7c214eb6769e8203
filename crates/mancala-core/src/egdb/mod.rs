//! Endgame database: exact values for positions with few stones in play.
//!
//! For every total `s` of stones still on the play pits, a dense layer maps
//! the combinatorial rank of the position (side to move's pits first) to
//! the best achievable store differential from that position onward. Layers
//! are computed by retrograde fixpoint over smaller-or-equal layers,
//! persisted to disk, and probed during search.

pub mod storage;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub use storage::BackendKind;
use storage::{LayerData, LoadOutcome};

use crate::board::{Board, Classic, MoveRules};
use crate::constants::*;
use crate::types::Score;

/// Largest supported layer (per-pit counts stay within a `u8`).
pub const EGDB_MAX_STONES: usize = 216;

/// Sentinel: entry not computed yet.
pub const UNCOMPUTED: i8 = 127;

/// Sentinel: entry currently on the retrograde stack; a back-edge into it
/// contributes zero.
pub const VISITING: i8 = 126;

const PLAY_PITS: usize = 2 * PITS_PER_SIDE;

/// Receives generation progress and status messages.
pub trait EgdbObserver {
    fn message(&self, _text: &str) {}
    fn generation_started(&self) {}
    fn generation_progress(&self, _stones: usize, _current: u64, _total: u64) {}
    fn generation_finished(&self) {}
}

/// Observer that swallows everything.
pub struct SilentObserver;

impl EgdbObserver for SilentObserver {}

#[derive(Debug, Clone, Copy, Default)]
pub struct EgdbStats {
    pub probes: u64,
    pub hits: u64,
    pub resident_bytes: u64,
    pub max_stones: usize,
}

pub struct Egdb {
    dir: PathBuf,
    backend: BackendKind,
    /// `ways[s][p]` = number of ways to place `s` stones into `p` pits.
    ways: Vec<[u64; PLAY_PITS + 1]>,
    layers: Vec<Option<LayerData>>,
    loaded_max_stones: usize,
    total_stones: u32,
    probes: AtomicU64,
    hits: AtomicU64,
}

impl Egdb {
    /// An empty database rooted at `dir`. Layers are loaded or generated by
    /// [`ensure`](Self::ensure); `total_stones` tracks the configured game
    /// (stones per pit times twelve).
    pub fn open(dir: impl Into<PathBuf>, backend: BackendKind) -> Egdb {
        let mut ways = vec![[0u64; PLAY_PITS + 1]; EGDB_MAX_STONES + 1];
        for p in 1..=PLAY_PITS {
            ways[0][p] = 1;
        }
        for s in 0..=EGDB_MAX_STONES {
            ways[s][1] = 1;
        }
        for p in 2..=PLAY_PITS {
            for s in 1..=EGDB_MAX_STONES {
                ways[s][p] = ways[s][p - 1] + ways[s - 1][p];
            }
        }

        Egdb {
            dir: dir.into(),
            backend,
            ways,
            layers: Vec::new(),
            loaded_max_stones: 0,
            total_stones: 48,
            probes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Adjusts the configured game total; probes derive the stones left in
    /// play from it.
    pub fn set_stones_per_pit(&mut self, stones: u32) {
        self.total_stones = stones * PLAY_PITS as u32;
    }

    pub fn loaded_max_stones(&self) -> usize {
        self.loaded_max_stones
    }

    /// Entries in the layer for `stones` stones in play:
    /// `C(stones + 11, 11)`.
    pub fn layer_size(&self, stones: usize) -> u64 {
        self.ways[stones][PLAY_PITS]
    }

    /// Relabels the pits so the side to move comes first and returns the
    /// combinatorial rank of the resulting composition.
    pub fn rank(&self, board: &Board) -> u64 {
        let mut rel = [0u8; PLAY_PITS];
        if board.color == 1 {
            rel[..PITS_PER_SIDE].copy_from_slice(&board.cells[LBOUND_P1..=HBOUND_P1]);
            rel[PITS_PER_SIDE..].copy_from_slice(&board.cells[LBOUND_P2..=HBOUND_P2]);
        } else {
            rel[..PITS_PER_SIDE].copy_from_slice(&board.cells[LBOUND_P2..=HBOUND_P2]);
            rel[PITS_PER_SIDE..].copy_from_slice(&board.cells[LBOUND_P1..=HBOUND_P1]);
        }

        let mut stones: usize = rel.iter().map(|&v| v as usize).sum();
        let mut index = 0u64;
        let mut pits_left = PLAY_PITS;

        for &v in rel.iter().take(PLAY_PITS - 1) {
            for k in 0..v as usize {
                index += self.ways[stones - k][pits_left - 1];
            }
            stones -= v as usize;
            pits_left -= 1;
            if stones == 0 {
                break;
            }
        }
        index
    }

    /// Inverse of [`rank`](Self::rank): the canonical position (side to
    /// move `+1`, stores empty) with the given rank in layer `stones`.
    pub fn unrank(&self, index: u64, stones: usize) -> Board {
        let mut rel = [0u8; PLAY_PITS];
        let mut stones_left = stones;
        let mut pits_left = PLAY_PITS;
        let mut idx = index;

        for slot in rel.iter_mut().take(PLAY_PITS - 1) {
            let mut count = 0usize;
            while count <= stones_left {
                let ways = self.ways[stones_left - count][pits_left - 1];
                if idx < ways {
                    break;
                }
                idx -= ways;
                count += 1;
            }
            *slot = count as u8;
            stones_left -= count;
            pits_left -= 1;
        }
        rel[PLAY_PITS - 1] = stones_left as u8;

        let mut board = Board::empty();
        board.cells[LBOUND_P1..=HBOUND_P1].copy_from_slice(&rel[..PITS_PER_SIDE]);
        board.cells[LBOUND_P2..=HBOUND_P2].copy_from_slice(&rel[PITS_PER_SIDE..]);
        board
    }

    /// Exact side-relative evaluation of a position covered by a loaded
    /// layer, or `None`.
    pub fn probe(&self, board: &Board) -> Option<Score> {
        self.probes.fetch_add(1, Ordering::Relaxed);

        let in_stores =
            board.cells[STORE_P1] as i64 + board.cells[STORE_P2] as i64;
        let stones_left = self.total_stones as i64 - in_stores;
        if stones_left <= 0 || stones_left as usize > self.loaded_max_stones {
            return None;
        }

        let layer = self.layers.get(stones_left as usize)?.as_ref()?;
        let future = layer.probe(self.rank(board))?;
        if future == UNCOMPUTED || future == VISITING {
            return None;
        }

        let current_diff = board.color as Score * board.evaluate();
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(current_diff + future as Score)
    }

    /// Loads or generates every layer up to `max_stones`. Corrupt files are
    /// regenerated with a warning through the observer.
    pub fn ensure(&mut self, max_stones: usize, observer: &dyn EgdbObserver) -> io::Result<()> {
        let max_stones = max_stones.min(EGDB_MAX_STONES);
        std::fs::create_dir_all(&self.dir)?;

        if self.layers.len() <= max_stones {
            self.layers.resize_with(max_stones + 1, || None);
        }

        observer.message(&format!(
            "Checking endgame tables (1..{max_stones}) [{:?}]...",
            self.backend
        ));

        for s in 1..=max_stones {
            if self.layers[s].is_none() {
                let size = self.layer_size(s);
                let loaded = match storage::load_layer(&self.dir, s, size, self.backend) {
                    LoadOutcome::Loaded(data) => Some(data),
                    LoadOutcome::Missing => None,
                    LoadOutcome::Corrupt => {
                        observer.message(&format!(
                            "Corrupt table for {s} stones found. Regenerating..."
                        ));
                        None
                    }
                };

                let data = match loaded {
                    Some(data) => data,
                    None => {
                        observer.message(&format!("Generating layer {s}..."));
                        let table = self.generate_layer(s, observer);
                        storage::save_layer(&self.dir, s, table, self.backend)?
                    }
                };
                self.layers[s] = Some(data);
            }

            self.loaded_max_stones = self.loaded_max_stones.max(s);
        }

        observer.message("Endgame tables ready.");
        Ok(())
    }

    fn generate_layer(&self, stones: usize, observer: &dyn EgdbObserver) -> Vec<i8> {
        let size = self.layer_size(stones);
        let mut table = vec![UNCOMPUTED; size as usize];

        observer.generation_started();
        let interval = (size / 200).max(1);

        for idx in 0..size {
            if idx % interval == 0 {
                observer.generation_progress(stones, idx, size);
            }
            if table[idx as usize] == UNCOMPUTED {
                let board = self.unrank(idx, stones);
                self.crunch(&mut table, stones, idx, &board);
            }
        }

        observer.generation_progress(stones, size, size);
        observer.generation_finished();
        table
    }

    /// Memoized retrograde evaluation of one entry. Same-layer,
    /// same-color cycles are broken by the `VISITING` mark, which values
    /// the back-edge at zero.
    fn crunch(&self, table: &mut [i8], stones: usize, index: u64, board: &Board) -> i8 {
        match table[index as usize] {
            VISITING => return 0,
            UNCOMPUTED => {}
            done => return done,
        }
        table[index as usize] = VISITING;

        let mut best: i32 = -127;
        let mut can_move = false;

        for pit in LBOUND_P1..=HBOUND_P1 {
            if board.cells[pit] == 0 {
                continue;
            }
            can_move = true;

            let mut next = *board;
            Classic::sow(&mut next, pit);
            next.process_terminal();

            let next_stones = next.stones_in_play() as usize;
            let diff_gained = (next.cells[STORE_P1] as i32 - board.cells[STORE_P1] as i32)
                - (next.cells[STORE_P2] as i32 - board.cells[STORE_P2] as i32);

            let score = if next_stones == 0 {
                diff_gained
            } else {
                let lookup = if next_stones < stones {
                    self.completed_value(&next, next_stones)
                } else if next.color == board.color {
                    self.crunch(table, stones, self.rank(&next), &next)
                } else {
                    let normalized = self.unrank(self.rank(&next), stones);
                    self.crunch(table, stones, self.rank(&next), &normalized)
                };

                if next.color == board.color {
                    diff_gained + lookup as i32
                } else {
                    diff_gained - lookup as i32
                }
            };

            best = best.max(score);
        }

        if !can_move {
            best = 0;
        }

        table[index as usize] = best as i8;
        best as i8
    }

    /// Raw stored value for a position whose layer is already complete.
    fn completed_value(&self, board: &Board, stones: usize) -> i8 {
        let value = self
            .layers
            .get(stones)
            .and_then(|layer| layer.as_ref())
            .and_then(|layer| layer.probe(self.rank(board)));
        match value {
            Some(v) if v != UNCOMPUTED && v != VISITING => v,
            _ => 0,
        }
    }

    pub fn stats(&self) -> EgdbStats {
        let resident = self
            .layers
            .iter()
            .flatten()
            .map(|layer| layer.resident_bytes())
            .sum();
        EgdbStats {
            probes: self.probes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            resident_bytes: resident,
            max_stones: self.loaded_max_stones,
        }
    }

    pub fn reset_stats(&self) {
        self.probes.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
    }
}
