//! Fixed-capacity, lock-free transposition cache.
//!
//! Positions are keyed side-invariantly on the play pits alone (see
//! [`key`]); values are stored relative to the current stores so the same
//! play configuration is shared across store totals. Six packed layouts are
//! available, the product of depth-aware/depth-absent and the key/tag
//! widths; the narrowest tag that still covers `keyBits - indexBits` is
//! selected automatically.

pub mod key;
pub mod table;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::board::Board;
use crate::types::{Depth, Score};

use key::KeyWidth;
use table::{
    DepthK48T16, DepthK48T32, DepthK60T32, NoDepthK48T16, NoDepthK48T32, NoDepthK60T32, Table,
};

pub const CACHE_VAL_UNSET: i16 = i16::MAX;
pub const CACHE_VAL_MIN: Score = ((i16::MIN >> 2) + 2) as Score;
pub const CACHE_VAL_MAX: Score = (i16::MAX >> 2) as Score;
pub const DEPTH_SOLVED: u16 = u16::MAX;

pub const TINY_SIZE_POW: u32 = 20;
pub const SMALL_SIZE_POW: u32 = 22;
pub const NORMAL_SIZE_POW: u32 = 24;
pub const LARGE_SIZE_POW: u32 = 26;
pub const EXTREME_SIZE_POW: u32 = 28;

/// Number of fragmentation chunks reported by a stats pass.
pub const OUTPUT_CHUNK_COUNT: usize = 10;

/// Bound classification of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    Exact = 0,
    Lower = 1,
    Upper = 2,
}

/// Packs an evaluation and its bound into the stored 16-bit word.
#[inline]
pub fn pack_value(eval: Score, bound: Bound) -> i16 {
    ((eval as i16) << 2) | bound as i16
}

#[inline]
pub fn unpack_eval(packed: i16) -> Score {
    (packed >> 2) as Score
}

#[inline]
pub fn unpack_bound(packed: i16) -> Bound {
    match packed & 0b11 {
        0 => Bound::Exact,
        1 => Bound::Lower,
        _ => Bound::Upper,
    }
}

/// Key-compression policy: `Always` forces the 48-bit key, `Never` the
/// 60-bit key, `Auto` keeps 60 bits whenever the tag still fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressMode {
    Always,
    Never,
    #[default]
    Auto,
}

/// No packed layout can satisfy the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheConfigError {
    TooLarge { size_pow: u32, key_bits: u32 },
    TagTooWide { size_pow: u32, key_bits: u32, tag_bits: u32 },
}

impl fmt::Display for CacheConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CacheConfigError::TooLarge { size_pow, key_bits } => write!(
                f,
                "cache size 2^{size_pow} too large for {key_bits}-bit keys"
            ),
            CacheConfigError::TagTooWide {
                size_pow,
                key_bits,
                tag_bits,
            } => write!(
                f,
                "cache size 2^{size_pow} too small for {key_bits}-bit keys: \
                 tag would require {tag_bits} bits (32 max, need 2^{} min)",
                key_bits - 32 + 1
            ),
        }
    }
}

impl std::error::Error for CacheConfigError {}

/// Perf and problem counters, accumulated lock-free during search and
/// snapshotted at the end of every root search.
#[derive(Default)]
pub struct CacheCounters {
    pub hits: AtomicU64,
    pub hits_legal: AtomicU64,
    pub lru_swaps: AtomicU64,
    pub overwrite_improve: AtomicU64,
    pub overwrite_evict: AtomicU64,
    pub fail_stones: AtomicU64,
    pub fail_range: AtomicU64,
}

impl CacheCounters {
    fn swap_out(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.swap(0, Ordering::Relaxed),
            hits_legal: self.hits_legal.swap(0, Ordering::Relaxed),
            lru_swaps: self.lru_swaps.swap(0, Ordering::Relaxed),
            overwrite_improve: self.overwrite_improve.swap(0, Ordering::Relaxed),
            overwrite_evict: self.overwrite_evict.swap(0, Ordering::Relaxed),
            fail_stones: self.fail_stones.swap(0, Ordering::Relaxed),
            fail_range: self.fail_range.swap(0, Ordering::Relaxed),
        }
    }
}

/// Counter values of the last completed root search.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub hits_legal: u64,
    pub lru_swaps: u64,
    pub overwrite_improve: u64,
    pub overwrite_evict: u64,
    pub fail_stones: u64,
    pub fail_range: u64,
}

/// A maximal run of set or unset entries, for the fragmentation view.
#[derive(Debug, Clone, Copy)]
pub struct CacheChunk {
    pub start: u64,
    pub size: u64,
    pub set: bool,
}

/// Snapshot produced by a full stats walk over the cache.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub mode: String,
    pub cache_size: u64,
    pub entry_bytes: usize,
    pub has_depth: bool,

    pub set_entries: u64,
    pub exact_count: u64,
    pub lower_count: u64,
    pub upper_count: u64,

    pub solved_entries: u64,
    pub non_solved: u64,
    pub depth_sum: u64,
    pub max_depth: u16,
    pub depth_bins: [u64; 8],

    pub hits: u64,
    pub hits_legal: u64,
    pub lru_swaps: u64,
    pub overwrite_improve: u64,
    pub overwrite_evict: u64,
    pub fail_stones: u64,
    pub fail_range: u64,

    pub avg_stones: [f64; crate::constants::BOARD_CELLS],
    pub max_stones: [u8; crate::constants::BOARD_CELLS],
    pub over7: [u64; crate::constants::BOARD_CELLS],
    pub over15: [u64; crate::constants::BOARD_CELLS],

    pub chunks: Vec<CacheChunk>,
}

enum ModeTable {
    NoDepthK48T16(Table<NoDepthK48T16>),
    NoDepthK48T32(Table<NoDepthK48T32>),
    NoDepthK60T32(Table<NoDepthK60T32>),
    DepthK48T16(Table<DepthK48T16>),
    DepthK48T32(Table<DepthK48T32>),
    DepthK60T32(Table<DepthK60T32>),
}

macro_rules! dispatch {
    ($mode:expr, $t:ident => $body:expr) => {
        match $mode {
            ModeTable::NoDepthK48T16($t) => $body,
            ModeTable::NoDepthK48T32($t) => $body,
            ModeTable::NoDepthK60T32($t) => $body,
            ModeTable::DepthK48T16($t) => $body,
            ModeTable::DepthK48T32($t) => $body,
            ModeTable::DepthK60T32($t) => $body,
        }
    };
}

impl ModeTable {
    fn key_width(&self) -> KeyWidth {
        match self {
            ModeTable::NoDepthK48T16(_)
            | ModeTable::NoDepthK48T32(_)
            | ModeTable::DepthK48T16(_)
            | ModeTable::DepthK48T32(_) => KeyWidth::B48,
            _ => KeyWidth::B60,
        }
    }

    fn has_depth(&self) -> bool {
        matches!(
            self,
            ModeTable::DepthK48T16(_) | ModeTable::DepthK48T32(_) | ModeTable::DepthK60T32(_)
        )
    }

    fn tag_bits(&self) -> u32 {
        match self {
            ModeTable::NoDepthK48T16(_) | ModeTable::DepthK48T16(_) => 16,
            _ => 32,
        }
    }

    fn entry_bytes(&self) -> usize {
        dispatch!(self, t => t.entry_bytes())
    }
}

/// Picks the packed layout for a configuration without allocating.
/// `Ok(None)` means the cache is disabled at this size.
fn select_layout(
    size_pow: u32,
    depth: bool,
    compress: CompressMode,
) -> Result<Option<LayoutKind>, CacheConfigError> {
    if size_pow <= 2 {
        return Ok(None);
    }

    let index_bits = size_pow - 1;
    let use_compressed_key = match compress {
        CompressMode::Always => true,
        CompressMode::Never => false,
        // A 60-bit key needs its tag to fit 32 bits; compress when the
        // table is too small for that.
        CompressMode::Auto => 60 - index_bits > 32,
    };
    let key_bits = if use_compressed_key { 48 } else { 60 };

    if size_pow >= key_bits {
        return Err(CacheConfigError::TooLarge { size_pow, key_bits });
    }

    let tag_bits_needed = key_bits - index_bits;
    if tag_bits_needed > 32 {
        return Err(CacheConfigError::TagTooWide {
            size_pow,
            key_bits,
            tag_bits: tag_bits_needed,
        });
    }
    let wide_tag = if tag_bits_needed > 16 {
        true
    } else {
        !use_compressed_key
    };

    Ok(Some(match (depth, use_compressed_key, wide_tag) {
        (false, false, _) => LayoutKind::NoDepthK60T32,
        (false, true, true) => LayoutKind::NoDepthK48T32,
        (false, true, false) => LayoutKind::NoDepthK48T16,
        (true, false, _) => LayoutKind::DepthK60T32,
        (true, true, true) => LayoutKind::DepthK48T32,
        (true, true, false) => LayoutKind::DepthK48T16,
    }))
}

/// The six selectable layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    NoDepthK48T16,
    NoDepthK48T32,
    NoDepthK60T32,
    DepthK48T16,
    DepthK48T32,
    DepthK60T32,
}

/// Requested (not yet applied) configuration.
#[derive(Clone, Copy, PartialEq, Eq)]
struct ActiveConfig {
    size_pow: u32,
    depth: bool,
    compress: CompressMode,
}

pub struct TranspositionCache {
    table: Option<ModeTable>,
    active: Option<ActiveConfig>,
    size_pow: u32,
    cfg_size_pow: u32,
    counters: CacheCounters,
    snapshot: CounterSnapshot,
}

impl Default for TranspositionCache {
    fn default() -> Self {
        TranspositionCache::new(NORMAL_SIZE_POW)
    }
}

impl TranspositionCache {
    /// A cache that will allocate `2^size_pow` entries on the first
    /// [`set_mode`](Self::set_mode) call. `size_pow <= 2` disables caching.
    pub fn new(size_pow: u32) -> TranspositionCache {
        TranspositionCache {
            table: None,
            active: None,
            size_pow: 0,
            cfg_size_pow: size_pow,
            counters: CacheCounters::default(),
            snapshot: CounterSnapshot::default(),
        }
    }

    /// Records the requested size; applied at the next mode change. Must
    /// only be called while no search is running.
    pub fn set_size_pow(&mut self, size_pow: u32) {
        self.cfg_size_pow = size_pow;
    }

    pub fn requested_size_pow(&self) -> u32 {
        self.cfg_size_pow
    }

    /// Selects the packed layout for the requested size, reallocating when
    /// anything changed. Depth-absent layouts treat every hit as solved and
    /// are used by the one-shot driver.
    pub fn set_mode(&mut self, depth: bool, compress: CompressMode) -> Result<(), CacheConfigError> {
        let desired = ActiveConfig {
            size_pow: self.cfg_size_pow,
            depth,
            compress,
        };
        if self.active == Some(desired) {
            return Ok(());
        }

        let kind = select_layout(desired.size_pow, depth, compress)?;

        self.table = None;
        self.size_pow = 0;

        if let Some(kind) = kind {
            let size_pow = desired.size_pow;
            self.table = Some(match kind {
                LayoutKind::NoDepthK48T16 => ModeTable::NoDepthK48T16(Table::new(size_pow)),
                LayoutKind::NoDepthK48T32 => ModeTable::NoDepthK48T32(Table::new(size_pow)),
                LayoutKind::NoDepthK60T32 => ModeTable::NoDepthK60T32(Table::new(size_pow)),
                LayoutKind::DepthK48T16 => ModeTable::DepthK48T16(Table::new(size_pow)),
                LayoutKind::DepthK48T32 => ModeTable::DepthK48T32(Table::new(size_pow)),
                LayoutKind::DepthK60T32 => ModeTable::DepthK60T32(Table::new(size_pow)),
            });
            self.size_pow = size_pow;
        }

        self.active = Some(desired);
        self.reset_counters();
        Ok(())
    }

    /// The layout name of the active mode, e.g. `Depth / 48-bit Key /
    /// 32-bit Tag`.
    pub fn mode_name(&self) -> String {
        match &self.table {
            Some(table) => format!(
                "{} / {}-bit Key / {}-bit Tag",
                if table.has_depth() { "Depth" } else { "No Depth" },
                table.key_width().bits(),
                table.tag_bits(),
            ),
            None => "disabled".to_string(),
        }
    }

    /// Resets all entries in place, keeping the allocation and mode.
    pub fn invalidate(&mut self) {
        if let Some(table) = &self.table {
            dispatch!(table, t => t.clear());
            self.reset_counters();
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.table.is_some()
    }

    /// Entry capacity, zero when disabled.
    pub fn size(&self) -> u64 {
        if self.table.is_some() {
            1u64 << self.size_pow
        } else {
            0
        }
    }

    /// Computes the position key under the active layout. `None` when the
    /// cache is disabled or a play pit exceeds the layout's per-cell cap.
    #[inline]
    pub fn translate(&self, board: &Board) -> Option<u64> {
        self.table.as_ref()?.key_width().translate(board)
    }

    /// Stores a search result. A `None` key records the encode failure.
    #[inline]
    pub fn store(
        &self,
        board: &Board,
        key: Option<u64>,
        eval_raw: Score,
        bound: Bound,
        depth: Depth,
        solved: bool,
    ) {
        let Some(table) = &self.table else { return };
        match key {
            Some(key) => dispatch!(table, t => {
                t.store(board, key, eval_raw, bound, depth, solved, &self.counters)
            }),
            None => {
                self.counters.fail_stones.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Probes the cache. Hits shallower than `current_depth` fail.
    #[inline]
    pub fn lookup(
        &self,
        board: &Board,
        key: Option<u64>,
        current_depth: Depth,
    ) -> Option<(Score, Bound, bool)> {
        let table = self.table.as_ref()?;
        let key = key?;
        dispatch!(table, t => t.lookup(board, key, current_depth, &self.counters))
    }

    /// Moves the live counters into the last-search snapshot. Called at the
    /// end of every root search.
    pub fn take_snapshot(&mut self) {
        self.snapshot = self.counters.swap_out();
    }

    pub fn last_counters(&self) -> CounterSnapshot {
        self.snapshot
    }

    fn reset_counters(&mut self) {
        self.counters.swap_out();
        self.snapshot = CounterSnapshot::default();
    }

    /// Full stats pass over the table. The flags gate the expensive walks
    /// (fragmentation chunks, per-pit stone recovery, depth histogram).
    pub fn collect_stats(
        &self,
        calc_frag: bool,
        calc_stone_dist: bool,
        calc_depth_dist: bool,
    ) -> CacheStats {
        let mut stats = CacheStats {
            cache_size: self.size(),
            hits: self.snapshot.hits,
            hits_legal: self.snapshot.hits_legal,
            lru_swaps: self.snapshot.lru_swaps,
            overwrite_improve: self.snapshot.overwrite_improve,
            overwrite_evict: self.snapshot.overwrite_evict,
            fail_stones: self.snapshot.fail_stones,
            fail_range: self.snapshot.fail_range,
            ..CacheStats::default()
        };

        stats.mode = self.mode_name();
        if let Some(table) = &self.table {
            stats.entry_bytes = table.entry_bytes();
            dispatch!(table, t => {
                t.collect_stats(&mut stats, calc_frag, calc_stone_dist, calc_depth_dist)
            });
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_packing_round_trip() {
        for eval in [CACHE_VAL_MIN, -1, 0, 1, 42, CACHE_VAL_MAX] {
            for bound in [Bound::Exact, Bound::Lower, Bound::Upper] {
                let packed = pack_value(eval, bound);
                assert_ne!(packed, CACHE_VAL_UNSET);
                assert_eq!(unpack_eval(packed), eval);
                assert_eq!(unpack_bound(packed), bound);
            }
        }
    }

    #[test]
    fn auto_mode_selection() {
        // 60 - 19 = 41 tag bits will not fit: the key is compressed.
        assert_eq!(
            select_layout(TINY_SIZE_POW, true, CompressMode::Auto),
            Ok(Some(LayoutKind::DepthK48T32))
        );
        // A 2^30 table leaves a 31-bit tag for the 60-bit key.
        assert_eq!(
            select_layout(30, true, CompressMode::Auto),
            Ok(Some(LayoutKind::DepthK60T32))
        );
        assert_eq!(
            select_layout(TINY_SIZE_POW, false, CompressMode::Always),
            Ok(Some(LayoutKind::NoDepthK48T32))
        );
        assert_eq!(
            select_layout(29, false, CompressMode::Never),
            Ok(Some(LayoutKind::NoDepthK60T32))
        );
        assert_eq!(select_layout(0, true, CompressMode::Auto), Ok(None));

        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Auto).unwrap();
        assert_eq!(cache.mode_name(), "Depth / 48-bit Key / 32-bit Tag");
    }

    #[test]
    fn impossible_configs_are_rejected() {
        let mut cache = TranspositionCache::new(10);
        assert_eq!(
            cache.set_mode(true, CompressMode::Auto),
            Err(CacheConfigError::TagTooWide {
                size_pow: 10,
                key_bits: 48,
                tag_bits: 39,
            })
        );

        let mut cache = TranspositionCache::new(50);
        assert!(matches!(
            cache.set_mode(true, CompressMode::Always),
            Err(CacheConfigError::TooLarge { key_bits: 48, .. })
        ));
    }

    #[test]
    fn tiny_size_disables_the_cache() {
        let mut cache = TranspositionCache::new(0);
        cache.set_mode(true, CompressMode::Auto).unwrap();
        assert!(!cache.enabled());
        assert_eq!(cache.size(), 0);

        let board = Board::uniform(4);
        assert_eq!(cache.translate(&board), None);
        assert!(cache.lookup(&board, Some(1), 0).is_none());
    }

    #[test]
    fn store_and_lookup_through_dispatcher() {
        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Auto).unwrap();

        let board = Board::uniform(4);
        let key = cache.translate(&board);
        assert!(key.is_some());

        cache.store(&board, key, 3, Bound::Exact, 5, false);
        let (score, bound, solved) = cache.lookup(&board, key, 5).unwrap();
        assert_eq!((score, bound, solved), (3, Bound::Exact, false));

        // Mirrored position shares the entry.
        let mirror = board.mirrored();
        let mirror_key = cache.translate(&mirror);
        assert_eq!(key, mirror_key);
    }

    #[test]
    fn encode_failure_counts_as_fail_stones() {
        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Always).unwrap();

        let mut board = Board::uniform(4);
        board.cells[0] = 200;
        assert_eq!(cache.translate(&board), None);

        cache.store(&board, None, 0, Bound::Exact, 1, false);
        cache.take_snapshot();
        assert_eq!(cache.last_counters().fail_stones, 1);
    }

    #[test]
    fn snapshot_zeroes_live_counters() {
        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Auto).unwrap();

        let board = Board::uniform(4);
        let key = cache.translate(&board);
        cache.store(&board, key, 1, Bound::Exact, 1, false);
        assert!(cache.lookup(&board, key, 1).is_some());

        cache.take_snapshot();
        assert_eq!(cache.last_counters().hits, 1);
        cache.take_snapshot();
        assert_eq!(cache.last_counters().hits, 0);
    }

    #[test]
    fn invalidate_resets_in_place() {
        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Auto).unwrap();

        let board = Board::uniform(4);
        let key = cache.translate(&board);
        cache.store(&board, key, 1, Bound::Exact, 1, false);
        cache.invalidate();

        assert!(cache.lookup(&board, key, 0).is_none());
        assert_eq!(cache.size(), 1 << TINY_SIZE_POW);
    }

    #[test]
    fn reconfigure_is_a_no_op_when_unchanged() {
        let mut cache = TranspositionCache::new(TINY_SIZE_POW);
        cache.set_mode(true, CompressMode::Auto).unwrap();

        let board = Board::uniform(4);
        let key = cache.translate(&board);
        cache.store(&board, key, 1, Bound::Exact, 1, false);

        cache.set_mode(true, CompressMode::Auto).unwrap();
        assert!(cache.lookup(&board, key, 1).is_some());

        // A genuine mode switch reallocates and drops entries.
        cache.set_mode(false, CompressMode::Auto).unwrap();
        assert!(cache.lookup(&board, cache.translate(&board), 0).is_none());
    }
}
