//! The generic two-slot bucket table behind the transposition cache.
//!
//! Each bucket holds two entries: slot 0 is the most recently used. An entry
//! is three atomics (tag, packed value+bound, optional depth). Writers
//! publish with a release store on the tag; readers sandwich the entry read
//! between two acquire loads of the same tag and discard the read when they
//! disagree. There is no locking; LRU promotion swaps are best-effort and
//! may be lost under contention without affecting correctness.

use std::sync::atomic::{AtomicI16, AtomicU16, AtomicU32, Ordering};

use aligned_vec::{AVec, ConstAlign};

use crate::board::Board;
use crate::constants::*;
use crate::types::{Depth, Score};

use super::key::{KeyWidth, merge_key, split_key};
use super::{
    Bound, CACHE_VAL_MAX, CACHE_VAL_MIN, CACHE_VAL_UNSET, CacheCounters, CacheStats,
    DEPTH_SOLVED, OUTPUT_CHUNK_COUNT, pack_value, unpack_bound, unpack_eval,
};

/// The stored value is kept relative to the current stores; this is the
/// correction applied on both ends.
#[inline]
fn score_delta(board: &Board) -> Score {
    (board.cells[STORE_P1] as Score - board.cells[STORE_P2] as Score) * board.color as Score
}

/// Atomic tag word of an entry: 16 or 32 bits wide.
pub trait TagWord: Copy + Eq {
    type Atomic: Default;
    const BITS: u32;

    fn truncate(tag: u64) -> Self;
    fn widen(self) -> u64;
    fn load(cell: &Self::Atomic, order: Ordering) -> Self;
    fn store(cell: &Self::Atomic, value: Self, order: Ordering);
}

impl TagWord for u16 {
    type Atomic = AtomicU16;
    const BITS: u32 = 16;

    #[inline]
    fn truncate(tag: u64) -> Self {
        tag as u16
    }

    #[inline]
    fn widen(self) -> u64 {
        self as u64
    }

    #[inline]
    fn load(cell: &Self::Atomic, order: Ordering) -> Self {
        cell.load(order)
    }

    #[inline]
    fn store(cell: &Self::Atomic, value: Self, order: Ordering) {
        cell.store(value, order);
    }
}

impl TagWord for u32 {
    type Atomic = AtomicU32;
    const BITS: u32 = 32;

    #[inline]
    fn truncate(tag: u64) -> Self {
        tag as u32
    }

    #[inline]
    fn widen(self) -> u64 {
        self as u64
    }

    #[inline]
    fn load(cell: &Self::Atomic, order: Ordering) -> Self {
        cell.load(order)
    }

    #[inline]
    fn store(cell: &Self::Atomic, value: Self, order: Ordering) {
        cell.store(value, order);
    }
}

/// Depth word of an entry. The depth-absent variant is a zero-sized field
/// whose loads report every entry as solved.
pub trait DepthWord: Default {
    const PRESENT: bool;

    fn load(&self, order: Ordering) -> u16;
    fn store(&self, depth: u16, order: Ordering);
}

#[derive(Default)]
pub struct WithDepth(AtomicU16);

impl DepthWord for WithDepth {
    const PRESENT: bool = true;

    #[inline]
    fn load(&self, order: Ordering) -> u16 {
        self.0.load(order)
    }

    #[inline]
    fn store(&self, depth: u16, order: Ordering) {
        self.0.store(depth, order);
    }
}

#[derive(Default)]
pub struct NoDepth;

impl DepthWord for NoDepth {
    const PRESENT: bool = false;

    #[inline]
    fn load(&self, _order: Ordering) -> u16 {
        DEPTH_SOLVED
    }

    #[inline]
    fn store(&self, _depth: u16, _order: Ordering) {}
}

/// One of the six packed entry layouts, selected at configure time.
pub trait Layout {
    type Tag: TagWord;
    type Depth: DepthWord;
    const KEY: KeyWidth;
}

pub struct NoDepthK48T16;
pub struct NoDepthK48T32;
pub struct NoDepthK60T32;
pub struct DepthK48T16;
pub struct DepthK48T32;
pub struct DepthK60T32;

impl Layout for NoDepthK48T16 {
    type Tag = u16;
    type Depth = NoDepth;
    const KEY: KeyWidth = KeyWidth::B48;
}

impl Layout for NoDepthK48T32 {
    type Tag = u32;
    type Depth = NoDepth;
    const KEY: KeyWidth = KeyWidth::B48;
}

impl Layout for NoDepthK60T32 {
    type Tag = u32;
    type Depth = NoDepth;
    const KEY: KeyWidth = KeyWidth::B60;
}

impl Layout for DepthK48T16 {
    type Tag = u16;
    type Depth = WithDepth;
    const KEY: KeyWidth = KeyWidth::B48;
}

impl Layout for DepthK48T32 {
    type Tag = u32;
    type Depth = WithDepth;
    const KEY: KeyWidth = KeyWidth::B48;
}

impl Layout for DepthK60T32 {
    type Tag = u32;
    type Depth = WithDepth;
    const KEY: KeyWidth = KeyWidth::B60;
}

struct Slot<L: Layout> {
    tag: <L::Tag as TagWord>::Atomic,
    value: AtomicI16,
    depth: L::Depth,
}

impl<L: Layout> Slot<L> {
    fn unset() -> Self {
        Slot {
            tag: Default::default(),
            value: AtomicI16::new(CACHE_VAL_UNSET),
            depth: Default::default(),
        }
    }

    /// Entry publication: depth and value first (relaxed), tag last
    /// (release).
    #[inline]
    fn write(&self, tag: L::Tag, packed: i16, depth: u16) {
        self.depth.store(depth, Ordering::Relaxed);
        self.value.store(packed, Ordering::Relaxed);
        L::Tag::store(&self.tag, tag, Ordering::Release);
    }

    fn reset(&self) {
        self.depth.store(0, Ordering::Relaxed);
        self.value.store(CACHE_VAL_UNSET, Ordering::Relaxed);
        L::Tag::store(&self.tag, L::Tag::truncate(0), Ordering::Relaxed);
    }
}

struct Bucket<L: Layout> {
    slots: [Slot<L>; 2],
}

impl<L: Layout> Bucket<L> {
    fn unset() -> Self {
        Bucket {
            slots: [Slot::unset(), Slot::unset()],
        }
    }
}

pub struct Table<L: Layout> {
    buckets: AVec<Bucket<L>, ConstAlign<64>>,
    size_pow: u32,
}

impl<L: Layout> Table<L> {
    /// Allocates a table of `2^size_pow` entries (`2^(size_pow-1)` buckets).
    pub fn new(size_pow: u32) -> Table<L> {
        let bucket_count = 1usize << (size_pow - 1);
        Table {
            buckets: AVec::from_iter(64, (0..bucket_count).map(|_| Bucket::unset())),
            size_pow,
        }
    }

    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            for slot in &bucket.slots {
                slot.reset();
            }
        }
    }

    pub fn entry_bytes(&self) -> usize {
        std::mem::size_of::<Bucket<L>>() / 2
    }

    pub fn store(
        &self,
        board: &Board,
        key: u64,
        eval_raw: Score,
        bound: Bound,
        depth: Depth,
        solved: bool,
        counters: &CacheCounters,
    ) {
        let evaluation = eval_raw - score_delta(board);
        if !(CACHE_VAL_MIN..=CACHE_VAL_MAX).contains(&evaluation) {
            counters.fail_range.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let (bucket_idx, tag64) = split_key(key, self.size_pow);
        let tag = L::Tag::truncate(tag64);
        let bucket = &self.buckets[bucket_idx as usize];
        let packed = pack_value(evaluation, bound);
        let depth = if solved {
            DEPTH_SOLVED
        } else {
            depth.min(DEPTH_SOLVED as Depth - 1) as u16
        };

        // Same-tag update, shallower results never replace deeper ones.
        for slot in &bucket.slots {
            if L::Tag::load(&slot.tag, Ordering::Relaxed) == tag {
                if L::Depth::PRESENT && slot.depth.load(Ordering::Relaxed) > depth {
                    return;
                }
                slot.write(tag, packed, depth);
                counters.overwrite_improve.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        for slot in &bucket.slots {
            if slot.value.load(Ordering::Relaxed) == CACHE_VAL_UNSET {
                slot.write(tag, packed, depth);
                return;
            }
        }

        // Victim selection: evict the shallower entry, then prefer evicting
        // a non-exact bound, then slot 1.
        counters.overwrite_evict.fetch_add(1, Ordering::Relaxed);

        let v0 = bucket.slots[0].value.load(Ordering::Relaxed);
        let v1 = bucket.slots[1].value.load(Ordering::Relaxed);

        let bound_victim = || {
            let zero_exact = unpack_bound(v0) == Bound::Exact;
            let one_exact = unpack_bound(v1) == Bound::Exact;
            if zero_exact != one_exact {
                if zero_exact { 1 } else { 0 }
            } else {
                1
            }
        };

        let victim = if L::Depth::PRESENT {
            let d0 = bucket.slots[0].depth.load(Ordering::Relaxed);
            let d1 = bucket.slots[1].depth.load(Ordering::Relaxed);
            if d1 != d0 {
                if d1 < d0 { 1 } else { 0 }
            } else {
                bound_victim()
            }
        } else {
            bound_victim()
        };

        bucket.slots[victim].write(tag, packed, depth);
    }

    pub fn lookup(
        &self,
        board: &Board,
        key: u64,
        current_depth: Depth,
        counters: &CacheCounters,
    ) -> Option<(Score, Bound, bool)> {
        let (bucket_idx, tag64) = split_key(key, self.size_pow);
        let tag = L::Tag::truncate(tag64);
        let bucket = &self.buckets[bucket_idx as usize];

        let t0 = L::Tag::load(&bucket.slots[0].tag, Ordering::Acquire);
        let t1 = L::Tag::load(&bucket.slots[1].tag, Ordering::Acquire);

        let (slot_idx, first_read) = if t0 == tag {
            (0, t0)
        } else if t1 == tag {
            (1, t1)
        } else {
            return None;
        };

        let slot = &bucket.slots[slot_idx];
        let val = slot.value.load(Ordering::Relaxed);
        let dep = slot.depth.load(Ordering::Relaxed);

        // A concurrent writer that retargeted this slot would have changed
        // the tag; discard the read in that case.
        if L::Tag::load(&slot.tag, Ordering::Acquire) != first_read {
            return None;
        }

        if val == CACHE_VAL_UNSET {
            return None;
        }

        if slot_idx == 1 {
            // Promote to MRU. Plain relaxed swaps: a racing writer can undo
            // or tear the reordering, never an entry.
            let s0 = &bucket.slots[0];
            let s1 = &bucket.slots[1];
            let st0 = L::Tag::load(&s0.tag, Ordering::Relaxed);
            let st1 = L::Tag::load(&s1.tag, Ordering::Relaxed);
            let sv0 = s0.value.load(Ordering::Relaxed);
            let sv1 = s1.value.load(Ordering::Relaxed);
            let sd0 = s0.depth.load(Ordering::Relaxed);
            let sd1 = s1.depth.load(Ordering::Relaxed);

            L::Tag::store(&s0.tag, st1, Ordering::Relaxed);
            L::Tag::store(&s1.tag, st0, Ordering::Relaxed);
            s0.value.store(sv1, Ordering::Relaxed);
            s1.value.store(sv0, Ordering::Relaxed);
            s0.depth.store(sd1, Ordering::Relaxed);
            s1.depth.store(sd0, Ordering::Relaxed);

            counters.lru_swaps.fetch_add(1, Ordering::Relaxed);
        }

        counters.hits.fetch_add(1, Ordering::Relaxed);

        if (dep as Depth) < current_depth {
            return None;
        }

        counters.hits_legal.fetch_add(1, Ordering::Relaxed);

        let score = unpack_eval(val) + score_delta(board);
        Some((score, unpack_bound(val), dep == DEPTH_SOLVED))
    }

    /// Walks every entry to fill the layout-dependent parts of
    /// [`CacheStats`].
    pub fn collect_stats(
        &self,
        stats: &mut CacheStats,
        calc_frag: bool,
        calc_stone_dist: bool,
        calc_depth_dist: bool,
    ) {
        stats.has_depth = <L::Depth as DepthWord>::PRESENT;
        stats.entry_bytes = self.entry_bytes();

        let mut stone_sum = [0u64; BOARD_CELLS];
        let mut stone_count = [0u64; BOARD_CELLS];

        let mut chunk_start = 0u64;
        let mut chunk_size = 0u64;
        let mut chunk_set =
            self.buckets[0].slots[0].value.load(Ordering::Relaxed) != CACHE_VAL_UNSET;

        let mut push_chunk = |stats: &mut CacheStats, start: u64, size: u64, set: bool| {
            let chunk = super::CacheChunk { start, size, set };
            if stats.chunks.len() < OUTPUT_CHUNK_COUNT {
                stats.chunks.push(chunk);
            } else if let Some(min_idx) = stats
                .chunks
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.size)
                .map(|(i, _)| i)
                && stats.chunks[min_idx].size < chunk.size
            {
                stats.chunks[min_idx] = chunk;
            }
        };

        for (i, bucket) in self.buckets.iter().enumerate() {
            for (slot_no, slot) in bucket.slots.iter().enumerate() {
                let val = slot.value.load(Ordering::Relaxed);
                let set = val != CACHE_VAL_UNSET;
                let linear = ((i as u64) << 1) + slot_no as u64;

                if calc_frag {
                    if linear == 0 {
                        chunk_size = 1;
                    } else if set == chunk_set {
                        chunk_size += 1;
                    } else {
                        push_chunk(stats, chunk_start, chunk_size, chunk_set);
                        chunk_set = set;
                        chunk_start = linear;
                        chunk_size = 1;
                    }
                }

                if !set {
                    continue;
                }
                stats.set_entries += 1;

                match unpack_bound(val) {
                    Bound::Exact => stats.exact_count += 1,
                    Bound::Lower => stats.lower_count += 1,
                    Bound::Upper => stats.upper_count += 1,
                }

                if <L::Depth as DepthWord>::PRESENT {
                    let d = slot.depth.load(Ordering::Relaxed);
                    if d == DEPTH_SOLVED {
                        stats.solved_entries += 1;
                    } else {
                        stats.non_solved += 1;
                        stats.depth_sum += d as u64;
                        stats.max_depth = stats.max_depth.max(d);
                    }
                }

                if calc_stone_dist {
                    let tag = L::Tag::load(&slot.tag, Ordering::Relaxed);
                    let code = merge_key(i as u64, tag.widen(), self.size_pow);
                    let probe = L::KEY.untranslate(code);

                    for (k, &stones) in probe.cells.iter().enumerate() {
                        if k == STORE_P1 || k == STORE_P2 {
                            continue;
                        }
                        stone_sum[k] += stones as u64;
                        stone_count[k] += 1;
                        stats.max_stones[k] = stats.max_stones[k].max(stones);
                        if stones > 7 {
                            stats.over7[k] += 1;
                        }
                        if stones > 15 {
                            stats.over15[k] += 1;
                        }
                    }
                }
            }
        }

        if calc_frag {
            push_chunk(stats, chunk_start, chunk_size, chunk_set);
            stats.chunks.sort_by_key(|c| c.start);
        }

        for k in 0..BOARD_CELLS {
            if stone_count[k] > 0 {
                stats.avg_stones[k] = stone_sum[k] as f64 / stone_count[k] as f64;
            }
        }

        if calc_depth_dist && <L::Depth as DepthWord>::PRESENT && stats.non_solved > 0 {
            let span = stats.max_depth as u32 + 1;
            let bin_width = span.div_ceil(stats.depth_bins.len() as u32).max(1);

            for bucket in self.buckets.iter() {
                for slot in &bucket.slots {
                    if slot.value.load(Ordering::Relaxed) == CACHE_VAL_UNSET {
                        continue;
                    }
                    let d = slot.depth.load(Ordering::Relaxed);
                    if d == DEPTH_SOLVED {
                        continue;
                    }
                    let bin = ((d as u32 / bin_width) as usize).min(stats.depth_bins.len() - 1);
                    stats.depth_bins[bin] += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_board(seed: u64) -> (Board, u64) {
        let board = Board::random(2, seed);
        let key = KeyWidth::B60.translate(&board).unwrap();
        (board, key)
    }

    #[test]
    fn store_lookup_round_trip() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();
        let (board, key) = keyed_board(1);

        assert!(table.lookup(&board, key, 0, &counters).is_none());

        table.store(&board, key, 5, Bound::Exact, 7, false, &counters);
        let (score, bound, solved) = table.lookup(&board, key, 7, &counters).unwrap();
        assert_eq!(score, 5);
        assert_eq!(bound, Bound::Exact);
        assert!(!solved);
    }

    #[test]
    fn lookup_respects_depth() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();
        let (board, key) = keyed_board(2);

        table.store(&board, key, -3, Bound::Lower, 4, false, &counters);
        assert!(table.lookup(&board, key, 5, &counters).is_none());
        assert!(table.lookup(&board, key, 4, &counters).is_some());

        // Shallow hits still count as hits, legal ones separately.
        assert_eq!(counters.hits.load(Ordering::Relaxed), 2);
        assert_eq!(counters.hits_legal.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn solved_entries_ignore_depth() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();
        let (board, key) = keyed_board(3);

        table.store(&board, key, 2, Bound::Exact, 1, true, &counters);
        let (score, _, solved) = table.lookup(&board, key, 99, &counters).unwrap();
        assert_eq!(score, 2);
        assert!(solved);
    }

    #[test]
    fn same_key_update_requires_deeper_result() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();
        let (board, key) = keyed_board(4);

        table.store(&board, key, 1, Bound::Exact, 9, false, &counters);
        table.store(&board, key, 2, Bound::Exact, 3, false, &counters);
        let (score, _, _) = table.lookup(&board, key, 0, &counters).unwrap();
        assert_eq!(score, 1);

        table.store(&board, key, 3, Bound::Exact, 9, false, &counters);
        let (score, _, _) = table.lookup(&board, key, 0, &counters).unwrap();
        assert_eq!(score, 3);
    }

    #[test]
    fn value_is_stored_relative_to_stores() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();

        let mut board = Board::random(2, 5);
        board.cells[STORE_P1] = 4;
        board.cells[STORE_P2] = 1;
        let key = KeyWidth::B60.translate(&board).unwrap();

        table.store(&board, key, 10, Bound::Exact, 2, false, &counters);

        // Same play configuration reached with different store totals: the
        // cached value tracks the difference.
        let mut other = board;
        other.cells[STORE_P1] = 0;
        other.cells[STORE_P2] = 2;
        assert_eq!(key, KeyWidth::B60.translate(&other).unwrap());

        let (score, _, _) = table.lookup(&other, key, 2, &counters).unwrap();
        assert_eq!(score, 10 - (4 - 1) + (0 - 2));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let table: Table<DepthK60T32> = Table::new(10);
        let counters = CacheCounters::default();
        let (board, key) = keyed_board(6);

        table.store(&board, key, CACHE_VAL_MAX + 1, Bound::Exact, 2, false, &counters);
        assert!(table.lookup(&board, key, 0, &counters).is_none());
        assert_eq!(counters.fail_range.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn lru_promotion_swaps_slots() {
        let table: Table<DepthK60T32> = Table::new(4);
        let counters = CacheCounters::default();

        // Two keys landing in the same bucket with distinct tags.
        let bucket_mask = (1u64 << 3) - 1;
        let (board_a, key_a) = keyed_board(7);
        let mut pair = None;
        for seed in 8..4096 {
            let (b, k) = keyed_board(seed);
            if k != key_a
                && (k & bucket_mask) == (key_a & bucket_mask)
                && (k >> 3) as u32 != (key_a >> 3) as u32
            {
                pair = Some((b, k));
                break;
            }
        }
        let (board_b, key_b) = pair.expect("no colliding key found");

        table.store(&board_a, key_a, 1, Bound::Exact, 1, false, &counters);
        table.store(&board_b, key_b, 2, Bound::Exact, 1, false, &counters);

        // `key_b` landed in the LRU slot; hitting it swaps it forward.
        assert!(table.lookup(&board_b, key_b, 1, &counters).is_some());
        assert_eq!(counters.lru_swaps.load(Ordering::Relaxed), 1);
        assert!(table.lookup(&board_b, key_b, 1, &counters).is_some());
        assert_eq!(counters.lru_swaps.load(Ordering::Relaxed), 1);
        assert!(table.lookup(&board_a, key_a, 1, &counters).is_some());
        assert_eq!(counters.lru_swaps.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn eviction_prefers_shallow_then_non_exact() {
        let table: Table<DepthK60T32> = Table::new(4);
        let counters = CacheCounters::default();
        let bucket_mask = (1u64 << 3) - 1;

        let (board_a, key_a) = keyed_board(100);
        let mut others: Vec<(Board, u64)> = Vec::new();
        for seed in 101..8192 {
            let (b, k) = keyed_board(seed);
            let tag = (k >> 3) as u32;
            if k != key_a
                && (k & bucket_mask) == (key_a & bucket_mask)
                && tag != (key_a >> 3) as u32
                && !others.iter().any(|&(_, ok)| ok == k || (ok >> 3) as u32 == tag)
            {
                others.push((b, k));
                if others.len() == 2 {
                    break;
                }
            }
        }
        let (board_b, key_b) = others[0];
        let (board_c, key_c) = others[1];

        // Deep entry in slot 0, shallow in slot 1: the shallow one goes.
        table.store(&board_a, key_a, 1, Bound::Exact, 20, false, &counters);
        table.store(&board_b, key_b, 2, Bound::Exact, 3, false, &counters);
        table.store(&board_c, key_c, 3, Bound::Exact, 10, false, &counters);

        assert!(table.lookup(&board_a, key_a, 1, &counters).is_some());
        assert!(table.lookup(&board_c, key_c, 1, &counters).is_some());
        assert!(table.lookup(&board_b, key_b, 1, &counters).is_none());
        assert_eq!(counters.overwrite_evict.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn depth_absent_layout_treats_hits_as_solved() {
        let table: Table<NoDepthK48T16> = Table::new(10);
        let counters = CacheCounters::default();

        let board = Board::random(2, 9);
        let key = KeyWidth::B48.translate(&board).unwrap();

        table.store(&board, key, -4, Bound::Exact, 0, false, &counters);
        let (score, _, solved) = table.lookup(&board, key, 50, &counters).unwrap();
        assert_eq!(score, -4);
        assert!(solved);
    }

    #[test]
    fn concurrent_readers_see_consistent_entries() {
        use std::sync::atomic::AtomicBool;

        let table: Table<DepthK60T32> = Table::new(12);
        let counters = CacheCounters::default();
        let stop = AtomicBool::new(false);

        // Every writer stores value == key % 100 as an exact, solved entry;
        // any successful read must return exactly that pair.
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let table = &table;
                let counters = &counters;
                let stop = &stop;
                s.spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        for seed in (t * 32)..(t * 32 + 32) {
                            let (board, key) = keyed_board(seed);
                            table.store(
                                &board,
                                key,
                                (key % 100) as Score,
                                Bound::Exact,
                                1,
                                true,
                                counters,
                            );
                        }
                    }
                });
            }

            for _ in 0..2 {
                let table = &table;
                let counters = &counters;
                s.spawn(move || {
                    for _ in 0..200 {
                        for seed in 0..128u64 {
                            let (board, key) = keyed_board(seed);
                            if let Some((score, bound, solved)) =
                                table.lookup(&board, key, 1, counters)
                            {
                                assert_eq!(score, (key % 100) as Score);
                                assert_eq!(bound, Bound::Exact);
                                assert!(solved);
                            }
                        }
                    }
                });
            }

            std::thread::sleep(std::time::Duration::from_millis(50));
            stop.store(true, Ordering::Relaxed);
        });
    }

    #[test]
    fn stats_walk_recovers_pit_counts() {
        // 2^17 entries leave exactly 32 tag bits for the 48-bit key, so the
        // inverse mixer can reconstruct the full position.
        let table: Table<DepthK48T32> = Table::new(17);
        let counters = CacheCounters::default();

        let board = Board {
            cells: [3, 0, 7, 1, 0, 12, 0, 2, 2, 0, 5, 1, 8, 0],
            color: 1,
        };
        let key = KeyWidth::B48.translate(&board).unwrap();
        table.store(&board, key, 0, Bound::Exact, 1, false, &counters);

        let mut stats = CacheStats::default();
        table.collect_stats(&mut stats, true, true, true);

        assert_eq!(stats.set_entries, 1);
        assert_eq!(stats.exact_count, 1);
        assert_eq!(stats.max_stones[5], 12);
        assert_eq!(stats.max_stones[0], 3);
        assert!(!stats.chunks.is_empty());
    }
}
