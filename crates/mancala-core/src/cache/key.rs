//! Reversible, side-invariant position keys.
//!
//! The 12 play-pit counts are packed with the side to move's pits first, so
//! mirrored positions share a key. Store cells are not part of the key: the
//! cached value is stored relative to the current stores instead. The packed
//! counts are then scrambled by two multiply-xorshift rounds whose inverse
//! is used when walking the cache for statistics.

use crate::board::Board;
use crate::constants::*;

const MASK_48: u64 = 0xFFFF_FFFF_FFFF;
const MASK_60: u64 = 0x0FFF_FFFF_FFFF_FFFF;

const MUL_48_A: u64 = 0xFD7_ED55_8CCD;
const MUL_48_B: u64 = 0xFE_1A85_EC53;
const INV_48_B: u64 = 0x3F8_1293_37DB;
const INV_48_A: u64 = 0xE30C_22A5_4005;

const MUL_60_A: u64 = 0xFF51_AFD7_ED55_8CCD;
const MUL_60_B: u64 = 0xC4CE_B9FE_1A85_EC53;
const INV_60_B: u64 = 0x0CB4_B2F8_1293_37DB;
const INV_60_A: u64 = 0x0F74_430C_22A5_4005;

/// Key width of a cache layout: 48 bits (pits capped at 15) or 60 bits
/// (pits capped at 31).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWidth {
    B48,
    B60,
}

impl KeyWidth {
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            KeyWidth::B48 => 48,
            KeyWidth::B60 => 60,
        }
    }

    /// Largest per-pit stone count the packing can hold.
    #[inline]
    pub const fn cell_cap(self) -> u8 {
        match self {
            KeyWidth::B48 => 15,
            KeyWidth::B60 => 31,
        }
    }

    #[inline]
    const fn bits_per_pit(self) -> u32 {
        match self {
            KeyWidth::B48 => 4,
            KeyWidth::B60 => 5,
        }
    }

    /// Packs and mixes a position into a key. Fails when any play pit
    /// exceeds the per-cell cap.
    pub fn translate(self, board: &Board) -> Option<u64> {
        let (own, opp) = if board.color == 1 {
            (LBOUND_P1, LBOUND_P2)
        } else {
            (LBOUND_P2, LBOUND_P1)
        };

        let cap = self.cell_cap();
        let step = self.bits_per_pit();
        let mut packed: u64 = 0;
        let mut offset = 0;

        for base in [own, opp] {
            for i in 0..PITS_PER_SIDE {
                let v = board.cells[base + i];
                if v > cap {
                    return None;
                }
                packed |= (v as u64) << offset;
                offset += step;
            }
        }

        Some(self.mix(packed))
    }

    /// Recovers the canonical position (side to move `+1`, stores empty)
    /// from a key.
    pub fn untranslate(self, key: u64) -> Board {
        let packed = self.unmix(key);

        let mut board = Board::empty();
        let cap = self.cell_cap() as u64;
        let step = self.bits_per_pit();
        let mut offset = 0;

        for base in [LBOUND_P1, LBOUND_P2] {
            for i in 0..PITS_PER_SIDE {
                board.cells[base + i] = ((packed >> offset) & cap) as u8;
                offset += step;
            }
        }
        board
    }

    #[inline]
    fn mix(self, mut h: u64) -> u64 {
        match self {
            KeyWidth::B48 => {
                h ^= h >> 24;
                h = h.wrapping_mul(MUL_48_A) & MASK_48;
                h ^= h >> 24;
                h = h.wrapping_mul(MUL_48_B) & MASK_48;
                h ^= h >> 24;
            }
            KeyWidth::B60 => {
                h ^= h >> 30;
                h = h.wrapping_mul(MUL_60_A) & MASK_60;
                h ^= h >> 30;
                h = h.wrapping_mul(MUL_60_B) & MASK_60;
                h ^= h >> 30;
            }
        }
        h
    }

    #[inline]
    fn unmix(self, mut h: u64) -> u64 {
        match self {
            KeyWidth::B48 => {
                h ^= h >> 24;
                h = h.wrapping_mul(INV_48_B) & MASK_48;
                h ^= h >> 24;
                h = h.wrapping_mul(INV_48_A) & MASK_48;
                h ^= h >> 24;
            }
            KeyWidth::B60 => {
                h ^= h >> 30;
                h = h.wrapping_mul(INV_60_B) & MASK_60;
                h ^= h >> 30;
                h = h.wrapping_mul(INV_60_A) & MASK_60;
                h ^= h >> 30;
            }
        }
        h
    }
}

/// Splits a key into its bucket index and tag for a table of
/// `2^(size_pow - 1)` buckets.
#[inline]
pub fn split_key(key: u64, size_pow: u32) -> (u64, u64) {
    let bucket_mask = (1u64 << (size_pow - 1)) - 1;
    (key & bucket_mask, key >> (size_pow - 1))
}

/// Inverse of [`split_key`].
#[inline]
pub fn merge_key(bucket: u64, tag: u64, size_pow: u32) -> u64 {
    (tag << (size_pow - 1)) | bucket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_side_invariant() {
        let board = Board::random(4, 3);
        let mirror = board.mirrored();

        for width in [KeyWidth::B48, KeyWidth::B60] {
            assert_eq!(width.translate(&board), width.translate(&mirror));
        }
    }

    #[test]
    fn translate_untranslate_round_trip() {
        let board = Board {
            cells: [3, 0, 7, 1, 0, 12, 9, 2, 2, 0, 5, 1, 8, 4],
            color: 1,
        };

        for width in [KeyWidth::B48, KeyWidth::B60] {
            let key = width.translate(&board).unwrap();
            let back = width.untranslate(key);
            // Canonical form: side-to-move pits first, stores dropped.
            assert_eq!(back.cells[..STORE_P1], board.cells[..STORE_P1]);
            assert_eq!(
                back.cells[LBOUND_P2..=HBOUND_P2],
                board.cells[LBOUND_P2..=HBOUND_P2]
            );
            assert_eq!(back.color, 1);
            assert_eq!(back.cells[STORE_P1], 0);
            assert_eq!(back.cells[STORE_P2], 0);
        }

        // With player two to move, their pits come first in canonical form.
        let flipped = Board { color: -1, ..board };
        let key = KeyWidth::B60.translate(&flipped).unwrap();
        let back = KeyWidth::B60.untranslate(key);
        assert_eq!(
            back.cells[..STORE_P1],
            flipped.cells[LBOUND_P2..=HBOUND_P2]
        );
        assert_eq!(
            back.cells[LBOUND_P2..=HBOUND_P2],
            flipped.cells[..STORE_P1]
        );
    }

    #[test]
    fn cell_cap_is_enforced() {
        let mut board = Board::uniform(4);
        board.cells[3] = 16;
        assert_eq!(KeyWidth::B48.translate(&board), None);
        assert!(KeyWidth::B60.translate(&board).is_some());

        board.cells[3] = 32;
        assert_eq!(KeyWidth::B60.translate(&board), None);
    }

    #[test]
    fn split_merge_round_trip() {
        let key = 0x0ABC_DEF0_1234_5678u64;
        for size_pow in [4u32, 20, 24] {
            let (bucket, tag) = split_key(key, size_pow);
            assert!(bucket < (1 << (size_pow - 1)));
            assert_eq!(merge_key(bucket, tag, size_pow), key);
        }
    }

    #[test]
    fn distinct_positions_get_distinct_keys() {
        // The mixer is a bijection, so packed inputs must map 1:1.
        let mut keys = std::collections::HashSet::new();
        for seed in 0..64u64 {
            let board = Board::random(3, seed);
            keys.insert(KeyWidth::B60.translate(&board).unwrap());
        }
        // Mirrored duplicates aside, random boards rarely collide.
        assert!(keys.len() > 32);
    }
}
