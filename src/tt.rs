//! Bucketed transposition table keyed by the position hash. Entries remember
//! which side the score was computed for; a probe from the other side negates
//! it. Replacement prefers entries from older searches, then shallower ones.

use chess::{ChessMove, Color};

use crate::board::CachedBoard;
use crate::types::{pack_move, unpack_move};

pub const DEFAULT_TT_KEYS: usize = 8 * 1024;
pub const TT_SUB_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    Lower,
    Upper,
}

#[derive(Clone, Copy, Debug)]
struct TtEntry {
    zobrist: u64,
    score: i32,
    bound: Bound,
    depth: u32,
    age: u32,
    best: u16,
    turn: Color,
}

/// A probe result with the score already oriented for the asking side.
#[derive(Clone, Copy, Debug)]
pub struct TtHit {
    pub score: i32,
    pub bound: Bound,
    pub depth: u32,
    pub best_move: Option<ChessMove>,
}

pub struct TranspositionTable {
    buckets: Vec<[Option<TtEntry>; TT_SUB_SIZE]>,
    age: u32,
}

impl Default for TranspositionTable {
    fn default() -> Self {
        let keys = std::env::var("SKEWER_TT_KEYS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_TT_KEYS);
        Self::with_keys(keys)
    }
}

impl TranspositionTable {
    pub fn with_keys(keys: usize) -> Self {
        TranspositionTable {
            buckets: vec![[None; TT_SUB_SIZE]; keys.max(1)],
            age: 0,
        }
    }

    /// Called once per top-level search so stale entries age out.
    pub fn bump_age(&mut self) {
        self.age = self.age.wrapping_add(1);
    }

    #[inline]
    fn index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    pub fn store(
        &mut self,
        board: &CachedBoard,
        alpha: i32,
        beta: i32,
        score: i32,
        best_move: Option<ChessMove>,
        depth: u32,
        turn: Color,
    ) {
        let bound = if score <= alpha {
            Bound::Upper
        } else if score >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        let hash = board.hash();
        let index = self.index(hash);
        let age = self.age;
        let bucket = &mut self.buckets[index];

        let entry = TtEntry {
            zobrist: hash,
            score,
            bound,
            depth,
            age,
            best: best_move.map(pack_move).unwrap_or(0),
            turn,
        };

        // An existing entry for the same position wins unless ours is at
        // least as deep (and exact on ties).
        for slot in bucket.iter_mut() {
            if let Some(existing) = slot {
                if existing.zobrist == hash {
                    if existing.depth > depth {
                        return;
                    }
                    if bound != Bound::Exact && existing.depth == depth {
                        return;
                    }
                    *slot = Some(entry);
                    return;
                }
            }
        }

        // Otherwise evict: any slot from an older search first, else the
        // shallowest.
        let mut victim = 0;
        let mut victim_depth = u32::MAX;
        for (i, slot) in bucket.iter().enumerate() {
            match slot {
                None => {
                    victim = i;
                    victim_depth = 0;
                    break;
                }
                Some(existing) if existing.age != age => {
                    victim = i;
                    victim_depth = 0;
                    break;
                }
                Some(existing) => {
                    if existing.depth < victim_depth {
                        victim_depth = existing.depth;
                        victim = i;
                    }
                }
            }
        }
        bucket[victim] = Some(entry);
    }

    /// First matching entry whose best move is absent or still legal here;
    /// scores stored for the other side come back negated.
    pub fn lookup(&self, board: &CachedBoard, turn: Color) -> Option<TtHit> {
        let hash = board.hash();
        let bucket = &self.buckets[self.index(hash)];
        for slot in bucket.iter().flatten() {
            if slot.zobrist != hash {
                continue;
            }
            let best_move = unpack_move(slot.best);
            if let Some(mv) = best_move {
                if !board.is_legal(mv) {
                    continue;
                }
            }
            let score = if slot.turn == turn {
                slot.score
            } else {
                -slot.score
            };
            return Some(TtHit {
                score,
                bound: slot.bound,
                depth: slot.depth,
                best_move,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Square;

    fn mv(from: Square, to: Square) -> ChessMove {
        ChessMove::new(from, to, None)
    }

    #[test]
    fn store_and_lookup_round_trip() {
        let board = CachedBoard::default();
        let mut tt = TranspositionTable::with_keys(64);
        let best = mv(Square::E2, Square::E4);
        tt.store(&board, -100, 100, 42, Some(best), 3, Color::White);
        let hit = tt.lookup(&board, Color::White).expect("stored entry");
        assert_eq!(hit.score, 42);
        assert_eq!(hit.bound, Bound::Exact);
        assert_eq!(hit.depth, 3);
        assert_eq!(hit.best_move, Some(best));
    }

    #[test]
    fn score_is_negated_for_the_other_side() {
        let board = CachedBoard::default();
        let mut tt = TranspositionTable::with_keys(64);
        tt.store(&board, -100, 100, 42, None, 3, Color::White);
        let hit = tt.lookup(&board, Color::Black).expect("stored entry");
        assert_eq!(hit.score, -42);
    }

    #[test]
    fn bounds_follow_the_window() {
        let board = CachedBoard::default();
        let mut tt = TranspositionTable::with_keys(64);
        tt.store(&board, 0, 100, -5, None, 1, Color::White);
        assert_eq!(tt.lookup(&board, Color::White).unwrap().bound, Bound::Upper);
        tt.store(&board, 0, 100, 150, None, 2, Color::White);
        assert_eq!(tt.lookup(&board, Color::White).unwrap().bound, Bound::Lower);
    }

    #[test]
    fn deeper_entries_are_not_overwritten() {
        let board = CachedBoard::default();
        let mut tt = TranspositionTable::with_keys(64);
        tt.store(&board, -100, 100, 42, None, 5, Color::White);
        tt.store(&board, -100, 100, 7, None, 2, Color::White);
        assert_eq!(tt.lookup(&board, Color::White).unwrap().score, 42);
    }

    #[test]
    fn entries_with_illegal_best_moves_are_skipped() {
        let board = CachedBoard::default();
        let mut tt = TranspositionTable::with_keys(64);
        // e4e5 is not legal in the start position.
        tt.store(
            &board,
            -100,
            100,
            42,
            Some(mv(Square::E4, Square::E5)),
            3,
            Color::White,
        );
        assert!(tt.lookup(&board, Color::White).is_none());
    }
}
