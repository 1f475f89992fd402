//! Iterative-deepening driver: a quick fallback pass, then per-depth passes
//! over a soft-tactic filter and the full move list, committing the best
//! result at pass boundaries only so a timeout always has something to play.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::ChessMove;
use log::{debug, error};

use crate::board::CachedBoard;
use crate::classify::MoveFilter;
use crate::search::{search_root, Cancel, LeafEval, Search, SearchParams};
use crate::types::*;

/// Rough multiplier for how much longer one more ply of depth costs; when
/// less than that much budget remains, deepening further is pointless.
const ADDITIONAL_DEPTH_FACTOR: f64 = 5.0;

pub const DEFAULT_MAX_DEPTH: u32 = 10;

#[derive(Clone, Debug)]
pub struct MoveResult {
    pub evaluation: Option<i32>,
    /// `None` is the null move: no legal move existed at the root.
    pub best_move: Option<ChessMove>,
    pub depth: u32,
    pub elapsed: f64,
}

#[inline]
fn is_mating(evaluation: i32) -> bool {
    evaluation >= MAX_MATING_EVAL || evaluation <= MIN_MATING_EVAL
}

/// Replace the stored result only with a pass that produced a real move; a
/// null-move result never overwrites a playable one.
fn set_result(stored: &mut Option<MoveResult>, result: Option<MoveResult>) {
    if let Some(result) = result {
        if result.best_move.is_some() {
            *stored = Some(result);
        }
    }
}

fn run_pass(
    search: &mut Search,
    board: &mut CachedBoard,
    depth: u32,
    filter: MoveFilter,
    leaf: LeafEval,
    max_think_time: Option<f64>,
    start: Instant,
) -> (Option<MoveResult>, bool) {
    let params = SearchParams {
        filter,
        use_tt: true,
        sort_moves: true,
        leaf,
        limits: Default::default(),
    };
    let (score, line) = search_root(search, board, depth, &params);
    let elapsed = start.elapsed().as_secs_f64();
    if search.cancel.is_cancelled() {
        // The pass was cut mid-recursion; its result cannot be trusted.
        return (None, true);
    }

    let best_move = line.first().copied();
    if let Some(mv) = best_move {
        let pv: Vec<String> = line.iter().map(|m| m.to_string()).collect();
        println!(
            "info depth {} score cp {} nodes {} pv {}",
            depth,
            score,
            search.node_count,
            pv.join(" ")
        );
        debug!(
            "depth={} filter={:?} move={} eval={} nodes={} prunes={} tt_hits={} elapsed={:.3}",
            depth, filter, mv, score, search.node_count, search.prune_count, search.tt_hit_count, elapsed
        );
    }
    let result = MoveResult {
        evaluation: Some(score),
        best_move,
        depth,
        elapsed,
    };
    let out_of_budget = max_think_time
        .map(|budget| elapsed > budget / ADDITIONAL_DEPTH_FACTOR)
        .unwrap_or(false);
    // A mate found through a filtered depth-1 pass is not trusted to end the
    // search; an unfiltered one is.
    let mating_stop = is_mating(score) && (depth > 1 || filter == MoveFilter::None);
    let stop_search = mating_stop || out_of_budget;
    (Some(result), stop_search)
}

fn finish(
    stored: Option<MoveResult>,
    board: &CachedBoard,
    start: Instant,
    max_think_time: Option<f64>,
) -> MoveResult {
    match stored {
        Some(result) => result,
        None => {
            error!(
                "no move found within {:?} seconds, playing the first legal move",
                max_think_time
            );
            MoveResult {
                evaluation: None,
                best_move: board.legal_moves().first().copied(),
                depth: 0,
                elapsed: start.elapsed().as_secs_f64(),
            }
        }
    }
}

/// Finds the best move for the side to move within the time budget. The
/// search runs on a copy so the caller's board is untouched when the clock
/// cuts a pass short.
pub fn calculate(
    search: &mut Search,
    board: &CachedBoard,
    max_think_time: Option<f64>,
    max_depth: u32,
    stop: Arc<AtomicBool>,
) -> MoveResult {
    let start = Instant::now();
    let deadline = max_think_time.map(|t| start + Duration::from_secs_f64(t.max(0.001)));
    search.begin(Cancel::new(stop).with_deadline(deadline));
    let mut board = board.clone();

    let legal_moves = board.legal_moves();
    if legal_moves.is_empty() {
        return MoveResult {
            evaluation: None,
            best_move: None,
            depth: 0,
            elapsed: start.elapsed().as_secs_f64(),
        };
    }
    if legal_moves.len() == 1 {
        return MoveResult {
            evaluation: None,
            best_move: Some(legal_moves[0]),
            depth: 0,
            elapsed: start.elapsed().as_secs_f64(),
        };
    }

    let mut stored: Option<MoveResult> = None;

    // Quick fallback pass: depth 1, every move, static leaves.
    let (result, stop_search) = run_pass(
        search,
        &mut board,
        1,
        MoveFilter::None,
        LeafEval::Static,
        max_think_time,
        start,
    );
    set_result(&mut stored, result);
    if stop_search {
        return finish(stored, &board, start, max_think_time);
    }

    // Early tactical pass: only forcing moves, full extension at the leaves.
    let (result, stop_search) = run_pass(
        search,
        &mut board,
        1,
        MoveFilter::HardTactic,
        LeafEval::Extended,
        max_think_time,
        start,
    );
    set_result(&mut stored, result);
    if stop_search {
        return finish(stored, &board, start, max_think_time);
    }

    for depth in 1..=max_depth {
        for filter in [MoveFilter::SoftTactic, MoveFilter::None] {
            if depth == 1 && filter == MoveFilter::SoftTactic {
                continue;
            }
            let (result, stop_search) = run_pass(
                search,
                &mut board,
                depth,
                filter,
                LeafEval::Extended,
                max_think_time,
                start,
            );
            set_result(&mut stored, result);
            if stop_search {
                return finish(stored, &board, start, max_think_time);
            }
        }
    }

    finish(stored, &board, start, max_think_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    fn stop_flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn calc(fen: &str, max_depth: u32) -> MoveResult {
        let b = board(fen);
        let mut search = Search::new(Cancel::unlimited());
        calculate(&mut search, &b, None, max_depth, stop_flag())
    }

    #[test]
    fn single_legal_move_returns_immediately() {
        // The queen check on g7 leaves Kxg7 as the only legal move.
        let result = calc("6k1/5pQp/8/8/8/8/8/6K1 b - - 0 1", 4);
        assert_eq!(result.depth, 0);
        assert_eq!(result.best_move.map(|m| m.to_string()), Some("g8g7".into()));
    }

    #[test]
    fn checkmated_root_returns_the_null_move() {
        let result = calc("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3", 2);
        assert!(result.best_move.is_none());
    }

    #[test]
    fn mate_in_one_stops_the_deepening() {
        let result = calc("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34", 6);
        let mv = result.best_move.expect("a mating move");
        assert_eq!(mv.get_source().to_string(), "f5");
        assert!(["f5d3", "f5h3"].contains(&mv.to_string().as_str()));
        assert!(result.evaluation.map(is_mating).unwrap_or(false));
        // The mate was found long before the depth budget ran out.
        assert!(result.depth <= 2);
    }

    #[test]
    fn takes_the_free_pawn() {
        let result = calc("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5", 1);
        let mv = result.best_move.expect("a move");
        assert_eq!(mv.get_dest().to_string(), "b5");
    }

    #[test]
    fn expired_deadline_still_produces_a_move() {
        let b = board("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        let mut search = Search::new(Cancel::unlimited());
        // A microscopic budget: the fallback machinery must still answer.
        let result = calculate(&mut search, &b, Some(0.001), 6, stop_flag());
        assert!(result.best_move.is_some());
    }

    #[test]
    fn null_result_never_overwrites_a_real_one() {
        let real = MoveResult {
            evaluation: Some(10),
            best_move: Some(ChessMove::new(chess::Square::E2, chess::Square::E4, None)),
            depth: 1,
            elapsed: 0.0,
        };
        let null = MoveResult {
            evaluation: Some(999),
            best_move: None,
            depth: 2,
            elapsed: 0.0,
        };
        let mut stored = None;
        set_result(&mut stored, Some(real.clone()));
        set_result(&mut stored, Some(null));
        assert_eq!(
            stored.and_then(|r| r.best_move),
            real.best_move
        );
    }
}
