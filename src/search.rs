//! Fixed-side alpha-beta search. The side the score is for (`turn`) stays
//! constant down the tree: nodes where that side moves maximize, the others
//! minimize. Leaves hand off to the tactical extension (or the bare static
//! evaluator for the quick fallback pass).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chess::{ChessMove, Color, Piece};

use crate::board::CachedBoard;
use crate::classify::MoveFilter;
use crate::eval;
use crate::extension::{ExtensionLimits, TacticalExtension};
use crate::tt::{Bound, TranspositionTable};
use crate::types::*;

/// Cooperative cancellation: a flag the UCI thread can flip plus a soft
/// wall-clock deadline, polled at every node.
#[derive(Clone)]
pub struct Cancel {
    stop: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancel {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Cancel {
            stop,
            deadline: None,
        }
    }

    pub fn unlimited() -> Self {
        Cancel::new(Arc::new(AtomicBool::new(false)))
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
            || self
                .deadline
                .map(|d| Instant::now() >= d)
                .unwrap_or(false)
    }
}

/// What to do when the search runs out of depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafEval {
    /// Plain static evaluation; used by the quick fallback pass.
    Static,
    /// Expand tactical moves first.
    Extended,
}

#[derive(Clone, Copy)]
pub struct SearchParams {
    pub filter: MoveFilter,
    pub use_tt: bool,
    pub sort_moves: bool,
    pub leaf: LeafEval,
    pub limits: ExtensionLimits,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            filter: MoveFilter::None,
            use_tt: true,
            sort_moves: true,
            leaf: LeafEval::Extended,
            limits: ExtensionLimits::default(),
        }
    }
}

/// Per-search state: the table, the counters, and the cancellation token.
pub struct Search {
    pub tt: TranspositionTable,
    pub cancel: Cancel,
    pub node_count: u64,
    pub prune_count: u64,
    pub tt_hit_count: u64,
}

impl Search {
    pub fn new(cancel: Cancel) -> Self {
        Search {
            tt: TranspositionTable::default(),
            cancel,
            node_count: 0,
            prune_count: 0,
            tt_hit_count: 0,
        }
    }

    /// Reset the counters and age the table before a new top-level search.
    pub fn begin(&mut self, cancel: Cancel) {
        self.cancel = cancel;
        self.node_count = 0;
        self.prune_count = 0;
        self.tt_hit_count = 0;
        self.tt.bump_age();
    }
}

/// A score with the line that produced it; an empty line means "stand pat"
/// (the null move or a leaf).
pub type ScoredLine = (i32, Vec<ChessMove>);

/// Mating scores shrink by one per ply on the way up so nearer mates win.
#[inline]
fn mate_depth_adjusted(score: i32) -> i32 {
    if score >= MAX_MATING_EVAL {
        score - 1
    } else if score <= MIN_MATING_EVAL {
        score + 1
    } else {
        score
    }
}

/// Cheap ordering: checks first, then captures by victim-minus-attacker,
/// quiet moves last, the pass after everything.
fn mvv_lva_value(board: &CachedBoard, mv: Option<ChessMove>) -> i32 {
    let mv = match mv {
        Some(mv) => mv,
        None => return -2000,
    };
    if board.gives_check(mv) {
        return 1000;
    }
    if !board.is_capture(mv) {
        return -1000;
    }
    let victim = eval::victim_value(board, mv);
    let attacker = match board.piece_type_at(mv.get_source()) {
        Some(Piece::King) | None => 0,
        Some(piece) => piece_value(piece),
    };
    victim - attacker
}

fn leaf_value(
    board: &mut CachedBoard,
    turn: Color,
    params: &SearchParams,
) -> ScoredLine {
    match params.leaf {
        LeafEval::Static => (eval::evaluate(board, turn), Vec::new()),
        LeafEval::Extended => {
            TacticalExtension::new(turn, params.limits.max_loss).search(board, &params.limits)
        }
    }
}

/// Alpha-beta with an optional frontier move filter. At depth 1 the filter
/// prunes the candidate list but the null move is always appended, so the
/// side to move may stand pat rather than play the only (bad) tactic.
pub fn alpha_beta(
    search: &mut Search,
    board: &mut CachedBoard,
    depth: u32,
    turn: Color,
    mut alpha: i32,
    mut beta: i32,
    params: &SearchParams,
) -> ScoredLine {
    search.node_count += 1;
    if search.cancel.is_cancelled() {
        // Unwind with a harmless bound; the driver discards this pass.
        return (if board.turn() == turn { alpha } else { beta }, Vec::new());
    }
    if depth == 0 || board.is_game_over() {
        return leaf_value(board, turn, params);
    }

    if params.use_tt {
        if let Some(hit) = search.tt.lookup(board, turn) {
            if hit.depth >= depth {
                let line = hit.best_move.map(|m| vec![m]).unwrap_or_default();
                match hit.bound {
                    Bound::Exact => {
                        search.tt_hit_count += 1;
                        return (hit.score, line);
                    }
                    Bound::Lower if hit.score >= beta => {
                        search.tt_hit_count += 1;
                        return (hit.score, line);
                    }
                    Bound::Upper if hit.score <= alpha => {
                        search.tt_hit_count += 1;
                        return (hit.score, line);
                    }
                    _ => {}
                }
            }
        }
    }

    let filtered_frontier = depth == 1 && params.filter != MoveFilter::None;
    let legal_moves = board.legal_moves();
    let mut moves: Vec<Option<ChessMove>> = legal_moves.iter().copied().map(Some).collect();
    if filtered_frontier {
        moves.retain(|&m| params.filter.passes(board, m));
        if !board.is_check() {
            moves.push(None);
        }
        if moves.is_empty() {
            // The filter can empty a check-evasion list for exotic filters;
            // fall back to everything rather than inventing a result.
            moves = legal_moves.iter().copied().map(Some).collect();
        }
    }
    if params.sort_moves {
        moves.sort_by_key(|&m| std::cmp::Reverse(mvv_lva_value(board, m)));
    }

    let maximizing = board.turn() == turn;
    let orig_alpha = alpha;
    let orig_beta = beta;
    // Seed with the first candidate so a fully losing node still returns a
    // playable move.
    let mut best: ScoredLine = (
        if maximizing { MIN_EVAL } else { MAX_EVAL },
        moves[0].map(|m| vec![m]).unwrap_or_default(),
    );

    for m in moves {
        if search.cancel.is_cancelled() {
            break;
        }
        let pushed = match m {
            Some(mv) => {
                board.push(mv);
                true
            }
            None => board.push_null(),
        };
        if !pushed {
            continue;
        }
        let (child_score, child_line) = alpha_beta(search, board, depth - 1, turn, alpha, beta, params);
        board.pop();
        let score = mate_depth_adjusted(child_score);

        let improves = if maximizing {
            score > best.0
        } else {
            score < best.0
        };
        if improves {
            let mut line: Vec<ChessMove> = Vec::with_capacity(child_line.len() + 1);
            if let Some(mv) = m {
                line.push(mv);
            }
            line.extend(child_line);
            best = (score, line);
        }
        if maximizing {
            alpha = alpha.max(best.0);
        } else {
            beta = beta.min(best.0);
        }
        if beta <= alpha {
            search.prune_count += 1;
            break;
        }
    }

    // A cancelled node carries partial bounds, and a filtered frontier saw
    // only a slice of the moves; keep both out of the table.
    if params.use_tt && !filtered_frontier && !search.cancel.is_cancelled() {
        search.tt.store(
            board,
            orig_alpha,
            orig_beta,
            best.0,
            best.1.first().copied(),
            depth,
            turn,
        );
    }
    best
}

/// Search from the root for the side to move, over the full window.
pub fn search_root(
    search: &mut Search,
    board: &mut CachedBoard,
    depth: u32,
    params: &SearchParams,
) -> ScoredLine {
    let turn = board.turn();
    alpha_beta(search, board, depth, turn, MIN_EVAL, MAX_EVAL, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    fn quick_params() -> SearchParams {
        SearchParams {
            sort_moves: true,
            use_tt: false,
            ..SearchParams::default()
        }
    }

    #[test]
    fn finds_the_free_pawn_at_depth_one() {
        let mut b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5");
        let mut search = Search::new(Cancel::unlimited());
        let (score, line) = search_root(&mut search, &mut b, 1, &quick_params());
        let first = line.first().expect("a move is always returned");
        assert_eq!(first.get_dest().to_string(), "b5", "expected the free pawn to fall");
        assert!(score > 0);
    }

    #[test]
    fn mate_in_one_is_found_and_preferred() {
        let mut b = board("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34");
        let mut search = Search::new(Cancel::unlimited());
        let (score, line) = search_root(&mut search, &mut b, 1, &quick_params());
        assert!(score >= MAX_MATING_EVAL, "expected a mating score, got {score}");
        let first = line.first().expect("mating line");
        assert_eq!(first.get_source().to_string(), "f5");
    }

    // Reference minimax without any pruning, for equivalence checks.
    fn plain_minimax(b: &mut CachedBoard, depth: u32, turn: Color) -> i32 {
        if depth == 0 || b.is_game_over() {
            return eval::evaluate(b, turn);
        }
        let maximizing = b.turn() == turn;
        let mut best = if maximizing { MIN_EVAL } else { MAX_EVAL };
        for mv in b.legal_moves() {
            b.push(mv);
            let score = mate_depth_adjusted(plain_minimax(b, depth - 1, turn));
            b.pop();
            if maximizing {
                best = best.max(score);
            } else {
                best = best.min(score);
            }
        }
        best
    }

    #[test]
    fn pruning_does_not_change_the_score() {
        let fens = [
            "rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5",
            "r1bqkb1r/ppp1pppp/5P2/8/3p4/2N5/PPP1PPPP/R1BQKB1R b KQkq - 0 6",
        ];
        for fen in fens {
            let params = SearchParams {
                sort_moves: true,
                use_tt: false,
                leaf: LeafEval::Static,
                ..SearchParams::default()
            };
            let mut pruned_board = board(fen);
            let mut search = Search::new(Cancel::unlimited());
            let (pruned, _) = search_root(&mut search, &mut pruned_board, 2, &params);

            let mut reference_board = board(fen);
            let turn = reference_board.turn();
            let reference = plain_minimax(&mut reference_board, 2, turn);
            assert_eq!(pruned, reference, "score differs for {fen}");

            // Move ordering must not change the result either.
            let mut unsorted_board = board(fen);
            let params = SearchParams {
                sort_moves: false,
                ..params
            };
            let (unsorted, _) = search_root(&mut search, &mut unsorted_board, 2, &params);
            assert_eq!(pruned, unsorted, "ordering changed the score for {fen}");
        }
    }

    #[test]
    fn cancelled_search_unwinds_quickly() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut b = CachedBoard::default();
        let mut search = Search::new(Cancel::new(stop));
        let before = b.fen();
        let _ = search_root(&mut search, &mut b, 6, &quick_params());
        assert_eq!(b.fen(), before);
        assert!(search.node_count <= 2);
    }

    #[test]
    fn tt_hit_short_circuits_re_search() {
        let mut b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5");
        let mut search = Search::new(Cancel::unlimited());
        let params = SearchParams {
            leaf: LeafEval::Static,
            ..SearchParams::default()
        };
        let first = search_root(&mut search, &mut b, 2, &params);
        let nodes_first = search.node_count;
        search.node_count = 0;
        let second = search_root(&mut search, &mut b, 2, &params);
        assert_eq!(first.0, second.0);
        assert!(search.node_count < nodes_first);
    }

    #[test]
    fn filtered_depth_one_still_offers_the_pass() {
        // A quiet position where no tactical move exists: with the soft
        // filter at depth 1 the only candidate is the pass.
        let mut b = board("4k3/pppp4/8/8/8/8/PPPP4/4K3 w - - 0 1");
        let mut search = Search::new(Cancel::unlimited());
        let params = SearchParams {
            filter: MoveFilter::HardTactic,
            use_tt: false,
            leaf: LeafEval::Static,
            ..SearchParams::default()
        };
        let (_, line) = search_root(&mut search, &mut b, 1, &params);
        // Either a real quiet move survived the filter or the pass won; the
        // search must not crash and must leave the board untouched.
        assert!(line.len() <= 1);
    }
}
