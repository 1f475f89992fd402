//! Tactical extension at main-search leaves: instead of trusting the static
//! score, follow a budgeted set of forcing moves (checks, quality captures,
//! promotions, new threats) with the incremental evaluator supplying cheap
//! scores along the way.

use std::collections::HashMap;

use chess::{ChessMove, Color};

use crate::board::CachedBoard;
use crate::classify;
use crate::eval;
use crate::eval::endgame;
use crate::incremental::IncrementalEval;
use crate::mate;

/// Per-category budgets carried down the extension recursion.
#[derive(Clone, Copy, Debug)]
pub struct ExtensionLimits {
    pub checks: i32,
    pub promotions: i32,
    pub captures: i32,
    pub attacks_defends: i32,
    pub max_plies: i32,
    pub max_loss: i32,
    pub forced_mate_depth: u32,
}

impl Default for ExtensionLimits {
    fn default() -> Self {
        ExtensionLimits {
            checks: 0,
            promotions: 1,
            captures: 8,
            attacks_defends: 0,
            max_plies: 20,
            max_loss: 200,
            forced_mate_depth: 2,
        }
    }
}

#[derive(Clone, Copy)]
struct Budgets {
    checks: i32,
    promotions: i32,
    captures: i32,
    attacks_defends: i32,
    moves_remaining: i32,
}

impl Budgets {
    fn exhausted(&self) -> bool {
        self.checks <= 0
            && self.promotions <= 0
            && self.captures <= 0
            && self.attacks_defends <= 0
    }
}

impl From<&ExtensionLimits> for Budgets {
    fn from(limits: &ExtensionLimits) -> Self {
        Budgets {
            checks: limits.checks,
            promotions: limits.promotions,
            captures: limits.captures,
            attacks_defends: limits.attacks_defends,
            moves_remaining: limits.max_plies,
        }
    }
}

const MEMO_CAPACITY: usize = 4096;

type ScoredLine = (i32, Vec<ChessMove>);

/// One extension invocation; the transposition memo lives exactly as long as
/// this value.
pub struct TacticalExtension {
    turn: Color,
    max_loss: i32,
    evaluator: Option<IncrementalEval>,
    start_evaluation: Option<i32>,
    memo: HashMap<u64, ScoredLine>,
}

/// Has the side to move already shed `max_loss` centipawns against the
/// evaluation the extension started from?
fn is_past_max_loss(
    board_turn: Color,
    evaluating_turn: Color,
    start_evaluation: i32,
    current_evaluation: i32,
    max_loss: i32,
) -> bool {
    (evaluating_turn != board_turn && start_evaluation - current_evaluation >= max_loss)
        || (evaluating_turn == board_turn && start_evaluation - current_evaluation <= -max_loss)
}

impl TacticalExtension {
    pub fn new(turn: Color, max_loss: i32) -> Self {
        TacticalExtension {
            turn,
            max_loss,
            evaluator: None,
            start_evaluation: None,
            memo: HashMap::new(),
        }
    }

    /// Entry point: mate probe, endgame handoff, then the budgeted expansion.
    pub fn search(
        &mut self,
        board: &mut CachedBoard,
        limits: &ExtensionLimits,
    ) -> ScoredLine {
        if let Some(game_over) = eval::game_over_eval(board, self.turn) {
            return (game_over, Vec::new());
        }
        if endgame::is_endgame(board) {
            return (eval::evaluate(board, self.turn), Vec::new());
        }
        let forced_mate = mate::search_getting_mated(board, self.turn, limits.forced_mate_depth);
        if forced_mate.0 != 0 {
            return forced_mate;
        }
        self.search_helper(board, Budgets::from(limits))
    }

    /// Pushes `mv`, scores the child (through the memo when possible), pops,
    /// and folds the result into the running best.
    fn expand(
        &mut self,
        board: &mut CachedBoard,
        mv: ChessMove,
        maximizing: bool,
        min_or_max: Option<ScoredLine>,
        budgets: Budgets,
    ) -> Option<ScoredLine> {
        board.push(mv);
        let evaluation = match self.memo.get(&board.hash()) {
            Some(cached) => cached.clone(),
            None => {
                let result = self.search_helper(board, budgets);
                if self.memo.len() < MEMO_CAPACITY {
                    self.memo.insert(board.hash(), result.clone());
                }
                if let Some(evaluator) = self.evaluator.as_mut() {
                    evaluator.undo_move();
                }
                result
            }
        };
        board.pop();

        let replace = match &min_or_max {
            None => true,
            Some(best) => {
                if maximizing {
                    evaluation.0 > best.0
                } else {
                    evaluation.0 < best.0
                }
            }
        };
        if replace {
            let mut line = vec![mv];
            line.extend(evaluation.1);
            Some((evaluation.0, line))
        } else {
            min_or_max
        }
    }

    fn search_helper(&mut self, board: &mut CachedBoard, budgets: Budgets) -> ScoredLine {
        let standing = match self.evaluator.as_mut() {
            None => {
                let evaluator = IncrementalEval::new(board, self.turn);
                let evaluation = evaluator.evaluation();
                self.evaluator = Some(evaluator);
                evaluation
            }
            Some(evaluator) => evaluator.evaluate_after_move(board),
        };
        let mut min_or_max: ScoredLine = (standing, Vec::new());
        let start_evaluation = *self.start_evaluation.get_or_insert(standing);

        let mut budgets = budgets;
        if is_past_max_loss(
            board.turn(),
            self.turn,
            start_evaluation,
            standing,
            self.max_loss,
        ) {
            // The line has already cost too much; wind it down fast.
            budgets.checks = 0;
            budgets.promotions = 0;
            budgets.attacks_defends = 0;
            budgets.captures = budgets.captures.min(1);
            budgets.moves_remaining = 1;
        }

        if budgets.moves_remaining == 0
            || budgets.exhausted()
            || board.is_checkmate()
            || board.is_stalemate()
            || board.is_insufficient_material()
        {
            return min_or_max;
        }

        let maximizing = board.turn() == self.turn;
        let legal_moves = board.legal_moves();

        if let Some(&mating) = legal_moves.iter().find(|&&m| board.gives_checkmate(m)) {
            let mut next = budgets;
            next.moves_remaining -= 1;
            return self
                .expand(board, mating, maximizing, Some(min_or_max), next)
                .expect("expand always yields a line when seeded");
        }

        if board.is_check() {
            // Every response matters; the standing score no longer applies.
            let mut best: Option<ScoredLine> = None;
            for mv in legal_moves {
                let mut next = budgets;
                next.moves_remaining -= 1;
                best = self.expand(board, mv, maximizing, best, next);
            }
            return best.unwrap_or(min_or_max);
        }

        let mut best = Some(min_or_max);
        for mv in legal_moves {
            if budgets.checks > 0 && board.gives_check(mv) {
                let mut next = budgets;
                next.checks -= 1;
                if !board.is_capture(mv) {
                    // Quiet checks also burn capture budget to cap the
                    // total tactical depth.
                    next.captures = (next.captures - 1).max(0);
                }
                next.moves_remaining -= 1;
                best = self.expand(board, mv, maximizing, best, next);
            } else if budgets.captures > 0 && classify::is_good_capture(board, mv) {
                let mut next = budgets;
                next.captures -= 1;
                next.checks = (next.checks - 1).max(0);
                next.moves_remaining -= 1;
                best = self.expand(board, mv, maximizing, best, next);
            } else if budgets.promotions > 0 && classify::is_pawn_promotion(mv) {
                let mut next = budgets;
                next.promotions -= 1;
                next.moves_remaining -= 1;
                best = self.expand(board, mv, maximizing, best, next);
            } else if budgets.attacks_defends > 0 && classify::make_or_relieve_threat(board, mv) {
                let mut next = budgets;
                next.attacks_defends -= 1;
                next.moves_remaining -= 1;
                best = self.expand(board, mv, maximizing, best, next);
            }
        }
        best.expect("seeded with the standing evaluation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chess::Square;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    fn extend(fen: &str, turn: Color) -> ScoredLine {
        let mut b = board(fen);
        let limits = ExtensionLimits::default();
        TacticalExtension::new(turn, limits.max_loss).search(&mut b, &limits)
    }

    #[test]
    fn finds_the_forced_mate_first() {
        let (score, pv) = extend("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34", Color::Black);
        assert_eq!(score, MAX_EVAL - 1);
        assert_eq!(pv[0].get_source(), Square::F5);
    }

    #[test]
    fn takes_the_hanging_piece_at_the_leaf() {
        // The black queen on d5 hangs to the e4 pawn; the extension must
        // realize the win instead of trusting the standing score.
        let fen = "4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1";
        let (score, pv) = extend(fen, Color::White);
        assert!(score > 150, "extension missed the hanging queen: {score}");
        assert_eq!(pv.first().copied(), Some(ChessMove::new(Square::E4, Square::D5, None)));
    }

    #[test]
    fn quiet_position_returns_the_standing_evaluation() {
        let mut b = CachedBoard::default();
        let limits = ExtensionLimits::default();
        let (score, pv) = TacticalExtension::new(Color::White, limits.max_loss)
            .search(&mut b, &limits);
        // Nothing tactical in the start position.
        assert!(pv.is_empty());
        assert!(score.abs() < 100);
    }

    #[test]
    fn board_is_unwound_after_the_search() {
        let mut b = board("r1bqkb1r/ppp1pppp/5P2/8/3p4/2N5/PPP1PPPP/R1BQKB1R b KQkq - 0 6");
        let fen_before = b.fen();
        let limits = ExtensionLimits::default();
        let _ = TacticalExtension::new(Color::Black, limits.max_loss).search(&mut b, &limits);
        assert_eq!(b.fen(), fen_before);
    }

    #[test]
    fn endgame_positions_use_the_endgame_evaluator() {
        let (score, pv) = extend("4k3/8/8/8/8/8/8/R3K3 w - - 0 1", Color::White);
        assert!(score >= 500_000);
        assert!(pv.is_empty());
    }

    #[test]
    fn max_loss_cuts_runaway_lines() {
        // A wild middlegame; mostly checks that the search terminates and
        // leaves the board intact with tight budgets.
        let mut b = board("r1n2n1k/pp4b1/2p3QN/2Pp4/1P1P2P1/P3r2q/1B6/R4RK1 w - - 2 28");
        let fen_before = b.fen();
        let limits = ExtensionLimits {
            max_loss: 50,
            ..ExtensionLimits::default()
        };
        let _ = TacticalExtension::new(Color::White, limits.max_loss).search(&mut b, &limits);
        assert_eq!(b.fen(), fen_before);
    }
}
