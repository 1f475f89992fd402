//! Move-by-move evaluation: keeps a per-square piece score and, after a
//! move, recomputes only the pieces the move could have touched. Each update
//! pushes an undo record so the search can unwind exactly.

use chess::{BitBoard, ChessMove, Color, Piece, Square};

use crate::board::{raw_attacks, CachedBoard};
use crate::eval;
use crate::types::*;

pub struct IncrementalEval {
    turn: Color,
    piece_values: [i32; 64],
    pieces_evaluation: i32,
    final_evaluation: i32,
    undo_updates: Vec<Vec<(Square, i32)>>,
    undo_pieces_evaluation: Vec<i32>,
    undo_final_evaluation: Vec<i32>,
}

impl IncrementalEval {
    /// Evaluates every piece on the board; pieces of `turn` contribute
    /// positively, the opponent's negatively.
    pub fn new(board: &CachedBoard, turn: Color) -> Self {
        let hang = eval::hanging_context(board);
        let mut piece_values = [0i32; 64];
        let mut pieces_evaluation = 0;
        for piece in board.all_pieces() {
            let value = signed_piece_eval(board, turn, piece, &hang);
            piece_values[piece.to_index()] = value;
            pieces_evaluation += value;
        }
        let mut evaluator = IncrementalEval {
            turn,
            piece_values,
            pieces_evaluation,
            final_evaluation: 0,
            undo_updates: Vec::new(),
            undo_pieces_evaluation: Vec::new(),
            undo_final_evaluation: Vec::new(),
        };
        evaluator.final_evaluation = evaluator.compute_final(board);
        evaluator
    }

    #[inline]
    pub fn evaluation(&self) -> i32 {
        self.final_evaluation
    }

    #[inline]
    pub fn pieces_evaluation(&self) -> i32 {
        self.pieces_evaluation
    }

    /// The squares whose pieces may have changed value: the destination, the
    /// pieces the mover saw from its old and new square, and everything
    /// bearing on either square.
    fn pieces_to_reevaluate(&self, board: &CachedBoard, mv: ChessMove) -> BitBoard {
        let from = mv.get_source();
        let to = mv.get_dest();
        let prev = board
            .prev_board()
            .expect("a move was pushed before reevaluation");
        let occupied_now = *board.inner().combined();
        let attacked_before = raw_attacks(prev, from) & *prev.combined();
        let attacked_after = board.attacks(to) & occupied_now;
        BitBoard::from_square(to)
            | attacked_before & occupied_now
            | attacked_after
            | board.attackers(Color::White, from)
            | board.attackers(Color::Black, from)
            | board.attackers(Color::White, to)
            | board.attackers(Color::Black, to)
    }

    /// Re-evaluates the pieces affected by the move just pushed onto `board`
    /// and returns the updated evaluation.
    pub fn evaluate_after_move(&mut self, board: &CachedBoard) -> i32 {
        let mv = board
            .peek()
            .expect("evaluate_after_move requires a pushed move");
        let from = mv.get_source();
        let to = mv.get_dest();
        let hang = eval::hanging_context(board);

        self.undo_pieces_evaluation.push(self.pieces_evaluation);
        let mut undo: Vec<(Square, i32)> = vec![(from, self.piece_values[from.to_index()])];

        for piece in self.pieces_to_reevaluate(board, mv) {
            undo.push((piece, self.piece_values[piece.to_index()]));
            if piece == to {
                self.clear_en_passant_square(board, mv, &mut undo);
                // The mover left its old square, and whatever stood on the
                // destination is gone.
                self.pieces_evaluation -= self.piece_values[from.to_index()];
                self.piece_values[from.to_index()] = 0;
                self.pieces_evaluation -= self.piece_values[to.to_index()];
            } else {
                self.pieces_evaluation -= self.piece_values[piece.to_index()];
            }
            let value = signed_piece_eval(board, self.turn, piece, &hang);
            self.pieces_evaluation += value;
            self.piece_values[piece.to_index()] = value;
        }
        self.undo_updates.push(undo);

        self.undo_final_evaluation.push(self.final_evaluation);
        self.final_evaluation = self.compute_final(board);
        self.final_evaluation
    }

    /// Drops the contribution of a pawn captured en passant: the capture
    /// landed on an empty square, so the victim sits one rank behind it.
    fn clear_en_passant_square(
        &mut self,
        board: &CachedBoard,
        mv: ChessMove,
        undo: &mut Vec<(Square, i32)>,
    ) {
        let from = mv.get_source();
        let to = mv.get_dest();
        let was_empty = board
            .prev_board()
            .map(|prev| prev.piece_on(to).is_none())
            .unwrap_or(false);
        if board.piece_type_at(to) == Some(Piece::Pawn)
            && square_file(from) != square_file(to)
            && was_empty
        {
            let capturer = board.color_at(to);
            let behind = if capturer == Some(Color::White) { -1 } else { 1 };
            if let Some(victim_square) = add_rank(to, behind) {
                let idx = victim_square.to_index();
                undo.push((victim_square, self.piece_values[idx]));
                self.pieces_evaluation -= self.piece_values[idx];
                self.piece_values[idx] = 0;
            }
        }
    }

    /// Restores the evaluator to the state before the last
    /// `evaluate_after_move`; the caller pops the board itself.
    pub fn undo_move(&mut self) {
        let updates = self
            .undo_updates
            .pop()
            .expect("undo_move without matching evaluate_after_move");
        // Reverse order so the first-recorded snapshot of a square wins.
        for (square, value) in updates.into_iter().rev() {
            self.piece_values[square.to_index()] = value;
        }
        self.pieces_evaluation = self
            .undo_pieces_evaluation
            .pop()
            .expect("pieces evaluation undo stack in sync");
        self.final_evaluation = self
            .undo_final_evaluation
            .pop()
            .expect("final evaluation undo stack in sync");
    }

    fn compute_final(&self, board: &CachedBoard) -> i32 {
        match eval::game_over_eval(board, self.turn) {
            Some(game_over) => game_over,
            None => eval::repetition_eval(board, self.turn, self.pieces_evaluation),
        }
    }
}

fn signed_piece_eval(
    board: &CachedBoard,
    turn: Color,
    piece: Square,
    hang: &eval::Hanging,
) -> i32 {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return 0,
    };
    let value = eval::evaluate_piece(board, color, piece, hang);
    if color == turn {
        value
    } else {
        -value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::hanging_context;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    #[test]
    fn construction_matches_static_pieces_sum() {
        let b = CachedBoard::default();
        let evaluator = IncrementalEval::new(&b, Color::White);
        let hang = hanging_context(&b);
        assert_eq!(
            evaluator.pieces_evaluation(),
            eval::pieces_sum(&b, Color::White, &hang)
        );
    }

    #[test]
    fn push_then_undo_restores_everything() {
        let mut b = CachedBoard::default();
        let mut evaluator = IncrementalEval::new(&b, Color::White);
        let initial_sum = evaluator.pieces_evaluation();
        let initial_final = evaluator.evaluation();
        for mv in b.legal_moves() {
            b.push(mv);
            evaluator.evaluate_after_move(&b);
            evaluator.undo_move();
            b.pop();
            assert_eq!(evaluator.pieces_evaluation(), initial_sum, "sum after {mv}");
            assert_eq!(evaluator.evaluation(), initial_final, "final after {mv}");
        }
    }

    #[test]
    fn incremental_tracks_static_sum_from_the_start_position() {
        let mut b = CachedBoard::default();
        let mut evaluator = IncrementalEval::new(&b, Color::White);
        for mv in b.legal_moves() {
            b.push(mv);
            let incremental = evaluator.evaluate_after_move(&b);
            let hang = hanging_context(&b);
            let static_sum = eval::pieces_sum(&b, Color::White, &hang);
            assert_eq!(
                evaluator.pieces_evaluation(),
                static_sum,
                "pieces sum diverged after {mv}"
            );
            assert_eq!(
                incremental,
                eval::repetition_eval(&b, Color::White, static_sum),
                "final diverged after {mv}"
            );
            evaluator.undo_move();
            b.pop();
        }
    }

    #[test]
    fn en_passant_removes_the_victim_pawn() {
        let mut b = board("rnbqkbnr/pppp1ppp/8/8/4pP2/8/PPPPP1PP/RNBQKBNR b KQkq f3 0 3");
        let mut evaluator = IncrementalEval::new(&b, Color::Black);
        let before = evaluator.pieces_evaluation();
        let ep = ChessMove::new(Square::E4, Square::F3, None);
        assert!(b.is_en_passant(ep));
        b.push(ep);
        evaluator.evaluate_after_move(&b);
        let hang = hanging_context(&b);
        assert_eq!(
            evaluator.pieces_evaluation(),
            eval::pieces_sum(&b, Color::Black, &hang)
        );
        evaluator.undo_move();
        b.pop();
        assert_eq!(evaluator.pieces_evaluation(), before);
    }

    #[test]
    fn capture_updates_material_balance() {
        // White takes the free pawn on b5.
        let mut b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5");
        let mut evaluator = IncrementalEval::new(&b, Color::White);
        let before = evaluator.evaluation();
        b.push(ChessMove::new(Square::C4, Square::B5, None));
        let after = evaluator.evaluate_after_move(&b);
        assert!(after > before, "winning a pawn should raise the evaluation");
        evaluator.undo_move();
        b.pop();
        assert_eq!(evaluator.evaluation(), before);
    }
}
