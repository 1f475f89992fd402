//! Predicates over (position, move) used to filter moves at shallow search
//! depths and to pick which moves the tactical extension follows. The null
//! move (a pass) always passes every filter so a side is never forced into
//! the only "tactical" blunder available.

use chess::{BitBoard, ChessMove, Piece, Square, EMPTY};

use crate::attacks;
use crate::board::CachedBoard;
use crate::eval::pawn::is_passed_pawn;
use crate::types::*;

/// Which moves a search pass considers at its frontier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveFilter {
    /// Every legal move.
    None,
    /// Responses to check, quality captures, promotions.
    HardTactic,
    /// Anything with tactical potential.
    SoftTactic,
    /// The complement of `SoftTactic`.
    NonTactic,
    /// Soft tactics that are not already hard tactics.
    SoftNotHard,
}

impl MoveFilter {
    /// `mv = None` is the null move and always passes.
    pub fn passes(self, board: &mut CachedBoard, mv: Option<ChessMove>) -> bool {
        let mv = match mv {
            Some(mv) => mv,
            None => return true,
        };
        match self {
            MoveFilter::None => true,
            MoveFilter::HardTactic => is_hard_tactic(board, mv),
            MoveFilter::SoftTactic => is_soft_tactic(board, mv),
            MoveFilter::NonTactic => !is_soft_tactic(board, mv),
            MoveFilter::SoftNotHard => {
                is_soft_tactic(board, mv) && !is_hard_tactic(board, mv)
            }
        }
    }
}

#[inline]
pub fn is_check(board: &CachedBoard, mv: ChessMove) -> bool {
    board.gives_check(mv)
}

#[inline]
pub fn is_capture(board: &CachedBoard, mv: ChessMove) -> bool {
    board.is_capture(mv)
}

#[inline]
pub fn is_pawn_promotion(mv: ChessMove) -> bool {
    mv.get_promotion().is_some()
}

/// The mover is a passed pawn stepping towards promotion.
pub fn is_pawn_advance_to_promote(board: &CachedBoard, mv: ChessMove) -> bool {
    board.piece_type_at(mv.get_source()) == Some(Piece::Pawn)
        && is_passed_pawn(board, mv.get_source())
}

/// Taking something of roughly equal value; en passant always qualifies.
pub fn is_equal_value_trade(board: &CachedBoard, mv: ChessMove) -> bool {
    if board.is_en_passant(mv) {
        return true;
    }
    match (
        board.piece_type_at(mv.get_source()),
        board.piece_type_at(mv.get_dest()),
    ) {
        (Some(from), Some(to)) => rough_value(from) == rough_value(to),
        _ => false,
    }
}

pub fn is_higher_value_trade(board: &CachedBoard, mv: ChessMove) -> bool {
    match (
        board.piece_type_at(mv.get_source()),
        board.piece_type_at(mv.get_dest()),
    ) {
        (Some(from), Some(to)) => rough_value(from) < rough_value(to),
        _ => false,
    }
}

/// Capturing a piece that cannot be held.
pub fn is_hanging_piece_capture(board: &CachedBoard, mv: ChessMove) -> bool {
    if board.piece_type_at(mv.get_dest()).is_none() && !board.is_en_passant(mv) {
        return false;
    }
    attacks::is_soft_free_to_take(board, mv.get_dest())
}

/// A capture that is at worst a fair trade.
pub fn is_good_capture(board: &CachedBoard, mv: ChessMove) -> bool {
    board.is_capture(mv)
        && (is_equal_value_trade(board, mv)
            || is_higher_value_trade(board, mv)
            || is_hanging_piece_capture(board, mv))
}

/// Check plus an attack on a hanging or higher-valued piece from the moved
/// piece's new square.
pub fn is_check_fork(board: &mut CachedBoard, mv: ChessMove) -> bool {
    if !board.gives_check(mv) {
        return false;
    }
    board.push(mv);
    let to = mv.get_dest();
    let forking = attacks::stronger_pieces_attacked_by(board, to) != EMPTY
        || attacks::hanging_pieces_attacked_by(board, to) != EMPTY;
    board.pop();
    forking
}

fn threatened_pieces_seen_from(board: &CachedBoard, sq: Square) -> BitBoard {
    attacks::stronger_pieces_attacked_by(board, sq) | attacks::hanging_pieces_attacked_by(board, sq)
}

fn slider_attackers_of(board: &CachedBoard, color: chess::Color, sq: Square) -> Vec<Square> {
    board
        .attackers(color, sq)
        .into_iter()
        .filter(|&s| {
            matches!(
                board.piece_type_at(s),
                Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen)
            )
        })
        .collect()
}

/// Does the move create or defuse a threat: the mover's set of stronger or
/// hanging targets changes, the mover escapes a capture, a slider behind the
/// vacated square is discovered onto a new target, or the mover lands
/// defending an attacked friend.
pub fn make_or_relieve_threat(board: &mut CachedBoard, mv: ChessMove) -> bool {
    let from = mv.get_source();
    let to = mv.get_dest();
    let color = match board.color_at(from) {
        Some(c) => c,
        None => return false,
    };

    // Moving a piece that is being won counts as relieving a threat.
    if attacks::can_piece_be_captured_by_weaker_piece(board, from) {
        return true;
    }
    if attacks::can_piece_be_captured(board, from) && !attacks::has_defender(board, from) {
        return true;
    }

    let before = threatened_pieces_seen_from(board, from);
    let uncovered = slider_attackers_of(board, color, from);
    let uncovered_before: Vec<BitBoard> = uncovered
        .iter()
        .map(|&s| threatened_pieces_seen_from(board, s))
        .collect();

    board.push(mv);
    let after = threatened_pieces_seen_from(board, to);
    let discovers = uncovered
        .iter()
        .zip(uncovered_before.iter())
        .any(|(&s, &seen_before)| threatened_pieces_seen_from(board, s) & !seen_before != EMPTY);
    let defends = (board.attacks(to) & *board.inner().color_combined(color))
        .into_iter()
        .any(|friend| board.is_attacked_by(opp(color), friend));
    board.pop();

    before != after || discovers || defends
}

/// Does the move land in a dead draw?
pub fn is_drawing(board: &mut CachedBoard, mv: ChessMove) -> bool {
    board.push(mv);
    let drawing =
        board.is_stalemate() || board.is_insufficient_material() || board.is_repetition(3);
    board.pop();
    drawing
}

/// High likelihood of tactics: responses to check, quality captures, and
/// promotions.
pub fn is_hard_tactic(board: &CachedBoard, mv: ChessMove) -> bool {
    board.is_check() || is_good_capture(board, mv) || is_pawn_promotion(mv)
}

/// Some likelihood of tactics.
pub fn is_soft_tactic(board: &mut CachedBoard, mv: ChessMove) -> bool {
    board.is_check()
        || is_check(board, mv)
        || is_capture(board, mv)
        || is_pawn_promotion(mv)
        || is_pawn_advance_to_promote(board, mv)
        || make_or_relieve_threat(board, mv)
        || is_drawing(board, mv)
}

/// A quiet move of a minor or major piece from a safe square to one where it
/// is simply lost.
pub fn is_bad_move(board: &mut CachedBoard, mv: ChessMove) -> bool {
    if board.is_check() {
        return false;
    }
    let from = mv.get_source();
    if !matches!(
        board.piece_type_at(from),
        Some(Piece::Knight) | Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen)
    ) {
        return false;
    }
    if board.is_capture(mv) {
        return false;
    }
    let color = board.turn();
    if board.is_attacked_by(opp(color), from) {
        return false;
    }
    board.push(mv);
    let to = mv.get_dest();
    let attacked_by_unpinned = board
        .attackers(opp(color), to)
        .into_iter()
        .any(|a| !board.is_pinned(opp(color), a));
    let undefended = !attacks::has_defender(board, to);
    board.pop();
    attacked_by_unpinned && undefended
}

// Alternate threat predicates kept for A/B testing against the default
// set-difference variant.
#[cfg(feature = "alt-threat-filters")]
pub mod alt {
    use super::*;
    use chess::Color;

    /// Does the move change the plain set of pieces the mover attacks?
    pub fn is_attack_or_defend(board: &mut CachedBoard, mv: ChessMove) -> bool {
        let attacked_before = board.attacks(mv.get_source()) & *board.inner().combined();
        board.push(mv);
        let attacked_after = board.attacks(mv.get_dest()) & *board.inner().combined();
        board.pop();
        attacked_before != attacked_after
    }

    fn free_to_take_count(board: &CachedBoard, color: Color) -> usize {
        let mut count = 0;
        for piece_type in PIECE_TYPES {
            for piece in board.pieces(piece_type, color) {
                if attacks::is_free_to_take(board, piece) {
                    count += 1;
                }
            }
        }
        count
    }

    fn attack_higher_value_count(board: &CachedBoard, color: Color) -> usize {
        let mut count = 0;
        for piece_type in PIECE_TYPES {
            for piece in board.pieces(piece_type, color) {
                if attacks::stronger_pieces_attacked_by(board, piece) != EMPTY {
                    count += 1;
                }
            }
        }
        count
    }

    /// Does the move change how many pieces hang or face a losing trade on
    /// either side?
    pub fn is_attack_or_defend_counts(board: &mut CachedBoard, mv: ChessMove) -> bool {
        let player = board.turn();
        let enemy = opp(player);
        let player_free_before = free_to_take_count(board, player);
        let enemy_free_before = free_to_take_count(board, enemy);
        let player_higher_before = attack_higher_value_count(board, player);
        let enemy_higher_before = attack_higher_value_count(board, enemy);
        board.push(mv);
        let changed = free_to_take_count(board, enemy) > enemy_free_before
            || attack_higher_value_count(board, enemy) > enemy_higher_before
            || free_to_take_count(board, player) < player_free_before
            || attack_higher_value_count(board, player) < player_higher_before;
        board.pop();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    fn mv(uci: &str) -> ChessMove {
        let from = Square::from_str(&uci[0..2]).unwrap();
        let to = Square::from_str(&uci[2..4]).unwrap();
        ChessMove::new(from, to, None)
    }

    #[test]
    fn null_move_passes_every_filter() {
        let mut b = CachedBoard::default();
        for filter in [
            MoveFilter::None,
            MoveFilter::HardTactic,
            MoveFilter::SoftTactic,
            MoveFilter::NonTactic,
            MoveFilter::SoftNotHard,
        ] {
            assert!(filter.passes(&mut b, None), "{filter:?} blocked the pass");
        }
    }

    #[test]
    fn capture_classification() {
        // White can take the free pawn on b5 with the c4 pawn.
        let b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5");
        let take = mv("c4b5");
        assert!(is_capture(&b, take));
        assert!(is_equal_value_trade(&b, take));
        assert!(is_good_capture(&b, take));
        assert!(is_hard_tactic(&b, take));
    }

    #[test]
    fn queen_grabbing_a_defended_pawn_is_not_a_good_capture() {
        // Black pawn d5 is defended by the e6 pawn; Qxd5 loses the queen.
        let b = board("rnbqkbnr/ppp2ppp/4p3/3p4/3Q4/8/PPP1PPPP/RNB1KBNR w KQkq - 0 3");
        let grab = ChessMove::new(Square::D4, Square::D5, None);
        assert!(is_capture(&b, grab));
        assert!(!is_equal_value_trade(&b, grab));
        assert!(!is_higher_value_trade(&b, grab));
        assert!(!is_good_capture(&b, grab));
    }

    #[test]
    fn promotion_moves_are_tactics() {
        let b = board("4k3/P7/8/8/8/8/8/4K3 w - - 0 1");
        let promo = ChessMove::new(Square::A7, Square::A8, Some(Piece::Queen));
        assert!(is_pawn_promotion(promo));
        assert!(is_hard_tactic(&b, promo));
        let advance = board("4k3/8/P7/8/8/8/8/4K3 w - - 0 1");
        assert!(is_pawn_advance_to_promote(&advance, mv("a6a7")));
    }

    #[test]
    fn knight_fork_is_a_check_fork() {
        // Nc7+ forks the king on e8 and the rook on a8.
        let mut b = board("r3k3/8/3N4/8/8/8/8/4K3 w - - 0 1");
        assert!(is_check_fork(&mut b, mv("d6c7")));
    }

    #[test]
    fn moving_an_attacked_queen_relieves_a_threat() {
        // The black knight on c6 attacks the white queen on d4.
        let mut b = board("r1bqkbnr/pppppppp/2n5/8/3Q4/8/PPPPPPPP/RNB1KBNR w KQkq - 4 3");
        assert!(make_or_relieve_threat(&mut b, mv("d4d1")));
    }

    #[test]
    fn bad_move_hangs_a_safe_piece() {
        // The white knight on f3 is safe; Ng5 walks into h6xg5 undefended.
        let mut b = board("rnbqkb1r/ppppppp1/5n1p/8/8/5N2/PPPPPPPP/RNBQKB1R w KQkq - 0 3");
        assert!(is_bad_move(&mut b, mv("f3g5")));
        assert!(!is_bad_move(&mut b, mv("f3d4")));
    }

    #[test]
    fn repetition_moves_classify_as_drawing() {
        let mut b = CachedBoard::default();
        for _ in 0..2 {
            b.push(mv("g1f3"));
            b.push(mv("b8c6"));
            b.push(mv("f3g1"));
            b.push(mv("c6b8"));
        }
        b.push(mv("g1f3"));
        b.push(mv("b8c6"));
        // f3g1 then c6b8 would be the third full repetition; after white
        // retreats, black's retreat recreates the start position again.
        b.push(mv("f3g1"));
        assert!(is_drawing(&mut b, mv("c6b8")));
    }
}
