//! Pawn evaluation: structure, advancement, passed pawns and the promotion
//! races that decide whether a passer is unstoppable.

use chess::{BitBoard, Color, Piece, Square, EMPTY};

use crate::attacks;
use crate::board::CachedBoard;
use crate::eval::endgame::{get_promotion_square, is_pawn_outside_of_square};
use crate::eval::{defended_bonus, pressure_penalty, taper, Hanging};
use crate::types::*;

const PAWN_IN_CENTER_EVAL: i32 = 10;
// Bonus per file step towards the center.
const CENTRAL_PAWN_EVAL: i32 = 3;
const PAWN_RANK_BONUS: [i32; 2] = [2, 4];
const ISOLATED_PAWN_PENALTY: i32 = -30;
const PASSED_PAWN_EVAL: [i32; 2] = [30, 60];
const PAWN_PROMOTING_RANK_BONUS: [i32; 6] = [100, 100, 150, 250, 400, 600];
const DEFENDING_SQUARE_IN_FRONT_OF_PAWN_BONUS: i32 = 10;
const DEFENDING_TWO_SQUARES_IN_FRONT_OF_PAWN_BONUS: i32 = 5;
const BLOCKADED_PAWN_PENALTY: i32 = -5;
const ROOK_BEHIND_PAWN_BONUS: i32 = 15;
const ROOK_BEHIND_PAWN_PENALTY: i32 = -15;

const CENTER: [Square; 4] = [Square::D4, Square::D5, Square::E4, Square::E5];

/// No enemy pawn ahead on this or an adjacent file.
pub fn is_passed_pawn(board: &CachedBoard, pawn: Square) -> bool {
    let color = match board.color_at(pawn) {
        Some(c) => c,
        None => return false,
    };
    let mut blocking_squares = EMPTY;
    for file_adjust in -1..=1 {
        if let Some(shifted) = add_file(pawn, file_adjust) {
            blocking_squares |=
                chess::between(shifted, get_promotion_square(shifted, color));
        }
    }
    blocking_squares & board.pieces(Piece::Pawn, opp(color)) == EMPTY
}

/// Pawns closer to the center files are worth a bit more.
fn center_pawn_eval(pawn: Square) -> i32 {
    const FILE_TO_CENTER_VAL: [i32; 8] = [0, 1, 2, 3, 3, 2, 1, 0];
    FILE_TO_CENTER_VAL[square_file(pawn)] * CENTRAL_PAWN_EVAL
}

/// 0..=5 for how far down the board the pawn has marched.
fn adjusted_pawn_rank(pawn: Square, color: Color) -> i32 {
    adjusted_rank(pawn, color) as i32 - 1
}

fn is_isolated_pawn(own_pawns: BitBoard, pawn: Square) -> bool {
    own_pawns & adjacent_file_squares(pawn) == EMPTY
}

/// Whether the knight can reach the promotion path in time. Inexact in the
/// knight's favor: `false` guarantees the pawn cannot be caught.
pub fn can_knight_catch_pawn(board: &CachedBoard, knight: Square, pawn: Square) -> bool {
    let pawn_color = match board.color_at(pawn) {
        Some(c) => c,
        None => return true,
    };
    let color_rank_modifier: i32 = if pawn_color == Color::White { 1 } else { -1 };
    let promotion_rank: i32 = if pawn_color == Color::White { 7 } else { 0 };
    let promotion_file = square_file(pawn) as i32;
    let mut pawn_rank = square_rank(pawn) as i32;
    let mut knight_rank = square_rank(knight) as i32;
    let mut knight_file = square_file(knight) as i32;
    let file_modifier: i32 = if knight_file < promotion_file { 1 } else { -1 };
    if board.turn() == pawn_color {
        pawn_rank += color_rank_modifier;
    }
    // One extra hop for the starting square and one after the promotion.
    let hops = (promotion_rank - pawn_rank).abs() + 2;
    for _ in 0..hops {
        let rank_diff = (promotion_rank - knight_rank).abs();
        let file_diff = (promotion_file - knight_file).abs();
        if rank_diff == 0 && file_diff == 0 {
            return true;
        }
        if rank_diff > file_diff {
            knight_rank += color_rank_modifier * rank_diff.min(2);
            knight_file += file_modifier * file_diff.min(1);
        } else {
            knight_rank += color_rank_modifier * rank_diff.min(1);
            knight_file += file_modifier * file_diff.min(2);
        }
    }
    false
}

/// Is this passed pawn going to promote: one step away and safe, opponent
/// unable to stop it with the king, or only knights that lose the race.
pub fn is_pawn_promoting(board: &CachedBoard, pawn: Square, color: Color) -> bool {
    let promotion_rank = 7;
    if adjusted_rank(pawn, color) == promotion_rank - 1
        && board.turn() == color
        && !board.is_check()
        && !board.is_attacked_by(opp(color), pawn)
    {
        return true;
    }
    if !has_minor_or_major_pieces(board.inner(), opp(color)) {
        if is_pawn_outside_of_square(board, pawn) {
            return true;
        }
        let promotion_square = get_promotion_square(pawn, color);
        let path_to_promote =
            chess::between(pawn, promotion_square) | BitBoard::from_square(promotion_square);
        if path_to_promote
            .into_iter()
            .all(|sq| board.is_attacked_by(color, sq))
        {
            return true;
        }
    }
    if has_only_knight_minor_or_major_pieces(board.inner(), opp(color))
        && board
            .pieces(Piece::Knight, opp(color))
            .into_iter()
            .all(|knight| !can_knight_catch_pawn(board, knight, pawn))
    {
        return true;
    }
    false
}

fn pawn_promoting_bonus(board: &CachedBoard, pawn: Square, color: Color) -> i32 {
    if is_pawn_promoting(board, pawn, color) {
        let rank = adjusted_pawn_rank(pawn, color);
        if (0..6).contains(&rank) {
            return PAWN_PROMOTING_RANK_BONUS[rank as usize];
        }
    }
    0
}

/// Controlling the squares in front of a passer helps escort it home.
fn promotion_support_bonus(board: &CachedBoard, pawn: Square) -> i32 {
    let color = match board.color_at(pawn) {
        Some(c) => c,
        None => return 0,
    };
    let modifier = if color == Color::White { 1 } else { -1 };
    let mut bonus = 0;
    let next_square = match add_rank(pawn, modifier) {
        Some(sq) => sq,
        None => return 0,
    };
    if attacks::are_more_attackers_than_defenders(board, next_square, Some(color)) {
        bonus += DEFENDING_SQUARE_IN_FRONT_OF_PAWN_BONUS;
    }
    if let Some(next_next_square) = add_rank(next_square, modifier) {
        if attacks::are_more_attackers_than_defenders(board, next_next_square, Some(color)) {
            bonus += DEFENDING_TWO_SQUARES_IN_FRONT_OF_PAWN_BONUS;
        }
    }
    bonus
}

/// A rook on the passer's file: good when it is ours, bad when it is theirs.
fn rook_behind_pawn_bonus(board: &CachedBoard, pawn: Square) -> i32 {
    let color = match board.color_at(pawn) {
        Some(c) => c,
        None => return 0,
    };
    let mut value = 0;
    for rook in board.pieces(Piece::Rook, color) {
        if square_file(rook) == square_file(pawn)
            && board.attacks(rook) & BitBoard::from_square(pawn) != EMPTY
        {
            value += ROOK_BEHIND_PAWN_BONUS;
            break;
        }
    }
    for rook in board.pieces(Piece::Rook, opp(color)) {
        if square_file(rook) == square_file(pawn)
            && board.attacks(rook) & BitBoard::from_square(pawn) != EMPTY
        {
            value += ROOK_BEHIND_PAWN_PENALTY;
            break;
        }
    }
    value
}

fn blockaded_pawn_penalty(board: &CachedBoard, pawn: Square) -> i32 {
    let color = match board.color_at(pawn) {
        Some(c) => c,
        None => return 0,
    };
    let modifier = if color == Color::White { 1 } else { -1 };
    match add_rank(pawn, modifier) {
        Some(front) if board.piece_type_at(front).is_some() => BLOCKADED_PAWN_PENALTY,
        _ => 0,
    }
}

pub fn evaluate_pawn(board: &CachedBoard, color: Color, pawn: Square, hang: &Hanging) -> i32 {
    if Some(pawn) == hang.free_to_take {
        return PAWN_VALUE / 10;
    }
    let own_pawns = board.pieces(Piece::Pawn, color);
    let mut evaluation = PAWN_VALUE;
    if CENTER.contains(&pawn) {
        evaluation += PAWN_IN_CENTER_EVAL;
    }
    if is_passed_pawn(board, pawn) {
        evaluation += taper(board, color, PASSED_PAWN_EVAL);
        evaluation += pawn_promoting_bonus(board, pawn, color);
        evaluation += taper(board, color, PAWN_RANK_BONUS) * adjusted_pawn_rank(pawn, color) * 2;
        evaluation += defended_bonus(board, pawn) * 2;
        evaluation += blockaded_pawn_penalty(board, pawn) * 2;
        evaluation += rook_behind_pawn_bonus(board, pawn);
        evaluation += promotion_support_bonus(board, pawn);
    } else {
        evaluation += defended_bonus(board, pawn);
        evaluation += blockaded_pawn_penalty(board, pawn);
        evaluation += taper(board, color, PAWN_RANK_BONUS) * adjusted_pawn_rank(pawn, color);
    }
    evaluation += center_pawn_eval(pawn);
    if is_isolated_pawn(own_pawns, pawn) {
        evaluation += ISOLATED_PAWN_PENALTY;
    }
    evaluation += pressure_penalty(board, pawn);
    evaluation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    #[test]
    fn passed_pawn_detection() {
        let b = board("4k3/8/8/3P4/8/8/6p1/4K3 w - - 0 1");
        assert!(is_passed_pawn(&b, Square::D5));
        assert!(is_passed_pawn(&b, Square::G2));
        let blocked = board("4k3/4p3/8/3P4/8/8/8/4K3 w - - 0 1");
        // The e7 pawn covers d5's path on the adjacent file.
        assert!(!is_passed_pawn(&blocked, Square::D5));
    }

    #[test]
    fn isolated_pawns_are_penalized() {
        let b = board("4k3/8/8/8/8/8/P2P4/4K3 w - - 0 1");
        let pawns = b.pieces(Piece::Pawn, Color::White);
        assert!(is_isolated_pawn(pawns, Square::A2));
        assert!(is_isolated_pawn(pawns, Square::D2));
        let connected = board("4k3/8/8/8/8/8/P1P5/4K3 w - - 0 1");
        let pawns = connected.pieces(Piece::Pawn, Color::White);
        // b-file is empty but a2 and c2 are not adjacent to each other? They
        // are: a2 sits next to the b file only, so both stay isolated.
        assert!(is_isolated_pawn(pawns, Square::A2));
        let supported = board("4k3/8/8/8/8/8/PP6/4K3 w - - 0 1");
        let pawns = supported.pieces(Piece::Pawn, Color::White);
        assert!(!is_isolated_pawn(pawns, Square::A2));
        assert!(!is_isolated_pawn(pawns, Square::B2));
    }

    #[test]
    fn knight_race_against_a_runner() {
        // Knight far away on a8, white pawn on h6 running with White to move:
        // the knight cannot make it back.
        let b = board("N3k3/8/7P/8/8/8/8/4K3 b - - 0 1");
        assert!(!can_knight_catch_pawn(&b, Square::A8, Square::H6));
        // A knight sitting on the promotion square trivially catches it.
        let near = board("4k2N/8/7P/8/8/8/8/4K3 w - - 0 1");
        assert!(can_knight_catch_pawn(&near, Square::H8, Square::H6));
    }

    #[test]
    fn seventh_rank_safe_pawn_is_promoting() {
        let b = board("4k3/8/8/8/8/8/2p5/4K3 b - - 0 1");
        // Black pawn on c2, black to move, c1 next: nothing attacks c2.
        assert!(is_pawn_promoting(&b, Square::C2, Color::Black));
    }

    #[test]
    fn pawn_value_rises_as_it_advances() {
        let far = board("4k3/8/8/8/8/8/1P6/4K3 w - - 0 1");
        let near = board("4k3/8/1P6/8/8/8/8/4K3 w - - 0 1");
        let hang = Hanging::default();
        let far_value = evaluate_pawn(&far, Color::White, Square::B2, &hang);
        let near_value = evaluate_pawn(&near, Color::White, Square::B6, &hang);
        assert!(near_value > far_value);
    }
}
