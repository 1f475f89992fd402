//! King evaluation: safety terms while there is attacking material on the
//! board, activity and infiltration once the game thins out.

use chess::{Color, Piece, Square};

use crate::board::CachedBoard;
use crate::eval::pieces::{is_half_open_file, is_open_file, piece_on_bishop_color_penalty};
use crate::eval::taper;
use crate::types::*;

const ATTACKING_ADJACENT_EVAL: [i32; 2] = [100, 0];
const CLOSE_PAWN_WALL_EVAL: [i32; 2] = [20, 0];
const FAR_PAWN_WALL_EVAL: [i32; 2] = [10, 0];
const OPEN_FILE_TO_KING_PENALTY: i32 = -10;
const HALF_OPEN_FILE_TO_KING_PENALTY: i32 = -5;
const OPEN_ADJACENT_FILE_TO_KING_PENALTY: i32 = -5;
const HALF_OPEN_ADJACENT_FILE_TO_KING_PENALTY: i32 = -2;
const KING_DISTANCE_TO_PAWN_BONUS: [i32; 2] = [0, 1];

/// Preferred shelter squares near the corners, opening-weighted.
fn king_square_safety(board: &CachedBoard, color: Color) -> i32 {
    let king = board.king(color);
    let file = square_file(king);
    let rank = adjusted_rank(king, color);
    let opening = match (rank, file) {
        (0, 0 | 1 | 6 | 7) => 30,
        (1, 0 | 1 | 6 | 7) | (0, 2) => 20,
        _ => 0,
    };
    taper(board, color, [opening, 0])
}

/// Fraction of the squares around the king that the opponent attacks.
fn percent_attacked_adjacent(board: &CachedBoard, color: Color) -> f32 {
    let adjacent = adjacent_squares(board.king(color));
    let total = adjacent.popcnt();
    let attacked = adjacent
        .into_iter()
        .filter(|&sq| board.is_attacked_by(opp(color), sq))
        .count();
    attacked as f32 / total.max(1) as f32
}

/// Pawns sheltering the king, one rank and two ranks ahead.
fn pawn_wall_value(board: &CachedBoard, color: Color) -> i32 {
    let king = board.king(color);
    let color_rank_modifier = if color == Color::White { 1 } else { -1 };
    let square_in_front = match add_rank(king, color_rank_modifier) {
        Some(sq) => sq,
        None => return 0,
    };
    let close_wall: Vec<Square> = [
        Some(square_in_front),
        add_file(square_in_front, -1),
        add_file(square_in_front, 1),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut total = 0;
    for &sq in &close_wall {
        if board.piece_type_at(sq) == Some(Piece::Pawn) {
            total += taper(board, color, CLOSE_PAWN_WALL_EVAL);
        }
    }
    for &sq in &close_wall {
        if let Some(far) = add_rank(sq, color_rank_modifier) {
            if board.piece_type_at(far) == Some(Piece::Pawn) {
                total += taper(board, color, FAR_PAWN_WALL_EVAL);
            }
        }
    }
    total
}

fn king_safety(board: &CachedBoard, color: Color) -> i32 {
    let mut evaluation = 0;
    let attacking_adjacent = percent_attacked_adjacent(board, color)
        * taper(board, color, ATTACKING_ADJACENT_EVAL) as f32;
    evaluation -= attacking_adjacent.round() as i32;
    evaluation += king_square_safety(board, color);
    evaluation += pawn_wall_value(board, color);
    evaluation
}

/// Endgame bonus for staying near the remaining pawns, either side's.
fn activate_king(board: &CachedBoard, color: Color) -> i32 {
    let max_distance_to_pawn = 7;
    let king = board.king(color);
    let pawns = board.pieces(Piece::Pawn, Color::White) | board.pieces(Piece::Pawn, Color::Black);
    let mut closeness = 0;
    for pawn in pawns {
        closeness += max_distance_to_pawn - square_distance(king, pawn) as i32;
    }
    closeness * taper(board, color, KING_DISTANCE_TO_PAWN_BONUS)
}

/// Marching up the board is its own reward once the position is an endgame.
fn infiltrate_king(board: &CachedBoard, color: Color) -> i32 {
    adjusted_rank(board.king(color), color) as i32
}

/// Open and half-open files onto the king once the opponent keeps several
/// major pieces and castling is no longer available.
fn open_file_to_king_penalty(board: &CachedBoard, color: Color) -> i32 {
    if num_major_pieces(board.inner(), opp(color)) <= 1 || board.has_castling_rights(color) {
        return 0;
    }
    let king = board.king(color);
    let mut penalty = 0;
    if is_open_file(board, king) {
        penalty += OPEN_FILE_TO_KING_PENALTY;
    }
    if is_half_open_file(board, king) {
        penalty += HALF_OPEN_FILE_TO_KING_PENALTY;
    }
    for adjacent_file in [-1, 1] {
        if let Some(adjacent_square) = add_file(king, adjacent_file) {
            if is_open_file(board, adjacent_square) {
                penalty += OPEN_ADJACENT_FILE_TO_KING_PENALTY;
            }
            if is_half_open_file(board, adjacent_square) {
                penalty += HALF_OPEN_ADJACENT_FILE_TO_KING_PENALTY;
            }
        }
    }
    penalty
}

pub fn evaluate_king(board: &CachedBoard, color: Color, king: Square) -> i32 {
    let mut evaluation = 0;
    if board.phase(color) >= 1.0 {
        evaluation += infiltrate_king(board, color);
    } else {
        evaluation += king_safety(board, color);
    }
    evaluation += activate_king(board, color);
    evaluation += piece_on_bishop_color_penalty(board, king);
    evaluation += open_file_to_king_penalty(board, color);
    evaluation
}
