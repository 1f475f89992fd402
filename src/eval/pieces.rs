//! Knight, bishop, rook and queen evaluation.

use chess::{BitBoard, Color, Piece, Square, EMPTY};

use crate::attacks;
use crate::board::CachedBoard;
use crate::eval::{
    attacking_bonus, defended_bonus, development_bonus, pressure_penalty, rook_attacking_bonus,
    taper, Hanging, ATTACK_VALUE,
};
use crate::types::*;

const FREE_TO_TRADE_NUM: i32 = 11; // value * 11 / 10
const KICK_KNIGHT_PENALTY: [i32; 2] = [-30, -10];
const KNIGHT_CONTROLLED_PENALTY: i32 = -1;
const PIECE_ON_BISHOP_COLOR_PENALTY: i32 = -3;
const BISHOP_PAIR_EVAL: i32 = 20;
const BISHOP_BATTERY_BONUS: i32 = 5;
const LONG_DIAGONAL_BONUS: [i32; 2] = [2 * ATTACK_VALUE, 0];
const BISHOP_BLOCKED_PENALTY: i32 = -10;
const CONNECTED_ROOKS_EVAL: i32 = 10;
const ROOK_ON_OPEN_FILE_BONUS: [i32; 2] = [10, 0];
const ROOK_ON_HALF_OPEN_FILE_BONUS: [i32; 2] = [5, 0];
const ROOK_TOO_AGGRESSIVE_PENALTY: i32 = -10;
const ROOK_ALIGNED_PENALTY: i32 = -15;
const QUEEN_ALIGNED_PENALTY: i32 = 10;

#[inline]
fn free_to_trade_credit(trade_value: i32) -> i32 {
    trade_value * FREE_TO_TRADE_NUM / 10
}

// ---------------------------
// Files
// ---------------------------

/// No pawns at all on the file through `sq`.
pub fn is_open_file(board: &CachedBoard, sq: Square) -> bool {
    file_squares(sq) & *board.inner().pieces(Piece::Pawn) == EMPTY
}

/// Exactly one pawn, of either color, on the file through `sq`.
pub fn is_half_open_file(board: &CachedBoard, sq: Square) -> bool {
    (file_squares(sq) & *board.inner().pieces(Piece::Pawn)).popcnt() == 1
}

// ---------------------------
// Knight
// ---------------------------

/// Penalty when an enemy pawn can advance and hit the knight.
fn kick_knight_penalty(board: &CachedBoard, knight: Square) -> [i32; 2] {
    let color = match board.color_at(knight) {
        Some(c) => c,
        None => return [0, 0],
    };
    let color_modifier: i32 = if color == Color::White { 1 } else { -1 };
    // Rank from which a two-square pawn push can reach the kicking square.
    let two_push_knight_rank = if color == Color::White { 3 } else { 4 };
    let mut kicker_squares = vec![
        add_rank_and_file(knight, 2 * color_modifier, 1),
        add_rank_and_file(knight, 2 * color_modifier, -1),
    ];
    if square_rank(knight) == two_push_knight_rank {
        kicker_squares.push(add_rank_and_file(knight, 3 * color_modifier, 1));
        kicker_squares.push(add_rank_and_file(knight, 3 * color_modifier, -1));
    }
    for kicker in kicker_squares.into_iter().flatten() {
        if board.piece_type_at(kicker) != Some(Piece::Pawn) || board.color_at(kicker) == Some(color)
        {
            continue;
        }
        let one_step_clear = add_rank(kicker, -color_modifier)
            .map(|sq| board.piece_type_at(sq).is_none())
            .unwrap_or(false);
        let rank_gap =
            (square_rank(knight) as i32 - square_rank(kicker) as i32).abs();
        let two_step_clear = rank_gap != 3
            || add_rank(kicker, -2 * color_modifier)
                .map(|sq| board.piece_type_at(sq).is_none())
                .unwrap_or(false);
        if one_step_clear && two_step_clear {
            return KICK_KNIGHT_PENALTY;
        }
    }
    [0, 0]
}

/// A safe knight forking two heavy pieces nets the cheaper of the two (the
/// dearer one is assumed to run).
fn knight_fork_value(board: &CachedBoard, knight: Square) -> i32 {
    let knight_color = match board.color_at(knight) {
        Some(c) => c,
        None => return 0,
    };
    if attacks::can_piece_be_captured(board, knight) || board.is_pinned(knight_color, knight) {
        return 0;
    }
    // For fork purposes the king is just another heavy piece.
    let fork_king_value = 1000;
    let mut victims: Vec<i32> = Vec::new();
    for attacked in board.attacks(knight) {
        if board.color_at(attacked) == Some(knight_color) {
            continue;
        }
        match board.piece_type_at(attacked) {
            Some(Piece::Rook) => victims.push(ROOK_VALUE),
            Some(Piece::Queen) => victims.push(QUEEN_VALUE),
            Some(Piece::King) => victims.push(fork_king_value),
            _ => {}
        }
    }
    if victims.len() >= 2 {
        victims.sort_unstable_by(|a, b| b.cmp(a));
        victims[1] - KNIGHT_VALUE
    } else {
        0
    }
}

/// Forward squares the knight would like to use but enemy pawns control.
fn knight_controlled_penalty(board: &CachedBoard, knight: Square) -> i32 {
    let knight_color = match board.color_at(knight) {
        Some(c) => c,
        None => return 0,
    };
    let knight_rank = adjusted_rank(knight, knight_color) as i32;
    let enemy_pawns = board.pieces(Piece::Pawn, opp(knight_color));
    let mut penalty = 0;
    for forward in board.attacks(knight) {
        let forward_rank = adjusted_rank(forward, knight_color) as i32;
        if forward_rank <= knight_rank {
            continue;
        }
        let controlled = enemy_pawns.into_iter().any(|pawn| {
            board.attacks(pawn) & BitBoard::from_square(forward) != EMPTY
                && attacks::can_piece_capture(board, pawn, forward)
        });
        if controlled {
            penalty += (forward_rank - knight_rank) * KNIGHT_CONTROLLED_PENALTY;
        }
    }
    penalty
}

pub fn evaluate_knight(board: &CachedBoard, color: Color, knight: Square, hang: &Hanging) -> i32 {
    if Some(knight) == hang.free_to_take {
        return KNIGHT_VALUE / 10;
    }
    if Some(knight) == hang.free_to_trade {
        return free_to_trade_credit(hang.free_to_trade_value);
    }
    let mut evaluation = KNIGHT_VALUE;
    if !board.is_pinned(color, knight) {
        evaluation += board.attacks(knight).popcnt() as i32 * ATTACK_VALUE;
        evaluation += attacking_bonus(board, color, knight);
    }
    evaluation += defended_bonus(board, knight);
    evaluation += development_bonus(board, knight, color);
    evaluation += taper(board, color, kick_knight_penalty(board, knight));
    evaluation += free_to_trade_credit(knight_fork_value(board, knight));
    evaluation += knight_controlled_penalty(board, knight);
    evaluation += pressure_penalty(board, knight);
    evaluation
}

// ---------------------------
// Bishop
// ---------------------------

/// Opponent's bishops all live on one color complex and `piece` sits on it.
pub fn is_piece_on_bishop_color(board: &CachedBoard, piece: Square) -> bool {
    let bishop_color = match board.color_at(piece) {
        Some(c) => opp(c),
        None => return false,
    };
    let bishops = board.pieces(Piece::Bishop, bishop_color);
    (on_light_squares(bishops) && !on_dark_squares(bishops) && is_light_square(piece))
        || (on_dark_squares(bishops) && !on_light_squares(bishops) && is_dark_square(piece))
}

pub fn piece_on_bishop_color_penalty(board: &CachedBoard, piece: Square) -> i32 {
    if is_piece_on_bishop_color(board, piece) {
        PIECE_ON_BISHOP_COLOR_PENALTY
    } else {
        0
    }
}

/// Pinned on a file or rank, where the bishop cannot answer.
fn is_bishop_pinned(board: &CachedBoard, bishop: Square, color: Color) -> bool {
    if board.is_pinned(color, bishop) {
        let king = board.king(color);
        if let Some(pinner) = attacks::get_pinner(board, bishop) {
            return square_file(king) == square_file(pinner)
                || square_rank(king) == square_rank(pinner);
        }
    }
    false
}

/// Pinned on a diagonal, where the rook cannot answer.
fn is_rook_pinned(board: &CachedBoard, rook: Square, color: Color) -> bool {
    if board.is_pinned(color, rook) {
        let king = board.king(color);
        if let Some(pinner) = attacks::get_pinner(board, rook) {
            return square_file(king) != square_file(pinner)
                && square_rank(king) != square_rank(pinner);
        }
    }
    false
}

fn bishop_battery_bonus(board: &CachedBoard, bishop: Square, color: Color) -> i32 {
    let supported = board.attackers(color, bishop).into_iter().any(|piece| {
        matches!(
            board.piece_type_at(piece),
            Some(Piece::Queen) | Some(Piece::Bishop)
        )
    });
    if supported {
        BISHOP_BATTERY_BONUS
    } else {
        0
    }
}

fn long_diagonal_bonus(bishop: Square) -> bool {
    let long_diagonals = chess::line(Square::A1, Square::B2) | chess::line(Square::A8, Square::B7);
    long_diagonals & BitBoard::from_square(bishop) != EMPTY
}

/// Still at home with both forward diagonals walled off by friendly pieces.
fn undeveloped_bishop_blocked_penalty(board: &CachedBoard, bishop: Square) -> i32 {
    let color = match board.color_at(bishop) {
        Some(c) => c,
        None => return 0,
    };
    if adjusted_rank(bishop, color) != 0 {
        return 0;
    }
    let rank_adjustment = if color == Color::White { 1 } else { -1 };
    let blocked = [
        add_rank_and_file(bishop, rank_adjustment, 1),
        add_rank_and_file(bishop, rank_adjustment, -1),
    ]
    .into_iter()
    .all(|sq| match sq {
        None => true,
        Some(sq) => board.color_at(sq) == Some(color),
    });
    if blocked {
        BISHOP_BLOCKED_PENALTY
    } else {
        0
    }
}

/// Bonus once per side for bishops on both color complexes.
pub fn bishop_pair_value(board: &CachedBoard, color: Color) -> i32 {
    let bishops = board.pieces(Piece::Bishop, color);
    if on_light_squares(bishops) && on_dark_squares(bishops) {
        BISHOP_PAIR_EVAL
    } else {
        0
    }
}

pub fn evaluate_bishop(board: &CachedBoard, color: Color, bishop: Square, hang: &Hanging) -> i32 {
    if Some(bishop) == hang.free_to_take {
        return BISHOP_VALUE / 10;
    }
    if Some(bishop) == hang.free_to_trade {
        return free_to_trade_credit(hang.free_to_trade_value);
    }
    let mut evaluation = BISHOP_VALUE;
    if !is_bishop_pinned(board, bishop, color) {
        evaluation += board.attacks(bishop).popcnt() as i32 * ATTACK_VALUE;
        evaluation += attacking_bonus(board, color, bishop);
        if long_diagonal_bonus(bishop) {
            evaluation += taper(board, color, LONG_DIAGONAL_BONUS);
        }
    }
    evaluation += defended_bonus(board, bishop);
    evaluation += bishop_battery_bonus(board, bishop, color);
    evaluation += development_bonus(board, bishop, color);
    evaluation += undeveloped_bishop_blocked_penalty(board, bishop);
    evaluation += pressure_penalty(board, bishop);
    evaluation
}

// ---------------------------
// Rook
// ---------------------------

/// Bonus once per side when the rooks see each other.
pub fn connected_rooks_value(board: &CachedBoard, color: Color) -> i32 {
    let rooks: Vec<Square> = board.pieces(Piece::Rook, color).into_iter().collect();
    if rooks.len() == 2
        && board.attacks(rooks[1]) & BitBoard::from_square(rooks[0]) != EMPTY
    {
        CONNECTED_ROOKS_EVAL
    } else {
        0
    }
}

fn rook_on_open_file_bonus(board: &CachedBoard, rook: Square) -> [i32; 2] {
    if is_open_file(board, rook) {
        ROOK_ON_OPEN_FILE_BONUS
    } else if is_half_open_file(board, rook) {
        ROOK_ON_HALF_OPEN_FILE_BONUS
    } else {
        [0, 0]
    }
}

/// A rook past the third rank becomes a target while the opponent still has
/// plenty of minor pieces.
fn rook_too_aggressive_penalty(board: &CachedBoard, rook: Square) -> i32 {
    let rook_color = match board.color_at(rook) {
        Some(c) => c,
        None => return 0,
    };
    if adjusted_rank(rook, rook_color) > 2 && num_minor_pieces(board.inner(), opp(rook_color)) > 2 {
        ROOK_TOO_AGGRESSIVE_PENALTY
    } else {
        0
    }
}

/// Aligned with an enemy bishop with exactly one piece between: a discovered
/// attack is brewing.
fn rook_aligned_with_bishop_penalty(board: &CachedBoard, rook: Square) -> i32 {
    let rook_color = match board.color_at(rook) {
        Some(c) => c,
        None => return 0,
    };
    for diagonal_square in diagonals(rook) {
        if board.piece_type_at(diagonal_square) == Some(Piece::Bishop)
            && board.color_at(diagonal_square) != Some(rook_color)
        {
            let in_between =
                (chess::between(rook, diagonal_square) & board.inner().combined()).popcnt();
            if in_between == 1 {
                return ROOK_ALIGNED_PENALTY;
            }
        }
    }
    0
}

pub fn evaluate_rook(board: &CachedBoard, color: Color, rook: Square, hang: &Hanging) -> i32 {
    if Some(rook) == hang.free_to_take {
        return ROOK_VALUE / 10;
    }
    if Some(rook) == hang.free_to_trade {
        return free_to_trade_credit(hang.free_to_trade_value);
    }
    if is_rook_pinned(board, rook, color)
        && attacks::get_pinner(board, rook)
            .and_then(|p| board.piece_type_at(p))
            == Some(Piece::Bishop)
    {
        // The rook is effectively traded for the pinning bishop.
        return free_to_trade_credit(BISHOP_VALUE);
    }
    let mut evaluation = ROOK_VALUE;
    if !is_rook_pinned(board, rook, color) {
        evaluation += board.attacks(rook).popcnt() as i32 * ATTACK_VALUE;
        evaluation += rook_attacking_bonus(board, color, rook);
    }
    evaluation += defended_bonus(board, rook);
    evaluation += taper(board, color, rook_on_open_file_bonus(board, rook));
    evaluation += piece_on_bishop_color_penalty(board, rook);
    evaluation += rook_too_aggressive_penalty(board, rook);
    evaluation += pressure_penalty(board, rook);
    evaluation += rook_aligned_with_bishop_penalty(board, rook);
    evaluation
}

// ---------------------------
// Queen
// ---------------------------

/// Alignment with enemy bishops (diagonals) or rooks (files and ranks)
/// through exactly one piece.
fn queen_aligned_penalty(board: &CachedBoard, queen: Square, color: Color) -> i32 {
    let mut value = 0;
    for diagonal_square in diagonals(queen) {
        if board.piece_type_at(diagonal_square) == Some(Piece::Bishop)
            && board.color_at(diagonal_square) != Some(color)
        {
            let in_between =
                (chess::between(queen, diagonal_square) & board.inner().combined()).popcnt();
            if in_between == 1 {
                value -= QUEEN_ALIGNED_PENALTY;
            }
        }
    }
    for line_square in file_and_rank_squares(queen) {
        if board.piece_type_at(line_square) == Some(Piece::Rook)
            && board.color_at(line_square) != Some(color)
        {
            let in_between =
                (chess::between(queen, line_square) & board.inner().combined()).popcnt();
            if in_between == 1 {
                value -= QUEEN_ALIGNED_PENALTY;
            }
        }
    }
    value
}

pub fn evaluate_queen(board: &CachedBoard, color: Color, queen: Square, hang: &Hanging) -> i32 {
    if Some(queen) == hang.free_to_take {
        return QUEEN_VALUE / 10;
    }
    if Some(queen) == hang.free_to_trade {
        return free_to_trade_credit(hang.free_to_trade_value);
    }
    if board.is_pinned(color, queen) {
        if let Some(pinner_type) = attacks::get_pinner(board, queen)
            .and_then(|p| board.piece_type_at(p))
        {
            if matches!(pinner_type, Piece::Bishop | Piece::Rook) {
                // The pinner will win the queen for itself.
                return free_to_trade_credit(piece_value(pinner_type));
            }
        }
    }
    let mut evaluation = QUEEN_VALUE;
    if !board.is_pinned(color, queen) {
        // Queen mobility is worth much less than minor piece mobility.
        evaluation += board.attacks(queen).popcnt() as i32 / 5;
    }
    evaluation += defended_bonus(board, queen);
    evaluation += queen_aligned_penalty(board, queen, color);
    evaluation
}
