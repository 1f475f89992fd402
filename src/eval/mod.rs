//! Static position evaluation in centipawns, positive for the evaluating
//! side. Terminal positions short-circuit, known-outcome endgames go to the
//! specialized endgame evaluator, everything else is a symmetric per-piece
//! sum with a handful of side-level cross terms.

pub mod endgame;
pub mod king;
pub mod pawn;
pub mod pieces;

use chess::{Color, Piece, Square};

use crate::attacks;
use crate::board::CachedBoard;
use crate::types::*;

// General weights.
pub const ATTACK_VALUE: i32 = 2;
pub const PRESSURE_PENALTY: i32 = -10;
pub const DEFENDED_EVAL: i32 = 7;
pub const DOUBLE_DEFENDED_BONUS: i32 = 10;
pub const PAWN_DEFENDING_BONUS: i32 = 10;
pub const DEVELOPMENT_BONUS: [i32; 2] = [10, 0];

/// The most valuable hanging enemy piece and the best favorable trade, at
/// most one of which is credited per position.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hanging {
    pub free_to_take: Option<Square>,
    pub free_to_trade: Option<Square>,
    pub free_to_trade_value: i32,
}

#[inline]
fn value_at(board: &CachedBoard, sq: Square) -> i32 {
    board.piece_type_at(sq).map(piece_value).unwrap_or(0)
}

/// Interpolates an `[opening, endgame]` weight pair by the phase for `color`.
#[inline]
pub fn taper(board: &CachedBoard, color: Color, pair: [i32; 2]) -> i32 {
    let phase = board.phase(color);
    (pair[0] as f32 + phase * (pair[1] - pair[0]) as f32).round() as i32
}

/// Checkmate or a dead draw, from the perspective of `turn`. Draws score
/// zero for both sides, the one exception to evaluation anti-symmetry.
pub fn game_over_eval(board: &CachedBoard, turn: Color) -> Option<i32> {
    if board.is_checkmate() {
        return Some(if board.turn() == turn { MIN_EVAL } else { MAX_EVAL });
    }
    if board.is_draw() {
        return Some(DRAW_EVAL);
    }
    None
}

/// Repetition shaping: a claimable draw lets the better-placed side steer the
/// score to zero, and a two-fold repetition halves it so the engine repeats
/// only from worse positions.
pub fn repetition_eval(board: &CachedBoard, turn: Color, evaluation: i32) -> i32 {
    let mut evaluation = evaluation;
    if board.can_claim_draw() {
        if turn == board.turn() {
            evaluation = evaluation.max(DRAW_EVAL);
        } else {
            evaluation = evaluation.min(DRAW_EVAL);
        }
    }
    if board.is_repetition(2) {
        evaluation /= 2;
    }
    evaluation
}

/// Picks at most one of free-to-take / free-to-trade, whichever wins more
/// material; the single chosen swap is what the per-piece terms credit.
pub fn hanging_context(board: &CachedBoard) -> Hanging {
    let mut free_to_take = attacks::most_valuable_free_to_take(board);
    let (mut free_to_trade, mut free_to_trade_value) = attacks::most_valuable_free_to_trade(board);
    if let (Some(take), Some(trade)) = (free_to_take, free_to_trade) {
        let take_value = value_at(board, take);
        let trade_value_won = value_at(board, trade) - free_to_trade_value;
        if take_value > trade_value_won {
            free_to_trade = None;
            free_to_trade_value = 0;
        } else {
            free_to_take = None;
        }
    }
    Hanging {
        free_to_take,
        free_to_trade,
        free_to_trade_value,
    }
}

// ---------------------------
// Shared per-piece helpers
// ---------------------------

/// Ring of a square: 0 for the four center squares out to 3 for the rim.
#[inline]
fn ring(sq: Square) -> usize {
    let file = square_file(sq) as i32;
    let rank = square_rank(sq) as i32;
    let file_out = if file <= 2 { 3 - file } else { (file - 4).max(0) };
    let rank_out = if rank <= 2 { 3 - rank } else { (rank - 4).max(0) };
    file_out.max(rank_out) as usize
}

/// Bonus for the squares a minor piece eyes: center control and attacks into
/// enemy territory, both opening-weighted.
pub fn attacking_bonus(board: &CachedBoard, color: Color, piece: Square) -> i32 {
    attacking_bonus_with(board, color, piece, [6, 3, 1, 0], [0, 1, 3, 6])
}

pub fn rook_attacking_bonus(board: &CachedBoard, color: Color, piece: Square) -> i32 {
    attacking_bonus_with(board, color, piece, [4, 2, 1, 0], [0, 1, 2, 4])
}

fn attacking_bonus_with(
    board: &CachedBoard,
    color: Color,
    piece: Square,
    ring_bonus: [i32; 4],
    rank_pair_bonus: [i32; 4],
) -> i32 {
    let mut opening_total = 0;
    for attacked in board.attacks(piece) {
        opening_total += ring_bonus[ring(attacked)];
        opening_total += rank_pair_bonus[adjusted_rank(attacked, color) / 2];
    }
    taper(board, color, [opening_total, 0])
}

/// Pieces get a small bonus for being defended; a pawn defender counts extra.
pub fn defended_bonus(board: &CachedBoard, piece: Square) -> i32 {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return 0,
    };
    let defenders: Vec<Square> = board
        .attackers(color, piece)
        .into_iter()
        .filter(|&d| !board.is_pinned(color, d))
        .collect();
    match defenders.len() {
        0 => 0,
        1 if board.piece_type_at(defenders[0]) == Some(Piece::Pawn) => PAWN_DEFENDING_BONUS,
        1 => DEFENDED_EVAL,
        _ => DOUBLE_DEFENDED_BONUS,
    }
}

/// One attacker tying down one non-pawn defender.
pub fn pressure_penalty(board: &CachedBoard, piece: Square) -> i32 {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return 0,
    };
    let attackers = attacks::get_attackers(board, piece, opp(color));
    let defenders = attacks::get_attackers(board, piece, color);
    if attackers.len() == 1 && defenders.len() == 1 {
        let defender = defenders[0];
        if board.piece_type_at(defender) != Some(Piece::Pawn) {
            return PRESSURE_PENALTY;
        }
    }
    0
}

/// Bonus for a minor piece that has left the back rank, opening-weighted.
pub fn development_bonus(board: &CachedBoard, piece: Square, color: Color) -> i32 {
    if adjusted_rank(piece, color) != 0 {
        taper(board, color, DEVELOPMENT_BONUS)
    } else {
        0
    }
}

/// Threatening favorable trades against defended pieces; only credited to
/// the side that is not on move (the mover realizes threats instead).
fn attacking_stronger_pieces(board: &CachedBoard, color: Color, hang: &Hanging) -> i32 {
    if board.turn() == color {
        return 0;
    }
    let mut evaluation = 0;
    for piece_type in PIECE_TYPES {
        for piece in board.pieces(piece_type, opp(color)) {
            if Some(piece) == hang.free_to_take {
                continue;
            }
            if !board.is_attacked_by(color, piece) || !board.is_attacked_by(opp(color), piece) {
                continue;
            }
            let piece_worth = piece_value(piece_type);
            let mut max_difference = 0;
            for attacker in board.attackers(color, piece) {
                match board.piece_type_at(attacker) {
                    Some(Piece::King) | None => continue,
                    Some(attacker_type) => {
                        let attacker_value = piece_value(attacker_type);
                        if attacker_value < piece_worth {
                            max_difference = max_difference.max(piece_worth - attacker_value);
                        }
                    }
                }
            }
            evaluation += max_difference / 10;
        }
    }
    evaluation
}

// ---------------------------
// Entry points
// ---------------------------

/// Everything a single piece contributes for its owner, under the shared
/// hanging-piece context. Side-level terms (bishop pair, connected rooks,
/// trade threats) live in `side_terms`.
pub fn evaluate_piece(board: &CachedBoard, color: Color, sq: Square, hang: &Hanging) -> i32 {
    match board.piece_type_at(sq) {
        Some(Piece::Pawn) => pawn::evaluate_pawn(board, color, sq, hang),
        Some(Piece::Knight) => pieces::evaluate_knight(board, color, sq, hang),
        Some(Piece::Bishop) => pieces::evaluate_bishop(board, color, sq, hang),
        Some(Piece::Rook) => pieces::evaluate_rook(board, color, sq, hang),
        Some(Piece::Queen) => pieces::evaluate_queen(board, color, sq, hang),
        Some(Piece::King) => king::evaluate_king(board, color, sq),
        None => 0,
    }
}

/// Per-piece contributions for both sides, positive for `turn`.
pub fn pieces_sum(board: &CachedBoard, turn: Color, hang: &Hanging) -> i32 {
    let mut evaluation = 0;
    for sq in board.all_pieces() {
        if let Some(color) = board.color_at(sq) {
            let sign = if color == turn { 1 } else { -1 };
            evaluation += sign * evaluate_piece(board, color, sq, hang);
        }
    }
    evaluation
}

fn side_terms(board: &CachedBoard, color: Color, hang: &Hanging) -> i32 {
    pieces::bishop_pair_value(board, color)
        + pieces::connected_rooks_value(board, color)
        + attacking_stronger_pieces(board, color, hang)
}

/// Static centipawn evaluation, positive when `turn` stands better.
pub fn evaluate(board: &CachedBoard, turn: Color) -> i32 {
    if let Some(game_over) = game_over_eval(board, turn) {
        return game_over;
    }
    if endgame::is_endgame(board) {
        return endgame::evaluate(board, turn);
    }
    let hang = hanging_context(board);
    let evaluation = pieces_sum(board, turn, &hang) + side_terms(board, turn, &hang)
        - side_terms(board, opp(turn), &hang);
    repetition_eval(board, turn, evaluation)
}

/// Value of the piece removed by `mv`, with en passant credited as a pawn.
pub fn victim_value(board: &CachedBoard, mv: chess::ChessMove) -> i32 {
    if !board.is_capture(mv) {
        return 0;
    }
    if board.is_en_passant(mv) {
        return PAWN_VALUE;
    }
    value_at(board, mv.get_dest())
}
