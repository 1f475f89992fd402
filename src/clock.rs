//! How long may the engine think? Clock plus increment spread over a rough
//! count of remaining moves.

use chess::Color;

use crate::board::CachedBoard;

const LATEST_BUDGETED_MOVE: u32 = 80;
const MIN_MOVES_LEFT: u32 = 20;
const MIN_THINK_TIME: f64 = 0.001;

/// Maximum thinking time in seconds for the side to move; always positive.
pub fn max_think_time(
    board: &CachedBoard,
    white_time_ms: u64,
    white_increment_ms: u64,
    black_time_ms: u64,
    black_increment_ms: u64,
) -> f64 {
    let (player_time_ms, player_increment_ms) = if board.turn() == Color::White {
        (white_time_ms, white_increment_ms)
    } else {
        (black_time_ms, black_increment_ms)
    };
    let player_time = player_time_ms as f64 / 1000.0;
    let player_increment = player_increment_ms as f64 / 1000.0;

    let num_remaining_moves = LATEST_BUDGETED_MOVE
        .saturating_sub(board.fullmove_number())
        .max(MIN_MOVES_LEFT);
    let total_time_to_complete_game =
        player_time + num_remaining_moves as f64 * player_increment;
    let max_think_time = total_time_to_complete_game / num_remaining_moves as f64;

    max_think_time.max(MIN_THINK_TIME)
}
