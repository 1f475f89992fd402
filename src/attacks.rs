//! Attack and defense analysis on top of the board cache: capture legality
//! under pins, battery detection, soft pins, and the free-to-take / trade
//! queries the evaluator is built on.

use chess::{BitBoard, Color, Piece, Square, EMPTY};

use crate::board::{AttackersDefenders, CachedBoard};
use crate::types::*;

/// Can the piece on `attacker` actually take on `target`? A pinned piece can
/// only capture along its pin ray.
pub fn can_piece_capture(board: &CachedBoard, attacker: Square, target: Square) -> bool {
    let color = match board.color_at(attacker) {
        Some(c) => c,
        None => return false,
    };
    match board.pin_ray(color, attacker) {
        Some(ray) => ray & BitBoard::from_square(target) != EMPTY,
        None => true,
    }
}

pub fn can_piece_be_captured(board: &CachedBoard, piece: Square) -> bool {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return false,
    };
    board
        .attackers(opp(color), piece)
        .into_iter()
        .any(|attacker| can_piece_capture(board, attacker, piece))
}

pub fn can_piece_be_captured_by_weaker_piece(board: &CachedBoard, piece: Square) -> bool {
    let (color, piece_type) = match (board.color_at(piece), board.piece_type_at(piece)) {
        (Some(c), Some(p)) => (c, p),
        _ => return false,
    };
    board.attackers(opp(color), piece).into_iter().any(|attacker| {
        board
            .piece_type_at(attacker)
            .map(|a| rough_value(a) < rough_value(piece_type))
            .unwrap_or(false)
            && can_piece_capture(board, attacker, piece)
    })
}

/// The slider pinning `pinned_piece` to its king, if any.
pub fn get_pinner(board: &CachedBoard, pinned_piece: Square) -> Option<Square> {
    let color = board.color_at(pinned_piece)?;
    let ray = board.pin_ray(color, pinned_piece)?;
    board
        .attackers(opp(color), pinned_piece)
        .into_iter()
        .find(|&attacker| ray & BitBoard::from_square(attacker) != EMPTY)
}

/// Does the piece on `piece` have a defender that could legally recapture?
pub fn has_defender(board: &CachedBoard, piece: Square) -> bool {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return false,
    };
    board
        .attackers(color, piece)
        .into_iter()
        .any(|defender| can_piece_capture(board, defender, piece))
}

// ---------------------------
// Batteries and pins behind a contested square
// ---------------------------

/// Sliders of `color` stacked behind the given front pieces on the ray
/// towards `square`. Pawns, bishops, rooks and queens can front a battery;
/// only unpinned sliders extend one.
pub fn battery_attackers(
    board: &CachedBoard,
    square: Square,
    color: Color,
    front_pieces: &[Square],
) -> Vec<Square> {
    let mut battery = Vec::new();
    for &front in front_pieces {
        match board.piece_type_at(front) {
            Some(Piece::Pawn) | Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen) => {}
            _ => continue,
        }
        let supporters = board.attackers(color, front);
        for supporter in supporters {
            if supporter == square || front_pieces.contains(&supporter) {
                continue;
            }
            let is_slider = matches!(
                board.piece_type_at(supporter),
                Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen)
            );
            if is_slider
                && !board.is_pinned(color, supporter)
                && chess::line(square, front) & BitBoard::from_square(supporter) != EMPTY
            {
                battery.push(supporter);
            }
        }
    }
    battery
}

/// Pieces that could legally move to `square` right now, split by side and
/// sorted cheapest first. An attacking king only counts when the target is
/// undefended; a defending king stays in (the free-to-take rules know a lone
/// king defender cannot recapture into an attacked square).
pub fn first_attackers_and_defenders(
    board: &CachedBoard,
    square: Square,
    defend_color: Color,
) -> (Vec<Square>, Vec<Square>) {
    let raw_defenders = board.attackers(defend_color, square);
    let mut attackers: Vec<Square> = board
        .attackers(opp(defend_color), square)
        .into_iter()
        .filter(|&a| {
            can_piece_capture(board, a, square)
                && (board.piece_type_at(a) != Some(Piece::King) || raw_defenders == EMPTY)
        })
        .collect();
    let mut defenders: Vec<Square> = raw_defenders
        .into_iter()
        .filter(|&d| can_piece_capture(board, d, square))
        .collect();
    sort_by_value(board, &mut attackers);
    sort_by_value(board, &mut defenders);
    (attackers, defenders)
}

fn sort_by_value(board: &CachedBoard, pieces: &mut [Square]) {
    pieces.sort_by_key(|&sq| {
        board
            .piece_type_at(sq)
            .map(piece_value)
            .unwrap_or(i32::MAX)
    });
}

/// Pinned pieces become attackers or defenders once the pinner (which sits on
/// the other side of the x-ray) is gone.
pub fn pinned_attackers_and_defenders(
    board: &CachedBoard,
    square: Square,
    defend_color: Color,
) -> (Vec<Square>, Vec<Square>) {
    let all_attackers = board.attackers(opp(defend_color), square);
    let all_defenders = board.attackers(defend_color, square);
    let contains = |bb: BitBoard, sq: Option<Square>| match sq {
        Some(sq) => bb & BitBoard::from_square(sq) != EMPTY,
        None => false,
    };
    let pinned_attackers = all_attackers
        .into_iter()
        .filter(|&a| {
            !can_piece_capture(board, a, square) && contains(all_defenders, get_pinner(board, a))
        })
        .collect();
    let pinned_defenders = all_defenders
        .into_iter()
        .filter(|&d| {
            !can_piece_capture(board, d, square) && contains(all_attackers, get_pinner(board, d))
        })
        .collect();
    (pinned_attackers, pinned_defenders)
}

pub fn attackers_and_defenders(
    board: &CachedBoard,
    square: Square,
    defend_color: Option<Color>,
) -> AttackersDefenders {
    let defend_color = match defend_color {
        Some(c) => c,
        None => return AttackersDefenders::default(),
    };
    let (first_attackers, first_defenders) =
        first_attackers_and_defenders(board, square, defend_color);

    let mut front: Vec<Square> = first_attackers.clone();
    front.extend_from_slice(&first_defenders);
    let mut second_attackers = battery_attackers(board, square, opp(defend_color), &front);
    let mut second_defenders = battery_attackers(board, square, defend_color, &front);

    let (pinned_attackers, pinned_defenders) =
        pinned_attackers_and_defenders(board, square, defend_color);
    // Batteries can also form behind the pinned pieces themselves.
    second_attackers.extend(battery_attackers(
        board,
        square,
        opp(defend_color),
        &pinned_attackers,
    ));
    second_defenders.extend(battery_attackers(
        board,
        square,
        defend_color,
        &pinned_defenders,
    ));
    second_attackers.extend(pinned_attackers);
    second_defenders.extend(pinned_defenders);

    AttackersDefenders {
        first_attackers,
        second_attackers,
        first_defenders,
        second_defenders,
    }
}

// ---------------------------
// Soft pins
// ---------------------------

/// Is `pinned_piece` x-rayed by `attacker` through to a piece that is
/// undefended or worth more than the attacker?
fn is_attacker_soft_pinning(
    board: &CachedBoard,
    attacker: Square,
    pinned_piece: Square,
) -> bool {
    let attacker_type = match board.piece_type_at(attacker) {
        Some(p @ (Piece::Bishop | Piece::Rook | Piece::Queen)) => p,
        // Only sliders can pin.
        _ => return false,
    };
    let pinned_color = match board.color_at(pinned_piece) {
        Some(c) => c,
        None => return false,
    };
    // Walk the ray from the pinned piece away from the attacker; the first
    // piece found is the one being shielded.
    let file_step =
        (square_file(pinned_piece) as i32 - square_file(attacker) as i32).signum();
    let rank_step =
        (square_rank(pinned_piece) as i32 - square_rank(attacker) as i32).signum();
    let mut file = square_file(pinned_piece) as i32 + file_step;
    let mut rank = square_rank(pinned_piece) as i32 + rank_step;
    while let Some(next) = square_at(file, rank) {
        if let Some(shielded_type) = board.piece_type_at(next) {
            if board.color_at(next) != Some(pinned_color) {
                return false;
            }
            return !has_defender(board, next)
                || rough_value(attacker_type) < rough_value(shielded_type);
        }
        file += file_step;
        rank += rank_step;
    }
    false
}

pub fn is_soft_pinned(board: &CachedBoard, piece: Square) -> bool {
    let attack_color = match board.color_at(piece) {
        Some(c) => opp(c),
        None => return false,
    };
    board
        .attackers(attack_color, piece)
        .into_iter()
        .any(|attacker| is_attacker_soft_pinning(board, attacker, piece))
}

/// Soft attackers are every attacker; soft defenders drop the soft-pinned.
pub fn soft_attackers_and_defenders(
    board: &CachedBoard,
    square: Square,
    defend_color: Option<Color>,
) -> AttackersDefenders {
    let defend_color = match defend_color {
        Some(c) => c,
        None => return AttackersDefenders::default(),
    };
    let mut first_attackers: Vec<Square> =
        board.attackers(opp(defend_color), square).into_iter().collect();
    let mut first_defenders: Vec<Square> = board
        .attackers(defend_color, square)
        .into_iter()
        .filter(|&d| !is_soft_pinned(board, d))
        .collect();
    sort_by_value(board, &mut first_attackers);
    sort_by_value(board, &mut first_defenders);

    let mut front: Vec<Square> = first_attackers.clone();
    front.extend_from_slice(&first_defenders);
    let second_attackers = battery_attackers(board, square, opp(defend_color), &front);
    let second_defenders: Vec<Square> =
        battery_attackers(board, square, defend_color, &front)
            .into_iter()
            .filter(|&d| !is_soft_pinned(board, d))
            .collect();

    AttackersDefenders {
        first_attackers,
        second_attackers,
        first_defenders,
        second_defenders,
    }
}

// ---------------------------
// Battery-aware attacker lists
// ---------------------------

/// Pieces of `color` bearing on `square`, including sliders stacked behind
/// them, filtered by capture legality for the front rank.
pub fn get_attackers(board: &CachedBoard, square: Square, color: Color) -> Vec<Square> {
    let mut attackers: Vec<Square> = board
        .attackers(color, square)
        .into_iter()
        .filter(|&a| can_piece_capture(board, a, square))
        .collect();
    let mut next = 0;
    while next < attackers.len() {
        let attacker = attackers[next];
        next += 1;
        match board.piece_type_at(attacker) {
            Some(Piece::Pawn) | Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen) => {}
            _ => continue,
        }
        let supporters = board.attackers(color, attacker);
        for supporter in supporters {
            if supporter == square || attackers.contains(&supporter) {
                continue;
            }
            let is_slider = matches!(
                board.piece_type_at(supporter),
                Some(Piece::Bishop) | Some(Piece::Rook) | Some(Piece::Queen)
            );
            if is_slider
                && !board.is_pinned(color, supporter)
                && chess::line(square, attacker) & BitBoard::from_square(supporter) != EMPTY
            {
                attackers.push(supporter);
            }
        }
    }
    attackers
}

/// Counts pinned pieces of one side whose pinner is among the other side's
/// attackers; such a pair effectively trades itself on the contested square.
fn num_pinner_and_pinned_attacker_pairs(
    board: &CachedBoard,
    pinned_side_attackers: BitBoard,
    pinner_side_attackers: &[Square],
) -> usize {
    pinned_side_attackers
        .into_iter()
        .filter(|&sq| {
            let color = match board.color_at(sq) {
                Some(c) => c,
                None => return false,
            };
            board.is_pinned(color, sq)
                && get_pinner(board, sq)
                    .map(|p| pinner_side_attackers.contains(&p))
                    .unwrap_or(false)
        })
        .count()
}

pub fn are_more_attackers_than_defenders(
    board: &CachedBoard,
    square: Square,
    attack_color: Option<Color>,
) -> bool {
    let defend_color = match attack_color {
        Some(c) => opp(c),
        None => match board.color_at(square) {
            Some(c) => c,
            None => return false,
        },
    };
    let defenders = get_attackers(board, square, defend_color);
    let attackers = get_attackers(board, square, opp(defend_color));
    let all_defenders = board.attackers(defend_color, square);
    let all_attackers = board.attackers(opp(defend_color), square);
    let num_defenders = defenders.len()
        + num_pinner_and_pinned_attacker_pairs(board, all_defenders, &attackers);
    let num_attackers = attackers.len()
        + num_pinner_and_pinned_attacker_pairs(board, all_attackers, &defenders);
    num_attackers > num_defenders
}

// ---------------------------
// Free to take / free to trade
// ---------------------------

fn value_at(board: &CachedBoard, sq: Square) -> i32 {
    board
        .piece_type_at(sq)
        .map(piece_value)
        .unwrap_or(0)
}

fn free_to_take_given(board: &CachedBoard, piece: Square, ad: &AttackersDefenders) -> bool {
    let num_attackers = ad.first_attackers.len() + ad.second_attackers.len();
    let num_defenders = ad.first_defenders.len() + ad.second_defenders.len();

    if ad.first_attackers.len() >= 2 {
        let lowest_two = value_at(board, ad.first_attackers[0]) + value_at(board, ad.first_attackers[1]);
        let all_defenders = ad.first_defenders.iter().chain(ad.second_defenders.iter());
        let mut every_defender_dearer = true;
        for &defender in all_defenders {
            if value_at(board, defender) <= lowest_two {
                every_defender_dearer = false;
                break;
            }
        }
        if every_defender_dearer {
            return true;
        }
    }
    if num_attackers > num_defenders {
        if num_defenders == 0 {
            return true;
        }
        if ad.first_attackers.is_empty() {
            return false;
        }
        if ad.first_defenders.is_empty() {
            return true;
        }
        let min_attacker = ad.first_attackers[0];
        let min_defender = ad.first_defenders[0];
        if num_defenders == 1 && board.piece_type_at(min_defender) == Some(Piece::King) {
            return true;
        }
        // Taking and being recaptured still wins material.
        if value_at(board, min_attacker) < value_at(board, piece) + value_at(board, min_defender) {
            return true;
        }
    }
    false
}

/// Can the piece on `piece` be taken with a material win against best
/// defense? A piece of the side to move is never free (it moves first).
pub fn is_free_to_take(board: &CachedBoard, piece: Square) -> bool {
    match board.color_at(piece) {
        Some(color) if board.turn() != color => {
            let ad = board.attackers_and_defenders(piece);
            free_to_take_given(board, piece, &ad)
        }
        _ => false,
    }
}

/// `is_free_to_take` over the soft attacker/defender sets (soft-pinned
/// defenders do not count).
pub fn is_soft_free_to_take(board: &CachedBoard, piece: Square) -> bool {
    match board.color_at(piece) {
        Some(color) if board.turn() != color => {
            let ad = board.soft_attackers_and_defenders(piece);
            free_to_take_given(board, piece, &ad)
        }
        _ => false,
    }
}

/// The most valuable enemy piece the side to move can win outright.
pub fn most_valuable_free_to_take(board: &CachedBoard) -> Option<Square> {
    for piece_type in PIECE_TYPES_STRONG_TO_WEAK {
        for piece in board.pieces(piece_type, opp(board.turn())) {
            if is_free_to_take(board, piece) {
                return Some(piece);
            }
        }
    }
    None
}

/// If a defended piece is attacked by something clearly cheaper, the value of
/// the cheapest such attacker (what the taker gives up in the trade); 0 when
/// no favorable trade exists.
pub fn trade_value(board: &CachedBoard, piece: Square) -> i32 {
    let color = match board.color_at(piece) {
        Some(c) => c,
        None => return 0,
    };
    if !board.is_attacked_by(opp(color), piece) || !board.is_attacked_by(color, piece) {
        return 0;
    }
    let piece_worth = value_at(board, piece);
    let mut min_attacker_value = QUEEN_VALUE;
    let mut found = false;
    for attacker in board.attackers(opp(color), piece) {
        if !can_piece_capture(board, attacker, piece) {
            continue;
        }
        if let Some(attacker_type) = board.piece_type_at(attacker) {
            if attacker_type == Piece::King {
                continue;
            }
            let attacker_value = piece_value(attacker_type);
            if attacker_value + 100 < piece_worth {
                min_attacker_value = min_attacker_value.min(attacker_value);
                found = true;
            }
        }
    }
    if found {
        min_attacker_value
    } else {
        0
    }
}

/// The enemy piece whose favorable trade wins the most material, and the
/// value given up in that trade.
pub fn most_valuable_free_to_trade(board: &CachedBoard) -> (Option<Square>, i32) {
    let mut most_valuable = None;
    let mut highest_trade_value = 0;
    let mut highest_value_won = 0;
    for piece_type in [Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight] {
        for piece in board.pieces(piece_type, opp(board.turn())) {
            let trade = trade_value(board, piece);
            if trade > 0 {
                let value_won = piece_value(piece_type) - trade;
                if value_won > highest_value_won {
                    most_valuable = Some(piece);
                    highest_trade_value = trade;
                    highest_value_won = value_won;
                }
            }
        }
    }
    (most_valuable, highest_trade_value)
}

// ---------------------------
// Threat queries
// ---------------------------

/// Enemy pieces worth more than the piece on `sq` inside its attack set.
pub fn stronger_pieces_attacked_by(board: &CachedBoard, sq: Square) -> BitBoard {
    let (color, piece_type) = match (board.color_at(sq), board.piece_type_at(sq)) {
        (Some(c), Some(p)) => (c, p),
        _ => return EMPTY,
    };
    let mut result = EMPTY;
    for attacked in board.attacks(sq) {
        if board.color_at(attacked) == Some(opp(color)) {
            if let Some(victim) = board.piece_type_at(attacked) {
                if rough_value(piece_type) < rough_value(victim) {
                    result |= BitBoard::from_square(attacked);
                }
            }
        }
    }
    result
}

/// Could the piece on `attacker` take the undefended piece on `target`?
pub fn can_hanging_piece_be_captured_by(
    board: &CachedBoard,
    attacker: Square,
    target: Square,
) -> bool {
    match (board.color_at(attacker), board.color_at(target)) {
        (Some(a), Some(t)) if a != t => {
            can_piece_capture(board, attacker, target) && !has_defender(board, target)
        }
        _ => false,
    }
}

/// Undefended enemy pieces inside the attack set of the piece on `sq`.
pub fn hanging_pieces_attacked_by(board: &CachedBoard, sq: Square) -> BitBoard {
    let mut result = EMPTY;
    for attacked in board.attacks(sq) {
        if board.piece_type_at(attacked).is_some()
            && can_hanging_piece_be_captured_by(board, sq, attacked)
        {
            result |= BitBoard::from_square(attacked);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    #[test]
    fn pinned_piece_cannot_capture_off_ray() {
        // White knight d2 pinned by bishop b4; black pawn on f3 is off-ray.
        let b = board("rnbqk1nr/ppp2ppp/8/3pp3/1b1P4/8/PPPNPPPP/R1BQKBNR w KQkq - 0 4");
        assert!(!can_piece_capture(&b, Square::D2, Square::F3));
        // Capturing along the pin ray stays legal.
        assert!(can_piece_capture(&b, Square::D2, Square::B4));
    }

    #[test]
    fn hanging_pawn_is_free_to_take() {
        // Spec scenario 1: the b5 pawn is free for the c4 pawn.
        let b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5");
        assert!(is_free_to_take(&b, Square::B5));
    }

    #[test]
    fn defended_pawn_is_not_free_for_a_queen() {
        let b = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        // d5 is defended by the queen; taking with the e4 pawn is fine but d5
        // itself is contested, not free for the queen on d1.
        let ad = b.attackers_and_defenders(Square::D5);
        assert_eq!(ad.first_attackers.len(), 1);
        assert!(!ad.first_defenders.is_empty());
    }

    #[test]
    fn side_to_move_pieces_are_never_free() {
        // Same position with Black to move: now the undefended c4 pawn is the
        // free one, while b5 belongs to the side to move.
        let b = board("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR b KQkq - 0 5");
        assert!(is_free_to_take(&b, Square::C4));
        assert!(!is_free_to_take(&b, Square::B5));
    }

    #[test]
    fn battery_behind_a_rook_is_a_second_attacker() {
        // White rooks doubled on the d-file against a black pawn on d7.
        let b = board("3rk3/3p4/8/8/8/8/3R4/3RK3 b - - 0 1");
        let ad = b.attackers_and_defenders(Square::D7);
        assert_eq!(ad.first_attackers.len(), 1);
        assert_eq!(ad.second_attackers.len(), 1);
        assert!(ad.second_attackers.contains(&Square::D1));
        // Rook on d8 plus the king; the rook sorts first as the cheaper piece.
        assert_eq!(ad.first_defenders.len(), 2);
        assert_eq!(ad.first_defenders[0], Square::D8);
    }

    #[test]
    fn queen_attacked_by_pawn_offers_a_trade() {
        // Black queen on d4, defended by the e5 pawn, attacked by the c3 pawn.
        let b = board("rnb1kbnr/ppp1pppp/8/4p3/3q4/2P5/PP1PPPPP/RNBQKBNR b KQkq - 0 3");
        assert_eq!(trade_value(&b, Square::D4), PAWN_VALUE);
    }

    #[test]
    fn knight_attacking_queen_and_rook_sees_stronger_pieces() {
        let b = board("k2r4/8/4q3/2N5/8/8/8/4K3 w - - 0 1");
        let stronger = stronger_pieces_attacked_by(&b, Square::C5);
        assert!(stronger & BitBoard::from_square(Square::E6) != EMPTY);
        assert!(stronger & BitBoard::from_square(Square::D8) == EMPTY);
        // d8 rook: c5 knight attacks b7, d7, e6, e4, d3, b3, a4, a6 - not d8.
    }

    #[test]
    fn soft_pin_through_undefended_piece() {
        // Black knight f6 x-rayed by the g5 bishop through to the undefended
        // queen on d8? No: walk from f6 away from g5 goes e7, d8.
        let b = board("rnbqkb1r/pppp1ppp/5n2/4p1B1/8/8/PPPPPPPP/RN1QKBNR b KQkq - 0 3");
        // e7 pawn shields first; it is defended, and a bishop does not
        // outrank a pawn, so no soft pin.
        assert!(!is_soft_pinned(&b, Square::F6));
        // Remove the e7 pawn so the x-ray reaches the queen on d8.
        let b2 = board("rnbqkb1r/pppp1ppp/5n2/6B1/8/8/PPPPPPPP/RN1QKBNR b KQkq - 0 3");
        assert!(is_soft_pinned(&b2, Square::F6));
    }
}
