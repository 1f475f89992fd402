use chess::{BitBoard, Board, ChessMove, Color, File, Piece, Square, EMPTY};

// ---------------------------
// Evaluation constants
// ---------------------------
pub const MAX_EVAL: i32 = 1_000_000;
pub const MIN_EVAL: i32 = -MAX_EVAL;
pub const DRAW_EVAL: i32 = 0;

// Scores past these bounds are forced mates; the gap of 10 leaves room for
// the per-ply mate-depth penalty (mate in up to 10).
pub const MAX_MATING_EVAL: i32 = MAX_EVAL - 10;
pub const MIN_MATING_EVAL: i32 = MIN_EVAL + 10;

// Piece values in centipawns.
pub const PAWN_VALUE: i32 = 100;
pub const KNIGHT_VALUE: i32 = 305;
pub const BISHOP_VALUE: i32 = 330;
pub const ROOK_VALUE: i32 = 500;
pub const QUEEN_VALUE: i32 = 900;
pub const KING_VALUE: i32 = 10_000;

pub const MAX_RANK: usize = 7;
pub const MAX_FILE: usize = 7;

pub const LIGHT_SQUARES: BitBoard = BitBoard(0x55AA_55AA_55AA_55AA);
pub const DARK_SQUARES: BitBoard = BitBoard(0xAA55_AA55_AA55_AA55);

pub const NON_PAWN_PIECE_TYPES: [Piece; 4] =
    [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen];
pub const PIECE_TYPES: [Piece; 5] = [
    Piece::Pawn,
    Piece::Knight,
    Piece::Bishop,
    Piece::Rook,
    Piece::Queen,
];
pub const PIECE_TYPES_STRONG_TO_WEAK: [Piece; 5] = [
    Piece::Queen,
    Piece::Rook,
    Piece::Bishop,
    Piece::Knight,
    Piece::Pawn,
];

#[inline]
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => PAWN_VALUE,
        Piece::Knight => KNIGHT_VALUE,
        Piece::Bishop => BISHOP_VALUE,
        Piece::Rook => ROOK_VALUE,
        Piece::Queen => QUEEN_VALUE,
        Piece::King => KING_VALUE,
    }
}

// Coarse values used by threshold logic (minors are interchangeable here).
#[inline]
pub fn rough_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight | Piece::Bishop => 300,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => KING_VALUE,
    }
}

#[inline]
pub fn opp(color: Color) -> Color {
    if color == Color::White {
        Color::Black
    } else {
        Color::White
    }
}

// ---------------------------
// Square geometry
// ---------------------------
#[inline]
pub fn square_file(sq: Square) -> usize {
    sq.get_file().to_index()
}

#[inline]
pub fn square_rank(sq: Square) -> usize {
    sq.get_rank().to_index()
}

/// Rank from the point of view of `color`: 0 is the back rank for both sides.
#[inline]
pub fn adjusted_rank(sq: Square, color: Color) -> usize {
    if color == Color::White {
        square_rank(sq)
    } else {
        MAX_RANK - square_rank(sq)
    }
}

#[inline]
pub fn square_at(file: i32, rank: i32) -> Option<Square> {
    if (0..8).contains(&file) && (0..8).contains(&rank) {
        // Index is bounded to 0..=63 by the range checks above.
        Some(unsafe { Square::new((rank * 8 + file) as u8) })
    } else {
        None
    }
}

/// `sq` shifted by `num_ranks` towards the eighth rank, if still on the board.
#[inline]
pub fn add_rank(sq: Square, num_ranks: i32) -> Option<Square> {
    square_at(square_file(sq) as i32, square_rank(sq) as i32 + num_ranks)
}

/// `sq` shifted by `num_files` towards the h-file, if still on the board.
#[inline]
pub fn add_file(sq: Square, num_files: i32) -> Option<Square> {
    square_at(square_file(sq) as i32 + num_files, square_rank(sq) as i32)
}

#[inline]
pub fn add_rank_and_file(sq: Square, num_ranks: i32, num_files: i32) -> Option<Square> {
    add_rank(sq, num_ranks).and_then(|s| add_file(s, num_files))
}

/// Chebyshev distance, the number of king moves between two squares.
#[inline]
pub fn square_distance(a: Square, b: Square) -> usize {
    let file_diff = (square_file(a) as i32 - square_file(b) as i32).unsigned_abs() as usize;
    let rank_diff = (square_rank(a) as i32 - square_rank(b) as i32).unsigned_abs() as usize;
    file_diff.max(rank_diff)
}

/// Squares a king's move away from `sq`.
#[inline]
pub fn adjacent_squares(sq: Square) -> BitBoard {
    chess::get_king_moves(sq)
}

#[inline]
pub fn is_light_square(sq: Square) -> bool {
    LIGHT_SQUARES & BitBoard::from_square(sq) != EMPTY
}

#[inline]
pub fn is_dark_square(sq: Square) -> bool {
    DARK_SQUARES & BitBoard::from_square(sq) != EMPTY
}

#[inline]
pub fn on_light_squares(pieces: BitBoard) -> bool {
    pieces & LIGHT_SQUARES != EMPTY
}

#[inline]
pub fn on_dark_squares(pieces: BitBoard) -> bool {
    pieces & DARK_SQUARES != EMPTY
}

/// All squares on the diagonals through `sq`.
pub fn diagonals(sq: Square) -> BitBoard {
    let mut result = EMPTY;
    for file_mod in [-1, 1] {
        for rank_mod in [-1, 1] {
            if let Some(neighbor) = add_rank_and_file(sq, rank_mod, file_mod) {
                result |= chess::line(sq, neighbor);
            }
        }
    }
    result
}

/// All squares on the file through `sq`.
#[inline]
pub fn file_squares(sq: Square) -> BitBoard {
    chess::get_file(sq.get_file())
}

/// All squares on the file and rank through `sq`.
#[inline]
pub fn file_and_rank_squares(sq: Square) -> BitBoard {
    chess::get_file(sq.get_file()) | chess::get_rank(sq.get_rank())
}

/// Squares on the files adjacent to the file of `sq`.
pub fn adjacent_file_squares(sq: Square) -> BitBoard {
    let file = square_file(sq);
    let mut result = EMPTY;
    if file > 0 {
        result |= chess::get_file(File::from_index(file - 1));
    }
    if file < MAX_FILE {
        result |= chess::get_file(File::from_index(file + 1));
    }
    result
}

// ---------------------------
// Board-level piece queries
// ---------------------------
#[inline]
pub fn count_pieces(board: &Board, piece: Piece, color: Color) -> u32 {
    (board.pieces(piece) & board.color_combined(color)).popcnt()
}

#[inline]
pub fn num_minor_pieces(board: &Board, color: Color) -> u32 {
    count_pieces(board, Piece::Knight, color) + count_pieces(board, Piece::Bishop, color)
}

#[inline]
pub fn num_major_pieces(board: &Board, color: Color) -> u32 {
    count_pieces(board, Piece::Rook, color) + count_pieces(board, Piece::Queen, color)
}

#[inline]
pub fn has_minor_or_major_pieces(board: &Board, color: Color) -> bool {
    num_minor_pieces(board, color) + num_major_pieces(board, color) > 0
}

/// Knights and nothing else heavier than a pawn.
#[inline]
pub fn has_only_knight_minor_or_major_pieces(board: &Board, color: Color) -> bool {
    count_pieces(board, Piece::Knight, color) > 0
        && count_pieces(board, Piece::Bishop, color) == 0
        && num_major_pieces(board, color) == 0
}

pub fn insufficient_material(board: &Board) -> bool {
    let no_pawns = board.pieces(Piece::Pawn).popcnt() == 0;
    let no_rooks = board.pieces(Piece::Rook).popcnt() == 0;
    let no_queens = board.pieces(Piece::Queen).popcnt() == 0;
    if no_pawns && no_rooks && no_queens {
        return num_minor_pieces(board, Color::White) <= 1
            && num_minor_pieces(board, Color::Black) <= 1;
    }
    false
}

// ---------------------------
// Move pack/unpack for the TT
// ---------------------------
pub fn pack_move(m: ChessMove) -> u16 {
    let from = m.get_source().to_index() as u16;
    let to = m.get_dest().to_index() as u16;
    let promo = match m.get_promotion() {
        Some(Piece::Knight) => 1,
        Some(Piece::Bishop) => 2,
        Some(Piece::Rook) => 3,
        Some(Piece::Queen) => 4,
        _ => 0,
    } as u16;
    (from & 63) | ((to & 63) << 6) | ((promo & 7) << 12)
}

pub fn unpack_move(code: u16) -> Option<ChessMove> {
    if code == 0 {
        return None;
    }
    let from_idx = (code & 63) as u8;
    let to_idx = ((code >> 6) & 63) as u8;
    // Indices are masked to 0..=63 above.
    let from = unsafe { Square::new(from_idx) };
    let to = unsafe { Square::new(to_idx) };
    let promo = match (code >> 12) & 7 {
        1 => Some(Piece::Knight),
        2 => Some(Piece::Bishop),
        3 => Some(Piece::Rook),
        4 => Some(Piece::Queen),
        _ => None,
    };
    Some(ChessMove::new(from, to, promo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Square;

    #[test]
    fn adjusted_rank_flips_for_black() {
        assert_eq!(adjusted_rank(Square::E2, Color::White), 1);
        assert_eq!(adjusted_rank(Square::E2, Color::Black), 6);
        assert_eq!(adjusted_rank(Square::A8, Color::Black), 0);
    }

    #[test]
    fn add_rank_stays_on_board() {
        assert_eq!(add_rank(Square::A1, 1), Some(Square::A2));
        assert_eq!(add_rank(Square::A8, 1), None);
        assert_eq!(add_file(Square::H1, 1), None);
        assert_eq!(add_rank_and_file(Square::E4, 2, 1), Some(Square::F6));
    }

    #[test]
    fn square_colors() {
        assert!(is_dark_square(Square::A1));
        assert!(is_light_square(Square::H1));
        assert!(is_light_square(Square::A8));
        assert!(is_dark_square(Square::H8));
    }

    #[test]
    fn distance_is_chebyshev() {
        assert_eq!(square_distance(Square::A1, Square::H8), 7);
        assert_eq!(square_distance(Square::E4, Square::E4), 0);
        assert_eq!(square_distance(Square::B2, Square::C4), 2);
    }

    #[test]
    fn move_packing_round_trips() {
        let m = ChessMove::new(Square::E2, Square::E4, None);
        assert_eq!(unpack_move(pack_move(m)), Some(m));
        let promo = ChessMove::new(Square::A7, Square::A8, Some(Piece::Queen));
        assert_eq!(unpack_move(pack_move(promo)), Some(promo));
        assert_eq!(unpack_move(0), None);
    }

    #[test]
    fn rough_values_group_the_minors() {
        assert_eq!(rough_value(Piece::Knight), rough_value(Piece::Bishop));
        assert!(piece_value(Piece::Knight) < piece_value(Piece::Bishop));
        let board = Board::default();
        assert_eq!(count_pieces(&board, Piece::Pawn, Color::White), 8);
        assert!(!insufficient_material(&board));
    }
}
