//! Check-only search for forced mates. Scores carry the number of checking
//! moves made so a mate in one outranks a mate in two.

use chess::{ChessMove, Color};

use crate::board::CachedBoard;
use crate::types::*;

fn probe(
    board: &mut CachedBoard,
    turn: Color,
    num_checks_left: u32,
    num_checks_made: i32,
) -> (i32, Vec<ChessMove>) {
    if board.is_checkmate() {
        return if board.turn() == turn {
            (MIN_EVAL + num_checks_made, Vec::new())
        } else {
            (MAX_EVAL - num_checks_made, Vec::new())
        };
    }
    if num_checks_left == 0 {
        return (0, Vec::new());
    }
    if board.is_check() {
        // Every response must run into the same forced mate, otherwise the
        // defense holds.
        let mut evaluation: Option<(i32, Vec<ChessMove>)> = None;
        let mut escape_move = None;
        for mv in board.legal_moves() {
            board.push(mv);
            let search_evaluation = probe(board, turn, num_checks_left, num_checks_made);
            board.pop();
            if search_evaluation.0 == 0 {
                return search_evaluation;
            }
            match &evaluation {
                None => {
                    evaluation = Some(search_evaluation);
                    escape_move = Some(mv);
                }
                Some(known) if known.0 != search_evaluation.0 => {
                    // A check was answered with a different forced line;
                    // treat the outcome as unforced.
                    return (0, Vec::new());
                }
                Some(_) => {
                    evaluation = Some(search_evaluation);
                    escape_move = Some(mv);
                }
            }
        }
        match (evaluation, escape_move) {
            (Some((score, pv)), Some(mv)) => {
                let mut line = vec![mv];
                line.extend(pv);
                (score, line)
            }
            _ => (0, Vec::new()),
        }
    } else {
        // Only checking moves continue the hunt.
        for mv in board.legal_moves() {
            board.push(mv);
            let evaluation = if board.is_check() {
                probe(board, turn, num_checks_left - 1, num_checks_made + 1)
            } else {
                (0, Vec::new())
            };
            board.pop();
            if evaluation.0 != 0 {
                let mut line = vec![mv];
                line.extend(evaluation.1);
                return (evaluation.0, line);
            }
        }
        (0, Vec::new())
    }
}

/// Iterative-deepening probe: try one check deep, then two, up to
/// `forced_mate_depth`, returning the first forced result.
pub fn search_getting_mated(
    board: &mut CachedBoard,
    turn: Color,
    forced_mate_depth: u32,
) -> (i32, Vec<ChessMove>) {
    for num_checks in 1..=forced_mate_depth {
        let forced_mate_evaluation = probe(board, turn, num_checks, 0);
        if forced_mate_evaluation.0 != 0 {
            return forced_mate_evaluation;
        }
    }
    (0, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Square;

    fn board(fen: &str) -> CachedBoard {
        CachedBoard::from_fen(fen).expect("valid fen")
    }

    #[test]
    fn finds_a_mate_in_one() {
        let mut b = board("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34");
        let (score, pv) = search_getting_mated(&mut b, Color::Black, 2);
        assert_eq!(score, MAX_EVAL - 1);
        assert_eq!(pv.len(), 1);
        let mating = pv[0];
        assert_eq!(mating.get_source(), Square::F5);
        assert!(mating.get_dest() == Square::D3 || mating.get_dest() == Square::H3);
    }

    #[test]
    fn victim_sees_the_mate_coming() {
        let mut b = board("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34");
        let (score, _) = search_getting_mated(&mut b, Color::White, 2);
        assert_eq!(score, MIN_EVAL + 1);
    }

    #[test]
    fn no_forced_mate_scores_zero() {
        let mut b = CachedBoard::default();
        let (score, pv) = search_getting_mated(&mut b, Color::White, 2);
        assert_eq!(score, 0);
        assert!(pv.is_empty());
    }

    #[test]
    fn escapable_check_is_not_a_mate() {
        // White can check on h5 but Black just blocks or moves; no mate.
        let mut b = board("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        let (score, _) = search_getting_mated(&mut b, Color::White, 2);
        assert_eq!(score, 0);
    }

    #[test]
    fn already_checkmated_board_reports_immediately() {
        let mut b = board("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        let (score, _) = search_getting_mated(&mut b, Color::White, 2);
        assert_eq!(score, MIN_EVAL);
        let (score, _) = search_getting_mated(&mut b, Color::Black, 2);
        assert_eq!(score, MAX_EVAL);
    }
}
