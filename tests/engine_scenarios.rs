//! End-to-end scenarios: FEN in, best move out, driven through the full
//! iterative-deepening calculator.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use engine::uci::parse_uci_move;
use engine::{calculate, CachedBoard, Cancel, MoveResult, Search};

fn best_move(fen: &str, max_depth: u32) -> MoveResult {
    let board = CachedBoard::from_fen(fen).expect("valid fen");
    let mut search = Search::new(Cancel::unlimited());
    calculate(
        &mut search,
        &board,
        None,
        max_depth,
        Arc::new(AtomicBool::new(false)),
    )
}

#[test]
fn takes_the_free_pawn_on_b5() {
    let result = best_move("rnbqkbnr/3ppppp/8/1pp5/PpPP4/8/4PPPP/RNBQKBNR w KQkq - 0 5", 1);
    let mv = result.best_move.expect("a move");
    // Both a4xb5 and c4xb5 collect the loose pawn.
    assert_eq!(mv.get_dest().to_string(), "b5", "played {mv} instead");
}

#[test]
fn wins_the_free_knight_on_c3() {
    // Depth 2 so the lines where the knight simply runs away are seen.
    let result = best_move(
        "r1bqkb1r/ppp1pppp/5P2/8/3p4/2N5/PPP1PPPP/R1BQKB1R b KQkq - 0 6",
        2,
    );
    let mv = result.best_move.expect("a move");
    assert_eq!(mv.to_string(), "d4c3", "played {mv} instead");
}

#[test]
fn plays_the_mate_in_one() {
    let result = best_move("1n3k2/5ppr/8/pp1p1b2/3P3P/4rP2/PP5q/5K2 b - - 1 34", 4);
    let mv = result.best_move.expect("a move");
    assert!(
        mv.to_string() == "f5d3" || mv.to_string() == "f5h3",
        "played {mv} instead of a mate in one"
    );
}

#[test]
fn plays_the_mate_in_two() {
    let result = best_move("r1n2n1k/pp4b1/2p3QN/2Pp4/1P1P2P1/P3r2q/1B6/R4RK1 w - - 2 28", 2);
    let mv = result.best_move.expect("a move");
    assert_eq!(mv.to_string(), "f1f8", "played {mv} instead");
}

#[test]
fn does_not_repeat_from_a_winning_position() {
    let board = CachedBoard::from_fen("r5k1/2p2p2/1p1q2p1/3p3p/4p3/3rP1PN/n1N2P1K/R3Q3 b - - 4 43")
        .expect("valid fen");
    let mut board = board;
    for uci in ["d3c3", "e1d1", "c3d3", "d1e1", "d3c3", "e1d1"] {
        let mv = parse_uci_move(uci).expect("valid move token");
        assert!(board.is_legal(mv), "{uci} should be legal in the sequence");
        board.push(mv);
    }
    let mut search = Search::new(Cancel::unlimited());
    let result = calculate(
        &mut search,
        &board,
        None,
        1,
        Arc::new(AtomicBool::new(false)),
    );
    let mv = result.best_move.expect("a move");
    assert_ne!(
        mv.to_string(),
        "c3d3",
        "repeated into a draw from a winning position"
    );
}

#[test]
fn sidesteps_the_en_passant_trick() {
    let result = best_move("8/pR4p1/1p2k2p/7P/6P1/2P5/r4PK1/8 b - - 7 39", 1);
    let mv = result.best_move.expect("a move");
    // g7g5 hands White hxg6 en passant, winning a pawn.
    assert_ne!(mv.to_string(), "g7g5", "walked into the en passant capture");
}
