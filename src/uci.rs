//! The UCI front end: a reader thread feeds stdin lines over a channel and
//! flips the stop flag the moment it sees `stop` or `quit`, while the main
//! thread runs the search to completion between commands.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;

use chess::{ChessMove, Piece, Square};
use log::{debug, info, warn};
use thiserror::Error;

use crate::board::CachedBoard;
use crate::calculator::{self, MoveResult, DEFAULT_MAX_DEPTH};
use crate::clock;
use crate::search::{Cancel, Search};

pub const ENGINE_NAME: &str = "Skewer";
pub const ENGINE_AUTHOR: &str = "the Skewer authors";

#[derive(Debug, Error)]
pub enum UciError {
    #[error("malformed fen in '{0}'")]
    BadFen(String),
    #[error("illegal or unparsable move '{0}'")]
    BadMove(String),
    #[error("malformed position command")]
    BadPosition,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GoParams {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: u64,
    pub binc: u64,
    pub movetime: Option<u64>,
    pub movestogo: Option<u32>,
    pub depth: Option<u32>,
    pub ponder: bool,
}

pub fn parse_go(parts: &[&str]) -> GoParams {
    let mut params = GoParams::default();
    let mut index = 1;
    while index < parts.len() {
        let key = parts[index];
        let number = parts.get(index + 1).and_then(|t| t.parse::<u64>().ok());
        let mut consumed_value = true;
        match (key, number) {
            ("wtime", Some(v)) => params.wtime = Some(v),
            ("btime", Some(v)) => params.btime = Some(v),
            ("winc", Some(v)) => params.winc = v,
            ("binc", Some(v)) => params.binc = v,
            ("movetime", Some(v)) => params.movetime = Some(v),
            ("movestogo", Some(v)) => params.movestogo = Some(v as u32),
            ("depth", Some(v)) => params.depth = Some(v as u32),
            ("wtime" | "btime" | "winc" | "binc" | "movetime" | "movestogo" | "depth", None) => {
                warn!("missing or bad value after '{key}'");
                consumed_value = false;
            }
            ("ponder", _) => {
                params.ponder = true;
                consumed_value = false;
            }
            ("infinite", _) => consumed_value = false,
            (other, _) => {
                warn!("unknown go token '{other}'");
                consumed_value = false;
            }
        }
        index += 1 + usize::from(consumed_value);
    }
    params
}

/// Parses a long-algebraic move like `e2e4` or `e7e8q`.
pub fn parse_uci_move(token: &str) -> Result<ChessMove, UciError> {
    if token.len() < 4 {
        return Err(UciError::BadMove(token.to_string()));
    }
    let from = Square::from_str(&token[0..2]).map_err(|_| UciError::BadMove(token.into()))?;
    let to = Square::from_str(&token[2..4]).map_err(|_| UciError::BadMove(token.into()))?;
    let promotion = match token.get(4..5) {
        None => None,
        Some("q") => Some(Piece::Queen),
        Some("r") => Some(Piece::Rook),
        Some("b") => Some(Piece::Bishop),
        Some("n") => Some(Piece::Knight),
        Some(_) => return Err(UciError::BadMove(token.to_string())),
    };
    Ok(ChessMove::new(from, to, promotion))
}

/// Builds the board a `position` command describes. The whole line is
/// rejected if any of it fails to parse, so a bad line never leaves the
/// engine on a half-applied position.
pub fn parse_position(parts: &[&str], chess960: bool) -> Result<CachedBoard, UciError> {
    let mut board;
    let mut index = 1;
    match parts.get(index) {
        Some(&"startpos") => {
            board = CachedBoard::default();
            index += 1;
        }
        Some(&"fen") => {
            let fen_tokens: Vec<&str> = parts[index + 1..]
                .iter()
                .take_while(|&&t| t != "moves")
                .copied()
                .collect();
            if fen_tokens.is_empty() {
                return Err(UciError::BadPosition);
            }
            let fen = fen_tokens.join(" ");
            board = CachedBoard::from_fen(&fen).map_err(|_| UciError::BadFen(fen.clone()))?;
            index += 1 + fen_tokens.len();
        }
        _ => return Err(UciError::BadPosition),
    }
    board.set_chess960(chess960);

    if parts.get(index) == Some(&"moves") {
        for token in &parts[index + 1..] {
            let mv = parse_uci_move(token)?;
            if !board.is_legal(mv) {
                return Err(UciError::BadMove(token.to_string()));
            }
            board.push(mv);
        }
    }
    Ok(board)
}

fn send(line: &str) {
    println!("{line}");
    debug!("OUT: {line}");
    let _ = io::stdout().flush();
}

struct Engine {
    board: CachedBoard,
    search: Search,
    stop: Arc<AtomicBool>,
    chess960: bool,
    max_depth: u32,
}

impl Engine {
    fn new(stop: Arc<AtomicBool>) -> Self {
        let max_depth = std::env::var("SKEWER_MAX_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_DEPTH);
        Engine {
            board: CachedBoard::default(),
            search: Search::new(Cancel::unlimited()),
            stop,
            chess960: false,
            max_depth,
        }
    }

    fn handle_uci(&self) {
        send(&format!("id name {ENGINE_NAME}"));
        send(&format!("id author {ENGINE_AUTHOR}"));
        send("option name UCI_Chess960 type check default false");
        send("uciok");
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        // setoption name <NAME> value <VALUE>
        let name = parts
            .iter()
            .position(|&t| t == "name")
            .and_then(|i| parts.get(i + 1))
            .copied();
        let value = parts
            .iter()
            .position(|&t| t == "value")
            .and_then(|i| parts.get(i + 1))
            .copied();
        match (name, value) {
            (Some("UCI_Chess960"), Some(value)) => {
                self.chess960 = value.eq_ignore_ascii_case("true");
                self.board.set_chess960(self.chess960);
            }
            (Some(other), _) => info!("ignoring option '{other}'"),
            _ => warn!("malformed setoption command"),
        }
    }

    fn handle_position(&mut self, parts: &[&str]) {
        match parse_position(parts, self.chess960) {
            Ok(board) => self.board = board,
            Err(err) => warn!("ignoring position command: {err}"),
        }
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let params = parse_go(parts);
        if params.ponder {
            // Pondering is not implemented; treat the command as a normal go.
            info!("ponder requested but not supported");
        }

        let max_think_time = match (params.movetime, params.wtime, params.btime) {
            (Some(movetime), _, _) => Some(movetime as f64 / 1000.0),
            (None, Some(wtime), Some(btime)) => Some(clock::max_think_time(
                &self.board,
                wtime,
                params.winc,
                btime,
                params.binc,
            )),
            _ => None,
        };
        if let Some(budget) = max_think_time {
            info!("searching for {budget:.3} seconds");
        }
        let max_depth = params.depth.unwrap_or(self.max_depth);

        self.stop.store(false, Ordering::Relaxed);
        let result: MoveResult = calculator::calculate(
            &mut self.search,
            &self.board,
            max_think_time,
            max_depth,
            Arc::clone(&self.stop),
        );

        match result.best_move {
            Some(best) => send(&format!("bestmove {best}")),
            // No legal moves at the root: the null move tells the host.
            None if self.board.legal_moves().is_empty() => send("bestmove 0000"),
            None => send("bestmove a1a1"),
        }
    }
}

fn spawn_reader(stop: Arc<AtomicBool>) -> Receiver<String> {
    let (sender, receiver) = channel::<String>();
    thread::spawn(move || {
        debug!("stdin thread started");
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let trimmed = line.trim();
            // Interrupt a running search before the command is dequeued.
            if trimmed == "stop" || trimmed == "quit" {
                stop.store(true, Ordering::Relaxed);
            }
            if sender.send(line).is_err() {
                break;
            }
        }
        debug!("stdin thread terminating");
    });
    receiver
}

/// Runs the UCI loop until `quit` or end of input.
pub fn run() -> io::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let lines = spawn_reader(Arc::clone(&stop));
    let mut engine = Engine::new(Arc::clone(&stop));

    while let Ok(line) = lines.recv() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("IN: {line}");
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts[0] {
            "uci" => engine.handle_uci(),
            "isready" => send("readyok"),
            "setoption" => engine.handle_setoption(&parts),
            "ucinewgame" => {
                engine.board = CachedBoard::default();
                engine.board.set_chess960(engine.chess960);
            }
            "position" => engine.handle_position(&parts),
            "go" => {
                engine.handle_go(&parts);
                engine.stop.store(false, Ordering::Relaxed);
            }
            "stop" => {
                // Either the search already honored it, or there is nothing
                // to stop; both are no-ops here.
                engine.stop.store(false, Ordering::Relaxed);
            }
            "quit" => break,
            "fen" => send(&engine.board.fen()),
            other => warn!("unknown command '{other}'"),
        }
    }
    Ok(())
}
