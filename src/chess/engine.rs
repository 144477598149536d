//! Chess rule engine: pure functions over [`ChessState`].
//!
//! Move legality is computed as raw geometric moves filtered by a simulated
//! king-safety check. Castling additionally requires the transit square to be
//! unattacked.

use thiserror::Error;

use super::types::{
    Board, CapturedPieces, CastleSide, CastlingRights, ChessState, ChessStatus, Color, Move, Piece,
    PieceKind, SideRights, Square,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("square is out of bounds")]
    OutOfBounds,
    #[error("no piece on the source square")]
    EmptySquare,
    #[error("piece belongs to the opponent")]
    WrongColor,
    #[error("move is not legal from this square")]
    Illegal,
    #[error("kings cannot be captured")]
    KingCapture,
    #[error("invalid promotion piece")]
    InvalidPromotion,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub state: ChessState,
    pub mv: Move,
}

const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];
const KING_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];
const ROOK_DIRS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const BISHOP_DIRS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Standard starting position, White to move.
pub fn initial_position() -> ChessState {
    let mut board: Board = [[None; 8]; 8];

    let back_rank = [
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Queen,
        PieceKind::King,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
    ];
    for (col, kind) in back_rank.into_iter().enumerate() {
        board[0][col] = Some(Piece::new(kind, Color::Black));
        board[7][col] = Some(Piece::new(kind, Color::White));
    }
    for col in 0..8 {
        board[1][col] = Some(Piece::new(PieceKind::Pawn, Color::Black));
        board[6][col] = Some(Piece::new(PieceKind::Pawn, Color::White));
    }

    ChessState {
        board,
        current_player: Color::White,
        move_history: Vec::new(),
        captured_pieces: CapturedPieces::default(),
        game_status: ChessStatus::Active,
        winner: None,
        castling_rights: CastlingRights::initial(),
        en_passant_target: None,
        half_move_clock: 0,
        full_move_number: 1,
    }
}

/// Legal destinations for the piece on `from`, or empty when `from` is empty,
/// holds an opponent piece, or every candidate would leave the own king in
/// check.
pub fn valid_moves(state: &ChessState, from: Square) -> Vec<Square> {
    if !from.in_bounds() {
        return Vec::new();
    }
    let Some(piece) = state.board[from.row][from.col] else {
        return Vec::new();
    };
    if piece.color != state.current_player {
        return Vec::new();
    }

    raw_moves(state, from, piece)
        .into_iter()
        .filter(|&to| {
            let board = board_after(&state.board, from, to, state.en_passant_target);
            !in_check(&board, piece.color)
        })
        .collect()
}

/// Validates and applies one move on a copy of `state`.
pub fn make_move(
    state: &ChessState,
    from: Square,
    to: Square,
    promotion: Option<PieceKind>,
) -> Result<MoveOutcome, MoveError> {
    if !from.in_bounds() || !to.in_bounds() {
        return Err(MoveError::OutOfBounds);
    }
    let Some(piece) = state.board[from.row][from.col] else {
        return Err(MoveError::EmptySquare);
    };
    let color = piece.color;
    if color != state.current_player {
        return Err(MoveError::WrongColor);
    }
    if !valid_moves(state, from).contains(&to) {
        return Err(MoveError::Illegal);
    }
    // Shouldn't be reachable through legal play; guards corrupted positions.
    if let Some(target) = state.board[to.row][to.col] {
        if target.kind == PieceKind::King {
            return Err(MoveError::KingCapture);
        }
    }

    let is_en_passant = piece.kind == PieceKind::Pawn
        && state.en_passant_target == Some(to)
        && from.col != to.col
        && state.board[to.row][to.col].is_none();
    let castle = if piece.kind == PieceKind::King && from.col.abs_diff(to.col) == 2 {
        Some(if to.col == 6 {
            CastleSide::KingSide
        } else {
            CastleSide::QueenSide
        })
    } else {
        None
    };
    let captured = if is_en_passant {
        state.board[from.row][to.col]
    } else {
        state.board[to.row][to.col]
    };

    let mut placed = piece;
    let mut applied_promotion = None;
    if piece.kind == PieceKind::Pawn && to.row == promotion_row(color) {
        let kind = promotion.unwrap_or(PieceKind::Queen);
        if !matches!(
            kind,
            PieceKind::Queen | PieceKind::Rook | PieceKind::Bishop | PieceKind::Knight
        ) {
            return Err(MoveError::InvalidPromotion);
        }
        placed = Piece::new(kind, color);
        applied_promotion = Some(kind);
    }

    let mut next = state.clone();

    next.board[from.row][from.col] = None;
    if is_en_passant {
        next.board[from.row][to.col] = None;
    }
    next.board[to.row][to.col] = Some(placed);
    if let Some(side) = castle {
        let row = from.row;
        match side {
            CastleSide::KingSide => next.board[row][5] = next.board[row][7].take(),
            CastleSide::QueenSide => next.board[row][3] = next.board[row][0].take(),
        }
    }

    if let Some(taken) = captured {
        next.captured_pieces.push(color, taken);
    }

    if captured.is_some() || piece.kind == PieceKind::Pawn {
        next.half_move_clock = 0;
    } else {
        next.half_move_clock += 1;
    }
    if color == Color::Black {
        next.full_move_number += 1;
    }

    update_castling_rights(&mut next.castling_rights, piece, color, from, to);

    next.en_passant_target = if piece.kind == PieceKind::Pawn && from.row.abs_diff(to.row) == 2 {
        Some(Square::new((from.row + to.row) / 2, from.col))
    } else {
        None
    };

    next.current_player = color.opposite();

    let opponent_checked = in_check(&next.board, next.current_player);
    let opponent_has_reply = has_any_legal_move(&next);
    next.game_status = match (opponent_checked, opponent_has_reply) {
        (true, false) => {
            next.winner = Some(color);
            ChessStatus::Checkmate
        }
        (true, true) => ChessStatus::Check,
        (false, false) => ChessStatus::Stalemate,
        (false, true) => ChessStatus::Active,
    };

    let mv = Move {
        from,
        to,
        piece,
        captured,
        promotion: applied_promotion,
        castle,
        en_passant: is_en_passant,
    };
    next.move_history.push(mv);

    Ok(MoveOutcome { state: next, mv })
}

fn update_castling_rights(
    rights: &mut CastlingRights,
    piece: Piece,
    color: Color,
    from: Square,
    to: Square,
) {
    if piece.kind == PieceKind::King {
        *rights.side_mut(color) = SideRights::none();
    }
    if piece.kind == PieceKind::Rook {
        let home = home_row(color);
        if from == Square::new(home, 0) {
            rights.side_mut(color).queen_side = false;
        }
        if from == Square::new(home, 7) {
            rights.side_mut(color).king_side = false;
        }
    }
    // A capture landing on a home rook square voids that right too.
    let opponent = color.opposite();
    let opp_home = home_row(opponent);
    if to == Square::new(opp_home, 0) {
        rights.side_mut(opponent).queen_side = false;
    }
    if to == Square::new(opp_home, 7) {
        rights.side_mut(opponent).king_side = false;
    }
}

fn pawn_dir(color: Color) -> i32 {
    match color {
        Color::White => -1,
        Color::Black => 1,
    }
}

fn pawn_start_row(color: Color) -> usize {
    match color {
        Color::White => 6,
        Color::Black => 1,
    }
}

fn promotion_row(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 7,
    }
}

fn home_row(color: Color) -> usize {
    match color {
        Color::White => 7,
        Color::Black => 0,
    }
}

fn offset(from: Square, dr: i32, dc: i32) -> Option<Square> {
    let row = from.row as i32 + dr;
    let col = from.col as i32 + dc;
    if (0..8).contains(&row) && (0..8).contains(&col) {
        Some(Square::new(row as usize, col as usize))
    } else {
        None
    }
}

/// Raw geometric moves before the king-safety filter.
fn raw_moves(state: &ChessState, from: Square, piece: Piece) -> Vec<Square> {
    let board = &state.board;
    let color = piece.color;
    let mut out = Vec::new();

    match piece.kind {
        PieceKind::Pawn => {
            let dir = pawn_dir(color);
            if let Some(one) = offset(from, dir, 0) {
                if board[one.row][one.col].is_none() {
                    out.push(one);
                    if from.row == pawn_start_row(color) {
                        if let Some(two) = offset(from, 2 * dir, 0) {
                            if board[two.row][two.col].is_none() {
                                out.push(two);
                            }
                        }
                    }
                }
            }
            for dc in [-1, 1] {
                if let Some(diag) = offset(from, dir, dc) {
                    match board[diag.row][diag.col] {
                        Some(target) if target.color != color => out.push(diag),
                        None if state.en_passant_target == Some(diag) => out.push(diag),
                        _ => {}
                    }
                }
            }
        }
        PieceKind::Knight => {
            for (dr, dc) in KNIGHT_OFFSETS {
                if let Some(to) = offset(from, dr, dc) {
                    if board[to.row][to.col].map(|p| p.color) != Some(color) {
                        out.push(to);
                    }
                }
            }
        }
        PieceKind::Rook => slide(board, from, color, &ROOK_DIRS, &mut out),
        PieceKind::Bishop => slide(board, from, color, &BISHOP_DIRS, &mut out),
        PieceKind::Queen => {
            slide(board, from, color, &ROOK_DIRS, &mut out);
            slide(board, from, color, &BISHOP_DIRS, &mut out);
        }
        PieceKind::King => {
            for (dr, dc) in KING_OFFSETS {
                if let Some(to) = offset(from, dr, dc) {
                    if board[to.row][to.col].map(|p| p.color) != Some(color) {
                        out.push(to);
                    }
                }
            }
            castling_moves(state, from, color, &mut out);
        }
    }

    out
}

fn slide(board: &Board, from: Square, color: Color, dirs: &[(i32, i32)], out: &mut Vec<Square>) {
    for &(dr, dc) in dirs {
        let mut cursor = from;
        while let Some(to) = offset(cursor, dr, dc) {
            match board[to.row][to.col] {
                None => {
                    out.push(to);
                    cursor = to;
                }
                Some(occupant) => {
                    if occupant.color != color {
                        out.push(to);
                    }
                    break;
                }
            }
        }
    }
}

/// Castling candidates: right held, home rook present, squares between empty,
/// king not in check, transit square unattacked. The destination square is
/// covered by the king-safety filter.
fn castling_moves(state: &ChessState, from: Square, color: Color, out: &mut Vec<Square>) {
    let home = home_row(color);
    if from != Square::new(home, 4) {
        return;
    }
    let enemy = color.opposite();
    if is_attacked(&state.board, from, enemy) {
        return;
    }
    let board = &state.board;
    let rights = state.castling_rights.side(color);
    let rook = Some(Piece::new(PieceKind::Rook, color));

    if rights.king_side
        && board[home][5].is_none()
        && board[home][6].is_none()
        && board[home][7] == rook
        && !is_attacked(board, Square::new(home, 5), enemy)
    {
        out.push(Square::new(home, 6));
    }
    if rights.queen_side
        && board[home][1].is_none()
        && board[home][2].is_none()
        && board[home][3].is_none()
        && board[home][0] == rook
        && !is_attacked(board, Square::new(home, 3), enemy)
    {
        out.push(Square::new(home, 2));
    }
}

/// Squares a piece attacks: pawn diagonals only, no castling, sliders blocked
/// by the first occupant.
fn attacks(board: &Board, from: Square, piece: Piece) -> Vec<Square> {
    let mut out = Vec::new();
    match piece.kind {
        PieceKind::Pawn => {
            let dir = pawn_dir(piece.color);
            for dc in [-1, 1] {
                if let Some(to) = offset(from, dir, dc) {
                    out.push(to);
                }
            }
        }
        PieceKind::Knight => {
            for (dr, dc) in KNIGHT_OFFSETS {
                if let Some(to) = offset(from, dr, dc) {
                    out.push(to);
                }
            }
        }
        PieceKind::King => {
            for (dr, dc) in KING_OFFSETS {
                if let Some(to) = offset(from, dr, dc) {
                    out.push(to);
                }
            }
        }
        PieceKind::Rook => slide_attacks(board, from, &ROOK_DIRS, &mut out),
        PieceKind::Bishop => slide_attacks(board, from, &BISHOP_DIRS, &mut out),
        PieceKind::Queen => {
            slide_attacks(board, from, &ROOK_DIRS, &mut out);
            slide_attacks(board, from, &BISHOP_DIRS, &mut out);
        }
    }
    out
}

fn slide_attacks(board: &Board, from: Square, dirs: &[(i32, i32)], out: &mut Vec<Square>) {
    for &(dr, dc) in dirs {
        let mut cursor = from;
        while let Some(to) = offset(cursor, dr, dc) {
            out.push(to);
            if board[to.row][to.col].is_some() {
                break;
            }
            cursor = to;
        }
    }
}

fn is_attacked(board: &Board, target: Square, by: Color) -> bool {
    for row in 0..8 {
        for col in 0..8 {
            if let Some(piece) = board[row][col] {
                if piece.color == by && attacks(board, Square::new(row, col), piece).contains(&target)
                {
                    return true;
                }
            }
        }
    }
    false
}

fn king_square(board: &Board, color: Color) -> Option<Square> {
    for row in 0..8 {
        for col in 0..8 {
            if board[row][col] == Some(Piece::new(PieceKind::King, color)) {
                return Some(Square::new(row, col));
            }
        }
    }
    None
}

fn in_check(board: &Board, color: Color) -> bool {
    match king_square(board, color) {
        Some(sq) => is_attacked(board, sq, color.opposite()),
        None => false,
    }
}

/// Board state after moving `from → to`, including en-passant pawn removal and
/// castling rook transit. Used as the scratch copy for king-safety checks.
fn board_after(board: &Board, from: Square, to: Square, en_passant: Option<Square>) -> Board {
    let mut next = *board;
    let piece = next[from.row][from.col];
    if let Some(p) = piece {
        if p.kind == PieceKind::Pawn
            && en_passant == Some(to)
            && from.col != to.col
            && next[to.row][to.col].is_none()
        {
            next[from.row][to.col] = None;
        }
        if p.kind == PieceKind::King && from.col.abs_diff(to.col) == 2 {
            if to.col == 6 {
                next[from.row][5] = next[from.row][7].take();
            } else {
                next[from.row][3] = next[from.row][0].take();
            }
        }
    }
    next[to.row][to.col] = piece;
    next[from.row][from.col] = None;
    next
}

fn has_any_legal_move(state: &ChessState) -> bool {
    for row in 0..8 {
        for col in 0..8 {
            if let Some(piece) = state.board[row][col] {
                if piece.color == state.current_player
                    && !valid_moves(state, Square::new(row, col)).is_empty()
                {
                    return true;
                }
            }
        }
    }
    false
}
