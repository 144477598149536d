use serde::{Deserialize, Serialize};

/// Board orientation: row 0 is Black's back rank, row 7 is White's back rank.
/// White pawns advance toward row 0.
pub type Board = [[Option<Piece>; 8]; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    pub row: usize,
    pub col: usize,
}

impl Square {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(self) -> bool {
        self.row < 8 && self.col < 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChessStatus {
    Active,
    Check,
    Checkmate,
    Stalemate,
    Draw,
}

impl ChessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChessStatus::Checkmate | ChessStatus::Stalemate | ChessStatus::Draw
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CastleSide {
    KingSide,
    QueenSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideRights {
    pub king_side: bool,
    pub queen_side: bool,
}

impl SideRights {
    pub fn all() -> Self {
        Self {
            king_side: true,
            queen_side: true,
        }
    }

    pub fn none() -> Self {
        Self {
            king_side: false,
            queen_side: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastlingRights {
    pub white: SideRights,
    pub black: SideRights,
}

impl CastlingRights {
    pub fn initial() -> Self {
        Self {
            white: SideRights::all(),
            black: SideRights::all(),
        }
    }

    pub fn side(&self, color: Color) -> SideRights {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn side_mut(&mut self, color: Color) -> &mut SideRights {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}

/// One accepted move, as recorded in the history and returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub piece: Piece,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<Piece>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub castle: Option<CastleSide>,
    pub en_passant: bool,
}

/// Pieces each side has taken off the board (white = pieces White captured).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPieces {
    pub white: Vec<Piece>,
    pub black: Vec<Piece>,
}

impl CapturedPieces {
    pub fn push(&mut self, capturer: Color, piece: Piece) {
        match capturer {
            Color::White => self.white.push(piece),
            Color::Black => self.black.push(piece),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessState {
    pub board: Board,
    pub current_player: Color,
    pub move_history: Vec<Move>,
    pub captured_pieces: CapturedPieces,
    pub game_status: ChessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    pub castling_rights: CastlingRights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en_passant_target: Option<Square>,
    pub half_move_clock: u32,
    pub full_move_number: u32,
}
