pub mod engine;
pub mod types;

pub use engine::{initial_position, make_move, valid_moves, MoveError, MoveOutcome};
pub use types::{
    Board, CastleSide, CastlingRights, ChessState, ChessStatus, Color, Move, Piece, PieceKind,
    Square,
};
