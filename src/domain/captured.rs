//! Captured pieces and material lead, derived from the live piece list.
//!
//! # Material Values
//!
//! - Pawn: 1
//! - Knight/Bishop: 3
//! - Rook: 5
//! - Queen: 9
//! - King: 0
//!
//! # Reconstruction
//!
//! There is no ledger of capture events. The pieces still on the board are
//! compared per type between the two colours: every type present on both
//! sides cancels one occurrence from each. Whatever is left over on White's
//! side stands for Black pieces White has taken, and vice versa. A promoted
//! piece is indistinguishable from an original one.
//!
//! Only the material *lead* is shown as a score: the side that is behind
//! shows 0.

use crate::domain::chess::{Piece, PieceType};

/// Captured pieces for display next to each player
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedPieces {
    /// Black pieces taken by White, most valuable first
    pub white_captured: Vec<PieceType>,
    /// White pieces taken by Black, most valuable first
    pub black_captured: Vec<PieceType>,
    /// White's material lead, 0 if not ahead
    pub white_score: i32,
    /// Black's material lead, 0 if not ahead
    pub black_score: i32,
}

impl CapturedPieces {
    /// Compute from the full live piece list (both colours, off-board entries ignored)
    pub fn from_pieces<'a>(pieces: impl IntoIterator<Item = &'a Piece>) -> Self {
        let mut white: Vec<PieceType> = Vec::new();
        let mut black: Vec<PieceType> = Vec::new();
        for piece in pieces.into_iter().filter(|p| p.square.is_on_board()) {
            if piece.is_white {
                white.push(piece.piece_type);
            } else {
                black.push(piece.piece_type);
            }
        }

        let white_total: i32 = white.iter().map(|p| p.score()).sum();
        let black_total: i32 = black.iter().map(|p| p.score()).sum();

        let mut white_captured = Vec::with_capacity(white.len());
        for piece_type in white {
            match black.iter().position(|p| *p == piece_type) {
                Some(idx) => {
                    black.swap_remove(idx);
                }
                None => white_captured.push(piece_type),
            }
        }
        let mut black_captured = black;

        sort_by_value(&mut white_captured);
        sort_by_value(&mut black_captured);

        Self {
            white_captured,
            black_captured,
            white_score: (white_total - black_total).max(0),
            black_score: (black_total - white_total).max(0),
        }
    }

    /// Signed material balance, positive when White is ahead
    pub fn material_advantage(&self) -> i32 {
        self.white_score - self.black_score
    }
}

fn sort_by_value(pieces: &mut [PieceType]) {
    pieces.sort_by_key(|p| std::cmp::Reverse(p.score()));
}
