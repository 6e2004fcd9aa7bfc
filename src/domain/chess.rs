//! Pure chess domain types and utilities.
//! No I/O and no threads - this is the domain layer.

use std::fmt;

use shakmaty::Role;

/// A board index, `a1` = 0 through `h8` = 63.
///
/// Indices of 64 and above are "off the board" (a captured piece as reported
/// by some engines) and must be filtered out before anything indexes a board.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct Square(u8);

impl Square {
    pub const COUNT: usize = 64;

    /// Wrap a raw index without checking the range
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Wrap a raw index, rejecting off-board values
    pub fn on_board(index: u8) -> Option<Self> {
        (usize::from(index) < Self::COUNT).then_some(Self(index))
    }

    /// Build a square from 0-based file and rank
    pub fn from_coords(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    pub const fn rank(self) -> u8 {
        self.0 / 8
    }

    pub const fn is_on_board(self) -> bool {
        (self.0 as usize) < Self::COUNT
    }

    /// File letter `a`..`h`
    pub fn file_char(self) -> char {
        char::from(b'a' + self.file())
    }

    /// Rank digit `1`..`8`
    pub fn rank_char(self) -> char {
        char::from(b'1' + self.rank())
    }

    /// Parse a square name such as `e4`
    pub fn parse(name: &str) -> Option<Self> {
        let bytes = name.trim().as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].to_ascii_lowercase().checked_sub(b'a')?;
        let rank = bytes[1].checked_sub(b'1')?;
        Self::from_coords(file, rank)
    }

    /// Every on-board square in index order
    pub fn all() -> impl Iterator<Item = Square> {
        (0..Self::COUNT as u8).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_on_board() {
            write!(f, "{}{}", self.file_char(), self.rank_char())
        } else {
            write!(f, "--")
        }
    }
}

/// Piece types, in the order of their 3-bit codes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(u8)]
pub enum PieceType {
    #[default]
    None = 0,
    Pawn = 1,
    Knight = 2,
    Bishop = 3,
    Rook = 4,
    Queen = 5,
    King = 6,
}

impl PieceType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PieceType::None,
            1 => PieceType::Pawn,
            2 => PieceType::Knight,
            3 => PieceType::Bishop,
            4 => PieceType::Rook,
            5 => PieceType::Queen,
            6 => PieceType::King,
            _ => return None,
        })
    }

    /// Material value in pawns
    pub const fn score(self) -> i32 {
        match self {
            PieceType::Pawn => 1,
            PieceType::Knight | PieceType::Bishop => 3,
            PieceType::Rook => 5,
            PieceType::Queen => 9,
            PieceType::King | PieceType::None => 0,
        }
    }

    /// Letter used in move text; pawns (and `None`) have none
    pub const fn letter(self) -> Option<char> {
        match self {
            PieceType::Knight => Some('N'),
            PieceType::Bishop => Some('B'),
            PieceType::Rook => Some('R'),
            PieceType::Queen => Some('Q'),
            PieceType::King => Some('K'),
            PieceType::Pawn | PieceType::None => None,
        }
    }

    /// Whether a pawn may promote to this type
    pub const fn is_promotion_target(self) -> bool {
        matches!(
            self,
            PieceType::Knight | PieceType::Bishop | PieceType::Rook | PieceType::Queen
        )
    }
}

/// A piece on (or just taken off) the board
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Piece {
    pub square: Square,
    pub piece_type: PieceType,
    pub is_white: bool,
}

impl Piece {
    pub fn score(&self) -> i32 {
        self.piece_type.score()
    }
}

/// A piece with an identity that survives its moves, used to key animated
/// UI elements across redraws
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IndexedPiece {
    pub id: u32,
    pub piece: Piece,
}

/// Game outcome/check status as reported by the engine
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum GameState {
    #[default]
    None,
    WinnerWhite,
    WinnerBlack,
    Draw,
    WhiteInCheck,
    BlackInCheck,
    Invalid,
}

impl GameState {
    /// Integer code carried by the board-changed callback
    pub const fn code(self) -> i32 {
        match self {
            GameState::None => 0,
            GameState::WinnerWhite => 1,
            GameState::WinnerBlack => 2,
            GameState::Draw => 3,
            GameState::WhiteInCheck => 4,
            GameState::BlackInCheck => 5,
            GameState::Invalid => 6,
        }
    }

    /// Decode a callback state code; unknown codes map to `Invalid`
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => GameState::None,
            1 => GameState::WinnerWhite,
            2 => GameState::WinnerBlack,
            3 => GameState::Draw,
            4 => GameState::WhiteInCheck,
            5 => GameState::BlackInCheck,
            _ => GameState::Invalid,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            GameState::WinnerWhite | GameState::WinnerBlack | GameState::Draw | GameState::Invalid
        )
    }

    /// PGN result token
    pub const fn result_token(self) -> &'static str {
        match self {
            GameState::WinnerWhite => "1-0",
            GameState::WinnerBlack => "0-1",
            GameState::Draw => "1/2-1/2",
            _ => "*",
        }
    }
}

/// Convert a shakmaty role to our piece type
pub fn role_to_piece_type(role: Role) -> PieceType {
    match role {
        Role::Pawn => PieceType::Pawn,
        Role::Knight => PieceType::Knight,
        Role::Bishop => PieceType::Bishop,
        Role::Rook => PieceType::Rook,
        Role::Queen => PieceType::Queen,
        Role::King => PieceType::King,
    }
}

/// Convert a shakmaty square to our board index
pub fn from_shakmaty_square(square: shakmaty::Square) -> Square {
    Square::new(u32::from(square) as u8)
}

/// Convert our board index to a shakmaty square (if on the board)
pub fn to_shakmaty_square(square: Square) -> Option<shakmaty::Square> {
    square
        .is_on_board()
        .then(|| shakmaty::Square::new(u32::from(square.index())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_coordinates() {
        let e4 = Square::parse("e4").unwrap();
        assert_eq!(e4.index(), 28);
        assert_eq!(e4.file(), 4);
        assert_eq!(e4.rank(), 3);
        assert_eq!(e4.to_string(), "e4");
        assert_eq!(Square::from_coords(7, 7), Some(Square::new(63)));
    }

    #[test]
    fn test_off_board_squares() {
        assert!(Square::on_board(64).is_none());
        assert!(!Square::new(70).is_on_board());
        assert_eq!(Square::new(70).to_string(), "--");
        assert!(Square::parse("i1").is_none());
        assert!(Square::parse("a9").is_none());
        assert!(to_shakmaty_square(Square::new(64)).is_none());
    }

    #[test]
    fn test_piece_scores() {
        assert_eq!(PieceType::Pawn.score(), 1);
        assert_eq!(PieceType::Knight.score(), 3);
        assert_eq!(PieceType::Bishop.score(), 3);
        assert_eq!(PieceType::Rook.score(), 5);
        assert_eq!(PieceType::Queen.score(), 9);
        assert_eq!(PieceType::King.score(), 0);
        assert_eq!(PieceType::None.score(), 0);
    }

    #[test]
    fn test_game_state_codes() {
        for state in [
            GameState::None,
            GameState::WinnerWhite,
            GameState::WinnerBlack,
            GameState::Draw,
            GameState::WhiteInCheck,
            GameState::BlackInCheck,
            GameState::Invalid,
        ] {
            assert_eq!(GameState::from_code(state.code()), state);
        }
        assert_eq!(GameState::from_code(42), GameState::Invalid);
        assert!(GameState::Draw.is_terminal());
        assert!(!GameState::WhiteInCheck.is_terminal());
    }

    #[test]
    fn test_shakmaty_square_conversion() {
        let sq = shakmaty::Square::E4;
        assert_eq!(from_shakmaty_square(sq), Square::parse("e4").unwrap());
        assert_eq!(to_shakmaty_square(Square::new(28)), Some(sq));
    }
}
