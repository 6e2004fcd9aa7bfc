//! Packed move codec.
//!
//! A move travels between the session, the engine and the save file as a
//! single integer. The record form (`Move`) is what the rest of the crate
//! works with. Layout, low bit first:
//!
//! ```text
//! bits  0..6   from square
//! bits  6..12  to square
//! bits 12..15  moving piece type
//! bits 15..18  captured piece type
//! bits 18..21  promoted piece type
//! bits 21..27  flags (capture, promotion, O-O, O-O-O, double push, en passant)
//! ```
//!
//! The layout is part of the save format; changing it needs a new save
//! format version.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::domain::chess::{PieceType, Square, from_shakmaty_square, role_to_piece_type};
use crate::error::CodecError;

/// A packed move as stored on the wire and on disk
pub type PackedMove = u32;

const SQUARE_MASK: u32 = 0x3f;
const PIECE_MASK: u32 = 0x7;
const FLAGS_MASK: u32 = 0x3f;

const FROM_SHIFT: u32 = 0;
const TO_SHIFT: u32 = 6;
const PIECE_SHIFT: u32 = 12;
const CAPTURED_SHIFT: u32 = 15;
const PROMOTED_SHIFT: u32 = 18;
const FLAGS_SHIFT: u32 = 21;
const USED_BITS: u32 = 27;

/// Special-move flag set, one bit per flag
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MoveFlags(u8);

impl MoveFlags {
    pub const NONE: MoveFlags = MoveFlags(0);
    pub const CAPTURE: MoveFlags = MoveFlags(1 << 0);
    pub const PROMOTION: MoveFlags = MoveFlags(1 << 1);
    pub const KSIDE_CASTLE: MoveFlags = MoveFlags(1 << 2);
    pub const QSIDE_CASTLE: MoveFlags = MoveFlags(1 << 3);
    pub const DOUBLE_PAWN_PUSH: MoveFlags = MoveFlags(1 << 4);
    pub const EN_PASSANT: MoveFlags = MoveFlags(1 << 5);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Accepts only the six defined bits
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits as u32 & !FLAGS_MASK == 0 {
            Some(MoveFlags(bits))
        } else {
            None
        }
    }

    pub const fn contains(self, other: MoveFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_castle(self) -> bool {
        self.0 & (Self::KSIDE_CASTLE.0 | Self::QSIDE_CASTLE.0) != 0
    }
}

impl BitOr for MoveFlags {
    type Output = MoveFlags;

    fn bitor(self, rhs: MoveFlags) -> MoveFlags {
        MoveFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for MoveFlags {
    fn bitor_assign(&mut self, rhs: MoveFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MoveFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(MoveFlags, &str); 6] = [
            (MoveFlags::CAPTURE, "CAPTURE"),
            (MoveFlags::PROMOTION, "PROMOTION"),
            (MoveFlags::KSIDE_CASTLE, "KSIDE_CASTLE"),
            (MoveFlags::QSIDE_CASTLE, "QSIDE_CASTLE"),
            (MoveFlags::DOUBLE_PAWN_PUSH, "DOUBLE_PAWN_PUSH"),
            (MoveFlags::EN_PASSANT, "EN_PASSANT"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "MoveFlags({})", set.join(" | "))
    }
}

/// The unvalidated field record of a move
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct MoveFields {
    pub from: Square,
    pub to: Square,
    pub piece_type: PieceType,
    pub captured_piece_type: PieceType,
    pub promoted_piece_type: PieceType,
    pub flags: MoveFlags,
}

impl MoveFields {
    /// Check the field combination could come from a legal move
    pub fn validate(&self) -> Result<(), CodecError> {
        for square in [self.from, self.to] {
            if !square.is_on_board() {
                return Err(CodecError::SquareOffBoard(square.index()));
            }
        }
        if self.piece_type == PieceType::None {
            return Err(CodecError::InconsistentFlags("no moving piece"));
        }

        let flags = self.flags;
        let capture = flags.contains(MoveFlags::CAPTURE);
        let promotion = flags.contains(MoveFlags::PROMOTION);

        if flags.contains(MoveFlags::KSIDE_CASTLE) && flags.contains(MoveFlags::QSIDE_CASTLE) {
            return Err(CodecError::InconsistentFlags("castles on both sides"));
        }
        if flags.is_castle() {
            if capture || promotion {
                return Err(CodecError::InconsistentFlags("castle with capture or promotion"));
            }
            if self.piece_type != PieceType::King {
                return Err(CodecError::InconsistentFlags("castle without the king"));
            }
        }
        if capture != (self.captured_piece_type != PieceType::None) {
            return Err(CodecError::InconsistentFlags("capture flag and captured piece disagree"));
        }
        if self.captured_piece_type == PieceType::King {
            return Err(CodecError::InconsistentFlags("king captured"));
        }
        if promotion {
            if !self.promoted_piece_type.is_promotion_target() {
                return Err(CodecError::InconsistentFlags("promotion to a non-promotable piece"));
            }
            if self.piece_type != PieceType::Pawn {
                return Err(CodecError::InconsistentFlags("promotion of a non-pawn"));
            }
        } else if self.promoted_piece_type != PieceType::None {
            return Err(CodecError::InconsistentFlags("promoted piece without promotion flag"));
        }
        if flags.contains(MoveFlags::EN_PASSANT)
            && !(capture
                && self.piece_type == PieceType::Pawn
                && self.captured_piece_type == PieceType::Pawn)
        {
            return Err(CodecError::InconsistentFlags("en passant must be a pawn takes pawn"));
        }
        if flags.contains(MoveFlags::DOUBLE_PAWN_PUSH) && (capture || self.piece_type != PieceType::Pawn)
        {
            return Err(CodecError::InconsistentFlags("double push must be a quiet pawn move"));
        }
        Ok(())
    }
}

/// Pack validated move fields into a single integer
pub fn encode(fields: &MoveFields) -> Result<PackedMove, CodecError> {
    fields.validate()?;
    Ok((u32::from(fields.from.index()) << FROM_SHIFT)
        | (u32::from(fields.to.index()) << TO_SHIFT)
        | (u32::from(fields.piece_type.code()) << PIECE_SHIFT)
        | (u32::from(fields.captured_piece_type.code()) << CAPTURED_SHIFT)
        | (u32::from(fields.promoted_piece_type.code()) << PROMOTED_SHIFT)
        | (u32::from(fields.flags.bits()) << FLAGS_SHIFT))
}

/// Exact inverse of [`encode`]; rejects anything `encode` cannot produce
pub fn decode(packed: PackedMove) -> Result<MoveFields, CodecError> {
    if packed >> USED_BITS != 0 {
        return Err(CodecError::StrayBits(packed));
    }
    let piece = |shift: u32| {
        let code = ((packed >> shift) & PIECE_MASK) as u8;
        PieceType::from_code(code).ok_or(CodecError::UnknownPieceType(code))
    };
    let fields = MoveFields {
        from: Square::new(((packed >> FROM_SHIFT) & SQUARE_MASK) as u8),
        to: Square::new(((packed >> TO_SHIFT) & SQUARE_MASK) as u8),
        piece_type: piece(PIECE_SHIFT)?,
        captured_piece_type: piece(CAPTURED_SHIFT)?,
        promoted_piece_type: piece(PROMOTED_SHIFT)?,
        flags: MoveFlags(((packed >> FLAGS_SHIFT) & FLAGS_MASK) as u8),
    };
    fields.validate()?;
    Ok(fields)
}

/// A validated move; only consistent field combinations can be constructed
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    fields: MoveFields,
    packed: PackedMove,
}

impl Move {
    pub fn try_from_fields(fields: MoveFields) -> Result<Self, CodecError> {
        let packed = encode(&fields)?;
        Ok(Self { fields, packed })
    }

    pub fn decode(packed: PackedMove) -> Result<Self, CodecError> {
        let fields = decode(packed)?;
        Ok(Self { fields, packed })
    }

    /// Parse the decimal text form used in save files
    pub fn parse_packed(text: &str) -> Result<Self, CodecError> {
        let packed = text
            .trim()
            .parse::<PackedMove>()
            .map_err(|_| CodecError::MalformedText(text.to_string()))?;
        Self::decode(packed)
    }

    pub fn quiet(from: Square, to: Square, piece_type: PieceType) -> Result<Self, CodecError> {
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type,
            ..MoveFields::default()
        })
    }

    pub fn capture(
        from: Square,
        to: Square,
        piece_type: PieceType,
        captured: PieceType,
    ) -> Result<Self, CodecError> {
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type,
            captured_piece_type: captured,
            flags: MoveFlags::CAPTURE,
            ..MoveFields::default()
        })
    }

    pub fn double_pawn_push(from: Square, to: Square) -> Result<Self, CodecError> {
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type: PieceType::Pawn,
            flags: MoveFlags::DOUBLE_PAWN_PUSH,
            ..MoveFields::default()
        })
    }

    pub fn en_passant(from: Square, to: Square) -> Result<Self, CodecError> {
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type: PieceType::Pawn,
            captured_piece_type: PieceType::Pawn,
            flags: MoveFlags::CAPTURE | MoveFlags::EN_PASSANT,
            ..MoveFields::default()
        })
    }

    /// Pawn promotion; pass `PieceType::None` as `captured` for a push
    pub fn promotion(
        from: Square,
        to: Square,
        promoted: PieceType,
        captured: PieceType,
    ) -> Result<Self, CodecError> {
        let mut flags = MoveFlags::PROMOTION;
        if captured != PieceType::None {
            flags |= MoveFlags::CAPTURE;
        }
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type: PieceType::Pawn,
            captured_piece_type: captured,
            promoted_piece_type: promoted,
            flags,
        })
    }

    /// King move of a castle; `to` is the king's destination square
    pub fn castle(from: Square, to: Square, kingside: bool) -> Result<Self, CodecError> {
        let flags = if kingside {
            MoveFlags::KSIDE_CASTLE
        } else {
            MoveFlags::QSIDE_CASTLE
        };
        Self::try_from_fields(MoveFields {
            from,
            to,
            piece_type: PieceType::King,
            flags,
            ..MoveFields::default()
        })
    }

    pub fn packed(&self) -> PackedMove {
        self.packed
    }

    pub fn fields(&self) -> MoveFields {
        self.fields
    }

    pub fn from(&self) -> Square {
        self.fields.from
    }

    pub fn to(&self) -> Square {
        self.fields.to
    }

    pub fn piece_type(&self) -> PieceType {
        self.fields.piece_type
    }

    pub fn captured_piece_type(&self) -> PieceType {
        self.fields.captured_piece_type
    }

    pub fn promoted_piece_type(&self) -> PieceType {
        self.fields.promoted_piece_type
    }

    pub fn flags(&self) -> MoveFlags {
        self.fields.flags
    }

    pub fn is_capture(&self) -> bool {
        self.fields.flags.contains(MoveFlags::CAPTURE)
    }

    pub fn is_promotion(&self) -> bool {
        self.fields.flags.contains(MoveFlags::PROMOTION)
    }

    /// Display text: `0-0`, `0-0-0`, `Nf3`, `xd5`, `exd6` (en passant), `e8=Q`.
    ///
    /// Display-only; it does not parse back into a move.
    pub fn to_algebraic_text(&self) -> String {
        let flags = self.fields.flags;
        if flags.contains(MoveFlags::KSIDE_CASTLE) {
            return "0-0".to_string();
        }
        if flags.contains(MoveFlags::QSIDE_CASTLE) {
            return "0-0-0".to_string();
        }

        let mut text = String::with_capacity(7);
        if let Some(letter) = self.fields.piece_type.letter() {
            text.push(letter);
        }
        if self.is_capture() {
            // only en passant names the file it left
            if flags.contains(MoveFlags::EN_PASSANT) {
                text.push(self.fields.from.file_char());
            }
            text.push('x');
        }
        text.push_str(&self.fields.to.to_string());
        if let (true, Some(letter)) = (self.is_promotion(), self.fields.promoted_piece_type.letter()) {
            text.push('=');
            text.push(letter);
        }
        text
    }

    /// Long algebraic (UCI) text such as `e2e4` or `e7e8q`
    pub fn to_uci(&self) -> String {
        let mut text = format!("{}{}", self.fields.from, self.fields.to);
        if let (true, Some(letter)) = (self.is_promotion(), self.fields.promoted_piece_type.letter()) {
            text.push(letter.to_ascii_lowercase());
        }
        text
    }
}

impl TryFrom<&shakmaty::Move> for Move {
    type Error = CodecError;

    /// Castles are expressed as the king's move to its destination square
    fn try_from(m: &shakmaty::Move) -> Result<Self, Self::Error> {
        match *m {
            shakmaty::Move::Normal {
                role,
                from,
                capture,
                to,
                promotion,
            } => {
                let from = from_shakmaty_square(from);
                let to = from_shakmaty_square(to);
                let piece_type = role_to_piece_type(role);
                let captured = capture.map(role_to_piece_type).unwrap_or(PieceType::None);
                if let Some(promoted) = promotion {
                    return Move::promotion(from, to, role_to_piece_type(promoted), captured);
                }
                if captured != PieceType::None {
                    return Move::capture(from, to, piece_type, captured);
                }
                if piece_type == PieceType::Pawn && from.rank().abs_diff(to.rank()) == 2 {
                    return Move::double_pawn_push(from, to);
                }
                Move::quiet(from, to, piece_type)
            }
            shakmaty::Move::EnPassant { from, to } => {
                Move::en_passant(from_shakmaty_square(from), from_shakmaty_square(to))
            }
            shakmaty::Move::Castle { king, rook } => {
                let king = from_shakmaty_square(king);
                let rook = from_shakmaty_square(rook);
                let kingside = rook.file() > king.file();
                let dest_file = if kingside { 6 } else { 2 };
                let to = Square::from_coords(dest_file, king.rank())
                    .ok_or(CodecError::SquareOffBoard(king.index()))?;
                Move::castle(king, to, kingside)
            }
            shakmaty::Move::Put { .. } => Err(CodecError::InconsistentFlags("drops are not chess moves")),
        }
    }
}

impl TryFrom<PackedMove> for Move {
    type Error = CodecError;

    fn try_from(packed: PackedMove) -> Result<Self, Self::Error> {
        Move::decode(packed)
    }
}

impl From<Move> for PackedMove {
    fn from(m: Move) -> Self {
        m.packed
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_algebraic_text())
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({} {:#x})", self.to_uci(), self.packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    #[test]
    fn test_decode_inverts_encode() {
        let m = Move::promotion(sq("b7"), sq("a8"), PieceType::Knight, PieceType::Rook).unwrap();
        let decoded = Move::decode(m.packed()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.promoted_piece_type(), PieceType::Knight);
        assert_eq!(decoded.captured_piece_type(), PieceType::Rook);
        assert!(decoded.flags().contains(MoveFlags::CAPTURE | MoveFlags::PROMOTION));
    }

    #[test]
    fn test_castle_with_capture_is_rejected() {
        let fields = MoveFields {
            from: sq("e1"),
            to: sq("g1"),
            piece_type: PieceType::King,
            captured_piece_type: PieceType::Rook,
            flags: MoveFlags::KSIDE_CASTLE | MoveFlags::CAPTURE,
            ..MoveFields::default()
        };
        assert!(matches!(encode(&fields), Err(CodecError::InconsistentFlags(_))));
        assert!(Move::try_from_fields(fields).is_err());
    }

    #[test]
    fn test_decode_rejects_hand_built_bad_integers() {
        // castle + capture bits, built without going through encode
        let packed = 4 | (6 << 6) | (6 << 12) | (4 << 15) | ((0b101) << 21);
        assert!(Move::decode(packed).is_err());
        // piece type code 7 does not exist
        assert_eq!(
            decode(7 << 12),
            Err(CodecError::UnknownPieceType(7))
        );
        assert_eq!(decode(1 << 30), Err(CodecError::StrayBits(1 << 30)));
    }

    #[test]
    fn test_promotion_requires_promotable_piece() {
        assert!(Move::promotion(sq("e7"), sq("e8"), PieceType::King, PieceType::None).is_err());
        assert!(Move::promotion(sq("e7"), sq("e8"), PieceType::Pawn, PieceType::None).is_err());
        assert!(Move::promotion(sq("e7"), sq("e8"), PieceType::Queen, PieceType::None).is_ok());
    }

    #[test]
    fn test_algebraic_text() {
        let cases = [
            (Move::double_pawn_push(sq("e2"), sq("e4")).unwrap(), "e4"),
            (Move::quiet(sq("g1"), sq("f3"), PieceType::Knight).unwrap(), "Nf3"),
            (Move::capture(sq("e4"), sq("d5"), PieceType::Pawn, PieceType::Pawn).unwrap(), "xd5"),
            (Move::capture(sq("f1"), sq("b5"), PieceType::Bishop, PieceType::Knight).unwrap(), "Bxb5"),
            (Move::en_passant(sq("e5"), sq("d6")).unwrap(), "exd6"),
            (Move::castle(sq("e1"), sq("g1"), true).unwrap(), "0-0"),
            (Move::castle(sq("e8"), sq("c8"), false).unwrap(), "0-0-0"),
            (Move::promotion(sq("e7"), sq("e8"), PieceType::Queen, PieceType::None).unwrap(), "e8=Q"),
            (Move::promotion(sq("b2"), sq("a1"), PieceType::Knight, PieceType::Rook).unwrap(), "xa1=N"),
            (Move::quiet(sq("e1"), sq("e2"), PieceType::King).unwrap(), "Ke2"),
        ];
        for (m, expected) in cases {
            assert_eq!(m.to_algebraic_text(), expected, "text for {:?}", m);
        }
    }

    #[test]
    fn test_uci_text() {
        assert_eq!(Move::double_pawn_push(sq("e2"), sq("e4")).unwrap().to_uci(), "e2e4");
        assert_eq!(
            Move::promotion(sq("a7"), sq("a8"), PieceType::Rook, PieceType::None)
                .unwrap()
                .to_uci(),
            "a7a8r"
        );
        assert_eq!(Move::castle(sq("e1"), sq("c1"), false).unwrap().to_uci(), "e1c1");
    }

    #[test]
    fn test_parse_packed_text() {
        let m = Move::double_pawn_push(sq("e2"), sq("e4")).unwrap();
        assert_eq!(Move::parse_packed(&format!(" {} ", m.packed())).unwrap(), m);
        assert!(matches!(
            Move::parse_packed("e2e4"),
            Err(CodecError::MalformedText(_))
        ));
    }

    #[test]
    fn test_from_shakmaty_moves() {
        use shakmaty::{Chess, Position};

        let pos = Chess::default();
        let converted: Vec<Move> = pos
            .legal_moves()
            .iter()
            .map(|m| Move::try_from(m).unwrap())
            .collect();
        assert_eq!(converted.len(), 20);
        let pushes = converted
            .iter()
            .filter(|m| m.flags().contains(MoveFlags::DOUBLE_PAWN_PUSH))
            .count();
        assert_eq!(pushes, 8);

        let castle = shakmaty::Move::Castle {
            king: shakmaty::Square::E1,
            rook: shakmaty::Square::A1,
        };
        let m = Move::try_from(&castle).unwrap();
        assert_eq!(m.to(), sq("c1"));
        assert_eq!(m.to_algebraic_text(), "0-0-0");
    }

    fn any_square() -> impl Strategy<Value = Square> {
        (0u8..64).prop_map(Square::new)
    }

    fn any_piece() -> impl Strategy<Value = PieceType> {
        (0u8..7).prop_map(|code| PieceType::from_code(code).unwrap())
    }

    proptest! {
        #[test]
        fn prop_valid_fields_round_trip(
            from in any_square(),
            to in any_square(),
            piece in any_piece(),
            captured in any_piece(),
            promoted in any_piece(),
            flag_bits in 0u8..64,
        ) {
            let fields = MoveFields {
                from,
                to,
                piece_type: piece,
                captured_piece_type: captured,
                promoted_piece_type: promoted,
                flags: MoveFlags::from_bits(flag_bits).unwrap(),
            };
            match encode(&fields) {
                Ok(packed) => prop_assert_eq!(decode(packed), Ok(fields)),
                Err(_) => prop_assert!(fields.validate().is_err()),
            }
        }

        #[test]
        fn prop_encoder_never_packs_castle_with_capture(
            fields_bits in 0u32..(1 << 27),
        ) {
            if let Ok(fields) = decode(fields_bits) {
                let flags = fields.flags;
                prop_assert!(!(flags.is_castle() && flags.contains(MoveFlags::CAPTURE)));
                prop_assert!(!(flags.is_castle() && flags.contains(MoveFlags::PROMOTION)));
            }
        }
    }
}
