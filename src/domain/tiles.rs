//! Tile highlight state for the 64 board squares.

use std::collections::BTreeMap;

use crate::domain::chess::Square;
use crate::domain::moves::{Move, PackedMove};

/// Highlight of a single square
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum TileState {
    #[default]
    None,
    /// Destination of the selected piece. Holds at least one move and all
    /// held moves land on this square; several moves means a promotion choice.
    PossibleMove(Vec<Move>),
    Selected,
    Moved,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tile {
    pub square: Square,
    pub state: TileState,
}

/// The highlight state of the whole board
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TileBoard {
    tiles: Vec<Tile>,
    /// Origin and destination of the highlighted last move
    last_move: Option<(Square, Square)>,
}

impl TileBoard {
    pub fn new() -> Self {
        Self {
            tiles: Square::all()
                .map(|square| Tile {
                    square,
                    state: TileState::None,
                })
                .collect(),
            last_move: None,
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn get(&self, square: Square) -> Option<&Tile> {
        self.tiles.get(usize::from(square.index()))
    }

    fn set(&mut self, square: Square, state: TileState) {
        if let Some(tile) = self.tiles.get_mut(usize::from(square.index())) {
            tile.state = state;
        }
    }

    /// Full re-render: every tile `None` except the squares of `last_move`
    pub fn show_last_move(&mut self, last_move: Option<&Move>) {
        self.last_move = last_move.map(|m| (m.from(), m.to()));
        let last = self.last_move;
        for tile in &mut self.tiles {
            tile.state = resting_state(last, tile.square);
        }
    }

    /// Partial re-render for a piece selection.
    ///
    /// The origin becomes `Selected` when it has destinations, each
    /// destination becomes `PossibleMove` with every move landing there, and
    /// stale `Selected`/`PossibleMove` tiles fall back to `None` (or `Moved`
    /// on the last move's squares). Tiles in any other state are left alone.
    pub fn select(&mut self, origin: Square, moves: &[Move]) {
        let mut destinations: BTreeMap<Square, Vec<Move>> = BTreeMap::new();
        for m in moves
            .iter()
            .filter(|m| m.from() == origin && m.to().is_on_board())
        {
            destinations.entry(m.to()).or_default().push(*m);
        }

        let last = self.last_move;
        for tile in &mut self.tiles {
            let keep = (tile.square == origin && !destinations.is_empty())
                || destinations.contains_key(&tile.square);
            if !keep && matches!(tile.state, TileState::Selected | TileState::PossibleMove(_)) {
                tile.state = resting_state(last, tile.square);
            }
        }

        if destinations.is_empty() {
            return;
        }
        self.set(origin, TileState::Selected);
        for (square, landing) in destinations {
            self.set(square, TileState::PossibleMove(landing));
        }
    }

    /// Drop the current selection, leaving `Moved` tiles in place
    pub fn clear_selection(&mut self) {
        let last = self.last_move;
        for tile in &mut self.tiles {
            if matches!(tile.state, TileState::Selected | TileState::PossibleMove(_)) {
                tile.state = resting_state(last, tile.square);
            }
        }
    }

    /// The selected square, if any
    pub fn selected(&self) -> Option<Square> {
        self.tiles
            .iter()
            .find(|tile| tile.state == TileState::Selected)
            .map(|tile| tile.square)
    }

    /// Moves offered on a destination tile (empty if none)
    pub fn moves_to(&self, square: Square) -> &[Move] {
        match self.get(square).map(|tile| &tile.state) {
            Some(TileState::PossibleMove(moves)) => moves,
            _ => &[],
        }
    }

    /// Look up a packed move among every offered destination
    pub fn offered(&self, packed: PackedMove) -> Option<Move> {
        self.tiles.iter().find_map(|tile| match &tile.state {
            TileState::PossibleMove(moves) => moves.iter().find(|m| m.packed() == packed).copied(),
            _ => None,
        })
    }
}

/// State of a tile with nothing selected
fn resting_state(last_move: Option<(Square, Square)>, square: Square) -> TileState {
    match last_move {
        Some((from, to)) if square == from || square == to => TileState::Moved,
        _ => TileState::None,
    }
}

impl Default for TileBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chess::PieceType;

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    fn count(board: &TileBoard, pred: impl Fn(&TileState) -> bool) -> usize {
        board.tiles().iter().filter(|t| pred(&t.state)).count()
    }

    #[test]
    fn test_last_move_marks_two_tiles() {
        let mut board = TileBoard::new();
        let m = Move::double_pawn_push(sq("e2"), sq("e4")).unwrap();
        board.show_last_move(Some(&m));
        assert_eq!(board.get(sq("e2")).unwrap().state, TileState::Moved);
        assert_eq!(board.get(sq("e4")).unwrap().state, TileState::Moved);
        assert_eq!(count(&board, |s| *s == TileState::Moved), 2);

        board.show_last_move(None);
        assert_eq!(count(&board, |s| *s == TileState::None), 64);
    }

    #[test]
    fn test_select_groups_promotions_on_one_tile() {
        let mut board = TileBoard::new();
        let promotions: Vec<Move> = [PieceType::Queen, PieceType::Rook, PieceType::Bishop, PieceType::Knight]
            .into_iter()
            .map(|p| Move::promotion(sq("a7"), sq("a8"), p, PieceType::None).unwrap())
            .collect();
        board.select(sq("a7"), &promotions);

        assert_eq!(board.selected(), Some(sq("a7")));
        assert_eq!(board.moves_to(sq("a8")).len(), 4);
        assert_eq!(count(&board, |s| matches!(s, TileState::PossibleMove(_))), 1);
    }

    #[test]
    fn test_reselect_is_partial() {
        let mut board = TileBoard::new();
        let last = Move::quiet(sq("g8"), sq("f6"), PieceType::Knight).unwrap();
        board.show_last_move(Some(&last));

        let pawn = [
            Move::quiet(sq("e2"), sq("e3"), PieceType::Pawn).unwrap(),
            Move::double_pawn_push(sq("e2"), sq("e4")).unwrap(),
        ];
        board.select(sq("e2"), &pawn);
        let knight = [Move::quiet(sq("g1"), sq("f3"), PieceType::Knight).unwrap()];
        board.select(sq("g1"), &knight);

        assert_eq!(board.get(sq("e2")).unwrap().state, TileState::None);
        assert_eq!(board.get(sq("e3")).unwrap().state, TileState::None);
        assert_eq!(board.get(sq("e4")).unwrap().state, TileState::None);
        assert_eq!(board.get(sq("g1")).unwrap().state, TileState::Selected);
        assert_eq!(board.moves_to(sq("f3")), &knight);
        // the previous move highlight is untouched
        assert_eq!(board.get(sq("g8")).unwrap().state, TileState::Moved);
        assert_eq!(board.get(sq("f6")).unwrap().state, TileState::Moved);
        assert_eq!(count(&board, |s| *s == TileState::Selected), 1);
    }

    #[test]
    fn test_select_without_moves_clears_selection() {
        let mut board = TileBoard::new();
        let knight = [Move::quiet(sq("g1"), sq("f3"), PieceType::Knight).unwrap()];
        board.select(sq("g1"), &knight);
        board.select(sq("a1"), &[]);

        assert_eq!(board.selected(), None);
        assert_eq!(count(&board, |s| *s == TileState::None), 64);
    }

    #[test]
    fn test_deselect_restores_last_move() {
        let mut board = TileBoard::new();
        let last = Move::double_pawn_push(sq("d7"), sq("d5")).unwrap();
        board.show_last_move(Some(&last));

        let capture = Move::capture(sq("e4"), sq("d5"), PieceType::Pawn, PieceType::Pawn).unwrap();
        board.select(sq("e4"), &[capture]);
        assert_eq!(board.moves_to(sq("d5")), &[capture]);

        board.clear_selection();
        assert_eq!(board.get(sq("d5")).unwrap().state, TileState::Moved);
        assert_eq!(board.get(sq("d7")).unwrap().state, TileState::Moved);
        assert_eq!(board.get(sq("e4")).unwrap().state, TileState::None);

        board.select(sq("e4"), &[capture]);
        let knight = [Move::quiet(sq("g1"), sq("f3"), PieceType::Knight).unwrap()];
        board.select(sq("g1"), &knight);
        assert_eq!(board.get(sq("d5")).unwrap().state, TileState::Moved);
    }

    #[test]
    fn test_offered_lookup() {
        let mut board = TileBoard::new();
        let m = Move::double_pawn_push(sq("d2"), sq("d4")).unwrap();
        board.select(sq("d2"), &[m]);
        assert_eq!(board.offered(m.packed()), Some(m));
        board.clear_selection();
        assert_eq!(board.offered(m.packed()), None);
    }
}
