/*
  Reverie, a Reversi engine.
  Copyright (C) 2025 The Reverie Authors (see AUTHORS.md file)

  Reverie is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  Reverie is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The list of empty squares, used by the endgame search.
//!
//! Near the end of the game it is cheaper to walk the few remaining empty
//! squares than to generate moves from scratch. The list is doubly linked
//! over square indices, ordered by a fixed square-preference table so that
//! strong squares (corners first, the center last) are tried early, and it
//! records each square's parity quadrant for odd-empties-first ordering.

use crate::{Board, Square};

/// The sentinel index terminating the list on both ends.
const SENTINEL: usize = Square::None as usize;

#[rustfmt::skip]
/// Square indices in search-preference order: corners, then outer squares by
/// decreasing positional value, the X squares late and the four center
/// squares last.
const PRESORTED: [u8; 64] = [
     0,  7, 56, 63,             // corners
     2,  5, 16, 23, 40, 47, 58, 61,
    18, 21, 42, 45,
     3,  4, 24, 31, 32, 39, 59, 60,
    19, 20, 26, 29, 34, 37, 43, 44,
    11, 12, 25, 30, 33, 38, 51, 52,
    10, 13, 17, 22, 41, 46, 50, 53,
     1,  6,  8, 15, 48, 55, 57, 62,
     9, 14, 49, 54,             // X squares
    27, 28, 35, 36,             // center
];

#[derive(Clone, Debug)]
/// A doubly-linked list of the empty squares of a position.
pub struct EmptiesList {
    next: [u8; 66],
    prev: [u8; 66],
    n_empties: u32,
}

impl EmptiesList {
    #[must_use]
    /// Build the list of empty squares of `board`, in preference order.
    pub fn new(board: &Board) -> EmptiesList {
        let mut list = EmptiesList {
            next: [SENTINEL as u8; 66],
            prev: [SENTINEL as u8; 66],
            n_empties: 0,
        };
        let empties = board.empties();
        let mut tail = SENTINEL;
        for &i in &PRESORTED {
            if empties.contains(Square::from_index(i)) {
                list.next[tail] = i;
                list.prev[i as usize] = tail as u8;
                tail = i as usize;
                list.n_empties += 1;
            }
        }
        list.next[tail] = SENTINEL as u8;
        list.prev[SENTINEL] = tail as u8;
        list
    }

    #[must_use]
    /// Count the squares currently in the list.
    pub const fn len(&self) -> u32 {
        self.n_empties
    }

    #[must_use]
    /// Determine whether the list is empty.
    pub const fn is_empty(&self) -> bool {
        self.n_empties == 0
    }

    #[must_use]
    /// Get the first (most preferred) empty square, or `Square::None` when no
    /// empties remain.
    pub fn first(&self) -> Square {
        Square::from_index(self.next[SENTINEL])
    }

    /// Unlink `sq` from the list. The node keeps its link values, so the
    /// matching [`restore`](EmptiesList::restore) re-inserts it in place;
    /// removals must therefore be restored in LIFO order, which the search
    /// recursion guarantees.
    pub fn remove(&mut self, sq: Square) {
        let i = sq.index();
        let p = self.prev[i] as usize;
        let n = self.next[i] as usize;
        self.next[p] = n as u8;
        self.prev[n] = p as u8;
        self.n_empties -= 1;
    }

    /// Relink `sq` at its former position, undoing the matching
    /// [`remove`](EmptiesList::remove).
    pub fn restore(&mut self, sq: Square) {
        let i = sq.index();
        let p = self.prev[i] as usize;
        let n = self.next[i] as usize;
        self.next[p] = i as u8;
        self.prev[n] = i as u8;
        self.n_empties += 1;
    }

    #[must_use]
    /// Iterate over the empty squares in preference order.
    pub fn iter(&self) -> EmptiesIter<'_> {
        EmptiesIter {
            list: self,
            cursor: self.next[SENTINEL] as usize,
        }
    }

    #[must_use]
    /// Compute the 4-bit quadrant occupancy parity of the listed squares:
    /// bit q is set when quadrant q holds an odd number of empties.
    pub fn parity(&self) -> u8 {
        let mut parity = 0;
        for sq in self.iter() {
            parity ^= sq.quadrant_mask();
        }
        parity
    }
}

/// An iterator over the squares of an [`EmptiesList`].
pub struct EmptiesIter<'a> {
    list: &'a EmptiesList,
    cursor: usize,
}

impl Iterator for EmptiesIter<'_> {
    type Item = Square;

    fn next(&mut self) -> Option<Square> {
        if self.cursor == SENTINEL {
            return None;
        }
        let sq = Square::from_index(self.cursor as u8);
        self.cursor = self.list.next[self.cursor] as usize;
        Some(sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bitboard;

    #[test]
    fn presorted_is_a_permutation() {
        let mut seen = [false; 64];
        for &i in &PRESORTED {
            assert!(!seen[i as usize]);
            seen[i as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn initial_position_has_60_empties() {
        let list = EmptiesList::new(&Board::new());
        assert_eq!(list.len(), 60);
        assert_eq!(list.first(), Square::A1);
        assert_eq!(list.iter().count(), 60);
    }

    #[test]
    fn corners_come_first() {
        let list = EmptiesList::new(&Board::new());
        let head: Vec<Square> = list.iter().take(4).collect();
        assert_eq!(
            head,
            vec![Square::A1, Square::H1, Square::A8, Square::H8]
        );
    }

    #[test]
    fn remove_restore_roundtrip() {
        let mut list = EmptiesList::new(&Board::new());
        let before: Vec<Square> = list.iter().collect();

        list.remove(Square::A1);
        list.remove(Square::C4);
        assert_eq!(list.len(), 58);
        assert!(list.iter().all(|sq| sq != Square::A1 && sq != Square::C4));

        // LIFO restore order
        list.restore(Square::C4);
        list.restore(Square::A1);
        let after: Vec<Square> = list.iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn parity_tracks_quadrants() {
        let board = Board {
            player: Square::A1.bitboard(),
            opponent: Square::B1.bitboard(),
        };
        let mut list = EmptiesList::new(&board);
        // 62 empties: quadrant 0 lost two squares (even), so every quadrant
        // holds an even or odd count per its square total (16, 16, 16, 16).
        assert_eq!(list.parity(), 0);
        list.remove(Square::H8);
        assert_eq!(list.parity(), 0b1000);
        list.remove(Square::A8);
        assert_eq!(list.parity(), 0b1100);
        list.restore(Square::A8);
        assert_eq!(list.parity(), 0b1000);
    }

    #[test]
    fn matches_board_empties() {
        let (board, _) = Board::from_board_string(
            &("X".repeat(16) + &"-".repeat(16) + &"O".repeat(16) + &"-".repeat(16) + " X"),
        )
        .unwrap();
        let list = EmptiesList::new(&board);
        let mut from_list = Bitboard::EMPTY;
        for sq in list.iter() {
            from_list.insert(sq);
        }
        assert_eq!(from_list, board.empties());
        assert_eq!(list.len(), 32);
    }
}
