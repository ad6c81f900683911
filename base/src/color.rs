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

//! Disc colors.
//!
//! A [`Board`](crate::Board) itself is color-agnostic: it only knows the side
//! to move and its opponent. Colors appear at the I/O boundary, where boards
//! and moves are printed and parsed.

use std::{
    fmt::{Display, Formatter},
    ops::Not,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// The color of a disc. Black moves first in a game of Reversi.
pub enum Color {
    /// The black player, printed as `X`.
    Black,
    /// The white player, printed as `O`.
    White,
}

impl Color {
    #[must_use]
    /// Get the character conventionally used for discs of this color.
    pub const fn to_char(self) -> char {
        match self {
            Color::Black => 'X',
            Color::White => 'O',
        }
    }

    #[must_use]
    /// Parse a disc character. Accepts the common spellings of both colors.
    pub const fn from_char(c: char) -> Option<Color> {
        match c {
            'X' | 'x' | 'B' | 'b' | '*' => Some(Color::Black),
            'O' | 'o' | 'W' | 'w' => Some(Color::White),
            _ => None,
        }
    }
}

impl Not for Color {
    type Output = Color;

    fn not(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite() {
        assert_eq!(!Color::Black, Color::White);
        assert_eq!(!Color::White, Color::Black);
    }

    #[test]
    fn chars() {
        assert_eq!(Color::from_char('X'), Some(Color::Black));
        assert_eq!(Color::from_char('o'), Some(Color::White));
        assert_eq!(Color::from_char('-'), None);
        assert_eq!(Color::Black.to_string(), "X");
    }
}
