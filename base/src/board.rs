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

//! State representation of positions.
//!
//! A board holds only the two disc sets. The side to move is implicit: the
//! `player` bitboard always belongs to the side to move, so making a move or
//! passing swaps the two sets. Colors exist only at the I/O boundary.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::{
    bits::crc32c_u64,
    movegen::{board_is_game_over, can_move, flip, get_moves},
    Bitboard, Color, Square,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// A representation of a position: the discs of the side to move and the
/// discs of its opponent.
///
/// Invariant: `player & opponent` is empty.
pub struct Board {
    /// The discs of the side to move.
    pub player: Bitboard,
    /// The discs of the side waiting.
    pub opponent: Bitboard,
}

impl Board {
    #[must_use]
    /// Construct a `Board` from the standard Reversi starting position, with
    /// Black (the first player) to move.
    pub const fn new() -> Board {
        Board {
            player: Bitboard::new(0x0000_0008_1000_0000),   // E4, D5
            opponent: Bitboard::new(0x0000_0010_0800_0000), // D4, E5
        }
    }

    #[must_use]
    /// Apply a move whose flip set has already been computed.
    /// The returned board is seen from the new side to move.
    ///
    /// `flipped` must be exactly `flip(sq, self.player, self.opponent)` and
    /// must be non-empty.
    pub fn make_move(self, sq: Square, flipped: Bitboard) -> Board {
        debug_assert!(!(self.player | self.opponent).contains(sq));
        debug_assert_eq!(flipped & !self.opponent, Bitboard::EMPTY);
        Board {
            player: self.opponent ^ flipped,
            opponent: self.player ^ flipped ^ sq.bitboard(),
        }
    }

    #[must_use]
    /// Compute the flip set for `sq` and apply it. Returns `None` if the move
    /// is illegal.
    pub fn after(self, sq: Square) -> Option<Board> {
        let flipped = flip(sq, self.player, self.opponent);
        if flipped.is_empty() {
            None
        } else {
            Some(self.make_move(sq, flipped))
        }
    }

    #[must_use]
    /// Pass: hand the move to the opponent without playing.
    pub const fn pass(self) -> Board {
        Board {
            player: self.opponent,
            opponent: self.player,
        }
    }

    #[must_use]
    /// Get the set of legal moves for the side to move.
    pub fn moves(self) -> Bitboard {
        get_moves(self.player, self.opponent)
    }

    #[must_use]
    /// Determine whether the side to move has a legal move.
    pub fn can_move(self) -> bool {
        can_move(self.player, self.opponent)
    }

    #[must_use]
    /// Determine whether neither side has a legal move.
    pub fn is_game_over(self) -> bool {
        board_is_game_over(self.player, self.opponent)
    }

    #[must_use]
    /// Get the set of empty squares.
    pub fn empties(self) -> Bitboard {
        !(self.player | self.opponent)
    }

    #[must_use]
    /// Count the empty squares.
    pub fn n_empties(self) -> u32 {
        self.empties().len() as u32
    }

    #[must_use]
    /// Compute the exact final score of a finished game, in discs, from the
    /// perspective of the side to move. Remaining empty squares are awarded
    /// to the winner; a draw scores zero.
    pub fn final_score(self) -> i32 {
        let p = self.player.len() as i32;
        let o = self.opponent.len() as i32;
        let mut score = p - o;
        if score < 0 {
            score -= 64 - p - o;
        } else if score > 0 {
            score += 64 - p - o;
        }
        score
    }

    #[must_use]
    /// Compute the hash code of this position: two CRC-32C halves, each
    /// accumulated over both disc words, concatenated into 64 bits. The value
    /// is stable across processes and runs.
    ///
    /// Equal boards always hash equally; the converse does not hold, so the
    /// hash is never used as sole proof of identity.
    pub fn hash(self) -> u64 {
        let p = self.player.as_u64();
        let o = self.opponent.as_u64();
        let lo = crc32c_u64(crc32c_u64(!0, p), o);
        let hi = crc32c_u64(crc32c_u64(0, o), p);
        (u64::from(hi) << 32) | u64::from(lo)
    }

    #[must_use]
    /// Apply one of the eight dihedral board symmetries to both disc sets.
    pub const fn symmetry(self, sym: u8) -> Board {
        Board {
            player: self.player.symmetry(sym),
            opponent: self.opponent.symmetry(sym),
        }
    }

    #[must_use]
    /// Canonicalize this board under the eight board symmetries: return the
    /// lexicographically smallest image (compared as the pair
    /// `(player, opponent)`) together with the symmetry index producing it.
    pub fn unique(self) -> (Board, u8) {
        let mut best = self;
        let mut best_sym = 0;
        let mut sym = 1;
        while sym < 8 {
            let image = self.symmetry(sym);
            if (image.player, image.opponent) < (best.player, best.opponent) {
                best = image;
                best_sym = sym;
            }
            sym += 1;
        }
        (best, best_sym)
    }

    #[must_use]
    /// Render this board as a 65-character board string: 64 square characters
    /// from A1 in row-major order, then the character of `turn`, the color of
    /// the side to move.
    pub fn to_board_string(self, turn: Color) -> String {
        let (black, white) = match turn {
            Color::Black => (self.player, self.opponent),
            Color::White => (self.opponent, self.player),
        };
        let mut s = String::with_capacity(66);
        for i in 0..64 {
            let sq = Square::from_index(i);
            s.push(if black.contains(sq) {
                'X'
            } else if white.contains(sq) {
                'O'
            } else {
                '-'
            });
        }
        s.push(' ');
        s.push(turn.to_char());
        s
    }

    /// Parse a 65-character board string (whitespace ignored): 64 square
    /// characters from A1 in row-major order, then the side to move. Returns
    /// the board seen from the side to move, along with its color.
    pub fn from_board_string(s: &str) -> Result<(Board, Color), ParseBoardError> {
        let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() != 65 {
            return Err(ParseBoardError::BadLength);
        }
        let mut black = Bitboard::EMPTY;
        let mut white = Bitboard::EMPTY;
        for (i, &c) in chars[..64].iter().enumerate() {
            let sq = Square::from_index(i as u8);
            match Color::from_char(c) {
                Some(Color::Black) => black.insert(sq),
                Some(Color::White) => white.insert(sq),
                None if c == '-' || c == '.' => (),
                None => return Err(ParseBoardError::BadChar(c)),
            }
        }
        let turn = Color::from_char(chars[64]).ok_or(ParseBoardError::BadTurn)?;
        Ok((Board::from_colors(black, white, turn), turn))
    }

    /// Parse a FEN-like position: eight rank fields from rank 8 down to rank
    /// 1, separated by `/`, with digit runs of empty squares, followed by the
    /// side to move (`b` or `w`, `X` or `O` also accepted).
    pub fn from_fen(s: &str) -> Result<(Board, Color), ParseBoardError> {
        let mut fields = s.split_whitespace();
        let ranks = fields.next().ok_or(ParseBoardError::BadLength)?;
        let turn_field = fields.next().ok_or(ParseBoardError::BadTurn)?;

        let mut black = Bitboard::EMPTY;
        let mut white = Bitboard::EMPTY;
        let mut rank = 7i32;
        for rank_str in ranks.split('/') {
            if rank < 0 {
                return Err(ParseBoardError::BadLength);
            }
            let mut file = 0i32;
            for c in rank_str.chars() {
                if let Some(d) = c.to_digit(10) {
                    file += d as i32;
                    continue;
                }
                if file >= 8 {
                    return Err(ParseBoardError::BadLength);
                }
                let sq = Square::from_index((rank * 8 + file) as u8);
                match Color::from_char(c) {
                    Some(Color::Black) => black.insert(sq),
                    Some(Color::White) => white.insert(sq),
                    None => return Err(ParseBoardError::BadChar(c)),
                }
                file += 1;
            }
            if file != 8 {
                return Err(ParseBoardError::BadLength);
            }
            rank -= 1;
        }
        if rank != -1 {
            return Err(ParseBoardError::BadLength);
        }

        let turn = match turn_field {
            "b" => Color::Black,
            "w" => Color::White,
            other => {
                let mut chars = other.chars();
                match (chars.next().and_then(Color::from_char), chars.next()) {
                    (Some(color), None) => color,
                    _ => return Err(ParseBoardError::BadTurn),
                }
            }
        };
        Ok((Board::from_colors(black, white, turn), turn))
    }

    /// Assemble a board from per-color disc sets and the side to move.
    fn from_colors(black: Bitboard, white: Bitboard, turn: Color) -> Board {
        match turn {
            Color::Black => Board {
                player: black,
                opponent: white,
            },
            Color::White => Board {
                player: white,
                opponent: black,
            },
        }
    }
}

impl Default for Board {
    fn default() -> Board {
        Board::new()
    }
}

impl FromStr for Board {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<Board, ParseBoardError> {
        Board::from_board_string(s).map(|(board, _)| board)
    }
}

impl Display for Board {
    /// Render the board as a grid, with the side to move printed as `X`, the
    /// opponent as `O` and legal moves marked with `.`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let moves = self.moves();
        writeln!(f, "  A B C D E F G H")?;
        for rank in 0..8 {
            write!(f, "{}", rank + 1)?;
            for file in 0..8 {
                let sq = Square::from_index(rank * 8 + file);
                let c = if self.player.contains(sq) {
                    'X'
                } else if self.opponent.contains(sq) {
                    'O'
                } else if moves.contains(sq) {
                    '.'
                } else {
                    '-'
                };
                write!(f, " {c}")?;
            }
            writeln!(f, " {}", rank + 1)?;
        }
        write!(f, "  A B C D E F G H")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The error returned when a board fails to parse.
pub enum ParseBoardError {
    /// The input did not have the required shape.
    BadLength,
    /// An unrecognized square character was found.
    BadChar(char),
    /// The side-to-move character was missing or unrecognized.
    BadTurn,
}

impl Display for ParseBoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseBoardError::BadLength => write!(f, "board string has the wrong shape"),
            ParseBoardError::BadChar(c) => write!(f, "unrecognized square character {c:?}"),
            ParseBoardError::BadTurn => write!(f, "missing or unrecognized side to move"),
        }
    }
}

impl std::error::Error for ParseBoardError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position() {
        let board = Board::new();
        assert!(board.player.contains(Square::E4));
        assert!(board.player.contains(Square::D5));
        assert!(board.opponent.contains(Square::D4));
        assert!(board.opponent.contains(Square::E5));
        assert_eq!(board.n_empties(), 60);
        assert!((board.player & board.opponent).is_empty());
    }

    #[test]
    fn make_move_applies_flips() {
        let board = Board::new();
        let next = board.after(Square::C4).unwrap();
        // C4 flips D4; the new side to move is the old opponent minus D4.
        assert!(next.opponent.contains(Square::C4));
        assert!(next.opponent.contains(Square::D4));
        assert!((next.player & next.opponent).is_empty());
        assert_eq!(next.n_empties(), 59);
    }

    #[test]
    fn after_rejects_illegal_moves() {
        let board = Board::new();
        assert!(board.after(Square::A1).is_none());
        assert!(board.after(Square::D4).is_none());
    }

    #[test]
    fn pass_swaps_sides() {
        let board = Board::new();
        let passed = board.pass();
        assert_eq!(passed.player, board.opponent);
        assert_eq!(passed.opponent, board.player);
        assert_eq!(passed.pass(), board);
    }

    #[test]
    fn full_board_is_game_over() {
        let s = "X".repeat(64) + " X";
        let board: Board = s.parse().unwrap();
        assert!(board.is_game_over());
        assert_eq!(board.final_score(), 64);
    }

    #[test]
    fn final_score_awards_empties_to_winner() {
        // 4 player discs, 2 opponent discs, 58 empties: 2 + 58 = 60.
        let board = Board {
            player: Bitboard::new(0x0F),
            opponent: Bitboard::new(0x30),
        };
        assert_eq!(board.final_score(), 60);
        assert_eq!(board.pass().final_score(), -60);
        // a draw stays a draw
        let board = Board {
            player: Bitboard::new(0x0F),
            opponent: Bitboard::new(0xF0),
        };
        assert_eq!(board.final_score(), 0);
    }

    #[test]
    fn board_string_roundtrip() {
        let board = Board::new();
        let s = board.to_board_string(Color::Black);
        let (parsed, turn) = Board::from_board_string(&s).unwrap();
        assert_eq!(parsed, board);
        assert_eq!(turn, Color::Black);

        // white to move: player/opponent swap
        let s = board.to_board_string(Color::White);
        let (parsed, turn) = Board::from_board_string(&s).unwrap();
        assert_eq!(turn, Color::White);
        assert_eq!(parsed.player, board.player);
    }

    #[test]
    fn board_string_rejects_garbage() {
        assert!("XX".parse::<Board>().is_err());
        let bad = "Z".repeat(64) + " X";
        assert!(bad.parse::<Board>().is_err());
        let no_turn = "-".repeat(65);
        assert!(no_turn.parse::<Board>().is_err());
    }

    #[test]
    fn fen_parses_initial_position() {
        let (board, turn) = Board::from_fen("8/8/8/3xO3/3Ox3/8/8/8 b").unwrap();
        assert_eq!(board, Board::new());
        assert_eq!(turn, Color::Black);
        assert!(Board::from_fen("8/8/8/8 b").is_err());
        assert!(Board::from_fen("8/8/8/3xO3/3Ox3/8/8/8 q").is_err());
    }

    #[test]
    fn hash_is_stable_and_position_sensitive() {
        let board = Board::new();
        assert_eq!(board.hash(), board.hash());
        let copy: Board = board.to_board_string(Color::Black).parse().unwrap();
        assert_eq!(copy.hash(), board.hash());
        assert_ne!(board.hash(), board.pass().hash());
        assert_ne!(board.hash(), board.after(Square::C4).unwrap().hash());
    }

    #[test]
    fn unique_is_minimal_and_idempotent() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut board = Board::new();
        for _ in 0..30 {
            let (canonical, sym) = board.unique();
            assert_eq!(board.symmetry(sym), canonical);
            // canonical is no larger than any image, including the original
            for s in 0..8 {
                let image = board.symmetry(s);
                assert!((canonical.player, canonical.opponent) <= (image.player, image.opponent));
                // canonicalizing any image gives the same canonical board
                assert_eq!(image.unique().0, canonical);
            }

            let moves: Vec<Square> = board.moves().collect();
            if moves.is_empty() {
                if !board.pass().can_move() {
                    break;
                }
                board = board.pass();
                continue;
            }
            board = board.after(moves[rng.usize(..moves.len())]).unwrap();
        }
    }
}
