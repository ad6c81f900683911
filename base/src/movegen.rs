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

//! Move generation and flip computation.
//!
//! A move is legal if and only if, along at least one of the eight ray
//! directions, the played square is followed by a run of one or more opponent
//! discs terminated by a player disc. Both [`get_moves`] and [`flip`] resolve
//! all rays with carry-propagating shifts along direction-masked lines, so a
//! single pass costs a handful of bitwise operations per direction pair.

use crate::{Bitboard, Square};

/// Opponent mask for horizontal rays: the A and H files can never be part of
/// a horizontal run.
const MASK_H: u64 = 0x7E7E_7E7E_7E7E_7E7E;
/// Opponent mask for vertical rays: ranks 1 and 8 can never be part of a
/// vertical run.
const MASK_V: u64 = 0x00FF_FFFF_FFFF_FF00;
/// Opponent mask for diagonal rays: the whole outer ring is excluded.
const MASK_D: u64 = 0x007E_7E7E_7E7E_7E00;

/// The shift distance and opponent mask of each of the four direction pairs:
/// east/west, north/south and the two diagonals.
const DIRECTIONS: [(u32, u64); 4] = [(1, MASK_H), (8, MASK_V), (7, MASK_D), (9, MASK_D)];

/// Resolve one direction pair: find every square reachable by walking from a
/// `player` disc over a run of masked opponent discs, one step past the end of
/// the run, in both orientations of the ray.
fn get_some_moves(player: u64, masked_opponent: u64, dir: u32) -> u64 {
    let mut flip = ((player << dir) | (player >> dir)) & masked_opponent;
    flip |= ((flip << dir) | (flip >> dir)) & masked_opponent;
    flip |= ((flip << dir) | (flip >> dir)) & masked_opponent;
    flip |= ((flip << dir) | (flip >> dir)) & masked_opponent;
    flip |= ((flip << dir) | (flip >> dir)) & masked_opponent;
    flip |= ((flip << dir) | (flip >> dir)) & masked_opponent;
    (flip << dir) | (flip >> dir)
}

#[must_use]
/// Compute the set of legal moves for the side to move.
pub fn get_moves(player: Bitboard, opponent: Bitboard) -> Bitboard {
    let p = player.as_u64();
    let o = opponent.as_u64();
    let empties = !(p | o);
    let mut moves = 0;
    for (dir, mask) in DIRECTIONS {
        moves |= get_some_moves(p, o & mask, dir);
    }
    Bitboard::new(moves & empties)
}

#[must_use]
/// Determine whether the side to move has at least one legal move.
pub fn can_move(player: Bitboard, opponent: Bitboard) -> bool {
    !get_moves(player, opponent).is_empty()
}

#[must_use]
/// Determine whether the game is over, i.e. neither side has a legal move.
pub fn board_is_game_over(player: Bitboard, opponent: Bitboard) -> bool {
    !can_move(player, opponent) && !can_move(opponent, player)
}

#[must_use]
/// Compute the set of discs flipped by playing on `sq`.
/// Returns the empty bitboard if and only if the move is illegal, or if `sq`
/// is `Square::Pass` or `Square::None`.
pub fn flip(sq: Square, player: Bitboard, opponent: Bitboard) -> Bitboard {
    let x = sq.bitboard().as_u64();
    if x == 0 || (x & (player.as_u64() | opponent.as_u64())) != 0 {
        return Bitboard::EMPTY;
    }
    let p = player.as_u64();
    let o = opponent.as_u64();
    let mut flipped = 0;
    for (dir, mask) in DIRECTIONS {
        let om = o & mask;

        // walk toward the most significant bit
        let mut f = (x << dir) & om;
        f |= (f << dir) & om;
        f |= (f << dir) & om;
        f |= (f << dir) & om;
        f |= (f << dir) & om;
        f |= (f << dir) & om;
        // the run only flips if the square past its end holds a player disc
        if (f << dir) & p != 0 {
            flipped |= f;
        }

        // walk toward the least significant bit
        let mut f = (x >> dir) & om;
        f |= (f >> dir) & om;
        f |= (f >> dir) & om;
        f |= (f >> dir) & om;
        f |= (f >> dir) & om;
        f |= (f >> dir) & om;
        if (f >> dir) & p != 0 {
            flipped |= f;
        }
    }
    Bitboard::new(flipped)
}

#[must_use]
/// Count the legal moves of the side to move.
pub fn get_mobility(player: Bitboard, opponent: Bitboard) -> u32 {
    get_moves(player, opponent).len() as u32
}

#[must_use]
/// Count the legal moves of the side to move, counting corner moves twice.
pub fn get_weighted_mobility(player: Bitboard, opponent: Bitboard) -> u32 {
    get_moves(player, opponent).corner_weighted_len()
}

/// Spread a disc set one step in both orientations of a ray.
fn get_some_potential_moves(o: u64, dir: u32) -> u64 {
    (o << dir) | (o >> dir)
}

#[must_use]
/// Count the empty squares adjacent to an opponent disc, counting corners
/// twice. These are the squares that may become legal moves later, a cheap
/// proxy for future mobility.
pub fn get_potential_mobility(player: Bitboard, opponent: Bitboard) -> u32 {
    let p = player.as_u64();
    let o = opponent.as_u64();
    let h = get_some_potential_moves(o & MASK_H, 1);
    let v = get_some_potential_moves(o & MASK_V, 8);
    let d7 = get_some_potential_moves(o & MASK_D, 7);
    let d9 = get_some_potential_moves(o & MASK_D, 9);
    Bitboard::new((h | v | d7 | d9) & !(p | o)).corner_weighted_len()
}

#[must_use]
/// Compute the legal moves on the central 6x6 board, used by the reduced-board
/// test modes. Discs outside the central region are ignored entirely.
pub fn get_moves_6x6(player: Bitboard, opponent: Bitboard) -> Bitboard {
    get_moves(player & Bitboard::CENTRAL_6X6, opponent & Bitboard::CENTRAL_6X6)
        & Bitboard::CENTRAL_6X6
}

#[must_use]
/// Determine whether the side to move has a legal move on the central 6x6
/// board.
pub fn can_move_6x6(player: Bitboard, opponent: Bitboard) -> bool {
    !get_moves_6x6(player, opponent).is_empty()
}

#[rustfmt::skip]
/// For each square, the set of squares from which a flip through it could be
/// supported. An empty square can only be a legal move if an opponent disc
/// sits on one of these; note that neighbors in directions that immediately
/// run off the board (such as the corner next to an edge square) are excluded,
/// since no outflank can terminate there.
pub const NEIGHBOUR: [Bitboard; 66] = [
    Bitboard::new(0x0000_0000_0000_0302), Bitboard::new(0x0000_0000_0000_0604),
    Bitboard::new(0x0000_0000_0000_0E0A), Bitboard::new(0x0000_0000_0000_1C14),
    Bitboard::new(0x0000_0000_0000_3828), Bitboard::new(0x0000_0000_0000_7050),
    Bitboard::new(0x0000_0000_0000_6020), Bitboard::new(0x0000_0000_0000_C040),
    Bitboard::new(0x0000_0000_0003_0200), Bitboard::new(0x0000_0000_0006_0400),
    Bitboard::new(0x0000_0000_000E_0A00), Bitboard::new(0x0000_0000_001C_1400),
    Bitboard::new(0x0000_0000_0038_2800), Bitboard::new(0x0000_0000_0070_5000),
    Bitboard::new(0x0000_0000_0060_2000), Bitboard::new(0x0000_0000_00C0_4000),
    Bitboard::new(0x0000_0000_0302_0300), Bitboard::new(0x0000_0000_0604_0600),
    Bitboard::new(0x0000_0000_0E0A_0E00), Bitboard::new(0x0000_0000_1C14_1C00),
    Bitboard::new(0x0000_0000_3828_3800), Bitboard::new(0x0000_0000_7050_7000),
    Bitboard::new(0x0000_0000_6020_6000), Bitboard::new(0x0000_0000_C040_C000),
    Bitboard::new(0x0000_0003_0203_0000), Bitboard::new(0x0000_0006_0406_0000),
    Bitboard::new(0x0000_000E_0A0E_0000), Bitboard::new(0x0000_001C_141C_0000),
    Bitboard::new(0x0000_0038_2838_0000), Bitboard::new(0x0000_0070_5070_0000),
    Bitboard::new(0x0000_0060_2060_0000), Bitboard::new(0x0000_00C0_40C0_0000),
    Bitboard::new(0x0000_0302_0300_0000), Bitboard::new(0x0000_0604_0600_0000),
    Bitboard::new(0x0000_0E0A_0E00_0000), Bitboard::new(0x0000_1C14_1C00_0000),
    Bitboard::new(0x0000_3828_3800_0000), Bitboard::new(0x0000_7050_7000_0000),
    Bitboard::new(0x0000_6020_6000_0000), Bitboard::new(0x0000_C040_C000_0000),
    Bitboard::new(0x0003_0203_0000_0000), Bitboard::new(0x0006_0406_0000_0000),
    Bitboard::new(0x000E_0A0E_0000_0000), Bitboard::new(0x001C_141C_0000_0000),
    Bitboard::new(0x0038_2838_0000_0000), Bitboard::new(0x0070_5070_0000_0000),
    Bitboard::new(0x0060_2060_0000_0000), Bitboard::new(0x00C0_40C0_0000_0000),
    Bitboard::new(0x0002_0300_0000_0000), Bitboard::new(0x0004_0600_0000_0000),
    Bitboard::new(0x000A_0E00_0000_0000), Bitboard::new(0x0014_1C00_0000_0000),
    Bitboard::new(0x0028_3800_0000_0000), Bitboard::new(0x0050_7000_0000_0000),
    Bitboard::new(0x0020_6000_0000_0000), Bitboard::new(0x0040_C000_0000_0000),
    Bitboard::new(0x0203_0000_0000_0000), Bitboard::new(0x0406_0000_0000_0000),
    Bitboard::new(0x0A0E_0000_0000_0000), Bitboard::new(0x141C_0000_0000_0000),
    Bitboard::new(0x2838_0000_0000_0000), Bitboard::new(0x5070_0000_0000_0000),
    Bitboard::new(0x2060_0000_0000_0000), Bitboard::new(0x40C0_0000_0000_0000),
    Bitboard::EMPTY, Bitboard::EMPTY,
];
