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

//! Position evaluation.
//!
//! The evaluator scores a position as a sum of pattern weights. Ten board
//! patterns are tracked: the four 3x3 corners, the four edges and the two
//! main diagonals. Each pattern's squares form a ternary number (one digit
//! per square: side to move, opponent, empty), and that number indexes a
//! stage-dependent weight table.
//!
//! The pattern indices are maintained incrementally: making a move adjusts
//! only the features touched by the played square and its flips, then swaps
//! the color perspective, so evaluation cost is proportional to the flip
//! count rather than the board size. Weights are opaque data loaded from a
//! file; without one, a positional-value synthesis keeps the engine playable.

use std::{
    fmt::{Display, Formatter},
    io,
    path::Path,
};

use once_cell::sync::Lazy;

use reverie_base::{Bitboard, Board, Square, SCORE_MAX, SCORE_MIN};

/// The number of tracked patterns.
const N_FEATURES: usize = 10;

/// The number of game stages with distinct weights: one per ten plies.
pub const N_STAGES: usize = 6;

/// Powers of three, for ternary feature indexing.
const POW3: [u32; 10] = [1, 3, 9, 27, 81, 243, 729, 2187, 6561, 19683];

/// The number of squares in each feature.
const FEATURE_LEN: [usize; N_FEATURES] = [9, 9, 9, 9, 8, 8, 8, 8, 8, 8];

use Square::*;

/// The squares of each feature, padded with `Square::None`. The list position
/// of a square is its ternary digit position.
const FEATURE_SQUARES: [[Square; 9]; N_FEATURES] = [
    [A1, B1, C1, A2, B2, C2, A3, B3, C3],       // corner 3x3, A1
    [H1, G1, F1, H2, G2, F2, H3, G3, F3],       // corner 3x3, H1
    [A8, B8, C8, A7, B7, C7, A6, B6, C6],       // corner 3x3, A8
    [H8, G8, F8, H7, G7, F7, H6, G6, F6],       // corner 3x3, H8
    [A1, B1, C1, D1, E1, F1, G1, H1, None],     // edge, rank 1
    [A8, B8, C8, D8, E8, F8, G8, H8, None],     // edge, rank 8
    [A1, A2, A3, A4, A5, A6, A7, A8, None],     // edge, file A
    [H1, H2, H3, H4, H5, H6, H7, H8, None],     // edge, file H
    [A1, B2, C3, D4, E5, F6, G7, H8, None],     // main diagonal
    [A8, B7, C6, D5, E4, F3, G2, H1, None],     // main anti-diagonal
];

/// The starting offset of each feature's weight block.
const FEATURE_OFFSET: [usize; N_FEATURES] = {
    let mut offsets = [0usize; N_FEATURES];
    let mut acc = 0;
    let mut f = 0;
    while f < N_FEATURES {
        offsets[f] = acc;
        acc += POW3[FEATURE_LEN[f]] as usize;
        f += 1;
    }
    offsets
};

/// The number of weights of one game stage.
pub const N_WEIGHTS_PER_STAGE: usize = {
    let mut acc = 0;
    let mut f = 0;
    while f < N_FEATURES {
        acc += POW3[FEATURE_LEN[f]] as usize;
        f += 1;
    }
    acc
};

#[derive(Copy, Clone)]
/// One (feature, coefficient) pair of a square.
struct FeatureCoeff {
    feature: u8,
    coeff: u32,
}

#[derive(Copy, Clone)]
/// The features a square contributes to. No square belongs to more than four
/// patterns.
struct SquareFeatures {
    n: u8,
    entries: [FeatureCoeff; 4],
}

/// For each square, the features it contributes to and with which ternary
/// coefficient.
static SQUARE_TO_FEATURE: Lazy<[SquareFeatures; 64]> = Lazy::new(|| {
    let mut map = [SquareFeatures {
        n: 0,
        entries: [FeatureCoeff {
            feature: 0,
            coeff: 0,
        }; 4],
    }; 64];
    for (f, squares) in FEATURE_SQUARES.iter().enumerate() {
        for (i, &sq) in squares[..FEATURE_LEN[f]].iter().enumerate() {
            let slot = &mut map[sq.index()];
            slot.entries[slot.n as usize] = FeatureCoeff {
                feature: f as u8,
                coeff: POW3[i],
            };
            slot.n += 1;
        }
    }
    map
});

/// Recompute a ternary index with the player and opponent digits exchanged.
fn color_swapped(mut idx: u32, len: usize) -> u32 {
    let mut out = 0;
    for i in 0..len {
        let digit = idx % 3;
        idx /= 3;
        out += POW3[i]
            * match digit {
                0 => 1,
                1 => 0,
                _ => 2,
            };
    }
    out
}

/// Color-swap table for 8-square features.
static SWAP_8: Lazy<Vec<u16>> = Lazy::new(|| {
    (0..POW3[8]).map(|i| color_swapped(i, 8) as u16).collect()
});

/// Color-swap table for 9-square features.
static SWAP_9: Lazy<Vec<u16>> = Lazy::new(|| {
    (0..POW3[9]).map(|i| color_swapped(i, 9) as u16).collect()
});

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The incremental feature state of a position.
///
/// Invariant: after [`set`](Eval::set), and through any balanced sequence of
/// [`update`](Eval::update) / [`restore`](Eval::restore) / [`pass`](Eval::pass)
/// calls mirroring moves applied to the board, the features equal what `set`
/// would compute from the current board.
pub struct Eval {
    features: [u32; N_FEATURES],
}

impl Eval {
    #[must_use]
    /// Create the feature state of `board`.
    pub fn from_board(board: &Board) -> Eval {
        let mut eval = Eval {
            features: [0; N_FEATURES],
        };
        eval.set(board);
        eval
    }

    /// Initialize the features from scratch. The digit of a square is 0 for
    /// a disc of the side to move, 1 for an opponent disc and 2 for empty.
    pub fn set(&mut self, board: &Board) {
        for f in 0..N_FEATURES {
            let mut acc = 0;
            for (i, &sq) in FEATURE_SQUARES[f][..FEATURE_LEN[f]].iter().enumerate() {
                let digit = if board.player.contains(sq) {
                    0
                } else if board.opponent.contains(sq) {
                    1
                } else {
                    2
                };
                acc += digit * POW3[i];
            }
            self.features[f] = acc;
        }
    }

    /// Apply a move: the mover's new disc lands on `sq`, the discs of
    /// `flipped` change color, and the perspective switches to the new side
    /// to move.
    pub fn update(&mut self, sq: Square, flipped: Bitboard) {
        let map = &*SQUARE_TO_FEATURE;
        let entry = &map[sq.index()];
        for e in &entry.entries[..entry.n as usize] {
            // empty (2) becomes a mover disc (0)
            self.features[e.feature as usize] -= 2 * e.coeff;
        }
        for fsq in flipped {
            let entry = &map[fsq.index()];
            for e in &entry.entries[..entry.n as usize] {
                // opponent (1) becomes a mover disc (0)
                self.features[e.feature as usize] -= e.coeff;
            }
        }
        self.swap_sides();
    }

    /// Undo the matching [`update`](Eval::update).
    pub fn restore(&mut self, sq: Square, flipped: Bitboard) {
        self.swap_sides();
        let map = &*SQUARE_TO_FEATURE;
        let entry = &map[sq.index()];
        for e in &entry.entries[..entry.n as usize] {
            self.features[e.feature as usize] += 2 * e.coeff;
        }
        for fsq in flipped {
            let entry = &map[fsq.index()];
            for e in &entry.entries[..entry.n as usize] {
                self.features[e.feature as usize] += e.coeff;
            }
        }
    }

    /// Switch the side to move without playing: every feature swaps its
    /// player and opponent digits.
    pub fn pass(&mut self) {
        self.swap_sides();
    }

    fn swap_sides(&mut self) {
        for f in 0..N_FEATURES {
            let idx = self.features[f] as usize;
            self.features[f] = if FEATURE_LEN[f] == 9 {
                u32::from(SWAP_9[idx])
            } else {
                u32::from(SWAP_8[idx])
            };
        }
    }

    #[must_use]
    /// Score the position for the side to move, in discs, by dotting the
    /// features with the stage weights. Weights are in hundredths of a disc;
    /// the result is rounded and clamped to the interval
    /// `(SCORE_MIN, SCORE_MAX)` exclusive, since a heuristic score must never
    /// claim a proven result.
    pub fn score(&self, weights: &Weights, n_empties: u32) -> i32 {
        let stage = Weights::stage_of(n_empties);
        let mut sum = 0i32;
        for f in 0..N_FEATURES {
            sum += weights.at(stage, FEATURE_OFFSET[f] + self.features[f] as usize);
        }
        let discs = if sum >= 0 {
            (sum + 50) / 100
        } else {
            -((-sum + 50) / 100)
        };
        discs.clamp(SCORE_MIN + 1, SCORE_MAX - 1)
    }
}

/// The magic tag opening a weight file.
pub const WEIGHT_FILE_MAGIC: [u8; 4] = *b"RVWT";

/// The weight file format version this build reads.
const WEIGHT_FILE_VERSION: u32 = 1;

#[rustfmt::skip]
/// Per-square disc values, in hundredths of a disc, used to synthesize the
/// built-in weights: corners dominate, the squares giving a corner away are
/// penalized.
const SQUARE_VALUE_CENTI: [i32; 64] = [
    300, -80,  60,  20,  20,  60, -80, 300,
    -80, -150, -10,  -5,  -5, -10, -150, -80,
     60, -10,  10,   2,   2,  10, -10,  60,
     20,  -5,   2,   1,   1,   2,  -5,  20,
     20,  -5,   2,   1,   1,   2,  -5,  20,
     60, -10,  10,   2,   2,  10, -10,  60,
    -80, -150, -10,  -5,  -5, -10, -150, -80,
    300, -80,  60,  20,  20,  60, -80, 300,
];

/// The evaluation weight tables: one block of pattern weights per game stage,
/// read-only once constructed.
pub struct Weights {
    data: Vec<i16>,
}

impl Weights {
    #[must_use]
    /// Synthesize weights from the per-square value table. This is the
    /// fallback used when no weight file is provided: every pattern weight is
    /// the signed sum of its squares' values.
    pub fn positional() -> Weights {
        let mut stage0 = vec![0i16; N_WEIGHTS_PER_STAGE];
        for f in 0..N_FEATURES {
            let len = FEATURE_LEN[f];
            let size = POW3[len] as usize;
            for idx in 0..size {
                let mut v = 0i32;
                let mut x = idx as u32;
                for i in 0..len {
                    let digit = x % 3;
                    x /= 3;
                    let sq = FEATURE_SQUARES[f][i];
                    match digit {
                        0 => v += SQUARE_VALUE_CENTI[sq.index()],
                        1 => v -= SQUARE_VALUE_CENTI[sq.index()],
                        _ => (),
                    }
                }
                stage0[FEATURE_OFFSET[f] + idx] = v as i16;
            }
        }
        let mut data = Vec::with_capacity(N_STAGES * N_WEIGHTS_PER_STAGE);
        for _ in 0..N_STAGES {
            data.extend_from_slice(&stage0);
        }
        Weights { data }
    }

    /// Load weights from a binary file: the 4-byte magic, a version word, a
    /// stage count, then the little-endian `i16` weights of every stage.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Weights, WeightsError> {
        Weights::from_bytes(&std::fs::read(path)?)
    }

    /// Parse the weight file format from a byte buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Weights, WeightsError> {
        if bytes.len() < 12 {
            return Err(WeightsError::BadSize);
        }
        if bytes[0..4] != WEIGHT_FILE_MAGIC {
            return Err(WeightsError::BadMagic);
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != WEIGHT_FILE_VERSION {
            return Err(WeightsError::BadVersion(version));
        }
        let n_stages = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let body = &bytes[12..];
        if n_stages != N_STAGES || body.len() != 2 * N_STAGES * N_WEIGHTS_PER_STAGE {
            return Err(WeightsError::BadSize);
        }
        let data = body
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(Weights { data })
    }

    #[inline]
    /// Map an empties count to a weight stage: one stage per ten plies.
    fn stage_of(n_empties: u32) -> usize {
        (((60u32.saturating_sub(n_empties)) / 10) as usize).min(N_STAGES - 1)
    }

    #[inline]
    fn at(&self, stage: usize, offset: usize) -> i32 {
        i32::from(self.data[stage * N_WEIGHTS_PER_STAGE + offset])
    }
}

#[derive(Debug)]
/// The errors raised when loading an evaluation weight file.
pub enum WeightsError {
    /// The file could not be read.
    Io(io::Error),
    /// The file does not start with the weight-file magic.
    BadMagic,
    /// The file is of an unsupported version.
    BadVersion(u32),
    /// The file payload has the wrong length.
    BadSize,
}

impl Display for WeightsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightsError::Io(e) => write!(f, "cannot read weight file: {e}"),
            WeightsError::BadMagic => write!(f, "not a weight file (bad magic)"),
            WeightsError::BadVersion(v) => write!(f, "unsupported weight file version {v}"),
            WeightsError::BadSize => write!(f, "weight file has the wrong size"),
        }
    }
}

impl std::error::Error for WeightsError {}

impl From<io::Error> for WeightsError {
    fn from(e: io::Error) -> WeightsError {
        WeightsError::Io(e)
    }
}
