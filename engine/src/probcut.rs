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

//! Probabilistic forward pruning (ProbCut).
//!
//! A shallow search correlates strongly with a deep one. When a shallow
//! null-window probe clears the target bound by a margin of `t` standard
//! deviations of the shallow-vs-deep error, the deep search is skipped and
//! the bound returned; `t` follows the active selectivity level. Level 5
//! never prunes, so the search stays exact.

use reverie_base::{SCORE_MAX, SCORE_MIN};

use crate::{search::Search, SearchError};

/// The selectivity level that disables probcut entirely.
pub const NO_SELECTIVITY: u8 = 5;

#[derive(Clone, Copy, Debug)]
/// One selectivity level: a confidence multiplier and the probability (in
/// percent) that a cut at this level is correct.
pub struct SelectivityLevel {
    /// The error multiplier applied to the margin.
    pub t: f64,
    /// The nominal confidence of a cut, in percent.
    pub percent: u32,
}

/// The probcut confidence table, indexed by selectivity level. The last level
/// stands for an infinite margin: no cut ever fires.
pub const SELECTIVITY_TABLE: [SelectivityLevel; 6] = [
    SelectivityLevel { t: 1.1, percent: 73 },
    SelectivityLevel { t: 1.5, percent: 87 },
    SelectivityLevel { t: 2.0, percent: 95 },
    SelectivityLevel { t: 2.6, percent: 98 },
    SelectivityLevel { t: 3.3, percent: 99 },
    SelectivityLevel {
        t: 999.0,
        percent: 100,
    },
];

/// The minimum remaining depth at which probing is worth the effort.
pub(crate) const PROBCUT_DEPTH_MIN: i32 = 9;

/* Error-model calibration constants (see DESIGN.md). */
const SIGMA_BASE: f64 = 1.0;
const SIGMA_PER_EMPTY: f64 = 0.021;
const SIGMA_PER_GAP: f64 = 0.25;

/// The reduced depth probed in place of `depth`: the nearest even depth near
/// a quarter of the full one, so the probe moves the same side.
fn probcut_depth(depth: i32) -> i32 {
    2 * (depth / 4)
}

/// The expected standard deviation of the error between a `probcut_depth`
/// search and a `depth` search with `n_empties` squares open.
fn eval_sigma(n_empties: i32, depth: i32, probcut_depth: i32) -> f64 {
    SIGMA_BASE + SIGMA_PER_EMPTY * f64::from(n_empties) + SIGMA_PER_GAP * f64::from(depth - probcut_depth)
}

impl Search {
    /// Attempt to prove the null-window result `(alpha, alpha + 1)` with a
    /// shallow search and a statistical margin. Returns the proven bound, or
    /// `None` when no cut fires.
    pub(crate) fn probcut(
        &mut self,
        alpha: i32,
        depth: i32,
    ) -> Result<Option<i32>, SearchError> {
        if self.selectivity >= NO_SELECTIVITY || depth < PROBCUT_DEPTH_MIN {
            return Ok(None);
        }

        let beta = alpha + 1;
        let t = SELECTIVITY_TABLE[self.selectivity as usize].t;
        let pc_depth = probcut_depth(depth);
        let margin = (t * eval_sigma(self.n_empties, depth, pc_depth)).ceil() as i32;
        let static_eval = self.evaluate_0();

        // try to prove score >= beta
        let pc_beta = beta + margin;
        if pc_beta < SCORE_MAX && static_eval >= pc_beta {
            if self.nws_midgame(pc_beta - 1, pc_depth)? >= pc_beta {
                return Ok(Some(beta));
            }
        }

        // try to prove score <= alpha
        let pc_alpha = alpha - margin;
        if pc_alpha > SCORE_MIN && static_eval < pc_alpha {
            if self.nws_midgame(pc_alpha, pc_depth)? <= pc_alpha {
                return Ok(Some(alpha));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::test_search;
    use reverie_base::Board;

    #[test]
    fn table_is_monotone() {
        for pair in SELECTIVITY_TABLE.windows(2) {
            assert!(pair[0].t < pair[1].t);
            assert!(pair[0].percent <= pair[1].percent);
        }
        assert_eq!(SELECTIVITY_TABLE[NO_SELECTIVITY as usize].percent, 100);
    }

    #[test]
    fn margin_grows_with_t_and_gap() {
        let s1 = eval_sigma(20, 12, 6);
        let s2 = eval_sigma(20, 16, 6);
        assert!(s2 > s1);
        let s3 = eval_sigma(40, 12, 6);
        assert!(s3 > s1);
    }

    #[test]
    fn exact_level_never_cuts() {
        let board = Board::new();
        let mut search = test_search(&board, 1);
        search.selectivity = NO_SELECTIVITY;
        assert_eq!(search.probcut(0, 20).unwrap(), None);
    }

    #[test]
    fn shallow_depth_never_cuts() {
        let board = Board::new();
        let mut search = test_search(&board, 1);
        search.selectivity = 0;
        assert_eq!(search.probcut(0, PROBCUT_DEPTH_MIN - 1).unwrap(), None);
    }
}
