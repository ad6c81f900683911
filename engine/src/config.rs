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

use std::time::Duration;

use crate::probcut::NO_SELECTIVITY;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Configuration options for a search.
pub struct SearchConfig {
    /// The midgame depth at which the engine evaluates a position. When the
    /// depth reaches the number of empty squares, the position is solved
    /// exactly instead.
    pub depth: i32,
    /// The selectivity level, 0..=5. Level 5 disables probabilistic forward
    /// pruning entirely; lower levels prune more aggressively.
    pub selectivity: u8,
    /// The number of threads to search with, including the master.
    pub n_threads: usize,
    /// The size of the main transposition table, in megabytes. The PV table
    /// gets a small fixed fraction of this.
    pub hash_size_mb: usize,
    /// The wall-clock budget for one search, or `None` for no time limit.
    pub move_time: Option<Duration>,
    /// A cap on the number of nodes to search, or `None` for no cap.
    pub node_cap: Option<u64>,
}

impl SearchConfig {
    pub fn new() -> SearchConfig {
        SearchConfig {
            depth: 21,
            selectivity: NO_SELECTIVITY,
            n_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            hash_size_mb: 32,
            move_time: None,
            node_cap: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig::new()
    }
}
