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

//! Limits on how long a search may run.
//!
//! A limit is shared by every worker of a search. The deadline and node cap
//! are checked cooperatively: workers batch their node counts into the shared
//! counter and poll the over-flag between node expansions, so raising the flag
//! stops the whole search within a bounded number of expansions.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use crate::SearchError;

#[derive(Debug)]
/// A limit to how long an engine should search for.
pub struct SearchLimit {
    /// Whether the search is over.
    over: AtomicBool,
    /// The cumulative number of nodes which have been searched since the last
    /// call to `start`.
    num_nodes: AtomicU64,
    /// A cap on the total number of nodes to search. If the cap is `None`,
    /// there is no limit to the number of nodes to search.
    nodes_cap: Mutex<Option<u64>>,
    /// The time at which the search was started.
    start_time: Mutex<Instant>,
    /// The time at which the search will end. `None` if the search is
    /// untimed.
    end_time: Mutex<Option<Instant>>,
    /// The wall-clock budget of one search. `None` if the search is untimed.
    search_duration: Mutex<Option<Duration>>,
}

impl SearchLimit {
    /// Create a new `SearchLimit` which will never stop on its own.
    pub fn new() -> SearchLimit {
        SearchLimit {
            over: AtomicBool::new(false),
            num_nodes: AtomicU64::new(0),
            nodes_cap: Mutex::new(None),
            start_time: Mutex::new(Instant::now()),
            end_time: Mutex::new(None),
            search_duration: Mutex::new(None),
        }
    }

    /// Set the wall-clock budget applied by the next call to `start`.
    pub fn set_move_time(&self, duration: Option<Duration>) -> Result<(), SearchError> {
        *self.search_duration.lock()? = duration;
        Ok(())
    }

    /// Set the node cap applied from now on.
    pub fn set_node_cap(&self, cap: Option<u64>) -> Result<(), SearchError> {
        *self.nodes_cap.lock()? = cap;
        Ok(())
    }

    /// Start the search limit, by resetting its counters and setting its
    /// start time to now.
    pub fn start(&self) -> Result<(), SearchError> {
        self.num_nodes.store(0, Ordering::Relaxed);
        self.over.store(false, Ordering::Relaxed);
        let now = Instant::now();
        *self.start_time.lock()? = now;
        let opt_duration = *self.search_duration.lock()?;
        *self.end_time.lock()? = opt_duration.map(|dur| now + dur);
        Ok(())
    }

    /// Raise the over-flag, stopping the search cooperatively.
    pub fn stop(&self) {
        self.over.store(true, Ordering::Relaxed);
    }

    #[inline]
    /// Poll whether the search is over.
    pub fn is_over(&self) -> bool {
        self.over.load(Ordering::Relaxed)
    }

    #[inline]
    /// Check the clock against the deadline, raising the over-flag if the
    /// deadline has passed. Returns whether the flag was raised.
    pub fn update_time(&self) -> Result<bool, SearchError> {
        if let Some(end) = *self.end_time.lock()? {
            if Instant::now() > end {
                self.over.store(true, Ordering::Relaxed);
                return Ok(true);
            }
        }
        Ok(false)
    }

    #[inline]
    /// Add a batch of searched nodes to the shared counter, raising the
    /// over-flag when the node cap is exceeded.
    pub fn add_nodes(&self, nodes: u64) -> Result<(), SearchError> {
        self.num_nodes.fetch_add(nodes, Ordering::Relaxed);
        if let Some(max_nodes) = *self.nodes_cap.lock()? {
            if self.num_nodes.load(Ordering::Relaxed) > max_nodes {
                self.over.store(true, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    #[inline]
    /// Get the cumulative number of nodes counted against the limit.
    pub fn num_nodes(&self) -> u64 {
        self.num_nodes.load(Ordering::Relaxed)
    }

    /// Get the time elapsed since the limit was started.
    pub fn elapsed(&self) -> Result<Duration, SearchError> {
        Ok(self.start_time.lock()?.elapsed())
    }
}

impl Default for SearchLimit {
    fn default() -> Self {
        SearchLimit::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_limit_never_stops() {
        let limit = SearchLimit::new();
        limit.start().unwrap();
        assert!(!limit.is_over());
        assert!(!limit.update_time().unwrap());
        limit.add_nodes(1_000_000).unwrap();
        assert!(!limit.is_over());
    }

    #[test]
    fn explicit_stop() {
        let limit = SearchLimit::new();
        limit.start().unwrap();
        limit.stop();
        assert!(limit.is_over());
        // restarting clears the flag
        limit.start().unwrap();
        assert!(!limit.is_over());
    }

    #[test]
    fn node_cap_stops() {
        let limit = SearchLimit::new();
        limit.set_node_cap(Some(100)).unwrap();
        limit.start().unwrap();
        limit.add_nodes(64).unwrap();
        assert!(!limit.is_over());
        limit.add_nodes(64).unwrap();
        assert!(limit.is_over());
        assert_eq!(limit.num_nodes(), 128);
    }

    #[test]
    fn deadline_stops() {
        let limit = SearchLimit::new();
        limit.set_move_time(Some(Duration::from_millis(1))).unwrap();
        limit.start().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(limit.update_time().unwrap());
        assert!(limit.is_over());
    }
}
