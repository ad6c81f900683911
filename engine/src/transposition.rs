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

//! Transposition tables.
//!
//! A transposition table is a large hash-map from board positions to score
//! bounds and best moves found by earlier searches. If the same position is
//! reached through multiple move orders, the engine reuses its old analysis;
//! in multithreaded search the table is also how workers share their results.
//!
//! The table is bucketed four ways and striped with spinlocks: an access
//! holds exactly one lock, selected from the hash code, for the duration of
//! its bucket scan. The lock count scales with the core count, so contention
//! is effectively zero. Entries store the full board, never just the hash
//! code, so a collision can misplace information but never corrupt a lookup.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};

use reverie_base::{Board, Square, SCORE_INF, SCORE_MAX, SCORE_MIN};

/// The number of entries per bucket.
pub const HASH_N_WAY: usize = 4;

/// The number of locks per rounded-down-power-of-two worker.
const N_LOCKS_PER_CPU: usize = 256;

/// The generation counter wraps after this value; the table is then cleared.
const DATE_MAX: u8 = 127;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The payload of a stored position.
pub struct HashData {
    /// The search depth of the stored analysis.
    pub depth: u8,
    /// The selectivity level of the stored analysis.
    pub selectivity: u8,
    /// log2 of the node count spent producing this entry; a measure of how
    /// expensive it would be to recompute.
    pub cost: u8,
    /// The generation in which the entry was last touched, 1..=127.
    pub date: u8,
    /// A lower bound on the true score.
    pub lower: i8,
    /// An upper bound on the true score. Always at least `lower`.
    pub upper: i8,
    /// The two best known moves, best first, as square indices
    /// (`Square::None as u8` when unknown).
    pub moves: [u8; 2],
}

impl HashData {
    /// The data returned on a probe miss: infinite bounds and no moves.
    pub const UNSET: HashData = HashData {
        depth: 0,
        selectivity: 0,
        cost: 0,
        date: 0,
        lower: -(SCORE_INF as i8),
        upper: SCORE_INF as i8,
        moves: [Square::None as u8; 2],
    };

    #[must_use]
    /// Get the best known move of this entry.
    pub fn move_0(&self) -> Square {
        Square::from_index(self.moves[0])
    }

    #[must_use]
    /// Get the second-best known move of this entry.
    pub fn move_1(&self) -> Square {
        Square::from_index(self.moves[1])
    }

    #[inline]
    /// The replacement priority of this entry, compared as a single integer:
    /// lexicographic over `(date, cost, selectivity, depth)`, most significant
    /// first. The slot with the lowest writeable level is the bucket's
    /// eviction victim.
    fn writeable_level(&self) -> u32 {
        u32::from_be_bytes([self.date, self.cost, self.selectivity, self.depth])
    }

    /// Promote `mov` to the front of the preferred-move pair.
    fn promote_move(&mut self, mov: Square) {
        let m = mov as u8;
        if m != Square::None as u8 && self.moves[0] != m {
            self.moves[1] = self.moves[0];
            self.moves[0] = m;
        }
    }

    /// Refresh this entry from a store of the same depth and selectivity:
    /// tighten the bounds and update the move pair.
    fn update(&mut self, s: &StorePayload, date: u8) {
        if s.score < s.beta && (s.score as i8) < self.upper {
            self.upper = s.score as i8;
        }
        if s.score > s.alpha && (s.score as i8) > self.lower {
            self.lower = s.score as i8;
        }
        if s.score > s.alpha || s.score == SCORE_MIN {
            self.promote_move(s.mov);
        }
        self.cost = self.cost.max(s.cost);
        self.date = date;
    }

    /// Overwrite the bounds of this entry from a store of a different depth
    /// or selectivity, keeping the move pair up to date.
    fn upgrade(&mut self, s: &StorePayload, date: u8) {
        self.upper = if s.score < s.beta {
            s.score as i8
        } else {
            SCORE_MAX as i8
        };
        self.lower = if s.score > s.alpha {
            s.score as i8
        } else {
            SCORE_MIN as i8
        };
        if s.score > s.alpha || s.score == SCORE_MIN {
            self.promote_move(s.mov);
        }
        self.depth = s.depth;
        self.selectivity = s.selectivity;
        self.cost = self.cost.max(s.cost);
        self.date = date;
    }

    /// Initialize this entry from scratch.
    fn rewrite(&mut self, s: &StorePayload, date: u8) {
        self.upper = if s.score < s.beta {
            s.score as i8
        } else {
            SCORE_MAX as i8
        };
        self.lower = if s.score > s.alpha {
            s.score as i8
        } else {
            SCORE_MIN as i8
        };
        self.moves = [s.mov as u8, Square::None as u8];
        self.depth = s.depth;
        self.selectivity = s.selectivity;
        self.cost = s.cost;
        self.date = date;
    }
}

#[derive(Copy, Clone, Debug)]
/// Everything a search knows when it stores a position.
pub struct StorePayload {
    /// The searched depth.
    pub depth: u8,
    /// The selectivity the search ran at.
    pub selectivity: u8,
    /// log2 of the nodes spent below this position.
    pub cost: u8,
    /// The alpha bound the search ran with.
    pub alpha: i32,
    /// The beta bound the search ran with.
    pub beta: i32,
    /// The best score found.
    pub score: i32,
    /// The best move found, or `Square::None`.
    pub mov: Square,
}

#[derive(Copy, Clone)]
/// One slot of a bucket: the exact board and its data.
struct HashEntry {
    board: Board,
    data: HashData,
}

impl HashEntry {
    const EMPTY: HashEntry = HashEntry {
        // the empty board never occurs in play, so it never matches a probe
        board: Board {
            player: reverie_base::Bitboard::EMPTY,
            opponent: reverie_base::Bitboard::EMPTY,
        },
        data: HashData {
            depth: 0,
            selectivity: 0,
            cost: 0,
            date: 0,
            lower: -(SCORE_INF as i8),
            upper: SCORE_INF as i8,
            moves: [Square::None as u8; 2],
        },
    };
}

/// A test-and-set spinlock with exponential backoff. Bucket accesses are a
/// handful of loads and stores, and the stripe count keeps contention rare,
/// so spinning beats parking.
struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    const fn new() -> SpinLock {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> SpinGuard<'_> {
        let mut spins = 0u32;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins < 32 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        SpinGuard { lock: self }
    }
}

/// An RAII guard releasing its spinlock on drop.
struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A table which stores transposition data. It behaves much like a hash-map
/// from positions to score bounds, evicting the least valuable entry of a
/// bucket when a new one needs the space.
pub struct HashTable {
    /// All entries, grouped in buckets of [`HASH_N_WAY`] consecutive slots.
    /// Concurrent access requires the matching stripe lock.
    entries: Box<[UnsafeCell<HashEntry>]>,
    /// The stripe locks. An entry index shares its lock with all indices
    /// whose low bits match the lock mask.
    locks: Box<[SpinLock]>,
    /// Mask selecting a bucket from a hash code.
    bucket_mask: u64,
    /// Mask selecting a stripe lock from a hash code.
    lock_mask: u64,
    /// The current generation, 1..=127.
    date: AtomicU8,
}

// All shared mutation happens behind the stripe locks.
unsafe impl Send for HashTable {}
unsafe impl Sync for HashTable {}

impl HashTable {
    #[must_use]
    /// Create a table using about `size_mb` megabytes, striped for
    /// `n_workers` concurrent searchers. The requested size is rounded down
    /// to a power-of-two bucket count; if the allocation fails, the size is
    /// halved until it succeeds.
    pub fn new(size_mb: usize, n_workers: usize) -> HashTable {
        let bucket_bytes = HASH_N_WAY * std::mem::size_of::<HashEntry>();
        let raw = (size_mb.max(1) << 20) / bucket_bytes;
        let mut n_buckets = prev_power_of_two(raw.max(1024));

        let entries = loop {
            let mut v: Vec<UnsafeCell<HashEntry>> = Vec::new();
            if v.try_reserve_exact(n_buckets * HASH_N_WAY).is_ok() {
                v.resize_with(n_buckets * HASH_N_WAY, || UnsafeCell::new(HashEntry::EMPTY));
                break v.into_boxed_slice();
            }
            // allocation failure: fall back to a smaller table
            n_buckets = (n_buckets >> 1).max(1024);
        };

        let n_locks = (N_LOCKS_PER_CPU * prev_power_of_two(n_workers.max(1))).min(n_buckets);
        let mut locks = Vec::with_capacity(n_locks);
        locks.resize_with(n_locks, SpinLock::new);

        HashTable {
            entries,
            locks: locks.into_boxed_slice(),
            bucket_mask: (n_buckets - 1) as u64,
            lock_mask: (n_locks - 1) as u64,
            date: AtomicU8::new(0),
        }
    }

    #[must_use]
    /// Get the current generation counter.
    pub fn date(&self) -> u8 {
        self.date.load(Ordering::Relaxed)
    }

    /// Begin a new search: advance the generation counter. When the counter
    /// would exceed its 7-bit range, the whole table is cleared instead and
    /// the counter restarts at 1.
    pub fn new_search(&self) {
        let date = self.date.load(Ordering::Relaxed);
        if date >= DATE_MAX {
            self.clear();
            self.date.store(1, Ordering::Relaxed);
        } else {
            self.date.store(date + 1, Ordering::Relaxed);
        }
    }

    /// Erase every entry.
    pub fn clear(&self) {
        for bucket in 0..=self.bucket_mask {
            let _guard = self.lock_for(bucket);
            let base = (bucket as usize) * HASH_N_WAY;
            for j in 0..HASH_N_WAY {
                unsafe { *self.entries[base + j].get() = HashEntry::EMPTY };
            }
        }
    }

    #[inline]
    fn bucket_base(&self, hash: u64) -> usize {
        ((hash & self.bucket_mask) as usize) * HASH_N_WAY
    }

    #[inline]
    fn lock_for(&self, hash: u64) -> SpinGuard<'_> {
        self.locks[(hash & self.lock_mask) as usize].lock()
    }

    #[must_use]
    /// Look up `board`. On a hit, the entry's generation is refreshed and its
    /// data returned; on a miss, [`HashData::UNSET`] is returned.
    pub fn get(&self, board: &Board, hash: u64) -> HashData {
        let base = self.bucket_base(hash);
        let _guard = self.lock_for(hash);
        let date = self.date();
        for i in base..base + HASH_N_WAY {
            let entry = unsafe { &mut *self.entries[i].get() };
            if entry.board == *board {
                entry.data.date = date;
                return entry.data;
            }
        }
        HashData::UNSET
    }

    /// Store an analysis of `board`. A matching slot is refined according to
    /// the update or upgrade rule; otherwise the bucket slot with the lowest
    /// writeable level is evicted.
    pub fn store(&self, board: &Board, hash: u64, payload: &StorePayload) {
        let base = self.bucket_base(hash);
        let _guard = self.lock_for(hash);
        let date = self.date();

        let mut victim = base;
        let mut victim_level = u32::MAX;
        for i in base..base + HASH_N_WAY {
            let entry = unsafe { &mut *self.entries[i].get() };
            if entry.board == *board {
                if entry.data.depth == payload.depth
                    && entry.data.selectivity == payload.selectivity
                {
                    entry.data.update(payload, date);
                } else {
                    entry.data.upgrade(payload, date);
                }
                // a raced or inconsistent entry is repaired by reinitializing
                if entry.data.lower > entry.data.upper {
                    entry.data.rewrite(payload, date);
                }
                return;
            }
            let level = entry.data.writeable_level();
            if level < victim_level {
                victim_level = level;
                victim = i;
            }
        }

        let entry = unsafe { &mut *self.entries[victim].get() };
        entry.board = *board;
        entry.data.rewrite(payload, date);
    }

    /// Store an analysis of `board` unconditionally: a matching slot is
    /// replaced outright instead of refined.
    pub fn force(&self, board: &Board, hash: u64, payload: &StorePayload) {
        let base = self.bucket_base(hash);
        let _guard = self.lock_for(hash);
        let date = self.date();

        let mut victim = base;
        let mut victim_level = u32::MAX;
        for i in base..base + HASH_N_WAY {
            let entry = unsafe { &mut *self.entries[i].get() };
            if entry.board == *board {
                entry.data.rewrite(payload, date);
                return;
            }
            let level = entry.data.writeable_level();
            if level < victim_level {
                victim_level = level;
                victim = i;
            }
        }

        let entry = unsafe { &mut *self.entries[victim].get() };
        entry.board = *board;
        entry.data.rewrite(payload, date);
    }

    /// Seed the table with externally computed bounds, e.g. from an opening
    /// book. Unlike [`store`](HashTable::store), the bounds are taken as
    /// given rather than derived from a search window.
    pub fn feed(
        &self,
        board: &Board,
        hash: u64,
        depth: u8,
        selectivity: u8,
        lower: i8,
        upper: i8,
        mov: Square,
    ) {
        let base = self.bucket_base(hash);
        let _guard = self.lock_for(hash);
        let date = self.date();

        let mut victim = base;
        let mut victim_level = u32::MAX;
        let mut slot = None;
        for i in base..base + HASH_N_WAY {
            let entry = unsafe { &mut *self.entries[i].get() };
            if entry.board == *board {
                slot = Some(i);
                break;
            }
            let level = entry.data.writeable_level();
            if level < victim_level {
                victim_level = level;
                victim = i;
            }
        }

        let i = slot.unwrap_or(victim);
        let entry = unsafe { &mut *self.entries[i].get() };
        entry.board = *board;
        entry.data = HashData {
            depth,
            selectivity,
            cost: 0,
            date,
            lower: lower.min(upper),
            upper,
            moves: [mov as u8, Square::None as u8],
        };
    }

    /// Remove `sq` from the preferred moves of a matching entry and reset its
    /// lower bound to the pessimistic minimum. Used to search a position with
    /// one move excluded.
    pub fn exclude_move(&self, board: &Board, hash: u64, sq: Square) {
        let base = self.bucket_base(hash);
        let _guard = self.lock_for(hash);
        for i in base..base + HASH_N_WAY {
            let entry = unsafe { &mut *self.entries[i].get() };
            if entry.board == *board {
                if entry.data.moves[0] == sq as u8 {
                    entry.data.moves[0] = entry.data.moves[1];
                    entry.data.moves[1] = Square::None as u8;
                } else if entry.data.moves[1] == sq as u8 {
                    entry.data.moves[1] = Square::None as u8;
                }
                entry.data.lower = SCORE_MIN as i8;
                return;
            }
        }
    }

    #[must_use]
    /// Count the entries of the current generation in a small sample of
    /// buckets, as a permill estimate of how full the table is.
    pub fn fill_rate_permill(&self) -> u32 {
        let date = self.date();
        let mut filled = 0;
        let mut total = 0;
        for bucket in 0..1000.min(self.bucket_mask + 1) {
            let base = (bucket as usize) * HASH_N_WAY;
            let _guard = self.lock_for(bucket);
            for i in base..base + HASH_N_WAY {
                let entry = unsafe { &*self.entries[i].get() };
                total += 1;
                if entry.data.date == date {
                    filled += 1;
                }
            }
        }
        filled * 1000 / total.max(1)
    }
}

/// Round down to a power of two.
fn prev_power_of_two(x: usize) -> usize {
    let mut p = 1;
    while p * 2 <= x {
        p *= 2;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(depth: u8, alpha: i32, beta: i32, score: i32, mov: Square) -> StorePayload {
        StorePayload {
            depth,
            selectivity: 5,
            cost: 10,
            alpha,
            beta,
            score,
            mov,
        }
    }

    #[test]
    fn miss_returns_unset() {
        let tt = HashTable::new(1, 1);
        let board = Board::new();
        let data = tt.get(&board, board.hash());
        assert_eq!(data, HashData::UNSET);
        assert_eq!(data.move_0(), Square::None);
    }

    #[test]
    fn store_then_get_is_no_wider() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        // exact score 3 inside the window
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::C4));
        let data = tt.get(&board, hash);
        assert_eq!(data.lower, 3);
        assert_eq!(data.upper, 3);
        assert_eq!(data.move_0(), Square::C4);
        assert_eq!(data.depth, 8);
    }

    #[test]
    fn fail_high_stores_lower_bound() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        // score >= beta: only a lower bound is known
        tt.store(&board, hash, &payload(8, 0, 1, 5, Square::C4));
        let data = tt.get(&board, hash);
        assert_eq!(data.lower, 5);
        assert_eq!(data.upper, SCORE_MAX as i8);
    }

    #[test]
    fn same_depth_update_tightens() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(8, 0, 1, 5, Square::C4)); // lower = 5
        tt.store(&board, hash, &payload(8, 6, 7, 6, Square::D3)); // upper = 6
        let data = tt.get(&board, hash);
        assert_eq!(data.lower, 5);
        assert_eq!(data.upper, 6);
        // the second store failed low, so C4 stays the preferred move
        assert_eq!(data.move_0(), Square::C4);
    }

    #[test]
    fn improving_move_is_promoted() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::C4));
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::D3));
        let data = tt.get(&board, hash);
        assert_eq!(data.move_0(), Square::D3);
        assert_eq!(data.move_1(), Square::C4);
        assert_eq!(data.lower, 3);
        assert_eq!(data.upper, 3);
    }

    #[test]
    fn deeper_store_upgrades() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(6, -10, 10, 3, Square::C4));
        tt.store(&board, hash, &payload(10, -10, 10, -2, Square::E6));
        let data = tt.get(&board, hash);
        assert_eq!(data.depth, 10);
        assert_eq!(data.lower, -2);
        assert_eq!(data.upper, -2);
        assert_eq!(data.move_0(), Square::E6);
    }

    #[test]
    fn force_replaces_outright() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(8, 0, 1, 5, Square::C4));
        tt.force(&board, hash, &payload(4, -10, 10, 1, Square::F5));
        let data = tt.get(&board, hash);
        assert_eq!(data.depth, 4);
        assert_eq!(data.lower, 1);
        assert_eq!(data.upper, 1);
        assert_eq!(data.move_0(), Square::F5);
    }

    #[test]
    fn feed_seeds_bounds() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.feed(&board, hash, 20, 5, -2, 4, Square::F5);
        let data = tt.get(&board, hash);
        assert_eq!(data.depth, 20);
        assert_eq!(data.lower, -2);
        assert_eq!(data.upper, 4);
        assert_eq!(data.move_0(), Square::F5);
    }

    #[test]
    fn exclude_move_drops_it() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::C4));
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::D3));
        tt.exclude_move(&board, hash, Square::D3);
        let data = tt.get(&board, hash);
        assert_eq!(data.move_0(), Square::C4);
        assert_eq!(data.move_1(), Square::None);
        assert_eq!(data.lower, SCORE_MIN as i8);
    }

    #[test]
    fn date_wrap_clears_table() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let board = Board::new();
        let hash = board.hash();
        tt.store(&board, hash, &payload(8, -10, 10, 3, Square::C4));
        for _ in 0..DATE_MAX {
            tt.new_search();
        }
        assert_eq!(tt.date(), 1);
        assert_eq!(tt.get(&board, hash), HashData::UNSET);
    }

    #[test]
    fn distinct_positions_coexist() {
        let tt = HashTable::new(1, 1);
        tt.new_search();
        let a = Board::new();
        let b = a.after(Square::C4).unwrap();
        tt.store(&a, a.hash(), &payload(8, -10, 10, 3, Square::C4));
        tt.store(&b, b.hash(), &payload(8, -10, 10, -3, Square::E3));
        assert_eq!(tt.get(&a, a.hash()).lower, 3);
        assert_eq!(tt.get(&b, b.hash()).lower, -3);
    }
}
