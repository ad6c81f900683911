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

//! Thread management and parallel search coordination.
//!
//! Parallelism follows the young-brothers-wait concept: a node may only be
//! split after its first move has been searched serially. The master then
//! publishes a split point carrying the remaining moves; idle workers attach,
//! copy the master's state, and search siblings with the null window. A
//! fail-high stops every helper at the node, and at PV nodes the master
//! serializes the full-window re-searches after the helpers have been joined,
//! preserving the search semantics of the serial engine. The [`Engine`] at
//! the bottom of this module is the public facade tying the pool, tables and
//! search driver together.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{Builder, JoinHandle},
};

use reverie_base::{Board, Move, MoveList, Square};

use crate::{
    evaluate::{Weights, WeightsError},
    limit::SearchLimit,
    search::{Observer, Search, SearchReport},
    transposition::HashTable,
    SearchConfig, SearchError,
};

/// A node must have at least this much remaining depth to be worth splitting.
pub const SPLIT_MIN_DEPTH: i32 = 5;

/// A node must have at least this many unsearched moves to be worth
/// splitting.
pub const SPLIT_MIN_MOVES_TODO: usize = 1;

/// The maximum number of helpers working one split point.
pub const SPLIT_MAX_SLAVES: usize = 3;

/// The mutable part of a split point, guarded by its mutex.
struct SplitState {
    /// The best lower bound established so far; only raised.
    alpha: i32,
    best_score: i32,
    best_move: Square,
    /// The sibling moves left to search, consumed front to back.
    todo: Vec<Move>,
    next: usize,
    n_done: usize,
    n_slaves: usize,
    /// Null-window fail-highs at a PV node, awaiting the master's re-search.
    research: Vec<Move>,
}

/// A split point: the shared record of a node whose siblings are searched in
/// parallel. It lives on the master's stack scope; helpers hold non-owning
/// clones of the `Arc` that never outlive the master's join.
pub struct SplitPoint {
    /// The upper bound of the node's window; constant over the node's life.
    beta: i32,
    /// The remaining depth of the node (for endgame nodes, its empties
    /// count).
    depth: i32,
    /// Whether sibling searches are exact endgame solves.
    endgame: bool,
    /// The enclosing split point of the master, for stop propagation.
    parent: Option<Arc<SplitPoint>>,
    /// Raised on a beta cutoff or an abort; polled lock-free by every
    /// searcher below this node.
    stop: AtomicBool,
    state: Mutex<SplitState>,
    /// Signalled when the last helper leaves.
    done: Condvar,
}

impl SplitPoint {
    fn new(
        parent: Option<Arc<SplitPoint>>,
        alpha: i32,
        beta: i32,
        depth: i32,
        endgame: bool,
        best_score: i32,
        best_move: Square,
        todo: Vec<Move>,
    ) -> SplitPoint {
        SplitPoint {
            beta,
            depth,
            endgame,
            parent,
            stop: AtomicBool::new(false),
            state: Mutex::new(SplitState {
                alpha,
                best_score,
                best_move,
                todo,
                next: 0,
                n_done: 0,
                n_slaves: 0,
                research: Vec::new(),
            }),
            done: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub(crate) fn parent(&self) -> Option<&Arc<SplitPoint>> {
        self.parent.as_ref()
    }

    fn set_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Take the next unsearched sibling, with the current alpha to search it
    /// under. `None` when the queue is drained (or the lock is poisoned).
    fn pop_move(&self) -> Option<(Move, i32)> {
        let mut st = self.state.lock().ok()?;
        if st.next >= st.todo.len() {
            return None;
        }
        let m = st.todo[st.next];
        st.next += 1;
        Some((m, st.alpha))
    }

    /// Record a finished null-window sibling search. Raises the stop point on
    /// a beta cutoff; queues a PV fail-high for the master's re-search.
    fn record(&self, m: &Move, score: i32) {
        let mut st = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        st.n_done += 1;
        if score > st.best_score {
            st.best_score = score;
            st.best_move = m.sq;
        }
        if score >= self.beta {
            drop(st);
            self.set_stop();
        } else if score > st.alpha && self.beta - st.alpha > 1 {
            st.research.push(*m);
        }
    }

    /// Block until every helper has left the node.
    fn wait_slaves(&self) {
        let Ok(mut st) = self.state.lock() else {
            return;
        };
        while st.n_slaves > 0 {
            st = match self.done.wait(st) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
        debug_assert!(st.n_done <= st.todo.len());
    }

    /// Mark one helper's departure.
    fn slave_exit(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.n_slaves -= 1;
            if st.n_slaves == 0 {
                self.done.notify_all();
            }
        }
    }
}

/// The result of delegating a node's remaining moves to a split point.
pub(crate) struct SplitOutcome {
    pub score: i32,
    pub best_move: Square,
    /// The alpha bound after the master's re-searches.
    pub alpha: i32,
    /// The principal variation established by a re-search, if any.
    pub line: Option<Vec<Square>>,
}

/// One assignment handed to an idle worker.
struct SplitJob {
    node: Arc<SplitPoint>,
    search: Search,
}

/// A worker's mailbox: the pool leaves a job here and rings the bell.
struct TaskSlot {
    job: Mutex<Option<SplitJob>>,
    bell: Condvar,
}

/// The pool of helper threads. Workers park on their mailbox condvars while
/// idle; the idle stack is LIFO so recently active (cache-warm) workers are
/// recruited first.
pub struct SearchPool {
    slots: Vec<Arc<TaskSlot>>,
    idle: Mutex<Vec<usize>>,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SearchPool {
    #[must_use]
    /// Spawn a pool of `n_helpers` worker threads. If the operating system
    /// refuses a thread, the pool simply ends up smaller.
    pub fn new(n_helpers: usize) -> Arc<SearchPool> {
        let slots: Vec<Arc<TaskSlot>> = (0..n_helpers)
            .map(|_| {
                Arc::new(TaskSlot {
                    job: Mutex::new(None),
                    bell: Condvar::new(),
                })
            })
            .collect();
        let pool = Arc::new(SearchPool {
            slots,
            idle: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        });

        for i in 0..n_helpers {
            let worker_pool = pool.clone();
            let spawned = Builder::new()
                .name(format!("reverie-worker-{i}"))
                .spawn(move || SearchPool::worker_loop(&worker_pool, i));
            match spawned {
                Ok(handle) => {
                    if let (Ok(mut idle), Ok(mut handles)) =
                        (pool.idle.lock(), pool.handles.lock())
                    {
                        idle.push(i);
                        handles.push(handle);
                    }
                }
                Err(_) => {
                    // resource exhaustion: continue with fewer workers
                }
            }
        }
        pool
    }

    #[must_use]
    /// Whether any worker is currently parked.
    pub fn has_idle(&self) -> bool {
        self.idle.lock().map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Hand `job` to an idle worker. Returns the job back when none is
    /// available.
    fn try_recruit(&self, job: SplitJob) -> Result<(), SplitJob> {
        let idx = match self.idle.lock() {
            Ok(mut idle) => idle.pop(),
            Err(_) => None,
        };
        let Some(i) = idx else { return Err(job) };
        let slot = &self.slots[i];
        match slot.job.lock() {
            Ok(mut mailbox) => {
                *mailbox = Some(job);
                slot.bell.notify_one();
                Ok(())
            }
            Err(_) => Err(job),
        }
    }

    fn worker_loop(pool: &Arc<SearchPool>, i: usize) {
        let slot = pool.slots[i].clone();
        loop {
            let job = {
                let Ok(mut mailbox) = slot.job.lock() else {
                    return;
                };
                loop {
                    if pool.shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(job) = mailbox.take() {
                        break job;
                    }
                    mailbox = match slot.bell.wait(mailbox) {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                }
            };
            run_split_job(job);
            if let Ok(mut idle) = pool.idle.lock() {
                idle.push(i);
            }
        }
    }

    /// Stop and join every worker. Called by the engine on teardown; safe to
    /// call more than once.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for slot in &self.slots {
            slot.bell.notify_all();
        }
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

/// A helper's life at a split point: pull siblings, search them with the
/// null window, publish the results, leave when the queue drains or the node
/// stops.
fn run_split_job(job: SplitJob) {
    let node = job.node;
    let mut search = job.search;
    loop {
        if node.is_stopped() || search.limit.is_over() {
            break;
        }
        let Some((m, alpha)) = node.pop_move() else {
            break;
        };
        let prev = search.make_move(&m);
        let result = if node.endgame {
            search.nws_endgame(-alpha - 1)
        } else {
            search.nws_midgame(-alpha - 1, node.depth - 1)
        };
        search.undo_move(&m, prev);
        match result {
            Ok(s) => node.record(&m, -s),
            Err(_) => break,
        }
    }
    search
        .slave_nodes
        .fetch_add(search.n_nodes, Ordering::Relaxed);
    node.slave_exit();
}

impl Search {
    /// Recruit idle workers onto `node`, up to the slave cap, as long as
    /// moves remain.
    fn recruit(&self, pool: &Arc<SearchPool>, node: &Arc<SplitPoint>) {
        loop {
            {
                let Ok(mut st) = node.state.lock() else { return };
                if st.next >= st.todo.len() || st.n_slaves >= SPLIT_MAX_SLAVES {
                    return;
                }
                st.n_slaves += 1;
            }
            let job = SplitJob {
                node: node.clone(),
                search: self.fork(node),
            };
            if pool.try_recruit(job).is_err() {
                node.slave_exit();
                return;
            }
        }
    }

    /// Try to search the moves `list[first..]` through a split point,
    /// young-brothers-wait style. Returns `None` when no worker is idle, in
    /// which case the caller continues serially. On `Some`, the caller's move
    /// loop is finished: the outcome carries the best score and move over the
    /// delegated siblings, and at PV nodes the re-searched alpha and line.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn split(
        &mut self,
        list: &MoveList,
        first: usize,
        alpha: i32,
        beta: i32,
        depth: i32,
        endgame: bool,
        best_score: i32,
        best_move: Square,
    ) -> Result<Option<SplitOutcome>, SearchError> {
        let pool = match &self.pool {
            Some(pool) if pool.has_idle() => pool.clone(),
            _ => return Ok(None),
        };
        let todo: Vec<Move> = list.as_slice()[first..].to_vec();
        if todo.len() < SPLIT_MIN_MOVES_TODO {
            return Ok(None);
        }

        let node = Arc::new(SplitPoint::new(
            self.split.clone(),
            alpha,
            beta,
            depth,
            endgame,
            best_score,
            best_move,
            todo,
        ));
        let saved_split = self.split.replace(node.clone());
        self.recruit(&pool, &node);

        // the master helps at its own node until the queue drains
        let mut master_err = None;
        loop {
            if node.is_stopped() {
                break;
            }
            let Some((m, cur_alpha)) = node.pop_move() else {
                break;
            };
            let prev = self.make_move(&m);
            let result = if endgame {
                self.nws_endgame(-cur_alpha - 1)
            } else {
                self.nws_midgame(-cur_alpha - 1, depth - 1)
            };
            self.undo_move(&m, prev);
            match result {
                Ok(s) => node.record(&m, -s),
                Err(e) => {
                    master_err = Some(e);
                    node.set_stop();
                    break;
                }
            }
            self.recruit(&pool, &node);
        }

        node.wait_slaves();
        self.split = saved_split;

        // a genuine abort (timeout, ancestor cutoff) propagates; an interrupt
        // raised by this node's own beta cutoff does not
        self.check_stop()?;
        if let Some(e @ (SearchError::Poison | SearchError::Resource)) = master_err {
            return Err(e);
        }

        let (mut score, mut best, cur_alpha, research) = {
            let mut st = self.split_state(&node)?;
            (
                st.best_score,
                st.best_move,
                st.alpha,
                std::mem::take(&mut st.research),
            )
        };
        let mut alpha_now = cur_alpha;
        let mut out_line = None;

        if !node.is_stopped() {
            // PV fail-highs: the master re-searches serially with the full
            // window, keeping PVS semantics intact
            for m in research {
                if alpha_now >= beta {
                    break;
                }
                let mut child_line = Vec::new();
                let prev = self.make_move(&m);
                let result = if endgame {
                    self.pvs_endgame(-beta, -alpha_now, &mut child_line)
                } else {
                    self.pvs_midgame(-beta, -alpha_now, depth - 1, &mut child_line)
                };
                self.undo_move(&m, prev);
                let s = -result?;
                if s > score {
                    score = s;
                    best = m.sq;
                    let mut l = vec![m.sq];
                    l.extend(child_line);
                    out_line = Some(l);
                    if s > alpha_now {
                        alpha_now = s;
                        if s >= beta {
                            break;
                        }
                    }
                }
            }
        }

        Ok(Some(SplitOutcome {
            score,
            best_move: best,
            alpha: alpha_now,
            line: out_line,
        }))
    }

    fn split_state<'a>(
        &self,
        node: &'a SplitPoint,
    ) -> Result<std::sync::MutexGuard<'a, SplitState>, SearchError> {
        node.state.lock().map_err(SearchError::from)
    }
}

/// The public face of the engine: install a position, configure the limits,
/// and search. Protocol front-ends drive the game from here.
pub struct Engine {
    config: SearchConfig,
    board: Board,
    hash: Arc<HashTable>,
    pv_hash: Arc<HashTable>,
    weights: Arc<Weights>,
    limit: Arc<SearchLimit>,
    pool: Option<Arc<SearchPool>>,
    observer: Option<Observer>,
}

impl Engine {
    #[must_use]
    /// Build an engine from a configuration: allocate the tables, spawn the
    /// worker pool, and synthesize default evaluation weights.
    pub fn new(config: SearchConfig) -> Engine {
        let main_mb = (config.hash_size_mb.max(2) * 15 / 16).max(1);
        let pv_mb = (config.hash_size_mb / 16).max(1);
        let pool = if config.n_threads > 1 {
            Some(SearchPool::new(config.n_threads - 1))
        } else {
            None
        };
        Engine {
            board: Board::new(),
            hash: Arc::new(HashTable::new(main_mb, config.n_threads)),
            pv_hash: Arc::new(HashTable::new(pv_mb, config.n_threads)),
            weights: Arc::new(Weights::positional()),
            limit: Arc::new(SearchLimit::new()),
            pool,
            observer: None,
            config,
        }
    }

    /// Install the position to search.
    pub fn set_position(&mut self, board: Board) {
        self.board = board;
    }

    #[must_use]
    /// The currently installed position.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Install a progress observer, called after every completed iteration.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    /// Replace the evaluation weights from a weight file. Must only happen
    /// between searches, which the exclusive borrow enforces.
    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> Result<(), WeightsError> {
        self.weights = Arc::new(Weights::from_file(path)?);
        Ok(())
    }

    #[must_use]
    /// A handle for stopping the search from another thread.
    pub fn limit(&self) -> Arc<SearchLimit> {
        self.limit.clone()
    }

    /// Request a cooperative stop of the running search.
    pub fn stop(&self) {
        self.limit.stop();
    }

    /// Search the installed position under the configured limits, blocking
    /// until the search completes or is stopped. On interruption the report
    /// carries the last completed iteration.
    pub fn go(&mut self) -> Result<SearchReport, SearchError> {
        self.limit.set_move_time(self.config.move_time)?;
        self.limit.set_node_cap(self.config.node_cap)?;
        self.limit.start()?;
        self.hash.new_search();
        self.pv_hash.new_search();

        let mut search = Search::new(
            &self.board,
            self.hash.clone(),
            self.pv_hash.clone(),
            self.weights.clone(),
            self.limit.clone(),
            self.pool.clone(),
        );
        search.selectivity = self.config.selectivity;
        Ok(search.iterate(self.config.depth, self.observer.as_ref()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probcut::NO_SELECTIVITY;
    use crate::search::tests::test_search;
    use reverie_base::{SCORE_MAX, SCORE_MIN};
    use std::time::Duration;

    fn random_position(rng: &mut fastrand::Rng, n_empties: u32) -> Board {
        loop {
            let mut board = Board::new();
            loop {
                if board.n_empties() == n_empties {
                    return board;
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

    #[test]
    fn split_gates() {
        assert!(SPLIT_MIN_DEPTH >= 1);
        assert!(SPLIT_MIN_MOVES_TODO >= 1);
        assert!(SPLIT_MAX_SLAVES >= 1);
    }

    #[test]
    fn parallel_exact_solve_matches_serial() {
        let mut rng = fastrand::Rng::with_seed(0x7EAA);
        for _ in 0..3 {
            let board = random_position(&mut rng, 11);

            let mut serial = test_search(&board, 1);
            let mut line = Vec::new();
            let expected = serial
                .pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line)
                .unwrap();

            let mut parallel = test_search(&board, 3);
            let mut line = Vec::new();
            let got = parallel
                .pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line)
                .unwrap();

            assert_eq!(got, expected);
        }
    }

    #[test]
    fn parallel_midgame_matches_serial() {
        let board = Board::new().after(Square::F5).unwrap();

        let mut serial = test_search(&board, 1);
        let mut line = Vec::new();
        let expected = serial
            .pvs_midgame(SCORE_MIN, SCORE_MAX, 6, &mut line)
            .unwrap();

        let mut parallel = test_search(&board, 3);
        let mut line = Vec::new();
        let got = parallel
            .pvs_midgame(SCORE_MIN, SCORE_MAX, 6, &mut line)
            .unwrap();

        assert_eq!(got, expected);
    }

    #[test]
    fn engine_solves_an_endgame() {
        let mut rng = fastrand::Rng::with_seed(0xE11);
        let board = random_position(&mut rng, 10);

        let mut reference = test_search(&board, 1);
        let mut line = Vec::new();
        let expected = reference
            .pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line)
            .unwrap();

        let mut config = SearchConfig::new();
        config.depth = 20;
        config.selectivity = NO_SELECTIVITY;
        config.n_threads = 2;
        config.hash_size_mb = 4;
        let mut engine = Engine::new(config);
        engine.set_position(board);
        let report = engine.go().unwrap();
        assert!(!report.interrupted);
        assert_eq!(report.score, expected);
        assert_eq!(report.depth, 10);
        assert!(board.moves().contains(report.best_move) || report.best_move == Square::Pass);
    }

    #[test]
    fn engine_observer_reports_progress() {
        let mut config = SearchConfig::new();
        config.depth = 4;
        config.n_threads = 1;
        config.hash_size_mb = 2;
        let mut engine = Engine::new(config);
        engine.set_position(Board::new().after(Square::D3).unwrap());

        let reports: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        engine.set_observer(Arc::new(move |r: &SearchReport| {
            sink.lock().unwrap().push(r.depth);
        }));
        let report = engine.go().unwrap();
        assert!(!report.interrupted);
        assert_eq!(&*reports.lock().unwrap(), &[2, 4]);
    }

    #[test]
    fn engine_stops_within_its_budget() {
        use std::time::Instant;
        let mut config = SearchConfig::new();
        config.depth = 60;
        config.n_threads = 2;
        config.hash_size_mb = 4;
        config.move_time = Some(Duration::from_millis(50));
        let mut engine = Engine::new(config);
        engine.set_position(Board::new().after(Square::E6).unwrap());

        let tic = Instant::now();
        let report = engine.go().unwrap();
        assert!(report.interrupted);
        // cooperative cancellation: everything unwinds promptly
        assert!(Instant::now() - tic < Duration::from_secs(3));
    }

    #[test]
    fn pool_shuts_down_cleanly() {
        let pool = SearchPool::new(2);
        assert!(pool.has_idle());
        pool.shutdown();
        pool.shutdown(); // idempotent
    }
}
