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

//! Primary search algorithms.
//!
//! The midgame runs a principal-variation search: the first move of a node is
//! searched with the full window, every later sibling with the null window
//! `[alpha, alpha + 1]`, re-searching only on a fail-high. Stability,
//! transposition and enhanced-transposition cutoffs prune before any
//! recursion; probcut prunes probabilistically below the exact level. An
//! iterative-deepening driver walks the depths with aspiration windows and
//! hands over to the exact endgame solver once the depth reaches the empties
//! count.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use reverie_base::{
    movegen::flip,
    stability::stability_cutoff,
    Board, EmptiesList, Move, MoveList, Square, SCORE_INF, SCORE_MAX, SCORE_MIN,
};

use crate::{
    evaluate::{Eval, Weights},
    limit::SearchLimit,
    probcut::NO_SELECTIVITY,
    thread::{SearchPool, SplitPoint, SPLIT_MIN_DEPTH},
    transposition::{HashData, HashTable, StorePayload},
    SearchError,
};

/// Below this many empties, an exact-depth midgame search hands over to the
/// specialized endgame routines.
pub(crate) const DEPTH_MIDGAME_TO_ENDGAME: i32 = 13;

/// The minimum remaining depth for enhanced transposition cutoffs.
pub(crate) const MIN_ETC_DEPTH: i32 = 6;

/// Iterative deepening stops issuing midgame iterations this close to the
/// exact-solve horizon; the endgame solver takes over from there.
pub(crate) const ITERATIVE_MIN_EMPTIES: i32 = 10;

/// The starting half-width of an aspiration window, in discs.
const ASPIRATION_DELTA: i32 = 2;

/// How many node expansions pass between clock checks.
const POLL_INTERVAL: u32 = 1024;

/// A callback observing search progress: invoked with the state of the
/// search after every completed iteration and whenever the root best move
/// changes.
pub type Observer = Arc<dyn Fn(&SearchReport) + Send + Sync>;

#[derive(Clone, Debug)]
/// The result of a search, live or final.
pub struct SearchReport {
    /// The last completed depth.
    pub depth: i32,
    /// The selectivity of the last completed iteration.
    pub selectivity: u8,
    /// The score of the best move, in discs for the side to move.
    pub score: i32,
    /// The best move found, `Square::Pass` when the side must pass, or
    /// `Square::None` when the game is over.
    pub best_move: Square,
    /// The principal variation, starting with the best move.
    pub pv: Vec<Square>,
    /// The number of nodes searched, all workers included.
    pub n_nodes: u64,
    /// Wall-clock time since the search started.
    pub elapsed: Duration,
    /// Whether the search was cut short by the limit. The reported result is
    /// the last completed iteration's.
    pub interrupted: bool,
}

impl SearchReport {
    fn new() -> SearchReport {
        SearchReport {
            depth: 0,
            selectivity: NO_SELECTIVITY,
            score: 0,
            best_move: Square::None,
            pv: Vec::new(),
            n_nodes: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }
}

/// The per-worker search state. Every worker owns one exclusively; the
/// shared tables and flags are reached through the contained handles.
pub struct Search {
    /// The position under search, seen from the side to move.
    pub board: Board,
    /// The incremental evaluation state, kept in lockstep with `board`.
    pub eval: Eval,
    /// The empty squares of `board`, kept in lockstep with it.
    pub empties: EmptiesList,
    /// The 4-bit quadrant occupancy parity of the empty squares.
    pub parity: u8,
    /// The number of empty squares, cached from `empties`.
    pub n_empties: i32,
    /// The distance from the root of the search, in plies.
    pub height: u32,
    /// The active selectivity level, 0..=5.
    pub selectivity: u8,
    /// The number of nodes this worker expanded.
    pub n_nodes: u64,
    nodes_since_poll: u32,
    pub(crate) hash: Arc<HashTable>,
    pub(crate) pv_hash: Arc<HashTable>,
    pub(crate) weights: Arc<Weights>,
    pub(crate) limit: Arc<SearchLimit>,
    pub(crate) pool: Option<Arc<SearchPool>>,
    /// The nearest enclosing split point, if any; its chain of parents is
    /// polled for stop requests.
    pub(crate) split: Option<Arc<SplitPoint>>,
    /// Nodes contributed by helper workers, published when their jobs end.
    pub(crate) slave_nodes: Arc<AtomicU64>,
}

impl Search {
    #[must_use]
    /// Set up a search of `board`.
    pub fn new(
        board: &Board,
        hash: Arc<HashTable>,
        pv_hash: Arc<HashTable>,
        weights: Arc<Weights>,
        limit: Arc<SearchLimit>,
        pool: Option<Arc<SearchPool>>,
    ) -> Search {
        let empties = EmptiesList::new(board);
        Search {
            board: *board,
            eval: Eval::from_board(board),
            parity: empties.parity(),
            n_empties: empties.len() as i32,
            empties,
            height: 0,
            selectivity: NO_SELECTIVITY,
            n_nodes: 0,
            nodes_since_poll: 0,
            hash,
            pv_hash,
            weights,
            limit,
            pool,
            split: None,
            slave_nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    /// Copy this state for a helper worker attaching to `node`.
    pub(crate) fn fork(&self, node: &Arc<SplitPoint>) -> Search {
        Search {
            board: self.board,
            eval: self.eval,
            empties: self.empties.clone(),
            parity: self.parity,
            n_empties: self.n_empties,
            height: self.height,
            selectivity: self.selectivity,
            n_nodes: 0,
            nodes_since_poll: 0,
            hash: self.hash.clone(),
            pv_hash: self.pv_hash.clone(),
            weights: self.weights.clone(),
            limit: self.limit.clone(),
            pool: self.pool.clone(),
            split: Some(node.clone()),
            slave_nodes: self.slave_nodes.clone(),
        }
    }

    #[must_use]
    /// The total number of nodes searched below this search, helpers
    /// included.
    pub fn total_nodes(&self) -> u64 {
        self.n_nodes + self.slave_nodes.load(Ordering::Relaxed)
    }

    /// Poll the cooperative stop conditions: the shared limit and the stop
    /// points of every enclosing split node.
    pub(crate) fn check_stop(&mut self) -> Result<(), SearchError> {
        self.nodes_since_poll += 1;
        if self.nodes_since_poll >= POLL_INTERVAL {
            self.nodes_since_poll = 0;
            self.limit.add_nodes(u64::from(POLL_INTERVAL))?;
            self.limit.update_time()?;
        }
        if self.limit.is_over() {
            return Err(SearchError::Interrupt);
        }
        let mut cur = self.split.as_ref();
        while let Some(node) = cur {
            if node.is_stopped() {
                return Err(SearchError::Interrupt);
            }
            cur = node.parent();
        }
        Ok(())
    }

    /* State updates. The midgame variants keep the evaluation features in
    lockstep; the endgame variants skip them, since exact solving never
    evaluates. */

    pub(crate) fn make_move(&mut self, m: &Move) -> Board {
        let prev = self.board;
        self.board = prev.make_move(m.sq, m.flipped);
        self.eval.update(m.sq, m.flipped);
        self.empties.remove(m.sq);
        self.parity ^= m.sq.quadrant_mask();
        self.n_empties -= 1;
        self.height += 1;
        self.n_nodes += 1;
        prev
    }

    pub(crate) fn undo_move(&mut self, m: &Move, prev: Board) {
        self.board = prev;
        self.eval.restore(m.sq, m.flipped);
        self.empties.restore(m.sq);
        self.parity ^= m.sq.quadrant_mask();
        self.n_empties += 1;
        self.height -= 1;
    }

    pub(crate) fn make_move_endgame(&mut self, m: &Move) -> Board {
        let prev = self.board;
        self.board = prev.make_move(m.sq, m.flipped);
        self.empties.remove(m.sq);
        self.parity ^= m.sq.quadrant_mask();
        self.n_empties -= 1;
        self.height += 1;
        self.n_nodes += 1;
        prev
    }

    pub(crate) fn undo_move_endgame(&mut self, m: &Move, prev: Board) {
        self.board = prev;
        self.empties.restore(m.sq);
        self.parity ^= m.sq.quadrant_mask();
        self.n_empties += 1;
        self.height -= 1;
    }

    pub(crate) fn make_pass(&mut self) {
        self.board = self.board.pass();
        self.eval.pass();
        self.height += 1;
        self.n_nodes += 1;
    }

    pub(crate) fn undo_pass(&mut self) {
        self.board = self.board.pass();
        self.eval.pass();
        self.height -= 1;
    }

    pub(crate) fn make_pass_endgame(&mut self) {
        self.board = self.board.pass();
        self.height += 1;
        self.n_nodes += 1;
    }

    pub(crate) fn undo_pass_endgame(&mut self) {
        self.board = self.board.pass();
        self.height -= 1;
    }

    /* Leaf and near-leaf evaluation. */

    /// Evaluate the current position heuristically.
    pub(crate) fn evaluate_0(&mut self) -> i32 {
        self.eval.score(&self.weights, self.n_empties as u32)
    }

    /// Depth-1 search: the best static evaluation after one move.
    pub(crate) fn evaluate_1(&mut self, alpha: i32, beta: i32) -> i32 {
        let moves = self.board.moves();
        if moves.is_empty() {
            if self.board.pass().can_move() {
                self.make_pass();
                let score = -self.evaluate_1(-beta, -alpha);
                self.undo_pass();
                return score;
            }
            return self.board.final_score();
        }

        let mut best = -SCORE_INF;
        for sq in moves {
            let flipped = flip(sq, self.board.player, self.board.opponent);
            if flipped == self.board.opponent {
                return SCORE_MAX;
            }
            let m = Move::new(sq, flipped);
            let prev = self.make_move(&m);
            let score = -self.evaluate_0();
            self.undo_move(&m, prev);
            if score > best {
                best = score;
                if score >= beta {
                    break;
                }
            }
        }
        best
    }

    /// Depth-2 search with an alpha-beta window.
    pub(crate) fn evaluate_2(&mut self, mut alpha: i32, beta: i32) -> i32 {
        let moves = self.board.moves();
        if moves.is_empty() {
            if self.board.pass().can_move() {
                self.make_pass();
                let score = -self.evaluate_2(-beta, -alpha);
                self.undo_pass();
                return score;
            }
            return self.board.final_score();
        }

        let mut best = -SCORE_INF;
        for sq in moves {
            let flipped = flip(sq, self.board.player, self.board.opponent);
            let m = Move::new(sq, flipped);
            let prev = self.make_move(&m);
            let score = -self.evaluate_1(-beta, -alpha);
            self.undo_move(&m, prev);
            if score > best {
                best = score;
                if score >= beta {
                    break;
                }
                if score > alpha {
                    alpha = score;
                }
            }
        }
        best
    }

    /// Probe both transposition tables, PV table first.
    pub(crate) fn probe_hash(&self, hash_code: u64) -> HashData {
        let data = self.pv_hash.get(&self.board, hash_code);
        if data != HashData::UNSET {
            return data;
        }
        self.hash.get(&self.board, hash_code)
    }

    /// Enhanced transposition cutoff: probe the children of this node; if one
    /// of them already proves a fail-high, take the cutoff without recursing.
    fn etc_nws(
        &mut self,
        list: &MoveList,
        hash_code: u64,
        depth: i32,
        alpha: i32,
    ) -> Option<i32> {
        let beta = alpha + 1;
        for m in list.iter() {
            let next = self.board.make_move(m.sq, m.flipped);
            self.n_nodes += 1;
            let data = self.hash.get(&next, next.hash());
            if data != HashData::UNSET
                && i32::from(data.depth) >= depth - 1
                && data.selectivity >= self.selectivity
            {
                let score = -i32::from(data.upper);
                if score >= beta {
                    let payload = StorePayload {
                        depth: depth as u8,
                        selectivity: self.selectivity,
                        cost: 0,
                        alpha,
                        beta,
                        score,
                        mov: m.sq,
                    };
                    self.hash.store(&self.board, hash_code, &payload);
                    return Some(score);
                }
            }
        }
        None
    }

    /// Null-window midgame search: establish whether the score exceeds
    /// `alpha`, at the given remaining depth.
    pub fn nws_midgame(&mut self, alpha: i32, depth: i32) -> Result<i32, SearchError> {
        debug_assert!((SCORE_MIN..SCORE_MAX).contains(&alpha));
        self.check_stop()?;

        if depth == self.n_empties && depth < DEPTH_MIDGAME_TO_ENDGAME {
            return self.nws_endgame(alpha);
        }
        match depth {
            0 => return Ok(self.evaluate_0()),
            1 => return Ok(self.evaluate_1(alpha, alpha + 1)),
            2 => return Ok(self.evaluate_2(alpha, alpha + 1)),
            _ => (),
        }

        if let Some(score) = stability_cutoff(&self.board, self.n_empties as u32, alpha) {
            return Ok(score);
        }

        let hash_code = self.board.hash();
        let data = self.probe_hash(hash_code);
        if i32::from(data.depth) >= depth && data.selectivity >= self.selectivity {
            let (lower, upper) = (i32::from(data.lower), i32::from(data.upper));
            if upper <= alpha {
                return Ok(upper);
            }
            if lower > alpha {
                return Ok(lower);
            }
        }

        if let Some(score) = self.probcut(alpha, depth)? {
            return Ok(score);
        }

        let mut list = MoveList::new(&self.board);
        if list.is_empty() {
            if self.board.pass().can_move() {
                self.make_pass();
                let r = self.nws_midgame(-alpha - 1, depth);
                self.undo_pass();
                return Ok(-r?);
            }
            return Ok(self.board.final_score());
        }
        if list.wipeout(&self.board).is_some() {
            return Ok(SCORE_MAX);
        }

        if depth >= MIN_ETC_DEPTH {
            if let Some(score) = self.etc_nws(&list, hash_code, depth, alpha) {
                return Ok(score);
            }
        }

        self.evaluate_moves(&mut list, [data.move_0(), data.move_1()], depth)?;

        let nodes_before = self.n_nodes;
        let mut best_score = -SCORE_INF;
        let mut best_move = Square::None;
        let mut idx = 0;
        while idx < list.len() {
            // the full list never needs sorting: select the best remaining
            list.next_best(idx);
            if idx >= 1 && depth >= SPLIT_MIN_DEPTH {
                if let Some(out) =
                    self.split(&list, idx, alpha, alpha + 1, depth, false, best_score, best_move)?
                {
                    if out.score > best_score {
                        best_score = out.score;
                        best_move = out.best_move;
                    }
                    break;
                }
            }
            let m = list[idx];
            let prev = self.make_move(&m);
            let r = self.nws_midgame(-alpha - 1, depth - 1);
            self.undo_move(&m, prev);
            let score = -r?;
            if score > best_score {
                best_score = score;
                best_move = m.sq;
                if score > alpha {
                    break;
                }
            }
            idx += 1;
        }

        let cost = (self.n_nodes - nodes_before).max(1).ilog2() as u8;
        let payload = StorePayload {
            depth: depth as u8,
            selectivity: self.selectivity,
            cost,
            alpha,
            beta: alpha + 1,
            score: best_score,
            mov: best_move,
        };
        self.hash.store(&self.board, hash_code, &payload);

        Ok(best_score)
    }

    /// Principal-variation midgame search. Returns the score of the position
    /// in the window `(alpha, beta)`, writing the principal variation into
    /// `line` whenever a best move is established.
    pub fn pvs_midgame(
        &mut self,
        mut alpha: i32,
        beta: i32,
        depth: i32,
        line: &mut Vec<Square>,
    ) -> Result<i32, SearchError> {
        debug_assert!(SCORE_MIN <= alpha && alpha < beta && beta <= SCORE_MAX);
        self.check_stop()?;

        if depth >= self.n_empties {
            return self.pvs_endgame(alpha, beta, line);
        }
        if depth == 0 {
            return Ok(self.evaluate_0());
        }

        let mut list = MoveList::new(&self.board);
        if list.is_empty() {
            if self.board.pass().can_move() {
                self.make_pass();
                let mut child_line = Vec::new();
                let r = self.pvs_midgame(-beta, -alpha, depth, &mut child_line);
                self.undo_pass();
                let score = -r?;
                write_line(line, Square::Pass, &child_line);
                return Ok(score);
            }
            return Ok(self.board.final_score());
        }
        if let Some(m) = list.wipeout(&self.board) {
            write_line(line, m.sq, &[]);
            return Ok(SCORE_MAX);
        }

        let hash_code = self.board.hash();
        // the hash is probed for move ordering only: PV nodes never take
        // transposition cutoffs, so the variation stays intact
        let data = self.probe_hash(hash_code);
        self.evaluate_moves(&mut list, [data.move_0(), data.move_1()], depth)?;
        list.sort();

        let nodes_before = self.n_nodes;
        let alpha_in = alpha;
        let mut best_score = -SCORE_INF;
        let mut best_move = Square::None;
        let mut idx = 0;
        while idx < list.len() {
            if idx >= 1 && depth >= SPLIT_MIN_DEPTH {
                if let Some(out) =
                    self.split(&list, idx, alpha, beta, depth, false, best_score, best_move)?
                {
                    if out.score > best_score {
                        best_score = out.score;
                        best_move = out.best_move;
                        if let Some(l) = out.line {
                            *line = l;
                        }
                    }
                    alpha = alpha.max(out.alpha);
                    break;
                }
            }
            let m = list[idx];
            let mut child_line = Vec::new();
            let prev = self.make_move(&m);
            let r = if idx == 0 {
                self.pvs_midgame(-beta, -alpha, depth - 1, &mut child_line)
            } else {
                let r = self.nws_midgame(-alpha - 1, depth - 1);
                match r {
                    Ok(s) if alpha < -s && -s < beta => {
                        // the null window failed high: establish the exact
                        // score with a full re-search
                        self.pvs_midgame(-beta, -alpha, depth - 1, &mut child_line)
                    }
                    other => other,
                }
            };
            self.undo_move(&m, prev);
            let score = -r?;
            if score > best_score {
                best_score = score;
                best_move = m.sq;
                write_line(line, m.sq, &child_line);
                if score > alpha {
                    if score >= beta {
                        break;
                    }
                    alpha = score;
                }
            }
            idx += 1;
        }

        let cost = (self.n_nodes - nodes_before).max(1).ilog2() as u8;
        let payload = StorePayload {
            depth: depth as u8,
            selectivity: self.selectivity,
            cost,
            alpha: alpha_in,
            beta,
            score: best_score,
            mov: best_move,
        };
        self.hash.store(&self.board, hash_code, &payload);
        self.pv_hash.store(&self.board, hash_code, &payload);

        Ok(best_score)
    }

    /// Run one depth of iterative deepening with an aspiration window around
    /// the previous score, widening on failure until the score is inside.
    fn aspiration(
        &mut self,
        depth: i32,
        exact: bool,
        prev: Option<i32>,
    ) -> Result<(i32, Vec<Square>), SearchError> {
        let (mut alpha, mut beta) = match prev {
            None => (SCORE_MIN, SCORE_MAX),
            Some(p) => (
                (p - ASPIRATION_DELTA).max(SCORE_MIN),
                (p + ASPIRATION_DELTA).min(SCORE_MAX),
            ),
        };
        let mut delta = ASPIRATION_DELTA;
        loop {
            let mut line = Vec::new();
            let score = if exact {
                self.pvs_endgame(alpha, beta, &mut line)?
            } else {
                self.pvs_midgame(alpha, beta, depth, &mut line)?
            };
            if score <= alpha && alpha > SCORE_MIN {
                alpha = (score - delta).max(SCORE_MIN);
                delta += delta;
            } else if score >= beta && beta < SCORE_MAX {
                beta = (score + delta).min(SCORE_MAX);
                delta += delta;
            } else {
                return Ok((score, line));
            }
        }
    }

    /// Drive the search: iterative deepening through the midgame, then the
    /// exact endgame with a selectivity ramp when the requested depth covers
    /// the empties. Returns the final (or last completed) result.
    pub fn iterate(&mut self, target_depth: i32, observer: Option<&Observer>) -> SearchReport {
        let mut report = SearchReport::new();
        report.selectivity = self.selectivity;
        let requested_selectivity = self.selectivity;

        // the empty opening board has no theory worth computing: play anything
        if self.n_empties == 60 && self.board.can_move() {
            let choices: Vec<Square> = self.board.moves().collect();
            report.best_move = choices[fastrand::usize(..choices.len())];
            report.pv = vec![report.best_move];
            self.finish_report(&mut report);
            notify(observer, &report);
            return report;
        }

        if !self.board.can_move() {
            return self.iterate_no_move(target_depth, observer);
        }

        let exact = target_depth >= self.n_empties;
        let midgame_target = if exact {
            (self.n_empties - ITERATIVE_MIN_EMPTIES).max(0)
        } else {
            target_depth
        };

        let mut prev_score = None;
        let mut depth = 2.min(midgame_target);
        while depth >= 1 && depth <= midgame_target {
            match self.aspiration(depth, false, prev_score) {
                Ok((score, line)) => {
                    prev_score = Some(score);
                    report.depth = depth;
                    report.selectivity = self.selectivity;
                    report.score = score;
                    if let Some(&first) = line.first() {
                        report.best_move = first;
                    }
                    report.pv = line;
                    self.finish_report(&mut report);
                    notify(observer, &report);
                }
                Err(_) => {
                    report.interrupted = true;
                    break;
                }
            }
            if depth >= midgame_target {
                break;
            }
            depth = (depth + 2).min(midgame_target);
        }

        if exact && !report.interrupted {
            for selectivity in 0..=requested_selectivity {
                self.selectivity = selectivity;
                match self.aspiration(self.n_empties, true, prev_score) {
                    Ok((score, line)) => {
                        prev_score = Some(score);
                        report.depth = self.n_empties;
                        report.selectivity = selectivity;
                        report.score = score;
                        if let Some(&first) = line.first() {
                            report.best_move = first;
                        }
                        report.pv = line;
                        self.finish_report(&mut report);
                        notify(observer, &report);
                    }
                    Err(_) => {
                        report.interrupted = true;
                        break;
                    }
                }
            }
            self.selectivity = requested_selectivity;
        }

        self.finish_report(&mut report);
        report
    }

    /// Handle a root position where the side to move cannot play: either the
    /// game is over, or the only "move" is a pass.
    fn iterate_no_move(&mut self, target_depth: i32, observer: Option<&Observer>) -> SearchReport {
        let mut report = SearchReport::new();
        report.selectivity = self.selectivity;

        if self.board.is_game_over() {
            report.score = self.board.final_score();
            report.depth = 0;
            self.finish_report(&mut report);
            notify(observer, &report);
            return report;
        }

        self.make_pass();
        let target = target_depth.min(self.n_empties).max(1);
        let mut line = Vec::new();
        let r = if target >= self.n_empties {
            self.pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line)
        } else {
            self.pvs_midgame(SCORE_MIN, SCORE_MAX, target, &mut line)
        };
        self.undo_pass();

        match r {
            Ok(score) => {
                report.score = -score;
                report.depth = target;
                report.best_move = Square::Pass;
                let mut pv = vec![Square::Pass];
                pv.extend(line);
                report.pv = pv;
            }
            Err(_) => report.interrupted = true,
        }
        self.finish_report(&mut report);
        notify(observer, &report);
        report
    }

    /// Fill the bookkeeping fields of a report from the current counters.
    fn finish_report(&self, report: &mut SearchReport) {
        report.n_nodes = self.total_nodes();
        report.elapsed = self.limit.elapsed().unwrap_or(Duration::ZERO);
    }
}

/// Invoke the observer, if one is installed.
fn notify(observer: Option<&Observer>, report: &SearchReport) {
    if let Some(obs) = observer {
        obs(report);
    }
}

/// Replace `parent_line` with `sq` followed by `line`.
pub(crate) fn write_line(parent_line: &mut Vec<Square>, sq: Square, line: &[Square]) {
    parent_line.clear();
    parent_line.push(sq);
    parent_line.extend_from_slice(line);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::SearchConfig;

    /// Build a standalone search over small tables, with `n_threads - 1`
    /// helper workers.
    pub(crate) fn test_search(board: &Board, n_threads: usize) -> Search {
        let hash = Arc::new(HashTable::new(2, n_threads));
        let pv_hash = Arc::new(HashTable::new(1, n_threads));
        hash.new_search();
        pv_hash.new_search();
        let pool = if n_threads > 1 {
            Some(SearchPool::new(n_threads - 1))
        } else {
            None
        };
        Search::new(
            board,
            hash,
            pv_hash,
            Arc::new(Weights::positional()),
            Arc::new(SearchLimit::new()),
            pool,
        )
    }

    /// A plain fixed-depth negamax over the same evaluation, as a reference
    /// for search equivalence tests. Passes do not consume depth, matching
    /// the search proper.
    fn reference_negamax(search: &mut Search, depth: i32) -> i32 {
        if depth == 0 {
            return search.evaluate_0();
        }
        let list = MoveList::new(&search.board);
        if list.is_empty() {
            if search.board.pass().can_move() {
                search.make_pass();
                let score = -reference_negamax(search, depth);
                search.undo_pass();
                return score;
            }
            return search.board.final_score();
        }
        let mut best = -SCORE_INF;
        for m in list.iter() {
            // the search proper short-circuits wipeouts; mirror that here
            if m.flipped == search.board.opponent {
                best = best.max(SCORE_MAX);
                continue;
            }
            let prev = search.make_move(m);
            let score = -reference_negamax(search, depth - 1);
            search.undo_move(m, prev);
            best = best.max(score);
        }
        best
    }

    fn played_out(line: &[Square]) -> Board {
        let mut board = Board::new();
        for &sq in line {
            board = board.after(sq).unwrap();
        }
        board
    }

    #[test]
    fn depth_one_matches_reference() {
        let board = played_out(&[Square::F5, Square::D6]);
        let mut search = test_search(&board, 1);
        let reference = reference_negamax(&mut search, 1);
        assert_eq!(search.evaluate_1(-SCORE_INF, SCORE_INF), reference);
    }

    #[test]
    fn pvs_matches_reference_at_fixed_depth() {
        let positions = [
            vec![],
            vec![Square::F5],
            vec![Square::F5, Square::D6, Square::C3],
            vec![Square::F5, Square::F6, Square::E6, Square::F4],
        ];
        for line in positions {
            let board = played_out(&line);
            for depth in 1..=4 {
                let mut search = test_search(&board, 1);
                let reference = reference_negamax(&mut search, depth);
                let mut pv = Vec::new();
                let score = search
                    .pvs_midgame(SCORE_MIN, SCORE_MAX, depth, &mut pv)
                    .unwrap();
                assert_eq!(
                    score, reference,
                    "depth {depth} mismatch after opening {line:?}"
                );
                assert!(!pv.is_empty());
            }
        }
    }

    #[test]
    fn null_window_brackets_the_true_score() {
        let board = played_out(&[Square::F5, Square::D6, Square::C3, Square::D3]);
        let depth = 4;
        let mut search = test_search(&board, 1);
        let truth = reference_negamax(&mut search, depth);
        for alpha in [-10, -3, 0, 3, 10] {
            let mut search = test_search(&board, 1);
            let v = search.nws_midgame(alpha, depth).unwrap();
            if v <= alpha {
                assert!(truth <= alpha, "fail-low at {alpha} but truth is {truth}");
            } else {
                assert!(truth >= alpha + 1, "fail-high at {alpha} but truth is {truth}");
            }
        }
    }

    #[test]
    fn iterate_finds_an_opening_move() {
        let board = played_out(&[Square::F5]);
        let mut search = test_search(&board, 1);
        search.limit.start().unwrap();
        let report = search.iterate(6, None);
        assert!(!report.interrupted);
        assert_eq!(report.depth, 6);
        assert!(board.moves().contains(report.best_move));
        assert_eq!(report.pv.first(), Some(&report.best_move));
        assert!(report.n_nodes > 0);
    }

    #[test]
    fn iterate_reports_game_over() {
        let s = "X".repeat(64) + " X";
        let board: Board = s.parse().unwrap();
        let mut search = test_search(&board, 1);
        search.limit.start().unwrap();
        let report = search.iterate(10, None);
        assert_eq!(report.score, 64);
        assert_eq!(report.best_move, Square::None);
    }

    #[test]
    fn iterate_reports_forced_pass() {
        // the side to move has no move, the opponent does
        let board = Board {
            player: Square::B1.bitboard() | Square::C1.bitboard(),
            opponent: Square::A1.bitboard(),
        };
        let passed = board.pass();
        assert!(!board.can_move());
        assert!(passed.can_move());
        let mut search = test_search(&board, 1);
        search.limit.start().unwrap();
        let report = search.iterate(2, None);
        assert_eq!(report.best_move, Square::Pass);
    }

    #[test]
    fn observer_sees_each_iteration() {
        use std::sync::Mutex;
        let board = played_out(&[Square::F5, Square::D6]);
        let mut search = test_search(&board, 1);
        search.limit.start().unwrap();
        let depths: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = depths.clone();
        let observer: Observer = Arc::new(move |r: &SearchReport| {
            sink.lock().unwrap().push(r.depth);
        });
        search.iterate(6, Some(&observer));
        let seen = depths.lock().unwrap();
        assert_eq!(&*seen, &[2, 4, 6]);
    }

    #[test]
    fn cancelled_search_returns_quickly() {
        use std::time::Instant;
        let board = played_out(&[Square::F5]);
        let mut search = test_search(&board, 1);
        search
            .limit
            .set_move_time(Some(Duration::from_millis(20)))
            .unwrap();
        search.limit.start().unwrap();
        let tic = Instant::now();
        let report = search.iterate(60, None);
        assert!(report.interrupted);
        assert!(Instant::now() - tic < Duration::from_secs(2));
    }

    #[test]
    #[ignore = "exact-solve acceptance gate; point REVERIE_FFO at an OBF problem file"]
    fn ffo_acceptance_suite() {
        // The classic FFO endgame suite: each OBF line holds a board string
        // followed by `move:score` fields listing the optimal moves. Solving
        // them exactly is the acceptance gate for the endgame engine.
        let path = std::env::var("REVERIE_FFO").expect("REVERIE_FFO must name an OBF file");
        let text = std::fs::read_to_string(path).expect("cannot read the OBF file");
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(';');
            let Ok((board, _)) = Board::from_board_string(fields.next().unwrap()) else {
                continue;
            };
            let mut expected_score = None;
            let mut best_moves = Vec::new();
            for field in fields {
                let mut parts = field.trim().split(':');
                let (Some(mv), Some(score)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let Ok(mv) = mv.trim().parse::<Square>() else {
                    continue;
                };
                let Ok(score) = score.trim().trim_start_matches('+').parse::<i32>() else {
                    continue;
                };
                let best = *expected_score.get_or_insert(score);
                if score == best {
                    best_moves.push(mv);
                }
            }
            let Some(expected) = expected_score else {
                continue;
            };

            let mut search = test_search(&board, 1);
            search.limit.start().unwrap();
            let report = search.iterate(board.n_empties() as i32, None);
            assert_eq!(report.score, expected, "score mismatch on: {line}");
            assert!(
                best_moves.contains(&report.best_move),
                "move {} not optimal on: {line}",
                report.best_move
            );
        }
    }

    #[test]
    fn config_default_is_sane() {
        let config = SearchConfig::default();
        assert!(config.depth > 0);
        assert!(config.n_threads >= 1);
        assert_eq!(config.selectivity, NO_SELECTIVITY);
    }
}
