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

//! Exact endgame solving.
//!
//! Once the search depth covers the empty squares, scores become exact disc
//! differences and the engine switches to solvers specialized by the number
//! of empties: dedicated routines for the last one to four squares, a
//! parity-ordered walk of the empties list below
//! [`DEPTH_TO_SHALLOW_SEARCH`], and a movelist-driven null-window search with
//! hash table, probcut and work splitting above it. Stability cutoffs are
//! checked aggressively throughout, since endgame bounds are exact.

use reverie_base::{
    movegen::{self, flip, NEIGHBOUR},
    stability::stability_cutoff,
    Board, Move, MoveList, Square, SCORE_INF, SCORE_MAX, SCORE_MIN,
};

use crate::{
    search::{write_line, Search, MIN_ETC_DEPTH},
    thread::SPLIT_MIN_DEPTH,
    transposition::StorePayload,
    SearchError,
};

/// Below this many empties, the endgame walks the empties list directly
/// instead of generating and ordering a move list.
pub(crate) const DEPTH_TO_SHALLOW_SEARCH: i32 = 7;

/// Solve a position with exactly one empty square `x`: whoever can play
/// there does; if neither side can, the board is scored as it stands.
fn board_score_1(board: &Board, x: Square) -> i32 {
    let p = i32::from(board.player.len());
    let flipped = flip(x, board.player, board.opponent);
    if !flipped.is_empty() {
        return 2 * p + 2 * i32::from(flipped.len()) - 62;
    }
    let flipped = flip(x, board.opponent, board.player);
    if !flipped.is_empty() {
        return 2 * p - 2 * i32::from(flipped.len()) - 64;
    }
    board.final_score()
}

/// Order three squares so those in odd-parity quadrants come first,
/// preserving the preference order otherwise.
fn sort3_by_parity(parity: u8, x1: Square, x2: Square, x3: Square) -> (Square, Square, Square) {
    let mut v = [x1, x2, x3];
    v.sort_by_key(|x| parity & x.quadrant_mask() == 0);
    (v[0], v[1], v[2])
}

impl Search {
    /// Null-window solve with two empties `x1`, `x2` on `b`.
    fn solve_2(&mut self, b: &Board, alpha: i32, x1: Square, x2: Square) -> i32 {
        let beta = alpha + 1;
        let mut best = -SCORE_INF;

        let flipped = flip(x1, b.player, b.opponent);
        if !flipped.is_empty() {
            self.n_nodes += 1;
            best = -board_score_1(&b.make_move(x1, flipped), x2);
            if best >= beta {
                return best;
            }
        }
        let flipped = flip(x2, b.player, b.opponent);
        if !flipped.is_empty() {
            self.n_nodes += 1;
            let score = -board_score_1(&b.make_move(x2, flipped), x1);
            if score > best {
                best = score;
            }
        }

        if best == -SCORE_INF {
            if movegen::can_move(b.opponent, b.player) {
                self.n_nodes += 1;
                best = -self.solve_2(&b.pass(), -beta, x1, x2);
            } else {
                best = b.final_score();
            }
        }
        best
    }

    /// Null-window solve with three empties, trying odd-parity quadrants
    /// first.
    fn solve_3(
        &mut self,
        b: &Board,
        alpha: i32,
        parity: u8,
        x1: Square,
        x2: Square,
        x3: Square,
    ) -> i32 {
        let (x1, x2, x3) = sort3_by_parity(parity, x1, x2, x3);
        let beta = alpha + 1;
        let mut best = -SCORE_INF;

        for (xa, xb, xc) in [(x1, x2, x3), (x2, x1, x3), (x3, x1, x2)] {
            let flipped = flip(xa, b.player, b.opponent);
            if !flipped.is_empty() {
                self.n_nodes += 1;
                let next = b.make_move(xa, flipped);
                let score = -self.solve_2(&next, -beta, xb, xc);
                if score > best {
                    best = score;
                    if score >= beta {
                        return best;
                    }
                }
            }
        }

        if best == -SCORE_INF {
            if movegen::can_move(b.opponent, b.player) {
                self.n_nodes += 1;
                best = -self.solve_3(&b.pass(), -beta, parity, x1, x2, x3);
            } else {
                best = b.final_score();
            }
        }
        best
    }

    /// Null-window solve with four empties, ordered by quadrant parity.
    fn solve_4(&mut self, alpha: i32) -> i32 {
        if let Some(score) = stability_cutoff(&self.board, 4, alpha) {
            return score;
        }

        let mut xs = [Square::None; 4];
        for (slot, sq) in xs.iter_mut().zip(self.empties.iter()) {
            *slot = sq;
        }
        // odd-parity quadrants first, keeping the preference order otherwise
        let parity = self.parity;
        xs.sort_by_key(|x| parity & x.quadrant_mask() == 0);

        let b = self.board;
        let beta = alpha + 1;
        let mut best = -SCORE_INF;
        for i in 0..4 {
            let xa = xs[i];
            let flipped = flip(xa, b.player, b.opponent);
            if flipped.is_empty() {
                continue;
            }
            self.n_nodes += 1;
            let rest = match i {
                0 => [xs[1], xs[2], xs[3]],
                1 => [xs[0], xs[2], xs[3]],
                2 => [xs[0], xs[1], xs[3]],
                _ => [xs[0], xs[1], xs[2]],
            };
            let next = b.make_move(xa, flipped);
            let score = -self.solve_3(
                &next,
                -beta,
                parity ^ xa.quadrant_mask(),
                rest[0],
                rest[1],
                rest[2],
            );
            if score > best {
                best = score;
                if score >= beta {
                    return best;
                }
            }
        }

        if best == -SCORE_INF {
            if movegen::can_move(b.opponent, b.player) {
                self.make_pass_endgame();
                best = -self.solve_4(-beta);
                self.undo_pass_endgame();
            } else {
                best = b.final_score();
            }
        }
        best
    }

    /// Null-window endgame solve with few empties: walk the empties list in
    /// two parity passes, odd quadrants first, with the neighbour pre-filter
    /// standing in for move generation.
    fn nws_endgame_shallow(&mut self, alpha: i32) -> Result<i32, SearchError> {
        let beta = alpha + 1;
        let parity0 = self.parity;
        // snapshot the list: the recursion below unlinks squares
        let mut buf = [Square::None; 8];
        let mut n = 0;
        for sq in self.empties.iter() {
            buf[n] = sq;
            n += 1;
        }

        let mut best = -SCORE_INF;
        'phases: for phase in [1u8, 0u8] {
            for &sq in &buf[..n] {
                let in_odd = parity0 & sq.quadrant_mask() != 0;
                if (phase == 1) != in_odd {
                    continue;
                }
                if (NEIGHBOUR[sq.index()] & self.board.opponent).is_empty() {
                    continue;
                }
                let flipped = flip(sq, self.board.player, self.board.opponent);
                if flipped.is_empty() {
                    continue;
                }
                let m = Move::new(sq, flipped);
                let prev = self.make_move_endgame(&m);
                let r = self.nws_endgame(-beta);
                self.undo_move_endgame(&m, prev);
                let score = -r?;
                if score > best {
                    best = score;
                    if score >= beta {
                        break 'phases;
                    }
                }
            }
        }

        if best == -SCORE_INF {
            if movegen::can_move(self.board.opponent, self.board.player) {
                self.make_pass_endgame();
                let r = self.nws_endgame(-beta);
                self.undo_pass_endgame();
                return Ok(-r?);
            }
            return Ok(self.board.final_score());
        }
        Ok(best)
    }

    /// Null-window exact solve of the current position: establish whether the
    /// final score exceeds `alpha`.
    pub fn nws_endgame(&mut self, alpha: i32) -> Result<i32, SearchError> {
        debug_assert!((SCORE_MIN..SCORE_MAX).contains(&alpha));
        match self.n_empties {
            0 => return Ok(self.board.final_score()),
            1 => {
                self.n_nodes += 1;
                return Ok(board_score_1(&self.board, self.empties.first()));
            }
            2 => {
                let mut it = self.empties.iter();
                let x1 = it.next().unwrap_or(Square::None);
                let x2 = it.next().unwrap_or(Square::None);
                let b = self.board;
                return Ok(self.solve_2(&b, alpha, x1, x2));
            }
            3 => {
                let mut it = self.empties.iter();
                let x1 = it.next().unwrap_or(Square::None);
                let x2 = it.next().unwrap_or(Square::None);
                let x3 = it.next().unwrap_or(Square::None);
                let (b, parity) = (self.board, self.parity);
                return Ok(self.solve_3(&b, alpha, parity, x1, x2, x3));
            }
            4 => return Ok(self.solve_4(alpha)),
            _ => (),
        }

        self.check_stop()?;
        if let Some(score) = stability_cutoff(&self.board, self.n_empties as u32, alpha) {
            return Ok(score);
        }
        if self.n_empties < DEPTH_TO_SHALLOW_SEARCH {
            return self.nws_endgame_shallow(alpha);
        }

        let depth = self.n_empties;
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
                let r = self.nws_endgame(-alpha - 1);
                self.undo_pass();
                return Ok(-r?);
            }
            return Ok(self.board.final_score());
        }
        if list.wipeout(&self.board).is_some() {
            return Ok(SCORE_MAX);
        }

        if depth >= MIN_ETC_DEPTH {
            if let Some(score) = self.etc_endgame(&list, hash_code, depth, alpha) {
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
                    self.split(&list, idx, alpha, alpha + 1, depth, true, best_score, best_move)?
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
            let r = self.nws_endgame(-alpha - 1);
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

    /// Enhanced transposition cutoff over the children of an endgame node.
    fn etc_endgame(
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
            if data != crate::transposition::HashData::UNSET
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

    /// Principal-variation exact solve of the current position, writing the
    /// variation into `line`.
    pub fn pvs_endgame(
        &mut self,
        mut alpha: i32,
        beta: i32,
        line: &mut Vec<Square>,
    ) -> Result<i32, SearchError> {
        debug_assert!(SCORE_MIN <= alpha && alpha < beta && beta <= SCORE_MAX);
        self.check_stop()?;

        if self.n_empties == 0 {
            return Ok(self.board.final_score());
        }

        let mut list = MoveList::new(&self.board);
        if list.is_empty() {
            if self.board.pass().can_move() {
                self.make_pass();
                let mut child_line = Vec::new();
                let r = self.pvs_endgame(-beta, -alpha, &mut child_line);
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
        let data = self.probe_hash(hash_code);
        self.evaluate_moves(&mut list, [data.move_0(), data.move_1()], self.n_empties)?;
        list.sort();

        let depth = self.n_empties;
        let nodes_before = self.n_nodes;
        let alpha_in = alpha;
        let mut best_score = -SCORE_INF;
        let mut best_move = Square::None;
        let mut idx = 0;
        while idx < list.len() {
            if idx >= 1 && depth >= SPLIT_MIN_DEPTH {
                if let Some(out) =
                    self.split(&list, idx, alpha, beta, depth, true, best_score, best_move)?
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
                self.pvs_endgame(-beta, -alpha, &mut child_line)
            } else {
                let r = self.nws_endgame(-alpha - 1);
                match r {
                    Ok(s) if alpha < -s && -s < beta => {
                        self.pvs_endgame(-beta, -alpha, &mut child_line)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::test_search;

    /// Exact reference solver: plain negamax to the end of the game.
    fn reference_solve(board: &Board) -> i32 {
        let list = MoveList::new(board);
        if list.is_empty() {
            if board.pass().can_move() {
                return -reference_solve(&board.pass());
            }
            return board.final_score();
        }
        let mut best = -SCORE_INF;
        for m in list.iter() {
            best = best.max(-reference_solve(&board.make_move(m.sq, m.flipped)));
        }
        best
    }

    /// Play random legal moves until exactly `n_empties` squares remain.
    /// Retries until a playout survives that long.
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
    fn one_empty_scores() {
        // player fills everything except H8 and wins it all
        let s = "X".repeat(63) + "- X";
        let board: Board = s.parse().unwrap();
        let mut search = test_search(&board, 1);
        // X cannot play H8 (nothing to flip), O cannot either: 63 vs 0 discs,
        // the empty goes to the winner
        assert_eq!(search.nws_endgame(0).unwrap(), 64);
    }

    #[test]
    fn one_empty_matches_reference() {
        let mut rng = fastrand::Rng::with_seed(0xE0D);
        for _ in 0..20 {
            let board = random_position(&mut rng, 1);
            let mut search = test_search(&board, 1);
            let truth = reference_solve(&board);
            let v = search.nws_endgame(0).unwrap();
            if v <= 0 {
                assert!(truth <= 0);
            } else {
                assert!(truth >= 1);
            }
            let mut line = Vec::new();
            assert_eq!(
                search.pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line).unwrap(),
                truth
            );
        }
    }

    #[test]
    fn few_empties_match_reference() {
        let mut rng = fastrand::Rng::with_seed(0x5EED5);
        for n_empties in 2..=8 {
            for _ in 0..6 {
                let board = random_position(&mut rng, n_empties);
                let truth = reference_solve(&board);
                let mut search = test_search(&board, 1);
                let mut line = Vec::new();
                let score = search.pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line).unwrap();
                assert_eq!(score, truth, "solve mismatch at {n_empties} empties");
            }
        }
    }

    #[test]
    fn null_window_solves_bracket_reference() {
        let mut rng = fastrand::Rng::with_seed(0xBEEF);
        for _ in 0..10 {
            let board = random_position(&mut rng, 6);
            let truth = reference_solve(&board);
            for alpha in [-6, -2, 0, 2, 6] {
                let mut search = test_search(&board, 1);
                let v = search.nws_endgame(alpha).unwrap();
                if v <= alpha {
                    assert!(truth <= alpha, "fail-low at {alpha}, truth {truth}");
                } else {
                    assert!(truth >= alpha + 1, "fail-high at {alpha}, truth {truth}");
                }
            }
        }
    }

    #[test]
    fn deeper_solve_matches_reference() {
        let mut rng = fastrand::Rng::with_seed(0xD00D);
        for _ in 0..3 {
            let board = random_position(&mut rng, 10);
            let truth = reference_solve(&board);
            let mut search = test_search(&board, 1);
            let mut line = Vec::new();
            let score = search.pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line).unwrap();
            assert_eq!(score, truth);
            assert!(!line.is_empty());
            // the PV's first move must be legal
            assert!(board.moves().contains(line[0]) || line[0] == Square::Pass);
        }
    }

    #[test]
    fn solver_state_is_restored() {
        let mut rng = fastrand::Rng::with_seed(0xABC);
        let board = random_position(&mut rng, 9);
        let mut search = test_search(&board, 1);
        let empties_before: Vec<Square> = search.empties.iter().collect();
        let parity_before = search.parity;
        let mut line = Vec::new();
        search.pvs_endgame(SCORE_MIN, SCORE_MAX, &mut line).unwrap();
        assert_eq!(search.board, board);
        assert_eq!(search.n_empties, 9);
        assert_eq!(search.parity, parity_before);
        let empties_after: Vec<Square> = search.empties.iter().collect();
        assert_eq!(empties_before, empties_after);
    }
}
