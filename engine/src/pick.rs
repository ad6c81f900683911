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

//! Move ordering.
//!
//! Alpha-beta search only performs when the best moves come first, so every
//! candidate gets a weight before the move loop runs. The weight chain, from
//! strongest to weakest claim: wipeout, the two hash moves, mobility denied
//! to the opponent, a shallow search of the child, edge stability gained,
//! potential mobility denied, quadrant parity, and finally the square's
//! positional value. Shallow searching is reserved for nodes deep enough to
//! repay the effort.

use reverie_base::{movegen, stability, MoveList, Square, SCORE_INF, SCORE_MAX};

use crate::{search::Search, transposition::HashData, SearchError};

/// A move that wipes out the opponent ends the game on the spot.
const W_WIPEOUT: i32 = 1 << 30;
/// The hash entry's best move.
const W_HASH_BEST: i32 = 1 << 29;
/// The hash entry's second move.
const W_HASH_SECOND: i32 = 1 << 28;
/// Weight per unit of mobility denied to the opponent.
const W_MOBILITY: i32 = 1 << 15;
/// Weight per point of the shallow child evaluation.
const W_EVAL: i32 = 1 << 14;
/// Weight per edge disc stabilized by the move.
const W_EDGE_STABILITY: i32 = 1 << 11;
/// Weight per unit of potential mobility denied to the opponent.
const W_POTENTIAL_MOBILITY: i32 = 1 << 6;
/// Bonus for playing in an odd-parity quadrant.
const W_PARITY: i32 = 1 << 5;
/// Bonus when the child position already sits in the hash table.
const W_HASH_CHILD: i32 = 1 << 15;

#[rustfmt::skip]
/// Positional value of each square for move ordering: corners highest, the
/// squares handing over a corner lowest.
const SQUARE_VALUE: [i32; 64] = [
    18,  4, 16, 12, 12, 16,  4, 18,
     4,  2,  6,  8,  8,  6,  2,  4,
    16,  6, 14, 10, 10, 14,  6, 16,
    12,  8, 10,  0,  0, 10,  8, 12,
    12,  8, 10,  0,  0, 10,  8, 12,
    16,  6, 14, 10, 10, 14,  6, 16,
     4,  2,  6,  8,  8,  6,  2,  4,
    18,  4, 16, 12, 12, 16,  4, 18,
];

/// How deep to search each child while ordering, by the remaining depth of
/// the node being ordered. -1 skips the speculative make-move entirely.
fn sort_depth(depth: i32) -> i32 {
    if depth < 6 {
        -1
    } else if depth < 10 {
        0
    } else if depth < 18 {
        1
    } else {
        2
    }
}

impl Search {
    /// Weigh every move of `list` for ordering. `hash_moves` are the stored
    /// best moves of this position, `depth` the remaining search depth here.
    pub(crate) fn evaluate_moves(
        &mut self,
        list: &mut MoveList,
        hash_moves: [Square; 2],
        depth: i32,
    ) -> Result<(), SearchError> {
        if list.len() <= 1 {
            return Ok(());
        }
        let sort_depth = sort_depth(depth);
        let parity = self.parity;
        for m in 0..list.len() {
            let mv = list[m];
            let score = if mv.flipped == self.board.opponent {
                W_WIPEOUT
            } else if mv.sq == hash_moves[0] {
                W_HASH_BEST
            } else if mv.sq == hash_moves[1] {
                W_HASH_SECOND
            } else {
                let mut w = SQUARE_VALUE[mv.sq.index()];
                if parity & mv.sq.quadrant_mask() != 0 {
                    w += W_PARITY;
                }
                if sort_depth >= 0 {
                    let prev = self.make_move(&mv);
                    let next = self.board;
                    w += (36
                        - movegen::get_weighted_mobility(next.player, next.opponent) as i32)
                        * W_MOBILITY;
                    w += (36
                        - movegen::get_potential_mobility(next.player, next.opponent) as i32)
                        * W_POTENTIAL_MOBILITY;
                    // the mover's discs are the child's opponent
                    w += stability::get_edge_stability(next.opponent, next.player) as i32
                        * W_EDGE_STABILITY;
                    let child_eval = match sort_depth {
                        0 => self.evaluate_0(),
                        1 => self.evaluate_1(-SCORE_INF, SCORE_INF),
                        _ => self.evaluate_2(-SCORE_INF, SCORE_INF),
                    };
                    w += (SCORE_MAX - child_eval) * W_EVAL;
                    if sort_depth >= 1 {
                        let child_hash = next.hash();
                        if self.hash.get(&next, child_hash) != HashData::UNSET {
                            w += W_HASH_CHILD;
                        }
                    }
                    self.undo_move(&mv, prev);
                }
                w
            };
            list.set_score(m, score);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{search::tests::test_search, transposition::StorePayload};
    use reverie_base::Board;

    #[test]
    fn hash_moves_rank_first() {
        let board = Board::new();
        let mut search = test_search(&board, 1);
        let mut list = MoveList::new(&board);
        search
            .evaluate_moves(&mut list, [Square::E6, Square::D3], 10)
            .unwrap();
        list.sort();
        assert_eq!(list[0].sq, Square::E6);
        assert_eq!(list[1].sq, Square::D3);
    }

    #[test]
    fn wipeout_outranks_everything() {
        let board = Board {
            player: Square::A1.bitboard(),
            opponent: Square::B1.bitboard(),
        };
        let mut search = test_search(&board, 1);
        let mut list = MoveList::new(&board);
        search
            .evaluate_moves(&mut list, [Square::None, Square::None], 10)
            .unwrap();
        list.sort();
        assert!(list[0].flipped == board.opponent);
    }

    #[test]
    fn ordering_leaves_state_untouched() {
        let board = Board::new();
        let mut search = test_search(&board, 1);
        let eval_before = search.eval;
        let parity_before = search.parity;
        let mut list = MoveList::new(&board);
        search
            .evaluate_moves(&mut list, [Square::None, Square::None], 20)
            .unwrap();
        assert_eq!(search.board, board);
        assert_eq!(search.eval, eval_before);
        assert_eq!(search.parity, parity_before);
        assert_eq!(search.n_empties, 60);
    }

    #[test]
    fn child_in_hash_gets_a_bonus() {
        let board = Board::new();
        let child = board.after(Square::F5).unwrap();
        let mut search = test_search(&board, 1);
        search.hash.new_search();
        search.hash.store(
            &child,
            child.hash(),
            &StorePayload {
                depth: 4,
                selectivity: 5,
                cost: 4,
                alpha: -10,
                beta: 10,
                score: 2,
                mov: Square::D6,
            },
        );
        let mut list = MoveList::new(&board);
        search
            .evaluate_moves(&mut list, [Square::None, Square::None], 12)
            .unwrap();
        list.sort();
        // all four first moves are symmetric, so the hash bonus decides
        assert_eq!(list[0].sq, Square::F5);
    }
}
