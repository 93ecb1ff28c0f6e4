//! Allocation-free mutable game state used by enumeration and training.
//!
//! A [`FastGame`] stores one signed byte per board tile: `0` for empty, `+p` for
//! a light piece at path index `p`, `-p` for a dark piece at path index `p`.
//! Off-board pieces are counted in [`FastPlayer`]. Every mutation happens in
//! place, so a single instance can be reused across millions of transitions:
//!
//! 1. [`FastGame::apply_roll`] computes the legal moves for a roll. With no legal
//!    move (including a roll of zero) the turn passes immediately.
//! 2. [`FastGame::apply_move`] moves the piece at a source path index, handling
//!    captures, scoring, extra rolls and turn handover.
//!
//! Moves are identified by their source path index (0 = introduce a new piece).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::topology::Topology;

/// Off-board piece counters for one player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FastPlayer {
    /// Pieces not yet introduced onto the board.
    pub waiting: u8,
    /// Pieces that have completed the path.
    pub score: u8,
}

/// Legal moves for the pending roll, as ascending source path indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FastMoveList {
    len: u8,
    sources: [u8; MAX_MOVES],
}

impl FastMoveList {
    #[inline(always)]
    fn clear(&mut self) {
        self.len = 0;
    }

    #[inline(always)]
    fn push(&mut self, source: u8) {
        self.sources[self.len as usize] = source;
        self.len += 1;
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.sources[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, source: u8) -> bool {
        self.as_slice().contains(&source)
    }
}

/// A position as handed over by an interactive game.
///
/// Pieces are listed by their 1-based path index along their owner's path.
/// Waiting pieces are derived from the starting piece count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub light_pieces: Vec<u8>,
    pub dark_pieces: Vec<u8>,
    pub light_score: u8,
    pub dark_score: u8,
    pub light_to_move: bool,
}

impl GameSnapshot {
    /// The starting position: every piece waiting, light to move.
    pub fn initial() -> Self {
        Self {
            light_pieces: Vec::new(),
            dark_pieces: Vec::new(),
            light_score: 0,
            dark_score: 0,
            light_to_move: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FastGame {
    topology: Arc<Topology>,
    tiles: [i8; MAX_TILES],
    light: FastPlayer,
    dark: FastPlayer,
    light_turn: bool,
    finished: bool,
    roll: Option<u8>,
    moves: FastMoveList,
}

impl FastGame {
    /// The starting position for `topology`.
    pub fn new(topology: Arc<Topology>) -> Self {
        let pieces = topology.starting_pieces();
        Self {
            topology,
            tiles: [0; MAX_TILES],
            light: FastPlayer {
                waiting: pieces,
                score: 0,
            },
            dark: FastPlayer {
                waiting: pieces,
                score: 0,
            },
            light_turn: true,
            finished: false,
            roll: None,
            moves: FastMoveList::default(),
        }
    }

    /// Return to the starting position.
    pub fn reset(&mut self) {
        let pieces = self.topology.starting_pieces();
        self.tiles = [0; MAX_TILES];
        self.light = FastPlayer {
            waiting: pieces,
            score: 0,
        };
        self.dark = self.light;
        self.light_turn = true;
        self.finished = false;
        self.roll = None;
        self.moves.clear();
    }

    /// Overwrite this state with `other` without touching the shared topology.
    #[inline(always)]
    pub fn copy_from(&mut self, other: &FastGame) {
        debug_assert!(Arc::ptr_eq(&self.topology, &other.topology));
        self.tiles = other.tiles;
        self.light = other.light;
        self.dark = other.dark;
        self.light_turn = other.light_turn;
        self.finished = other.finished;
        self.roll = other.roll;
        self.moves = other.moves;
    }

    /// Load a position from an interactive game.
    pub fn copy_from_snapshot(&mut self, snapshot: &GameSnapshot) -> Result<()> {
        let topo = &*self.topology;
        let pieces = topo.starting_pieces();
        let mut tiles = [0i8; MAX_TILES];
        let mut players = [FastPlayer::default(); 2];

        for (slot, light, on_board, score) in [
            (0, true, &snapshot.light_pieces, snapshot.light_score),
            (1, false, &snapshot.dark_pieces, snapshot.dark_score),
        ] {
            let name = if light { "light" } else { "dark" };
            let used = on_board.len() + score as usize;
            if used > pieces as usize {
                return Err(Error::snapshot(format!(
                    "{name} has {} pieces on board and {score} scored, more than {pieces}",
                    on_board.len()
                )));
            }
            for &p in on_board.iter() {
                if p == 0 || p > topo.path_len() {
                    return Err(Error::snapshot(format!(
                        "{name} piece at path index {p} is off the board (1..={})",
                        topo.path_len()
                    )));
                }
                let tile = topo.path_tile(light, p);
                if tiles[tile] != 0 {
                    return Err(Error::snapshot(format!(
                        "{name} piece at path index {p} lands on occupied tile {}",
                        topo.tile(tile)
                    )));
                }
                tiles[tile] = if light { p as i8 } else { -(p as i8) };
            }
            players[slot] = FastPlayer {
                waiting: pieces - used as u8,
                score,
            };
        }

        if players[0].score == pieces && players[1].score == pieces {
            return Err(Error::snapshot("both players have scored every piece"));
        }

        self.tiles = tiles;
        self.light = players[0];
        self.dark = players[1];
        self.finished = self.light.score == pieces || self.dark.score == pieces;
        self.light_turn = if self.finished {
            self.light.score == pieces
        } else {
            snapshot.light_to_move
        };
        self.roll = None;
        self.moves.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let topo = &*self.topology;
        let mut snapshot = GameSnapshot {
            light_pieces: Vec::new(),
            dark_pieces: Vec::new(),
            light_score: self.light.score,
            dark_score: self.dark.score,
            light_to_move: self.light_turn,
        };
        for p in 1..=topo.path_len() {
            if self.tiles[topo.path_tile(true, p)] == p as i8 {
                snapshot.light_pieces.push(p);
            }
            if self.tiles[topo.path_tile(false, p)] == -(p as i8) {
                snapshot.dark_pieces.push(p);
            }
        }
        snapshot
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    #[inline(always)]
    pub fn is_light_turn(&self) -> bool {
        self.light_turn
    }

    #[inline(always)]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether light has scored every piece.
    pub fn light_won(&self) -> bool {
        self.light.score == self.topology.starting_pieces()
    }

    #[inline(always)]
    pub fn light(&self) -> FastPlayer {
        self.light
    }

    #[inline(always)]
    pub fn dark(&self) -> FastPlayer {
        self.dark
    }

    /// Signed occupant of `tile`: 0 empty, `+p` light at path index `p`, `-p` dark.
    #[inline(always)]
    pub fn occupant(&self, tile: usize) -> i8 {
        self.tiles[tile]
    }

    /// The roll waiting for a move, if any.
    pub fn pending_roll(&self) -> Option<u8> {
        self.roll
    }

    /// Legal moves for the pending roll.
    #[inline(always)]
    pub fn moves(&self) -> &[u8] {
        self.moves.as_slice()
    }

    /// Pieces of the given player currently on the board.
    pub fn pieces_on_board(&self, light: bool) -> u8 {
        self.tiles
            .iter()
            .filter(|&&v| if light { v > 0 } else { v < 0 })
            .count() as u8
    }

    // ── Raw mutation used by the enumerator and encoder ────────────────

    /// Empty the board and set both players' counters directly.
    pub(crate) fn set_counters(&mut self, light: FastPlayer, dark: FastPlayer, light_turn: bool) {
        let pieces = self.topology.starting_pieces();
        self.light = light;
        self.dark = dark;
        self.light_turn = light_turn;
        self.finished = light.score == pieces || dark.score == pieces;
        self.roll = None;
        self.moves.clear();
    }

    pub(crate) fn clear_board(&mut self) {
        self.tiles = [0; MAX_TILES];
    }

    #[inline(always)]
    pub(crate) fn set_occupant(&mut self, tile: usize, value: i8) {
        self.tiles[tile] = value;
    }

    #[inline(always)]
    pub(crate) fn set_waiting(&mut self, light: u8, dark: u8) {
        self.light.waiting = light;
        self.dark.waiting = dark;
    }

    // ── Rules ───────────────────────────────────────────────────────────

    /// Apply a dice roll and return the legal moves.
    ///
    /// An empty result means the turn has already passed to the other player.
    pub fn apply_roll(&mut self, roll: u8) -> Result<&[u8]> {
        if self.finished {
            return Err(Error::GameFinished);
        }
        if let Some(pending) = self.roll {
            return Err(Error::RollPending { roll: pending });
        }
        if self.topology.roll_probability(roll) <= 0.0 {
            return Err(Error::IllegalRoll {
                roll,
                legal: self.topology.rolls().iter().map(|r| r.roll).collect(),
            });
        }

        self.compute_moves(roll);
        if self.moves.is_empty() {
            self.light_turn = !self.light_turn;
        } else {
            self.roll = Some(roll);
        }
        Ok(self.moves.as_slice())
    }

    fn compute_moves(&mut self, roll: u8) {
        self.moves.clear();
        if roll == 0 {
            return;
        }
        let topo = &*self.topology;
        let light = self.light_turn;
        let sign: i8 = if light { 1 } else { -1 };
        let player = if light { self.light } else { self.dark };
        let end = topo.path_len() + 1;
        let safe = topo.config().safe_rosettes;

        let can_land = |tiles: &[i8; MAX_TILES], dest: u8| -> bool {
            if dest == end {
                return true;
            }
            if dest > end {
                return false;
            }
            let tile = topo.path_tile(light, dest);
            let occupant = tiles[tile];
            if occupant == 0 {
                true
            } else if occupant.signum() == sign {
                false
            } else {
                !(safe && topo.is_rosette(tile))
            }
        };

        if player.waiting > 0 && can_land(&self.tiles, roll) {
            self.moves.push(0);
        }
        for p in 1..=topo.path_len() {
            if self.tiles[topo.path_tile(light, p)] == sign * p as i8 && can_land(&self.tiles, p + roll) {
                self.moves.push(p);
            }
        }
    }

    /// Move the piece at path index `source` by the pending roll.
    pub fn apply_move(&mut self, source: u8) -> Result<()> {
        let roll = self.roll.ok_or(Error::NoPendingRoll)?;
        if !self.moves.contains(source) {
            return Err(Error::IllegalMove {
                source_index: source,
                roll,
            });
        }

        let topo = &*self.topology;
        let light = self.light_turn;
        let sign: i8 = if light { 1 } else { -1 };
        let pieces = topo.starting_pieces();
        let (mover, opponent) = if light {
            (&mut self.light, &mut self.dark)
        } else {
            (&mut self.dark, &mut self.light)
        };

        if source == 0 {
            mover.waiting -= 1;
        } else {
            self.tiles[topo.path_tile(light, source)] = 0;
        }

        let dest = source + roll;
        let mut extra_roll = false;
        if dest == topo.path_len() + 1 {
            mover.score += 1;
            self.finished = mover.score == pieces;
        } else {
            let tile = topo.path_tile(light, dest);
            if self.tiles[tile] != 0 {
                opponent.waiting += 1;
                extra_roll |= topo.config().captures_grant_extra_rolls;
            }
            self.tiles[tile] = sign * dest as i8;
            extra_roll |= topo.is_rosette(tile) && topo.config().rosettes_grant_extra_rolls;
        }

        self.roll = None;
        self.moves.clear();
        if !self.finished && !extra_roll {
            self.light_turn = !self.light_turn;
        }
        Ok(())
    }

    /// Write the light/dark swapped position into `out`.
    ///
    /// Because dark's path is light's path reflected, a light piece at path
    /// index `p` becomes a dark piece at `p` on the reflected tile. Mirroring
    /// twice returns the original position.
    pub fn mirror_into(&self, out: &mut FastGame) {
        debug_assert!(Arc::ptr_eq(&self.topology, &out.topology));
        let topo = &*self.topology;
        out.tiles = [0; MAX_TILES];
        for tile in 0..topo.tile_count() {
            let v = self.tiles[tile];
            if v != 0 {
                out.tiles[topo.mirror_tile(tile)] = -v;
            }
        }
        out.light = self.dark;
        out.dark = self.light;
        out.light_turn = !self.light_turn;
        out.finished = self.finished;
        out.roll = None;
        out.moves.clear();
    }

    /// Same position, ignoring any pending roll.
    pub fn same_position(&self, other: &FastGame) -> bool {
        self.tiles == other.tiles
            && self.light == other.light
            && self.dark == other.dark
            && self.light_turn == other.light_turn
            && self.finished == other.finished
    }
}

impl PartialEq for FastGame {
    fn eq(&self, other: &Self) -> bool {
        self.same_position(other) && self.roll == other.roll && self.moves == other.moves
    }
}
