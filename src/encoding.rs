//! State keys: a bijection between positions and `u64` keys.
//!
//! ## Layout
//!
//! `key = upper << LOWER_KEY_BITS | lower`, where
//!
//! - `upper = light_score * (N + 1) + dark_score` selects the shard
//! - `lower` is a mixed-radix number, most significant digit first:
//!   one base-3 digit per shared tile (0 empty, 1 light, 2 dark) in light-path
//!   order, one bit per light private tile, one bit per dark private tile, and
//!   finally one bit that is set when dark is to move.
//!
//! Waiting piece counts are implied by the scores and the pieces on the board,
//! and a finished game is recognised by a score of `N`, so neither needs digits.
//!
//! ## Canonical keys
//!
//! Light/dark mirroring maps every dark-to-move position onto a light-to-move
//! one with the complementary win probability. [`StateEncoder::canonicalize`]
//! returns a [`Canonical`] that remembers whether the mirror was taken, and
//! canonical keys always have an even lower key.

use std::sync::Arc;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::fast_game::{FastGame, FastPlayer};
use crate::topology::Topology;

/// A position normalised so that light is to move (or light has won).
#[derive(Clone, Copy, Debug)]
pub enum Canonical<'a> {
    /// Light was already to move; the position is used as-is.
    Direct(&'a FastGame),
    /// Dark was to move; this is the mirrored position.
    Mirrored(&'a FastGame),
}

impl<'a> Canonical<'a> {
    pub fn state(&self) -> &'a FastGame {
        match *self {
            Canonical::Direct(state) | Canonical::Mirrored(state) => state,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(self, Canonical::Mirrored(_))
    }

    /// Convert a win percentage of the canonical position back to light's view
    /// of the original position.
    #[inline(always)]
    pub fn light_percent(&self, canonical_percent: f64) -> f64 {
        if self.is_mirrored() {
            100.0 - canonical_percent
        } else {
            canonical_percent
        }
    }
}

#[inline(always)]
pub fn calc_upper_key(key: u64) -> u32 {
    (key >> LOWER_KEY_BITS) as u32
}

#[inline(always)]
pub fn calc_lower_key(key: u64) -> u32 {
    (key & LOWER_KEY_MASK) as u32
}

#[inline(always)]
pub fn join_key(upper: u32, lower: u32) -> u64 {
    ((upper as u64) << LOWER_KEY_BITS) | lower as u64
}

#[derive(Clone, Debug)]
pub struct StateEncoder {
    topology: Arc<Topology>,
    score_radix: u32,
    lower_radix: u64,
}

impl StateEncoder {
    pub fn new(topology: Arc<Topology>) -> Self {
        let score_radix = topology.starting_pieces() as u32 + 1;
        let private = topology.light_private_tiles().len() + topology.dark_private_tiles().len();
        let lower_radix = 3u64.pow(topology.shared_tiles().len() as u32) << (private + 1);
        Self {
            topology,
            score_radix,
            lower_radix,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Number of distinct upper keys, i.e. shard slots.
    pub fn shard_count(&self) -> u32 {
        self.score_radix * self.score_radix
    }

    #[inline(always)]
    pub fn upper_key(&self, light_score: u8, dark_score: u8) -> u32 {
        light_score as u32 * self.score_radix + dark_score as u32
    }

    /// `(light_score, dark_score)` selected by an upper key.
    #[inline(always)]
    pub fn scores(&self, upper: u32) -> (u8, u8) {
        ((upper / self.score_radix) as u8, (upper % self.score_radix) as u8)
    }

    /// Key of any position, whoever is to move and whether or not it is finished.
    pub fn encode(&self, state: &FastGame) -> u64 {
        let topo = &*self.topology;
        let mut lower: u64 = 0;
        for &tile in topo.shared_tiles() {
            let v = state.occupant(tile as usize);
            let digit = if v > 0 {
                1
            } else if v < 0 {
                2
            } else {
                0
            };
            lower = lower * 3 + digit;
        }
        for &tile in topo.light_private_tiles() {
            lower = (lower << 1) | (state.occupant(tile as usize) != 0) as u64;
        }
        for &tile in topo.dark_private_tiles() {
            lower = (lower << 1) | (state.occupant(tile as usize) != 0) as u64;
        }
        lower = (lower << 1) | (!state.is_light_turn()) as u64;

        let upper = self.upper_key(state.light().score, state.dark().score);
        join_key(upper, lower as u32)
    }

    /// Normalise `state` to light-to-move, mirroring into `scratch` when needed.
    pub fn canonicalize<'a>(&self, state: &'a FastGame, scratch: &'a mut FastGame) -> Canonical<'a> {
        if state.is_light_turn() {
            Canonical::Direct(state)
        } else {
            state.mirror_into(scratch);
            Canonical::Mirrored(scratch)
        }
    }

    /// Key of the canonical form of `state`.
    pub fn encode_canonical(&self, state: &FastGame, scratch: &mut FastGame) -> u64 {
        let canonical = self.canonicalize(state, scratch);
        self.encode(canonical.state())
    }

    /// Whether `key` is the key of a light-to-move position.
    #[inline(always)]
    pub fn is_canonical(key: u64) -> bool {
        key & 1 == 0
    }

    /// Rebuild the position with the given key into `out`.
    pub fn decode(&self, key: u64, out: &mut FastGame) -> Result<()> {
        let topo = &*self.topology;
        let pieces = topo.starting_pieces();
        let upper = calc_upper_key(key);
        let mut lower = calc_lower_key(key) as u64;
        if upper >= self.shard_count() {
            return Err(Error::NotEncodable {
                key,
                message: format!("upper key {upper} exceeds {}", self.shard_count()),
            });
        }
        if lower >= self.lower_radix {
            return Err(Error::NotEncodable {
                key,
                message: format!("lower key exceeds {}", self.lower_radix),
            });
        }
        let (light_score, dark_score) = self.scores(upper);
        if light_score == pieces && dark_score == pieces {
            return Err(Error::NotEncodable {
                key,
                message: "both players have finished".to_string(),
            });
        }

        out.clear_board();
        let light_turn = lower & 1 == 0;
        lower >>= 1;
        let (mut on_light, mut on_dark) = (0u8, 0u8);
        for &tile in topo.dark_private_tiles().iter().rev() {
            if lower & 1 == 1 {
                out.set_occupant(tile as usize, -(topo.path_index(false, tile as usize) as i8));
                on_dark += 1;
            }
            lower >>= 1;
        }
        for &tile in topo.light_private_tiles().iter().rev() {
            if lower & 1 == 1 {
                out.set_occupant(tile as usize, topo.path_index(true, tile as usize) as i8);
                on_light += 1;
            }
            lower >>= 1;
        }
        for &tile in topo.shared_tiles().iter().rev() {
            match lower % 3 {
                1 => {
                    out.set_occupant(tile as usize, topo.path_index(true, tile as usize) as i8);
                    on_light += 1;
                }
                2 => {
                    out.set_occupant(tile as usize, -(topo.path_index(false, tile as usize) as i8));
                    on_dark += 1;
                }
                _ => {}
            }
            lower /= 3;
        }

        if on_light + light_score > pieces || on_dark + dark_score > pieces {
            return Err(Error::NotEncodable {
                key,
                message: "more pieces than the configuration allows".to_string(),
            });
        }
        out.set_counters(
            FastPlayer {
                waiting: pieces - on_light - light_score,
                score: light_score,
            },
            FastPlayer {
                waiting: pieces - on_dark - dark_score,
                score: dark_score,
            },
            light_turn,
        );
        Ok(())
    }
}
