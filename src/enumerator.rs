//! Exhaustive enumeration of canonical states and their transitions.
//!
//! Canonical states are unfinished light-to-move positions. They are visited
//! shard by shard (ascending upper key) and, within a shard, in ascending lower
//! key order. A populated shard therefore stores its entries in exactly the
//! order the enumerator visits them, so the `i`-th visited state of a shard is
//! the `i`-th entry of its sorted chunk.
//!
//! Three modes share the same walk:
//!
//! | Mode | Entry point | Visitor receives |
//! |------|-------------|------------------|
//! | 1 | [`StateEnumerator::for_each_state_in_shard`] | the state |
//! | 2 | [`StateEnumerator::for_each_state_with_successors`] | per roll, canonical successor keys |
//! | 3 | [`StateEnumerator::for_each_state_with_neighbours`] | per roll, raw resulting states |
//!
//! A roll without a legal move (including a roll of zero) yields a single
//! "pass" neighbour: the same board with the turn handed over.
//!
//! All scratch memory lives in [`EnumerationBuffers`], allocated once per
//! worker. The walk itself mutates one [`FastGame`] in place.

use std::sync::Arc;

use crate::constants::*;
use crate::encoding::{join_key, StateEncoder};
use crate::error::{Error, Result};
use crate::fast_game::{FastGame, FastPlayer};
use crate::store::ShardedStore;
use crate::topology::Topology;

// ── Combinatorics ───────────────────────────────────────────────────────

fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1u64, |acc, i| acc * (n - i) as u64 / (i + 1) as u64)
}

/// Ways to place at most `max` indistinguishable pieces on `slots` tiles.
fn subsets_up_to(slots: usize, max: usize) -> u64 {
    (0..=slots.min(max)).map(|k| binomial(slots, k)).sum()
}

// ── Neighbour buffers (mode 3) ──────────────────────────────────────────

/// States reachable from one position with one roll value.
#[derive(Clone, Debug)]
pub struct RollNeighbours {
    pub roll: u8,
    pub probability: f64,
    len: usize,
    passed: bool,
    sources: [u8; MAX_MOVES],
    states: Vec<FastGame>,
}

impl RollNeighbours {
    fn new(topology: &Arc<Topology>, roll: u8, probability: f64) -> Self {
        Self {
            roll,
            probability,
            len: 0,
            passed: false,
            sources: [0; MAX_MOVES],
            states: (0..MAX_MOVES).map(|_| FastGame::new(topology.clone())).collect(),
        }
    }

    /// Resulting states, one per legal move, or the single pass state.
    pub fn states(&self) -> &[FastGame] {
        &self.states[..self.len]
    }

    /// Source path index of each move. Empty when the turn passed.
    pub fn sources(&self) -> &[u8] {
        if self.passed {
            &[]
        } else {
            &self.sources[..self.len]
        }
    }

    /// Whether no move was possible and the turn simply passed.
    pub fn passed(&self) -> bool {
        self.passed
    }
}

/// Raw neighbours of one position for every roll value.
#[derive(Clone, Debug)]
pub struct NeighbourSet {
    rolled: FastGame,
    rolls: Vec<RollNeighbours>,
}

impl NeighbourSet {
    pub fn new(topology: &Arc<Topology>) -> Self {
        Self {
            rolled: FastGame::new(topology.clone()),
            rolls: topology
                .rolls()
                .iter()
                .map(|r| RollNeighbours::new(topology, r.roll, r.probability))
                .collect(),
        }
    }

    pub fn rolls(&self) -> &[RollNeighbours] {
        &self.rolls
    }

    /// Fill with every state reachable from `state` by one roll and one move.
    pub fn collect(&mut self, state: &FastGame) -> Result<()> {
        for entry in self.rolls.iter_mut() {
            self.rolled.copy_from(state);
            let count = self.rolled.apply_roll(entry.roll)?.len();
            if count == 0 {
                entry.states[0].copy_from(&self.rolled);
                entry.len = 1;
                entry.passed = true;
                continue;
            }
            entry.passed = false;
            entry.len = count;
            for (i, &source) in self.rolled.moves().iter().enumerate() {
                entry.sources[i] = source;
                entry.states[i].copy_from(&self.rolled);
                entry.states[i].apply_move(source)?;
            }
        }
        Ok(())
    }
}

// ── Successor buffers (mode 2) ──────────────────────────────────────────

/// One transition target, already reduced to a table lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Successor {
    /// The move ended the game; its value is exact.
    Finished { light_won: bool },
    /// A table entry. `mirrored` means the stored value is from the other
    /// player's point of view and must be complemented.
    State { key: u64, mirrored: bool },
}

impl Successor {
    /// Win percentage for the light player of the originating state.
    #[inline(always)]
    pub fn light_percent(self, lookup: impl FnOnce(u64) -> Result<f64>) -> Result<f64> {
        match self {
            Successor::Finished { light_won } => Ok(if light_won { 100.0 } else { 0.0 }),
            Successor::State { key, mirrored } => {
                let value = lookup(key)?;
                Ok(if mirrored { 100.0 - value } else { value })
            }
        }
    }
}

/// Canonical successors for one roll value.
#[derive(Clone, Copy, Debug)]
pub struct RollSuccessors {
    pub roll: u8,
    pub probability: f64,
    len: usize,
    successors: [Successor; MAX_MOVES],
}

impl RollSuccessors {
    pub fn successors(&self) -> &[Successor] {
        &self.successors[..self.len]
    }
}

#[derive(Clone, Debug)]
pub struct SuccessorSet {
    mirror: FastGame,
    rolls: Vec<RollSuccessors>,
}

impl SuccessorSet {
    pub fn new(topology: &Arc<Topology>) -> Self {
        let empty = Successor::Finished { light_won: false };
        Self {
            mirror: FastGame::new(topology.clone()),
            rolls: topology
                .rolls()
                .iter()
                .map(|r| RollSuccessors {
                    roll: r.roll,
                    probability: r.probability,
                    len: 0,
                    successors: [empty; MAX_MOVES],
                })
                .collect(),
        }
    }

    pub fn rolls(&self) -> &[RollSuccessors] {
        &self.rolls
    }

    /// Reduce raw `neighbours` to canonical keys.
    pub fn collect(&mut self, encoder: &StateEncoder, neighbours: &NeighbourSet) {
        for (out, entry) in self.rolls.iter_mut().zip(neighbours.rolls()) {
            out.len = entry.states().len();
            for (slot, next) in out.successors.iter_mut().zip(entry.states()) {
                *slot = if next.is_finished() {
                    Successor::Finished {
                        light_won: next.light_won(),
                    }
                } else {
                    let canonical = encoder.canonicalize(next, &mut self.mirror);
                    Successor::State {
                        key: encoder.encode(canonical.state()),
                        mirrored: canonical.is_mirrored(),
                    }
                };
            }
        }
    }
}

/// Per-worker scratch memory for every enumeration mode.
#[derive(Clone, Debug)]
pub struct EnumerationBuffers {
    walk: FastGame,
    neighbours: NeighbourSet,
    successors: SuccessorSet,
}

impl EnumerationBuffers {
    pub fn new(topology: &Arc<Topology>) -> Self {
        Self {
            walk: FastGame::new(topology.clone()),
            neighbours: NeighbourSet::new(topology),
            successors: SuccessorSet::new(topology),
        }
    }

    /// The working state used by mode 1 walks.
    pub fn walk_mut(&mut self) -> &mut FastGame {
        &mut self.walk
    }
}

// ── Shard walk ──────────────────────────────────────────────────────────

struct ShardWalk<'a, F> {
    topo: &'a Topology,
    light_cap: u8,
    dark_cap: u8,
    visit: F,
}

impl<F> ShardWalk<'_, F>
where
    F: FnMut(u32, &FastGame) -> Result<()>,
{
    fn shared(&mut self, state: &mut FastGame, slot: usize, prefix: u64, on_light: u8, on_dark: u8) -> Result<()> {
        let topo = self.topo;
        let shared = topo.shared_tiles();
        if slot == shared.len() {
            return self.private(state, prefix, on_light, on_dark);
        }
        let tile = shared[slot] as usize;

        state.set_occupant(tile, 0);
        self.shared(state, slot + 1, prefix * 3, on_light, on_dark)?;
        if on_light < self.light_cap {
            state.set_occupant(tile, topo.path_index(true, tile) as i8);
            self.shared(state, slot + 1, prefix * 3 + 1, on_light + 1, on_dark)?;
        }
        if on_dark < self.dark_cap {
            state.set_occupant(tile, -(topo.path_index(false, tile) as i8));
            self.shared(state, slot + 1, prefix * 3 + 2, on_light, on_dark + 1)?;
        }
        state.set_occupant(tile, 0);
        Ok(())
    }

    fn private(&mut self, state: &mut FastGame, prefix: u64, on_light: u8, on_dark: u8) -> Result<()> {
        let topo = self.topo;
        let light_tiles = topo.light_private_tiles();
        let dark_tiles = topo.dark_private_tiles();
        let (pl, pd) = (light_tiles.len(), dark_tiles.len());

        for light_bits in 0u64..(1 << pl) {
            let light_count = on_light + light_bits.count_ones() as u8;
            if light_count > self.light_cap {
                continue;
            }
            for (i, &tile) in light_tiles.iter().enumerate() {
                let occupied = (light_bits >> (pl - 1 - i)) & 1 == 1;
                let value = if occupied { topo.path_index(true, tile as usize) as i8 } else { 0 };
                state.set_occupant(tile as usize, value);
            }
            for dark_bits in 0u64..(1 << pd) {
                let dark_count = on_dark + dark_bits.count_ones() as u8;
                if dark_count > self.dark_cap {
                    continue;
                }
                for (i, &tile) in dark_tiles.iter().enumerate() {
                    let occupied = (dark_bits >> (pd - 1 - i)) & 1 == 1;
                    let value = if occupied { -(topo.path_index(false, tile as usize) as i8) } else { 0 };
                    state.set_occupant(tile as usize, value);
                }
                state.set_waiting(self.light_cap - light_count, self.dark_cap - dark_count);
                let lower = (((prefix << pl) | light_bits) << pd | dark_bits) << 1;
                (self.visit)(lower as u32, state)?;
            }
        }
        for &tile in light_tiles.iter().chain(dark_tiles) {
            state.set_occupant(tile as usize, 0);
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct StateEnumerator {
    encoder: Arc<StateEncoder>,
}

impl StateEnumerator {
    pub fn new(encoder: Arc<StateEncoder>) -> Self {
        Self { encoder }
    }

    pub fn encoder(&self) -> &Arc<StateEncoder> {
        &self.encoder
    }

    pub fn topology(&self) -> &Arc<Topology> {
        self.encoder.topology()
    }

    pub fn new_buffers(&self) -> EnumerationBuffers {
        EnumerationBuffers::new(self.topology())
    }

    /// Upper keys of every shard that holds canonical states, ascending.
    ///
    /// Shards where either player has already scored every piece only contain
    /// finished positions and stay empty.
    pub fn shard_keys(&self) -> Vec<u32> {
        let pieces = self.topology().starting_pieces();
        (0..pieces)
            .flat_map(|ls| (0..pieces).map(move |ds| (ls, ds)))
            .map(|(ls, ds)| self.encoder.upper_key(ls, ds))
            .collect()
    }

    /// Number of canonical states in shard `upper`, computed combinatorially.
    pub fn count_shard(&self, upper: u32) -> u64 {
        let topo = self.topology();
        let pieces = topo.starting_pieces();
        let (ls, ds) = self.encoder.scores(upper);
        if ls >= pieces || ds >= pieces {
            return 0;
        }
        let (light_cap, dark_cap) = ((pieces - ls) as usize, (pieces - ds) as usize);
        let shared = topo.shared_tiles().len();
        let (pl, pd) = (topo.light_private_tiles().len(), topo.dark_private_tiles().len());

        let mut total = 0u64;
        for sl in 0..=shared.min(light_cap) {
            for sd in 0..=(shared - sl).min(dark_cap) {
                total += binomial(shared, sl)
                    * binomial(shared - sl, sd)
                    * subsets_up_to(pl, light_cap - sl)
                    * subsets_up_to(pd, dark_cap - sd);
            }
        }
        total
    }

    /// Total number of canonical states across all shards.
    pub fn count_states(&self) -> u64 {
        self.shard_keys().iter().map(|&upper| self.count_shard(upper)).sum()
    }

    /// Fail unless every shard of `store` holds exactly as many entries as
    /// the enumeration visits.
    pub fn check_shard_lengths(&self, store: &ShardedStore) -> Result<()> {
        if store.shard_count() != self.encoder.shard_count() {
            return Err(Error::config(format!(
                "table has {} shards, configuration needs {}",
                store.shard_count(),
                self.encoder.shard_count()
            )));
        }
        for chunk in store.chunks() {
            let expected = self.count_shard(chunk.upper());
            let found = chunk.len() as u64;
            if expected != found {
                return Err(Error::ShardOutOfSync {
                    upper: chunk.upper(),
                    index: found.min(expected) as usize,
                });
            }
        }
        Ok(())
    }

    // ── Mode 1 ──────────────────────────────────────────────────────────

    /// Visit every canonical state of shard `upper` in ascending lower key.
    ///
    /// `state` is overwritten and used as the walk's working copy.
    pub fn for_each_state_in_shard<F>(&self, upper: u32, state: &mut FastGame, visit: F) -> Result<()>
    where
        F: FnMut(u32, &FastGame) -> Result<()>,
    {
        let topo = &**self.topology();
        let pieces = topo.starting_pieces();
        let (ls, ds) = self.encoder.scores(upper);
        if ls >= pieces || ds >= pieces {
            return Ok(());
        }
        let (light_cap, dark_cap) = (pieces - ls, pieces - ds);

        state.clear_board();
        state.set_counters(
            FastPlayer {
                waiting: light_cap,
                score: ls,
            },
            FastPlayer {
                waiting: dark_cap,
                score: ds,
            },
            true,
        );
        let mut walk = ShardWalk {
            topo,
            light_cap,
            dark_cap,
            visit,
        };
        walk.shared(state, 0, 0, 0, 0)
    }

    /// Visit every canonical state as `(key, state)`, shard by shard.
    pub fn for_each_state<F>(&self, buffers: &mut EnumerationBuffers, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, &FastGame) -> Result<()>,
    {
        for upper in self.shard_keys() {
            self.for_each_state_in_shard(upper, &mut buffers.walk, |lower, state| {
                visit(join_key(upper, lower), state)
            })?;
        }
        Ok(())
    }

    // ── Modes 2 and 3 ───────────────────────────────────────────────────

    /// Visit every canonical state of shard `upper` with its raw neighbours.
    pub fn for_each_state_with_neighbours<F>(
        &self,
        upper: u32,
        buffers: &mut EnumerationBuffers,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(u32, &FastGame, &NeighbourSet) -> Result<()>,
    {
        let EnumerationBuffers {
            walk, neighbours, ..
        } = buffers;
        self.for_each_state_in_shard(upper, walk, |lower, state| {
            neighbours.collect(state)?;
            visit(lower, state, neighbours)
        })
    }

    /// Visit every canonical state of shard `upper` with its canonical successors.
    pub fn for_each_state_with_successors<F>(
        &self,
        upper: u32,
        buffers: &mut EnumerationBuffers,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(u32, &FastGame, &SuccessorSet) -> Result<()>,
    {
        let encoder = &*self.encoder;
        let EnumerationBuffers {
            walk,
            neighbours,
            successors,
        } = buffers;
        self.for_each_state_in_shard(upper, walk, |lower, state| {
            neighbours.collect(state)?;
            successors.collect(encoder, neighbours);
            visit(lower, state, successors)
        })
    }

    /// Canonical successors of an arbitrary unfinished state.
    pub fn collect_successors<'b>(
        &self,
        state: &FastGame,
        buffers: &'b mut EnumerationBuffers,
    ) -> Result<&'b SuccessorSet> {
        buffers.neighbours.collect(state)?;
        buffers.successors.collect(&self.encoder, &buffers.neighbours);
        Ok(&buffers.successors)
    }

    /// Raw neighbours of an arbitrary unfinished state.
    pub fn collect_neighbours<'b>(
        &self,
        state: &FastGame,
        buffers: &'b mut EnumerationBuffers,
    ) -> Result<&'b NeighbourSet> {
        buffers.neighbours.collect(state)?;
        Ok(&buffers.neighbours)
    }
}
