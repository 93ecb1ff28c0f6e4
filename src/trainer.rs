//! Value iteration over the cyclic state graph.
//!
//! Captures send pieces back to the start, so the state graph has cycles and a
//! single backward pass is not enough. Instead every sweep recomputes each
//! canonical state as
//!
//! ```text
//! V(s) = sum over rolls r of  P(r) * max over moves m of  V(next(s, r, m))
//! ```
//!
//! where a successor's value is read from the table (complemented when it is
//! stored mirrored) and finished successors are exactly 100 or 0. Light is
//! always the player to move in a canonical state, so the best move is always
//! the maximum. Sweeps repeat until the largest change in one sweep is below
//! the configured precision.
//!
//! ## Sweep orders
//!
//! | Order | Parallelism | Reads during a sweep |
//! |-------|-------------|----------------------|
//! | `Jacobi` | all shards at once | values from the previous sweep only |
//! | `Layered` | shards with equal `light_score + dark_score` | values committed by earlier layers of this sweep |
//!
//! Scoring only ever increases the total score, so `Layered` processes layers
//! from the highest total down and each layer sees the fresh values of every
//! layer it can score into. Shards in one layer never read each other's new
//! values, so both orders give identical results for any thread count.
//!
//! Shards are owned by exactly one worker per layer; new values are gathered
//! per shard and written back after the layer's barrier.

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::GameConfig;
use crate::constants::*;
use crate::encoding::StateEncoder;
use crate::enumerator::{EnumerationBuffers, StateEnumerator};
use crate::error::{Error, Result};
use crate::lut::Lut;
use crate::progress::{create_state_progress, format_count};
use crate::storage::write_lut;
use crate::store::{Chunk, ValueType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepOrder {
    Jacobi,
    #[default]
    Layered,
}

impl SweepOrder {
    pub fn name(self) -> &'static str {
        match self {
            SweepOrder::Jacobi => "jacobi",
            SweepOrder::Layered => "layered",
        }
    }
}

impl fmt::Display for SweepOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SweepOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jacobi" => Ok(SweepOrder::Jacobi),
            "layered" => Ok(SweepOrder::Layered),
            other => Err(Error::config(format!(
                "unknown sweep order '{other}' (expected jacobi or layered)"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrainSettings {
    /// Stop once a sweep changes no value by this much or more (percentage points).
    pub precision: f64,
    pub order: SweepOrder,
    /// Give up after this many sweeps in one call. `None` sweeps until converged.
    pub max_sweeps: Option<u32>,
    /// Where to write checkpoints. `None` disables checkpointing.
    pub checkpoint: Option<PathBuf>,
    /// Sweeps between checkpoints.
    pub checkpoint_interval: u32,
    pub show_progress: bool,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            order: SweepOrder::default(),
            max_sweeps: None,
            checkpoint: None,
            checkpoint_interval: 1,
            show_progress: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepReport {
    /// Sweep number, counted across resumed runs.
    pub sweep: u32,
    pub max_change: f64,
    pub states: u64,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn states_per_second(&self) -> f64 {
        self.states as f64 / self.elapsed.as_secs_f64().max(1e-9)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrainOutcome {
    /// The last sweep changed every value by less than the precision.
    Converged(SweepReport),
    /// `max_sweeps` was reached first.
    SweepLimit(SweepReport),
    /// The observer asked to stop.
    Stopped(SweepReport),
}

impl TrainOutcome {
    pub fn report(&self) -> &SweepReport {
        match self {
            TrainOutcome::Converged(r) | TrainOutcome::SweepLimit(r) | TrainOutcome::Stopped(r) => r,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, TrainOutcome::Converged(_))
    }
}

/// New values for one shard, in chunk order.
struct ShardUpdate {
    upper: u32,
    values: Vec<f64>,
    max_change: f64,
}

pub struct LutTrainer {
    enumerator: StateEnumerator,
}

impl LutTrainer {
    /// Validate `config` and prepare a trainer for it.
    pub fn new(config: GameConfig) -> Result<Self> {
        Ok(Self::from_encoder(Lut::encoder_for(config)?))
    }

    pub fn from_encoder(encoder: Arc<StateEncoder>) -> Self {
        Self {
            enumerator: StateEnumerator::new(encoder),
        }
    }

    pub fn enumerator(&self) -> &StateEnumerator {
        &self.enumerator
    }

    pub fn encoder(&self) -> &Arc<StateEncoder> {
        self.enumerator.encoder()
    }

    pub fn config(&self) -> &GameConfig {
        self.encoder().topology().config()
    }

    // ── Population ──────────────────────────────────────────────────────

    /// A table holding every canonical state at the neutral prior.
    ///
    /// Finished positions are never stored: their value is exactly 100 or 0
    /// and is answered without a lookup.
    pub fn populate_new_lut(&self, value_type: ValueType, show_progress: bool) -> Result<Lut> {
        let start_time = Instant::now();
        let total = self.enumerator.count_states();
        log::info!(
            "Populating {} canonical states ({}) with prior {NEUTRAL_PRIOR}...",
            format_count(total),
            value_type
        );
        let pb = create_state_progress(total, "populate", show_progress);
        let topology = self.encoder().topology().clone();

        let chunks: Vec<Chunk> = self
            .enumerator
            .shard_keys()
            .into_par_iter()
            .map_init(
                || EnumerationBuffers::new(&topology),
                |buffers, upper| -> Result<Chunk> {
                    let expected = self.enumerator.count_shard(upper) as usize;
                    let mut chunk = Chunk::with_capacity(upper, value_type, expected);
                    self.enumerator
                        .for_each_state_in_shard(upper, buffers.walk_mut(), |lower, _| {
                            chunk.add_entry(lower, NEUTRAL_PRIOR);
                            Ok(())
                        })?;
                    if chunk.len() != expected {
                        return Err(Error::ShardOutOfSync {
                            upper,
                            index: chunk.len(),
                        });
                    }
                    pb.inc(chunk.len() as u64);
                    Ok(chunk)
                },
            )
            .collect::<Result<_>>()?;
        pb.finish_and_clear();

        let mut lut = Lut::new(self.encoder().clone(), value_type);
        for chunk in chunks {
            lut.store_mut().insert_chunk(chunk)?;
        }
        lut.store_mut().sort()?;
        lut.refresh_entry_count();

        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "Populated {} states in {:.2} s ({:.0} states/s)",
            format_count(lut.entry_count()),
            elapsed,
            lut.entry_count() as f64 / elapsed.max(1e-9)
        );
        Ok(lut)
    }

    /// Fail unless `lut` was populated by this trainer's configuration.
    pub fn check_lut(&self, lut: &Lut) -> Result<()> {
        lut.check_config(self.config())?;
        self.enumerator.check_shard_lengths(lut.store())
    }

    // ── Sweeps ──────────────────────────────────────────────────────────

    fn sweep_shard(&self, lut: &Lut, upper: u32, buffers: &mut EnumerationBuffers) -> Result<ShardUpdate> {
        let chunk = lut.store().chunk(upper);
        let mut values = Vec::with_capacity(chunk.len());
        let mut max_change = 0.0f64;

        self.enumerator
            .for_each_state_with_successors(upper, buffers, |lower, _, successors| {
                let index = values.len();
                if chunk.key_at(index) != Some(lower) {
                    return Err(Error::ShardOutOfSync { upper, index });
                }
                let mut value = 0.0;
                for roll in successors.rolls() {
                    let mut best = f64::NEG_INFINITY;
                    for &successor in roll.successors() {
                        best = best.max(successor.light_percent(|key| lut.get_canonical(key))?);
                    }
                    value += roll.probability * best;
                }
                max_change = max_change.max((value - chunk.get(index)).abs());
                values.push(value);
                Ok(())
            })?;

        if values.len() != chunk.len() {
            return Err(Error::ShardOutOfSync {
                upper,
                index: values.len(),
            });
        }
        Ok(ShardUpdate {
            upper,
            values,
            max_change,
        })
    }

    /// Shard groups processed one after another, each in parallel.
    fn layers(&self, order: SweepOrder) -> Vec<Vec<u32>> {
        let shards = self.enumerator.shard_keys();
        match order {
            SweepOrder::Jacobi => vec![shards],
            SweepOrder::Layered => {
                let pieces = self.encoder().topology().starting_pieces() as u32;
                (0..2 * pieces.saturating_sub(1) + 1)
                    .rev()
                    .map(|total| {
                        shards
                            .iter()
                            .copied()
                            .filter(|&upper| {
                                let (ls, ds) = self.encoder().scores(upper);
                                ls as u32 + ds as u32 == total
                            })
                            .collect::<Vec<_>>()
                    })
                    .filter(|layer| !layer.is_empty())
                    .collect()
            }
        }
    }

    /// Run one full sweep, updating `lut` in place. Returns the largest change.
    pub fn sweep(&self, lut: &mut Lut, order: SweepOrder, show_progress: bool) -> Result<f64> {
        let pb = create_state_progress(lut.entry_count(), order.name(), show_progress);
        let topology = self.encoder().topology().clone();
        let mut max_change = 0.0f64;

        for layer in self.layers(order) {
            let table: &Lut = lut;
            let updates: Vec<ShardUpdate> = layer
                .into_par_iter()
                .map_init(
                    || EnumerationBuffers::new(&topology),
                    |buffers, upper| -> Result<ShardUpdate> {
                        let update = self.sweep_shard(table, upper, buffers)?;
                        pb.inc(update.values.len() as u64);
                        Ok(update)
                    },
                )
                .collect::<Result<_>>()?;

            let store = lut.store_mut();
            for update in updates {
                max_change = max_change.max(update.max_change);
                let chunk = store.chunk_mut(update.upper);
                for (index, value) in update.values.into_iter().enumerate() {
                    chunk.set(index, value);
                }
            }
        }
        pb.finish_and_clear();
        Ok(max_change)
    }

    // ── Training loop ───────────────────────────────────────────────────

    /// Sweep until converged, or until `max_sweeps` is reached.
    pub fn train(&self, lut: &mut Lut, settings: &TrainSettings) -> Result<TrainOutcome> {
        self.train_with_observer(lut, settings, |_| ControlFlow::Continue(()))
    }

    /// Like [`LutTrainer::train`], calling `observer` after every sweep that did
    /// not converge. Returning `Break` stops training after a checkpoint.
    pub fn train_with_observer<F>(
        &self,
        lut: &mut Lut,
        settings: &TrainSettings,
        mut observer: F,
    ) -> Result<TrainOutcome>
    where
        F: FnMut(&SweepReport) -> ControlFlow<()>,
    {
        if !(settings.precision.is_finite() && settings.precision > 0.0) {
            return Err(Error::config(format!(
                "precision must be a positive number, got {}",
                settings.precision
            )));
        }
        if settings.checkpoint_interval == 0 {
            return Err(Error::config("checkpoint interval must be at least 1"));
        }
        self.check_lut(lut)?;

        let mut sweep: u32 = lut
            .annotation(ANNOTATION_SWEEPS)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let mut sweeps_this_run = 0u32;
        log::info!(
            "=== Training {} states to precision {} ({} order, resuming after sweep {}) ===",
            format_count(lut.entry_count()),
            settings.precision,
            settings.order,
            sweep
        );
        let total_start = Instant::now();

        loop {
            let sweep_start = Instant::now();
            let max_change = self.sweep(lut, settings.order, settings.show_progress)?;
            sweep += 1;
            sweeps_this_run += 1;

            let report = SweepReport {
                sweep,
                max_change,
                states: lut.entry_count(),
                elapsed: sweep_start.elapsed(),
            };
            log::info!(
                "Sweep {} completed in {:.2} s ({:.0} states/s), max change {:.6}",
                report.sweep,
                report.elapsed.as_secs_f64(),
                report.states_per_second(),
                report.max_change
            );

            lut.set_annotation(ANNOTATION_SWEEPS, sweep.to_string());
            lut.set_annotation(ANNOTATION_MAX_CHANGE, format!("{max_change:e}"));
            lut.set_annotation(ANNOTATION_PRECISION, settings.precision.to_string());
            lut.set_annotation(ANNOTATION_ORDER, settings.order.name());

            let outcome = if max_change < settings.precision {
                Some(TrainOutcome::Converged(report))
            } else if settings.max_sweeps.is_some_and(|max| sweeps_this_run >= max) {
                Some(TrainOutcome::SweepLimit(report))
            } else if observer(&report).is_break() {
                Some(TrainOutcome::Stopped(report))
            } else {
                None
            };

            if let Some(path) = &settings.checkpoint {
                if outcome.is_some() || sweeps_this_run % settings.checkpoint_interval == 0 {
                    write_lut(lut, path)?;
                    log::info!("Checkpoint after sweep {} written to {}", sweep, path.display());
                }
            }

            if let Some(outcome) = outcome {
                match outcome {
                    TrainOutcome::Converged(_) => log::info!(
                        "Converged after {} sweeps in {:.2} s",
                        sweep,
                        total_start.elapsed().as_secs_f64()
                    ),
                    TrainOutcome::SweepLimit(_) => log::warn!(
                        "Stopped at the sweep limit with max change {:.6} above precision {}",
                        max_change,
                        settings.precision
                    ),
                    TrainOutcome::Stopped(_) => log::info!("Training stopped after sweep {}", sweep),
                }
                return Ok(outcome);
            }
        }
    }

    /// Re-encode a trained table for final output.
    pub fn finish(&self, lut: &Lut, output_type: ValueType) -> Lut {
        let finished = lut.convert(output_type);
        log::info!(
            "Converted {} states from {} to {}",
            format_count(finished.entry_count()),
            lut.value_type(),
            output_type
        );
        finished
    }

    /// Train, then write the table as `output_type` to `output` if and only if
    /// training converged. Any previous output is replaced atomically.
    pub fn train_and_write(
        &self,
        lut: &mut Lut,
        settings: &TrainSettings,
        output: &Path,
        output_type: ValueType,
    ) -> Result<TrainOutcome> {
        let outcome = self.train(lut, settings)?;
        if outcome.is_converged() {
            write_lut(&self.finish(lut, output_type), output)?;
        } else {
            log::warn!("Not writing {}: training did not converge", output.display());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer(pieces: u8) -> LutTrainer {
        LutTrainer::new(GameConfig::finkel().with_starting_pieces(pieces)).unwrap()
    }

    #[test]
    fn test_populate_matches_count() {
        let t = trainer(2);
        let lut = t.populate_new_lut(ValueType::F32, false).unwrap();
        assert_eq!(lut.entry_count(), t.enumerator().count_states());
        assert!(lut.store().chunks().iter().all(|c| c.is_sorted()));
        let start = lut.new_game();
        let mut scratch = lut.new_game();
        assert_eq!(lut.get_light_win_percent(&start, &mut scratch).unwrap(), NEUTRAL_PRIOR);
    }

    #[test]
    fn test_layers_descend_by_total_score() {
        let t = trainer(3);
        let layers = t.layers(SweepOrder::Layered);
        let totals: Vec<u32> = layers
            .iter()
            .map(|layer| {
                let (ls, ds) = t.encoder().scores(layer[0]);
                ls as u32 + ds as u32
            })
            .collect();
        assert_eq!(totals, vec![4, 3, 2, 1, 0]);
        let shards: usize = layers.iter().map(Vec::len).sum();
        assert_eq!(shards, 9);
        assert_eq!(t.layers(SweepOrder::Jacobi).len(), 1);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let t = trainer(1);
        let mut lut = t.populate_new_lut(ValueType::F32, false).unwrap();
        let settings = TrainSettings {
            precision: 0.0,
            ..TrainSettings::default()
        };
        assert!(matches!(
            t.train(&mut lut, &settings),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_foreign_table() {
        let t = trainer(1);
        let mut lut = trainer(2).populate_new_lut(ValueType::F32, false).unwrap();
        assert!(t.train(&mut lut, &TrainSettings::default()).is_err());
    }

    #[test]
    fn test_sweep_limit_and_observer() {
        let t = trainer(1);
        let mut lut = t.populate_new_lut(ValueType::F32, false).unwrap();
        let settings = TrainSettings {
            precision: 1e-12,
            max_sweeps: Some(2),
            ..TrainSettings::default()
        };
        let outcome = t.train(&mut lut, &settings).unwrap();
        assert!(matches!(outcome, TrainOutcome::SweepLimit(r) if r.sweep == 2));

        let mut calls = 0;
        let settings = TrainSettings {
            precision: 1e-12,
            ..TrainSettings::default()
        };
        let outcome = t
            .train_with_observer(&mut lut, &settings, |_| {
                calls += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert!(matches!(outcome, TrainOutcome::Stopped(r) if r.sweep == 3));
        assert_eq!(calls, 1);
        assert_eq!(lut.annotation(ANNOTATION_SWEEPS), Some("3"));
    }

    #[test]
    fn test_one_piece_game_converges() {
        let t = trainer(1);
        let mut lut = t.populate_new_lut(ValueType::F32, false).unwrap();
        let outcome = t.train(&mut lut, &TrainSettings::default()).unwrap();
        assert!(outcome.is_converged());
        let start = lut.new_game();
        let mut scratch = lut.new_game();
        let value = lut.get_light_win_percent(&start, &mut scratch).unwrap();
        assert!(value > 40.0 && value < 70.0, "start value {value}");
    }
}
