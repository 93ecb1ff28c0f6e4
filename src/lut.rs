//! Solved-state table: one sorted shard per upper key plus metadata.
//!
//! The table only holds canonical, unfinished positions (light to move). Every
//! other position is answered from them:
//!
//! - finished positions are exact: 100 if light has won, 0 otherwise
//! - dark-to-move positions are mirrored and the value complemented
//!
//! A lookup that misses is a population bug and is returned as
//! [`Error::MissingState`], never replaced by a default.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::constants::*;
use crate::encoding::StateEncoder;
use crate::error::{Error, Result};
use crate::fast_game::FastGame;
use crate::store::{ShardedStore, ValueType};
use crate::topology::Topology;

/// Header data persisted with every table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LutMetadata {
    pub config: GameConfig,
    pub value_type: ValueType,
    pub entry_count: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct Lut {
    metadata: LutMetadata,
    encoder: Arc<StateEncoder>,
    store: ShardedStore,
}

impl Lut {
    /// An empty table for `encoder`'s configuration.
    pub fn new(encoder: Arc<StateEncoder>, value_type: ValueType) -> Self {
        let store = ShardedStore::new(encoder.shard_count(), value_type);
        Self::from_parts(encoder, store, BTreeMap::new())
    }

    pub(crate) fn from_parts(
        encoder: Arc<StateEncoder>,
        store: ShardedStore,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        let metadata = LutMetadata {
            config: *encoder.topology().config(),
            value_type: store.value_type(),
            entry_count: store.entry_count(),
            annotations,
        };
        Self {
            metadata,
            encoder,
            store,
        }
    }

    /// Build an encoder for `config`, validating it.
    pub fn encoder_for(config: GameConfig) -> Result<Arc<StateEncoder>> {
        let topology = Arc::new(Topology::new(config)?);
        Ok(Arc::new(StateEncoder::new(topology)))
    }

    // ── Metadata ────────────────────────────────────────────────────────

    pub fn metadata(&self) -> &LutMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &GameConfig {
        &self.metadata.config
    }

    pub fn value_type(&self) -> ValueType {
        self.metadata.value_type
    }

    pub fn entry_count(&self) -> u64 {
        self.metadata.entry_count
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Annotations may be added or replaced at any time before the final write.
    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.annotations.insert(key.into(), value.into());
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.set_annotation(ANNOTATION_AUTHOR, author);
    }

    pub fn encoder(&self) -> &Arc<StateEncoder> {
        &self.encoder
    }

    pub fn topology(&self) -> &Arc<Topology> {
        self.encoder.topology()
    }

    pub fn store(&self) -> &ShardedStore {
        &self.store
    }

    /// Mutable access to values. Keys must not change after population.
    pub(crate) fn store_mut(&mut self) -> &mut ShardedStore {
        &mut self.store
    }

    /// Recount entries after the store was rebuilt.
    pub(crate) fn refresh_entry_count(&mut self) {
        self.metadata.entry_count = self.store.entry_count();
    }

    /// A fresh scratch state for queries against this table.
    pub fn new_game(&self) -> FastGame {
        FastGame::new(self.topology().clone())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Stored win percentage of a canonical key.
    #[inline]
    pub fn get_canonical(&self, key: u64) -> Result<f64> {
        self.store.get(key)
    }

    /// Probability, in percent, that light wins from `state` under optimal play.
    pub fn get_light_win_percent(&self, state: &FastGame, scratch: &mut FastGame) -> Result<f64> {
        if state.is_finished() {
            return Ok(if state.light_won() { 100.0 } else { 0.0 });
        }
        let canonical = self.encoder.canonicalize(state, scratch);
        let key = self.encoder.encode(canonical.state());
        let value = self.get_canonical(key)?;
        Ok(canonical.light_percent(value))
    }

    /// The same table with values re-encoded as `value_type`.
    pub fn convert(&self, value_type: ValueType) -> Lut {
        if value_type == self.value_type() {
            return self.clone();
        }
        let mut converted = Self::from_parts(
            self.encoder.clone(),
            self.store.convert(value_type),
            self.metadata.annotations.clone(),
        );
        converted.metadata.entry_count = self.entry_count();
        converted
    }

    /// Fail unless this table was built for `config`.
    pub fn check_config(&self, config: &GameConfig) -> Result<()> {
        if self.config() != config {
            return Err(Error::config(format!(
                "table was built for {} but {} was requested",
                self.config().descriptor(),
                config.descriptor()
            )));
        }
        Ok(())
    }
}
