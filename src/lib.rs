//! # ur-lut: Solved-Game Lookup Tables for the Royal Game of Ur
//!
//! Computes the probability that light wins from every position of a Royal
//! Game of Ur variant under optimal play by both players, stores it in a
//! compact sharded table, and answers queries against it.
//!
//! ## Pipeline
//!
//! | Step | Rust module | Description |
//! |------|-------------|-------------|
//! | 0 | [`config`], [`topology`] | Validate a variant (board, paths, dice, pieces, rules) and precompute its tile tables |
//! | 1 | [`enumerator`] | Walk every canonical (light-to-move, unfinished) state in key order |
//! | 2 | [`trainer::LutTrainer::populate_new_lut`] | Give every canonical state a neutral prior of 50% |
//! | 3 | [`trainer::LutTrainer::train`] | Value iteration until the largest change in a sweep drops below the precision |
//! | 4 | [`storage`] | Persist checkpoints and the final table, re-encoded to a compact value type |
//! | 5 | [`depth`] | Optional side file with each state's move distance from the start |
//!
//! ## State representation
//!
//! A position is a [`fast_game::FastGame`]: one signed byte per board tile,
//! waiting and scored piece counters per player, the turn flag. Its key is
//! `upper << 32 | lower` with `upper = light_score * (N + 1) + dark_score` and
//! `lower` a mixed-radix number over the tiles (see [`encoding`]). Dark-to-move
//! positions are mirrored onto light-to-move ones, which halves the table.
//!
//! ## Differences from a plain backward induction
//!
//! - **Cycles**: captures return pieces to the start, so states can repeat and
//!   values are found by iterating to a fixed point instead of one pass.
//! - **Sharding**: one sorted chunk per `upper` key. Shards are the unit of
//!   parallel work and of ownership during a sweep.
//! - **Finished states are not stored**: their value is exactly 100 or 0.

pub mod config;
pub mod constants;
pub mod depth;
pub mod encoding;
pub mod enumerator;
pub mod env_config;
pub mod error;
pub mod fast_game;
pub mod lut;
pub mod progress;
pub mod server;
pub mod storage;
pub mod store;
pub mod topology;
pub mod trainer;

pub use config::GameConfig;
pub use error::{Error, Result};
pub use fast_game::{FastGame, GameSnapshot};
pub use lut::Lut;
pub use store::ValueType;
pub use trainer::{LutTrainer, SweepOrder, TrainOutcome, TrainSettings};
