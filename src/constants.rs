//! Fixed capacities, key layout and file-format constants.
//!
//! The capacities bound every supported configuration so that the fast game
//! representation can live in fixed-size arrays:
//! - [`MAX_TILES`] = 24 board tiles (Standard and Aseb boards both use 20)
//! - [`MAX_PATH`] = 16 on-board tiles per player path (Masters and Aseb)
//! - [`MAX_PIECES`] = 7 starting pieces per player
//! - [`MAX_MOVES`] = legal moves after one roll (one per piece plus introduce)
//!
//! State keys are `u64`: `upper << LOWER_KEY_BITS | lower`. The lower part is
//! stored in the shard chunks as `u32`, so it must fit in [`LOWER_KEY_BITS`].

/// Largest board supported by the fast representation.
pub const MAX_TILES: usize = 24;

/// Longest on-board path per player.
pub const MAX_PATH: usize = 16;

/// Largest starting piece count per player.
pub const MAX_PIECES: usize = 7;

/// Maximum number of legal moves for a single roll.
pub const MAX_MOVES: usize = MAX_PIECES + 1;

/// Highest dice roll of any supported dice kind.
pub const MAX_ROLL: usize = 4;

/// Number of low-order key bits addressing a state inside its shard.
pub const LOWER_KEY_BITS: u32 = 32;

/// Mask selecting the lower key.
pub const LOWER_KEY_MASK: u64 = (1u64 << LOWER_KEY_BITS) - 1;

/// Win percentage given to every state before the first sweep.
pub const NEUTRAL_PRIOR: f64 = 50.0;

/// Default convergence threshold for training, in percentage points.
pub const DEFAULT_PRECISION: f64 = 0.0001;

/// Table file magic number: "URLT" in little-endian hex.
pub const LUT_FILE_MAGIC: u32 = 0x544C_5255;

/// Table file format version.
pub const LUT_FILE_VERSION: u32 = 1;

/// Depth side file magic number: "URDP" in little-endian hex.
pub const DEPTH_FILE_MAGIC: u32 = 0x5044_5255;

/// Depth side file format version.
pub const DEPTH_FILE_VERSION: u32 = 1;

/// Depth marker for states the relaxation never reached.
pub const DEPTH_UNKNOWN: u8 = u8::MAX;

/// Largest depth recorded; deeper states saturate here.
pub const DEPTH_MAX: u8 = u8::MAX - 1;

/// Annotation keys written by the trainer.
pub const ANNOTATION_AUTHOR: &str = "author";
pub const ANNOTATION_SWEEPS: &str = "training.sweeps";
pub const ANNOTATION_MAX_CHANGE: &str = "training.max_change";
pub const ANNOTATION_PRECISION: &str = "training.precision";
pub const ANNOTATION_ORDER: &str = "training.order";
