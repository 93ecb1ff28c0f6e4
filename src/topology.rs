//! Validated game topology: the precomputed tables derived from a [`GameConfig`].
//!
//! Tiles are numbered globally in order of first appearance along light's path,
//! then dark's. Each player's path is a table from path index to tile index, and
//! each tile records its index along both paths (0 when off that path). Tiles on
//! both paths are *shared*; the rest are *private* to one player. The encoder
//! walks these slot lists in a fixed order, so they define the key layout.

use crate::config::{GameConfig, Tile};
use crate::constants::*;
use crate::error::{Error, Result};

/// One roll value with non-zero probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollOutcome {
    pub roll: u8,
    pub probability: f64,
}

#[derive(Clone, Debug)]
pub struct Topology {
    config: GameConfig,
    tiles: Vec<Tile>,
    path_len: u8,
    light_path: [u8; MAX_PATH],
    dark_path: [u8; MAX_PATH],
    /// Index of each tile along light's path (1-based, 0 = not on the path).
    light_index: [u8; MAX_TILES],
    dark_index: [u8; MAX_TILES],
    mirror: [u8; MAX_TILES],
    rosette: [bool; MAX_TILES],
    shared: Vec<u8>,
    light_private: Vec<u8>,
    dark_private: Vec<u8>,
    rolls: Vec<RollOutcome>,
}

impl Topology {
    /// Validate `config` and build its tables.
    ///
    /// Rejects piece counts outside `1..=MAX_PIECES`, paths that leave the board
    /// or revisit a tile, path pairs that are not mirror images, and layouts whose
    /// lower key would not fit in [`LOWER_KEY_BITS`].
    pub fn new(config: GameConfig) -> Result<Self> {
        if config.starting_pieces == 0 || config.starting_pieces as usize > MAX_PIECES {
            return Err(Error::config(format!(
                "starting pieces must be in 1..={MAX_PIECES}, got {}",
                config.starting_pieces
            )));
        }

        let light = config.paths.light_path();
        let dark = config.paths.dark_path();
        if light.len() != dark.len() || light.is_empty() || light.len() > MAX_PATH {
            return Err(Error::config(format!(
                "paths must share a length in 1..={MAX_PATH}, got {} and {}",
                light.len(),
                dark.len()
            )));
        }
        for path in [&light, &dark] {
            for (i, &tile) in path.iter().enumerate() {
                if !config.board.contains(tile) {
                    return Err(Error::config(format!(
                        "{:?} path visits {tile}, which is not on the {:?} board",
                        config.paths, config.board
                    )));
                }
                if path[..i].contains(&tile) {
                    return Err(Error::config(format!(
                        "{:?} path visits {tile} twice",
                        config.paths
                    )));
                }
            }
        }

        let mut tiles: Vec<Tile> = Vec::new();
        for &tile in light.iter().chain(dark.iter()) {
            if !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }
        if tiles.len() > MAX_TILES {
            return Err(Error::config(format!(
                "{} tiles exceed the supported {MAX_TILES}",
                tiles.len()
            )));
        }
        let index_of = |tile: Tile| tiles.iter().position(|&t| t == tile);

        let mut light_path = [0u8; MAX_PATH];
        let mut dark_path = [0u8; MAX_PATH];
        let mut light_index = [0u8; MAX_TILES];
        let mut dark_index = [0u8; MAX_TILES];
        for (i, (&l, &d)) in light.iter().zip(dark.iter()).enumerate() {
            let (li, di) = (index_of(l).unwrap_or(0), index_of(d).unwrap_or(0));
            light_path[i] = li as u8;
            dark_path[i] = di as u8;
            light_index[li] = (i + 1) as u8;
            dark_index[di] = (i + 1) as u8;
        }

        let mut mirror = [0u8; MAX_TILES];
        let mut rosette = [false; MAX_TILES];
        for (i, &tile) in tiles.iter().enumerate() {
            let m = index_of(tile.mirrored()).ok_or_else(|| {
                Error::config(format!("tile {tile} has no mirror image on the paths"))
            })?;
            mirror[i] = m as u8;
            rosette[i] = config.board.is_rosette(tile);
        }

        let mut shared = Vec::new();
        let mut light_private = Vec::new();
        for &t in &light_path[..light.len()] {
            if dark_index[t as usize] != 0 {
                shared.push(t);
            } else {
                light_private.push(t);
            }
        }
        let dark_private: Vec<u8> = dark_path[..dark.len()]
            .iter()
            .copied()
            .filter(|&t| light_index[t as usize] == 0)
            .collect();
        let symmetric = light_private.len() == dark_private.len()
            && light_private
                .iter()
                .zip(&dark_private)
                .all(|(&l, &d)| mirror[l as usize] == d);
        if !symmetric {
            return Err(Error::config(format!(
                "{:?} private tiles are not mirror images of each other",
                config.paths
            )));
        }

        let lower_radix = 3f64.powi(shared.len() as i32)
            * 2f64.powi((light_private.len() + dark_private.len() + 1) as i32);
        if lower_radix > (1u64 << LOWER_KEY_BITS) as f64 {
            return Err(Error::config(format!(
                "{} shared and {} private tiles do not fit a {LOWER_KEY_BITS}-bit lower key",
                shared.len(),
                light_private.len() + dark_private.len()
            )));
        }

        let rolls = config
            .dice
            .roll_probabilities()
            .iter()
            .enumerate()
            .filter(|(_, &p)| p > 0.0)
            .map(|(roll, &probability)| RollOutcome {
                roll: roll as u8,
                probability,
            })
            .collect();

        Ok(Self {
            config,
            tiles,
            path_len: light.len() as u8,
            light_path,
            dark_path,
            light_index,
            dark_index,
            mirror,
            rosette,
            shared,
            light_private,
            dark_private,
            rolls,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    #[inline(always)]
    pub fn starting_pieces(&self) -> u8 {
        self.config.starting_pieces
    }

    /// Number of on-board tiles along each path.
    #[inline(always)]
    pub fn path_len(&self) -> u8 {
        self.path_len
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile(&self, index: usize) -> Tile {
        self.tiles[index]
    }

    /// Tile index at 1-based `path_index` of the given player's path.
    #[inline(always)]
    pub fn path_tile(&self, light: bool, path_index: u8) -> usize {
        debug_assert!((1..=self.path_len).contains(&path_index));
        let path = if light { &self.light_path } else { &self.dark_path };
        path[path_index as usize - 1] as usize
    }

    /// 1-based index of `tile` along the given player's path, 0 if off the path.
    #[inline(always)]
    pub fn path_index(&self, light: bool, tile: usize) -> u8 {
        if light {
            self.light_index[tile]
        } else {
            self.dark_index[tile]
        }
    }

    #[inline(always)]
    pub fn mirror_tile(&self, tile: usize) -> usize {
        self.mirror[tile] as usize
    }

    #[inline(always)]
    pub fn is_rosette(&self, tile: usize) -> bool {
        self.rosette[tile]
    }

    /// Shared tiles, ordered along light's path.
    pub fn shared_tiles(&self) -> &[u8] {
        &self.shared
    }

    pub fn light_private_tiles(&self) -> &[u8] {
        &self.light_private
    }

    pub fn dark_private_tiles(&self) -> &[u8] {
        &self.dark_private
    }

    /// Roll values with non-zero probability, ascending.
    pub fn rolls(&self) -> &[RollOutcome] {
        &self.rolls
    }

    pub fn roll_probability(&self, roll: u8) -> f64 {
        self.rolls
            .iter()
            .find(|r| r.roll == roll)
            .map_or(0.0, |r| r.probability)
    }
}
