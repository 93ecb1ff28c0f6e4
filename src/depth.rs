//! Depth side file: shortest move distance from the starting position.
//!
//! Depths are found by repeated relaxation over the canonical state graph:
//! the starting position has depth 0, and every pass lowers each successor's
//! depth to `depth + 1` until a full pass changes nothing. Values saturate at
//! [`DEPTH_MAX`]; [`DEPTH_UNKNOWN`] marks states the relaxation never reached.
//!
//! Each shard's depths are stored in the same order as the table's chunk, one
//! byte per entry. Relaxation writes go through `AtomicU8::fetch_min`, so
//! workers can relax successors in any shard while the pass is running.
//!
//! File layout (little endian): magic "URDP", version, shard count, then per
//! shard `upper: u32`, `len: u64`, `len` depth bytes.

use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;

use crate::constants::*;
use crate::encoding::calc_upper_key;
use crate::enumerator::{EnumerationBuffers, StateEnumerator, Successor};
use crate::error::{Error, Result};
use crate::fast_game::FastGame;
use crate::lut::Lut;
use crate::storage::temp_path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthMap {
    shards: Vec<Vec<u8>>,
}

impl DepthMap {
    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    pub fn shard(&self, upper: u32) -> &[u8] {
        &self.shards[upper as usize]
    }

    #[inline]
    pub fn depth_at(&self, upper: u32, index: usize) -> u8 {
        self.shards[upper as usize][index]
    }

    /// Depth of a canonical key, resolved through `lut`'s index.
    pub fn depth_of(&self, lut: &Lut, key: u64) -> Result<u8> {
        let (upper, index) = lut.store().index_of(key).ok_or(Error::MissingState {
            key,
            upper: calc_upper_key(key),
        })?;
        Ok(self.depth_at(upper, index))
    }

    /// Number of states with a known depth.
    pub fn reached(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.iter().filter(|&&d| d != DEPTH_UNKNOWN).count() as u64)
            .sum()
    }

    /// Deepest known depth.
    pub fn max_depth(&self) -> Option<u8> {
        self.shards
            .iter()
            .flat_map(|s| s.iter().copied())
            .filter(|&d| d != DEPTH_UNKNOWN)
            .max()
    }
}

/// Relax depths over `lut`'s state graph until no pass lowers any value.
pub fn compute_depths(lut: &Lut) -> Result<DepthMap> {
    let start_time = Instant::now();
    let enumerator = StateEnumerator::new(lut.encoder().clone());
    let store = lut.store();
    enumerator.check_shard_lengths(store)?;
    let depths: Vec<Vec<AtomicU8>> = store
        .chunks()
        .iter()
        .map(|c| (0..c.len()).map(|_| AtomicU8::new(DEPTH_UNKNOWN)).collect())
        .collect();

    let start = FastGame::new(lut.topology().clone());
    let mut scratch = lut.new_game();
    let start_key = lut.encoder().encode_canonical(&start, &mut scratch);
    let (upper, index) = store.index_of(start_key).ok_or(Error::MissingState {
        key: start_key,
        upper: calc_upper_key(start_key),
    })?;
    depths[upper as usize][index].store(0, Ordering::Relaxed);

    let topology = lut.topology().clone();
    let mut pass = 0u32;
    loop {
        pass += 1;
        let changed = AtomicBool::new(false);
        enumerator
            .shard_keys()
            .into_par_iter()
            .try_for_each_init(
                || EnumerationBuffers::new(&topology),
                |buffers, upper| -> Result<()> {
                    let shard = &depths[upper as usize];
                    let chunk = store.chunk(upper);
                    let mut index = 0usize;
                    enumerator.for_each_state_with_successors(upper, buffers, |lower, _, successors| {
                        if chunk.key_at(index) != Some(lower) {
                            return Err(Error::ShardOutOfSync { upper, index });
                        }
                        let depth = shard[index].load(Ordering::Relaxed);
                        index += 1;
                        if depth == DEPTH_UNKNOWN {
                            return Ok(());
                        }
                        let next = depth.saturating_add(1).min(DEPTH_MAX);
                        for roll in successors.rolls() {
                            for &successor in roll.successors() {
                                let Successor::State { key, .. } = successor else {
                                    continue;
                                };
                                let (u, i) = store.index_of(key).ok_or(Error::MissingState {
                                    key,
                                    upper: calc_upper_key(key),
                                })?;
                                if depths[u as usize][i].fetch_min(next, Ordering::Relaxed) > next {
                                    changed.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                        Ok(())
                    })
                },
            )?;
        log::info!("Depth pass {} finished", pass);
        if !changed.load(Ordering::Relaxed) {
            break;
        }
    }

    let map = DepthMap {
        shards: depths
            .into_iter()
            .map(|s| s.into_iter().map(AtomicU8::into_inner).collect())
            .collect(),
    };
    log::info!(
        "Depths of {} states computed in {} passes ({:.2} s), max depth {:?}",
        map.reached(),
        pass,
        start_time.elapsed().as_secs_f64(),
        map.max_depth()
    );
    Ok(map)
}

fn write_body<W: Write>(w: &mut W, map: &DepthMap) -> io::Result<()> {
    w.write_u32::<LittleEndian>(DEPTH_FILE_MAGIC)?;
    w.write_u32::<LittleEndian>(DEPTH_FILE_VERSION)?;
    w.write_u32::<LittleEndian>(map.shard_count())?;
    for (upper, shard) in map.shards.iter().enumerate() {
        w.write_u32::<LittleEndian>(upper as u32)?;
        w.write_u64::<LittleEndian>(shard.len() as u64)?;
        w.write_all(shard)?;
    }
    w.flush()
}

/// Write `map` to `path`, atomically replacing any existing file.
pub fn write_depths(map: &DepthMap, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io("create directory", parent, e))?;
    }
    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(|e| Error::io("create", &tmp, e))?;
    let mut writer = BufWriter::new(file);
    write_body(&mut writer, map).map_err(|e| Error::io("write", &tmp, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io("flush", &tmp, e.into_error()))?;
    file.sync_all().map_err(|e| Error::io("sync", &tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| Error::io("rename", path, e))?;
    log::info!("Wrote depths for {} shards to {}", map.shard_count(), path.display());
    Ok(())
}

pub fn read_depths(path: impl AsRef<Path>) -> Result<DepthMap> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::io("read", path, e))?;
    let truncated = |_: io::Error| Error::corrupt(path, "file is truncated");
    let mut cursor = Cursor::new(bytes.as_slice());

    let magic = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if magic != DEPTH_FILE_MAGIC || version != DEPTH_FILE_VERSION {
        return Err(Error::corrupt(
            path,
            format!("invalid depth file (magic=0x{magic:08x} version={version})"),
        ));
    }
    let shard_count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut shards = Vec::with_capacity(shard_count as usize);
    for expected in 0..shard_count {
        let upper = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if upper != expected {
            return Err(Error::corrupt(path, format!("shard {upper} out of order")));
        }
        let len = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        if len > bytes.len() as u64 - cursor.position() {
            return Err(Error::corrupt(path, format!("shard {upper} is truncated")));
        }
        let mut shard = vec![0u8; len as usize];
        cursor.read_exact(&mut shard).map_err(truncated)?;
        shards.push(shard);
    }
    if cursor.position() != bytes.len() as u64 {
        return Err(Error::corrupt(path, "trailing bytes after the last shard"));
    }
    Ok(DepthMap { shards })
}
