//! Binary I/O for solved-state tables.
//!
//! Format (all integers little endian):
//!
//! | Field | Type | Notes |
//! |-------|------|-------|
//! | magic | `u32` | "URLT" (0x544C5255) |
//! | version | `u32` | [`LUT_FILE_VERSION`] |
//! | metadata length | `u32` | bytes of JSON that follow |
//! | metadata | JSON | [`LutMetadata`]: config, value type, entry count, annotations |
//! | shard count | `u32` | `(N + 1)^2` |
//! | shards | repeated | `upper: u32`, `len: u64`, `keys: [u32; len]`, `values: [width; len]` |
//!
//! Keys inside a shard are strictly ascending and every shard holds exactly the
//! configuration's canonical states for its scores. Checkpoints use the same
//! format, so any checkpoint is a complete table.
//!
//! Loading memory-maps the file via `memmap2` and validates every structural
//! invariant before a [`Lut`] is handed out. Writing goes to a `.tmp` sibling
//! that is renamed over the target, so a crash never leaves a torn table.

use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;

use crate::constants::*;
use crate::enumerator::StateEnumerator;
use crate::error::{Error, Result};
use crate::lut::{Lut, LutMetadata};
use crate::store::{Chunk, ShardedStore, ValueBuffer, ValueType};

/// Sibling path used while a write is in flight.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Writing ─────────────────────────────────────────────────────────────

fn write_values<W: Write>(w: &mut W, values: &ValueBuffer) -> io::Result<()> {
    match values {
        ValueBuffer::U8(v) => w.write_all(v),
        ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => {
            v.iter().try_for_each(|&x| w.write_u16::<LittleEndian>(x))
        }
        ValueBuffer::U32(v) => v.iter().try_for_each(|&x| w.write_u32::<LittleEndian>(x)),
        ValueBuffer::U64(v) => v.iter().try_for_each(|&x| w.write_u64::<LittleEndian>(x)),
        ValueBuffer::F32(v) => v.iter().try_for_each(|&x| w.write_f32::<LittleEndian>(x)),
    }
}

fn write_body<W: Write>(w: &mut W, metadata_json: &[u8], store: &ShardedStore) -> io::Result<()> {
    w.write_u32::<LittleEndian>(LUT_FILE_MAGIC)?;
    w.write_u32::<LittleEndian>(LUT_FILE_VERSION)?;
    w.write_u32::<LittleEndian>(metadata_json.len() as u32)?;
    w.write_all(metadata_json)?;
    w.write_u32::<LittleEndian>(store.shard_count())?;
    for chunk in store.chunks() {
        w.write_u32::<LittleEndian>(chunk.upper())?;
        w.write_u64::<LittleEndian>(chunk.len() as u64)?;
        for &key in chunk.keys() {
            w.write_u32::<LittleEndian>(key)?;
        }
        write_values(w, chunk.values())?;
    }
    w.flush()
}

/// Write `lut` to `path`, atomically replacing any existing file.
///
/// Every shard must be sorted; unsorted shards would not survive validation on
/// the way back in.
pub fn write_lut(lut: &Lut, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let start_time = Instant::now();

    if let Some(chunk) = lut.store().chunks().iter().find(|c| !c.is_sorted()) {
        return Err(Error::ShardOutOfSync {
            upper: chunk.upper(),
            index: 0,
        });
    }
    let metadata_json = serde_json::to_vec(lut.metadata())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io("create directory", parent, e))?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(|e| Error::io("create", &tmp, e))?;
    let mut writer = BufWriter::with_capacity(1 << 20, file);
    write_body(&mut writer, &metadata_json, lut.store()).map_err(|e| Error::io("write", &tmp, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io("flush", &tmp, e.into_error()))?;
    file.sync_all().map_err(|e| Error::io("sync", &tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| Error::io("rename", path, e))?;

    log::info!(
        "Wrote {} entries ({}) to {} in {:.2} ms",
        lut.entry_count(),
        lut.value_type(),
        path.display(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

// ── Reading ─────────────────────────────────────────────────────────────

fn read_values(cursor: &mut Cursor<&[u8]>, value_type: ValueType, len: usize) -> io::Result<ValueBuffer> {
    Ok(match value_type {
        ValueType::U8 => {
            let mut v = vec![0u8; len];
            cursor.read_exact(&mut v)?;
            ValueBuffer::U8(v)
        }
        ValueType::U16 | ValueType::Percent16 => {
            let mut v = vec![0u16; len];
            cursor.read_u16_into::<LittleEndian>(&mut v)?;
            if value_type == ValueType::U16 {
                ValueBuffer::U16(v)
            } else {
                ValueBuffer::Percent16(v)
            }
        }
        ValueType::U32 => {
            let mut v = vec![0u32; len];
            cursor.read_u32_into::<LittleEndian>(&mut v)?;
            ValueBuffer::U32(v)
        }
        ValueType::U64 => {
            let mut v = vec![0u64; len];
            cursor.read_u64_into::<LittleEndian>(&mut v)?;
            ValueBuffer::U64(v)
        }
        ValueType::F32 => {
            let mut v = vec![0f32; len];
            cursor.read_f32_into::<LittleEndian>(&mut v)?;
            ValueBuffer::F32(v)
        }
    })
}

fn parse_lut(path: &Path, bytes: &[u8]) -> Result<Lut> {
    let truncated = |_: io::Error| Error::corrupt(path, "file is truncated");
    let mut cursor = Cursor::new(bytes);

    let magic = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if magic != LUT_FILE_MAGIC || version != LUT_FILE_VERSION {
        return Err(Error::corrupt(
            path,
            format!("invalid file format (magic=0x{magic:08x} version={version})"),
        ));
    }

    let metadata_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let mut metadata_json = vec![0u8; metadata_len.min(bytes.len())];
    cursor.read_exact(&mut metadata_json).map_err(truncated)?;
    let metadata: LutMetadata = serde_json::from_slice(&metadata_json)
        .map_err(|e| Error::corrupt(path, format!("unreadable metadata: {e}")))?;
    let encoder = Lut::encoder_for(metadata.config)?;
    let enumerator = StateEnumerator::new(encoder.clone());
    let value_type = metadata.value_type;

    let shard_count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if shard_count != encoder.shard_count() {
        return Err(Error::corrupt(
            path,
            format!(
                "{shard_count} shards stored, configuration needs {}",
                encoder.shard_count()
            ),
        ));
    }

    let entry_width = 4 + value_type.width() as u64;
    let mut chunks = Vec::with_capacity(shard_count as usize);
    for expected_upper in 0..shard_count {
        let upper = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if upper != expected_upper {
            return Err(Error::corrupt(
                path,
                format!("shard {upper} found where shard {expected_upper} was expected"),
            ));
        }
        let len = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        let expected_len = enumerator.count_shard(upper);
        if len != expected_len {
            return Err(Error::corrupt(
                path,
                format!("shard {upper} holds {len} entries, configuration has {expected_len} states"),
            ));
        }
        let remaining = bytes.len() as u64 - cursor.position();
        if len.saturating_mul(entry_width) > remaining {
            return Err(Error::corrupt(
                path,
                format!("shard {upper} claims {len} entries but only {remaining} bytes remain"),
            ));
        }
        let len = len as usize;

        let mut keys = vec![0u32; len];
        cursor.read_u32_into::<LittleEndian>(&mut keys).map_err(truncated)?;
        if let Some(i) = keys.windows(2).position(|w| w[0] >= w[1]) {
            return Err(Error::corrupt(
                path,
                format!("shard {upper} keys are not strictly ascending at index {}", i + 1),
            ));
        }
        let values = read_values(&mut cursor, value_type, len).map_err(truncated)?;
        chunks.push(Chunk::from_sorted_parts(upper, keys, values));
    }

    if cursor.position() != bytes.len() as u64 {
        return Err(Error::corrupt(
            path,
            format!("{} trailing bytes", bytes.len() as u64 - cursor.position()),
        ));
    }

    let store = ShardedStore::from_chunks(value_type, chunks);
    if store.entry_count() != metadata.entry_count {
        return Err(Error::corrupt(
            path,
            format!(
                "metadata declares {} entries, shards hold {}",
                metadata.entry_count,
                store.entry_count()
            ),
        ));
    }
    Ok(Lut::from_parts(encoder, store, metadata.annotations))
}

/// Load and validate a table via mmap.
pub fn read_lut(path: impl AsRef<Path>) -> Result<Lut> {
    let path = path.as_ref();
    let start_time = Instant::now();
    log::info!("Loading table from {}...", path.display());

    let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
    // SAFETY: the mapping is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io("memory map", path, e))?;
    let lut = parse_lut(path, &mmap)?;

    log::info!(
        "Loaded {} entries ({}) in {:.2} ms",
        lut.entry_count(),
        lut.value_type(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );
    Ok(lut)
}

/// Load a table and reject it unless it stores `value_type` values.
pub fn read_lut_expecting(path: impl AsRef<Path>, value_type: ValueType) -> Result<Lut> {
    let lut = read_lut(path)?;
    if lut.value_type() != value_type {
        return Err(Error::WrongValueType {
            expected: value_type,
            found: lut.value_type(),
        });
    }
    Ok(lut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::trainer::LutTrainer;

    fn sample_lut(value_type: ValueType) -> Lut {
        let mut lut = LutTrainer::new(GameConfig::finkel().with_starting_pieces(1))
            .unwrap()
            .populate_new_lut(value_type, false)
            .unwrap();
        let chunk = lut.store_mut().chunk_mut(0);
        for (index, percent) in [(0, 10.0), (1, 99.5), (2, 0.0)] {
            chunk.set(index, percent);
        }
        lut.set_author("tests");
        lut
    }

    /// `lut` with shard 0 cut down to its first entry.
    fn short_lut(value_type: ValueType) -> Lut {
        let mut lut = sample_lut(value_type);
        let full = lut.store().chunk(0);
        let mut short = Chunk::new(0, value_type);
        short.add_entry(full.key_at(0).unwrap(), full.get(0));
        lut.store_mut().insert_chunk(short).unwrap();
        lut.refresh_entry_count();
        lut
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.lut");
        for vt in ValueType::ALL {
            let lut = sample_lut(vt);
            write_lut(&lut, &path).unwrap();
            let loaded = read_lut(&path).unwrap();
            assert_eq!(loaded.metadata(), lut.metadata());
            for chunk in lut.store().chunks() {
                let other = loaded.store().chunk(chunk.upper());
                assert_eq!(other.keys(), chunk.keys());
                assert_eq!(other.values(), chunk.values());
            }
            assert!(!temp_path(&path).exists());
        }
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.lut");
        write_lut(&sample_lut(ValueType::U16), &path).unwrap();
        assert!(matches!(
            read_lut_expecting(&path, ValueType::F32),
            Err(Error::WrongValueType { .. })
        ));
        assert!(read_lut_expecting(&path, ValueType::U16).is_ok());
    }

    #[test]
    fn test_corrupt_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.lut");
        write_lut(&sample_lut(ValueType::U32), &path).unwrap();
        let bytes = fs::read(&path).unwrap();

        let truncated = dir.path().join("truncated.lut");
        fs::write(&truncated, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(read_lut(&truncated), Err(Error::Corrupt { .. })));

        let mut trailing = bytes.clone();
        trailing.push(0);
        let trailing_path = dir.path().join("trailing.lut");
        fs::write(&trailing_path, &trailing).unwrap();
        assert!(matches!(read_lut(&trailing_path), Err(Error::Corrupt { .. })));

        let mut bad_magic = bytes;
        bad_magic[0] ^= 0xFF;
        let bad_magic_path = dir.path().join("magic.lut");
        fs::write(&bad_magic_path, &bad_magic).unwrap();
        assert!(matches!(read_lut(&bad_magic_path), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_incomplete_shard_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.lut");
        let lut = short_lut(ValueType::F32);
        assert_eq!(lut.store().chunk(0).len(), 1);

        // Structurally valid: sorted keys and a matching entry count.
        write_lut(&lut, &path).unwrap();
        match read_lut(&path) {
            Err(Error::Corrupt { message, .. }) => assert!(message.contains("shard 0"), "{message}"),
            other => panic!("expected a corrupt-file error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_lut(dir.path().join("absent.lut")),
            Err(Error::Io { .. })
        ));
    }
}
