//! Layer storage backends: plain heap, read-only mmap, and block-compressed.
//!
//! On-disk formats: `egdb_<s>.bin` is the raw table in rank order;
//! `egdb_<s>.zstddb` is the block-compressed form with a trained dictionary
//! (see the header layout in `save_compressed`). A compressed layer is
//! probed by decompressing the single block containing the entry into a
//! stack buffer.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use cfg_if::cfg_if;
use zstd::bulk::{Compressor, Decompressor};
use zstd::dict::{DecoderDictionary, EncoderDictionary};

pub const ZSTD_MAGIC: u32 = 0x4454_535A;
pub const BLOCK_SIZE: usize = 256;

/// Largest per-block entry count accepted when reading foreign files; the
/// probe scratch buffer is this big.
const MAX_BLOCK_SIZE: usize = 1024;

const DICT_CAPACITY: usize = 110 * 1024;
const COMPRESSION_LEVEL: i32 = 22;
const MAX_DICT_SAMPLES: usize = 100_000;

/// How generated layers are kept in memory and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Direct,
    Mmap,
    BlockCompressed,
}

fn bin_path(dir: &Path, stones: usize) -> PathBuf {
    dir.join(format!("egdb_{stones}.bin"))
}

fn zstd_path(dir: &Path, stones: usize) -> PathBuf {
    dir.join(format!("egdb_{stones}.zstddb"))
}

#[inline]
fn table_bytes(table: &[i8]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(table.as_ptr().cast(), table.len()) }
}

fn table_into_bytes(table: Vec<i8>) -> Vec<u8> {
    let mut table = std::mem::ManuallyDrop::new(table);
    unsafe { Vec::from_raw_parts(table.as_mut_ptr().cast(), table.len(), table.capacity()) }
}

/// A resident layer in one of the three backend representations.
pub enum LayerData {
    Direct(Vec<u8>),
    #[cfg(any(unix, windows))]
    Mmap(memmap2::Mmap),
    Compressed(CompressedLayer),
}

impl LayerData {
    /// Reads a single entry. `None` on out-of-range indices or a failed
    /// block decompression.
    pub fn probe(&self, idx: u64) -> Option<i8> {
        match self {
            LayerData::Direct(data) => data.get(idx as usize).map(|&v| v as i8),
            #[cfg(any(unix, windows))]
            LayerData::Mmap(map) => map.get(idx as usize).map(|&v| v as i8),
            LayerData::Compressed(layer) => layer.probe(idx),
        }
    }

    /// Bytes held in memory (a mapped layer counts its mapped length).
    pub fn resident_bytes(&self) -> u64 {
        match self {
            LayerData::Direct(data) => data.len() as u64,
            #[cfg(any(unix, windows))]
            LayerData::Mmap(map) => map.len() as u64,
            LayerData::Compressed(layer) => layer.resident_bytes(),
        }
    }
}

/// Block-compressed layer: zstd-compressed fixed-size blocks, an offsets
/// array, and an optional trained dictionary.
pub struct CompressedLayer {
    block_size: usize,
    uncompressed: u64,
    offsets: Vec<u64>,
    data: Vec<u8>,
    raw_dict: Option<Vec<u8>>,
    ddict: Option<DecoderDictionary<'static>>,
}

impl CompressedLayer {
    /// Compresses a raw table, training a dictionary over block samples
    /// first. Training failures (tiny layers) fall back to plain blocks.
    pub fn compress(table: &[u8]) -> io::Result<CompressedLayer> {
        let num_blocks = table.len().div_ceil(BLOCK_SIZE).max(1);

        let raw_dict = train_dictionary(table, num_blocks);
        let edict = match &raw_dict {
            Some(dict) => Some(EncoderDictionary::copy(dict, COMPRESSION_LEVEL)),
            None => None,
        };

        let mut compressor = match &edict {
            Some(d) => Compressor::with_prepared_dictionary(d)?,
            None => Compressor::new(COMPRESSION_LEVEL)?,
        };

        let mut offsets = Vec::with_capacity(num_blocks + 1);
        let mut data = Vec::new();

        for block in 0..num_blocks {
            offsets.push(data.len() as u64);
            let start = block * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(table.len());
            let compressed = compressor.compress(&table[start..end])?;
            data.extend_from_slice(&compressed);
        }
        offsets.push(data.len() as u64);

        let ddict = raw_dict.as_deref().map(DecoderDictionary::copy);

        Ok(CompressedLayer {
            block_size: BLOCK_SIZE,
            uncompressed: table.len() as u64,
            offsets,
            data,
            raw_dict,
            ddict,
        })
    }

    fn probe(&self, idx: u64) -> Option<i8> {
        if idx >= self.uncompressed {
            return None;
        }

        let block = (idx as usize) / self.block_size;
        let offset_in_block = (idx as usize) % self.block_size;

        let start = *self.offsets.get(block)? as usize;
        let end = *self.offsets.get(block + 1)? as usize;
        let source = self.data.get(start..end)?;

        let mut scratch = [0u8; MAX_BLOCK_SIZE];
        let mut decompressor = match &self.ddict {
            Some(d) => Decompressor::with_prepared_dictionary(d).ok()?,
            None => Decompressor::new().ok()?,
        };
        let produced = decompressor
            .decompress_to_buffer(source, &mut scratch[..self.block_size])
            .ok()?;

        if offset_in_block >= produced {
            return None;
        }
        Some(scratch[offset_in_block] as i8)
    }

    pub fn resident_bytes(&self) -> u64 {
        self.data.len() as u64
            + self.offsets.len() as u64 * 8
            + self.raw_dict.as_ref().map_or(0, |d| d.len() as u64)
    }
}

fn train_dictionary(table: &[u8], num_blocks: usize) -> Option<Vec<u8>> {
    let nb_samples = num_blocks.min(MAX_DICT_SAMPLES);
    let mut sizes = Vec::with_capacity(nb_samples);
    let mut covered = 0usize;
    for block in 0..nb_samples {
        let start = block * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(table.len());
        sizes.push(end - start);
        covered = end;
    }

    zstd::dict::from_continuous(&table[..covered], &sizes, DICT_CAPACITY)
        .ok()
        .filter(|dict| !dict.is_empty())
}

/// Result of trying to materialize a layer from disk.
pub enum LoadOutcome {
    Loaded(LayerData),
    Missing,
    Corrupt,
}

/// Loads layer `stones` (with `size` entries) according to the backend.
/// The compressed backend falls back to a raw `.bin`, compressing and
/// persisting it on the spot.
pub fn load_layer(dir: &Path, stones: usize, size: u64, backend: BackendKind) -> LoadOutcome {
    match backend {
        BackendKind::Direct => match read_raw(&bin_path(dir, stones)) {
            Ok(Some(data)) if data.len() as u64 == size => {
                LoadOutcome::Loaded(LayerData::Direct(data))
            }
            Ok(Some(_)) => LoadOutcome::Corrupt,
            Ok(None) => LoadOutcome::Missing,
            Err(_) => LoadOutcome::Corrupt,
        },
        BackendKind::Mmap => map_raw(&bin_path(dir, stones), size),
        BackendKind::BlockCompressed => {
            let path = zstd_path(dir, stones);
            if path.exists() {
                return match load_compressed(&path) {
                    Ok(layer) if layer.uncompressed == size => {
                        LoadOutcome::Loaded(LayerData::Compressed(layer))
                    }
                    _ => LoadOutcome::Corrupt,
                };
            }

            // No compressed file yet: compress an existing raw table and
            // persist the result for the next run.
            match read_raw(&bin_path(dir, stones)) {
                Ok(Some(data)) if data.len() as u64 == size => {
                    match CompressedLayer::compress(&data) {
                        Ok(layer) => {
                            let _ = save_compressed(&path, &layer);
                            LoadOutcome::Loaded(LayerData::Compressed(layer))
                        }
                        Err(_) => LoadOutcome::Corrupt,
                    }
                }
                Ok(Some(_)) => LoadOutcome::Corrupt,
                Ok(None) => LoadOutcome::Missing,
                Err(_) => LoadOutcome::Corrupt,
            }
        }
    }
}

/// Persists a freshly generated layer and returns its resident form.
pub fn save_layer(
    dir: &Path,
    stones: usize,
    table: Vec<i8>,
    backend: BackendKind,
) -> io::Result<LayerData> {
    let bin = bin_path(dir, stones);
    write_raw(&bin, table_bytes(&table))?;

    match backend {
        BackendKind::Direct => Ok(LayerData::Direct(table_into_bytes(table))),
        BackendKind::Mmap => match map_raw(&bin, table.len() as u64) {
            LoadOutcome::Loaded(data) => Ok(data),
            _ => Err(io::Error::other("failed to map freshly written layer")),
        },
        BackendKind::BlockCompressed => {
            let layer = CompressedLayer::compress(table_bytes(&table))?;
            save_compressed(&zstd_path(dir, stones), &layer)?;
            Ok(LayerData::Compressed(layer))
        }
    }
}

fn read_raw(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match File::open(path) {
        Ok(mut file) => {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok(Some(data))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_raw(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(data)?;
    file.into_inner()?.sync_all()
}

fn map_raw(path: &Path, size: u64) -> LoadOutcome {
    cfg_if! {
        if #[cfg(any(unix, windows))] {
            let file = match File::open(path) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return LoadOutcome::Missing;
                }
                Err(_) => return LoadOutcome::Corrupt,
            };
            match unsafe { memmap2::Mmap::map(&file) } {
                Ok(map) if map.len() as u64 == size => {
                    LoadOutcome::Loaded(LayerData::Mmap(map))
                }
                Ok(_) => LoadOutcome::Corrupt,
                Err(_) => LoadOutcome::Corrupt,
            }
        } else {
            // No mapping support on this platform: keep a heap copy.
            match read_raw(path) {
                Ok(Some(data)) if data.len() as u64 == size => {
                    LoadOutcome::Loaded(LayerData::Direct(data))
                }
                Ok(Some(_)) => LoadOutcome::Corrupt,
                Ok(None) => LoadOutcome::Missing,
                Err(_) => LoadOutcome::Corrupt,
            }
        }
    }
}

/// `u32 magic, u32 blockSize, u64 numBlocks, u64 uncompressedBytes,
/// u64 dictSize, [dict], (numBlocks+1) x u64 offsets, payload` — all
/// little-endian.
fn save_compressed(path: &Path, layer: &CompressedLayer) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    out.write_u32::<LittleEndian>(ZSTD_MAGIC)?;
    out.write_u32::<LittleEndian>(layer.block_size as u32)?;
    out.write_u64::<LittleEndian>((layer.offsets.len() - 1) as u64)?;
    out.write_u64::<LittleEndian>(layer.uncompressed)?;

    let dict = layer.raw_dict.as_deref().unwrap_or(&[]);
    out.write_u64::<LittleEndian>(dict.len() as u64)?;
    out.write_all(dict)?;

    for &offset in &layer.offsets {
        out.write_u64::<LittleEndian>(offset)?;
    }
    out.write_all(&layer.data)?;
    out.into_inner()?.sync_all()
}

fn load_compressed(path: &Path) -> io::Result<CompressedLayer> {
    let mut input = BufReader::new(File::open(path)?);

    let magic = input.read_u32::<LittleEndian>()?;
    if magic != ZSTD_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }

    let block_size = input.read_u32::<LittleEndian>()? as usize;
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad block size"));
    }

    let num_blocks = input.read_u64::<LittleEndian>()? as usize;
    let uncompressed = input.read_u64::<LittleEndian>()?;
    if uncompressed.div_ceil(block_size as u64).max(1) != num_blocks as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad block count"));
    }

    let dict_size = input.read_u64::<LittleEndian>()? as usize;
    let raw_dict = if dict_size > 0 {
        let mut dict = vec![0u8; dict_size];
        input.read_exact(&mut dict)?;
        Some(dict)
    } else {
        None
    };

    let mut offsets = Vec::with_capacity(num_blocks + 1);
    for _ in 0..=num_blocks {
        offsets.push(input.read_u64::<LittleEndian>()?);
    }

    let payload_len = *offsets.last().unwrap_or(&0) as usize;
    let mut data = vec![0u8; payload_len];
    input.read_exact(&mut data)?;

    let ddict = raw_dict.as_deref().map(DecoderDictionary::copy);

    Ok(CompressedLayer {
        block_size,
        uncompressed,
        offsets,
        data,
        raw_dict,
        ddict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mancala-storage-{tag}-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed),
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_table(len: usize) -> Vec<i8> {
        (0..len)
            .map(|i| match i % 7 {
                0 => 0,
                1 => 1,
                2 => -1,
                3 => 3,
                4 => -5,
                5 => super::super::UNCOMPUTED,
                _ => 2,
            })
            .collect()
    }

    fn check_all(data: &LayerData, table: &[i8]) {
        for (i, &expected) in table.iter().enumerate() {
            assert_eq!(data.probe(i as u64), Some(expected), "entry {i}");
        }
        assert_eq!(data.probe(table.len() as u64), None);
    }

    #[test]
    fn direct_round_trip() {
        let dir = temp_dir("direct");
        let table = sample_table(1000);

        let saved = save_layer(&dir, 3, table.clone(), BackendKind::Direct).unwrap();
        check_all(&saved, &table);

        match load_layer(&dir, 3, 1000, BackendKind::Direct) {
            LoadOutcome::Loaded(data) => check_all(&data, &table),
            _ => panic!("expected load"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn mmap_round_trip() {
        let dir = temp_dir("mmap");
        let table = sample_table(513);

        let saved = save_layer(&dir, 2, table.clone(), BackendKind::Mmap).unwrap();
        check_all(&saved, &table);

        match load_layer(&dir, 2, 513, BackendKind::Mmap) {
            LoadOutcome::Loaded(data) => check_all(&data, &table),
            _ => panic!("expected load"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn compressed_round_trip_with_partial_last_block() {
        let dir = temp_dir("zstd");
        // Not a multiple of the block size on purpose.
        let table = sample_table(BLOCK_SIZE * 5 + 37);

        let saved =
            save_layer(&dir, 4, table.clone(), BackendKind::BlockCompressed).unwrap();
        check_all(&saved, &table);
        assert!(dir.join("egdb_4.zstddb").exists());
        assert!(dir.join("egdb_4.bin").exists());

        match load_layer(&dir, 4, table.len() as u64, BackendKind::BlockCompressed) {
            LoadOutcome::Loaded(data) => check_all(&data, &table),
            _ => panic!("expected load"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn compressed_backend_adopts_raw_file() {
        let dir = temp_dir("adopt");
        let table = sample_table(700);

        // Only the raw file exists, e.g. produced by the direct backend.
        save_layer(&dir, 5, table.clone(), BackendKind::Direct).unwrap();
        assert!(!dir.join("egdb_5.zstddb").exists());

        match load_layer(&dir, 5, 700, BackendKind::BlockCompressed) {
            LoadOutcome::Loaded(data) => check_all(&data, &table),
            _ => panic!("expected adoption of the raw file"),
        }
        assert!(dir.join("egdb_5.zstddb").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_and_corrupt_files() {
        let dir = temp_dir("corrupt");

        assert!(matches!(
            load_layer(&dir, 6, 100, BackendKind::Direct),
            LoadOutcome::Missing
        ));

        // Wrong length raw file.
        fs::write(dir.join("egdb_6.bin"), [0u8; 10]).unwrap();
        assert!(matches!(
            load_layer(&dir, 6, 100, BackendKind::Direct),
            LoadOutcome::Corrupt
        ));

        // Compressed file with a bad magic.
        fs::write(dir.join("egdb_7.zstddb"), [0u8; 64]).unwrap();
        assert!(matches!(
            load_layer(&dir, 7, 100, BackendKind::BlockCompressed),
            LoadOutcome::Corrupt
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
