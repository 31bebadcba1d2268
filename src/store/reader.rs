use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use memmap2::Mmap;

use crate::store::layout::{CRC64, DType, EntryV1, HEADER_SIZE, read_entry, read_header};
use crate::store::{Tensor, TensorBundle, TensorData, is_gz_path};

pub fn read_bundle(path: &Path) -> Result<TensorBundle> {
    if is_gz_path(path) {
        let file = File::open(path).context("failed to open tensor bundle")?;
        let mut bytes = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .context("failed to inflate tensor bundle")?;
        return parse_bundle(&bytes);
    }
    let mmap = open_mmap(path)?;
    parse_bundle(&mmap)
}

pub fn open_mmap(path: &Path) -> Result<Mmap> {
    let file = File::open(path).context("failed to open tensor bundle")?;
    let mmap = unsafe { Mmap::map(&file).context("failed to mmap tensor bundle")? };
    if mmap.len() < HEADER_SIZE {
        bail!("tensor bundle too small");
    }
    Ok(mmap)
}

pub fn parse_bundle(bytes: &[u8]) -> Result<TensorBundle> {
    if bytes.len() < HEADER_SIZE {
        bail!("tensor bundle too small");
    }
    let header = read_header(&bytes[..HEADER_SIZE])?;
    let dir_end = usize::try_from(header.dir_bytes)
        .ok()
        .and_then(|d| d.checked_add(HEADER_SIZE))
        .filter(|&end| end <= bytes.len())
        .with_context(|| {
            format!(
                "tensor bundle directory of {} bytes overruns file of {}",
                header.dir_bytes,
                bytes.len()
            )
        })?;
    let mut dir = &bytes[HEADER_SIZE..dir_end];
    let mut bundle = TensorBundle::new();
    for _ in 0..header.n_entries {
        let entry = read_entry(&mut dir)?;
        let tensor = decode_entry(bytes, &entry)
            .with_context(|| format!("entry `{}`", entry.name))?;
        bundle.insert(entry.name, tensor);
    }
    if !dir.is_empty() {
        bail!("tensor bundle directory has {} trailing bytes", dir.len());
    }
    Ok(bundle)
}

fn decode_entry(bytes: &[u8], entry: &EntryV1) -> Result<Tensor> {
    let block_range = usize::try_from(entry.offset)
        .ok()
        .zip(usize::try_from(entry.len).ok())
        .and_then(|(start, len)| Some(start..start.checked_add(len)?))
        .filter(|r| r.end <= bytes.len());
    let Some(range) = block_range else {
        bail!(
            "data block at {} (+{}) overruns file of {} bytes",
            entry.offset,
            entry.len,
            bytes.len()
        );
    };
    let expected = entry
        .numel()
        .and_then(|n| n.checked_mul(entry.dtype.size()))
        .with_context(|| format!("declared shape {:?} overflows", entry.shape))?;
    if range.len() != expected {
        bail!(
            "data block size mismatch: expected {}, got {}",
            expected,
            entry.len
        );
    }
    let block = &bytes[range];
    let crc = CRC64.checksum(block);
    if crc != entry.crc64 {
        bail!(
            "CRC mismatch: stored {:016x}, computed {:016x}",
            entry.crc64,
            crc
        );
    }
    let data = match entry.dtype {
        DType::F64 => TensorData::F64(
            block
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DType::I64 => TensorData::I64(
            block
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DType::F32 => TensorData::F32(
            block
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        DType::I32 => TensorData::I32(
            block
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    };
    Tensor::new(entry.shape.iter().map(|&d| d as usize).collect(), data)
}
