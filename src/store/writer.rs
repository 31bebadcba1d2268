use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::store::layout::{
    BundleHeaderV1, CRC64, EntryV1, HEADER_SIZE, VERSION, align, write_entry, write_header,
};
use crate::store::{TensorBundle, TensorData, is_gz_path};

pub fn write_bundle(path: &Path, bundle: &TensorBundle) -> Result<()> {
    let file = File::create(path).context("failed to create tensor bundle")?;
    if is_gz_path(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_bundle_to(&mut encoder, bundle)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        write_bundle_to(&mut writer, bundle)?;
        writer.flush()?;
    }
    debug!(path = %path.display(), entries = bundle.len(), "bundle_written");
    Ok(())
}

pub fn write_bundle_to<W: Write>(mut w: W, bundle: &TensorBundle) -> Result<()> {
    let blobs: Vec<(&str, Vec<u64>, &TensorData, Vec<u8>)> = bundle
        .iter()
        .map(|(name, t)| {
            let shape = t.shape.iter().map(|&d| d as u64).collect();
            (name, shape, &t.data, encode(&t.data))
        })
        .collect();

    let mut entries: Vec<EntryV1> = blobs
        .iter()
        .map(|(name, shape, data, bytes)| EntryV1 {
            name: name.to_string(),
            dtype: data.dtype(),
            shape: shape.clone(),
            offset: 0,
            len: bytes.len() as u64,
            crc64: CRC64.checksum(bytes),
        })
        .collect();

    let dir_bytes: usize = entries.iter().map(|e| e.encoded_len()).sum();
    let header = BundleHeaderV1 {
        version: VERSION,
        n_entries: entries.len() as u32,
        dir_bytes: dir_bytes as u64,
    };
    let mut cursor = header.data_offset();
    for entry in &mut entries {
        entry.offset = cursor as u64;
        cursor = align(cursor + entry.len as usize);
    }

    write_header(&mut w, &header)?;
    for entry in &entries {
        write_entry(&mut w, entry)?;
    }
    let mut written = HEADER_SIZE + dir_bytes;
    for (entry, (_, _, _, bytes)) in entries.iter().zip(&blobs) {
        pad(&mut w, entry.offset as usize - written)?;
        w.write_all(bytes)?;
        written = entry.offset as usize + bytes.len();
    }
    Ok(())
}

fn pad<W: Write>(mut w: W, n: usize) -> Result<()> {
    const ZEROS: [u8; 8] = [0u8; 8];
    w.write_all(&ZEROS[..n])?;
    Ok(())
}

fn encode(data: &TensorData) -> Vec<u8> {
    match data {
        TensorData::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
    }
}
