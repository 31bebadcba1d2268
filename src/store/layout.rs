use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use crc::{CRC_64_ECMA_182, Crc};

pub const MAGIC: [u8; 8] = *b"FSTENSOR";
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 24;
pub const DATA_ALIGN: usize = 8;

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F64,
    F32,
    I32,
    I64,
}

impl DType {
    pub fn code(self) -> u32 {
        match self {
            Self::F64 => 1,
            Self::F32 => 2,
            Self::I32 => 3,
            Self::I64 => 4,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::F64,
            2 => Self::F32,
            3 => Self::I32,
            4 => Self::I64,
            other => bail!("unknown tensor dtype code {}", other),
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleHeaderV1 {
    pub version: u32,
    pub n_entries: u32,
    pub dir_bytes: u64,
}

impl BundleHeaderV1 {
    pub fn data_offset(&self) -> usize {
        align(HEADER_SIZE + self.dir_bytes as usize)
    }
}

/// One directory record. `offset` is absolute within the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryV1 {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<u64>,
    pub offset: u64,
    pub len: u64,
    pub crc64: u64,
}

impl EntryV1 {
    /// `None` when the declared shape overflows `usize`.
    pub fn numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.name.len() + 4 + 4 + self.shape.len() * 8 + 8 + 8 + 8
    }
}

pub fn align(n: usize) -> usize {
    n.div_ceil(DATA_ALIGN) * DATA_ALIGN
}

pub fn write_header<W: Write>(mut w: W, header: &BundleHeaderV1) -> Result<()> {
    w.write_all(&MAGIC)?;
    w.write_all(&header.version.to_le_bytes())?;
    w.write_all(&header.n_entries.to_le_bytes())?;
    w.write_all(&header.dir_bytes.to_le_bytes())?;
    Ok(())
}

pub fn read_header<R: Read>(mut r: R) -> Result<BundleHeaderV1> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        bail!("tensor bundle magic mismatch");
    }
    let version = read_u32(&mut r)?;
    if version != VERSION {
        bail!("unsupported tensor bundle version {}", version);
    }
    let n_entries = read_u32(&mut r)?;
    let dir_bytes = read_u64(&mut r)?;
    Ok(BundleHeaderV1 {
        version,
        n_entries,
        dir_bytes,
    })
}

pub fn write_entry<W: Write>(mut w: W, entry: &EntryV1) -> Result<()> {
    w.write_all(&(entry.name.len() as u32).to_le_bytes())?;
    w.write_all(entry.name.as_bytes())?;
    w.write_all(&entry.dtype.code().to_le_bytes())?;
    w.write_all(&(entry.shape.len() as u32).to_le_bytes())?;
    for d in &entry.shape {
        w.write_all(&d.to_le_bytes())?;
    }
    w.write_all(&entry.offset.to_le_bytes())?;
    w.write_all(&entry.len.to_le_bytes())?;
    w.write_all(&entry.crc64.to_le_bytes())?;
    Ok(())
}

/// Reads one record from the directory slice, advancing it. Declared
/// lengths are checked against the bytes left before allocating.
pub fn read_entry(r: &mut &[u8]) -> Result<EntryV1> {
    let name_len = read_u32(&mut *r)? as usize;
    if name_len > r.len() {
        bail!(
            "entry name length {} overruns directory ({} bytes left)",
            name_len,
            r.len()
        );
    }
    let mut name = vec![0u8; name_len];
    r.read_exact(&mut name).context("failed to read entry name")?;
    let name = String::from_utf8(name).context("entry name is not UTF-8")?;
    let dtype = DType::from_code(read_u32(&mut *r)?)?;
    let ndim = read_u32(&mut *r)? as usize;
    if ndim > r.len() / 8 {
        bail!(
            "entry rank {} overruns directory ({} bytes left)",
            ndim,
            r.len()
        );
    }
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(read_u64(&mut *r)?);
    }
    let offset = read_u64(&mut *r)?;
    let len = read_u64(&mut *r)?;
    let crc64 = read_u64(&mut *r)?;
    Ok(EntryV1 {
        name,
        dtype,
        shape,
        offset,
        len,
        crc64,
    })
}

fn read_u32<R: Read>(mut r: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).context("failed to read u32")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(mut r: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).context("failed to read u64")?;
    Ok(u64::from_le_bytes(buf))
}
