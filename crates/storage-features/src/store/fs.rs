//! On-disk layout of a feature store file.
//!
//! A file starts with an 8 byte header (`FTST`, format version, reserved) and
//! is followed by a log of chunks. Every chunk is
//! `[kind: u8][body_len: u64][body][blake3(kind || body): 32 bytes]`.
//! Chunks are only ever appended, so a row's byte offset never moves once it
//! has been written.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use ndarray::ArrayView2;

use crate::error::StoreError;

pub const MAGIC: &[u8; 4] = b"FTST";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: u64 = 8;

const PREFIX_LEN: u64 = 1 + 8;
const CHECKSUM_LEN: u64 = 32;

const KIND_CREATE_TABLE: u8 = 1;
const KIND_APPEND_ROWS: u8 = 2;

/// Absolute position of one stored row. The id bytes follow the vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    pub offset: u64,
    pub id_len: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TableLayout {
    pub dim: usize,
    pub rows: Vec<RowLocation>,
}

pub fn write_header(file: &mut File) -> Result<(), StoreError> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    Ok(())
}

/// Result of replaying a chunk log.
#[derive(Debug, Default)]
pub struct Replay {
    pub tables: BTreeMap<String, TableLayout>,
    /// Offset just past the last complete chunk.
    pub end: u64,
    /// Length of the file as found. Larger than `end` when the final chunk
    /// was torn by an interrupted append.
    pub file_len: u64,
}

impl Replay {
    #[must_use]
    pub const fn torn_bytes(&self) -> u64 {
        self.file_len - self.end
    }
}

/// Replays the chunk log. A final chunk that runs past the end of the file
/// is treated as an interrupted append and left out of the replay; any
/// complete chunk that fails its checksum is an integrity error.
pub fn scan(file: &mut File) -> Result<Replay, StoreError> {
    let len = file.metadata()?.len();
    if len < HEADER_LEN {
        return Err(StoreError::Integrity(format!(
            "file is {len} bytes, shorter than the header"
        )));
    }
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut header = [0u8; HEADER_LEN as usize];
    reader.read_exact(&mut header)?;
    if &header[0..4] != MAGIC {
        return Err(StoreError::Integrity("bad magic".into()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(StoreError::Integrity(format!(
            "unsupported format version {version}"
        )));
    }

    let mut tables = BTreeMap::new();
    let mut position = HEADER_LEN;
    while position < len {
        if len - position < PREFIX_LEN + CHECKSUM_LEN {
            break;
        }
        let mut prefix = [0u8; PREFIX_LEN as usize];
        reader.read_exact(&mut prefix)?;
        let kind = prefix[0];
        let mut body_len_bytes = [0u8; 8];
        body_len_bytes.copy_from_slice(&prefix[1..]);
        let body_len = u64::from_le_bytes(body_len_bytes);
        if body_len > len - position - PREFIX_LEN - CHECKSUM_LEN {
            break;
        }
        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body)?;
        let mut checksum = [0u8; CHECKSUM_LEN as usize];
        reader.read_exact(&mut checksum)?;
        if chunk_checksum(kind, &body) != checksum {
            return Err(StoreError::Integrity(format!(
                "checksum mismatch for chunk at offset {position}"
            )));
        }
        let body_start = position + PREFIX_LEN;
        match kind {
            KIND_CREATE_TABLE => apply_create(&mut tables, &body)?,
            KIND_APPEND_ROWS => apply_rows(&mut tables, &body, body_start)?,
            other => {
                return Err(StoreError::Integrity(format!(
                    "unknown chunk kind {other} at offset {position}"
                )))
            }
        }
        position = body_start + body_len + CHECKSUM_LEN;
    }
    Ok(Replay {
        tables,
        end: position,
        file_len: len,
    })
}

pub fn encode_create(name: &str, dim: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + name.len() + 4);
    put_name(&mut body, name);
    body.extend_from_slice(&(dim as u32).to_le_bytes());
    frame(KIND_CREATE_TABLE, body)
}

/// Encodes an append chunk. Offsets in the returned locations are relative to
/// the start of the chunk.
pub fn encode_rows<S: AsRef<str>>(
    name: &str,
    vectors: ArrayView2<'_, f32>,
    ids: &[S],
) -> (Vec<u8>, Vec<RowLocation>) {
    let mut body = Vec::new();
    put_name(&mut body, name);
    body.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    let mut rows = Vec::with_capacity(ids.len());
    for (vector, id) in vectors.rows().into_iter().zip(ids) {
        let id = id.as_ref().as_bytes();
        rows.push(RowLocation {
            offset: PREFIX_LEN + body.len() as u64,
            id_len: id.len() as u32,
        });
        for value in vector.iter() {
            body.extend_from_slice(&value.to_le_bytes());
        }
        body.extend_from_slice(&(id.len() as u32).to_le_bytes());
        body.extend_from_slice(id);
    }
    (frame(KIND_APPEND_ROWS, body), rows)
}

pub fn read_vector_into(
    file: &mut File,
    location: RowLocation,
    dim: usize,
    out: &mut Vec<f32>,
) -> Result<(), StoreError> {
    let mut bytes = vec![0u8; dim * 4];
    file.seek(SeekFrom::Start(location.offset))?;
    file.read_exact(&mut bytes)?;
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
    );
    Ok(())
}

pub fn read_id(file: &mut File, location: RowLocation, dim: usize) -> Result<String, StoreError> {
    let mut bytes = vec![0u8; location.id_len as usize];
    file.seek(SeekFrom::Start(location.offset + (dim as u64) * 4 + 4))?;
    file.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| StoreError::Integrity(err.to_string()))
}

fn frame(kind: u8, body: Vec<u8>) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(PREFIX_LEN as usize + body.len() + CHECKSUM_LEN as usize);
    chunk.push(kind);
    chunk.extend_from_slice(&(body.len() as u64).to_le_bytes());
    chunk.extend_from_slice(&body);
    chunk.extend_from_slice(&chunk_checksum(kind, &body));
    chunk
}

fn chunk_checksum(kind: u8, body: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[kind]);
    hasher.update(body);
    *hasher.finalize().as_bytes()
}

fn put_name(body: &mut Vec<u8>, name: &str) {
    body.extend_from_slice(&(name.len() as u16).to_le_bytes());
    body.extend_from_slice(name.as_bytes());
}

fn apply_create(tables: &mut BTreeMap<String, TableLayout>, body: &[u8]) -> Result<(), StoreError> {
    let mut cursor = BodyCursor::new(body);
    let name = cursor.name()?;
    let dim = cursor.u32()? as usize;
    cursor.finish()?;
    match tables.get(&name) {
        Some(existing) if existing.dim != dim => Err(StoreError::Integrity(format!(
            "table `{name}` redeclared with dimension {dim}, was {}",
            existing.dim
        ))),
        Some(_) => Ok(()),
        None => {
            tables.insert(
                name,
                TableLayout {
                    dim,
                    rows: Vec::new(),
                },
            );
            Ok(())
        }
    }
}

fn apply_rows(
    tables: &mut BTreeMap<String, TableLayout>,
    body: &[u8],
    body_start: u64,
) -> Result<(), StoreError> {
    let mut cursor = BodyCursor::new(body);
    let name = cursor.name()?;
    let table = tables
        .get_mut(&name)
        .ok_or_else(|| StoreError::Integrity(format!("rows appended to undeclared table `{name}`")))?;
    let count = cursor.u32()? as usize;
    table.rows.reserve(count);
    for _ in 0..count {
        let offset = body_start + cursor.pos as u64;
        cursor.take(table.dim * 4)?;
        let id_len = cursor.u32()?;
        let id = cursor.take(id_len as usize)?;
        std::str::from_utf8(id).map_err(|err| StoreError::Integrity(err.to_string()))?;
        table.rows.push(RowLocation { offset, id_len });
    }
    cursor.finish()
}

struct BodyCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BodyCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| StoreError::Integrity("chunk body too short".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, StoreError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn name(&mut self) -> Result<String, StoreError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|err| StoreError::Integrity(err.to_string()))
    }

    fn finish(self) -> Result<(), StoreError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(StoreError::Integrity("trailing bytes in chunk body".into()))
        }
    }
}
