//! Binary codec for 2-D `f32` matrices.
//!
//! One record is laid out little-endian as
//!
//! ```text
//! [u32 vector_count][u32 vector_len][vector_count * vector_len f32]
//! ```
//!
//! with the vectors stored back to back. Records carry no separators; several
//! records are concatenated by passing the returned head offset to the next call.

use crate::{Error, Result};

const HEADER_LEN: usize = 2 * size_of::<u32>();
const SCALAR_LEN: usize = size_of::<f32>();

/// Most zero-length vectors one record may hold.
///
/// A record of empty vectors has no body, so its count is not bounded by the
/// buffer length and is capped here instead.
pub const MAX_EMPTY_VECTORS: usize = 1 << 16;

/// Encode `matrix` at `write_offset`, growing `buffer` as needed.
///
/// Returns the offset just past the written record.
pub fn from_vector_2d(
    write_offset: usize,
    matrix: &[Vec<f32>],
    buffer: &mut Vec<u8>,
) -> Result<usize> {
    let vector_len = matrix.first().map(Vec::len).unwrap_or(0);
    let ragged = matrix
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != vector_len);
    if let Some((i, row)) = ragged {
        return Err(Error::ShapeMismatch(format!(
            "ragged matrix: row {i} has len {}, row 0 has len {vector_len}",
            row.len()
        )));
    }
    let count = u32::try_from(matrix.len())
        .map_err(|_| Error::InvalidData(format!("too many vectors to encode: {}", matrix.len())))?;
    let len = u32::try_from(vector_len)
        .map_err(|_| Error::InvalidData(format!("vector too long to encode: {vector_len}")))?;
    check_empty_count(matrix.len(), vector_len)?;

    let end = matrix
        .len()
        .checked_mul(vector_len)
        .and_then(|n| n.checked_mul(SCALAR_LEN))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .and_then(|n| n.checked_add(write_offset))
        .ok_or_else(|| {
            Error::InvalidData(format!(
                "{}x{vector_len} record at offset {write_offset} overflows the address space",
                matrix.len()
            ))
        })?;
    if buffer.len() < end {
        buffer.resize(end, 0);
    }

    let mut head = write_offset;
    for word in [count, len] {
        buffer[head..head + 4].copy_from_slice(&word.to_le_bytes());
        head += 4;
    }
    for &v in matrix.iter().flatten() {
        buffer[head..head + SCALAR_LEN].copy_from_slice(&v.to_le_bytes());
        head += SCALAR_LEN;
    }
    debug_assert_eq!(head, end);

    log::trace!("encoded {count}x{len} record at offset {write_offset}");
    Ok(head)
}

/// Decode one record starting at `read_offset` into `out`.
///
/// `out` is replaced with the decoded matrix. When the buffer is too short the
/// error is returned before anything is read past its end and `out` is left as is.
///
/// Returns the offset just past the consumed record.
pub fn to_vector_2d<T: From<f32>>(
    read_offset: usize,
    buffer: &[u8],
    out: &mut Vec<Vec<T>>,
) -> Result<usize> {
    let available = buffer.len().saturating_sub(read_offset);
    if available < HEADER_LEN {
        return Err(Error::TruncatedBuffer {
            offset: read_offset,
            needed: HEADER_LEN,
            available,
        });
    }

    let count = read_u32(buffer, read_offset) as usize;
    let len = read_u32(buffer, read_offset + 4) as usize;
    check_empty_count(count, len)?;
    let needed = count
        .checked_mul(len)
        .and_then(|n| n.checked_mul(SCALAR_LEN))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .unwrap_or(usize::MAX);
    if available < needed {
        return Err(Error::TruncatedBuffer {
            offset: read_offset,
            needed,
            available,
        });
    }

    // `count` is now bounded by the body length or by MAX_EMPTY_VECTORS.
    let body = &buffer[read_offset + HEADER_LEN..read_offset + needed];
    let mut decoded = Vec::with_capacity(count);
    if len == 0 {
        decoded.resize_with(count, Vec::new);
    } else {
        for row in body.chunks_exact(len * SCALAR_LEN) {
            decoded.push(
                row.chunks_exact(SCALAR_LEN)
                    .map(|b| T::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
                    .collect(),
            );
        }
    }
    *out = decoded;

    log::trace!("decoded {count}x{len} record at offset {read_offset}");
    Ok(read_offset + needed)
}

fn check_empty_count(count: usize, len: usize) -> Result<()> {
    if len == 0 && count > MAX_EMPTY_VECTORS {
        return Err(Error::InvalidData(format!(
            "{count} empty vectors exceed the limit of {MAX_EMPTY_VECTORS}"
        )));
    }
    Ok(())
}

#[inline]
fn read_u32(buffer: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3]])
}
