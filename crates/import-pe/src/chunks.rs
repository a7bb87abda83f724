use crate::header::{parse_dos_header, parse_pe_header, DIRECTORY_ENTRY_SECURITY};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("image is too short or malformed to compute authenticode chunks")]
    InvalidPe,
    #[error("computed chunk ranges overlap or exceed the image bounds")]
    Overlap,
}

/// The authenticode exclusion-set function the distilled spec treats as
/// an external pure function (§9 open question): returns the ordered
/// byte ranges of `image` that should be fed to a hash accumulator to
/// reproduce an authenticode-style digest — everything except the
/// checksum field and the appended certificate table. Pads the image to
/// an 8-byte multiple with implicit trailing zero bytes before the last
/// chunk's end is computed.
pub fn compute_chunks(image: &[u8]) -> Result<Vec<(u64, u64)>, ChunkError> {
    let dos = parse_dos_header(image).map_err(|_| ChunkError::InvalidPe)?;
    let header = parse_pe_header(image, &dos).map_err(|_| ChunkError::InvalidPe)?;

    let checksum_offset = header.checksum_file_offset;
    if checksum_offset + 4 > image.len() as u64 {
        return Err(ChunkError::InvalidPe);
    }

    let padded_len = (image.len() as u64 + 7) / 8 * 8;

    let security = header.data_directories.get(DIRECTORY_ENTRY_SECURITY);
    let tail_start = match security {
        Some(entry) if entry.size > 0 => entry.virtual_address_or_offset as u64,
        _ => padded_len,
    };
    if tail_start > padded_len || tail_start < checksum_offset + 4 {
        return Err(ChunkError::InvalidPe);
    }

    let chunks = vec![
        (0, checksum_offset),
        (checksum_offset + 4, tail_start - (checksum_offset + 4)),
    ];

    validate_chunks(&chunks, padded_len)?;
    Ok(chunks)
}

fn validate_chunks(chunks: &[(u64, u64)], padded_len: u64) -> Result<(), ChunkError> {
    for (i, &(offset, length)) in chunks.iter().enumerate() {
        let end = offset.checked_add(length).ok_or(ChunkError::Overlap)?;
        let bound = chunks.get(i + 1).map(|c| c.0).unwrap_or(padded_len);
        if end > bound {
            return Err(ChunkError::Overlap);
        }
    }
    Ok(())
}
