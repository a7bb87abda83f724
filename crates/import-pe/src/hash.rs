use std::io::{self, Read};

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

/// The three content hashes computed for every imported item (C11):
/// a plain linear digest for ordinary content, or — for a recognized PE
/// image — an authenticode-style digest over the chunk ranges C5
/// computes.
#[derive(Debug, Clone)]
pub struct DigestSet {
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
    pub sha256: [u8; 32],
}

struct Accumulator {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
    }

    fn finish(self) -> DigestSet {
        DigestSet {
            md5: self.md5.finalize().into(),
            sha1: self.sha1.finalize().into(),
            sha256: self.sha256.finalize().into(),
        }
    }
}

/// Hashes `image` over exactly the chunk ranges `compute_chunks`
/// produced. A chunk that runs past `image.len()` (the 8-byte padding
/// tail) is fed as zero bytes rather than read from the slice.
pub fn hash_pe_chunks(image: &[u8], chunks: &[(u64, u64)]) -> DigestSet {
    let mut acc = Accumulator::new();
    for &(offset, length) in chunks {
        feed_chunk(&mut acc, image, offset, length);
    }
    acc.finish()
}

fn feed_chunk(acc: &mut Accumulator, image: &[u8], offset: u64, length: u64) {
    let start = offset as usize;
    let end = (offset + length) as usize;
    let image_len = image.len();

    if end <= image_len {
        acc.update(&image[start..end]);
    } else if start >= image_len {
        acc.update(&vec![0u8; length as usize]);
    } else {
        acc.update(&image[start..]);
        acc.update(&vec![0u8; end - image_len]);
    }
}

/// Hashes a non-PE stream linearly, reading until EOF (SPEC_FULL.md §4.5:
/// "content hashing (non-PE) consumes the whole stream linearly").
pub fn hash_linear(mut reader: impl Read) -> io::Result<DigestSet> {
    let mut acc = Accumulator::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        acc.update(&buf[..n]);
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn linear_hash_matches_direct_digest() {
        let data = b"forensic triage payload";
        let got = hash_linear(&data[..]).unwrap();
        assert_eq!(got.md5.as_slice(), Md5::digest(data).as_slice());
        assert_eq!(got.sha1.as_slice(), Sha1::digest(data).as_slice());
        assert_eq!(got.sha256.as_slice(), Sha256::digest(data).as_slice());
    }

    #[test]
    fn pe_chunk_hash_pads_trailing_bytes_with_zero() {
        let image = vec![0xABu8; 10];
        let chunks = vec![(0u64, 16u64)]; // padded to 16, 6 bytes beyond image.len()
        let got = hash_pe_chunks(&image, &chunks);

        let mut expected_input = image.clone();
        expected_input.extend_from_slice(&[0u8; 6]);
        let expected = hash_linear(&expected_input[..]).unwrap();

        assert_eq!(got.sha256, expected.sha256);
    }
}
