mod chunks;
mod error;
mod hash;
mod header;
mod probe;
mod resource;
mod rva;
mod security;

pub use chunks::{compute_chunks, ChunkError};
pub use error::PeError;
pub use hash::{hash_linear, hash_pe_chunks, DigestSet};
pub use header::{DataDirectory, DosHeader, PeHeader, SectionHeader};
pub use probe::{looks_like_pe, probe, PeProbe};
pub use resource::FixedFileInfo;
pub use rva::rva_to_file_offset;
pub use security::read_security_directory;
