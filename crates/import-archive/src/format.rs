/// The archive container formats this extractor recognizes. `Zip` is the
/// only concrete format carried — the corpus's existing archive
/// dependency is `zip`, and nothing in this pipeline's scope requires a
/// second container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Unknown,
}

/// Pure function of a filename suffix. Never errors; an unrecognized
/// suffix yields `Unknown` rather than failing the lookup.
pub fn archive_format_for(name: &str) -> ArchiveFormat {
    if name.to_ascii_lowercase().ends_with(".zip") {
        ArchiveFormat::Zip
    } else {
        ArchiveFormat::Unknown
    }
}

/// Same classification from a content prefix, for inputs that arrive
/// without a trustworthy name (e.g. extracted from another archive under
/// a generic member name). Mirrors the magic-sniffing idiom used for
/// compression detection elsewhere in the pipeline.
pub fn archive_format_for_magic(prefix: &[u8]) -> ArchiveFormat {
    const ZIP_LOCAL_FILE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
    const ZIP_EMPTY: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
    const ZIP_SPANNED: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

    if prefix.starts_with(&ZIP_LOCAL_FILE)
        || prefix.starts_with(&ZIP_EMPTY)
        || prefix.starts_with(&ZIP_SPANNED)
    {
        ArchiveFormat::Zip
    } else {
        ArchiveFormat::Unknown
    }
}
