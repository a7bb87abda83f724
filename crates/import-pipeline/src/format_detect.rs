use import_model::Format;

/// Assigns the pipeline stage (`Format`) a freshly re-enqueued item should
/// be processed as, from its name alone — this is not the definition-table
/// classifier (C6, which only decides `Action`); it is the "what kind of
/// bytes is this" sniff that runs before classification can even pick a
/// sensible action. Pure function of the filename suffix, mirroring
/// `import_archive::archive_format_for`'s extension-then-fallback idiom.
/// Never errors: an unrecognized suffix falls back to `Data`.
pub fn detect_format(name: &str) -> Format {
    let lower = name.to_ascii_lowercase();

    if import_archive::archive_format_for(&lower) != import_archive::ArchiveFormat::Unknown {
        return Format::Archive;
    }

    let ext = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "p7b" | "p7m" | "p7e" | "cms" => Format::Envelopped,
        "csv" => Format::Csv,
        "evtx" | "evt" => Format::EventLog,
        "xml" => Format::Xml,
        "txt" | "log" => Format::Text,
        _ if is_registry_hive_name(&lower) => Format::RegistryHive,
        _ => Format::Data,
    }
}

/// Registry hives are collected without a file extension (`SYSTEM`, `SAM`,
/// `NTUSER.DAT`, ...); recognize the conventional collector names rather
/// than relying on a suffix that doesn't exist.
fn is_registry_hive_name(lower: &str) -> bool {
    let stem = lower.rsplit('/').next().unwrap_or(lower);
    matches!(
        stem,
        "ntuser.dat" | "usrclass.dat" | "system" | "sam" | "security" | "software" | "default"
    )
}

/// Sniffs format from the first few bytes of content, for members pulled
/// out of an archive under a generic or untrustworthy name. Falls back to
/// the name-based rule when the magic isn't recognized.
pub fn detect_format_with_magic(name: &str, prefix: &[u8]) -> Format {
    if import_archive::archive_format_for_magic(prefix) != import_archive::ArchiveFormat::Unknown {
        return Format::Archive;
    }
    if prefix.starts_with(b"ElfFile\0") {
        return Format::EventLog;
    }
    detect_format(name)
}
