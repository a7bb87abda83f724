use import_model::ImportItem;

/// The final `/`-separated component of `path`, mirroring
/// `std::filesystem::path::filename()`.
fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the final `/`-separated component of `path`, or `""`
/// if there is none — `std::filesystem::path::parent_path()`.
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// `path`'s final component with its extension stripped — `p.stem()`, not
/// `p.rfind('.')` on the whole path: a directory component containing a
/// `.` must not be mistaken for an extension. A name with no extension,
/// or whose only `.` is a leading dotfile marker, is returned unchanged.
pub fn stem(path: &str) -> &str {
    let base = basename(path);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

/// Computes the `(name, full_name)` pair a nested archive member inherits
/// from its parent item (SPEC_FULL.md §4.3's naming rule; the directory-
/// chaining behavior of the `prefix_sub_item` branch follows
/// `original_source`'s `ImportAgent.cpp` `MakeWriteStream`/extraction
/// callback, which operate on `parent_path()`/`stem()` of the *full* path
/// rather than the bare name). `in_archive_name` is the member path as
/// stored in the archive's central directory, e.g. `"A/B"`.
pub fn child_names(parent: &ImportItem, in_archive_name: &str) -> (String, String) {
    if parent.prefix_sub_item {
        let name = format!("{}/{}", stem(&parent.name), in_archive_name);
        let full_stem = stem(&parent.full_name);
        let full_name = match parent_dir(&parent.full_name) {
            "" => format!("{}/{}", full_stem, in_archive_name),
            dir => format!("{}/{}/{}", dir, full_stem, in_archive_name),
        };
        (name, full_name)
    } else {
        let name = in_archive_name.to_string();
        let full_name = format!("{}/{}", stem(&parent.name), in_archive_name);
        (name, full_name)
    }
}
