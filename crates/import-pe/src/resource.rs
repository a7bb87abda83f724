use byteorder::{ByteOrder, LittleEndian};

use crate::header::{DataDirectory, SectionHeader, DIRECTORY_ENTRY_RESOURCE};
use crate::rva::rva_to_file_offset;

const RT_VERSION: u32 = 16;
const VS_VERSION_INFO_UTF16: &[u8] = &[
    b'V', 0, b'S', 0, b'_', 0, b'V', 0, b'E', 0, b'R', 0, b'S', 0, b'I', 0, b'O', 0, b'N', 0, b'_',
    0, b'I', 0, b'N', 0, b'F', 0, b'O', 0,
];
const VS_FIXEDFILEINFO_SIGNATURE: u32 = 0xFEEF_04BD;

#[derive(Debug, Clone, Copy)]
pub struct FixedFileInfo {
    pub file_version: (u16, u16, u16, u16),
    pub product_version: (u16, u16, u16, u16),
}

/// Walks the resource directory to the single `VS_VERSION_INFO` leaf, per
/// SPEC_FULL.md §4.5 step 4: first level finds the `RT_VERSION` (id 16)
/// node, second level takes its first child, third level takes that
/// node's first leaf. Any mismatch along the way (missing resource
/// directory, unexpected leaf shape, wrong preceding string) is
/// non-fatal and yields `None` rather than an error.
pub fn find_version_info(
    data: &[u8],
    sections: &[SectionHeader],
    data_directories: &[DataDirectory],
) -> Option<FixedFileInfo> {
    let resource_dir = data_directories.get(DIRECTORY_ENTRY_RESOURCE)?;
    if resource_dir.size == 0 {
        return None;
    }
    let resource_base =
        rva_to_file_offset(sections, resource_dir.virtual_address_or_offset, 0)?;

    let version_dir_offset = find_directory_entry(data, resource_base, |id| id == RT_VERSION)?;
    let lang_dir_offset = first_child_directory(data, version_dir_offset)?;
    let leaf_entry_offset = first_leaf_entry(data, lang_dir_offset)?;

    let entry = read_u32_pair(data, leaf_entry_offset)?;
    let (data_rva, data_size) = entry;
    let file_offset = rva_to_file_offset(sections, data_rva, data_size)?;

    read_fixed_file_info(data, file_offset, data_size as u64)
}

/// Reads a directory header at `dir_offset` and returns the file offset
/// of the first entry (named entries precede id entries; "first child"
/// means whichever comes first in that order).
fn directory_entries_range(data: &[u8], dir_offset: u64) -> Option<(u64, u16, u16)> {
    let header_end = dir_offset.checked_add(16)?;
    if header_end as usize > data.len() {
        return None;
    }
    let named = LittleEndian::read_u16(&data[dir_offset as usize + 12..dir_offset as usize + 14]);
    let ids = LittleEndian::read_u16(&data[dir_offset as usize + 14..dir_offset as usize + 16]);
    Some((header_end, named, ids))
}

fn entry_at(data: &[u8], entries_base: u64, index: u64) -> Option<(u32, u32)> {
    let entry_offset = entries_base + index * 8;
    read_u32_pair(data, entry_offset)
}

fn read_u32_pair(data: &[u8], offset: u64) -> Option<(u32, u32)> {
    let end = offset.checked_add(8)? as usize;
    if end > data.len() {
        return None;
    }
    let start = offset as usize;
    Some((
        LittleEndian::read_u32(&data[start..start + 4]),
        LittleEndian::read_u32(&data[start + 4..start + 8]),
    ))
}

fn is_subdirectory(offset_to_data: u32) -> bool {
    offset_to_data & 0x8000_0000 != 0
}

fn subdirectory_offset(resource_base: u64, offset_to_data: u32) -> u64 {
    resource_base + (offset_to_data & 0x7FFF_FFFF) as u64
}

fn find_directory_entry(data: &[u8], resource_base: u64, matches: impl Fn(u32) -> bool) -> Option<u64> {
    let (entries_base, named, ids) = directory_entries_range(data, resource_base)?;
    // RT_VERSION is always a numeric id, never a named entry; only the
    // id-entry slice is worth scanning.
    for i in 0..ids as u64 {
        let (id, offset_to_data) = entry_at(data, entries_base + named as u64 * 8, i)?;
        if matches(id) && is_subdirectory(offset_to_data) {
            return Some(subdirectory_offset(resource_base, offset_to_data));
        }
    }
    None
}

fn first_child_directory(data: &[u8], dir_offset: u64) -> Option<u64> {
    let (entries_base, named, ids) = directory_entries_range(data, dir_offset)?;
    if named + ids == 0 {
        return None;
    }
    let (_, offset_to_data) = entry_at(data, entries_base, 0)?;
    if !is_subdirectory(offset_to_data) {
        return None;
    }
    Some(subdirectory_offset(dir_offset, offset_to_data))
}

fn first_leaf_entry(data: &[u8], dir_offset: u64) -> Option<u64> {
    let (entries_base, named, ids) = directory_entries_range(data, dir_offset)?;
    if named + ids == 0 {
        return None;
    }
    let (_, offset_to_data) = entry_at(data, entries_base, 0)?;
    if is_subdirectory(offset_to_data) {
        return None;
    }
    Some(entries_base)
}

fn read_fixed_file_info(data: &[u8], file_offset: u64, size: u64) -> Option<FixedFileInfo> {
    let start = file_offset as usize;
    let end = start.checked_add(size as usize)?;
    if end > data.len() || size < 6 + VS_VERSION_INFO_UTF16.len() as u64 {
        return None;
    }
    let key_start = start + 6;
    let key_end = key_start + VS_VERSION_INFO_UTF16.len();
    if key_end > data.len() || &data[key_start..key_end] != VS_VERSION_INFO_UTF16 {
        return None;
    }

    // VS_FIXEDFILEINFO follows, DWORD-aligned from the start of the
    // resource data entry.
    let mut fixed_offset = key_end + 2; // skip the UTF-16 NUL terminator
    fixed_offset = (fixed_offset + 3) & !3;
    if fixed_offset + 24 > data.len() {
        return None;
    }
    if LittleEndian::read_u32(&data[fixed_offset..fixed_offset + 4]) != VS_FIXEDFILEINFO_SIGNATURE {
        return None;
    }

    let file_version_ms = LittleEndian::read_u32(&data[fixed_offset + 8..fixed_offset + 12]);
    let file_version_ls = LittleEndian::read_u32(&data[fixed_offset + 12..fixed_offset + 16]);
    let product_version_ms = LittleEndian::read_u32(&data[fixed_offset + 16..fixed_offset + 20]);
    let product_version_ls = LittleEndian::read_u32(&data[fixed_offset + 20..fixed_offset + 24]);

    Some(FixedFileInfo {
        file_version: (
            (file_version_ms >> 16) as u16,
            file_version_ms as u16,
            (file_version_ls >> 16) as u16,
            file_version_ls as u16,
        ),
        product_version: (
            (product_version_ms >> 16) as u16,
            product_version_ms as u16,
            (product_version_ls >> 16) as u16,
            product_version_ls as u16,
        ),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_resource_directory_is_none() {
        let data = vec![0u8; 64];
        let directories = vec![DataDirectory {
            virtual_address_or_offset: 0,
            size: 0,
        }];
        assert!(find_version_info(&data, &[], &directories).is_none());
    }
}
