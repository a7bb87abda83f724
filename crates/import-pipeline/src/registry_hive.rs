use std::collections::HashSet;

use byteorder::{ByteOrder, LittleEndian};
use import_model::glob_match_ci;

const HIVE_SIGNATURE: &[u8; 4] = b"regf";
const HBIN_SIGNATURE: &[u8; 4] = b"hbin";
const CELL_BASE: usize = 0x1000; // hbins start 4KiB into the file, after the base block

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not a registry hive: missing 'regf' signature")]
    NotAHive,
    #[error("hive is too small to contain a base block")]
    Truncated,
    #[error("cell offset {0:#x} is out of bounds")]
    BadCellOffset(u32),
    #[error("cell at offset {0:#x} has an unrecognized signature")]
    BadCellSignature(u32),
}

/// One key/value match the walk surfaced: the fully-qualified key path
/// (`\` separated, root-relative) and, when a value matched, its name and
/// a best-effort string rendering of its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRow {
    pub key_path: String,
    pub value_name: Option<String>,
    pub value_data: Option<String>,
}

/// A registry-find spec (SPEC_FULL.md §4.9): glob patterns (reusing C6's
/// case-insensitive glob matcher) narrowing which keys and, within a
/// matched key, which values are emitted as rows. `"*"` matches
/// everything at that level.
#[derive(Debug, Clone)]
pub struct RegistryFindSpec {
    pub key_pattern: String,
    pub value_pattern: String,
}

impl Default for RegistryFindSpec {
    fn default() -> Self {
        RegistryFindSpec {
            key_pattern: "*".to_string(),
            value_pattern: "*".to_string(),
        }
    }
}

/// Walks every key in the hive depth-first from the root, matching
/// `spec.key_pattern` against each key's simple name (not its full path)
/// and, for matched keys, `spec.value_pattern` against each value's name.
/// A key with no values that matches still produces one row with
/// `value_name = None`, so a key-only find still surfaces the key.
pub fn find_registry_rows(
    data: &[u8],
    spec: &RegistryFindSpec,
) -> Result<Vec<RegistryRow>, RegistryError> {
    if data.len() < CELL_BASE + 4 || &data[0..4] != HIVE_SIGNATURE {
        return Err(RegistryError::NotAHive);
    }
    let root_offset = LittleEndian::read_u32(&data[0x24..0x28]);

    let mut rows = Vec::new();
    let mut visited = HashSet::new();
    walk_key(data, root_offset, "", spec, &mut rows, &mut visited)?;
    Ok(rows)
}

fn cell_at(data: &[u8], offset: u32) -> Result<&[u8], RegistryError> {
    let start = CELL_BASE
        .checked_add(offset as usize)
        .ok_or(RegistryError::BadCellOffset(offset))?;
    if start + 4 > data.len() {
        return Err(RegistryError::BadCellOffset(offset));
    }
    let size = LittleEndian::read_i32(&data[start..start + 4]);
    let size = size.unsigned_abs() as usize;
    if size < 4 || start + size > data.len() {
        return Err(RegistryError::BadCellOffset(offset));
    }
    Ok(&data[start + 4..start + size])
}

fn walk_key(
    data: &[u8],
    offset: u32,
    parent_path: &str,
    spec: &RegistryFindSpec,
    rows: &mut Vec<RegistryRow>,
    visited: &mut HashSet<u32>,
) -> Result<(), RegistryError> {
    if !visited.insert(offset) {
        return Ok(()); // cycle guard: a malformed or adversarial hive cannot loop us forever
    }
    let cell = cell_at(data, offset)?;
    if cell.len() < 0x4C || &cell[0..2] != b"nk" {
        return Err(RegistryError::BadCellSignature(offset));
    }

    let subkey_count = LittleEndian::read_u32(&cell[0x14..0x18]);
    let subkeys_offset = LittleEndian::read_u32(&cell[0x1C..0x20]);
    let values_count = LittleEndian::read_u32(&cell[0x24..0x28]);
    let values_list_offset = LittleEndian::read_u32(&cell[0x28..0x2C]);
    let name_length = LittleEndian::read_u16(&cell[0x48..0x4A]) as usize;
    let flags = LittleEndian::read_u16(&cell[0x02..0x04]);
    let name_bytes = cell.get(0x4C..0x4C + name_length).unwrap_or(&[]);
    let name = decode_key_name(name_bytes, flags);

    let path = if parent_path.is_empty() {
        name.clone()
    } else {
        format!("{parent_path}\\{name}")
    };

    let key_matches = glob_match_ci(&spec.key_pattern, &name);
    if key_matches {
        let mut any_value_row = false;
        if values_count > 0 {
            if let Ok(values) = values_in(data, values_list_offset, values_count) {
                for value_offset in values {
                    if let Ok((value_name, value_data)) = read_value(data, value_offset) {
                        if glob_match_ci(&spec.value_pattern, &value_name) {
                            rows.push(RegistryRow {
                                key_path: path.clone(),
                                value_name: Some(value_name),
                                value_data: Some(value_data),
                            });
                            any_value_row = true;
                        }
                    }
                }
            }
        }
        if !any_value_row {
            rows.push(RegistryRow {
                key_path: path.clone(),
                value_name: None,
                value_data: None,
            });
        }
    }

    if subkey_count > 0 {
        for child_offset in subkey_offsets(data, subkeys_offset)? {
            // A malformed subkey pointer fails that one branch, not the
            // whole walk — mirrors the non-fatal short-circuit policy
            // used elsewhere for structural parsing (§7).
            let _ = walk_key(data, child_offset, &path, spec, rows, visited);
        }
    }

    Ok(())
}

/// Resolves a subkey index cell (`lf`/`lh`/`li`/`ri`) into the list of
/// `nk` cell offsets it ultimately points to. `ri` indirects through a
/// second level of index records.
fn subkey_offsets(data: &[u8], offset: u32) -> Result<Vec<u32>, RegistryError> {
    let cell = cell_at(data, offset)?;
    if cell.len() < 4 {
        return Err(RegistryError::BadCellSignature(offset));
    }
    let sig = &cell[0..2];
    let count = LittleEndian::read_u16(&cell[2..4]) as usize;

    match sig {
        b"lf" | b"lh" => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let entry = 4 + i * 8;
                if entry + 4 > cell.len() {
                    break;
                }
                out.push(LittleEndian::read_u32(&cell[entry..entry + 4]));
            }
            Ok(out)
        }
        b"li" => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let entry = 4 + i * 4;
                if entry + 4 > cell.len() {
                    break;
                }
                out.push(LittleEndian::read_u32(&cell[entry..entry + 4]));
            }
            Ok(out)
        }
        b"ri" => {
            let mut out = Vec::new();
            for i in 0..count {
                let entry = 4 + i * 4;
                if entry + 4 > cell.len() {
                    break;
                }
                let indirect = LittleEndian::read_u32(&cell[entry..entry + 4]);
                out.extend(subkey_offsets(data, indirect)?);
            }
            Ok(out)
        }
        _ => Err(RegistryError::BadCellSignature(offset)),
    }
}

fn values_in(data: &[u8], offset: u32, count: u32) -> Result<Vec<u32>, RegistryError> {
    let cell = cell_at(data, offset)?;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let entry = i * 4;
        if entry + 4 > cell.len() {
            break;
        }
        out.push(LittleEndian::read_u32(&cell[entry..entry + 4]));
    }
    Ok(out)
}

fn read_value(data: &[u8], offset: u32) -> Result<(String, String), RegistryError> {
    let cell = cell_at(data, offset)?;
    if cell.len() < 0x14 || &cell[0..2] != b"vk" {
        return Err(RegistryError::BadCellSignature(offset));
    }
    let name_length = LittleEndian::read_u16(&cell[0x02..0x04]) as usize;
    let data_length = LittleEndian::read_u32(&cell[0x04..0x08]);
    let data_offset = LittleEndian::read_u32(&cell[0x08..0x0C]);
    let data_type = LittleEndian::read_u32(&cell[0x0C..0x10]);
    let flags = LittleEndian::read_u16(&cell[0x10..0x12]);
    let name_bytes = cell.get(0x14..0x14 + name_length).unwrap_or(&[]);
    let name = if name_length == 0 {
        "(default)".to_string()
    } else {
        decode_key_name(name_bytes, flags)
    };

    // Top bit of data_length set means the data is stored inline in the
    // 4-byte data_offset field itself rather than in a separate cell.
    let inline = data_length & 0x8000_0000 != 0;
    let len = (data_length & 0x7fff_ffff) as usize;
    let raw = if inline {
        data_offset.to_le_bytes()[..len.min(4)].to_vec()
    } else {
        cell_at(data, data_offset)
            .map(|c| c.get(..len.min(c.len())).unwrap_or(&[]).to_vec())
            .unwrap_or_default()
    };

    Ok((name, render_value(data_type, &raw)))
}

/// Value name / key name strings are ASCII when bit 0x20 of the owning
/// record's flags is set, UTF-16LE otherwise.
fn decode_key_name(bytes: &[u8], flags: u16) -> String {
    const KEY_COMP_NAME: u16 = 0x20;
    if flags & KEY_COMP_NAME != 0 {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }
}

/// REG_SZ/REG_EXPAND_SZ render as UTF-16 text; REG_DWORD as a decimal
/// integer; everything else (REG_BINARY, REG_MULTI_SZ, ...) as hex —
/// good enough for a forensic row without re-implementing every registry
/// value type's semantics.
fn render_value(data_type: u32, raw: &[u8]) -> String {
    const REG_SZ: u32 = 1;
    const REG_EXPAND_SZ: u32 = 2;
    const REG_DWORD: u32 = 4;

    match data_type {
        REG_SZ | REG_EXPAND_SZ => {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
                .trim_end_matches('\0')
                .to_string()
        }
        REG_DWORD if raw.len() >= 4 => LittleEndian::read_u32(raw).to_string(),
        _ => raw.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Hand-assembles a minimal valid hive: base block + one hbin
    /// containing a root `nk` with no subkeys and one `vk`.
    fn build_minimal_hive(key_name: &str, value_name: &str, value_data: &str) -> Vec<u8> {
        let mut hbin_body = Vec::new();

        // vk cell for the value.
        let vk_offset = hbin_body.len() as u32;
        let value_utf16: Vec<u8> = value_data.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut vk_cell = Vec::new();
        vk_cell.extend_from_slice(b"vk");
        vk_cell.extend_from_slice(&(value_name.len() as u16).to_le_bytes());
        vk_cell.extend_from_slice(&(value_utf16.len() as u32).to_le_bytes());
        let value_data_offset_placeholder = 0u32; // filled in after we know the data cell's offset
        vk_cell.extend_from_slice(&value_data_offset_placeholder.to_le_bytes());
        vk_cell.extend_from_slice(&1u32.to_le_bytes()); // REG_SZ
        vk_cell.extend_from_slice(&0x20u16.to_le_bytes()); // flags: ASCII name
        vk_cell.extend_from_slice(&0u16.to_le_bytes());
        vk_cell.extend_from_slice(value_name.as_bytes());
        push_cell(&mut hbin_body, &vk_cell);

        let data_cell_offset = hbin_body.len() as u32;
        push_cell(&mut hbin_body, &value_utf16);

        // Patch the vk cell's data_offset now that we know it.
        let patch_at = vk_offset as usize + 4 + 0x08;
        hbin_body[patch_at..patch_at + 4].copy_from_slice(&data_cell_offset.to_le_bytes());

        // values list: one u32 pointing at the vk cell.
        let values_list_offset = hbin_body.len() as u32;
        push_cell(&mut hbin_body, &vk_offset.to_le_bytes());

        // nk (root) cell.
        let nk_offset = hbin_body.len() as u32;
        let mut nk_cell = vec![0u8; 0x4C];
        nk_cell[0..2].copy_from_slice(b"nk");
        nk_cell[0x02..0x04].copy_from_slice(&0x20u16.to_le_bytes()); // ASCII name
        nk_cell[0x14..0x18].copy_from_slice(&0u32.to_le_bytes()); // subkey_count
        nk_cell[0x24..0x28].copy_from_slice(&1u32.to_le_bytes()); // values_count
        nk_cell[0x28..0x2C].copy_from_slice(&values_list_offset.to_le_bytes());
        nk_cell[0x48..0x4A].copy_from_slice(&(key_name.len() as u16).to_le_bytes());
        nk_cell.extend_from_slice(key_name.as_bytes());
        push_cell(&mut hbin_body, &nk_cell);

        let mut hbin = Vec::new();
        hbin.extend_from_slice(HBIN_SIGNATURE);
        hbin.extend_from_slice(&0u32.to_le_bytes()); // offset from first hbin
        let hbin_size = 0x20 + hbin_body.len();
        let hbin_size = hbin_size.div_ceil(8) * 8;
        hbin.extend_from_slice(&(hbin_size as u32).to_le_bytes());
        hbin.extend_from_slice(&[0u8; 16]); // remaining base-block-style padding fields
        hbin.extend_from_slice(&hbin_body);
        hbin.resize(hbin_size, 0);

        let mut file = vec![0u8; CELL_BASE];
        file[0..4].copy_from_slice(HIVE_SIGNATURE);
        file[0x24..0x28].copy_from_slice(&nk_offset.to_le_bytes());
        file.extend_from_slice(&hbin);
        file
    }

    fn push_cell(buf: &mut Vec<u8>, body: &[u8]) {
        let total = 4 + body.len();
        let total = total.div_ceil(8) * 8;
        let size: i32 = -(total as i32); // negative = allocated
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(body);
        buf.resize(buf.len() + (total - 4 - body.len()), 0);
    }

    #[test]
    fn walks_root_key_and_matches_value() {
        let hive = build_minimal_hive("ROOT", "Version", "1.0");
        let rows = find_registry_rows(
            &hive,
            &RegistryFindSpec {
                key_pattern: "*".into(),
                value_pattern: "*".into(),
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key_path, "ROOT");
        assert_eq!(rows[0].value_name.as_deref(), Some("Version"));
        assert_eq!(rows[0].value_data.as_deref(), Some("1.0"));
    }

    #[test]
    fn key_pattern_excludes_non_matching_root() {
        let hive = build_minimal_hive("ROOT", "Version", "1.0");
        let rows = find_registry_rows(
            &hive,
            &RegistryFindSpec {
                key_pattern: "NOPE".into(),
                value_pattern: "*".into(),
            },
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn rejects_non_hive_input() {
        let err = find_registry_rows(b"not a hive", &RegistryFindSpec::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NotAHive));
    }
}
