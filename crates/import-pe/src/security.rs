use crate::header::{DataDirectory, DIRECTORY_ENTRY_SECURITY};

/// Reads the authenticode certificate table (SPEC_FULL.md §4.5 step 5).
/// Unlike every other data directory entry, `IMAGE_DIRECTORY_ENTRY_SECURITY`'s
/// `virtual_address_or_offset` is a raw file offset, not an RVA, so this
/// never goes through section-table resolution. Returns `None` ("no
/// security directory", non-fatal) when the entry is empty or its range
/// runs past the end of the stream.
pub fn read_security_directory<'a>(
    data: &'a [u8],
    data_directories: &[DataDirectory],
) -> Option<&'a [u8]> {
    let entry = data_directories.get(DIRECTORY_ENTRY_SECURITY)?;
    if entry.size == 0 {
        return None;
    }
    let start = entry.virtual_address_or_offset as usize;
    let end = start.checked_add(entry.size as usize)?;
    if end > data.len() {
        return None;
    }
    Some(&data[start..end])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_entry_is_none() {
        let directories = vec![
            DataDirectory { virtual_address_or_offset: 0, size: 0 },
            DataDirectory { virtual_address_or_offset: 0, size: 0 },
            DataDirectory { virtual_address_or_offset: 0, size: 0 },
            DataDirectory { virtual_address_or_offset: 0, size: 0 },
            DataDirectory { virtual_address_or_offset: 100, size: 0 },
        ];
        let data = vec![0u8; 200];
        assert!(read_security_directory(&data, &directories).is_none());
    }

    #[test]
    fn out_of_bounds_entry_is_none() {
        let mut directories = vec![DataDirectory { virtual_address_or_offset: 0, size: 0 }; 5];
        directories[DIRECTORY_ENTRY_SECURITY] = DataDirectory {
            virtual_address_or_offset: 190,
            size: 50,
        };
        let data = vec![0u8; 200];
        assert!(read_security_directory(&data, &directories).is_none());
    }

    #[test]
    fn in_bounds_entry_returns_the_slice() {
        let mut directories = vec![DataDirectory { virtual_address_or_offset: 0, size: 0 }; 5];
        directories[DIRECTORY_ENTRY_SECURITY] = DataDirectory {
            virtual_address_or_offset: 100,
            size: 10,
        };
        let data = vec![0u8; 200];
        let dir = read_security_directory(&data, &directories).unwrap();
        assert_eq!(dir.len(), 10);
    }
}
