use crate::error::PeError;
use crate::header::{parse_dos_header, parse_pe_header, DataDirectory, SectionHeader};
use crate::resource::{find_version_info, FixedFileInfo};
use crate::security::read_security_directory;

/// Everything a candidate PE image yields once probed (C5): the section
/// table (for any further RVA resolution downstream), an optional
/// version resource, and an optional authenticode certificate table.
/// Both optional fields are `None` for a perfectly valid PE that simply
/// lacks them — only a structurally invalid image fails `probe` outright.
#[derive(Debug, Clone)]
pub struct PeProbe {
    pub number_of_sections: u16,
    pub sections: Vec<SectionHeader>,
    pub data_directories: Vec<DataDirectory>,
    pub version_info: Option<FixedFileInfo>,
    pub security_directory: Option<Vec<u8>>,
}

pub fn probe(data: &[u8]) -> Result<PeProbe, PeError> {
    let dos = parse_dos_header(data)?;
    let header = parse_pe_header(data, &dos)?;

    let version_info = find_version_info(data, &header.sections, &header.data_directories);
    let security_directory =
        read_security_directory(data, &header.data_directories).map(|s| s.to_vec());

    Ok(PeProbe {
        number_of_sections: header.number_of_sections,
        sections: header.sections,
        data_directories: header.data_directories,
        version_info,
        security_directory,
    })
}

/// A cheap check for whether `data` is worth routing to `probe` at all —
/// used by the classifier/pipeline to avoid paying for a full parse on
/// content that was never going to be a PE.
pub fn looks_like_pe(data: &[u8]) -> bool {
    parse_dos_header(data).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_pe_data_fails_to_probe() {
        let data = vec![0u8; 256];
        assert!(probe(&data).is_err());
        assert!(!looks_like_pe(&data));
    }
}
