/// The `(computer_name, system_type, time_stamp)` triple parsed from an
/// item's origin filename, following the `<ComputerName>_<SystemType>_
/// <TimeStamp>.<ext>` convention used by the collectors that produce these
/// artifacts. Best-effort: a filename that doesn't match yields empty
/// fields rather than an error, since provenance is metadata, not a parse
/// gate (SPEC_FULL.md §4.12).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub computer_name: String,
    pub system_type: String,
    pub time_stamp: String,
}

impl Provenance {
    pub fn parse(origin_filename: &str) -> Provenance {
        let stem = origin_filename
            .rsplit_once('.')
            .map(|(stem, _ext)| stem)
            .unwrap_or(origin_filename);

        let parts: Vec<&str> = stem.splitn(3, '_').collect();
        match parts.as_slice() {
            [computer, system, timestamp] => Provenance {
                computer_name: (*computer).to_owned(),
                system_type: (*system).to_owned(),
                time_stamp: (*timestamp).to_owned(),
            },
            _ => Provenance::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_well_formed_name() {
        let p = Provenance::parse("WORKSTATION7_Win10x64_20240102T030405Z.7z");
        assert_eq!(p.computer_name, "WORKSTATION7");
        assert_eq!(p.system_type, "Win10x64");
        assert_eq!(p.time_stamp, "20240102T030405Z");
    }

    #[test]
    fn malformed_name_is_empty_not_error() {
        let p = Provenance::parse("bundle.7z");
        assert_eq!(p, Provenance::default());
    }

    #[test]
    fn extra_underscores_land_in_timestamp() {
        let p = Provenance::parse("HOST_Type_2024_01_02.csv");
        assert_eq!(p.computer_name, "HOST");
        assert_eq!(p.system_type, "Type");
        assert_eq!(p.time_stamp, "2024_01_02");
    }
}
