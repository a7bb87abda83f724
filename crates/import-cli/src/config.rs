use std::path::PathBuf;

use import_model::{DefinitionEntry, Disposition, TableDescription};
use serde::Deserialize;

/// The YAML configuration document `import-cli` loads before a run
/// (SPEC_FULL.md §6): target tables, the definition table driving
/// classification, and the four output directories.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub definitions: Vec<DefinitionEntry>,
    pub outputs: OutputsConfig,
}

#[derive(Debug, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default = "default_disposition")]
    pub disposition: Disposition,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub table_lock: bool,
}

fn default_disposition() -> Disposition {
    Disposition::AsIs
}

fn default_concurrency() -> usize {
    1
}

impl From<TableConfig> for TableDescription {
    fn from(table: TableConfig) -> Self {
        TableDescription {
            name: table.name,
            disposition: table.disposition,
            concurrency: table.concurrency.max(1),
            compress: table.compress,
            table_lock: table.table_lock,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputsConfig {
    pub result: PathBuf,
    pub import: PathBuf,
    pub extract: PathBuf,
    pub temp: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&text)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let yaml = r#"
tables:
  - name: processes
    disposition: createnew
    concurrency: 2
definitions:
  - pattern: "*.csv"
    action: import
    table: processes
outputs:
  result: /tmp/result
  import: /tmp/import
  extract: /tmp/extract
  temp: /tmp/temp
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.tables[0].concurrency, 2);
        assert_eq!(config.definitions.len(), 1);
        assert_eq!(config.outputs.result, PathBuf::from("/tmp/result"));
    }

    #[test]
    fn table_disposition_and_concurrency_default_sensibly() {
        let yaml = r#"
tables:
  - name: rows
outputs:
  result: /tmp/result
  import: /tmp/import
  extract: /tmp/extract
  temp: /tmp/temp
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tables[0].concurrency, 1);
        assert_eq!(config.tables[0].disposition, Disposition::AsIs);
    }
}
