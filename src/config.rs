//! Process configuration

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Runtime configuration read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one `<identifier>-properties.xml` file per data source
    pub config_dir: PathBuf,
    /// Text file streamed into the CLOB table by the CLOB workflow
    pub sample_file: PathBuf,
    /// Rows per page for the paging workflow
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_dir: PathBuf::from("properties"),
            sample_file: PathBuf::from("txt/colombian-description.txt"),
            page_size: 8,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key))
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, env::VarError>,
    {
        let defaults = Config::default();
        let page_size = match lookup("ROWSET_PAGE_SIZE") {
            Ok(raw) => {
                let size: usize = raw.trim().parse().map_err(|_| {
                    Error::config_load("ROWSET_PAGE_SIZE", format!("not a number: '{}'", raw))
                })?;
                if size == 0 {
                    return Err(Error::InvalidPageSize(size));
                }
                size
            }
            Err(_) => defaults.page_size,
        };

        Ok(Config {
            config_dir: lookup("ROWSET_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            sample_file: lookup("ROWSET_SAMPLE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.sample_file),
            page_size,
        })
    }
}
