//! Data source registry
//!
//! Maps a logical database identifier to the immutable connection
//! parameters read from its properties file at start-up.

mod properties;

pub use properties::Properties;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSourceKind {
    Sqlite,
    MySql,
    PostgreSql,
}

impl DataSourceKind {
    pub const ALL: [DataSourceKind; 3] = [
        DataSourceKind::Sqlite,
        DataSourceKind::MySql,
        DataSourceKind::PostgreSql,
    ];

    /// Identifier used on the command line and in file names
    pub fn identifier(&self) -> &'static str {
        match self {
            DataSourceKind::Sqlite => "sqlite",
            DataSourceKind::MySql => "mysql",
            DataSourceKind::PostgreSql => "postgresql",
        }
    }

    /// sqlx URL scheme of the driver serving this backend
    pub fn driver(&self) -> &'static str {
        match self {
            DataSourceKind::Sqlite => "sqlite",
            DataSourceKind::MySql => "mysql",
            DataSourceKind::PostgreSql => "postgres",
        }
    }

    /// Default properties file for this backend inside `config_dir`
    pub fn properties_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(format!("{}-properties.xml", self.identifier()))
    }
}

impl FromStr for DataSourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        DataSourceKind::ALL
            .into_iter()
            .find(|kind| kind.identifier().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownDataSource(s.to_string()))
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Connection parameters for one data source
#[derive(Clone, PartialEq, Eq)]
pub struct DataSourceProfile {
    kind: DataSourceKind,
    server_name: String,
    port_number: u16,
    database_name: String,
    user_name: String,
    password: String,
}

impl DataSourceProfile {
    /// Build a profile from parsed properties
    pub fn from_properties(kind: DataSourceKind, props: &Properties, origin: &str) -> Result<Self> {
        let required = |key: &str| {
            props
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| Error::config_load(origin, format!("missing property '{}'", key)))
        };

        let database_name = required("database_name")?;
        if database_name.is_empty() {
            return Err(Error::config_load(origin, "empty property 'database_name'"));
        }

        // An embedded SQLite file has no server, so only the file name is mandatory
        let (server_name, port_number) = match kind {
            DataSourceKind::Sqlite => (
                props.get("server_name").unwrap_or_default().to_string(),
                props
                    .get("port_number")
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or_default(),
            ),
            _ => {
                let port = required("port_number")?;
                let port_number: u16 = port.parse().map_err(|_| {
                    Error::config_load(origin, format!("invalid port_number '{}'", port))
                })?;
                (required("server_name")?, port_number)
            }
        };

        Ok(Self {
            kind,
            server_name,
            port_number,
            database_name,
            user_name: props.get("user_name").unwrap_or_default().to_string(),
            password: props.get("password").unwrap_or_default().to_string(),
        })
    }

    pub fn kind(&self) -> DataSourceKind {
        self.kind
    }

    pub fn driver(&self) -> &'static str {
        self.kind.driver()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn port_number(&self) -> u16 {
        self.port_number
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// sqlx connection URL for this profile
    pub fn connection_url(&self) -> String {
        match self.kind {
            DataSourceKind::Sqlite => format!("sqlite://{}?mode=rwc", self.database_name),
            _ => {
                let credentials = if self.user_name.is_empty() {
                    String::new()
                } else if self.password.is_empty() {
                    format!("{}@", urlencoding::encode(&self.user_name))
                } else {
                    format!(
                        "{}:{}@",
                        urlencoding::encode(&self.user_name),
                        urlencoding::encode(&self.password)
                    )
                };
                format!(
                    "{}://{}{}:{}/{}",
                    self.driver(),
                    credentials,
                    self.server_name,
                    self.port_number,
                    self.database_name
                )
            }
        }
    }
}

impl fmt::Debug for DataSourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceProfile")
            .field("kind", &self.kind)
            .field("server_name", &self.server_name)
            .field("port_number", &self.port_number)
            .field("database_name", &self.database_name)
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

/// All configured data sources, loaded once at start-up
#[derive(Debug, Clone)]
pub struct DataSourceRegistry {
    profiles: HashMap<DataSourceKind, DataSourceProfile>,
}

impl DataSourceRegistry {
    /// Load the properties file of every known data source from `config_dir`
    ///
    /// Any missing or malformed file is fatal.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let mut profiles = HashMap::new();
        for kind in DataSourceKind::ALL {
            let path = kind.properties_path(config_dir);
            let origin = path.display().to_string();
            let props = Properties::load(&path)?;
            let profile = DataSourceProfile::from_properties(kind, &props, &origin)?;
            tracing::debug!(data_source = %kind, path = %origin, "Loaded data source profile");
            profiles.insert(kind, profile);
        }
        Ok(Self { profiles })
    }

    /// Find the profile for an identifier, ignoring case and surrounding whitespace
    pub fn lookup(&self, identifier: &str) -> Result<&DataSourceProfile> {
        let kind: DataSourceKind = identifier.parse()?;
        self.profiles
            .get(&kind)
            .ok_or_else(|| Error::UnknownDataSource(identifier.to_string()))
    }
}
