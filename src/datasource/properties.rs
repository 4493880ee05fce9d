//! Java-style XML properties files
//!
//! ```xml
//! <properties>
//!   <comment>MySQL sample</comment>
//!   <entry key="database_name">testdb</entry>
//! </properties>
//! ```

use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Parsed key/value pairs of a properties file
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    /// Parse properties from an XML string
    pub fn parse(xml: &str) -> std::result::Result<Self, quick_xml::de::DeError> {
        let file: PropertiesXml = from_str(xml)?;
        let entries = file
            .entry
            .into_iter()
            .map(|e| (e.key, e.value.trim().to_string()))
            .collect();
        Ok(Self { entries })
    }

    /// Read and parse a properties file
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let xml = std::fs::read_to_string(path)
            .map_err(|e| Error::config_load(&display, e.to_string()))?;
        Self::parse(&xml).map_err(|e| Error::config_load(&display, e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct PropertiesXml {
    #[serde(rename = "entry", default)]
    entry: Vec<PropertyEntry>,
}

#[derive(Debug, Deserialize)]
struct PropertyEntry {
    #[serde(rename = "@key")]
    key: String,

    #[serde(rename = "$text", default)]
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_java_properties() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE properties SYSTEM "http://java.sun.com/dtd/properties.dtd">
<properties>
    <comment>MySQL sample properties</comment>
    <entry key="database_name">testdb</entry>
    <entry key="server_name"> localhost </entry>
    <entry key="port_number">3306</entry>
    <entry key="password"></entry>
</properties>"#;

        let props = Properties::parse(xml).unwrap();
        assert_eq!(props.get("database_name"), Some("testdb"));
        assert_eq!(props.get("server_name"), Some("localhost"));
        assert_eq!(props.get("port_number"), Some("3306"));
        assert_eq!(props.get("password"), Some(""));
        assert_eq!(props.get("user_name"), None);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Properties::load(Path::new("/nonexistent/mysql-properties.xml")).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { .. }));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(Properties::parse("<properties><entry key=\"a\">1</properties>").is_err());
    }
}
