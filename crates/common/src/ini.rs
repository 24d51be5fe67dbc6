//! INI Configuration
//!
//! Line-oriented `key = value` configuration with optional `[section]` headers.
//! Keys before the first header belong to the global section. Lines starting
//! with `;` or `#` are comments. Values may be wrapped in double quotes.
//!
//! ```rust
//! use common::Ini;
//!
//! let ini = Ini::parse("tftp_listen_port = 6969\n[00:11:22:33:44:55]\nboot_file_name = \"pxelinux.0\"\n");
//! assert_eq!(ini.value_or::<u16>(None, "tftp_listen_port", 69), 6969);
//! assert_eq!(ini.value(Some("00:11:22:33:44:55"), "boot_file_name"), Some("pxelinux.0"));
//! assert_eq!(ini.sections().collect::<Vec<_>>(), vec!["00:11:22:33:44:55"]);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

const GLOBAL_SECTION: &str = "";

#[derive(Debug, Clone, Default)]
pub struct Ini {
    sections: HashMap<String, HashMap<String, String>>,
    /// Named sections in file order
    order: Vec<String>,
}

impl Ini {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text. Malformed lines are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut ini = Self::new();
        let mut section = GLOBAL_SECTION.to_string();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                section = name.trim().to_string();
                ini.ensure_section(&section);
                continue;
            }

            if !ini.insert_line(line, &section) {
                tracing::warn!("Ignoring malformed configuration line {}: '{}'", number + 1, line);
            }
        }

        ini
    }

    /// Load and parse a configuration file
    ///
    /// The file must exist, be a regular file, and be non-empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata =
            std::fs::metadata(path).with_context(|| format!("Unable to find file: {}", path.display()))?;

        if !metadata.is_file() {
            bail!("Not a regular file: {}", path.display());
        }
        if metadata.len() == 0 {
            bail!("File is empty: {}", path.display());
        }

        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Insert a single `key = value` line into `section`
    ///
    /// Returns false if the line has no `=` or an empty key.
    pub fn insert_line(&mut self, line: &str, section: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        let key = key.trim();
        if key.is_empty() {
            return false;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(value);

        self.ensure_section(section);
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        true
    }

    /// Raw value of `key`, in the global section when `section` is `None`
    pub fn value(&self, section: Option<&str>, key: &str) -> Option<&str> {
        self.sections
            .get(section.unwrap_or(GLOBAL_SECTION))
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }

    /// Value of `key` parsed as `T`; `None` when missing or unparsable
    pub fn value_as<T: FromStr>(&self, section: Option<&str>, key: &str) -> Option<T> {
        self.value(section, key).and_then(|value| value.parse().ok())
    }

    pub fn value_or<T: FromStr>(&self, section: Option<&str>, key: &str, default: T) -> T {
        self.value_as(section, key).unwrap_or(default)
    }

    /// Named sections in the order they first appeared
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn ensure_section(&mut self, section: &str) {
        if section != GLOBAL_SECTION && !self.sections.contains_key(section) {
            self.order.push(section.to_string());
        }
        self.sections.entry(section.to_string()).or_default();
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const SAMPLE: &str = r#"
; global settings
v4_bind_address = 10.0.0.1
tftp_base_dir = "/srv/tftp"
dhcp_listen_port = not-a-number

[AA:BB:CC:DD:EE:FF]
v4_your_address = 10.0.0.50
# comment
boot_file_name = pxelinux.0
garbage line

[00:11:22:33:44:55]
domain_name = lab.local
"#;

    #[test]
    fn test_parse_global_and_sections() {
        let ini = Ini::parse(SAMPLE);

        assert_eq!(ini.value(None, "tftp_base_dir"), Some("/srv/tftp"));
        assert_eq!(
            ini.value_as::<Ipv4Addr>(None, "v4_bind_address"),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(ini.value(Some("AA:BB:CC:DD:EE:FF"), "boot_file_name"), Some("pxelinux.0"));
        assert_eq!(ini.value(Some("AA:BB:CC:DD:EE:FF"), "garbage line"), None);
        assert_eq!(ini.value(None, "boot_file_name"), None);
        assert_eq!(
            ini.sections().collect::<Vec<_>>(),
            vec!["AA:BB:CC:DD:EE:FF", "00:11:22:33:44:55"]
        );
    }

    #[test]
    fn test_typed_fallback() {
        let ini = Ini::parse(SAMPLE);

        assert_eq!(ini.value_or::<u16>(None, "dhcp_listen_port", 67), 67);
        assert_eq!(ini.value_or::<u16>(None, "tftp_listen_port", 69), 69);
        assert_eq!(
            ini.value_or(Some("00:11:22:33:44:55"), "domain_name", "localhost".to_string()),
            "lab.local"
        );
    }

    #[test]
    fn test_insert_line_overrides() {
        let mut ini = Ini::parse(SAMPLE);

        assert!(ini.insert_line("tftp_base_dir = /tmp", ""));
        assert!(!ini.insert_line("no equals sign", ""));
        assert!(!ini.insert_line(" = value", ""));
        assert_eq!(ini.value(None, "tftp_base_dir"), Some("/tmp"));
    }

    #[test]
    fn test_load_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();

        assert!(Ini::load(dir.path().join("missing.ini")).is_err());
        assert!(Ini::load(dir.path()).is_err());

        let empty = dir.path().join("empty.ini");
        std::fs::write(&empty, b"").unwrap();
        assert!(Ini::load(&empty).is_err());

        let good = dir.path().join("good.ini");
        std::fs::write(&good, SAMPLE).unwrap();
        let ini = Ini::load(&good).unwrap();
        assert_eq!(ini.sections().count(), 2);
    }
}
