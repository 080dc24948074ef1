//! Optional settings from `config.toml` in the keystore directory.
//!
//! Every key is optional. A missing file, an unparsable file, a missing
//! section or a value of the wrong type all fall back to the defaults.

use std::path::Path;

use skillkey_vault::DEFAULT_LABEL;

/// File name of the settings file inside the keystore directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Settings read from the `[keystore]` and `[logging]` sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Label used when `import` gets no `--label` and `KEYSTORE_LABEL` is unset.
    pub default_label: String,
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_label: DEFAULT_LABEL.to_owned(),
            log_level: "warn".to_owned(),
            log_format: LogFormat::Compact,
        }
    }
}

/// Load `config.toml` from `dir`.
pub fn load_config(dir: &Path) -> Config {
    match std::fs::read_to_string(dir.join(CONFIG_FILE_NAME)) {
        Ok(content) => parse_config(&content),
        Err(_) => Config::default(),
    }
}

/// Parse settings from TOML text.
pub fn parse_config(content: &str) -> Config {
    let defaults = Config::default();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return defaults,
    };

    let section = |name: &str| match table.get(name) {
        Some(toml::Value::Table(t)) => Some(t),
        _ => None,
    };
    let keystore = section("keystore");
    let logging = section("logging");

    Config {
        default_label: keystore
            .and_then(|k| k.get("default_label"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .unwrap_or(defaults.default_label),
        log_level: logging
            .and_then(|l| l.get("level"))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or(defaults.log_level),
        log_format: match logging
            .and_then(|l| l.get("format"))
            .and_then(|v| v.as_str())
        {
            Some("json") => LogFormat::Json,
            _ => defaults.log_format,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        assert_eq!(parse_config(""), Config::default());
    }

    #[test]
    fn invalid_toml_uses_defaults() {
        assert_eq!(parse_config("[keystore\nlabel ="), Config::default());
    }

    #[test]
    fn reads_both_sections() {
        let config = parse_config(
            r#"
            [keystore]
            default_label = "ops"

            [logging]
            level = "debug"
            format = "json"
            "#,
        );
        assert_eq!(config.default_label, "ops");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn wrong_types_and_blank_label_fall_back() {
        let config = parse_config(
            r#"
            [keystore]
            default_label = "   "

            [logging]
            level = 3
            "#,
        );
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(load_config(tmp.path()), Config::default());

        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "[keystore]\ndefault_label = \"x\"\n")
            .unwrap();
        assert_eq!(load_config(tmp.path()).default_label, "x");
    }
}
