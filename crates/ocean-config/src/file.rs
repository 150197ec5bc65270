// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Serialisation formats accepted for configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Picks the format from the file extension. Unknown extensions are TOML.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => ConfigFormat::Json,
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse YAML {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Reads and deserialises a configuration file, choosing the parser from the
/// extension.
pub fn load_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&text, ConfigFormat::from_path(path), path)
}

/// Deserialises configuration text. `origin` only feeds error messages.
pub fn parse_config_str<T: DeserializeOwned>(
    text: &str,
    format: ConfigFormat,
    origin: &Path,
) -> Result<T, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source,
        }),
        ConfigFormat::Json => serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: origin.to_path_buf(),
            source,
        }),
        ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "kebab-case")]
    struct Sample {
        batch_size: usize,
        decay_at_epoch_milestones: Vec<usize>,
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.conf")), ConfigFormat::Toml);
    }

    #[test]
    fn all_formats_deserialise_the_same_values() {
        let expected = Sample {
            batch_size: 4,
            decay_at_epoch_milestones: vec![10, 20],
        };
        let origin = Path::new("inline");
        let toml_text = "batch-size = 4\ndecay-at-epoch-milestones = [10, 20]\n";
        let json_text = r#"{"batch-size": 4, "decay-at-epoch-milestones": [10, 20]}"#;
        let yaml_text = "batch-size: 4\ndecay-at-epoch-milestones: [10, 20]\n";
        let from_toml: Sample = parse_config_str(toml_text, ConfigFormat::Toml, origin).unwrap();
        let from_json: Sample = parse_config_str(json_text, ConfigFormat::Json, origin).unwrap();
        let from_yaml: Sample = parse_config_str(yaml_text, ConfigFormat::Yaml, origin).unwrap();
        assert_eq!(from_toml, expected);
        assert_eq!(from_json, expected);
        assert_eq!(from_yaml, expected);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_file::<Sample>(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_config_file::<Sample>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }
}
