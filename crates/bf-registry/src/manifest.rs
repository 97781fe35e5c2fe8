//! Plugin manifest parsing and per-entry validation.

use bf_common::EventKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse manifest TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A manifest value is either a bare handler name, or (for `UNCONDITIONAL`
/// only) a `[name, interval]` pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Name(String),
    NameWithInterval(String, u8),
}

/// Raw, on-disk manifest shape: event-kind-or-special-key -> handler
/// reference. Function parameter usage is declared alongside the handler
/// name to avoid runtime introspection (see design notes).
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    #[serde(flatten)]
    pub entries: BTreeMap<String, ManifestValue>,
}

/// One validated manifest entry, ready for registry insertion.
#[derive(Debug, Clone)]
pub enum ManifestEntry {
    Initializer { symbol: String },
    Unconditional { symbol: String, interval: u8 },
    Handler { kind: EventKind, symbol: String },
}

/// The outcome of validating one plugin's manifest: entries that validated,
/// plus rejection messages for entries that didn't (rejection is per-entry,
/// never fails the whole plugin).
#[derive(Debug, Default)]
pub struct ValidatedManifest {
    pub entries: Vec<ManifestEntry>,
    pub rejections: Vec<String>,
}

pub fn parse_manifest(toml_str: &str) -> Result<RawManifest, ManifestError> {
    Ok(toml::from_str(toml_str)?)
}

/// Validate every entry in a raw manifest independently.
pub fn validate_manifest(raw: RawManifest) -> ValidatedManifest {
    let mut out = ValidatedManifest::default();

    for (key, value) in raw.entries {
        match key.as_str() {
            "INITIALIZER" => match value {
                ManifestValue::Name(symbol) => {
                    out.entries.push(ManifestEntry::Initializer { symbol });
                }
                ManifestValue::NameWithInterval(..) => {
                    out.rejections
                        .push("INITIALIZER must be a bare handler name".to_string());
                }
            },
            "UNCONDITIONAL" => match value {
                ManifestValue::Name(symbol) => {
                    out.entries
                        .push(ManifestEntry::Unconditional { symbol, interval: 1 });
                }
                ManifestValue::NameWithInterval(symbol, interval) => {
                    if (1..=60).contains(&interval) {
                        out.entries
                            .push(ManifestEntry::Unconditional { symbol, interval });
                    } else {
                        out.rejections.push(format!(
                            "UNCONDITIONAL interval {interval} out of range [1,60]"
                        ));
                    }
                }
            },
            other => match EventKind::from_manifest_key(other) {
                Some(kind) => match value {
                    ManifestValue::Name(symbol) => {
                        out.entries.push(ManifestEntry::Handler { kind, symbol });
                    }
                    ManifestValue::NameWithInterval(..) => {
                        out.rejections
                            .push(format!("{other} must be a bare handler name"));
                    }
                },
                None => {
                    out.rejections.push(format!("unrecognized manifest key: {other}"));
                }
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name_and_pair() {
        let toml_str = r#"
            INITIALIZER = "setup"
            UNCONDITIONAL = ["tick", 5]
            MESSAGE_PRIVATE = "on_dm"
        "#;
        let raw = parse_manifest(toml_str).unwrap();
        let validated = validate_manifest(raw);
        assert!(validated.rejections.is_empty());
        assert_eq!(validated.entries.len(), 3);
    }

    #[test]
    fn rejects_out_of_range_interval_without_failing_plugin() {
        let toml_str = r#"
            UNCONDITIONAL = ["tick", 90]
            MESSAGE_PRIVATE = "on_dm"
        "#;
        let raw = parse_manifest(toml_str).unwrap();
        let validated = validate_manifest(raw);
        assert_eq!(validated.rejections.len(), 1);
        assert_eq!(validated.entries.len(), 1);
    }

    #[test]
    fn rejects_unrecognized_key() {
        let toml_str = r#"NOT_A_REAL_KIND = "handler""#;
        let raw = parse_manifest(toml_str).unwrap();
        let validated = validate_manifest(raw);
        assert_eq!(validated.rejections.len(), 1);
        assert!(validated.entries.is_empty());
    }
}
