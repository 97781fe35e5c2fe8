//! Plugin discovery, manifest validation, and the handler registry.

pub mod manifest;

use async_trait::async_trait;
use bf_common::EventKind;
use manifest::{parse_manifest, validate_manifest, ManifestEntry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to scan plugin directory: {0}")]
    Scan(#[from] std::io::Error),
}

/// A fully-resolved reference to a plugin-exported handler function, ready
/// to be handed to the sandbox.
#[derive(Debug, Clone)]
pub struct HandlerRef {
    pub plugin_id: String,
    pub plugin_path: PathBuf,
    pub symbol: String,
}

/// A periodic handler plus its wake interval in minutes.
#[derive(Debug, Clone)]
pub struct PeriodicHandler {
    pub handler: HandlerRef,
    pub interval: u8,
}

/// Implemented by whatever component can actually invoke an initializer
/// (always the sandbox, through the same worker-process isolation as any
/// other handler invocation). Kept as a trait so the registry never depends
/// on the sandbox crate directly.
#[async_trait]
pub trait InitializerRunner: Send + Sync {
    /// Returns `true` on success (the initializer returned `null`/nothing),
    /// `false` on any raised error or non-null return.
    async fn run_initializer(&self, handler: &HandlerRef) -> bool;
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    by_kind: HashMap<EventKind, Vec<HandlerRef>>,
    periodic: Vec<PeriodicHandler>,
    initializers: Vec<HandlerRef>,
    failed_plugins: Vec<String>,
}

impl PluginRegistry {
    /// Scan `plugins_dir` for `<plugin_id>/manifest.toml` + sibling shared
    /// object, in lexicographic directory order, validating each manifest
    /// entry independently. A rejected entry drops only itself, never the
    /// whole plugin.
    pub fn discover(plugins_dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = PluginRegistry::default();

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(plugins_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let plugin_id = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let manifest_path = dir.join("manifest.toml");
            let manifest_str = match std::fs::read_to_string(&manifest_path) {
                Ok(s) => s,
                Err(e) => {
                    warn!(plugin_id, error = %e, "no readable manifest, skipping plugin");
                    continue;
                }
            };

            let raw = match parse_manifest(&manifest_str) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(plugin_id, error = %e, "manifest failed to parse, skipping plugin");
                    continue;
                }
            };

            let so_path = find_shared_object(&dir);
            let so_path = match so_path {
                Some(p) => p,
                None => {
                    warn!(plugin_id, "no shared object found alongside manifest, skipping plugin");
                    continue;
                }
            };

            if let Err(e) = probe_library(&so_path) {
                warn!(plugin_id, error = %e, "failed to open plugin library, skipping plugin");
                continue;
            }

            let validated = validate_manifest(raw);
            for rejection in &validated.rejections {
                warn!(plugin_id, rejection, "manifest entry rejected");
            }

            for entry in validated.entries {
                match entry {
                    ManifestEntry::Initializer { symbol } => {
                        registry.initializers.push(HandlerRef {
                            plugin_id: plugin_id.clone(),
                            plugin_path: so_path.clone(),
                            symbol,
                        });
                    }
                    ManifestEntry::Unconditional { symbol, interval } => {
                        registry.periodic.push(PeriodicHandler {
                            handler: HandlerRef {
                                plugin_id: plugin_id.clone(),
                                plugin_path: so_path.clone(),
                                symbol,
                            },
                            interval,
                        });
                    }
                    ManifestEntry::Handler { kind, symbol } => {
                        registry.by_kind.entry(kind).or_default().push(HandlerRef {
                            plugin_id: plugin_id.clone(),
                            plugin_path: so_path.clone(),
                            symbol,
                        });
                    }
                }
            }

            info!(plugin_id, "plugin discovered and validated");
        }

        Ok(registry)
    }

    /// Run every initializer serially, in discovery order. Any plugin whose
    /// initializer fails has every one of its handlers purged from every
    /// list, after the full initializer pass completes.
    pub async fn run_initializers(&mut self, runner: &dyn InitializerRunner) {
        let mut failed = Vec::new();

        for handler in &self.initializers {
            let ok = runner.run_initializer(handler).await;
            if !ok {
                error!(plugin_id = %handler.plugin_id, "initializer failed, plugin will be purged");
                failed.push(handler.plugin_id.clone());
            }
        }

        for plugin_id in failed {
            self.purge_plugin(&plugin_id);
        }
    }

    fn purge_plugin(&mut self, plugin_id: &str) {
        for handlers in self.by_kind.values_mut() {
            handlers.retain(|h| h.plugin_id != plugin_id);
        }
        self.periodic.retain(|p| p.handler.plugin_id != plugin_id);
        self.initializers.retain(|h| h.plugin_id != plugin_id);
        self.failed_plugins.push(plugin_id.to_string());
    }

    pub fn handlers_for(&self, kind: EventKind) -> Vec<HandlerRef> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        let mut kinds_to_check = vec![kind];
        kinds_to_check.extend(kind.inherits_from().iter().copied());

        for k in kinds_to_check {
            if let Some(handlers) = self.by_kind.get(&k) {
                for h in handlers {
                    let identity = (h.plugin_id.clone(), h.symbol.clone());
                    if seen.insert(identity) {
                        out.push(h.clone());
                    }
                }
            }
        }
        out
    }

    pub fn periodic_handlers(&self) -> &[PeriodicHandler] {
        &self.periodic
    }

    pub fn has_periodic_handlers(&self) -> bool {
        !self.periodic.is_empty()
    }

    pub fn failed_plugins(&self) -> &[String] {
        &self.failed_plugins
    }
}

fn find_shared_object(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("so" | "dylib" | "dll")))
}

fn probe_library(path: &Path) -> Result<(), libloading::Error> {
    unsafe {
        libloading::Library::new(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_common::EventKind;

    #[test]
    fn handlers_for_dedupes_across_inherited_kinds() {
        let mut registry = PluginRegistry::default();
        let handler = HandlerRef {
            plugin_id: "dice".to_string(),
            plugin_path: PathBuf::from("dice.so"),
            symbol: "on_group".to_string(),
        };
        registry
            .by_kind
            .entry(EventKind::MessageGroup)
            .or_default()
            .push(handler.clone());
        registry
            .by_kind
            .entry(EventKind::MessageGroupMention)
            .or_default()
            .push(handler);

        let out = registry.handlers_for(EventKind::MessageGroupMention);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn purge_removes_from_all_lists() {
        let mut registry = PluginRegistry::default();
        let handler = HandlerRef {
            plugin_id: "bad".to_string(),
            plugin_path: PathBuf::from("bad.so"),
            symbol: "on_dm".to_string(),
        };
        registry
            .by_kind
            .entry(EventKind::MessagePrivate)
            .or_default()
            .push(handler.clone());
        registry.periodic.push(PeriodicHandler {
            handler: handler.clone(),
            interval: 5,
        });
        registry.initializers.push(handler);

        registry.purge_plugin("bad");

        assert!(registry.handlers_for(EventKind::MessagePrivate).is_empty());
        assert!(registry.periodic.is_empty());
        assert!(registry.initializers.is_empty());
        assert_eq!(registry.failed_plugins(), &["bad".to_string()]);
    }
}
