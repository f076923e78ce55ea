//! The "external defaults table" `spec.md` §4.1 treats as a collaborator of
//! the Pod Builder: per-language default build/run images, and the reserved
//! pool keys used when a [`Component`](crate::crd::Component) omits `pool`.
//!
//! In production this table would be supplied by the cluster operator (a
//! `--defaults <file>` YAML); [`PodDefaults::built_in`] is the fallback used
//! when no file is given, covering the languages named in the distilled
//! spec's example manifest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crd::Role;

/// Per-language default container images, keyed by the `language` field of
/// a [`Component`](crate::crd::Component).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PodDefaults {
    #[serde(default)]
    pub build_images: BTreeMap<String, String>,
    #[serde(default)]
    pub run_images: BTreeMap<String, String>,
}

impl PodDefaults {
    /// Minimal built-in table, used when the operator supplies none.
    pub fn built_in() -> Self {
        let run_images = BTreeMap::from([
            ("go".to_string(), "golang:1.22".to_string()),
            ("cxx".to_string(), "gcr.io/distroless/cc".to_string()),
            ("python".to_string(), "python:3.12-slim".to_string()),
            ("java".to_string(), "eclipse-temurin:21-jre".to_string()),
            ("node".to_string(), "node:20-slim".to_string()),
        ]);
        let build_images = BTreeMap::from([
            ("go".to_string(), "golang:1.22".to_string()),
            ("cxx".to_string(), "gcr.io/cloud-builders/gcc".to_string()),
            ("python".to_string(), "python:3.12-slim".to_string()),
            ("java".to_string(), "eclipse-temurin:21-jdk".to_string()),
            ("node".to_string(), "node:20-slim".to_string()),
        ]);
        PodDefaults {
            build_images,
            run_images,
        }
    }

    pub fn run_image(&self, language: &str) -> Option<&str> {
        self.run_images.get(language).map(|s| s.as_str())
    }

    pub fn build_image(&self, language: &str) -> Option<&str> {
        self.build_images.get(language).map(|s| s.as_str())
    }
}

/// Resolve the pool a component lands in: its explicit `pool`, or the
/// role's reserved default key.
pub fn resolve_pool(role: Role, pool: Option<&str>) -> String {
    pool.map(str::to_string)
        .unwrap_or_else(|| role.default_pool_key().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_covers_example_languages() {
        let defaults = PodDefaults::built_in();
        for lang in ["go", "cxx", "python", "java", "node"] {
            assert!(defaults.run_image(lang).is_some(), "missing run image for {lang}");
        }
    }

    #[test]
    fn test_run_image_unknown_language_is_none() {
        let defaults = PodDefaults::built_in();
        assert_eq!(defaults.run_image("cobol"), None);
    }

    #[test]
    fn test_resolve_pool_explicit() {
        assert_eq!(resolve_pool(Role::Server, Some("fast-pool")), "fast-pool");
    }

    #[test]
    fn test_resolve_pool_defaulted_per_role() {
        assert_eq!(resolve_pool(Role::Driver, None), "__default_pool (drivers)");
        assert_eq!(resolve_pool(Role::Server, None), "__default_pool (servers)");
        assert_eq!(resolve_pool(Role::Client, None), "__default_pool (clients)");
    }
}
