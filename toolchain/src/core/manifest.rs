//! Structured view of an npm `package.json`.
//!
//! Only the dependency tables are modelled; every other field is ignored.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Dependency tables declared by a `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageManifest {
    pub dependencies: BTreeMap<String, Value>,
    pub dev_dependencies: BTreeMap<String, Value>,
    pub peer_dependencies: BTreeMap<String, Value>,
    pub optional_dependencies: BTreeMap<String, Value>,
}

impl PackageManifest {
    /// Whether `name` appears in any dependency table.
    pub fn declares(&self, name: &str) -> bool {
        [
            &self.dependencies,
            &self.dev_dependencies,
            &self.peer_dependencies,
            &self.optional_dependencies,
        ]
        .iter()
        .any(|table| table.contains_key(name))
    }
}

pub fn parse_manifest(raw: &str) -> Result<PackageManifest> {
    serde_json::from_str(raw).context("parse package.json")
}
