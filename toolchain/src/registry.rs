//! Maps a project's declared language to its toolchain.

use anyhow::{Result, anyhow};

use crate::assemblyscript::AssemblyScript;
use crate::toolchain::Toolchain;

/// Registered toolchains, in registration order.
pub struct Registry {
    toolchains: Vec<Box<dyn Toolchain>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            toolchains: Vec::new(),
        }
    }

    /// Registry with every toolchain shipped by this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.toolchains.push(Box::new(AssemblyScript));
        registry
    }

    /// Add a toolchain. Names must be unique.
    pub fn register(&mut self, toolchain: Box<dyn Toolchain>) -> Result<()> {
        if self.get(toolchain.name()).is_some() {
            return Err(anyhow!(
                "toolchain '{}' is already registered",
                toolchain.name()
            ));
        }
        self.toolchains.push(toolchain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Toolchain> {
        self.toolchains
            .iter()
            .find(|toolchain| toolchain.name() == name)
            .map(|toolchain| &**toolchain)
    }

    /// Look up the toolchain for `language`, listing the known ones on failure.
    pub fn select(&self, language: &str) -> Result<&dyn Toolchain> {
        self.get(language).ok_or_else(|| {
            anyhow!(
                "unsupported language '{language}' (supported: {})",
                self.names().join(", ")
            )
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.toolchains.iter().map(|toolchain| toolchain.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Toolchain> {
        self.toolchains.iter().map(|toolchain| &**toolchain)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
