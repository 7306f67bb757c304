//! Static identity metadata for a toolchain variant.

/// A template repository a new package can be cloned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarterKit {
    pub name: &'static str,
    /// Repository locator.
    pub path: &'static str,
    /// Version tag to check out.
    pub tag: &'static str,
}

/// Immutable description of a toolchain, one per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolchainDescriptor {
    /// Machine id used in project configuration (e.g. `assemblyscript`).
    pub name: &'static str,
    /// Human label.
    pub display_name: &'static str,
    /// Directory, relative to the project root, holding the sources.
    pub source_directory: &'static str,
    /// Extra files bundled into the final package archive.
    pub include_files: &'static [&'static str],
    /// Ordered; the first kit is the default.
    pub starter_kits: &'static [StarterKit],
}

impl ToolchainDescriptor {
    pub fn default_starter_kit(&self) -> Option<&'static StarterKit> {
        self.starter_kits.first()
    }
}
