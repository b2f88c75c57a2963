//! Resolution of file-referenced policy fragments.

use crate::error::PolicyError;
use crate::policy::Policy;
use log::debug;
use std::fs;
use std::path::Path;

/// Resolves a referenced fragment into a policy sub-tree.
///
/// Resolution is the only operation in the crate that may perform IO; the
/// tree walk in [`Policy::load_references`] only observes the outcome.
pub trait FragmentResolver {
    /// Load the fragment at `fragment`, interpreted relative to `root`
    /// unless absolute.
    fn resolve(&self, root: &Path, fragment: &Path) -> Result<Policy, PolicyError>;
}

/// File-system resolver reading JSON5 fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsResolver;

impl FsResolver {
    /// Create a file-system resolver.
    pub fn new() -> Self {
        Self
    }
}

impl FragmentResolver for FsResolver {
    fn resolve(&self, root: &Path, fragment: &Path) -> Result<Policy, PolicyError> {
        let path = if fragment.is_absolute() {
            fragment.to_path_buf()
        } else {
            root.join(fragment)
        };
        debug!("reading fragment (path={})", path.display());
        let contents = fs::read_to_string(&path)?;
        let value: serde_json::Value = json5::from_str(&contents)?;
        Policy::from_json(&value)
    }
}
