//! Relative path model for archive entry names.
//!
//! Entry names inside a ZIP archive use forward slashes exclusively and must
//! stay relative: a name that is rooted (`/...`), carries a drive letter
//! (`C:...`) or contains backslashes is rejected up front, before anything is
//! written to disk. [`ArchivePath`] is the validated, immutable form the rest
//! of the crate works with.

use std::fmt;

use anyhow::{Result, bail};

/// An immutable relative path, split into non-empty components.
///
/// The empty path (zero components) is valid and means the current directory.
/// Rendering via `Display` joins the components with `/` and never produces a
/// leading or trailing slash.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath {
    components: Vec<String>,
}

impl ArchivePath {
    /// Parse a slash-separated path.
    ///
    /// Fails on rooted paths, drive letters and backslashes. Empty input (and
    /// input that collapses to nothing, like `"//"`) yields the empty path.
    pub fn new(path: &str) -> Result<Self> {
        if path.starts_with('/') {
            bail!("rooted path {:?} not supported", path);
        }
        if path.contains(':') {
            bail!("rooted path {:?} not supported", path);
        }
        if path.contains('\\') {
            bail!("backslashes in path {:?} not supported", path);
        }
        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { components })
    }

    /// The empty path, i.e. the current directory.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The path with the last component dropped. Fails on the empty path.
    pub fn parent(&self) -> Result<Self> {
        if self.components.is_empty() {
            bail!("empty path has no parent");
        }
        let mut parent = self.clone();
        parent.components.pop();
        Ok(parent)
    }

    /// The last component. Fails on the empty path.
    pub fn basename(&self) -> Result<&str> {
        match self.components.last() {
            Some(c) => Ok(c),
            None => bail!("empty path has no basename"),
        }
    }

    /// Concatenate two paths.
    pub fn join(&self, other: &Self) -> Self {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Self { components }
    }

    /// Append `ext` verbatim to the last component, creating one if the path
    /// is empty. The caller supplies any dot; `ext` must not contain path
    /// separators.
    pub fn add_ext(&self, ext: &str) -> Self {
        debug_assert!(!ext.contains('/') && !ext.contains('\\'));
        let mut out = self.clone();
        match out.components.last_mut() {
            Some(last) => last.push_str(ext),
            None => out.components.push(ext.to_string()),
        }
        out
    }

    /// Split the extension off the last component.
    ///
    /// Returns `(stem_path, ext)` where the stem keeps its trailing dot, so
    /// that `stem_path.add_ext(&ext)` rebuilds the input, including names
    /// that start with a dot. `None` when the path is empty or the last
    /// component has no dot.
    pub fn split_ext(&self) -> Option<(Self, String)> {
        let base = self.components.last()?;
        let dot = base.rfind('.')?;
        let stem = base[..=dot].to_string();
        let ext = base[dot + 1..].to_string();
        let mut stem_path = self.clone();
        if let Some(last) = stem_path.components.last_mut() {
            *last = stem;
        }
        Some((stem_path, ext))
    }

    /// Render under an output prefix as a filesystem path.
    pub fn to_fs_path(&self, prefix: &std::path::Path) -> std::path::PathBuf {
        let mut out = prefix.to_path_buf();
        for c in &self.components {
            out.push(c);
        }
        out
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}
