//! Store-agnostic file and directory references.
//!
//! A [`StorePath`] may name a local file (`/data/in/a.csv`) or a remote object
//! (`https://example.com/a.csv`). Path arithmetic is purely lexical with `/`
//! separators so the same rules apply to every store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a file in any supported storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorePath(String);

impl StorePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final component of the path (`a.csv` for `/data/a.csv`).
    ///
    /// Trailing slashes are ignored. A path with no separator is its own
    /// file name.
    pub fn file_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// The directory containing this path.
    pub fn parent(&self) -> StoreDir {
        let trimmed = self.0.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => StoreDir::new("/"),
            Some(idx) => StoreDir::new(&trimmed[..idx]),
            None => StoreDir::new("."),
        }
    }

    /// The file extension including the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx..]),
        }
    }

    /// Whether this is an absolute local filesystem path.
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StorePath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reference to a directory (or directory-like prefix) in any storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreDir(String);

impl StoreDir {
    pub fn new(dir: impl Into<String>) -> Self {
        Self(dir.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path to the named file inside this directory.
    pub fn path_to(&self, name: &str) -> StorePath {
        StorePath::new(join(&self.0, name))
    }

    /// A subdirectory of this directory.
    pub fn sub_dir(&self, name: &str) -> StoreDir {
        StoreDir::new(join(&self.0, name))
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreDir {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StoreDir {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        return name.to_string();
    }
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_of_nested_path() {
        assert_eq!(StorePath::new("/data/in/a.csv").file_name(), "a.csv");
        assert_eq!(StorePath::new("a.csv").file_name(), "a.csv");
        assert_eq!(StorePath::new("/data/in/").file_name(), "in");
        assert_eq!(
            StorePath::new("https://example.com/x/y.json").file_name(),
            "y.json"
        );
    }

    #[test]
    fn parent_dir() {
        assert_eq!(StorePath::new("/data/in/a.csv").parent().as_str(), "/data/in");
        assert_eq!(StorePath::new("/a.csv").parent().as_str(), "/");
        assert_eq!(StorePath::new("a.csv").parent().as_str(), ".");
    }

    #[test]
    fn extension_includes_dot() {
        assert_eq!(StorePath::new("/data/a.csv").extension(), Some(".csv"));
        assert_eq!(StorePath::new("/data/archive.tar.gz").extension(), Some(".gz"));
        assert_eq!(StorePath::new("/data/.hidden").extension(), None);
        assert_eq!(StorePath::new("/data/README").extension(), None);
    }

    #[test]
    fn dir_joins_without_doubling_separators() {
        let out = StoreDir::new("/out/");
        assert_eq!(out.path_to("a.txt").as_str(), "/out/a.txt");
        assert_eq!(out.sub_dir("task").path_to("/b.txt").as_str(), "/out/task/b.txt");
        assert_eq!(StoreDir::new("").path_to("c.txt").as_str(), "c.txt");
    }

    #[test]
    fn serde_is_transparent() {
        let path: StorePath = serde_json::from_str("\"/tmp/x\"").unwrap();
        assert_eq!(path.as_str(), "/tmp/x");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"/tmp/x\"");
    }
}
