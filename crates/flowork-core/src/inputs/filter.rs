//! Path filters applied to input listings.

use regex::Regex;

use flowork_types::files::StorePath;

/// A predicate over input paths. Lists of filters combine with logical AND.
#[derive(Debug, Clone)]
pub enum PathFilter {
    /// Regular expression matched anywhere in the full path.
    Regex(Regex),
    /// Exact file extension, stored with its leading dot.
    Extension(String),
}

impl PathFilter {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(PathFilter::Regex(Regex::new(pattern)?))
    }

    /// Extension filter; the leading dot is optional (`csv` == `.csv`).
    pub fn extension(ext: &str) -> Self {
        if ext.starts_with('.') {
            PathFilter::Extension(ext.to_string())
        } else {
            PathFilter::Extension(format!(".{ext}"))
        }
    }

    pub fn matches(&self, path: &StorePath) -> bool {
        match self {
            PathFilter::Regex(re) => re.is_match(path.as_str()),
            PathFilter::Extension(ext) => path.extension() == Some(ext.as_str()),
        }
    }

    /// Whether `path` passes every filter. An empty list accepts everything.
    pub fn matches_all(filters: &[PathFilter], path: &StorePath) -> bool {
        filters.iter().all(|f| f.matches(path))
    }
}
