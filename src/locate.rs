use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

/// Changelist restriction applied to capture file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChangelistFilter {
    #[default]
    All,
    Changelist(String),
}

impl ChangelistFilter {
    /// `"all"` (any case) and the empty string disable the filter.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            ChangelistFilter::All
        } else {
            ChangelistFilter::Changelist(s.to_string())
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            ChangelistFilter::All => true,
            ChangelistFilter::Changelist(token) => name.contains(token.as_str()),
        }
    }
}

impl fmt::Display for ChangelistFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangelistFilter::All => f.write_str("all"),
            ChangelistFilter::Changelist(token) => f.write_str(token),
        }
    }
}

/// Which files count as captures.
///
/// The extension only applies when a directory is expanded; files named
/// explicitly are checked against the name filters alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureFilter {
    /// Required extension without the dot, compared exactly. Empty accepts
    /// any file.
    pub extension: String,
    /// Substring the file name must contain. Empty matches everything.
    pub filename: String,
    pub changelist: ChangelistFilter,
}

impl CaptureFilter {
    /// Files ending in `.<extension>`, with no name filters.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..Self::default()
        }
    }

    /// Require `filter` in the file name. `"all"` (any case) means no filter.
    pub fn with_filename(mut self, filter: &str) -> Self {
        self.filename = if filter.eq_ignore_ascii_case("all") {
            String::new()
        } else {
            filter.to_string()
        };
        self
    }

    pub fn with_changelist(mut self, changelist: ChangelistFilter) -> Self {
        self.changelist = changelist;
        self
    }

    /// Filename and changelist filters.
    pub fn matches_name(&self, name: &str) -> bool {
        name.contains(self.filename.as_str()) && self.changelist.matches(name)
    }

    /// Extension plus name filters, for files found by walking a directory.
    pub fn matches_path(&self, path: &Path) -> bool {
        let extension_ok = self.extension.is_empty()
            || path
                .extension()
                .is_some_and(|ext| ext == self.extension.as_str());
        extension_ok
            && path
                .file_name()
                .is_some_and(|name| self.matches_name(&name.to_string_lossy()))
    }
}

/// Recursively find capture files below `start` that pass `filter`.
/// The result is sorted by path.
pub fn locate<P: AsRef<Path>>(start: P, filter: &CaptureFilter) -> Result<Vec<PathBuf>> {
    let start = start.as_ref();
    let mut found = Vec::new();
    for entry in WalkDir::new(start) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && filter.matches_path(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!(
        dir = %start.display(),
        extension = %filter.extension,
        filter = %filter.filename,
        changelist = %filter.changelist,
        files = found.len(),
        "located capture files"
    );
    Ok(found)
}

/// Expand command-line inputs into a list of capture files.
///
/// Entries may hold comma-separated lists. A leading `All` token is the
/// legacy "All <Directory>" form and is dropped. Directories are expanded
/// with [`locate`]; plain files are kept in the order given when their
/// name passes the filename and changelist filters.
pub fn resolve_inputs<S: AsRef<str>>(inputs: &[S], filter: &CaptureFilter) -> Result<Vec<PathBuf>> {
    let mut items: Vec<&str> = inputs
        .iter()
        .flat_map(|s| s.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if items.len() > 1 && items[0].eq_ignore_ascii_case("all") {
        items.remove(0);
    }

    let mut files = Vec::new();
    for item in items {
        let path = Path::new(item);
        if path.is_dir() {
            files.extend(locate(path, filter)?);
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if filter.matches_name(&name) {
            files.push(path.to_path_buf());
        } else {
            debug!(file = item, "input does not match the filters, skipping");
        }
    }
    Ok(files)
}
