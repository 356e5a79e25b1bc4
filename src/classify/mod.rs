//! File classification by volatility
//!
//! Walks a build output tree and assigns every regular file a volatility
//! class. Stable content (resolved dependency archives) sorts into early
//! layers that survive rebuilds; application code lands last so that an
//! edit only invalidates the final layer.

use crate::error::{StratumError, StratumResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Dependency archive extensions recognized by the dependency rule
const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "war"];

/// How frequently a file is expected to change.
///
/// Layers are ordered by volatility so that the most stable content is
/// cached longest by the image builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolatilityClass {
    /// Released dependency archive (pinned version)
    FixedDependency,
    /// Dependency archive with a snapshot or pre-release version
    SnapshotDependency,
    /// Static resource files
    Resource,
    /// Compiled application code
    ApplicationCode,
}

impl VolatilityClass {
    /// All classes in the default layering order (most stable first)
    pub fn all() -> &'static [Self] {
        &[
            Self::FixedDependency,
            Self::SnapshotDependency,
            Self::Resource,
            Self::ApplicationCode,
        ]
    }

    /// Kebab-case name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedDependency => "fixed-dependency",
            Self::SnapshotDependency => "snapshot-dependency",
            Self::Resource => "resource",
            Self::ApplicationCode => "application-code",
        }
    }
}

impl fmt::Display for VolatilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VolatilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed-dependency" => Ok(Self::FixedDependency),
            "snapshot-dependency" => Ok(Self::SnapshotDependency),
            "resource" => Ok(Self::Resource),
            "application-code" => Ok(Self::ApplicationCode),
            other => Err(format!("unknown volatility class: {}", other)),
        }
    }
}

/// A classified file from the build output tree.
///
/// Immutable once produced; the path is relative to the tree root and
/// always '/'-separated so hashes are reproducible across machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Tree-relative path, '/'-separated
    pub path: String,

    /// File size in bytes
    pub size: u64,

    /// SHA256 of the file contents (hex)
    pub content_hash: String,

    /// Assigned volatility class
    pub class: VolatilityClass,
}

/// Ordered classification rules.
///
/// Rules are applied first-match-wins: dependency location, then resource
/// location, then application location, then the unmatched default. A file
/// inside a dependency directory is a dependency even when its name also
/// looks like a resource.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    /// Top-level directories holding dependency archives
    pub dependency_dirs: Vec<String>,

    /// Top-level directories holding static resources
    pub resource_dirs: Vec<String>,

    /// Top-level directories holding compiled application code
    pub application_dirs: Vec<String>,

    /// Substrings of a version string that mark an unstable dependency
    pub snapshot_markers: Vec<String>,

    /// Class assigned to unmatched paths; `None` rejects them
    pub default_class: Option<VolatilityClass>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            dependency_dirs: vec![
                "lib".to_string(),
                "libs".to_string(),
                "dependencies".to_string(),
            ],
            resource_dirs: vec![
                "resources".to_string(),
                "res".to_string(),
                "static".to_string(),
            ],
            application_dirs: vec!["classes".to_string()],
            snapshot_markers: vec!["-SNAPSHOT".to_string()],
            default_class: Some(VolatilityClass::ApplicationCode),
        }
    }
}

impl ClassifierRules {
    /// Classify a tree-relative path.
    ///
    /// Pure function of the path string; never touches the filesystem.
    pub fn classify(&self, rel_path: &str) -> StratumResult<VolatilityClass> {
        let first = rel_path.split('/').next().unwrap_or("");
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);

        if self.dependency_dirs.iter().any(|d| d == first) || has_archive_extension(file_name) {
            return Ok(if is_snapshot_archive(file_name, &self.snapshot_markers) {
                VolatilityClass::SnapshotDependency
            } else {
                VolatilityClass::FixedDependency
            });
        }

        if self.resource_dirs.iter().any(|d| d == first) {
            return Ok(VolatilityClass::Resource);
        }

        if self.application_dirs.iter().any(|d| d == first) {
            return Ok(VolatilityClass::ApplicationCode);
        }

        self.default_class
            .ok_or_else(|| StratumError::Unclassifiable {
                path: rel_path.to_string(),
            })
    }
}

/// Check for a recognized dependency archive extension
fn has_archive_extension(file_name: &str) -> bool {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    ARCHIVE_EXTENSIONS
        .iter()
        .any(|a| ext.eq_ignore_ascii_case(a))
}

/// Detect a snapshot/unstable version in an archive file name.
///
/// Matches configured markers (case-insensitive substring of the stem)
/// first, then falls back to semver pre-release detection on the version
/// suffix (`name-1.2.3-beta.1.jar`).
fn is_snapshot_archive(file_name: &str, markers: &[String]) -> bool {
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);

    let upper = stem.to_ascii_uppercase();
    if markers
        .iter()
        .any(|m| upper.contains(&m.to_ascii_uppercase()))
    {
        return true;
    }

    if let Some(version) = version_suffix(stem) {
        if let Ok(parsed) = semver::Version::parse(version) {
            return !parsed.pre.is_empty();
        }
    }

    false
}

/// Extract the version suffix from an archive stem.
///
/// Convention: `name-1.2.3`, where the version starts at the first '-'
/// followed by an ASCII digit.
fn version_suffix(stem: &str) -> Option<&str> {
    let bytes = stem.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'-' && bytes[i + 1].is_ascii_digit() {
            return Some(&stem[i + 1..]);
        }
    }
    None
}

/// Walk a build output tree and classify every regular file.
///
/// Symlinks and special files are skipped. The result is sorted
/// lexicographically by path, so it never depends on filesystem
/// iteration order.
pub async fn scan_tree(root: &Path, rules: &ClassifierRules) -> StratumResult<Vec<FileEntry>> {
    if !root.exists() {
        return Err(StratumError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(StratumError::PathInvalid {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut pending = vec![root.to_path_buf()];
    let mut entries = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StratumError::io(format!("reading directory {}", dir.display()), e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StratumError::io(format!("reading entry in {}", dir.display()), e))?
        {
            let path = entry.path();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StratumError::io(format!("stat {}", path.display()), e))?;

            if meta.is_dir() {
                pending.push(path);
                continue;
            }
            if !meta.is_file() {
                debug!("Skipping non-regular file: {}", path.display());
                continue;
            }

            let rel = relative_path(root, &path)?;
            let class = rules.classify(&rel)?;

            let contents = tokio::fs::read(&path)
                .await
                .map_err(|e| StratumError::io(format!("reading {}", path.display()), e))?;

            entries.push(FileEntry {
                path: rel,
                size: contents.len() as u64,
                content_hash: sha256_hex(&contents),
                class,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Classified {} files under {}", entries.len(), root.display());

    Ok(entries)
}

/// Build the canonical '/'-separated relative path for a file
fn relative_path(root: &Path, path: &Path) -> StratumResult<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| StratumError::PathInvalid {
            path: path.to_path_buf(),
            reason: "outside the tree root".to_string(),
        })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| StratumError::PathInvalid {
                path: path.to_path_buf(),
                reason: "non-UTF8 path component".to_string(),
            })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// SHA256 of a byte slice as lowercase hex
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
