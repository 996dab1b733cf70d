//! Discovery of the files the builder wrote to its output directory.
//!
//! The builder writes a single JSON manifest to the root of the output directory and places every
//! artifact in a subdirectory named after the artifact kind, e.g. `qcow2/disk.qcow2`.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const MANIFEST_EXTENSION: &str = ".json";

/// Subdirectory names the builder uses that differ from the public type names.
const TYPE_RENAMES: &[(&str, &str)] = &[
    ("bootiso", "anaconda-iso"),
    ("vpc", "vhd"),
    ("image", "raw"),
];

/// Maps a builder output subdirectory name to its public artifact type name.
pub fn normalize_type(name: &str) -> &str {
    TYPE_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map_or(name, |&(_, to)| to)
}

/// A file system entry below the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub relative_path: PathBuf,
    pub is_file: bool,
    pub parent_name: Option<String>,
}

/// An artifact whose checksum has not been computed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredArtifact {
    pub kind: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub output_directory: PathBuf,
    pub manifest_path: PathBuf,
    /// In walk order, which is sorted by file name at every level.
    pub artifacts: Vec<DiscoveredArtifact>,
}

/// Lists every entry below `root`, sorted by file name at every level.
pub fn discover(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(Error::discovery_walk)?;
        let relative_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| {
                Error::discovery(format!(
                    "walked outside of the output directory: {:?}",
                    entry.path()
                ))
            })?
            .to_owned();
        let parent_name = relative_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        files.push(DiscoveredFile {
            relative_path,
            is_file: entry.file_type().is_file(),
            parent_name,
        });
    }
    Ok(files)
}

fn is_manifest(file: &DiscoveredFile) -> bool {
    file.is_file
        && file
            .relative_path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(MANIFEST_EXTENSION))
}

/// Locates the manifest and every artifact below `output_directory`.
///
/// Fails when the directory can not be read, when there is not exactly one manifest, or when a
/// file sits directly in the output directory so its type can not be told from its path.
pub fn collect(output_directory: &Path) -> Result<Collection> {
    let root = std::fs::canonicalize(output_directory)
        .map_err(|error| Error::discovery_io(output_directory.to_owned(), error))?;

    let files = discover(&root)?;

    let mut manifests = files.iter().filter(|file| is_manifest(file));
    let manifest = manifests.next().ok_or_else(|| {
        Error::discovery(format!(
            "no manifest file ending in {MANIFEST_EXTENSION:?} found in {root:?}"
        ))
    })?;
    if let Some(other) = manifests.next() {
        return Err(Error::discovery(format!(
            "found more than one manifest in {root:?}: {:?} and {:?}",
            manifest.relative_path, other.relative_path
        )));
    }
    let manifest_path = root.join(&manifest.relative_path);
    debug!("manifest: {manifest_path:?}");

    let mut artifacts = Vec::new();
    for file in &files {
        if !file.is_file || std::ptr::eq(file, manifest) {
            continue;
        }
        let Some(parent_name) = file.parent_name.as_deref() else {
            return Err(Error::discovery(format!(
                "can not determine the artifact type of {:?}, it is not inside a type directory",
                root.join(&file.relative_path)
            )));
        };
        let kind = normalize_type(parent_name);
        if kind != parent_name {
            debug!("normalized artifact type {parent_name:?} to {kind:?}");
        }
        artifacts.push(DiscoveredArtifact {
            kind: kind.to_owned(),
            path: root.join(&file.relative_path),
        });
    }

    if artifacts.is_empty() {
        warn!("The builder did not produce any artifacts in {root:?}");
    }

    Ok(Collection {
        output_directory: root,
        manifest_path,
        artifacts,
    })
}
