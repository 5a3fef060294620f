//! Filesystem path resolution: mapping public URLs onto the local
//! asset roots they are served from.
//!
//! A resolver is built once at startup from the configured roots and
//! shared behind an `Arc`. Root directories must exist when the
//! resolver is constructed; a missing root stops the process at
//! startup, while a missing individual file is a normal not-found
//! outcome.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::domain::types::RootKind;
use crate::domain::url::clean_url;
use crate::infra::error::InfraError;

/// Directory names never descended into when listing assets.
const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", ".git"];

/// One mounted asset root: a public URL prefix and the directory that
/// backs it.
#[derive(Debug, Clone)]
pub struct RootMount {
    pub kind: RootKind,
    pub url_prefix: String,
    pub dir: PathBuf,
}

#[derive(Debug)]
pub struct PathResolver {
    mounts: Vec<RootMount>,
}

impl PathResolver {
    /// Build a resolver from the configured mounts. Every backing
    /// directory must exist; prefixes are normalized to end with a
    /// slash so prefix matching never splits a path segment.
    pub fn new(mounts: Vec<RootMount>) -> Result<Self, InfraError> {
        let mut normalized = Vec::with_capacity(mounts.len());
        for mut mount in mounts {
            if !mount.dir.is_dir() {
                return Err(InfraError::asset_root(
                    mount.dir.display().to_string(),
                    format!("{} root is not a directory", mount.kind.as_str()),
                ));
            }
            if !mount.url_prefix.ends_with('/') {
                mount.url_prefix.push('/');
            }
            normalized.push(mount);
        }
        Ok(Self { mounts: normalized })
    }

    /// Map a public URL onto a local file. Returns `None` when no
    /// mount owns the URL or the mapped file does not exist on disk.
    pub fn url_to_path(&self, url: &str) -> Option<PathBuf> {
        let base = clean_url(url)?;
        for mount in &self.mounts {
            let Some(rest) = base.strip_prefix(&mount.url_prefix) else {
                continue;
            };
            let candidate = mount.dir.join(rest.trim_start_matches('/'));
            if candidate.is_file() {
                return Some(candidate);
            }
            debug!(
                target = "infra::fs",
                url = %base,
                path = %candidate.display(),
                "mapped file missing on disk"
            );
            return None;
        }
        None
    }

    /// Recursive asset listing under a directory, filtered to an
    /// extension allow-list. Vendor subtrees are skipped and a file is
    /// suppressed when a minified sibling exists (`foo.js` dropped if
    /// `foo.min.js` is present).
    pub fn list_files(&self, dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir()
                    || entry
                        .file_name()
                        .to_str()
                        .is_none_or(|name| !SKIPPED_DIRS.contains(&name))
            })
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.contains(&ext))
            })
            .collect();

        files.retain(|path| !has_minified_sibling(path));
        files.sort();
        files
    }
}

fn has_minified_sibling(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return false;
    };
    if stem.ends_with(".min") {
        return false;
    }
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    path.with_file_name(format!("{stem}.min.{ext}")).is_file()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn mount(dir: &Path) -> RootMount {
        RootMount {
            kind: RootKind::Code,
            url_prefix: "https://site.test/static".to_string(),
            dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn maps_existing_files_and_strips_query() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("app.js"), "js").unwrap();
        let resolver = PathResolver::new(vec![mount(root.path())]).unwrap();

        let path = resolver
            .url_to_path("https://site.test/static/app.js?v=3#frag")
            .unwrap();
        assert_eq!(path, root.path().join("app.js"));
        assert!(resolver.url_to_path("https://site.test/static/gone.js").is_none());
        assert!(resolver.url_to_path("https://other.test/static/app.js").is_none());
    }

    #[test]
    fn missing_root_is_rejected_at_construction() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("absent");
        let err = PathResolver::new(vec![mount(&missing)]).unwrap_err();
        assert!(matches!(err, InfraError::AssetRoot { .. }));
    }

    #[test]
    fn listing_skips_vendor_trees_and_minified_shadows() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("app.js"), "").unwrap();
        fs::write(root.path().join("app.min.js"), "").unwrap();
        fs::write(root.path().join("site.css"), "").unwrap();
        fs::write(root.path().join("notes.txt"), "").unwrap();
        fs::create_dir(root.path().join("node_modules")).unwrap();
        fs::write(root.path().join("node_modules").join("dep.js"), "").unwrap();

        let resolver = PathResolver::new(vec![mount(root.path())]).unwrap();
        let files = resolver.list_files(root.path(), &["js", "css"]);
        assert_eq!(
            files,
            vec![
                root.path().join("app.min.js"),
                root.path().join("site.css"),
            ]
        );
    }
}
