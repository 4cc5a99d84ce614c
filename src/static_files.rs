//! Sandboxed directory file serving for `serve_files` routes.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// A directory served over a catch-all route.
///
/// Request paths are resolved strictly inside the base directory; any parent
/// traversal is refused before the filesystem is touched.
#[derive(Clone)]
pub struct StaticDir {
    base_dir: PathBuf,
}

impl StaticDir {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let clean = url_path.trim_start_matches('/');
        if clean.contains("../")
            || clean.contains("/..")
            || clean.contains("..\\")
            || clean.contains("\\..")
        {
            return None;
        }
        let mut resolved = self.base_dir.clone();
        for comp in Path::new(clean).components() {
            match comp {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" => "text/html",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "ico" => "image/x-icon",
            _ => "application/octet-stream",
        }
    }

    /// Read the file at `url_path` relative to the base directory.
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }
}
