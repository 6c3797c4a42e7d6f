// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

/// Derive the on-disk filename for a download from the last URL path
/// segment.
pub fn filename_for(url: &Url) -> &str {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
}

/// Download `url_str` into `dest_dir`, keeping the original filename.
/// Idempotent: an already-present file is reused without touching the
/// network. Returns the full path of the file.
pub fn cached_download(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("parsing url {}", url_str))?;
    let dest_path = dest_dir.as_ref().join(filename_for(&url));

    if dest_path.is_file() {
        debug!(path = %dest_path.display(), "already downloaded, skipping fetch");
        return Ok(dest_path);
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!(%url, "downloading");
    let bytes = client
        .get(url.as_str())
        .send()
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", url))?
        .bytes()?;
    fs::write(&dest_path, &bytes)
        .with_context(|| format!("writing {}", dest_path.display()))?;

    Ok(dest_path)
}

/// Expand a ZIP archive next to itself (`foo.zip` → `foo/`), returning the
/// extraction directory. Entries are written relative to that directory.
pub fn extract_archive(archive_path: impl AsRef<Path>) -> Result<PathBuf> {
    let archive_path = archive_path.as_ref();
    let out_dir = archive_path.with_extension("");
    fs::create_dir_all(&out_dir)?;

    let file = File::open(archive_path)
        .with_context(|| format!("opening archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("reading archive {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => continue,
        };
        let dest = out_dir.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)
            .with_context(|| format!("creating {}", dest.display()))?;
        io::copy(&mut entry, &mut out)?;
    }

    debug!(archive = %archive_path.display(), out = %out_dir.display(), "extracted");
    Ok(out_dir)
}

/// Read a whole archive entry into a string, lossily decoding non-UTF8.
pub fn read_entry_text(archive_path: impl AsRef<Path>, entry_name: &str) -> Result<String> {
    let file = File::open(archive_path.as_ref())?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive
        .by_name(entry_name)
        .with_context(|| format!("archive entry {} not found", entry_name))?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}
