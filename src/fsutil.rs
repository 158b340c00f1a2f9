//! Filesystem primitives shared by the content store (spec component A).
//!
//! These mirror `pkg/filesys/filesys.go` in the original implementation:
//! atomic-ish write/rename with delete-on-failure cleanup, streaming digests,
//! and the handful of stat-based helpers the store needs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest as _, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Opens `path` for exclusive write, creating parent directories first.
pub async fn create_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    File::create(path).await
}

/// Closes `file`; on close failure, unlinks `path` so no partial file lingers.
pub async fn close_or_delete(mut file: File, path: &Path) -> std::io::Result<()> {
    let result = file.flush().await;
    drop(file);
    if result.is_err() {
        let _ = fs::remove_file(path).await;
    }
    result
}

/// Writes `data` to `dst`, unlinking `dst` on any failure. Returns bytes written.
pub async fn write_bytes(dst: &Path, data: &[u8]) -> std::io::Result<u64> {
    let mut file = create_file(dst).await?;
    if let Err(e) = file.write_all(data).await {
        drop(file);
        let _ = fs::remove_file(dst).await;
        return Err(e);
    }
    close_or_delete(file, dst).await?;
    Ok(data.len() as u64)
}

/// Renames `src` to `dst`, creating `dst`'s parent directory first. On any
/// failure, both `src` and `dst` are unlinked so no half-state remains.
pub async fn rename_or_delete(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            let _ = fs::remove_file(src).await;
            return Err(e);
        }
    }
    if let Err(e) = fs::rename(src, dst).await {
        let _ = fs::remove_file(src).await;
        let _ = fs::remove_file(dst).await;
        return Err(e);
    }
    Ok(())
}

/// Streams `path` through SHA-256, returning `"sha256:" + hex`.
pub async fn digest_from_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Digests an in-memory buffer the same way.
pub fn digest_from_bytes(buf: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(buf);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Reads the first three bytes of `path` and checks them against the gzip
/// magic number `1F 8B 08`.
pub async fn is_gzip(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path).await?;
    let mut magic = [0u8; 3];
    match file.read_exact(&mut magic).await {
        Ok(()) => Ok(magic == [0x1F, 0x8B, 0x08]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns `path`'s mtime formatted per RFC 7231 IMF-fixdate, in GMT.
///
/// e.g. `"Tue, 29 Nov 2022 14:56:29 GMT"`.
pub async fn modified_http_date(path: &Path) -> std::io::Result<String> {
    let metadata = fs::metadata(path).await?;
    let modified = metadata.modified()?;
    let dt: DateTime<Utc> = modified.into();
    Ok(dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

pub async fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(fs::metadata(path).await?.len())
}

/// Depth-first search under `dir` for the first entry whose basename equals
/// `name`. Returns `None` if not found (including when `dir` doesn't exist).
pub async fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(e) => e,
            Err(_) => continue,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(name) {
                return Some(path);
            }
            if let Ok(ft) = entry.file_type().await {
                if ft.is_dir() {
                    stack.push(path);
                }
            }
        }
    }
    None
}

/// Lists the immediate entries of `dir` by filename, or an empty vec if `dir`
/// doesn't exist.
pub async fn list_dir_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Lists full paths of regular files directly under `dir`.
pub async fn list_dir_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if let Ok(ft) = entry.file_type().await {
            if ft.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}

/// Formats a byte count as IEC units: `"N B"`, `"X.Y KiB"`, ... `"... EiB"`.
pub fn bytes_to_iec(n: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", value, UNITS[unit_index])
}
