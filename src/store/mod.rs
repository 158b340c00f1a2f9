//! Content-addressed store for blobs and manifests (spec component B).
//!
//! Layout rooted at `<repo_dir>/v2/`:
//! ```text
//! <repo_dir>/v2/<image>/blobs/<digest-fn>
//! <repo_dir>/v2/<image>/manifests/<tag>/<digest-fn>
//! <repo_dir>/v2/<image>/uploads/<uuid>
//! ```
//! Ported from `pkg/repo/repo.go`, with manifest PUT and `CleanupImage`
//! serialized per-image via [`locks::ImageLocks`] (spec.md §5/§9).

pub mod locks;

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::fsutil;
use crate::wildcard;
use locks::ImageLocks;

pub const MANIFEST_MIME: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const GZIP_LAYER_MIME: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Replaces the first `:` in a digest with `-`, producing a filesystem-safe
/// name. Unambiguous because a digest's hex half never contains `:` or `-`.
pub fn digest2fn(digest: &str) -> String {
    digest.replacen(':', "-", 1)
}

/// Inverse of [`digest2fn`]: replaces the first `-` with `:`.
pub fn fn2digest(filename: &str) -> String {
    filename.replacen('-', ":", 1)
}

pub struct ExistsInfo {
    pub length: u64,
    pub http_date: String,
}

pub struct ManifestInfo {
    pub length: u64,
    pub http_date: String,
    pub digest: String,
}

#[derive(Debug, Serialize)]
pub struct Table {
    pub fields: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Default, Serialize)]
pub struct Tables {
    pub tables: Vec<Table>,
}

pub struct ContentStore {
    root: PathBuf,
    locks: ImageLocks,
}

impl ContentStore {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        ContentStore {
            root: repo_dir.into().join("v2"),
            locks: ImageLocks::new(),
        }
    }

    fn image_dir(&self, image: &str) -> PathBuf {
        self.root.join(image)
    }

    fn blobs_dir(&self, image: &str) -> PathBuf {
        self.image_dir(image).join("blobs")
    }

    fn blob_path(&self, image: &str, digest: &str) -> PathBuf {
        self.blobs_dir(image).join(digest2fn(digest))
    }

    fn manifests_dir(&self, image: &str) -> PathBuf {
        self.image_dir(image).join("manifests")
    }

    fn manifest_tag_dir(&self, image: &str, tag: &str) -> PathBuf {
        self.manifests_dir(image).join(tag)
    }

    fn uploads_dir(&self, image: &str) -> PathBuf {
        self.image_dir(image).join("uploads")
    }

    fn upload_path(&self, image: &str, uuid: &str) -> PathBuf {
        self.uploads_dir(image).join(uuid)
    }

    // ---- Upload state machine --------------------------------------------

    /// Begins an upload session: generates a uuid. No file is created until
    /// the first PATCH or the terminal PUT writes one.
    pub fn begin_upload(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Appends `body` to the upload file for `(image, uuid)`, creating it on
    /// first write. Returns the new total length.
    pub async fn append_upload(
        &self,
        image: &str,
        uuid: &str,
        body: &[u8],
    ) -> Result<u64, RegistryError> {
        use tokio::io::AsyncWriteExt;

        let path = self.upload_path(image, uuid);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if let Err(e) = file.write_all(body).await {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        drop(file);
        Ok(fsutil::file_size(&path).await?)
    }

    /// Verifies the upload file for `(image, uuid)` digests to `expected`,
    /// then renames it into `blobs/`. On mismatch or IO failure the upload
    /// file is deleted. Returns the committed length.
    pub async fn commit_blob(
        &self,
        image: &str,
        uuid: &str,
        expected_digest: &str,
    ) -> Result<u64, RegistryError> {
        let _guard = self.locks.read(image).await;

        let upload_path = self.upload_path(image, uuid);
        let actual = fsutil::digest_from_file(&upload_path).await?;
        if actual != expected_digest {
            let _ = tokio::fs::remove_file(&upload_path).await;
            return Err(RegistryError::DigestMismatch {
                expected: expected_digest.to_string(),
                got: actual,
            });
        }

        let length = fsutil::file_size(&upload_path).await?;
        let dst = self.blob_path(image, expected_digest);
        fsutil::rename_or_delete(&upload_path, &dst).await?;
        Ok(length)
    }

    pub async fn exists_blob(&self, image: &str, digest: &str) -> Option<ExistsInfo> {
        let _guard = self.locks.read(image).await;
        let path = self.blob_path(image, digest);
        let length = fsutil::file_size(&path).await.ok()?;
        let http_date = fsutil::modified_http_date(&path).await.ok()?;
        Some(ExistsInfo { length, http_date })
    }

    pub async fn blob_is_gzip(&self, image: &str, digest: &str) -> std::io::Result<bool> {
        let _guard = self.locks.read(image).await;
        fsutil::is_gzip(&self.blob_path(image, digest)).await
    }

    pub async fn read_blob(&self, image: &str, digest: &str) -> std::io::Result<Vec<u8>> {
        let _guard = self.locks.read(image).await;
        tokio::fs::read(self.blob_path(image, digest)).await
    }

    // ---- Manifests ---------------------------------------------------------

    /// Writes `body` as the sole manifest under `manifests/<tag>/`, replacing
    /// whatever was there before, then runs `CleanupImage`. Returns the new
    /// manifest's digest and mtime.
    pub async fn put_manifest(
        &self,
        image: &str,
        tag: &str,
        body: &[u8],
    ) -> Result<(String, String), RegistryError> {
        let _guard = self.locks.write(image).await;

        let digest = fsutil::digest_from_bytes(body);
        let tag_dir = self.manifest_tag_dir(image, tag);
        let _ = tokio::fs::remove_dir_all(&tag_dir).await;

        let manifest_path = tag_dir.join(digest2fn(&digest));
        fsutil::write_bytes(&manifest_path, body).await?;
        let http_date = fsutil::modified_http_date(&manifest_path).await?;

        self.cleanup_image_locked(image).await;

        Ok((digest, http_date))
    }

    /// Resolves `<digest-or-tag>` to a manifest file: if it looks like a
    /// digest (contains `:`), DFS-search `manifests/` for its filename form;
    /// otherwise treat it as a tag and take the sole file under its
    /// directory.
    async fn resolve_manifest_path(&self, image: &str, digest_or_tag: &str) -> Option<PathBuf> {
        if digest_or_tag.contains(':') {
            let fname = digest2fn(digest_or_tag);
            fsutil::find_file(&self.manifests_dir(image), &fname).await
        } else {
            let tag_dir = self.manifest_tag_dir(image, digest_or_tag);
            fsutil::list_dir_files(&tag_dir).await.ok()?.into_iter().next()
        }
    }

    pub async fn exists_manifest(
        &self,
        image: &str,
        digest_or_tag: &str,
    ) -> Option<ManifestInfo> {
        let _guard = self.locks.read(image).await;
        let path = self.resolve_manifest_path(image, digest_or_tag).await?;
        let length = fsutil::file_size(&path).await.ok()?;
        let http_date = fsutil::modified_http_date(&path).await.ok()?;
        let digest = fn2digest(path.file_name()?.to_str()?);
        Some(ManifestInfo {
            length,
            http_date,
            digest,
        })
    }

    pub async fn read_manifest(
        &self,
        image: &str,
        digest_or_tag: &str,
    ) -> std::io::Result<Vec<u8>> {
        let _guard = self.locks.read(image).await;
        match self.resolve_manifest_path(image, digest_or_tag).await {
            Some(path) => tokio::fs::read(path).await,
            None => Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        }
    }

    async fn load_manifest_json(&self, image: &str, tag: &str) -> Option<Value> {
        let tag_dir = self.manifest_tag_dir(image, tag);
        let file = fsutil::list_dir_files(&tag_dir).await.ok()?.into_iter().next()?;
        let bytes = tokio::fs::read(&file).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn manifest_layer_digests(manifest: &Value) -> Vec<String> {
        manifest
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|l| l.get("digest").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn manifest_config_digest(manifest: &Value) -> Option<String> {
        manifest
            .get("config")
            .and_then(|c| c.get("digest"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    // ---- Cleanup / GC --------------------------------------------------

    /// Acquires the per-image write lock and runs `cleanup_image_locked`.
    /// Exposed for callers outside a manifest PUT (admin delete, `Cleanup`).
    pub async fn cleanup_image(&self, image: &str) {
        let _guard = self.locks.write(image).await;
        self.cleanup_image_locked(image).await;
    }

    /// Assumes the caller already holds the per-image write lock.
    async fn cleanup_image_locked(&self, image: &str) {
        let tags = match fsutil::list_dir_names(&self.manifests_dir(image)).await {
            Ok(t) => t,
            Err(_) => return,
        };

        let mut live = std::collections::HashSet::new();
        for tag in &tags {
            let Some(manifest) = self.load_manifest_json(image, tag).await else {
                tracing::error!(image, tag, "manifest unreadable or not valid JSON; skipping");
                continue;
            };
            let Some(config_digest) = Self::manifest_config_digest(&manifest) else {
                tracing::error!(image, tag, "manifest missing config.digest; skipping tag");
                continue;
            };
            live.insert(config_digest);
            live.extend(Self::manifest_layer_digests(&manifest));
        }

        if let Ok(blobs) = fsutil::list_dir_files(&self.blobs_dir(image)).await {
            for blob in blobs {
                let Some(fname) = blob.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let digest = fn2digest(fname);
                if !live.contains(&digest) {
                    if let Err(e) = tokio::fs::remove_file(&blob).await {
                        tracing::error!(image, error = %e, "failed to remove orphan blob");
                    }
                }
            }
        }

        if tags.is_empty() {
            let _ = tokio::fs::remove_dir_all(self.image_dir(image)).await;
        }
    }

    pub async fn cleanup_all(&self) {
        for image in self.list_images().await.unwrap_or_default() {
            self.cleanup_image(&image).await;
        }
    }

    // ---- Enumeration -----------------------------------------------------

    pub async fn list_images(&self) -> std::io::Result<Vec<String>> {
        fsutil::list_dir_names(&self.root).await
    }

    pub async fn list_tags(&self, image: &str) -> std::io::Result<Vec<String>> {
        fsutil::list_dir_names(&self.manifests_dir(image)).await
    }

    /// `List(img_pattern, tag_pattern)` — spec.md §4.B.
    pub async fn list(&self, img_pattern: &str, tag_pattern: &str) -> std::io::Result<Tables> {
        if tag_pattern.is_empty() {
            self.list_images_table(img_pattern).await
        } else {
            self.list_layers_tables(img_pattern, tag_pattern).await
        }
    }

    async fn list_images_table(&self, img_pattern: &str) -> std::io::Result<Tables> {
        let images = self.list_images().await?;
        let mut rows = Vec::new();
        for image in images {
            if !wildcard::matches(&image, img_pattern) {
                continue;
            }
            let tags = self.list_tags(&image).await.unwrap_or_default();
            let blobs = fsutil::list_dir_files(&self.blobs_dir(&image)).await?;
            let mut total_bytes = 0u64;
            for blob in &blobs {
                total_bytes += fsutil::file_size(blob).await?;
            }
            rows.push(vec![
                image,
                tags.len().to_string(),
                blobs.len().to_string(),
                fsutil::bytes_to_iec(total_bytes),
            ]);
        }
        let tables = if rows.is_empty() {
            vec![]
        } else {
            vec![Table {
                fields: vec!["Image", "Tags", "Blobs", "Size"],
                rows,
            }]
        };
        Ok(Tables { tables })
    }

    async fn list_layers_tables(
        &self,
        img_pattern: &str,
        tag_pattern: &str,
    ) -> std::io::Result<Tables> {
        let images = self.list_images().await?;
        let mut tables = Vec::new();
        for image in images {
            if !wildcard::matches(&image, img_pattern) {
                continue;
            }
            for tag in self.list_tags(&image).await.unwrap_or_default() {
                if !wildcard::matches(&tag, tag_pattern) {
                    continue;
                }
                let Some(manifest) = self.load_manifest_json(&image, &tag).await else {
                    continue;
                };
                let mut rows = Vec::new();
                for digest in Self::manifest_layer_digests(&manifest) {
                    let path = self.blob_path(&image, &digest);
                    let size = fsutil::file_size(&path).await.unwrap_or(0);
                    rows.push(vec![
                        image.clone(),
                        tag.clone(),
                        digest,
                        fsutil::bytes_to_iec(size),
                    ]);
                }
                tables.push(Table {
                    fields: vec!["Image", "Tag", "Layer", "Size"],
                    rows,
                });
            }
        }
        Ok(Tables { tables })
    }

    /// `Delete(img_pattern, tag_pattern, dry_run)` — spec.md §4.B. An empty
    /// `tag_pattern` defaults to `*`.
    pub async fn delete(
        &self,
        img_pattern: &str,
        tag_pattern: &str,
        dry_run: bool,
    ) -> std::io::Result<Tables> {
        let tag_pattern = if tag_pattern.is_empty() { "*" } else { tag_pattern };
        let images = self.list_images().await?;
        let mut rows = Vec::new();
        let mut affected = std::collections::HashSet::new();

        for image in images {
            if !wildcard::matches(&image, img_pattern) {
                continue;
            }
            for tag in self.list_tags(&image).await.unwrap_or_default() {
                if !wildcard::matches(&tag, tag_pattern) {
                    continue;
                }

                affected.insert(image.clone());
                let status = if dry_run {
                    "NO".to_string()
                } else {
                    match tokio::fs::remove_dir_all(self.manifest_tag_dir(&image, &tag)).await {
                        Ok(()) => "YES".to_string(),
                        Err(e) => format!("NO, ERROR: {e}"),
                    }
                };
                rows.push(vec![image.clone(), tag.clone(), status]);
            }
        }

        if !dry_run {
            for image in &affected {
                self.cleanup_image(image).await;
            }
        }

        let tables = if rows.is_empty() {
            vec![]
        } else {
            vec![Table {
                fields: vec!["Image", "Tag", "Deleted"],
                rows,
            }]
        };
        Ok(Tables { tables })
    }
}

/// Parses the admin CLI's free-form `<img>[:<tag>]` argument per spec.md
/// §4.F's normalization table.
pub fn parse_image_and_tag(arg: &str, default_tag_for_empty: &str) -> (String, String) {
    if arg.is_empty() {
        return ("*".to_string(), default_tag_for_empty.to_string());
    }
    match arg.split_once(':') {
        Some((img, tag)) => {
            let img = if img.is_empty() { "*" } else { img };
            let tag = if tag.is_empty() { "*" } else { tag };
            (img.to_string(), tag.to_string())
        }
        None => (arg.to_string(), String::new()),
    }
}
