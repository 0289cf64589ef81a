use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::engine::EngineLoader;
use crate::model::{Backend, ModelHandle, ModelSpec};
use verba_foundation::cancel::CancellationToken;
use verba_foundation::error::{DownloadError, ModelError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Verifies, downloads, and loads models in the cache directory.
///
/// Primary downloads are cooperatively cancellable (the byte loop checks
/// the token each read) and leave the partial file behind for resume.
/// Faster downloads are not cancellable once started; a failed snapshot is
/// deleted whole.
pub struct ModelManager {
    cache_root: PathBuf,
}

impl ModelManager {
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn spec(&self, key: &str, backend: Backend) -> Result<ModelSpec, ModelError> {
        ModelSpec::resolve(key, backend, &self.cache_root)
    }

    pub fn verify(&self, spec: &ModelSpec) -> bool {
        match spec.backend {
            Backend::Primary => {
                let Some(expected) = spec.digest.as_deref() else {
                    return false;
                };
                match sha256_file(&spec.path) {
                    Ok(actual) => actual == expected,
                    Err(_) => false,
                }
            }
            Backend::Faster => snapshot_complete(&spec.path),
        }
    }

    /// Download the model, reporting progress at most every 500 ms.
    /// Returns the final on-disk path.
    pub fn download(
        &self,
        spec: &ModelSpec,
        on_progress: &mut dyn FnMut(DownloadProgress),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        match spec.backend {
            Backend::Primary => self.download_primary(spec, on_progress, cancel),
            Backend::Faster => self.download_faster(spec, on_progress),
        }
    }

    fn download_primary(
        &self,
        spec: &ModelSpec,
        on_progress: &mut dyn FnMut(DownloadProgress),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let url = spec
            .download_url()
            .ok_or_else(|| DownloadError::Network("no download url for spec".into()))?;
        if let Some(parent) = spec.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let part_path = spec.path.with_extension("pt.part");

        tracing::info!("Downloading {} from {}", spec.key, url);
        let client = http_client()?;
        let mut response = client
            .get(&url)
            .send()
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let total = response.content_length();

        let mut file = fs::File::create(&part_path)?;
        let mut downloaded = 0u64;
        let mut buf = vec![0u8; READ_CHUNK];
        let mut last_report = Instant::now() - PROGRESS_INTERVAL;

        loop {
            if cancel.is_cancelled() {
                // Partial file stays on disk for resume, but is never
                // reported as verified.
                tracing::info!("Download of {} cancelled at {} bytes", spec.key, downloaded);
                file.flush()?;
                return Err(DownloadError::Cancelled);
            }
            let n = response
                .read(&mut buf)
                .map_err(|e| DownloadError::Network(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            downloaded += n as u64;
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                on_progress(DownloadProgress { downloaded, total });
                last_report = Instant::now();
            }
        }

        file.flush()?;
        drop(file);
        on_progress(DownloadProgress { downloaded, total });
        fs::rename(&part_path, &spec.path)?;
        tracing::info!("Downloaded {} ({} bytes)", spec.key, downloaded);
        Ok(spec.path.clone())
    }

    fn download_faster(
        &self,
        spec: &ModelSpec,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&spec.path)?;
        let marker = spec.path.join(".incomplete");
        fs::File::create(&marker)?;

        let client = http_client()?;
        let result = (|| -> Result<(), DownloadError> {
            let mut downloaded = 0u64;
            for file_name in spec.faster_files() {
                let url = spec
                    .faster_file_url(file_name)
                    .ok_or_else(|| DownloadError::Network("no repo id for spec".into()))?;
                tracing::debug!("Fetching {}", url);
                let mut response = client
                    .get(&url)
                    .send()
                    .map_err(|e| DownloadError::Network(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(DownloadError::HttpStatus {
                        status: response.status().as_u16(),
                        url,
                    });
                }
                let mut file = fs::File::create(spec.path.join(file_name))?;
                let mut buf = vec![0u8; READ_CHUNK];
                loop {
                    let n = response
                        .read(&mut buf)
                        .map_err(|e| DownloadError::Network(e.to_string()))?;
                    if n == 0 {
                        break;
                    }
                    file.write_all(&buf[..n])?;
                    downloaded += n as u64;
                }
                file.flush()?;
                on_progress(DownloadProgress {
                    downloaded,
                    total: None,
                });
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                fs::remove_file(&marker)?;
                Ok(spec.path.clone())
            }
            Err(e) => {
                // A broken snapshot is useless; remove it whole.
                let _ = fs::remove_dir_all(&spec.path);
                Err(e)
            }
        }
    }

    /// Verify then hand the spec to the backend loader.
    pub fn load(
        &self,
        spec: &ModelSpec,
        loader: &dyn EngineLoader,
    ) -> Result<ModelHandle, ModelError> {
        if !self.verify(spec) {
            return Err(ModelError::NotDownloaded {
                key: spec.key.clone(),
            });
        }
        let engine = loader.load(spec)?;
        Ok(ModelHandle::new(spec.clone(), engine))
    }
}

fn http_client() -> Result<reqwest::blocking::Client, DownloadError> {
    reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| DownloadError::Network(e.to_string()))
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A faster-backend snapshot is complete when the directory is non-empty
/// and carries no `.lock` or `.incomplete` markers anywhere inside.
fn snapshot_complete(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let mut any_file = false;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            any_file = true;
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".lock") || name.ends_with(".incomplete") || name == ".incomplete"
                {
                    return false;
                }
            }
        }
    }
    any_file
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Backend;

    #[test]
    fn verify_missing_primary_file_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        let spec = manager.spec("tiny", Backend::Primary).unwrap();
        assert!(!manager.verify(&spec));
    }

    #[test]
    fn verify_primary_digest_mismatch_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        let spec = manager.spec("tiny", Backend::Primary).unwrap();
        fs::create_dir_all(spec.path.parent().unwrap()).unwrap();
        fs::write(&spec.path, b"not a checkpoint").unwrap();
        assert!(!manager.verify(&spec));
    }

    #[test]
    fn snapshot_with_lock_marker_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        let spec = manager.spec("tiny", Backend::Faster).unwrap();

        fs::create_dir_all(&spec.path).unwrap();
        assert!(!manager.verify(&spec), "empty snapshot must fail");

        fs::write(spec.path.join("model.bin"), b"weights").unwrap();
        assert!(manager.verify(&spec));

        fs::write(spec.path.join("model.bin.lock"), b"").unwrap();
        assert!(!manager.verify(&spec));
    }

    #[test]
    fn snapshot_with_incomplete_marker_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        let spec = manager.spec("base", Backend::Faster).unwrap();

        fs::create_dir_all(&spec.path).unwrap();
        fs::write(spec.path.join("config.json"), b"{}").unwrap();
        fs::write(spec.path.join(".incomplete"), b"").unwrap();
        assert!(!manager.verify(&spec));

        fs::remove_file(spec.path.join(".incomplete")).unwrap();
        assert!(manager.verify(&spec));
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn load_unverified_model_fails() {
        struct NeverLoader;
        impl EngineLoader for NeverLoader {
            fn load(
                &self,
                _spec: &ModelSpec,
            ) -> Result<Box<dyn crate::engine::SttEngine>, verba_foundation::error::ModelError>
            {
                panic!("loader must not be reached for unverified models");
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        let spec = manager.spec("tiny", Backend::Primary).unwrap();
        assert!(matches!(
            manager.load(&spec, &NeverLoader),
            Err(verba_foundation::error::ModelError::NotDownloaded { .. })
        ));
    }
}
