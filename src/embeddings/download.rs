// download.rs — Model file download with SHA256 verification.
//
// Fetches the model on first load and keeps it under ~/.notetaker/models/ (or
// the configured override). Files are verified against known SHA256 hashes.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};

use crate::config;
use crate::logging::home_dir;

/// (file name, expected SHA256)
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.safetensors", config::embedding::MODEL_SAFETENSORS_SHA256),
    ("tokenizer.json", config::embedding::TOKENIZER_JSON_SHA256),
    ("config.json", config::embedding::CONFIG_JSON_SHA256),
];

/// Resolve the model directory: explicit override, then the env var, then
/// ~/.notetaker/models/all-MiniLM-L6-v2/.
pub fn model_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(v) = std::env::var(config::embedding::MODEL_DIR_ENV) {
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    let home = home_dir()
        .context("cannot determine home directory (neither HOME nor USERPROFILE is set)")?;
    Ok(home.join(config::embedding::MODEL_DIR_REL))
}

/// Check if all required model files exist in `dir`.
pub fn model_files_exist(dir: &Path) -> bool {
    MODEL_FILES.iter().all(|(name, _)| dir.join(name).exists())
}

/// Download any missing model files into `dir`.
pub fn ensure_model_files(dir: &Path) -> anyhow::Result<()> {
    if model_files_exist(dir) {
        log::info!("Model files already cached at {}", dir.display());
        return Ok(());
    }

    log::info!("Downloading embedding model to {}", dir.display());
    fs::create_dir_all(dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    let base = config::embedding::MODEL_BASE_URL;
    for (name, sha256) in MODEL_FILES {
        let dest = dir.join(name);
        if dest.exists() {
            continue;
        }
        download_and_verify(&format!("{base}/{name}"), &dest, sha256)?;
    }

    log::info!("Model download complete");
    Ok(())
}

/// Download a file from URL and verify its SHA256 hash.
fn download_and_verify(url: &str, dest: &Path, expected_sha256: &str) -> anyhow::Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    log::info!("Downloading {} from {}", filename, url);

    let resp = ureq::get(url)
        .timeout(std::time::Duration::from_secs(config::download::DOWNLOAD_TIMEOUT_SECS))
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {url}");
    }

    // Read body into memory (model is ~87 MB, fits in RAM)
    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read response body for {url}"))?;

    verify_sha256(&filename, &body, expected_sha256)?;

    // Write atomically: write to .tmp, then rename
    let tmp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(&body)?;
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;

    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn verify_sha256(filename: &str, body: &[u8], expected_sha256: &str) -> anyhow::Result<()> {
    let actual_hash = sha256_hex(body);
    if actual_hash != expected_sha256 {
        bail!(
            "SHA256 mismatch for {}: expected {}, got {}",
            filename,
            expected_sha256,
            actual_hash
        );
    }
    log::info!("SHA256 verified for {} ({})", filename, &actual_hash[..12]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_model_dir_wins() {
        let dir = model_dir(Some(Path::new("/opt/models/minilm"))).unwrap();
        assert_eq!(dir, PathBuf::from("/opt/models/minilm"));
    }

    #[test]
    fn test_model_files_exist_needs_all_three() {
        let temp = tempfile::tempdir().unwrap();
        assert!(!model_files_exist(temp.path()));

        fs::write(temp.path().join("config.json"), "{}").unwrap();
        fs::write(temp.path().join("tokenizer.json"), "{}").unwrap();
        assert!(!model_files_exist(temp.path()));

        fs::write(temp.path().join("model.safetensors"), b"weights").unwrap();
        assert!(model_files_exist(temp.path()));
    }

    #[test]
    fn test_ensure_model_files_skips_download_when_cached() {
        let temp = tempfile::tempdir().unwrap();
        for (name, _) in MODEL_FILES {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        ensure_model_files(temp.path()).unwrap();
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        let err = verify_sha256("config.json", b"tampered", config::embedding::CONFIG_JSON_SHA256).unwrap_err();
        assert!(err.to_string().contains("SHA256 mismatch for config.json"));
        assert!(verify_sha256("abc", b"abc", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad").is_ok());
    }
}
