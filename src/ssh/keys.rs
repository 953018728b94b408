use anyhow::{Context, Result};
use russh::keys::{Algorithm, PrivateKey};
use std::path::Path;

/// Load the Ed25519 host key, generating and persisting one on first start.
///
/// A stable key matters for a deception host: rotating it between restarts
/// makes returning scanners see a changed fingerprint and move on.
pub fn load_or_generate_host_key(path: &Path) -> Result<PrivateKey> {
    if path.exists() {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("reading host key: {}", path.display()))?;
        return russh::keys::decode_secret_key(&pem, None)
            .map_err(|e| anyhow::anyhow!("decoding host key {}: {}", path.display(), e));
    }

    let key = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
        .map_err(|e| anyhow::anyhow!("Ed25519 key generation failed: {}", e))?;
    persist_host_key(&key, path)?;
    tracing::info!(path = %path.display(), "Generated new SSH host key");
    Ok(key)
}

fn persist_host_key(key: &PrivateKey, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory: {}", parent.display()))?;
        }
    }

    let mut pem = Vec::new();
    russh::keys::encode_pkcs8_pem(key, &mut pem)
        .map_err(|e| anyhow::anyhow!("encoding host key: {}", e))?;

    // Key material is written 0600 from the start; no TOCTOU window.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut file| file.write_all(&pem))
            .with_context(|| format!("writing host key: {}", path.display()))?;
    }

    #[cfg(not(unix))]
    std::fs::write(path, &pem)
        .with_context(|| format!("writing host key: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_same_key() {
        let dir = std::env::temp_dir().join(format!("tarpot-keys-{}", std::process::id()));
        let path = dir.join("host_key");
        let _ = std::fs::remove_file(&path);

        let generated = load_or_generate_host_key(&path).unwrap();
        assert!(path.exists());
        let reloaded = load_or_generate_host_key(&path).unwrap();
        assert_eq!(
            generated.public_key().to_openssh().unwrap(),
            reloaded.public_key().to_openssh().unwrap()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = std::env::temp_dir().join(format!("tarpot-keys-perm-{}", std::process::id()));
        let path = dir.join("host_key");
        let _ = std::fs::remove_file(&path);

        load_or_generate_host_key(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
