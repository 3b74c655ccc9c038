//! The `.archon/secrets` encrypted-at-rest store backing the `secrets_get`/
//! `secrets_list` host calls. Serialized via a mutex; the lock is never held
//! across a plugin call, only across the read/decrypt/re-encrypt/write of
//! the file itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use archon_core::{codes, ArchonError};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretDescriptor {
    pub name: String,
    pub redacted: bool,
    pub value: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct SecretsFile(BTreeMap<String, String>);

/// Policy knob controlling whether `secrets_get` ever returns plaintext.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretsPolicy {
    pub return_values: bool,
}

/// A project's encrypted secret set. The symmetric key lives in a sibling
/// file (`<path>.key`) rather than the secrets file itself, so a copy of
/// just the secrets file (e.g. picked up by a backup) is not self-decrypting.
pub struct SecretsStore {
    path: PathBuf,
    key_path: PathBuf,
    policy: SecretsPolicy,
    state: Mutex<()>,
}

impl SecretsStore {
    pub fn open(path: impl Into<PathBuf>, policy: SecretsPolicy) -> Result<Self, ArchonError> {
        let path = path.into();
        let key_path = sibling_key_path(&path);
        let store = Self { path, key_path, policy, state: Mutex::new(()) };
        store.ensure_key()?;
        Ok(store)
    }

    fn ensure_key(&self) -> Result<(), ArchonError> {
        if self.key_path.exists() {
            return Ok(());
        }
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        archon_layout::atomic_write(&self.key_path, &key)
    }

    fn load_key(&self) -> Result<Key, ArchonError> {
        let bytes = std::fs::read(&self.key_path).map_err(|e| ArchonError::io("read secrets key", &e))?;
        if bytes.len() != KEY_LEN {
            return Err(ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, "secrets key file is corrupt"));
        }
        Ok(*Key::from_slice(&bytes))
    }

    fn load(&self) -> Result<SecretsFile, ArchonError> {
        let Ok(raw) = std::fs::read(&self.path) else {
            return Ok(SecretsFile::default());
        };
        if raw.len() < NONCE_LEN {
            return Err(ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, "secrets file is corrupt"));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(&self.load_key()?);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, "failed to decrypt secrets file"))?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, format!("corrupt secrets file: {e}")))
    }

    fn save(&self, file: &SecretsFile) -> Result<(), ArchonError> {
        let plaintext = serde_json::to_vec(file)
            .map_err(|e| ArchonError::new(codes::IO_WRITE_FAILED, format!("failed to serialize secrets: {e}")))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let cipher = ChaCha20Poly1305::new(&self.load_key()?);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| ArchonError::new(codes::IO_WRITE_FAILED, "failed to encrypt secrets file"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        archon_layout::atomic_write(&self.path, &blob)
    }

    /// Sets (or replaces) a secret's plaintext value. Not gated here by
    /// plugin permission; that happens one layer up, in `HostApi`.
    pub fn put(&self, name: &str, value: &str) -> Result<(), ArchonError> {
        let _guard = self.state.lock().unwrap();
        let mut file = self.load()?;
        file.0.insert(name.to_string(), value.to_string());
        self.save(&file)
    }

    pub fn remove(&self, name: &str) -> Result<(), ArchonError> {
        let _guard = self.state.lock().unwrap();
        let mut file = self.load()?;
        file.0.remove(name);
        self.save(&file)
    }

    /// Returns a descriptor for `name`. When the policy's `returnValues` is
    /// false, the value is withheld and `redacted` is set — a default-closed
    /// posture.
    pub fn get(&self, name: &str) -> Result<SecretDescriptor, ArchonError> {
        let _guard = self.state.lock().unwrap();
        let file = self.load()?;
        let Some(value) = file.0.get(name) else {
            return Err(ArchonError::not_found(format!("secret {name:?}")));
        };
        Ok(if self.policy.return_values {
            SecretDescriptor { name: name.to_string(), redacted: false, value: Some(value.clone()) }
        } else {
            SecretDescriptor { name: name.to_string(), redacted: true, value: None }
        })
    }

    /// Lists secret names with the given prefix. Unaffected by the
    /// `returnValues` policy (names, not values, are returned).
    pub fn list(&self, prefix: &str) -> Result<Vec<String>, ArchonError> {
        let _guard = self.state.lock().unwrap();
        let file = self.load()?;
        Ok(file.0.keys().filter(|name| name.starts_with(prefix)).cloned().collect())
    }
}

fn sibling_key_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".key");
    PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn put_then_get_round_trips_with_return_values_enabled() {
        let dir = tempdir().unwrap();
        let store = SecretsStore::open(dir.path().join("secrets"), SecretsPolicy { return_values: true }).unwrap();
        store.put("deploy.token", "s3kret").unwrap();
        let descriptor = store.get("deploy.token").unwrap();
        assert!(!descriptor.redacted);
        assert_eq!(descriptor.value.as_deref(), Some("s3kret"));
    }

    #[test]
    fn get_is_redacted_by_default() {
        let dir = tempdir().unwrap();
        let store = SecretsStore::open(dir.path().join("secrets"), SecretsPolicy::default()).unwrap();
        store.put("deploy.token", "s3kret").unwrap();
        let descriptor = store.get("deploy.token").unwrap();
        assert!(descriptor.redacted);
        assert!(descriptor.value.is_none());
    }

    #[test]
    fn list_is_unaffected_by_return_values_policy() {
        let dir = tempdir().unwrap();
        let store = SecretsStore::open(dir.path().join("secrets"), SecretsPolicy::default()).unwrap();
        store.put("deploy.prod", "a").unwrap();
        store.put("deploy.staging", "b").unwrap();
        store.put("other.prod", "c").unwrap();
        let mut names = store.list("deploy.").unwrap();
        names.sort();
        assert_eq!(names, vec!["deploy.prod".to_string(), "deploy.staging".to_string()]);
    }

    #[test]
    fn the_secrets_file_on_disk_is_not_plaintext() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets");
        let store = SecretsStore::open(&path, SecretsPolicy::default()).unwrap();
        store.put("deploy.token", "s3kret-plaintext-marker").unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert!(!raw.windows(b"s3kret-plaintext-marker".len()).any(|w| w == b"s3kret-plaintext-marker"));
    }
}
