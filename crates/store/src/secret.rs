//! Secret box: AES-256-GCM for strings that must not sit on disk in the
//! clear (journal content, the SMTP password).
//!
//! The key is generated once and written to a mode-0600 file. Ciphertext is
//! `"ENC:" + base64(nonce ‖ ciphertext)`; anything without the prefix passes
//! through `decrypt` untouched, which also covers rows written before the
//! box was first initialized. A failed bootstrap degrades to identity.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use tracing::{info, warn};

pub const ENC_PREFIX: &str = "ENC:";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub struct SecretBox {
    cipher: Option<Aes256Gcm>,
    key_path: PathBuf,
}

impl SecretBox {
    /// Load the key at `key_path`, generating one if absent. Any failure
    /// leaves the box in degraded (identity) mode rather than failing
    /// startup.
    pub fn init(key_path: impl AsRef<Path>) -> Self {
        let key_path = key_path.as_ref().to_path_buf();
        match load_or_create_key(&key_path) {
            Ok(key) => {
                let cipher = Aes256Gcm::new_from_slice(&key).ok();
                if cipher.is_some() {
                    info!(path = %key_path.display(), "secret box ready");
                }
                Self { cipher, key_path }
            }
            Err(err) => {
                warn!(?err, path = %key_path.display(), "secret box unavailable, storing plaintext");
                Self {
                    cipher: None,
                    key_path,
                }
            }
        }
    }

    /// A box with no key. Used in tests and as the degraded mode.
    pub fn disabled() -> Self {
        Self {
            cipher: None,
            key_path: PathBuf::new(),
        }
    }

    pub fn available(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Encrypt a string; identity when the box is degraded or the input is
    /// empty or already encrypted.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let Some(cipher) = &self.cipher else {
            return plaintext.to_string();
        };
        if plaintext.is_empty() || plaintext.starts_with(ENC_PREFIX) {
            return plaintext.to_string();
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        match cipher.encrypt(nonce, plaintext.as_bytes()) {
            Ok(ciphertext) => {
                let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                blob.extend_from_slice(&nonce_bytes);
                blob.extend_from_slice(&ciphertext);
                format!("{ENC_PREFIX}{}", URL_SAFE_NO_PAD.encode(blob))
            }
            Err(err) => {
                warn!(?err, "encrypt failed, storing plaintext");
                plaintext.to_string()
            }
        }
    }

    /// Decrypt a string; anything without the `ENC:` prefix is returned
    /// unchanged. Undecryptable blobs are returned as stored.
    pub fn decrypt(&self, stored: &str) -> String {
        let Some(rest) = stored.strip_prefix(ENC_PREFIX) else {
            return stored.to_string();
        };
        let Some(cipher) = &self.cipher else {
            return stored.to_string();
        };

        let Ok(blob) = URL_SAFE_NO_PAD.decode(rest) else {
            return stored.to_string();
        };
        if blob.len() < NONCE_LEN {
            return stored.to_string();
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        match cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext) {
            Ok(plain) => String::from_utf8(plain).unwrap_or_else(|_| stored.to_string()),
            Err(err) => {
                warn!(?err, "decrypt failed, returning stored value");
                stored.to_string()
            }
        }
    }
}

fn load_or_create_key(path: &Path) -> std::io::Result<Vec<u8>> {
    if path.exists() {
        let key = std::fs::read(path)?;
        if key.len() == KEY_LEN {
            return Ok(key);
        }
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "key file has wrong length",
        ));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut key = vec![0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    std::fs::write(path, &key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(key)
}
