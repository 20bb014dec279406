use std::sync::{Arc, Weak};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::emitter::callback;
use crate::error::CoreError;
use crate::events;
use crate::settings::{self, Settings};

pub const KDF_ITERATIONS: u32 = 480_000;
const KDF_SALT: &[u8] = b"e1a7a49b5bad75ec81fcb8cded4bbc0c";
const SECRET_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Symmetric protection of serialized strategy text.
pub trait Cryptograph: Send + Sync {
    /// Whether encoders should encrypt encryptable strategies.
    fn is_enabled(&self) -> Result<bool, CoreError>;

    fn encrypt(&self, plaintext: &str) -> Result<String, CoreError>;

    fn decrypt(&self, token: &str) -> Result<String, CoreError>;
}

/// Identity transforms, never enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCryptograph;

impl Cryptograph for NoCryptograph {
    fn is_enabled(&self) -> Result<bool, CoreError> {
        Ok(false)
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, token: &str) -> Result<String, CoreError> {
        Ok(token.to_string())
    }
}

/// XChaCha20-Poly1305 keyed by a PBKDF2-SHA256 derivation of the configured secret.
///
/// Tokens are `base64url(nonce || ciphertext)`. The secret is generated on first use when unset.
/// The derived key is cached in memory and in [`settings::ENCRYPTION_KEY_CACHE`], tagged with a
/// fingerprint of the secret it came from; a change of the secret drops both.
pub struct AeadCryptograph {
    settings: Arc<dyn Settings>,
    cache: Arc<Mutex<Option<[u8; 32]>>>,
}

impl AeadCryptograph {
    pub fn new(settings: Arc<dyn Settings>) -> Result<Self, CoreError> {
        let cache: Arc<Mutex<Option<[u8; 32]>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&cache);
        let weak: Weak<dyn Settings> = Arc::downgrade(&settings);
        settings.emitter().subscribe(
            events::AFTER_SETTINGS_CHANGED,
            callback(move |params| {
                if !settings::touches(params, settings::ENCRYPTION_KEY) {
                    return Ok(());
                }
                debug!("encryption secret changed, dropping derived key");
                *sink.lock() = None;
                if let Some(settings) = weak.upgrade() {
                    settings.set(&[(settings::ENCRYPTION_KEY_CACHE, "")])?;
                }
                Ok(())
            }),
            false,
        )?;
        Ok(Self { settings, cache })
    }

    fn secret(&self) -> Result<String, CoreError> {
        match self.settings.get(settings::ENCRYPTION_KEY)? {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => {
                let secret = generate_secret();
                info!("generated a new encryption secret");
                self.settings.set(&[(settings::ENCRYPTION_KEY, &secret)])?;
                Ok(secret)
            }
        }
    }

    fn key(&self) -> Result<[u8; 32], CoreError> {
        if let Some(key) = *self.cache.lock() {
            return Ok(key);
        }
        let secret = self.secret()?;
        let fingerprint = fingerprint(&secret);
        let cached = self
            .settings
            .get(settings::ENCRYPTION_KEY_CACHE)?
            .and_then(|raw| parse_cached_key(&raw, &fingerprint));
        let key = match cached {
            Some(key) => key,
            None => {
                let key = derive_key(&secret);
                let entry = format!("{fingerprint}:{}", hex::encode(key));
                self.settings.set(&[(settings::ENCRYPTION_KEY_CACHE, &entry)])?;
                key
            }
        };
        *self.cache.lock() = Some(key);
        Ok(key)
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305, CoreError> {
        let key = self.key()?;
        Ok(XChaCha20Poly1305::new(Key::from_slice(&key)))
    }
}

impl Cryptograph for AeadCryptograph {
    fn is_enabled(&self) -> Result<bool, CoreError> {
        self.settings.is_enabled(settings::ENCRYPTION_ENABLED)
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        if !self.is_enabled()? {
            return Ok(plaintext.to_string());
        }
        let cipher = self.cipher()?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CoreError::Crypto(format!("encryption failed: {e}")))?;
        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Decrypts regardless of the enabled flag: a token is only ever produced by `encrypt`.
    fn decrypt(&self, token: &str) -> Result<String, CoreError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CoreError::Crypto(format!("malformed token: {e}")))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CoreError::Crypto("token too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Crypto("cannot decrypt token, wrong key?".into()))?;
        String::from_utf8(plaintext).map_err(|e| CoreError::Crypto(format!("decrypted text is not UTF-8: {e}")))
    }
}

pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

pub fn derive_key(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    key
}

fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..8])
}

fn parse_cached_key(raw: &str, fingerprint: &str) -> Option<[u8; 32]> {
    let (fp, key_hex) = raw.split_once(':')?;
    if fp != fingerprint {
        return None;
    }
    let bytes = hex::decode(key_hex).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    fn enabled_settings(secret: &str) -> Arc<dyn Settings> {
        Arc::new(MemorySettings::with_values(&[
            (settings::ENCRYPTION_ENABLED, "True"),
            (settings::ENCRYPTION_KEY, secret),
        ]))
    }

    #[test]
    fn generated_secret_is_alphanumeric() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn encrypt_then_decrypt() {
        let crypto = AeadCryptograph::new(enabled_settings("correct horse")).unwrap();
        let token = crypto.encrypt("1, 2024-01-01 00:00:00+00:00, a@b.cc: X(\"\", \"\")").unwrap();
        assert!(!token.contains("X("));
        assert_eq!(
            crypto.decrypt(&token).unwrap(),
            "1, 2024-01-01 00:00:00+00:00, a@b.cc: X(\"\", \"\")"
        );
        // Fresh nonce per token.
        assert_ne!(crypto.encrypt("same").unwrap(), crypto.encrypt("same").unwrap());
    }

    #[test]
    fn disabled_cryptograph_is_identity_for_encrypt() {
        let settings: Arc<dyn Settings> = Arc::new(MemorySettings::new());
        let crypto = AeadCryptograph::new(settings).unwrap();
        assert!(!crypto.is_enabled().unwrap());
        assert_eq!(crypto.encrypt("plain").unwrap(), "plain");
    }

    #[test]
    fn missing_secret_is_generated_and_persisted() {
        let settings: Arc<dyn Settings> =
            Arc::new(MemorySettings::with_values(&[(settings::ENCRYPTION_ENABLED, "True")]));
        let crypto = AeadCryptograph::new(Arc::clone(&settings)).unwrap();
        crypto.encrypt("x").unwrap();
        let secret = settings.get(settings::ENCRYPTION_KEY).unwrap().unwrap();
        assert_eq!(secret.len(), SECRET_LEN);
        let cache = settings.get(settings::ENCRYPTION_KEY_CACHE).unwrap().unwrap();
        assert!(cache.starts_with(&fingerprint(&secret)));
    }

    #[test]
    fn changing_secret_invalidates_cached_key() {
        let settings = enabled_settings("first secret");
        let crypto = AeadCryptograph::new(Arc::clone(&settings)).unwrap();
        let token = crypto.encrypt("payload").unwrap();

        settings.set(&[(settings::ENCRYPTION_KEY, "second secret")]).unwrap();
        assert_eq!(settings.get(settings::ENCRYPTION_KEY_CACHE).unwrap().as_deref(), Some(""));
        assert!(matches!(crypto.decrypt(&token), Err(CoreError::Crypto(_))));
    }

    #[test]
    fn garbage_token_is_a_crypto_error() {
        let crypto = AeadCryptograph::new(enabled_settings("k")).unwrap();
        assert!(matches!(crypto.decrypt("!!!"), Err(CoreError::Crypto(_))));
        assert!(matches!(crypto.decrypt("AAAA"), Err(CoreError::Crypto(_))));
    }

    #[test]
    fn stale_cache_entry_is_ignored() {
        assert!(parse_cached_key("deadbeef:00", "cafebabe").is_none());
        let key = [7u8; 32];
        let entry = format!("abc:{}", hex::encode(key));
        assert_eq!(parse_cached_key(&entry, "abc"), Some(key));
    }
}
