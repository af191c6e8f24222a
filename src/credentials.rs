//! Account lookup and at-rest encryption of mailbox passwords.
//!
//! Passwords are stored as `base64(nonce || ciphertext)` under AES-256-GCM.
//! The key is the SHA-256 digest of the server secret, so every process
//! sharing that secret can decrypt what another stored.

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// AES-GCM nonce length in bytes.
const NONCE_SIZE: usize = 12;

/// Identity of a mail account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account and its encrypted password.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// Account identity.
    pub id: AccountId,
    /// Mailbox address.
    pub email: String,
    /// Password as produced by [`SecretCipher::encrypt`].
    pub encrypted_secret: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("encrypted_secret", &"[REDACTED]")
            .finish()
    }
}

/// Source of accounts and their plaintext passwords.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Looks up an account.
    ///
    /// Fails with [`Error::AccountNotFound`] when no account has this id.
    async fn get(&self, id: AccountId) -> Result<Account>;

    /// Recovers the plaintext password of `account`.
    ///
    /// Fails with a [`Credential`](crate::ErrorCategory::Credential) error if
    /// the stored value was not produced under the current key.
    fn decrypt(&self, account: &Account) -> Result<SecretString>;
}

/// AES-256-GCM keyed by a server secret.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Derives the key from `server_secret`.
    #[must_use]
    pub fn new(server_secret: &SecretString) -> Self {
        let key = Sha256::digest(server_secret.expose_secret().as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &SecretString) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.expose_secret().as_bytes())
            .map_err(|e| Error::Credential {
                message: format!("encryption failed: {e}"),
            })?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] for malformed input, a wrong key, or
    /// tampered data.
    pub fn decrypt(&self, encrypted: &str) -> Result<SecretString> {
        let combined = BASE64.decode(encrypted).map_err(|e| Error::Credential {
            message: format!("invalid base64 encoding: {e}"),
        })?;

        if combined.len() <= NONCE_SIZE {
            return Err(Error::Credential {
                message: format!("encrypted value too short: {} bytes", combined.len()),
            });
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Credential {
                message: "decryption failed (wrong key or corrupted data)".to_string(),
            })?;

        let plaintext = String::from_utf8(plaintext).map_err(|e| Error::Credential {
            message: format!("decrypted value is not UTF-8: {e}"),
        })?;

        Ok(SecretString::from(plaintext))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// In-process credential store.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    cipher: SecretCipher,
    accounts: RwLock<HashMap<AccountId, Account>>,
    next_id: AtomicU64,
}

impl MemoryCredentialStore {
    /// Creates an empty store whose passwords are keyed by `server_secret`.
    #[must_use]
    pub fn new(server_secret: &SecretString) -> Self {
        Self {
            cipher: SecretCipher::new(server_secret),
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a mailbox, encrypting its password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmailFormat`] if `email` is not a valid address.
    #[instrument(name = "MemoryCredentialStore::register", skip_all, fields(email = %email))]
    pub async fn register(&self, email: &str, password: &SecretString) -> Result<AccountId> {
        if !email_address::EmailAddress::is_valid(email) {
            return Err(Error::InvalidEmailFormat {
                email: email.to_string(),
            });
        }

        let account = Account {
            id: AccountId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            email: email.to_string(),
            encrypted_secret: self.cipher.encrypt(password)?,
        };
        let id = account.id;

        self.accounts.write().await.insert(id, account);
        debug!(account_id = %id, "Account registered");

        Ok(id)
    }

    /// Inserts an account as-is, keeping its id and stored secret.
    pub async fn insert(&self, account: Account) {
        self.next_id
            .fetch_max(account.id.0.saturating_add(1), Ordering::Relaxed);
        self.accounts.write().await.insert(account.id, account);
    }

    /// Removes an account; returns whether it existed.
    pub async fn remove(&self, id: AccountId) -> bool {
        self.accounts.write().await.remove(&id).is_some()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::AccountNotFound { account_id: id.0 })
    }

    fn decrypt(&self, account: &Account) -> Result<SecretString> {
        self.cipher.decrypt(&account.encrypted_secret)
    }
}
