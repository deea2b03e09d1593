#![forbid(unsafe_code)]

//! Encrypted at-rest store for the collaborator API key.
//!
//! The vault file holds a single sealed secret (this system talks to one
//! provider); the AES-256-GCM master key lives beside it in an owner-only
//! file. Both are written atomically via tmp+rename.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use charon_kernel_contracts::provider_secrets::ProviderSecretId;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const VAULT_SCHEMA_VERSION: u8 = 1;
const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Environment override for the collaborator key; when set, the vault
/// is not consulted.
pub const COLLABORATOR_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

#[derive(Debug)]
pub enum VaultError {
    EmptySecretValue,
    SchemaMismatch { found: u8 },
    MasterKeyCorrupt,
    SealFailed,
    OpenFailed,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySecretValue => write!(f, "secret value must not be empty"),
            Self::SchemaMismatch { found } => {
                write!(f, "unsupported vault schema version {found}")
            }
            Self::MasterKeyCorrupt => write!(f, "master key file is unreadable"),
            Self::SealFailed => write!(f, "failed to seal secret"),
            Self::OpenFailed => write!(f, "failed to open sealed secret"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<std::io::Error> for VaultError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    schema_version: u8,
    secret: Option<SealedSecret>,
}

impl VaultFile {
    fn empty() -> Self {
        Self {
            schema_version: VAULT_SCHEMA_VERSION,
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedSecret {
    key_id: String,
    nonce_b64: String,
    ciphertext_b64: String,
    updated_at_unix_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ProviderVault {
    vault_path: PathBuf,
    key_path: PathBuf,
}

impl ProviderVault {
    pub fn default_local() -> Self {
        let vault_path = env::var("CHARON_PROVIDER_VAULT_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_vault_path);
        let mut key_path = vault_path.clone();
        key_path.set_extension("master.key");
        Self::for_paths(vault_path, key_path)
    }

    pub fn for_paths(vault_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            vault_path,
            key_path,
        }
    }

    /// Seals `value` under the master key and replaces the vault slot.
    pub fn set_secret(&self, id: ProviderSecretId, value: &str) -> Result<(), VaultError> {
        let plaintext = value.trim();
        if plaintext.is_empty() {
            return Err(VaultError::EmptySecretValue);
        }
        let master = self.master_key()?;
        let sealed = seal(&master, id, plaintext)?;
        self.store_file(&VaultFile {
            schema_version: VAULT_SCHEMA_VERSION,
            secret: Some(sealed),
        })
    }

    pub fn resolve_secret(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError> {
        let Some(sealed) = self.load_file()?.secret else {
            return Ok(None);
        };
        if sealed.key_id != id.as_str() {
            return Ok(None);
        }
        let master = self.master_key()?;
        let plaintext = open(&master, &sealed)?;
        if plaintext.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(plaintext))
    }

    pub fn has_secret(&self, id: ProviderSecretId) -> Result<bool, VaultError> {
        Ok(self.resolve_secret(id)?.is_some())
    }

    /// Empties the slot if it holds `id`; returns whether anything was
    /// removed.
    pub fn delete_secret(&self, id: ProviderSecretId) -> Result<bool, VaultError> {
        match self.load_file()?.secret {
            Some(sealed) if sealed.key_id == id.as_str() => {
                self.store_file(&VaultFile::empty())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Ids currently stored (zero or one), without decrypting anything.
    pub fn stored_ids(&self) -> Result<Vec<ProviderSecretId>, VaultError> {
        Ok(self
            .load_file()?
            .secret
            .and_then(|sealed| ProviderSecretId::parse(&sealed.key_id))
            .into_iter()
            .collect())
    }

    fn load_file(&self) -> Result<VaultFile, VaultError> {
        let raw = match fs::read_to_string(&self.vault_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VaultFile::empty());
            }
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(VaultFile::empty());
        }
        let file: VaultFile = serde_json::from_str(&raw)?;
        if file.schema_version != VAULT_SCHEMA_VERSION {
            return Err(VaultError::SchemaMismatch {
                found: file.schema_version,
            });
        }
        Ok(file)
    }

    fn store_file(&self, file: &VaultFile) -> Result<(), VaultError> {
        if let Some(parent) = self.vault_path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&self.vault_path, &serde_json::to_vec_pretty(file)?)
    }

    fn master_key(&self) -> Result<[u8; MASTER_KEY_LEN], VaultError> {
        match fs::read_to_string(&self.key_path) {
            Ok(encoded) => {
                let decoded = BASE64
                    .decode(encoded.trim().as_bytes())
                    .map_err(|_| VaultError::MasterKeyCorrupt)?;
                <[u8; MASTER_KEY_LEN]>::try_from(decoded.as_slice())
                    .map_err(|_| VaultError::MasterKeyCorrupt)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = self.key_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut key = [0u8; MASTER_KEY_LEN];
                OsRng.fill_bytes(&mut key);
                write_owner_only(&self.key_path, BASE64.encode(key).as_bytes())?;
                Ok(key)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Resolves the collaborator API key: environment variable first, then
/// the encrypted local vault.
pub fn resolve_collaborator_key() -> Result<Option<String>, VaultError> {
    if let Ok(value) = env::var(COLLABORATOR_KEY_ENV_VAR) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    ProviderVault::default_local().resolve_secret(ProviderSecretId::OpenRouterApiKey)
}

/// Short SHA-256 fingerprint for operator display; never reveals the
/// secret itself.
pub fn key_fingerprint_hex(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

fn seal(
    master: &[u8; MASTER_KEY_LEN],
    id: ProviderSecretId,
    plaintext: &str,
) -> Result<SealedSecret, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(master).map_err(|_| VaultError::SealFailed)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|_| VaultError::SealFailed)?;
    Ok(SealedSecret {
        key_id: id.as_str().to_string(),
        nonce_b64: BASE64.encode(nonce_bytes),
        ciphertext_b64: BASE64.encode(ciphertext),
        updated_at_unix_ms: now_unix_ms(),
    })
}

fn open(master: &[u8; MASTER_KEY_LEN], sealed: &SealedSecret) -> Result<String, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(master).map_err(|_| VaultError::OpenFailed)?;
    let nonce_raw = BASE64
        .decode(sealed.nonce_b64.as_bytes())
        .map_err(|_| VaultError::OpenFailed)?;
    if nonce_raw.len() != NONCE_LEN {
        return Err(VaultError::OpenFailed);
    }
    let ciphertext = BASE64
        .decode(sealed.ciphertext_b64.as_bytes())
        .map_err(|_| VaultError::OpenFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
        .map_err(|_| VaultError::OpenFailed)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::OpenFailed)
}

fn default_vault_path() -> PathBuf {
    let config_root = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|_| PathBuf::from("."));
    config_root.join("charon").join("provider_vault.json")
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
        .max(1)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_owner_only(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut options = fs::OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}
