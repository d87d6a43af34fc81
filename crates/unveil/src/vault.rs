//! Vault - Encrypted credential store
//!
//! A vault is a directory of profiles. Each profile keeps an age X25519
//! identity sealed with the master password; everything else in the profile
//! is encrypted to that identity:
//!
//! ```text
//! <vault>/<profile>/identity.age        identity, passphrase-encrypted
//! <vault>/<profile>/items.age           overview: titles, categories, tags
//! <vault>/<profile>/details/<id>.age    one detail document per record
//! ```
//!
//! Details are decrypted on demand, so listing titles never touches secret
//! field values.

use age::secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Top-level field type that marks a secret
pub const PASSWORD_TYPE: &str = "password";

/// Section field kind that marks a secret
pub const CONCEALED_KIND: &str = "concealed";

const IDENTITY_FILE: &str = "identity.age";
const ITEMS_FILE: &str = "items.age";
const DETAILS_DIR: &str = "details";

/// Vault-specific errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Vault not found: {0}")]
    NotFound(PathBuf),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Invalid profile name: {0}")]
    InvalidProfile(String),

    #[error("Profile is locked - unlock it first")]
    Locked,

    #[error("Unlock failed: wrong password or corrupt identity")]
    Unlock,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Malformed vault data: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One field of a record detail.
///
/// Top-level fields and section fields share this type. Whether the value is
/// a secret is decided once, when the raw document is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Display title, only present on section fields
    pub title: Option<String>,
    /// Classifier as stored in the vault (e.g. "text", "password", "concealed")
    pub kind: String,
    pub value: String,
    pub sensitive: bool,
}

impl Field {
    /// A top-level field, classified by its type
    pub fn top_level(name: &str, field_type: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            kind: field_type.to_string(),
            value: value.to_string(),
            sensitive: field_type == PASSWORD_TYPE,
        }
    }

    /// A section field, classified by its kind
    pub fn in_section(name: &str, title: &str, kind: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            title: Some(title.to_string()),
            kind: kind.to_string(),
            value: value.to_string(),
            sensitive: kind == CONCEALED_KIND,
        }
    }
}

/// A named group of fields inside a detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub title: String,
    pub fields: Vec<Field>,
}

/// Structured content of a record. Order is preserved as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detail {
    pub fields: Vec<Field>,
    pub sections: Vec<Section>,
}

impl Detail {
    /// Number of secret fields, top-level and sectioned
    pub fn sensitive_count(&self) -> usize {
        self.fields.iter().filter(|f| f.sensitive).count()
            + self
                .sections
                .iter()
                .flat_map(|s| s.fields.iter())
                .filter(|f| f.sensitive)
                .count()
    }
}

enum DetailRef {
    Sealed {
        path: PathBuf,
        identity: Arc<age::x25519::Identity>,
    },
    Loaded(Detail),
}

impl fmt::Debug for DetailRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sealed { path, .. } => f.debug_struct("Sealed").field("path", path).finish(),
            Self::Loaded(_) => f.write_str("Loaded"),
        }
    }
}

/// A credential entry
#[derive(Debug)]
pub struct Record {
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    detail: DetailRef,
}

impl Record {
    /// Build a record whose detail is already in memory
    pub fn new(title: &str, category: &str, tags: &[&str], detail: Detail) -> Self {
        Self {
            title: title.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            detail: DetailRef::Loaded(detail),
        }
    }

    /// Fetch the record detail, decrypting it if it is still sealed
    pub fn detail(&self) -> Result<Detail, VaultError> {
        match &self.detail {
            DetailRef::Loaded(detail) => Ok(detail.clone()),
            DetailRef::Sealed { path, identity } => {
                let plain = decrypt_with_identity(&fs::read(path)?, identity)?;
                let raw: RawDetail = serde_json::from_slice(&plain)?;
                Ok(raw.into())
            }
        }
    }
}

/// An opened vault directory
#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    /// Open a vault at `path`
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        if !path.is_dir() {
            return Err(VaultError::NotFound(path.to_path_buf()));
        }
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Look up a profile by name. The profile starts locked.
    pub fn profile(&self, name: &str) -> Result<Profile, VaultError> {
        validate_profile_name(name)?;

        let dir = self.root.join(name);
        if !dir.join(IDENTITY_FILE).exists() {
            return Err(VaultError::ProfileNotFound(name.to_string()));
        }

        Ok(Profile {
            name: name.to_string(),
            dir,
            identity: None,
        })
    }

    /// Names of all profiles in the vault, sorted
    pub fn profiles(&self) -> Result<Vec<String>, VaultError> {
        let mut names = vec![];
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(IDENTITY_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A named collection of records inside a vault
pub struct Profile {
    pub name: String,
    dir: PathBuf,
    identity: Option<Arc<age::x25519::Identity>>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

impl Profile {
    /// Decrypt the profile identity with the master password
    pub fn unlock(&mut self, password: &SecretString) -> Result<(), VaultError> {
        let sealed = fs::read(self.dir.join(IDENTITY_FILE))?;

        let decryptor = match age::Decryptor::new(&sealed[..])
            .map_err(|e| VaultError::Decryption(e.to_string()))?
        {
            age::Decryptor::Passphrase(d) => d,
            _ => {
                return Err(VaultError::Decryption(
                    "Identity is not passphrase-encrypted".to_string(),
                ))
            }
        };

        let mut plain = vec![];
        decryptor
            .decrypt(password, None)
            .map_err(|_| VaultError::Unlock)?
            .read_to_end(&mut plain)
            .map_err(|_| VaultError::Unlock)?;

        let identity = String::from_utf8(plain)
            .map_err(|_| VaultError::Unlock)?
            .trim()
            .parse::<age::x25519::Identity>()
            .map_err(|_| VaultError::Unlock)?;

        self.identity = Some(Arc::new(identity));
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.identity.is_some()
    }

    /// All records in stored order. Details stay sealed until requested.
    pub fn items(&self) -> Result<Vec<Record>, VaultError> {
        let identity = self.identity.as_ref().ok_or(VaultError::Locked)?;

        let plain = decrypt_with_identity(&fs::read(self.dir.join(ITEMS_FILE))?, identity)?;
        let overview: Overview = serde_json::from_slice(&plain)?;

        Ok(overview
            .items
            .into_iter()
            .map(|item| Record {
                detail: DetailRef::Sealed {
                    path: self.dir.join(DETAILS_DIR).join(format!("{}.age", item.id)),
                    identity: Arc::clone(identity),
                },
                title: item.title,
                category: item.category,
                tags: item.tags,
            })
            .collect())
    }
}

/// Write a profile into `vault`, replacing any existing one with that name.
///
/// Every record must be readable (see [`Record::detail`]); records are stored
/// in the order given.
pub fn seal_profile(
    vault: &Path,
    name: &str,
    password: &SecretString,
    records: &[Record],
) -> Result<(), VaultError> {
    validate_profile_name(name)?;

    let dir = vault.join(name);
    let details_dir = dir.join(DETAILS_DIR);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&details_dir)?;
    fs::set_permissions(&dir, Permissions::from_mode(0o700))?;
    fs::set_permissions(&details_dir, Permissions::from_mode(0o700))?;

    let identity = age::x25519::Identity::generate();
    let recipient = identity.to_public();

    let encryptor = age::Encryptor::with_user_passphrase(Secret::new(password.expose_secret().clone()));
    let sealed_identity = encrypt(encryptor, identity.to_string().expose_secret().as_bytes())?;
    write_private(&dir.join(IDENTITY_FILE), &sealed_identity)?;

    let mut overview = Overview { items: vec![] };
    for (index, record) in records.iter().enumerate() {
        let id = format!("item-{:04}", index);
        let raw = RawDetail::from(record.detail()?);
        let sealed = encrypt_to(&recipient, &serde_json::to_vec(&raw)?)?;
        write_private(&details_dir.join(format!("{}.age", id)), &sealed)?;

        overview.items.push(OverviewItem {
            id,
            title: record.title.clone(),
            category: record.category.clone(),
            tags: record.tags.clone(),
        });
    }

    let sealed = encrypt_to(&recipient, &serde_json::to_vec(&overview)?)?;
    write_private(&dir.join(ITEMS_FILE), &sealed)?;

    Ok(())
}

fn validate_profile_name(name: &str) -> Result<(), VaultError> {
    if name.is_empty() || name.contains("..") || name.contains('/') {
        return Err(VaultError::InvalidProfile(name.to_string()));
    }
    Ok(())
}

fn write_private(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    fs::set_permissions(path, Permissions::from_mode(0o600))?;
    Ok(())
}

fn encrypt_to(recipient: &age::x25519::Recipient, plain: &[u8]) -> Result<Vec<u8>, VaultError> {
    let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient.clone())])
        .ok_or_else(|| VaultError::Encryption("No recipients".to_string()))?;
    encrypt(encryptor, plain)
}

fn encrypt(encryptor: age::Encryptor, plain: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut encrypted = vec![];
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    writer
        .write_all(plain)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    writer
        .finish()
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    Ok(encrypted)
}

fn decrypt_with_identity(
    encrypted: &[u8],
    identity: &age::x25519::Identity,
) -> Result<Vec<u8>, VaultError> {
    let decryptor = match age::Decryptor::new(encrypted)
        .map_err(|e| VaultError::Decryption(e.to_string()))?
    {
        age::Decryptor::Recipients(d) => d,
        _ => {
            return Err(VaultError::Decryption(
                "Unexpected passphrase encryption".to_string(),
            ))
        }
    };

    let mut decrypted = vec![];
    decryptor
        .decrypt(std::iter::once(identity as &dyn age::Identity))
        .map_err(|e| VaultError::Decryption(e.to_string()))?
        .read_to_end(&mut decrypted)
        .map_err(|e| VaultError::Decryption(e.to_string()))?;

    Ok(decrypted)
}

// On-disk documents. The two classifier fields (`type` on top-level fields,
// `kind` on section fields) only exist here.

#[derive(Serialize, Deserialize)]
struct Overview {
    items: Vec<OverviewItem>,
}

#[derive(Serialize, Deserialize)]
struct OverviewItem {
    id: String,
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct RawDetail {
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Serialize, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    value: String,
}

#[derive(Serialize, Deserialize)]
struct RawSection {
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    fields: Vec<RawSectionField>,
}

#[derive(Serialize, Deserialize)]
struct RawSectionField {
    name: String,
    #[serde(default)]
    title: String,
    kind: String,
    #[serde(default)]
    value: String,
}

impl From<RawDetail> for Detail {
    fn from(raw: RawDetail) -> Self {
        Self {
            fields: raw
                .fields
                .iter()
                .map(|f| Field::top_level(&f.name, &f.field_type, &f.value))
                .collect(),
            sections: raw
                .sections
                .into_iter()
                .map(|s| Section {
                    fields: s
                        .fields
                        .iter()
                        .map(|f| Field::in_section(&f.name, &f.title, &f.kind, &f.value))
                        .collect(),
                    name: s.name,
                    title: s.title,
                })
                .collect(),
        }
    }
}

impl From<Detail> for RawDetail {
    fn from(detail: Detail) -> Self {
        Self {
            fields: detail
                .fields
                .into_iter()
                .map(|f| RawField {
                    name: f.name,
                    field_type: f.kind,
                    value: f.value,
                })
                .collect(),
            sections: detail
                .sections
                .into_iter()
                .map(|s| RawSection {
                    name: s.name,
                    title: s.title,
                    fields: s
                        .fields
                        .into_iter()
                        .map(|f| RawSectionField {
                            name: f.name,
                            title: f.title.unwrap_or_default(),
                            kind: f.kind,
                            value: f.value,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
