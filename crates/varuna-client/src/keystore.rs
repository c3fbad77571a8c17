//! キーストア・トラストストアの読み込みと秘密鍵の取り出し。
//!
//! ストアは PKCS#12 形式のみをサポートする。読み込んだストアは不透明なハンドル
//! (`KeyStore`) として呼び出し元が排他的に所有し、実行中は変更されない。
//!
//! 秘密鍵エントリが複数あるストアでは、鍵バッグのフレンドリ名と証明書の
//! エイリアスを突き合わせてエントリを判別する。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use openssl::pkcs12::{ParsedPkcs12_2, Pkcs12};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::X509;
use tracing::{debug, error, info};

use crate::error::KeyMaterialError;
use crate::safebag::{self, KeyBag};

/// ストア種別のデフォルト値。
pub const DEFAULT_STORE_TYPE: &str = "PKCS12";

/// StoreType はサポートするストア形式を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Pkcs12,
}

impl FromStr for StoreType {
    type Err = KeyMaterialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PKCS12" | "PKCS#12" | "P12" => Ok(Self::Pkcs12),
            other => Err(KeyMaterialError::UnsupportedStoreType(other.to_string())),
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pkcs12 => f.write_str(DEFAULT_STORE_TYPE),
        }
    }
}

/// EntryKind はストア内エントリの種類を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// 秘密鍵と証明書の組。
    PrivateKey,
    /// 信頼済み証明書または証明書チェーンの中間証明書。
    TrustedCertificate,
}

/// ストア内の 1 エントリ。
#[derive(Clone)]
pub struct StoreEntry {
    alias: Option<String>,
    kind: EntryKind,
    certificate: X509,
}

impl StoreEntry {
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }
}

impl fmt::Debug for StoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreEntry")
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// KeyStore は読み込み済みストアの不透明なハンドル。
///
/// 読み込み時にパスワードで復号できることを検証済み。証明書エントリは保持するが、
/// 秘密鍵は保持せず、取り出すたびに鍵パスワードで復号する。
pub struct KeyStore {
    path: PathBuf,
    store_type: StoreType,
    der: Vec<u8>,
    entries: Vec<StoreEntry>,
    key_bags: Vec<KeyBag>,
}

impl KeyStore {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    pub fn entries(&self) -> &[StoreEntry] {
        &self.entries
    }

    /// ストア内の全証明書を返す（鍵エントリの証明書を含む）。
    pub fn certificates(&self) -> impl Iterator<Item = &X509> {
        self.entries.iter().map(StoreEntry::certificate)
    }

    /// エイリアスでエントリを検索する。
    pub fn entry(&self, alias: &str) -> Option<&StoreEntry> {
        self.entries.iter().find(|e| e.alias() == Some(alias))
    }

    /// 指定パスワードでストアを復号する。
    pub(crate) fn open(&self, password: &str) -> Result<ParsedPkcs12_2, KeyMaterialError> {
        open_pkcs12(&self.path, &self.der, password)
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("path", &self.path)
            .field("store_type", &self.store_type)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

/// PrivateKey はストアから取り出した署名用秘密鍵。
pub struct PrivateKey {
    alias: String,
    key: PKey<Private>,
}

impl PrivateKey {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn as_pkey(&self) -> &PKeyRef<Private> {
        &self.key
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("alias", &self.alias)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// KeyMaterial は 1 回の実行で使用するキーストア・トラストストア・秘密鍵の組。
#[derive(Debug)]
pub struct KeyMaterial {
    key_store: KeyStore,
    trust_store: KeyStore,
    private_key: PrivateKey,
}

impl KeyMaterial {
    pub fn new(key_store: KeyStore, trust_store: KeyStore, private_key: PrivateKey) -> Self {
        Self {
            key_store,
            trust_store,
            private_key,
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    pub fn trust_store(&self) -> &KeyStore {
        &self.trust_store
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

/// KeyMaterialLoader はディスク上のストアを読み込み、秘密鍵を取り出す。
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyMaterialLoader;

impl KeyMaterialLoader {
    pub fn new() -> Self {
        Self
    }

    /// ストアファイルを読み込み、パスワードで復号できることを確認してハンドルを返す。
    pub fn load_store(
        &self,
        path: impl AsRef<Path>,
        password: &str,
        store_type: &str,
    ) -> Result<KeyStore, KeyMaterialError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(KeyMaterialError::InvalidArgument(
                "ストアのパスが空です".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(KeyMaterialError::InvalidArgument(format!(
                "ストアのパスワードが空です: {}",
                path.display()
            )));
        }
        let store_type = if store_type.trim().is_empty() {
            StoreType::Pkcs12
        } else {
            store_type.parse()?
        };

        debug!(path = %path.display(), store_type = %store_type, "ストアを読み込みます");

        let der = std::fs::read(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "ストアファイルの読み込みに失敗しました");
            KeyMaterialError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        let parsed = open_pkcs12(path, &der, password)?;
        let key_bags = safebag::key_bags(&der).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "鍵バッグを列挙できないため先頭の鍵のみ扱います");
            Vec::new()
        });
        let entries = collect_entries(parsed, &key_bags);

        info!(
            path = %path.display(),
            entries = entries.len(),
            "ストアを読み込みました"
        );

        Ok(KeyStore {
            path: path.to_path_buf(),
            store_type,
            der,
            entries,
            key_bags,
        })
    }

    /// エイリアスで秘密鍵エントリを検索し、鍵パスワードで復号して返す。
    pub fn extract_key(
        &self,
        store: &KeyStore,
        alias: &str,
        password: &str,
    ) -> Result<PrivateKey, KeyMaterialError> {
        if alias.trim().is_empty() {
            return Err(KeyMaterialError::InvalidArgument(
                "秘密鍵のエイリアスが空です".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(KeyMaterialError::InvalidArgument(format!(
                "秘密鍵 '{alias}' のパスワードが空です"
            )));
        }

        let entry = store.entry(alias).ok_or_else(|| {
            error!(alias = %alias, path = %store.path.display(), "エイリアスが見つかりません");
            KeyMaterialError::AliasNotFound {
                alias: alias.to_string(),
                path: store.path.clone(),
            }
        })?;

        if entry.kind() != EntryKind::PrivateKey {
            return Err(KeyMaterialError::NotAPrivateKey {
                alias: alias.to_string(),
                path: store.path.clone(),
            });
        }

        let key = match store.key_bags.iter().find(|bag| bag.alias() == Some(alias)) {
            Some(bag) => bag.decrypt(password).map_err(|e| {
                error!(alias = %alias, path = %store.path.display(), error = %e, "秘密鍵の復号に失敗しました");
                KeyMaterialError::Unreadable {
                    path: store.path.clone(),
                    reason: e.to_string(),
                }
            })?,
            // フレンドリ名のない鍵は OpenSSL が返す先頭の鍵として扱う
            None => store
                .open(password)?
                .pkey
                .ok_or_else(|| KeyMaterialError::NotAPrivateKey {
                    alias: alias.to_string(),
                    path: store.path.clone(),
                })?,
        };

        debug!(alias = %alias, key_type = ?key.id(), "秘密鍵を取り出しました");

        Ok(PrivateKey {
            alias: alias.to_string(),
            key,
        })
    }
}

fn open_pkcs12(path: &Path, der: &[u8], password: &str) -> Result<ParsedPkcs12_2, KeyMaterialError> {
    let unreadable = |e: openssl::error::ErrorStack| {
        error!(path = %path.display(), error = %e, "PKCS#12 ストアの解析に失敗しました");
        KeyMaterialError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    };

    Pkcs12::from_der(der)
        .map_err(unreadable)?
        .parse2(password)
        .map_err(unreadable)
}

fn alias_of(cert: &X509) -> Option<String> {
    cert.alias()
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .filter(|a| !a.is_empty())
}

fn collect_entries(parsed: ParsedPkcs12_2, key_bags: &[KeyBag]) -> Vec<StoreEntry> {
    let has_key_bag = |alias: Option<&str>| {
        alias.is_some_and(|alias| key_bags.iter().any(|bag| bag.alias() == Some(alias)))
    };
    let mut entries = Vec::new();

    if let Some(cert) = parsed.cert {
        let kind = if parsed.pkey.is_some() {
            EntryKind::PrivateKey
        } else {
            EntryKind::TrustedCertificate
        };
        entries.push(StoreEntry {
            alias: alias_of(&cert),
            kind,
            certificate: cert,
        });
    }

    if let Some(ca) = parsed.ca {
        for cert in ca {
            let alias = alias_of(&cert);
            let kind = if has_key_bag(alias.as_deref()) {
                EntryKind::PrivateKey
            } else {
                EntryKind::TrustedCertificate
            };
            entries.push(StoreEntry {
                alias,
                kind,
                certificate: cert,
            });
        }
    }

    entries
}
