//! 相互 TLS コンテキストの構築。
//!
//! キーストアからクライアント証明書と秘密鍵（キーマネージャー相当）を、
//! トラストストアから信頼アンカー（トラストマネージャー相当）を導出する。
//! 構築後の `TlsContext` は不変で、実行中のすべての送信で共有される。

use std::fmt;

use reqwest::{Certificate, ClientBuilder, Identity};
use tracing::{debug, error, info};

use crate::error::TlsConfigError;
use crate::keystore::KeyStore;

/// TlsContext は相互 TLS で使用するクライアント ID と信頼アンカーの組。
#[derive(Clone)]
pub struct TlsContext {
    identity: Identity,
    trust_anchors: Vec<Certificate>,
}

impl TlsContext {
    /// 信頼アンカーの件数を返す。
    pub fn trust_anchor_count(&self) -> usize {
        self.trust_anchors.len()
    }

    /// reqwest のクライアントビルダーにクライアント ID と信頼アンカーを設定する。
    ///
    /// OS の組み込みルート証明書は無効化し、トラストストアの証明書のみを信頼する。
    pub fn apply(&self, builder: ClientBuilder) -> ClientBuilder {
        let builder = builder
            .use_native_tls()
            .tls_built_in_root_certs(false)
            .identity(self.identity.clone());

        self.trust_anchors
            .iter()
            .cloned()
            .fold(builder, ClientBuilder::add_root_certificate)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("trust_anchors", &self.trust_anchors.len())
            .finish_non_exhaustive()
    }
}

/// TlsContextBuilder はキーストアとトラストストアから `TlsContext` を構築する。
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsContextBuilder;

impl TlsContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// 相互 TLS コンテキストを構築する。
    ///
    /// キーストアはパスワードで復号し、トラストストアは読み込み済みの証明書のみを使う。
    pub fn build(
        &self,
        key_store: &KeyStore,
        key_store_password: &str,
        trust_store: &KeyStore,
    ) -> Result<TlsContext, TlsConfigError> {
        if key_store_password.is_empty() {
            return Err(TlsConfigError::InvalidArgument(
                "キーストアのパスワードが空です".to_string(),
            ));
        }

        let identity = derive_identity(key_store, key_store_password)?;
        let trust_anchors = derive_trust_anchors(trust_store)?;

        info!(
            key_store = %key_store.path().display(),
            trust_store = %trust_store.path().display(),
            trust_anchors = trust_anchors.len(),
            "相互 TLS コンテキストを構築しました"
        );

        Ok(TlsContext {
            identity,
            trust_anchors,
        })
    }
}

fn derive_identity(key_store: &KeyStore, password: &str) -> Result<Identity, TlsConfigError> {
    let key_manager = |reason: String| {
        error!(path = %key_store.path().display(), reason = %reason, "キーマネージャーの導出に失敗しました");
        TlsConfigError::KeyManager(reason)
    };

    let parsed = key_store
        .open(password)
        .map_err(|e| key_manager(e.to_string()))?;

    let key = parsed
        .pkey
        .ok_or_else(|| key_manager("キーストアに秘密鍵が含まれていません".to_string()))?;
    let cert = parsed
        .cert
        .ok_or_else(|| key_manager("キーストアにクライアント証明書が含まれていません".to_string()))?;

    // クライアント証明書を先頭に、残りのチェーンを続けて PEM 連結する
    let mut chain_pem = cert.to_pem().map_err(|e| key_manager(e.to_string()))?;
    if let Some(ca) = parsed.ca {
        for intermediate in &ca {
            chain_pem.extend(intermediate.to_pem().map_err(|e| key_manager(e.to_string()))?);
        }
    }
    let key_pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| key_manager(e.to_string()))?;

    debug!(
        path = %key_store.path().display(),
        chain_bytes = chain_pem.len(),
        "クライアント ID を導出しました"
    );

    Identity::from_pkcs8_pem(&chain_pem, &key_pem).map_err(|e| key_manager(e.to_string()))
}

fn derive_trust_anchors(trust_store: &KeyStore) -> Result<Vec<Certificate>, TlsConfigError> {
    let anchors = trust_store
        .certificates()
        .map(|cert| {
            let der = cert
                .to_der()
                .map_err(|e| TlsConfigError::TrustManager(e.to_string()))?;
            Certificate::from_der(&der).map_err(|e| TlsConfigError::TrustManager(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if anchors.is_empty() {
        error!(path = %trust_store.path().display(), "トラストストアに証明書がありません");
        return Err(TlsConfigError::EmptyTrustStore);
    }

    Ok(anchors)
}
