//! OAuth2 クライアントアサーション（JWT）の生成。
//!
//! 発行時刻・一意な ID・発行者・主体・オーディエンス 1 件からなるクレームを秘密鍵で署名する。
//! アサーションは生成直後に 1 回だけ使用されるため、有効期限クレームは付与しない。

use std::fmt;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::nid::Nid;
use openssl::pkey::Id;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::SigningError;
use crate::keystore::PrivateKey;

/// AssertionClaims はクライアントアサーションのクレームを表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// 発行者。
    pub iss: String,
    /// 主体（クライアント ID）。
    pub sub: String,
    /// オーディエンス。常に 1 要素の配列としてシリアライズされる。
    pub aud: Vec<String>,
    /// アサーションごとに一意な ID（UUID v4）。
    pub jti: String,
    /// 発行時刻（Unix タイムスタンプ）。
    pub iat: i64,
}

/// Assertion は署名済みのクライアントアサーション。
///
/// Debug 出力ではコンパクト形式を伏せる。
#[derive(Clone)]
pub struct Assertion {
    claims: AssertionClaims,
    algorithm: Algorithm,
    compact: String,
}

impl Assertion {
    pub fn claims(&self) -> &AssertionClaims {
        &self.claims
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// コンパクトシリアライズ形式（`header.payload.signature`）を返す。
    pub fn as_str(&self) -> &str {
        &self.compact
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("claims", &self.claims)
            .field("algorithm", &self.algorithm)
            .field("compact", &"[REDACTED]")
            .finish()
    }
}

/// AssertionSigner はクライアントアサーションを生成する。
#[derive(Debug, Default, Clone, Copy)]
pub struct AssertionSigner;

impl AssertionSigner {
    pub fn new() -> Self {
        Self
    }

    /// 発行者・オーディエンス・主体からアサーションを生成し、秘密鍵で署名する。
    pub fn sign(
        &self,
        issuer: &str,
        audience: &str,
        subject: &str,
        private_key: &PrivateKey,
    ) -> Result<Assertion, SigningError> {
        for (name, value) in [("issuer", issuer), ("audience", audience), ("subject", subject)] {
            if value.trim().is_empty() {
                return Err(SigningError::InvalidArgument(format!("{name} が空です")));
            }
        }

        let (algorithm, key) = encoding_key(private_key)?;

        let claims = AssertionClaims {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: vec![audience.to_string()],
            jti: uuid::Uuid::new_v4().to_string(),
            iat: chrono::Utc::now().timestamp(),
        };

        let compact = encode(&Header::new(algorithm), &claims, &key).map_err(|e| {
            error!(error = %e, "アサーションの署名に失敗しました");
            SigningError::Sign(e.to_string())
        })?;

        debug!(
            iss = %claims.iss,
            sub = %claims.sub,
            aud = %audience,
            jti = %claims.jti,
            algorithm = ?algorithm,
            "クライアントアサーションを生成しました"
        );

        Ok(Assertion {
            claims,
            algorithm,
            compact,
        })
    }
}

/// 鍵種別から署名アルゴリズムを選び、jsonwebtoken の署名鍵に変換する。
fn encoding_key(private_key: &PrivateKey) -> Result<(Algorithm, EncodingKey), SigningError> {
    let pkey = private_key.as_pkey();
    let unsupported = SigningError::UnsupportedKey;

    let algorithm = match pkey.id() {
        Id::RSA => Algorithm::RS256,
        Id::EC => {
            let curve = pkey
                .ec_key()
                .map_err(|e| unsupported(e.to_string()))?
                .group()
                .curve_name();
            match curve {
                Some(Nid::X9_62_PRIME256V1) => Algorithm::ES256,
                Some(Nid::SECP384R1) => Algorithm::ES384,
                other => return Err(unsupported(format!("EC 曲線 {other:?}"))),
            }
        }
        Id::ED25519 => Algorithm::EdDSA,
        other => return Err(unsupported(format!("鍵種別 {other:?}"))),
    };

    let pem = pkey
        .private_key_to_pem_pkcs8()
        .map_err(|e| unsupported(e.to_string()))?;

    let key = match algorithm {
        Algorithm::RS256 => EncodingKey::from_rsa_pem(&pem),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(&pem),
        _ => EncodingKey::from_ec_pem(&pem),
    }
    .map_err(|e| unsupported(e.to_string()))?;

    Ok((algorithm, key))
}
