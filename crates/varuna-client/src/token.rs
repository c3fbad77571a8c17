//! クライアントアサーションとアクセストークンの交換。
//!
//! Keycloak のトークンエンドポイントに対して、`client_credentials` グラントと
//! JWT ベアラーのクライアントアサーションでトークンを要求する。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::assertion::Assertion;
use crate::error::AuthError;
use crate::transport::{Transport, TransportRequest};

/// JWT ベアラー形式のクライアントアサーション種別。
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const ACCESS_TOKEN_KEY: &str = "access_token";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// AccessToken はトークンエンドポイントから取得したベアラートークン。
///
/// 有効期限は追跡しない。1 回の実行で 1 度だけ使用される。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Authorization ヘッダー用の Bearer 文字列を返す。
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// TokenExchangeClient はアサーションをアクセストークンに交換する。
pub struct TokenExchangeClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    realm: String,
}

impl TokenExchangeClient {
    /// `base_url` は Keycloak のベース URL（末尾の `/` は無視される）。
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            realm: realm.into(),
        }
    }

    /// トークンエンドポイントの URL を返す。
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.realm
        )
    }

    /// アサーションのオーディエンスとなるレルムの URL を返す。
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url, self.realm)
    }

    /// アサーションを提示してアクセストークンを取得する。
    pub async fn exchange(&self, assertion: &Assertion) -> Result<AccessToken, AuthError> {
        let url = self.token_endpoint();
        debug!(url = %url, jti = %assertion.claims().jti, "アクセストークンを要求します");

        let request = TransportRequest::post(&url)
            .header("Content-Type", FORM_CONTENT_TYPE)
            .body(token_request_body(assertion));

        let raw = self.transport.send_text(request).await.map_err(|e| {
            error!(url = %url, error = %e, "トークンエンドポイントへのリクエストに失敗しました");
            AuthError::Transport(e)
        })?;

        let token = parse_access_token(&raw)?;
        info!(
            realm = %self.realm,
            token_length = token.as_str().len(),
            "アクセストークンを取得しました"
        );
        Ok(token)
    }
}

/// トークン要求のフォームボディを組み立てる。
///
/// アサーションは base64url と `.` のみで構成されるため、エンコードせずに連結する。
fn token_request_body(assertion: &Assertion) -> String {
    format!(
        "grant_type=client_credentials&client_assertion_type={CLIENT_ASSERTION_TYPE}&client_assertion={}",
        assertion.as_str()
    )
}

fn parse_access_token(raw: &str) -> Result<AccessToken, AuthError> {
    let json: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        error!(error = %e, "トークンレスポンスの解析に失敗しました");
        AuthError::InvalidResponse(e.to_string())
    })?;

    match json.get(ACCESS_TOKEN_KEY).and_then(serde_json::Value::as_str) {
        Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
        _ => {
            error!("受信したデータにアクセストークンが含まれていません");
            Err(AuthError::MissingAccessToken)
        }
    }
}
