//! HTTP リクエストの送信。
//!
//! 組み立て済みのリクエスト（メソッド・URL・ヘッダー・ボディ）を送信し、
//! テキストまたはバイナリのレスポンスボディを返す。成功とみなすのは
//! ステータス 200 のみで、それ以外はすべてその呼び出しのエラーとなる。

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tracing::{debug, error};

use crate::error::TransportError;
use crate::tls::TlsContext;

/// TransportRequest は送信前の HTTP リクエストを表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// ヘッダーを追加する。追加順に送信される。
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// ヘッダー名（大文字小文字を区別しない）で最初の値を返す。
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// Transport は HTTP リクエストを送信するトレイト。
///
/// `HttpTransport` がデフォルト実装。テスト時は `MockTransport` が使用可能。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// リクエストを送信し、レスポンスボディを文字列として返す。
    ///
    /// 200 以外のステータスはレスポンスボディ付きの `UnexpectedStatus` になる。
    async fn send_text(&self, request: TransportRequest) -> Result<String, TransportError>;

    /// リクエストを送信し、レスポンスボディをそのままのバイト列で返す。
    async fn send_binary(&self, request: TransportRequest) -> Result<Vec<u8>, TransportError>;
}

/// HttpTransport は reqwest を使った Transport の HTTP 実装。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// 新しい HttpTransport を生成する。
    ///
    /// TLS コンテキストを渡した場合は、すべての接続でそのクライアント証明書と信頼アンカーを使う。
    pub fn new(tls: Option<&TlsContext>) -> Result<Self, TransportError> {
        let builder = reqwest::Client::builder();
        let builder = match tls {
            Some(ctx) => ctx.apply(builder),
            None => builder,
        };

        let client = builder.build().map_err(|e| {
            error!(error = %e, "HTTP クライアントの生成に失敗しました");
            TransportError::Build(e.to_string())
        })?;

        Ok(Self { client })
    }

    async fn execute(&self, request: TransportRequest) -> Result<reqwest::Response, TransportError> {
        if request.url.trim().is_empty() {
            return Err(TransportError::Build("URL が空です".to_string()));
        }
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::Build(format!("不正な URL '{}': {e}", request.url)))?;

        debug!(
            method = %request.method,
            url = %url,
            body_bytes = request.body.len(),
            "HTTP リクエストを送信します"
        );

        let mut builder = self.client.request(request.method, url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        builder.body(request.body).send().await.map_err(|e| {
            error!(error = %e, "HTTP リクエストに失敗しました");
            TransportError::Request(e.to_string())
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_text(&self, request: TransportRequest) -> Result<String, TransportError> {
        let response = self.execute(request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        if status != StatusCode::OK {
            error!(status = %status, body = %body, "予期しないレスポンスを受信しました");
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                body: Some(body),
            });
        }

        debug!(status = %status, body_bytes = body.len(), "テキストレスポンスを受信しました");
        Ok(body)
    }

    async fn send_binary(&self, request: TransportRequest) -> Result<Vec<u8>, TransportError> {
        let response = self.execute(request).await?;
        let status = response.status();

        if status != StatusCode::OK {
            error!(status = %status, "予期しないステータスコードを受信しました");
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                body: None,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        debug!(status = %status, body_bytes = bytes.len(), "バイナリレスポンスを受信しました");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(None).unwrap()
    }

    #[test]
    fn test_request_builder_keeps_header_order() {
        let request = TransportRequest::post("https://example.com")
            .header("Content-Type", "text/plain")
            .header("Authorization", "Bearer abc")
            .body("hello");

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.headers()[0].0, "Content-Type");
        assert_eq!(request.headers()[1].0, "Authorization");
        assert_eq!(request.header_value("authorization"), Some("Bearer abc"));
        assert_eq!(request.body_bytes(), b"hello");
    }

    #[tokio::test]
    async fn test_send_text_returns_body_on_200() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("Content-Type", "text/plain"))
            .and(body_bytes(b"ping".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&mock_server)
            .await;

        let request = TransportRequest::post(format!("{}/echo", mock_server.uri()))
            .header("Content-Type", "text/plain")
            .body("ping");
        let body = transport().send_text(request).await.unwrap();
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_send_text_non_200_includes_status_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&mock_server)
            .await;

        let result = transport()
            .send_text(TransportRequest::get(mock_server.uri()))
            .await;
        match result {
            Err(TransportError::UnexpectedStatus { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body.as_deref(), Some("not here"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_text_other_2xx_is_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&mock_server)
            .await;

        let result = transport()
            .send_text(TransportRequest::post(mock_server.uri()))
            .await;
        assert_eq!(result.unwrap_err().status(), Some(201));
    }

    #[tokio::test]
    async fn test_send_binary_returns_exact_bytes() {
        let payload: Vec<u8> = vec![0x50, 0x4b, 0x03, 0x04, 0x00, 0xff, 0x0d, 0x0a];
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&mock_server)
            .await;

        let bytes = transport()
            .send_binary(TransportRequest::post(mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, payload);
    }

    #[tokio::test]
    async fn test_send_binary_500_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_bytes(b"partial".to_vec()))
            .mount(&mock_server)
            .await;

        let result = transport()
            .send_binary(TransportRequest::post(mock_server.uri()))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::UnexpectedStatus {
                status: 500,
                body: None
            })
        ));
    }

    #[tokio::test]
    async fn test_blank_url_is_rejected() {
        let result = transport().send_text(TransportRequest::get("  ")).await;
        assert!(matches!(result, Err(TransportError::Build(_))));
    }

    #[tokio::test]
    async fn test_connection_failure_is_request_error() {
        // 未使用ポートへの接続は拒否される
        let result = transport()
            .send_binary(TransportRequest::post("http://127.0.0.1:1/upload"))
            .await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
