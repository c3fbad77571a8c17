//! 検証サービスへの署名アップロード。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::UploadError;
use crate::multipart::{MultipartEncoder, MultipartPart};
use crate::report::ValidationServiceConfiguration;
use crate::token::AccessToken;
use crate::transport::{Transport, TransportRequest};

/// 署名ファイルのフィールド名。
pub const SIGNATURE_FIELD: &str = "signature";
/// 署名対象ドキュメントのフィールド名。
pub const CONTENT_FIELD: &str = "content";
/// 検証構成 JSON のフィールド名。
pub const JSON_CONFIG_FIELD: &str = "jsonConfig";

/// UploadRequest は 1 回のアップロードに必要な情報。呼び出しごとに生成され再利用しない。
#[derive(Debug)]
pub struct UploadRequest {
    pub url: String,
    pub token: AccessToken,
    pub parts: Vec<MultipartPart>,
    pub extra_headers: Vec<(String, String)>,
}

/// UploadClient は署名とドキュメントを検証サービスに送信し、レポートを受け取る。
pub struct UploadClient {
    transport: Arc<dyn Transport>,
    encoder: MultipartEncoder,
    url: String,
}

impl std::fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl UploadClient {
    /// `base_url` と `end_point` を連結したものがアップロード先 URL になる。
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        end_point: &str,
    ) -> Result<Self, UploadError> {
        if base_url.trim().is_empty() || end_point.trim().is_empty() {
            return Err(UploadError::InvalidArgument(
                "validation.base_url と validation.end_point は空にできません".to_string(),
            ));
        }

        Ok(Self {
            transport,
            encoder: MultipartEncoder::new(),
            url: format!("{base_url}{end_point}"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// アップロード要求を組み立てる。署名ファイルが存在しない場合はエラー。
    pub fn build_request(
        &self,
        token: &AccessToken,
        config: Option<&ValidationServiceConfiguration>,
        signature: &Path,
        document: Option<&Path>,
    ) -> Result<UploadRequest, UploadError> {
        if !signature.is_file() {
            error!(path = %signature.display(), "署名ファイルが見つかりません");
            return Err(UploadError::InvalidArgument(format!(
                "署名ファイルが存在しません: {}",
                signature.display()
            )));
        }

        let mut parts = vec![MultipartPart::file_from_path(
            SIGNATURE_FIELD,
            PathBuf::from(signature),
        )];
        if let Some(document) = document {
            parts.push(MultipartPart::file_from_path(
                CONTENT_FIELD,
                PathBuf::from(document),
            ));
        }
        if let Some(config) = config {
            parts.push(MultipartPart::json(JSON_CONFIG_FIELD, config)?);
        }

        Ok(UploadRequest {
            url: self.url.clone(),
            token: token.clone(),
            parts,
            extra_headers: Vec::new(),
        })
    }

    /// 署名（と任意のドキュメント・構成）を送信し、レポートのバイト列を返す。
    ///
    /// 空のレスポンスは「レポートなし」として正常に返す。
    pub async fn validate(
        &self,
        token: &AccessToken,
        config: Option<&ValidationServiceConfiguration>,
        signature: &Path,
        document: Option<&Path>,
    ) -> Result<Vec<u8>, UploadError> {
        let request = self.build_request(token, config, signature, document)?;
        self.send(request).await
    }

    /// 組み立て済みのアップロード要求を送信する。
    pub async fn send(&self, request: UploadRequest) -> Result<Vec<u8>, UploadError> {
        let body = self.encoder.encode(&request.parts).await?;

        let mut http = TransportRequest::post(&request.url)
            .header("Content-Type", body.content_type())
            .header("Authorization", request.token.bearer_header());
        for (name, value) in request.extra_headers {
            http = http.header(name, value);
        }
        let http = http.body(body.into_bytes());

        let report = self.transport.send_binary(http).await.inspect_err(|e| {
            error!(url = %request.url, error = %e, "検証サービスへのリクエストに失敗しました");
        })?;

        if report.is_empty() {
            warn!(url = %request.url, "検証サービスからレポートが返されませんでした");
        } else {
            info!(url = %request.url, size = report.len(), "検証レポートを受信しました");
        }
        Ok(report)
    }
}
