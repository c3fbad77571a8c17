//! 鍵素材の読み込みからレポート受信までの検証パイプライン。
//!
//! 各ステージは前のステージの完了を待ってから順に実行する。いずれかが失敗した
//! 時点で残りのステージは実行せず、途中で得たトークン等は破棄する。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};

use crate::assertion::AssertionSigner;
use crate::error::VarunaError;
use crate::keystore::{KeyMaterial, KeyMaterialLoader, DEFAULT_STORE_TYPE};
use crate::report::ValidationServiceConfiguration;
use crate::tls::TlsContextBuilder;
use crate::token::TokenExchangeClient;
use crate::transport::{HttpTransport, Transport};
use crate::upload::UploadClient;

/// StoreSettings はストアファイル 1 つの読み込み設定。
#[derive(Debug)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub password: SecretString,
    pub store_type: String,
}

impl StoreSettings {
    pub fn new(path: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            path: path.into(),
            password,
            store_type: DEFAULT_STORE_TYPE.to_string(),
        }
    }
}

/// PipelineSettings はパイプラインの実行に必要な解決済みの設定値。
#[derive(Debug)]
pub struct PipelineSettings {
    pub key_store: StoreSettings,
    pub trust_store: StoreSettings,
    pub private_key_alias: String,
    pub private_key_password: SecretString,
    pub keycloak_base_url: String,
    pub realm: String,
    pub issuer: String,
    pub subject: String,
    pub validation_base_url: String,
    pub validation_end_point: String,
}

/// ValidationPipeline は鍵素材の読み込み・TLS 構成・署名・トークン交換・アップロードを順に実行する。
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationPipeline {
    loader: KeyMaterialLoader,
    tls_builder: TlsContextBuilder,
    signer: AssertionSigner,
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 署名（と任意のドキュメント）を検証サービスへ送信し、レポートのバイト列を返す。
    ///
    /// 入力ファイルの存在確認はストアの読み込みやネットワーク呼び出しより前に行う。
    /// ストアの読み込み、TLS 構成、秘密鍵の取り出しの順に進め、アップロード先の
    /// 検証も署名とトークン交換より前に済ませる。
    pub async fn run(
        &self,
        settings: &PipelineSettings,
        report_config: Option<&ValidationServiceConfiguration>,
        signature: &Path,
        document: Option<&Path>,
    ) -> Result<Vec<u8>, VarunaError> {
        check_input_file("signature", signature)?;
        if let Some(document) = document {
            check_input_file("document", document)?;
        }

        let key_store = self.loader.load_store(
            &settings.key_store.path,
            settings.key_store.password.expose_secret(),
            &settings.key_store.store_type,
        )?;
        let trust_store = self.loader.load_store(
            &settings.trust_store.path,
            settings.trust_store.password.expose_secret(),
            &settings.trust_store.store_type,
        )?;

        let tls = self.tls_builder.build(
            &key_store,
            settings.key_store.password.expose_secret(),
            &trust_store,
        )?;

        let private_key = self.loader.extract_key(
            &key_store,
            &settings.private_key_alias,
            settings.private_key_password.expose_secret(),
        )?;
        let key_material = KeyMaterial::new(key_store, trust_store, private_key);

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(Some(&tls))?);
        let upload_client = UploadClient::new(
            Arc::clone(&transport),
            &settings.validation_base_url,
            &settings.validation_end_point,
        )?;
        let token_client = TokenExchangeClient::new(
            transport,
            &settings.keycloak_base_url,
            &settings.realm,
        );
        let assertion = self.signer.sign(
            &settings.issuer,
            &token_client.realm_url(),
            &settings.subject,
            key_material.private_key(),
        )?;
        let token = token_client.exchange(&assertion).await?;

        let report = upload_client
            .validate(&token, report_config, signature, document)
            .await?;

        info!(
            signature = %signature.display(),
            size = report.len(),
            "検証パイプラインが完了しました"
        );
        Ok(report)
    }
}

fn check_input_file(field: &str, path: &Path) -> Result<(), VarunaError> {
    if path.as_os_str().is_empty() {
        return Err(VarunaError::InvalidArgument(format!("{field} が指定されていません")));
    }
    if !path.is_file() {
        error!(field = %field, path = %path.display(), "入力ファイルが見つかりません");
        return Err(VarunaError::InvalidArgument(format!(
            "{field} のファイルが存在しません: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_missing_stores() -> PipelineSettings {
        PipelineSettings {
            key_store: StoreSettings::new(
                "/nonexistent/keystore.p12",
                SecretString::new("changeit".to_string()),
            ),
            trust_store: StoreSettings::new(
                "/nonexistent/truststore.p12",
                SecretString::new("changeit".to_string()),
            ),
            private_key_alias: "client-key".to_string(),
            private_key_password: SecretString::new("changeit".to_string()),
            keycloak_base_url: "http://127.0.0.1:1".to_string(),
            realm: "validation".to_string(),
            issuer: "varuna".to_string(),
            subject: "varuna".to_string(),
            validation_base_url: "http://127.0.0.1:1".to_string(),
            validation_end_point: "/validate".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_signature_is_checked_before_stores() {
        let result = ValidationPipeline::new()
            .run(
                &settings_with_missing_stores(),
                None,
                Path::new("/nonexistent/signature.p7s"),
                None,
            )
            .await;
        assert!(matches!(result, Err(VarunaError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_missing_document_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let signature = dir.path().join("signature.p7s");
        std::fs::write(&signature, b"SIG").unwrap();

        let result = ValidationPipeline::new()
            .run(
                &settings_with_missing_stores(),
                None,
                &signature,
                Some(Path::new("/nonexistent/document.xml")),
            )
            .await;
        assert!(matches!(result, Err(VarunaError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_missing_key_store_is_key_material_error() {
        let dir = tempfile::tempdir().unwrap();
        let signature = dir.path().join("signature.p7s");
        std::fs::write(&signature, b"SIG").unwrap();

        let result = ValidationPipeline::new()
            .run(&settings_with_missing_stores(), None, &signature, None)
            .await;
        assert!(matches!(result, Err(VarunaError::KeyMaterial(_))));
    }
}
