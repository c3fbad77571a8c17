//! varuna-client: 署名検証サービス連携ライブラリ。
//!
//! キーストアとトラストストアから相互 TLS コンテキストを構築し、秘密鍵で署名した
//! JWT クライアントアサーションを Keycloak でアクセストークンに交換したうえで、
//! 署名ファイルとドキュメントを multipart/form-data で検証サービスに送信する。
//!
//! # 使い方
//!
//! ```ignore
//! use secrecy::SecretString;
//! use varuna_client::{PipelineSettings, StoreSettings, ValidationPipeline, ValidationServiceConfiguration};
//!
//! let settings = PipelineSettings {
//!     key_store: StoreSettings::new("keystore.p12", SecretString::new("changeit".into())),
//!     trust_store: StoreSettings::new("truststore.p12", SecretString::new("changeit".into())),
//!     private_key_alias: "client-key".into(),
//!     private_key_password: SecretString::new("changeit".into()),
//!     keycloak_base_url: "https://idp.example.com".into(),
//!     realm: "validation".into(),
//!     issuer: "varuna".into(),
//!     subject: "varuna".into(),
//!     validation_base_url: "https://validation.example.com".into(),
//!     validation_end_point: "/api/validate".into(),
//! };
//!
//! let mut config = ValidationServiceConfiguration::new();
//! config.add_report_configuration("PDF", Some("EN"))?;
//!
//! let report = ValidationPipeline::new()
//!     .run(&settings, Some(&config), "signature.p7s".as_ref(), None)
//!     .await?;
//! ```

pub mod assertion;
pub mod error;
pub mod keystore;
pub mod multipart;
pub mod pipeline;
pub mod report;
mod safebag;
pub mod tls;
pub mod token;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod testing;

pub use assertion::{Assertion, AssertionClaims, AssertionSigner};
pub use error::{
    AuthError, EncodingError, KeyMaterialError, SigningError, TlsConfigError, TransportError,
    UploadError, VarunaError,
};
pub use keystore::{KeyMaterial, KeyMaterialLoader, KeyStore, PrivateKey, StoreType};
pub use multipart::{MultipartBody, MultipartEncoder, MultipartPart};
pub use pipeline::{PipelineSettings, StoreSettings, ValidationPipeline};
pub use report::{ReportConfiguration, ValidationOptions, ValidationServiceConfiguration};
pub use tls::{TlsContext, TlsContextBuilder};
pub use token::{AccessToken, TokenExchangeClient};
pub use transport::{HttpTransport, Transport, TransportRequest};
pub use upload::{UploadClient, UploadRequest};

#[cfg(feature = "mock")]
pub use transport::MockTransport;
