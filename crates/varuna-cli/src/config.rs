use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use varuna_client::keystore::DEFAULT_STORE_TYPE;
use varuna_client::{PipelineSettings, StoreSettings, ValidationServiceConfiguration, VarunaError};

/// 設定ファイルパスの既定値。
pub const DEFAULT_CONFIG_FILE: &str = "application.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file: {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid validation options: {0}")]
    ValidationOptions(#[from] VarunaError),
}

/// ClientConfig は varuna CLI の設定ファイル全体。
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub keystore: KeyStoreConfig,
    pub truststore: TrustStoreConfig,
    pub keycloak: KeycloakConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct KeyStoreConfig {
    pub filename: PathBuf,
    pub password: SecretString,
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    pub private_key: PrivateKeyConfig,
}

#[derive(Debug, Deserialize)]
pub struct PrivateKeyConfig {
    pub alias: String,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct TrustStoreConfig {
    pub filename: PathBuf,
    pub password: SecretString,
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
}

#[derive(Debug, Deserialize)]
pub struct KeycloakConfig {
    pub base_url: String,
    pub realm: String,
    pub issuer: String,
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidationConfig {
    pub base_url: String,
    pub end_point: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,
    #[serde(default = "default_reports")]
    pub reports: Vec<ReportConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportConfig {
    #[serde(rename = "type")]
    pub report_type: String,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_store_type() -> String {
    DEFAULT_STORE_TYPE.to_string()
}

fn default_profile() -> String {
    "AUTOMATIC".to_string()
}

fn default_max_recursion_depth() -> u32 {
    3
}

fn default_reports() -> Vec<ReportConfig> {
    let report = |report_type: &str, language: Option<&str>| ReportConfig {
        report_type: report_type.to_string(),
        language: language.map(str::to_string),
    };
    vec![
        report("PDF", Some("EN")),
        report("SVR", None),
        report("HTML", Some("DE")),
    ]
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

/// YAML を読み込み ClientConfig を返す。
pub fn load(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ClientConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

fn require(value: &str, key: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    Ok(())
}

impl ClientConfig {
    /// 設定値のバリデーション。
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.keystore.filename.to_string_lossy(), "keystore.filename")?;
        require(self.keystore.password.expose_secret(), "keystore.password")?;
        require(&self.keystore.private_key.alias, "keystore.private_key.alias")?;
        require(
            self.keystore.private_key.password.expose_secret(),
            "keystore.private_key.password",
        )?;
        require(&self.truststore.filename.to_string_lossy(), "truststore.filename")?;
        require(self.truststore.password.expose_secret(), "truststore.password")?;
        require(&self.keycloak.base_url, "keycloak.base_url")?;
        require(&self.keycloak.realm, "keycloak.realm")?;
        require(&self.keycloak.issuer, "keycloak.issuer")?;
        require(&self.keycloak.subject, "keycloak.subject")?;
        require(&self.validation.base_url, "validation.base_url")?;
        require(&self.validation.end_point, "validation.end_point")?;
        if self.validation.max_recursion_depth < 1 {
            return Err(ConfigError::Validation(
                "validation.max_recursion_depth must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// パイプラインの実行設定に変換する。
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let secret = |s: &SecretString| SecretString::new(s.expose_secret().clone());
        PipelineSettings {
            key_store: StoreSettings {
                path: self.keystore.filename.clone(),
                password: secret(&self.keystore.password),
                store_type: self.keystore.store_type.clone(),
            },
            trust_store: StoreSettings {
                path: self.truststore.filename.clone(),
                password: secret(&self.truststore.password),
                store_type: self.truststore.store_type.clone(),
            },
            private_key_alias: self.keystore.private_key.alias.clone(),
            private_key_password: secret(&self.keystore.private_key.password),
            keycloak_base_url: self.keycloak.base_url.clone(),
            realm: self.keycloak.realm.clone(),
            issuer: self.keycloak.issuer.clone(),
            subject: self.keycloak.subject.clone(),
            validation_base_url: self.validation.base_url.clone(),
            validation_end_point: self.validation.end_point.clone(),
        }
    }

    /// 検証サービスに送る構成を組み立てる。検証基準日時は現在時刻。
    pub fn validation_service_configuration(
        &self,
    ) -> Result<ValidationServiceConfiguration, ConfigError> {
        let mut config = ValidationServiceConfiguration::new();
        for report in &self.validation.reports {
            config.add_report_configuration(&report.report_type, report.language.as_deref())?;
        }
        config.set_profile(&self.validation.profile)?;
        config.set_max_recursion_depth(self.validation.max_recursion_depth)?;
        Ok(config)
    }
}
