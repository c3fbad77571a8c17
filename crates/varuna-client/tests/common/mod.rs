//! 統合テスト用のストアとパイプライン設定のフィクスチャ。

use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509NameBuilder, X509};
use secrecy::SecretString;
use tempfile::TempDir;
use varuna_client::{PipelineSettings, StoreSettings};

pub const STORE_PASSWORD: &str = "changeit";
pub const KEY_ALIAS: &str = "client-key";
pub const REALM: &str = "validation";
pub const END_POINT: &str = "/api/v1/validate";

fn self_signed(key: &PKey<Private>) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "varuna-integration").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// 一時ディレクトリ上のキーストア・トラストストア・署名ファイル。
pub struct Workspace {
    dir: TempDir,
    pub key_store: PathBuf,
    pub trust_store: PathBuf,
    pub signature: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let cert = self_signed(&key);

        let mut builder = Pkcs12::builder();
        builder.name(KEY_ALIAS).pkey(&key).cert(&cert);
        let key_store = dir.path().join("keystore.p12");
        std::fs::write(
            &key_store,
            builder.build2(STORE_PASSWORD).unwrap().to_der().unwrap(),
        )
        .unwrap();

        let mut ca = Stack::new().unwrap();
        ca.push(cert).unwrap();
        let mut builder = Pkcs12::builder();
        builder.ca(ca);
        let trust_store = dir.path().join("truststore.p12");
        std::fs::write(
            &trust_store,
            builder.build2(STORE_PASSWORD).unwrap().to_der().unwrap(),
        )
        .unwrap();

        let signature = dir.path().join("signature.p7s");
        std::fs::write(&signature, b"0\x82\x01\x00signature-bytes").unwrap();

        Self {
            dir,
            key_store,
            trust_store,
            signature,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Keycloak と検証サービスを同じモックサーバーに向けた設定を返す。
    pub fn settings(&self, server_uri: &str) -> PipelineSettings {
        let secret = || SecretString::new(STORE_PASSWORD.to_string());
        PipelineSettings {
            key_store: StoreSettings::new(&self.key_store, secret()),
            trust_store: StoreSettings::new(&self.trust_store, secret()),
            private_key_alias: KEY_ALIAS.to_string(),
            private_key_password: secret(),
            keycloak_base_url: server_uri.to_string(),
            realm: REALM.to_string(),
            issuer: "varuna-client".to_string(),
            subject: "varuna-client".to_string(),
            validation_base_url: server_uri.to_string(),
            validation_end_point: END_POINT.to_string(),
        }
    }
}
