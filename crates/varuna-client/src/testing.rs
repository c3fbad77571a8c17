//! ユニットテスト用の鍵素材フィクスチャ。

use std::path::PathBuf;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509NameBuilder, X509};
use tempfile::TempDir;

pub(crate) const STORE_PASSWORD: &str = "changeit";
pub(crate) const KEY_ALIAS: &str = "client-key";

/// keytool で作成した 2 鍵ストア。
///
/// `tls-key`（RSA）と `client-key`（EC P-256）の秘密鍵エントリと、
/// 信頼済み証明書 `ca-root` を含む。パスワードは `STORE_PASSWORD`。
pub(crate) const MULTI_KEY_STORE: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/multi-key.p12"
));

pub(crate) fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub(crate) fn ec_key(nid: Nid) -> PKey<Private> {
    let group = EcGroup::from_curve_name(nid).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub(crate) fn self_signed(key: &PKey<Private>, common_name: &str) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

pub(crate) fn key_store_der(alias: &str, password: &str, key: &PKey<Private>, cert: &X509) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name(alias).pkey(key).cert(cert);
    builder.build2(password).unwrap().to_der().unwrap()
}

pub(crate) fn trust_store_der(password: &str, certs: &[X509]) -> Vec<u8> {
    let mut stack = Stack::new().unwrap();
    for cert in certs {
        stack.push(cert.clone()).unwrap();
    }
    let mut builder = Pkcs12::builder();
    builder.ca(stack);
    builder.build2(password).unwrap().to_der().unwrap()
}

/// 一時ディレクトリにキーストアとトラストストアを書き出したフィクスチャ。
pub(crate) struct Fixture {
    _dir: TempDir,
    pub key_store_path: PathBuf,
    pub trust_store_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let key = rsa_key();
        let cert = self_signed(&key, "varuna-test-client");

        let key_store_path = dir.path().join("keystore.p12");
        std::fs::write(
            &key_store_path,
            key_store_der(KEY_ALIAS, STORE_PASSWORD, &key, &cert),
        )
        .unwrap();

        let trust_store_path = dir.path().join("truststore.p12");
        std::fs::write(
            &trust_store_path,
            trust_store_der(STORE_PASSWORD, &[cert]),
        )
        .unwrap();

        Self {
            _dir: dir,
            key_store_path,
            trust_store_path,
        }
    }
}
