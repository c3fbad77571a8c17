//! PKCS#12 の鍵バッグ走査。
//!
//! OpenSSL の PKCS#12 解析は最初の秘密鍵しか返さないため、暗号化されていない
//! SafeContents を直接たどり、鍵バッグごとのフレンドリ名と鍵本体を取り出す。
//! 証明書バッグと暗号化された SafeContents は読まない。

use std::fmt;

use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_BMP_STRING: u8 = 0x1e;
const TAG_OCTET_STRING_CONSTRUCTED: u8 = 0x24;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xa0;

// 1.2.840.113549.1.7.1
const OID_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];
// 1.2.840.113549.1.12.10.1.1
const OID_KEY_BAG: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x0c, 0x0a, 0x01, 0x01];
// 1.2.840.113549.1.12.10.1.2
const OID_SHROUDED_KEY_BAG: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x0c, 0x0a, 0x01, 0x02,
];
// 1.2.840.113549.1.9.20
const OID_FRIENDLY_NAME: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x14];

/// DerError は PKCS#12 の DER 構造を解釈できなかったことを表す。
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("PKCS#12 構造を解析できません: {0}")]
pub(crate) struct DerError(&'static str);

/// KeyBag はストア内の秘密鍵エントリ 1 件。
pub(crate) struct KeyBag {
    alias: Option<String>,
    shrouded: bool,
    der: Vec<u8>,
}

impl KeyBag {
    pub(crate) fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// 鍵パスワードで秘密鍵を復号する。
    pub(crate) fn decrypt(&self, password: &str) -> Result<PKey<Private>, ErrorStack> {
        if self.shrouded {
            PKey::private_key_from_pkcs8_passphrase(&self.der, password.as_bytes())
        } else {
            PKey::private_key_from_pkcs8(&self.der)
        }
    }
}

impl fmt::Debug for KeyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBag")
            .field("alias", &self.alias)
            .field("shrouded", &self.shrouded)
            .finish_non_exhaustive()
    }
}

struct DerElement<'a> {
    tag: u8,
    value: &'a [u8],
    raw: &'a [u8],
}

struct DerReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn next_byte(&mut self, what: &'static str) -> Result<u8, DerError> {
        let byte = *self.bytes.get(self.pos).ok_or(DerError(what))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_element(&mut self) -> Result<DerElement<'a>, DerError> {
        let start = self.pos;
        let tag = self.next_byte("タグが途切れています")?;
        let first = self.next_byte("長さが途切れています")?;

        let len = if first < 0x80 {
            usize::from(first)
        } else {
            // 不定長形式（0x80）は扱わない
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 {
                return Err(DerError("サポートしていない長さ形式です"));
            }
            let bytes = self
                .bytes
                .get(self.pos..self.pos + count)
                .ok_or(DerError("長さが途切れています"))?;
            self.pos += count;
            bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
        };

        let end = self
            .pos
            .checked_add(len)
            .ok_or(DerError("長さが不正です"))?;
        let value = self
            .bytes
            .get(self.pos..end)
            .ok_or(DerError("値が途切れています"))?;
        let raw = self.bytes.get(start..end).ok_or(DerError("値が途切れています"))?;
        self.pos = end;

        Ok(DerElement { tag, value, raw })
    }

    fn expect(&mut self, tag: u8, what: &'static str) -> Result<DerElement<'a>, DerError> {
        let element = self.read_element()?;
        if element.tag != tag {
            return Err(DerError(what));
        }
        Ok(element)
    }
}

/// OCTET STRING の中身を返す。BER の構造化形式は連結する。
fn octets(element: &DerElement<'_>) -> Result<Vec<u8>, DerError> {
    match element.tag {
        TAG_OCTET_STRING => Ok(element.value.to_vec()),
        TAG_OCTET_STRING_CONSTRUCTED => {
            let mut out = Vec::new();
            let mut reader = DerReader::new(element.value);
            while !reader.is_empty() {
                out.extend(octets(&reader.read_element()?)?);
            }
            Ok(out)
        }
        _ => Err(DerError("OCTET STRING ではありません")),
    }
}

/// ContentInfo が data 型であれば中身のオクテット列を返す。
fn data_content(content_info: &[u8]) -> Result<Option<Vec<u8>>, DerError> {
    let mut reader = DerReader::new(content_info);
    let content_type = reader.expect(TAG_OID, "contentType がありません")?;
    if content_type.value != OID_DATA {
        return Ok(None);
    }
    let explicit = reader.expect(TAG_CONTEXT_0, "content がありません")?;
    let octet_string = DerReader::new(explicit.value).read_element()?;
    octets(&octet_string).map(Some)
}

fn decode_bmp_string(bytes: &[u8]) -> Result<String, DerError> {
    if bytes.len() % 2 != 0 {
        return Err(DerError("BMPString の長さが奇数です"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| DerError("BMPString を復号できません"))
}

fn parse_key_bag(bag: &[u8]) -> Result<Option<KeyBag>, DerError> {
    let mut reader = DerReader::new(bag);
    let bag_id = reader.expect(TAG_OID, "bagId がありません")?;
    let shrouded = if bag_id.value == OID_SHROUDED_KEY_BAG {
        true
    } else if bag_id.value == OID_KEY_BAG {
        false
    } else {
        return Ok(None);
    };

    let bag_value = reader.expect(TAG_CONTEXT_0, "bagValue がありません")?;
    let key = DerReader::new(bag_value.value).expect(TAG_SEQUENCE, "鍵が SEQUENCE ではありません")?;

    let mut alias = None;
    if !reader.is_empty() {
        let attributes = reader.expect(TAG_SET, "bagAttributes が SET ではありません")?;
        let mut attributes = DerReader::new(attributes.value);
        while !attributes.is_empty() {
            let attribute = attributes.expect(TAG_SEQUENCE, "属性が SEQUENCE ではありません")?;
            let mut attribute = DerReader::new(attribute.value);
            let attr_id = attribute.expect(TAG_OID, "属性 ID がありません")?;
            let values = attribute.expect(TAG_SET, "属性値が SET ではありません")?;
            if attr_id.value == OID_FRIENDLY_NAME {
                let name = DerReader::new(values.value)
                    .expect(TAG_BMP_STRING, "friendlyName が BMPString ではありません")?;
                alias = Some(decode_bmp_string(name.value)?);
            }
        }
    }

    Ok(Some(KeyBag {
        alias,
        shrouded,
        der: key.raw.to_vec(),
    }))
}

/// PFX の DER から、暗号化されていない SafeContents にある鍵バッグを順に返す。
pub(crate) fn key_bags(der: &[u8]) -> Result<Vec<KeyBag>, DerError> {
    let pfx = DerReader::new(der).expect(TAG_SEQUENCE, "PFX が SEQUENCE ではありません")?;
    let mut pfx = DerReader::new(pfx.value);
    pfx.expect(TAG_INTEGER, "version がありません")?;
    let auth_safe = pfx.expect(TAG_SEQUENCE, "authSafe がありません")?;
    let safes = data_content(auth_safe.value)?
        .ok_or(DerError("authSafe が data 型ではありません"))?;

    let safes = DerReader::new(&safes)
        .expect(TAG_SEQUENCE, "AuthenticatedSafe が SEQUENCE ではありません")?
        .value
        .to_vec();

    let mut bags = Vec::new();
    let mut content_infos = DerReader::new(&safes);
    while !content_infos.is_empty() {
        let content_info =
            content_infos.expect(TAG_SEQUENCE, "ContentInfo が SEQUENCE ではありません")?;
        let Some(contents) = data_content(content_info.value)? else {
            continue;
        };
        let contents =
            DerReader::new(&contents).expect(TAG_SEQUENCE, "SafeContents が SEQUENCE ではありません")?;
        let mut safe_bags = DerReader::new(contents.value);
        while !safe_bags.is_empty() {
            let bag = safe_bags.expect(TAG_SEQUENCE, "SafeBag が SEQUENCE ではありません")?;
            if let Some(key_bag) = parse_key_bag(bag.value)? {
                bags.push(key_bag);
            }
        }
    }

    Ok(bags)
}

#[cfg(test)]
mod tests {
    use openssl::pkey::Id;

    use super::*;
    use crate::testing;

    #[test]
    fn test_key_bags_of_multi_key_store() {
        let bags = key_bags(testing::MULTI_KEY_STORE).unwrap();
        let aliases: Vec<_> = bags.iter().map(KeyBag::alias).collect();
        assert_eq!(aliases, vec![Some("tls-key"), Some("client-key")]);

        assert_eq!(
            bags[0].decrypt(testing::STORE_PASSWORD).unwrap().id(),
            Id::RSA
        );
        assert_eq!(bags[1].decrypt(testing::STORE_PASSWORD).unwrap().id(), Id::EC);
    }

    #[test]
    fn test_decrypt_with_wrong_password_fails() {
        let bags = key_bags(testing::MULTI_KEY_STORE).unwrap();
        assert!(bags[1].decrypt("wrong-password").is_err());
    }

    #[test]
    fn test_key_bags_of_openssl_store() {
        let key = testing::rsa_key();
        let cert = testing::self_signed(&key, "bag-test");
        let der = testing::key_store_der(testing::KEY_ALIAS, testing::STORE_PASSWORD, &key, &cert);

        let bags = key_bags(&der).unwrap();
        assert_eq!(bags.len(), 1);
        assert_eq!(bags[0].alias(), Some(testing::KEY_ALIAS));
        let decrypted = bags[0].decrypt(testing::STORE_PASSWORD).unwrap();
        assert!(decrypted.public_eq(&key));
    }

    #[test]
    fn test_key_bags_of_trust_store_is_empty() {
        let key = testing::rsa_key();
        let cert = testing::self_signed(&key, "bag-test");
        let der = testing::trust_store_der(testing::STORE_PASSWORD, &[cert]);
        assert!(key_bags(&der).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_input_fails() {
        let truncated = &testing::MULTI_KEY_STORE[..64];
        assert!(key_bags(truncated).is_err());
        assert!(key_bags(&[]).is_err());
    }

    #[test]
    fn test_decode_bmp_string() {
        assert_eq!(
            decode_bmp_string(&[0x00, 0x6b, 0x00, 0x65, 0x00, 0x79]).unwrap(),
            "key"
        );
        assert!(decode_bmp_string(&[0x00]).is_err());
    }

    #[test]
    fn test_long_form_length() {
        let mut der = vec![TAG_OCTET_STRING, 0x81, 0x80];
        der.extend(std::iter::repeat(0xab).take(0x80));
        let element = DerReader::new(&der).read_element().unwrap();
        assert_eq!(element.value.len(), 0x80);
        assert_eq!(element.raw.len(), 0x83);
    }
}
