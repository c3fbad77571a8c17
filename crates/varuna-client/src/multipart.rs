//! multipart/form-data ボディの生成。
//!
//! パートは `MultipartPart` の閉じたバリアント（ファイル・JSON・テキスト）として
//! 構築時に種別を確定させ、指定順のままバイト列へ直列化する。
//! Content-Disposition のフィールド名とファイル名に含まれる `"` と改行は
//! パーセントエンコードする。

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error};

use crate::error::EncodingError;

const CRLF: &[u8] = b"\r\n";
const JSON_MIME_TYPE: &str = "application/json";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// FileContent はファイルパートの中身の取得元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// エンコード時にファイル全体を読み込む。
    Path(PathBuf),
    /// メモリ上のバイト列をそのまま使う。
    Bytes(Vec<u8>),
}

/// MultipartPart は multipart ボディを構成する 1 パート。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    File {
        name: String,
        file_name: String,
        /// `None` の場合は中身と拡張子から判定する。
        mime_type: Option<String>,
        content: FileContent,
    },
    Json {
        name: String,
        json: String,
    },
    Text {
        name: String,
        value: String,
    },
}

impl MultipartPart {
    /// パス上のファイルを参照するファイルパートを生成する。ファイル名はパスの末尾要素。
    pub fn file_from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::File {
            name: name.into(),
            file_name,
            mime_type: None,
            content: FileContent::Path(path),
        }
    }

    /// メモリ上のバイト列からファイルパートを生成する。
    pub fn file_from_bytes(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::File {
            name: name.into(),
            file_name: file_name.into(),
            mime_type,
            content: FileContent::Bytes(bytes),
        }
    }

    /// 値を JSON テキストにシリアライズして JSON パートを生成する。
    pub fn json<T: Serialize + ?Sized>(
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, EncodingError> {
        Ok(Self::Json {
            name: name.into(),
            json: serde_json::to_string(value)?,
        })
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    /// フィールド名を返す。
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Json { name, .. } | Self::Text { name, .. } => name,
        }
    }
}

/// MultipartBody はエンコード済みのボディとその境界文字列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    bytes: Vec<u8>,
    boundary: String,
}

impl MultipartBody {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Content-Type ヘッダーの値を返す。
    pub fn content_type(&self) -> String {
        format!("multipart/form-data;boundary={}", self.boundary)
    }
}

/// MultipartEncoder はパートの列を multipart/form-data のバイト列に変換する。
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipartEncoder;

impl MultipartEncoder {
    pub fn new() -> Self {
        Self
    }

    /// 新しい境界文字列でパートをエンコードする。
    pub async fn encode(&self, parts: &[MultipartPart]) -> Result<MultipartBody, EncodingError> {
        self.encode_with_boundary(parts, generate_boundary()).await
    }

    /// 指定した境界文字列でパートをエンコードする。
    pub async fn encode_with_boundary(
        &self,
        parts: &[MultipartPart],
        boundary: String,
    ) -> Result<MultipartBody, EncodingError> {
        if parts.is_empty() {
            error!("マルチパートのパートが指定されていません");
            return Err(EncodingError::EmptyParts);
        }

        let mut bytes = Vec::new();
        for part in parts {
            bytes.extend_from_slice(b"--");
            bytes.extend_from_slice(boundary.as_bytes());
            bytes.extend_from_slice(CRLF);
            bytes.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"",
                    escape_quoted(part.name())
                )
                .as_bytes(),
            );

            match part {
                MultipartPart::File {
                    file_name,
                    mime_type,
                    content,
                    ..
                } => {
                    let payload = read_content(content).await?;
                    let mime_type = mime_type
                        .clone()
                        .unwrap_or_else(|| detect_mime_type(file_name, &payload));
                    bytes.extend_from_slice(
                        format!(
                            "; filename=\"{}\"\r\nContent-Type: {mime_type}\r\n\r\n",
                            escape_quoted(file_name)
                        )
                        .as_bytes(),
                    );
                    bytes.extend_from_slice(&payload);
                    debug!(
                        name = %part.name(),
                        file_name = %file_name,
                        mime_type = %mime_type,
                        size = payload.len(),
                        "ファイルパートを追加しました"
                    );
                }
                MultipartPart::Json { json, .. } => {
                    bytes.extend_from_slice(
                        format!("\r\nContent-Type: {JSON_MIME_TYPE}\r\n\r\n").as_bytes(),
                    );
                    bytes.extend_from_slice(json.as_bytes());
                }
                MultipartPart::Text { value, .. } => {
                    bytes.extend_from_slice(b"\r\n\r\n");
                    bytes.extend_from_slice(value.as_bytes());
                }
            }
            bytes.extend_from_slice(CRLF);
        }

        bytes.extend_from_slice(b"--");
        bytes.extend_from_slice(boundary.as_bytes());
        bytes.extend_from_slice(b"--");

        debug!(
            parts = parts.len(),
            body_bytes = bytes.len(),
            "マルチパートボディを生成しました"
        );

        Ok(MultipartBody { bytes, boundary })
    }
}

/// 256 ビットの乱数を 16 進文字列にした境界を生成する。
fn generate_boundary() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// 引用符付きヘッダー値の `"`、CR、LF をパーセントエンコードする。
fn escape_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            other => escaped.push(other),
        }
    }
    escaped
}

async fn read_content(content: &FileContent) -> Result<Vec<u8>, EncodingError> {
    match content {
        FileContent::Bytes(bytes) => Ok(bytes.clone()),
        FileContent::Path(path) => tokio::fs::read(path).await.map_err(|source| {
            error!(path = %path.display(), error = %source, "ファイルの読み込みに失敗しました");
            EncodingError::UnreadableFile {
                path: path.clone(),
                source,
            }
        }),
    }
}

/// マジックバイト、拡張子の順で MIME タイプを判定する。
fn detect_mime_type(file_name: &str, payload: &[u8]) -> String {
    if let Some(kind) = infer::get(payload) {
        return kind.mime_type().to_string();
    }

    let extension = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let mime_type = match extension.as_deref() {
        Some("xml") => "application/xml",
        Some("p7s") => "application/pkcs7-signature",
        Some("p7m") => "application/pkcs7-mime",
        Some("pdf") => "application/pdf",
        Some("json") => JSON_MIME_TYPE,
        Some("txt") => "text/plain",
        _ => DEFAULT_MIME_TYPE,
    };
    mime_type.to_string()
}
