//! 検証パイプラインのエラー定義。
//!
//! 各ステージ（鍵素材の読み込み、TLS 構成、アサーション署名、トークン交換、
//! マルチパート生成、HTTP 送信）ごとにエラー型を分け、`VarunaError` で束ねる。
//! いずれのエラーもその実行においては終端であり、内部で再試行しない。

use std::path::PathBuf;

/// KeyMaterialError はキーストア・トラストストアの読み込みと秘密鍵の取り出しで発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum KeyMaterialError {
    /// 必須の引数が空だった。
    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    /// サポートしていないストア種別が指定された。
    #[error("サポートしていないストア種別です: {0}")]
    UnsupportedStoreType(String),

    /// ストアファイルを読み込めなかった。
    #[error("ストアファイルを読み込めません: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ストアの解析に失敗した（パスワード誤り、または破損したファイル）。
    #[error("ストアを開けません（パスワード誤りまたは破損）: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// 指定したエイリアスのエントリが存在しない。
    #[error("エイリアス '{alias}' のエントリがありません: {path}")]
    AliasNotFound { alias: String, path: PathBuf },

    /// エントリが秘密鍵エントリではない。
    #[error("エイリアス '{alias}' は秘密鍵エントリではありません: {path}")]
    NotAPrivateKey { alias: String, path: PathBuf },
}

/// TlsConfigError は相互 TLS コンテキストの構築で発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum TlsConfigError {
    /// 必須の引数が空だった。
    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    /// キーストアからクライアント証明書と鍵を導出できなかった。
    #[error("キーマネージャーの導出に失敗しました: {0}")]
    KeyManager(String),

    /// トラストストアから信頼アンカーを導出できなかった。
    #[error("トラストマネージャーの導出に失敗しました: {0}")]
    TrustManager(String),

    /// トラストストアに証明書が 1 件も含まれていない。
    #[error("トラストストアに証明書が含まれていません")]
    EmptyTrustStore,
}

/// SigningError は JWT アサーションの生成で発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum SigningError {
    /// 必須のクレーム値が空だった。
    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    /// 署名方式と互換性のない鍵が渡された。
    #[error("署名に使用できない鍵です: {0}")]
    UnsupportedKey(String),

    /// 署名処理そのものに失敗した。
    #[error("アサーションの署名に失敗しました: {0}")]
    Sign(String),
}

/// TransportError は HTTP リクエストの送受信で発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// リクエストまたは HTTP クライアントを組み立てられなかった。
    #[error("リクエストの構築に失敗しました: {0}")]
    Build(String),

    /// 接続や送信など I/O レベルで失敗した。
    #[error("HTTP リクエスト失敗: {0}")]
    Request(String),

    /// 200 以外のステータスコードを受信した。
    #[error("予期しないステータスコード: HTTP {status}{}", body_suffix(.body))]
    UnexpectedStatus { status: u16, body: Option<String> },

    /// レスポンスボディの読み込みに失敗した。
    #[error("レスポンスボディの読み込みに失敗しました: {0}")]
    Body(String),
}

fn body_suffix(body: &Option<String>) -> String {
    body.as_deref()
        .filter(|b| !b.is_empty())
        .map(|b| format!(" - {b}"))
        .unwrap_or_default()
}

impl TransportError {
    /// ステータスコードに起因するエラーであればそのコードを返す。
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// AuthError はトークンエンドポイントとのトークン交換で発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// トークンエンドポイントへの HTTP 呼び出しが失敗した（200 以外を含む）。
    #[error("トークン取得失敗: {0}")]
    Transport(#[from] TransportError),

    /// レスポンスが JSON として解釈できなかった。
    #[error("トークンレスポンスの解析に失敗しました: {0}")]
    InvalidResponse(String),

    /// レスポンスに access_token が含まれていなかった。
    #[error("アクセストークンを取得できませんでした（access_token フィールドがありません）")]
    MissingAccessToken,
}

/// EncodingError は multipart/form-data ボディの生成で発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    /// パートが 1 つも指定されていない。
    #[error("マルチパートのパートが空です")]
    EmptyParts,

    /// ファイルパートの参照先を読み込めなかった。
    #[error("ファイルを読み込めません: {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON パートのシリアライズに失敗した。
    #[error("JSON パートのシリアライズに失敗しました: {0}")]
    Json(#[from] serde_json::Error),
}

/// UploadError は検証サービスへのアップロードで発生するエラー。
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    /// 必須の入力が欠けている。
    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// VarunaError はパイプライン全体のエラーを表す。
#[derive(thiserror::Error, Debug)]
pub enum VarunaError {
    /// 必須の入力が欠けている。ネットワーク呼び出しの前に検出される。
    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),

    #[error(transparent)]
    TlsConfig(#[from] TlsConfigError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<UploadError> for VarunaError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            UploadError::Encoding(e) => Self::Encoding(e),
            UploadError::Transport(e) => Self::Transport(e),
        }
    }
}
