use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("Image encode error: {0}")]
    EncodeError(String),

    #[error("Detection error: {0}")]
    DetectionError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("PDF write error: {0}")]
    PdfWriteError(String),

    #[error("Image XObject error: {0}")]
    ImageXObjectError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`MaskError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl MaskError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create an image decode error.
    decode => DecodeError,
    /// Create an image encode error.
    encode => EncodeError,
    /// Create a detection (model inference) error.
    detection => DetectionError,
    /// Create a PDF read error.
    pdf_read => PdfReadError,
    /// Create a PDF write error.
    pdf_write => PdfWriteError,
    /// Create an image XObject error.
    image_xobject => ImageXObjectError,
    /// Create a report error.
    report => ReportError,
}

impl MaskError {
    /// 検出器の失敗かどうか。文書処理ではこの種類のエラーだけは画像単位で握りつぶさない。
    pub fn is_detection(&self) -> bool {
        matches!(self, Self::DetectionError(_))
    }
}

impl From<lopdf::Error> for MaskError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_json::Error> for MaskError {
    fn from(e: serde_json::Error) -> Self {
        Self::ReportError(e.to_string())
    }
}

impl From<serde_yml::Error> for MaskError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for MaskError {
    fn from(e: image::ImageError) -> Self {
        Self::EncodeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MaskError>;
