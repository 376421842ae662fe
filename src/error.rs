//! BFE 错误类型
//!
//! 所有库函数统一返回 `BfeError`。
//! 面向用户展示时请使用 `user_message()`：认证失败与大部分格式错误
//! 会被折叠成同一条提示，避免泄露具体是哪一项校验失败。

use std::path::PathBuf;

use thiserror::Error;

/// 容器格式错误
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("not a BFE5 container")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("container header is truncated")]
    TruncatedHeader,

    #[error("chunk length exceeds the remaining input")]
    TruncatedChunk,

    #[error("declared chunk length exceeds the container chunk size")]
    OversizedChunk,

    #[error("maximum number of chunks exceeded")]
    CapacityExceeded,

    #[error("plaintext size does not match the header")]
    SizeMismatch,

    #[error("invalid KDF parameters in header")]
    InvalidKdfParameters,

    #[error("invalid chunk size in header")]
    InvalidChunkSize,

    #[error("malformed encrypted text")]
    MalformedText,
}

#[derive(Debug, Error)]
pub enum BfeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "not enough memory for key derivation ({requested_kib} KiB requested); \
         close other programs or lower the memory cost"
    )]
    ResourceExhaustion { requested_kib: u32 },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid encryption parameters: {0}")]
    InvalidParameters(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("filename is too long ({0} bytes)")]
    FilenameTooLong(usize),

    #[error("output already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("decryption failed: wrong passphrase or corrupted file")]
    Authentication,

    #[error("encryption failed")]
    Internal,

    #[error("operation cancelled")]
    Cancelled,
}

impl BfeError {
    /// 是否为用户主动取消（不视为失败）
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 面向最终用户的低分辨率提示
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication | Self::Format(_) => {
                "Decryption failed: wrong passphrase or corrupted file.".to_string()
            }
            Self::Cancelled => "Cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}
