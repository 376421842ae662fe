//! BFE5：基于口令的流式文件加密
//!
//! 容器格式：70 字节固定 Header + 加密文件名块 + 若干长度前缀的 AES-256-GCM 块。
//! 密钥由 Argon2id 派生，每块 nonce 由 base nonce 与块索引导出，
//! Header 作为所有块的 AAD。

mod decrypt;
mod encrypt;

pub mod control;
pub mod crypto;
pub mod error;
pub mod format;
pub mod fs;
pub mod progress;
pub mod text;

pub use control::{CancelToken, ProgressCallback, StreamControl};
pub use crypto::kdf::{EncryptionParameters, KdfAlgorithm, SymmetricKey, derive_key};
pub use decrypt::{
    ContainerReader, DecryptOptions, DecryptSummary, DecryptedBuffer, decrypt_bytes,
    decrypt_file, decrypt_into_dir, decrypt_stream, read_header,
};
pub use encrypt::{
    EncryptOptions, EncryptSummary, encrypt_bytes, encrypt_file, encrypt_stream,
    suggested_output_name,
};
pub use error::{BfeError, FormatError};
pub use format::header::{ContainerHeader, DEFAULT_CHUNK_SIZE, HEADER_SIZE};
pub use progress::Progress;
pub use text::{decrypt_text, encrypt_text};
