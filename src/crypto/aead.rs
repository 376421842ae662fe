//! BFE 分块 AEAD 加解密模块
//!
//! 基于 AES-256-GCM（96-bit nonce，128-bit tag）。
//!
//! nonce 规则：
//! - 每个容器生成一个随机 12 字节 base nonce
//! - 第 i 个数据块的 nonce = base nonce，末 4 字节替换为 i（小端 u32）
//! - 索引 0xFFFFFFFF 保留给加密文件名，数据块索引必须小于 0xFFFFFFFE
//!
//! 每个块都以 70 字节固定 Header 作为 AAD，
//! Header 任意字节被篡改都会导致所有块认证失败。
//!
//! 安全约束：
//! - 同一密钥下 nonce 严禁复用
//! - 认证未通过前不输出任何明文

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroizing;

use crate::crypto::kdf::SymmetricKey;
use crate::error::{BfeError, FormatError};
use crate::format::header::HEADER_SIZE;

/// AES-GCM nonce 长度（96 bit）
pub const NONCE_SIZE: usize = 12;

/// AEAD 认证标签长度
pub const TAG_SIZE: usize = 16;

/// 文件名专用的保留索引
pub const FILENAME_NONCE_INDEX: u32 = u32::MAX;

/// 数据块索引上限（不含），即最多 2^32 - 2 个数据块
pub const CHUNK_INDEX_LIMIT: u32 = u32::MAX - 1;

/// 由 base nonce 与索引计算块 nonce
pub fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    nonce[NONCE_SIZE - 4..].copy_from_slice(&index.to_le_bytes());
    nonce
}

/// 单个容器的块加解密器
///
/// 持有 AES 密钥扩展结果、base nonce 和 Header AAD。
/// 轮密钥在 drop 时清零（`aes` 的 `zeroize` feature）。
pub struct ChunkCipher {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_SIZE],
    aad: [u8; HEADER_SIZE],
}

impl ChunkCipher {
    pub fn new(key: &SymmetricKey, base_nonce: [u8; NONCE_SIZE], aad: [u8; HEADER_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            base_nonce,
            aad,
        }
    }

    /// 加密一个数据块，返回 `密文 || tag`
    pub fn encrypt_chunk(&self, index: u32, plaintext: &[u8]) -> Result<Vec<u8>, BfeError> {
        check_index(index)?;
        self.seal(index, plaintext)
    }

    /// 解密一个数据块
    ///
    /// 任何 tag 不匹配都返回 `Authentication`。
    pub fn decrypt_chunk(
        &self,
        index: u32,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, BfeError> {
        check_index(index)?;
        self.open(index, ciphertext)
    }

    pub(crate) fn seal_filename(&self, name: &[u8]) -> Result<Vec<u8>, BfeError> {
        self.seal(FILENAME_NONCE_INDEX, name)
    }

    pub(crate) fn open_filename(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, BfeError> {
        self.open(FILENAME_NONCE_INDEX, ciphertext)
    }

    fn seal(&self, index: u32, msg: &[u8]) -> Result<Vec<u8>, BfeError> {
        let nonce_bytes = chunk_nonce(&self.base_nonce, index);

        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg,
                    aad: &self.aad,
                },
            )
            .map_err(|_| BfeError::Internal)
    }

    fn open(&self, index: u32, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, BfeError> {
        let nonce_bytes = chunk_nonce(&self.base_nonce, index);

        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &self.aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| BfeError::Authentication)
    }
}

fn check_index(index: u32) -> Result<(), BfeError> {
    if index >= CHUNK_INDEX_LIMIT {
        return Err(FormatError::CapacityExceeded.into());
    }
    Ok(())
}

/// 加密单个数据块
pub fn encrypt_chunk(
    key: &SymmetricKey,
    base_nonce: &[u8; NONCE_SIZE],
    index: u32,
    plaintext: &[u8],
    header_aad: &[u8; HEADER_SIZE],
) -> Result<Vec<u8>, BfeError> {
    ChunkCipher::new(key, *base_nonce, *header_aad).encrypt_chunk(index, plaintext)
}

/// 解密单个数据块
pub fn decrypt_chunk(
    key: &SymmetricKey,
    base_nonce: &[u8; NONCE_SIZE],
    index: u32,
    ciphertext: &[u8],
    header_aad: &[u8; HEADER_SIZE],
) -> Result<Zeroizing<Vec<u8>>, BfeError> {
    ChunkCipher::new(key, *base_nonce, *header_aad).decrypt_chunk(index, ciphertext)
}
