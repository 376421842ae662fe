//! BFE5 Header 实现
//!
//! Header 的职责：
//! - 标识文件类型（magic "BFE5"）
//! - 指明版本号（5）
//! - 保存 Argon2id 参数与 salt，使解密端能复现密钥
//! - 提供 Stream 所需的 base_nonce
//! - 记录明文总长度与 chunk_size
//!
//! 70 字节固定 Header 原样作为文件名块与每个数据块的 AAD。
//! 所有多字节整数均为小端序，任何平台对相同输入生成完全相同的字节。
//!
//! 固定布局：
//!
//! ```text
//! 0   4  magic
//! 4   1  version
//! 5   4  time cost
//! 9   4  memory cost (KiB)
//! 13  1  parallelism
//! 14  32 salt
//! 46  12 base nonce
//! 58  8  plaintext size
//! 66  4  chunk size
//! ```

use std::io::{Read, Write};

use crate::crypto::aead::NONCE_SIZE;
use crate::crypto::kdf::{EncryptionParameters, KdfAlgorithm, SALT_SIZE};
use crate::error::{BfeError, FormatError};
use crate::format::stream::read_full;

/// BFE5 文件魔数（ASCII）
pub const MAGIC: &[u8; 4] = b"BFE5";

/// 当前支持的版本号
pub const VERSION: u8 = 5;

/// 固定 Header 大小
pub const HEADER_SIZE: usize = 4 + 1 + 4 + 4 + 1 + SALT_SIZE + NONCE_SIZE + 8 + 4;

/// 默认明文 chunk 大小：1 MiB
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

const TIME_COST_OFFSET: usize = 5;
const MEMORY_COST_OFFSET: usize = 9;
const PARALLELISM_OFFSET: usize = 13;
const SALT_OFFSET: usize = 14;
const NONCE_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
const PLAINTEXT_SIZE_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
const CHUNK_SIZE_OFFSET: usize = PLAINTEXT_SIZE_OFFSET + 8;

/// BFE5 Header 结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u8,
    pub kdf: EncryptionParameters,
    pub salt: [u8; SALT_SIZE],
    pub base_nonce: [u8; NONCE_SIZE],
    pub plaintext_size: u64,
    pub chunk_size: u32,
}

impl ContainerHeader {
    /// 创建新的 v5 Header（加密时调用）
    pub fn new(
        kdf: EncryptionParameters,
        salt: [u8; SALT_SIZE],
        base_nonce: [u8; NONCE_SIZE],
        plaintext_size: u64,
        chunk_size: u32,
    ) -> Self {
        Self {
            version: VERSION,
            kdf,
            salt,
            base_nonce,
            plaintext_size,
            chunk_size,
        }
    }

    /// 序列化为 70 字节
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];

        out[..4].copy_from_slice(MAGIC);
        out[4] = self.version;
        out[TIME_COST_OFFSET..MEMORY_COST_OFFSET]
            .copy_from_slice(&self.kdf.time_cost.to_le_bytes());
        out[MEMORY_COST_OFFSET..PARALLELISM_OFFSET]
            .copy_from_slice(&self.kdf.memory_cost_kib.to_le_bytes());
        out[PARALLELISM_OFFSET] = self.kdf.parallelism;
        out[SALT_OFFSET..NONCE_OFFSET].copy_from_slice(&self.salt);
        out[NONCE_OFFSET..PLAINTEXT_SIZE_OFFSET].copy_from_slice(&self.base_nonce);
        out[PLAINTEXT_SIZE_OFFSET..CHUNK_SIZE_OFFSET]
            .copy_from_slice(&self.plaintext_size.to_le_bytes());
        out[CHUNK_SIZE_OFFSET..].copy_from_slice(&self.chunk_size.to_le_bytes());

        out
    }

    /// 明文对应的数据块个数
    pub fn chunk_count(&self) -> u64 {
        chunk_count(self.plaintext_size, self.chunk_size)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// 从输入流读取并解析 Header
    ///
    /// 同时返回原始 70 字节，供后续作为 AAD 使用。
    pub fn read<R: Read>(mut reader: R) -> Result<(Self, [u8; HEADER_SIZE]), BfeError> {
        let mut raw = [0u8; HEADER_SIZE];
        let n = read_full(&mut reader, &mut raw)?;
        let header = parse_header(&raw[..n])?;
        Ok((header, raw))
    }
}

/// 按参数直接构造 70 字节 Header
pub fn build_header(
    params: &EncryptionParameters,
    salt: &[u8; SALT_SIZE],
    base_nonce: &[u8; NONCE_SIZE],
    plaintext_size: u64,
    chunk_size: u32,
) -> [u8; HEADER_SIZE] {
    ContainerHeader::new(*params, *salt, *base_nonce, plaintext_size, chunk_size).to_bytes()
}

/// 解析 Header
///
/// magic 与版本号优先校验，不足 70 字节的输入只有在这两项通过后
/// 才报告 `TruncatedHeader`。
pub fn parse_header(bytes: &[u8]) -> Result<ContainerHeader, FormatError> {
    if !bytes.starts_with(MAGIC) {
        return Err(FormatError::BadMagic);
    }

    let version = *bytes.get(4).ok_or(FormatError::TruncatedHeader)?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let bytes: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(FormatError::TruncatedHeader)?;

    let kdf = EncryptionParameters {
        algorithm: KdfAlgorithm::Argon2id,
        time_cost: u32::from_le_bytes(field(bytes, TIME_COST_OFFSET)),
        memory_cost_kib: u32::from_le_bytes(field(bytes, MEMORY_COST_OFFSET)),
        parallelism: bytes[PARALLELISM_OFFSET],
    };
    if kdf.validate().is_err() {
        return Err(FormatError::InvalidKdfParameters);
    }

    let chunk_size = u32::from_le_bytes(field(bytes, CHUNK_SIZE_OFFSET));
    if chunk_size == 0 {
        return Err(FormatError::InvalidChunkSize);
    }

    Ok(ContainerHeader {
        version,
        kdf,
        salt: field(bytes, SALT_OFFSET),
        base_nonce: field(bytes, NONCE_OFFSET),
        plaintext_size: u64::from_le_bytes(field(bytes, PLAINTEXT_SIZE_OFFSET)),
        chunk_size,
    })
}

pub(crate) fn chunk_count(plaintext_size: u64, chunk_size: u32) -> u64 {
    plaintext_size.div_ceil(u64::from(chunk_size.max(1)))
}

fn field<const N: usize>(bytes: &[u8; HEADER_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
