//! BFE 解密流程实现
//!
//! 解密流程（严格顺序）：
//! 1. 读取并校验 Header（magic / 版本号错误时立即失败，不做任何 KDF）
//! 2. 使用 Header 中的 salt + 参数 + 口令派生 AEAD key
//! 3. 解密文件名块
//! 4. 流式解密剩余数据，并核对明文总长度
//!
//! 注意：
//! - Header、文件名或任一 chunk 校验失败，立即报错，不输出部分结果
//! - `ContainerReader::open` 之后即可得知原始文件名，
//!   调用方可据此决定输出位置，再调用 `decrypt_to`

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::control::StreamControl;
use crate::crypto::aead::ChunkCipher;
use crate::crypto::kdf;
use crate::error::BfeError;
use crate::format::filename::{self, sanitize_filename};
use crate::format::header::ContainerHeader;
use crate::format::stream::StreamDecryptor;
use crate::fs::atomic::write_atomic;

/// 解密选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptOptions {
    /// 目标文件已存在时是否覆盖（仅路径版本使用）
    pub overwrite: bool,
}

/// 解密结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptSummary {
    pub header: ContainerHeader,
    /// 清洗后的原始文件名
    pub filename: String,
    pub bytes_written: u64,
    pub chunks: u32,
}

/// 内存解密结果
#[derive(Debug)]
pub struct DecryptedBuffer {
    pub filename: String,
    pub plaintext: Zeroizing<Vec<u8>>,
}

/// 已通过口令校验的容器
///
/// 持有 cipher（密钥派生结果），在 `decrypt_to` 结束或被 drop 时释放。
pub struct ContainerReader<R> {
    reader: R,
    header: ContainerHeader,
    cipher: ChunkCipher,
    filename: String,
}

impl<R: Read> ContainerReader<R> {
    /// 读取 Header、派生密钥并解密文件名
    pub fn open(mut reader: R, passphrase: &str) -> Result<Self, BfeError> {
        // ---------- 读取并校验 Header ----------
        let (header, header_bytes) = ContainerHeader::read(&mut reader)?;

        debug!(
            plaintext_size = header.plaintext_size,
            chunk_size = header.chunk_size,
            "container header parsed"
        );

        if passphrase.is_empty() {
            return Err(BfeError::InvalidInput("passphrase must not be empty"));
        }

        // ---------- KDF 派生密钥 ----------
        let cipher = {
            let key = kdf::derive_key(passphrase, &header.salt, &header.kdf)?;
            ChunkCipher::new(&key, header.base_nonce, header_bytes)
        };

        // ---------- 文件名 ----------
        let block = filename::read_filename_block(&mut reader)?;
        let filename = filename::decrypt_filename(&cipher, &block)?;

        Ok(Self {
            reader,
            header,
            cipher,
            filename,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// 未清洗的原始文件名，不可直接用作路径
    pub fn original_filename(&self) -> &str {
        &self.filename
    }

    /// 建议的保存文件名（已清洗）
    pub fn suggested_filename(&self) -> String {
        sanitize_filename(&self.filename)
    }

    /// 流式解密全部数据块并写入 writer
    pub fn decrypt_to<W: Write>(
        self,
        mut writer: W,
        control: &StreamControl<'_>,
    ) -> Result<DecryptSummary, BfeError> {
        let filename = sanitize_filename(&self.filename);
        let Self {
            reader,
            header,
            cipher,
            ..
        } = self;

        let mut decryptor = StreamDecryptor::new(cipher, header.chunk_size);
        let bytes_written = decryptor.decrypt(reader, &mut writer, header.plaintext_size, control)?;

        writer.flush()?;

        Ok(DecryptSummary {
            header,
            filename,
            bytes_written,
            chunks: decryptor.chunks_read(),
        })
    }
}

/// 流式解密：reader 为完整容器
pub fn decrypt_stream<R: Read, W: Write>(
    reader: R,
    passphrase: &str,
    writer: W,
    control: &StreamControl<'_>,
) -> Result<DecryptSummary, BfeError> {
    ContainerReader::open(reader, passphrase)?.decrypt_to(writer, control)
}

/// 解密到指定路径
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase: &str,
    options: &DecryptOptions,
    control: &StreamControl<'_>,
) -> Result<DecryptSummary, BfeError> {
    // 目标已知时先检查，避免白白做一次 KDF
    if !options.overwrite && output_path.exists() {
        return Err(BfeError::AlreadyExists(output_path.to_path_buf()));
    }

    let container = ContainerReader::open(BufReader::new(File::open(input_path)?), passphrase)?;
    let summary = write_container(container, output_path, options, control)?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = summary.bytes_written,
        "file decrypted"
    );

    Ok(summary)
}

/// 解密到目录，文件名取自容器中（清洗后）的原始文件名
pub fn decrypt_into_dir(
    input_path: &Path,
    output_dir: &Path,
    passphrase: &str,
    options: &DecryptOptions,
    control: &StreamControl<'_>,
) -> Result<(PathBuf, DecryptSummary), BfeError> {
    let container = ContainerReader::open(BufReader::new(File::open(input_path)?), passphrase)?;
    let output_path = output_dir.join(container.suggested_filename());
    let summary = write_container(container, &output_path, options, control)?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = summary.bytes_written,
        "file decrypted"
    );

    Ok((output_path, summary))
}

/// 内存解密
///
/// 会在内存中保留全部明文，仅作为兼容模式；大文件请使用流式接口。
pub fn decrypt_bytes(container: &[u8], passphrase: &str) -> Result<DecryptedBuffer, BfeError> {
    let reader = ContainerReader::open(container, passphrase)?;

    // 一次性预留：扩容会释放未清零的旧缓冲区。明文不可能长于容器本身
    let capacity = reader.header().plaintext_size.min(container.len() as u64) as usize;
    let mut plaintext = Zeroizing::new(Vec::with_capacity(capacity));
    let summary = reader.decrypt_to(&mut *plaintext, &StreamControl::new())?;

    Ok(DecryptedBuffer {
        filename: summary.filename,
        plaintext,
    })
}

/// 只读取 Header，不需要口令
pub fn read_header(input_path: &Path) -> Result<ContainerHeader, BfeError> {
    let (header, _) = ContainerHeader::read(BufReader::new(File::open(input_path)?))?;
    Ok(header)
}

fn write_container<R: Read>(
    container: ContainerReader<R>,
    output_path: &Path,
    options: &DecryptOptions,
    control: &StreamControl<'_>,
) -> Result<DecryptSummary, BfeError> {
    write_atomic(output_path, options.overwrite, |file| {
        let mut writer = BufWriter::new(file);
        let summary = container.decrypt_to(&mut writer, control)?;
        writer.flush()?;
        Ok(summary)
    })
}
