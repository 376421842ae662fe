//! BFE 加密流程实现
//!
//! 加密流程（严格顺序）：
//! 1. 校验参数（口令、chunk_size、KDF 参数、文件名、块数上限），
//!    此时尚未做任何 KDF 计算
//! 2. 生成 salt 与 base_nonce
//! 3. 使用 KDF 从口令派生 AEAD key
//! 4. 写入 Header 与加密文件名块
//! 5. 使用 StreamEncryptor 对内容进行流式加密
//!
//! 注意：
//! - 路径版本通过 `fs::atomic` 写出，失败或取消时不留下半截文件
//! - 不做 UI / 口令输入

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::{RngCore, rngs::OsRng};
use tracing::{debug, info};

use crate::control::StreamControl;
use crate::crypto::aead::{CHUNK_INDEX_LIMIT, ChunkCipher, NONCE_SIZE};
use crate::crypto::kdf::{self, EncryptionParameters, SALT_SIZE};
use crate::error::{BfeError, FormatError};
use crate::format::filename::{self, MAX_FILENAME_LEN};
use crate::format::header::{self, ContainerHeader, DEFAULT_CHUNK_SIZE};
use crate::format::stream::StreamEncryptor;
use crate::fs::atomic::write_atomic;

/// 加密选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    pub params: EncryptionParameters,
    pub chunk_size: u32,
    /// 目标文件已存在时是否覆盖（仅路径版本使用）
    pub overwrite: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            params: EncryptionParameters::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
        }
    }
}

/// 加密结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptSummary {
    pub header: ContainerHeader,
    pub chunks: u32,
}

/// 流式加密：从 reader 读取恰好 `plaintext_size` 字节，写出完整容器
pub fn encrypt_stream<R: Read, W: Write>(
    reader: R,
    plaintext_size: u64,
    filename: &str,
    passphrase: &str,
    mut writer: W,
    options: &EncryptOptions,
    control: &StreamControl<'_>,
) -> Result<EncryptSummary, BfeError> {
    validate(plaintext_size, filename, passphrase, options)?;
    control.checkpoint()?;

    // ---------- 生成 salt 与 base nonce ----------
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let mut base_nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut base_nonce);

    let header = ContainerHeader::new(
        options.params,
        salt,
        base_nonce,
        plaintext_size,
        options.chunk_size,
    );
    let header_bytes = header.to_bytes();

    // ---------- KDF 派生密钥 ----------
    // key 只用于构造 cipher，离开作用域即清零
    let cipher = {
        let key = kdf::derive_key(passphrase, &salt, &options.params)?;
        ChunkCipher::new(&key, base_nonce, header_bytes)
    };

    // ---------- Header + 文件名块 ----------
    let encrypted_name = filename::encrypt_filename(&cipher, filename)?;
    writer.write_all(&header_bytes)?;
    filename::write_filename_block(&mut writer, &encrypted_name)?;

    debug!(
        plaintext_size,
        chunk_size = options.chunk_size,
        chunks = header.chunk_count(),
        "container header written"
    );

    // ---------- Stream 加密 ----------
    let mut encryptor = StreamEncryptor::new(cipher, options.chunk_size);
    encryptor.encrypt(reader, &mut writer, plaintext_size, control)?;

    writer.flush()?;

    Ok(EncryptSummary {
        header,
        chunks: encryptor.chunks_written(),
    })
}

/// 使用口令加密文件
///
/// 容器中记录的文件名为输入文件的文件名。
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase: &str,
    options: &EncryptOptions,
    control: &StreamControl<'_>,
) -> Result<EncryptSummary, BfeError> {
    let input = File::open(input_path)?;
    let plaintext_size = input.metadata()?.len();

    let name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let summary = write_atomic(output_path, options.overwrite, |file| {
        let mut writer = BufWriter::new(file);
        let summary = encrypt_stream(
            BufReader::new(input),
            plaintext_size,
            &name,
            passphrase,
            &mut writer,
            options,
            control,
        )?;
        writer.flush()?;
        Ok(summary)
    })?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = plaintext_size,
        chunks = summary.chunks,
        "file encrypted"
    );

    Ok(summary)
}

/// 内存版本，适合小数据与测试
pub fn encrypt_bytes(
    plaintext: &[u8],
    filename: &str,
    passphrase: &str,
    options: &EncryptOptions,
) -> Result<Vec<u8>, BfeError> {
    let mut out = Vec::new();
    encrypt_stream(
        plaintext,
        plaintext.len() as u64,
        filename,
        passphrase,
        &mut out,
        options,
        &StreamControl::new(),
    )?;
    Ok(out)
}

/// 加密输出的建议文件名：清洗后的原文件名 + `.bfe`
pub fn suggested_output_name(input_name: &str) -> String {
    format!("{}.bfe", filename::sanitize_filename(input_name))
}

fn validate(
    plaintext_size: u64,
    filename: &str,
    passphrase: &str,
    options: &EncryptOptions,
) -> Result<(), BfeError> {
    if passphrase.is_empty() {
        return Err(BfeError::InvalidInput("passphrase must not be empty"));
    }
    if options.chunk_size == 0 {
        return Err(BfeError::InvalidInput("chunk size must be positive"));
    }
    options.params.validate()?;

    if filename.len() > MAX_FILENAME_LEN {
        return Err(BfeError::FilenameTooLong(filename.len()));
    }

    if header::chunk_count(plaintext_size, options.chunk_size) > u64::from(CHUNK_INDEX_LIMIT) {
        return Err(FormatError::CapacityExceeded.into());
    }

    Ok(())
}
