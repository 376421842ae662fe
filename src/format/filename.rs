//! 加密文件名块
//!
//! 布局：`[u16 LE 长度][密文 || tag]`，紧跟在 70 字节 Header 之后。
//! 使用保留 nonce 索引 0xFFFFFFFF 加密，AAD 为固定 Header，
//! 因此文件名与具体容器实例绑定，无法在容器之间互换。

use std::io::{Read, Write};

use crate::crypto::aead::{ChunkCipher, TAG_SIZE};
use crate::error::{BfeError, FormatError};

/// 文件名明文最大长度（UTF-8 字节）
pub const MAX_FILENAME_LEN: usize = 4096;

/// 清洗后为空时使用的文件名
pub const DEFAULT_FILENAME: &str = "decrypted.bin";

/// 加密文件名，返回文件名块的密文部分
pub fn encrypt_filename(cipher: &ChunkCipher, name: &str) -> Result<Vec<u8>, BfeError> {
    if name.len() > MAX_FILENAME_LEN {
        return Err(BfeError::FilenameTooLong(name.len()));
    }
    cipher.seal_filename(name.as_bytes())
}

/// 解密文件名块，返回原始（未清洗）文件名
pub fn decrypt_filename(cipher: &ChunkCipher, block: &[u8]) -> Result<String, BfeError> {
    let plain = cipher.open_filename(block)?;
    Ok(String::from_utf8_lossy(&plain).into_owned())
}

pub fn write_filename_block<W: Write>(mut writer: W, encrypted: &[u8]) -> Result<(), BfeError> {
    // MAX_FILENAME_LEN + TAG_SIZE 远小于 u16::MAX
    let len = u16::try_from(encrypted.len())
        .map_err(|_| BfeError::FilenameTooLong(encrypted.len()))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(encrypted)?;
    Ok(())
}

pub fn read_filename_block<R: Read>(mut reader: R) -> Result<Vec<u8>, BfeError> {
    let mut len_buf = [0u8; 2];
    read_exact_or(&mut reader, &mut len_buf)?;

    let len = usize::from(u16::from_le_bytes(len_buf));
    if len < TAG_SIZE {
        return Err(BfeError::Authentication);
    }

    let mut block = vec![0u8; len];
    read_exact_or(&mut reader, &mut block)?;
    Ok(block)
}

fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), BfeError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BfeError::Format(FormatError::TruncatedHeader),
        _ => BfeError::Io(e),
    })
}

/// 清洗解密出的文件名，仅用于建议保存路径
///
/// 去除 `../`、`..\`、路径分隔符与 Windows 保留字符、控制字符；
/// 结果为空、`.` 或 `..` 时回退到 `decrypted.bin`。
pub fn sanitize_filename(name: &str) -> String {
    let without_traversal = name.replace("../", "").replace("..\\", "");

    let cleaned: String = without_traversal
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !matches!(*c, '\u{00}'..='\u{1F}' | '\u{7F}'))
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => DEFAULT_FILENAME.to_string(),
        trimmed => trimmed.to_string(),
    }
}
