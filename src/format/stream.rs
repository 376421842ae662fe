//! BFE5 Stream 实现
//!
//! 负责文件名块之后的数据流部分。
//!
//! 职责范围：
//! - 将输入按固定 chunk_size 切片（只有最后一块可能更短）
//! - 每块独立加密，写为 `[u32 LE 密文长度][密文 || tag]`
//! - 解密时严格按索引顺序校验每个块，并核对明文总长度
//! - 每块之间检查取消标志并上报进度
//!
//! 设计前提与约束：
//! - 任意时刻只处理一个块：第 i 块写完后才读取第 i+1 块
//! - 内存占用为 O(chunk_size)，与文件大小无关
//! - 明文缓冲区在使用后立即清零
//! - 本模块不负责原子写入与路径处理

use std::io::{ErrorKind, Read, Write};

use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::control::StreamControl;
use crate::crypto::aead::{CHUNK_INDEX_LIMIT, ChunkCipher, TAG_SIZE};
use crate::error::{BfeError, FormatError};
use crate::progress::ProgressTracker;

// 每个 chunk 前的长度字段大小（u32，小端）
pub const LEN_SIZE: usize = 4;

/// 尽量读满 `buf`，返回实际读取的字节数；只有遇到 EOF 才会少于 `buf.len()`
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 加密缓冲区大小：不超过声明的总长度，但至少 1 字节，
/// 以便检测多出的输入
fn buffer_len(chunk_size: usize, total: u64) -> usize {
    let total = usize::try_from(total.max(1)).unwrap_or(usize::MAX);
    chunk_size.min(total)
}

/// 流式加密器
pub struct StreamEncryptor {
    cipher: ChunkCipher,
    chunk_size: usize,
    chunk_index: u32,
}

impl StreamEncryptor {
    pub fn new(cipher: ChunkCipher, chunk_size: u32) -> Self {
        Self {
            cipher,
            chunk_size: chunk_size as usize,
            chunk_index: 0,
        }
    }

    /// 已写出的块数
    pub fn chunks_written(&self) -> u32 {
        self.chunk_index
    }

    /// 从 reader 读取恰好 `total` 字节明文，加密后写入 writer
    ///
    /// 输入长度与 `total` 不一致时返回 `SizeMismatch`。
    pub fn encrypt<R: Read, W: Write>(
        &mut self,
        mut reader: R,
        mut writer: W,
        total: u64,
        control: &StreamControl<'_>,
    ) -> Result<u64, BfeError> {
        let mut buffer = Zeroizing::new(vec![0u8; buffer_len(self.chunk_size, total)]);
        let mut tracker = ProgressTracker::new(total, true);
        let mut processed: u64 = 0;

        loop {
            control.checkpoint()?;

            let read_len = read_full(&mut reader, &mut buffer)?;
            if read_len == 0 {
                break;
            }

            processed += read_len as u64;
            if processed > total {
                return Err(FormatError::SizeMismatch.into());
            }

            let ciphertext = self
                .cipher
                .encrypt_chunk(self.chunk_index, &buffer[..read_len]);
            buffer[..read_len].zeroize();
            let ciphertext = ciphertext?;

            writer.write_all(&(ciphertext.len() as u32).to_le_bytes())?;
            writer.write_all(&ciphertext)?;

            self.chunk_index += 1;
            control.report(&tracker.advance(read_len));
        }

        if processed != total {
            return Err(FormatError::SizeMismatch.into());
        }

        debug!(chunks = self.chunk_index, bytes = processed, "stream encrypted");
        Ok(processed)
    }
}

/// 流式解密器
pub struct StreamDecryptor {
    cipher: ChunkCipher,
    max_record_len: usize,
    chunk_index: u32,
}

impl StreamDecryptor {
    pub fn new(cipher: ChunkCipher, chunk_size: u32) -> Self {
        Self {
            cipher,
            max_record_len: chunk_size as usize + TAG_SIZE,
            chunk_index: 0,
        }
    }

    /// 已解密的块数
    pub fn chunks_read(&self) -> u32 {
        self.chunk_index
    }

    /// 从 reader 读取块记录，解密后写入 writer
    ///
    /// 明文总长度必须等于 Header 中声明的 `total`。
    pub fn decrypt<R: Read, W: Write>(
        &mut self,
        mut reader: R,
        mut writer: W,
        total: u64,
        control: &StreamControl<'_>,
    ) -> Result<u64, BfeError> {
        let mut tracker = ProgressTracker::new(total, false);
        let mut processed: u64 = 0;

        loop {
            control.checkpoint()?;

            // 在块边界处 EOF 视为正常结束
            let mut len_buf = [0u8; LEN_SIZE];
            match read_full(&mut reader, &mut len_buf)? {
                0 => break,
                LEN_SIZE => {}
                _ => return Err(FormatError::TruncatedChunk.into()),
            }

            if self.chunk_index >= CHUNK_INDEX_LIMIT {
                return Err(FormatError::CapacityExceeded.into());
            }

            let cipher_len = u32::from_le_bytes(len_buf) as usize;
            if cipher_len > self.max_record_len {
                return Err(FormatError::OversizedChunk.into());
            }

            let mut ciphertext = vec![0u8; cipher_len];
            reader.read_exact(&mut ciphertext).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => BfeError::Format(FormatError::TruncatedChunk),
                _ => BfeError::Io(e),
            })?;

            let plaintext = self.cipher.decrypt_chunk(self.chunk_index, &ciphertext)?;

            processed += plaintext.len() as u64;
            if processed > total {
                return Err(FormatError::SizeMismatch.into());
            }

            writer.write_all(&plaintext)?;

            self.chunk_index += 1;
            control.report(&tracker.advance(plaintext.len()));
        }

        if processed != total {
            return Err(FormatError::SizeMismatch.into());
        }

        debug!(chunks = self.chunk_index, bytes = processed, "stream decrypted");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::control::CancelToken;
    use crate::crypto::aead::NONCE_SIZE;
    use crate::crypto::kdf::{EncryptionParameters, SALT_SIZE, derive_key};
    use crate::format::header::HEADER_SIZE;
    use crate::progress::Progress;

    fn cipher() -> ChunkCipher {
        let params = EncryptionParameters::new(1, 64, 1).unwrap();
        let key = derive_key("stream", &[5u8; SALT_SIZE], &params).unwrap();
        ChunkCipher::new(&key, [6u8; NONCE_SIZE], [7u8; HEADER_SIZE])
    }

    fn encrypt(data: &[u8], chunk_size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        StreamEncryptor::new(cipher(), chunk_size)
            .encrypt(data, &mut out, data.len() as u64, &StreamControl::new())
            .unwrap();
        out
    }

    /// 一次只返回少量字节的 reader，用于验证短读会被补齐
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn records_are_length_prefixed_full_slices() {
        let data = vec![0x42u8; 25];
        let mut out = Vec::new();
        StreamEncryptor::new(cipher(), 10)
            .encrypt(Trickle(&data), &mut out, 25, &StreamControl::new())
            .unwrap();

        // 10 + 10 + 5
        let expected_lens = [26u32, 26, 21];
        let mut offset = 0;
        for len in expected_lens {
            let prefix = u32::from_le_bytes(out[offset..offset + 4].try_into().unwrap());
            assert_eq!(prefix, len);
            offset += 4 + len as usize;
        }
        assert_eq!(offset, out.len());
    }

    #[test]
    fn stream_roundtrip() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let container = encrypt(&data, 64);

        let mut out = Vec::new();
        let mut decryptor = StreamDecryptor::new(cipher(), 64);
        let n = decryptor
            .decrypt(&container[..], &mut out, 1000, &StreamControl::new())
            .unwrap();

        assert_eq!(n, 1000);
        assert_eq!(out, data);
        assert_eq!(decryptor.chunks_read(), 16);
    }

    #[test]
    fn empty_input_has_no_records() {
        assert!(encrypt(b"", 64).is_empty());

        let mut out = Vec::new();
        StreamDecryptor::new(cipher(), 64)
            .decrypt(&[][..], &mut out, 0, &StreamControl::new())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn size_mismatch_on_encrypt() {
        let mut out = Vec::new();
        let short = StreamEncryptor::new(cipher(), 8).encrypt(
            &b"abc"[..],
            &mut out,
            4,
            &StreamControl::new(),
        );
        assert!(matches!(short, Err(BfeError::Format(FormatError::SizeMismatch))));

        let long = StreamEncryptor::new(cipher(), 8).encrypt(
            &b"abcde"[..],
            &mut out,
            4,
            &StreamControl::new(),
        );
        assert!(matches!(long, Err(BfeError::Format(FormatError::SizeMismatch))));
    }

    #[test]
    fn buffer_is_bounded_by_input_size() {
        assert_eq!(buffer_len(u32::MAX as usize, 10), 10);
        assert_eq!(buffer_len(64, 1000), 64);
        assert_eq!(buffer_len(64, 0), 1);

        // 巨大 chunk_size 下小文件仍是单块
        let out = encrypt(b"ten bytes!", u32::MAX);
        assert_eq!(out.len(), LEN_SIZE + 10 + TAG_SIZE);
    }

    #[test]
    fn surplus_input_with_zero_total_is_rejected() {
        let mut out = Vec::new();
        let result = StreamEncryptor::new(cipher(), 8).encrypt(
            &b"x"[..],
            &mut out,
            0,
            &StreamControl::new(),
        );
        assert!(matches!(result, Err(BfeError::Format(FormatError::SizeMismatch))));
        assert!(out.is_empty());
    }

    #[test]
    fn dropped_trailing_chunk_is_detected() {
        let data = vec![1u8; 30];
        let container = encrypt(&data, 10);
        let cut = container.len() - (4 + 10 + TAG_SIZE);

        let result = StreamDecryptor::new(cipher(), 10).decrypt(
            &container[..cut],
            Vec::new(),
            30,
            &StreamControl::new(),
        );
        assert!(matches!(result, Err(BfeError::Format(FormatError::SizeMismatch))));
    }

    #[test]
    fn truncated_records_are_detected() {
        let container = encrypt(&[9u8; 20], 10);

        for cut in [container.len() - 1, container.len() - (10 + TAG_SIZE) - 2] {
            let result = StreamDecryptor::new(cipher(), 10).decrypt(
                &container[..cut],
                Vec::new(),
                20,
                &StreamControl::new(),
            );
            assert!(
                matches!(result, Err(BfeError::Format(FormatError::TruncatedChunk))),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn oversized_record_is_rejected_before_allocation() {
        let mut container = encrypt(&[9u8; 20], 10);
        container[..4].copy_from_slice(&u32::MAX.to_le_bytes());

        let result = StreamDecryptor::new(cipher(), 10).decrypt(
            &container[..],
            Vec::new(),
            20,
            &StreamControl::new(),
        );
        assert!(matches!(result, Err(BfeError::Format(FormatError::OversizedChunk))));
    }

    #[test]
    fn swapped_chunks_fail_authentication() {
        let container = encrypt(&[1u8; 20], 10);
        let record = 4 + 10 + TAG_SIZE;
        let mut swapped = container[record..].to_vec();
        swapped.extend_from_slice(&container[..record]);

        let result = StreamDecryptor::new(cipher(), 10).decrypt(
            &swapped[..],
            Vec::new(),
            20,
            &StreamControl::new(),
        );
        assert!(matches!(result, Err(BfeError::Authentication)));
    }

    #[test]
    fn cancellation_stops_between_chunks() {
        let token = CancelToken::new();
        let chunks = RefCell::new(0);
        let on_progress = |_: &Progress| {
            *chunks.borrow_mut() += 1;
            if *chunks.borrow() == 2 {
                token.cancel();
            }
        };
        let control = StreamControl::new()
            .with_cancel(&token)
            .with_progress(&on_progress);

        let data = vec![0u8; 100];
        let mut out = Vec::new();
        let mut encryptor = StreamEncryptor::new(cipher(), 10);
        let result = encryptor.encrypt(&data[..], &mut out, 100, &control);

        assert!(matches!(result, Err(BfeError::Cancelled)));
        assert_eq!(encryptor.chunks_written(), 2);
        assert_eq!(*chunks.borrow(), 2);
    }

    #[test]
    fn progress_reports_every_chunk() {
        let seen = RefCell::new(Vec::new());
        let on_progress = |p: &Progress| seen.borrow_mut().push((p.processed, p.eta.is_some()));
        let control = StreamControl::new().with_progress(&on_progress);

        let data = vec![3u8; 25];
        StreamEncryptor::new(cipher(), 10)
            .encrypt(&data[..], Vec::new(), 25, &control)
            .unwrap();

        assert_eq!(*seen.borrow(), vec![(10, true), (20, true), (25, true)]);
    }
}
