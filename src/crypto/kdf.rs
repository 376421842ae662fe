//! BFE 密钥派生函数（KDF）模块
//!
//! 通过 Argon2id 将用户口令派生为 AES-256-GCM 使用的对称密钥。
//!
//! 设计目标：
//! - 抵抗暴力破解、GPU / ASIC 攻击
//! - 每个容器使用独立的随机 salt，参数写入 Header，解密时可复现
//! - Argon2 工作内存预先以可失败方式申请，内存不足时返回
//!   `ResourceExhaustion`，而不是让进程直接中止
//! - 派生出的密钥与 Argon2 工作内存在离开作用域后清零
//!
//! 输出：
//! - 32 字节密钥（`SymmetricKey`）

use argon2::{Algorithm, Argon2, Block, Params, Version};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::error::BfeError;

/// 派生密钥长度（256-bit）
pub const KEY_LEN: usize = 32;

/// salt 长度（字节）
pub const SALT_SIZE: usize = 32;

/// 默认时间成本（迭代次数）
pub const DEFAULT_TIME_COST: u32 = 3;

/// 默认内存成本：64 MiB
pub const DEFAULT_MEMORY_COST_KIB: u32 = 64 * 1024;

/// 默认并行度
pub const DEFAULT_PARALLELISM: u8 = 2;

/// KDF 算法标识。BFE5 只定义了 Argon2id。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfAlgorithm {
    Argon2id,
}

/// KDF 参数，随容器一同保存。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionParameters {
    pub algorithm: KdfAlgorithm,
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u8,
}

impl Default for EncryptionParameters {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            time_cost: DEFAULT_TIME_COST,
            memory_cost_kib: DEFAULT_MEMORY_COST_KIB,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl EncryptionParameters {
    /// 创建并校验 Argon2id 参数
    pub fn new(time_cost: u32, memory_cost_kib: u32, parallelism: u8) -> Result<Self, BfeError> {
        let params = Self {
            algorithm: KdfAlgorithm::Argon2id,
            time_cost,
            memory_cost_kib,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), BfeError> {
        if self.time_cost == 0 {
            return Err(BfeError::InvalidParameters("time cost must be positive"));
        }
        if self.memory_cost_kib == 0 {
            return Err(BfeError::InvalidParameters("memory cost must be positive"));
        }
        if self.parallelism == 0 {
            return Err(BfeError::InvalidParameters("parallelism must be at least 1"));
        }
        Ok(())
    }

    fn argon2_params(&self) -> Result<Params, BfeError> {
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            u32::from(self.parallelism),
            Some(KEY_LEN),
        )
        .map_err(|e| BfeError::KeyDerivation(e.to_string()))
    }
}

/// 对称密钥
///
/// 只能交给 AEAD 使用；drop 时自动清零。
pub struct SymmetricKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// 根据口令、salt 与参数派生对称密钥
///
/// #### 错误
/// - 参数非法：`InvalidParameters` / `KeyDerivation`
/// - 无法申请 Argon2 工作内存：`ResourceExhaustion`
/// - 其它 Argon2 内部错误：`KeyDerivation`
pub fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    params: &EncryptionParameters,
) -> Result<SymmetricKey, BfeError> {
    params.validate()?;
    let argon2_params = params.argon2_params()?;

    let mut blocks = allocate_blocks(argon2_params.block_count(), params.memory_cost_kib)?;

    debug!(
        time_cost = params.time_cost,
        memory_cost_kib = params.memory_cost_kib,
        parallelism = params.parallelism,
        "deriving key with Argon2id"
    );

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    let result = argon2.hash_password_into_with_memory(
        passphrase.as_bytes(),
        salt,
        &mut key[..],
        &mut blocks[..],
    );

    // 工作内存里残留口令派生的中间状态
    blocks.zeroize();

    result.map_err(|e| BfeError::KeyDerivation(e.to_string()))?;

    Ok(SymmetricKey { bytes: key })
}

/// 以可失败方式申请 Argon2 工作内存
fn allocate_blocks(count: usize, requested_kib: u32) -> Result<Vec<Block>, BfeError> {
    let mut blocks = Vec::new();
    blocks
        .try_reserve_exact(count)
        .map_err(|_| BfeError::ResourceExhaustion { requested_kib })?;
    blocks.resize(count, Block::default());
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> EncryptionParameters {
        EncryptionParameters::new(1, 64, 1).unwrap()
    }

    #[test]
    fn defaults_match_protocol() {
        let params = EncryptionParameters::default();
        assert_eq!(params.algorithm, KdfAlgorithm::Argon2id);
        assert_eq!(params.time_cost, 3);
        assert_eq!(params.memory_cost_kib, 65536);
        assert_eq!(params.parallelism, 2);
    }

    #[test]
    fn derive_is_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let a = derive_key("correct horse", &salt, &fast_params()).unwrap();
        let b = derive_key("correct horse", &salt, &fast_params()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_passphrase_or_salt_changes_key() {
        let params = fast_params();
        let base = derive_key("passphrase-a", &[1u8; SALT_SIZE], &params).unwrap();
        let other_pass = derive_key("passphrase-b", &[1u8; SALT_SIZE], &params).unwrap();
        let other_salt = derive_key("passphrase-a", &[2u8; SALT_SIZE], &params).unwrap();

        assert_ne!(base.as_bytes(), other_pass.as_bytes());
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn zero_costs_are_rejected() {
        assert!(matches!(
            EncryptionParameters::new(0, 64, 1),
            Err(BfeError::InvalidParameters(_))
        ));
        assert!(matches!(
            EncryptionParameters::new(1, 0, 1),
            Err(BfeError::InvalidParameters(_))
        ));
        assert!(matches!(
            EncryptionParameters::new(1, 64, 0),
            Err(BfeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn memory_below_argon2_minimum_is_kdf_failure() {
        // Argon2 要求 memory >= 8 * parallelism KiB
        let params = EncryptionParameters::new(1, 8, 4).unwrap();
        let err = derive_key("pw", &[0u8; SALT_SIZE], &params).unwrap_err();
        assert!(matches!(err, BfeError::KeyDerivation(_)));
    }

    #[test]
    fn unreservable_memory_is_resource_exhaustion() {
        let err = allocate_blocks(usize::MAX / 64, 42).unwrap_err();
        assert!(matches!(
            err,
            BfeError::ResourceExhaustion { requested_kib: 42 }
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = derive_key("pw", &[3u8; SALT_SIZE], &fast_params()).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
    }
}
