//! 文本加密模式
//!
//! 输出为 base64 编码的 JSON：
//!
//! ```text
//! {"kdf":"argon2id","params":{"t":3,"m":65536,"p":2},"salt":[..],"iv":[..],"data":[..]}
//! ```
//!
//! AAD = `"BFE-TEXT\0"` + 不含 `data` 的 JSON（键顺序 kdf、params、salt、iv），
//! 因此 KDF 参数、salt、iv 任意被改动都会导致认证失败。

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::aead::NONCE_SIZE;
use crate::crypto::kdf::{self, EncryptionParameters, SALT_SIZE};
use crate::error::{BfeError, FormatError};

const AAD_PREFIX: &[u8] = b"BFE-TEXT\0";
const KDF_NAME: &str = "argon2id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TextKdfParams {
    t: u32,
    m: u32,
    p: u32,
}

impl From<&EncryptionParameters> for TextKdfParams {
    fn from(params: &EncryptionParameters) -> Self {
        Self {
            t: params.time_cost,
            m: params.memory_cost_kib,
            p: u32::from(params.parallelism),
        }
    }
}

impl TryFrom<TextKdfParams> for EncryptionParameters {
    type Error = BfeError;

    fn try_from(params: TextKdfParams) -> Result<Self, Self::Error> {
        let parallelism = u8::try_from(params.p).map_err(|_| FormatError::MalformedText)?;
        EncryptionParameters::new(params.t, params.m, parallelism)
            .map_err(|_| FormatError::MalformedText.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TextMeta {
    kdf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<TextKdfParams>,
    salt: Vec<u8>,
    iv: Vec<u8>,
}

impl TextMeta {
    fn aad(&self) -> Result<Vec<u8>, BfeError> {
        let json = serde_json::to_vec(self).map_err(|_| BfeError::Internal)?;
        let mut aad = Vec::with_capacity(AAD_PREFIX.len() + json.len());
        aad.extend_from_slice(AAD_PREFIX);
        aad.extend_from_slice(&json);
        Ok(aad)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TextEnvelope {
    #[serde(flatten)]
    meta: TextMeta,
    data: Vec<u8>,
}

/// 加密一段文本，返回 base64 字符串
pub fn encrypt_text(
    text: &str,
    passphrase: &str,
    params: &EncryptionParameters,
) -> Result<String, BfeError> {
    if text.is_empty() || passphrase.is_empty() {
        return Err(BfeError::InvalidInput("text and passphrase are required"));
    }

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let meta = TextMeta {
        kdf: KDF_NAME.to_string(),
        params: Some(params.into()),
        salt: salt.to_vec(),
        iv: iv.to_vec(),
    };
    let aad = meta.aad()?;

    let cipher = {
        let key = kdf::derive_key(passphrase, &salt, params)?;
        Aes256Gcm::new(key.as_bytes().into())
    };

    let data = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: text.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|_| BfeError::Internal)?;

    let json =
        serde_json::to_string(&TextEnvelope { meta, data }).map_err(|_| BfeError::Internal)?;
    debug!(ciphertext_len = json.len(), "text encrypted");

    Ok(STANDARD.encode(json))
}

/// 解密 `encrypt_text` 的输出
pub fn decrypt_text(encoded: &str, passphrase: &str) -> Result<Zeroizing<String>, BfeError> {
    if encoded.trim().is_empty() || passphrase.is_empty() {
        return Err(BfeError::InvalidInput("encrypted text and passphrase are required"));
    }

    let json = STANDARD
        .decode(encoded.trim())
        .map_err(|_| FormatError::MalformedText)?;
    let envelope: TextEnvelope =
        serde_json::from_slice(&json).map_err(|_| FormatError::MalformedText)?;
    let meta = envelope.meta;

    if meta.kdf != KDF_NAME {
        return Err(FormatError::MalformedText.into());
    }

    let params = match meta.params {
        Some(p) => EncryptionParameters::try_from(p)?,
        None => EncryptionParameters::default(),
    };

    let salt: [u8; SALT_SIZE] = meta
        .salt
        .as_slice()
        .try_into()
        .map_err(|_| FormatError::MalformedText)?;
    let iv: [u8; NONCE_SIZE] = meta
        .iv
        .as_slice()
        .try_into()
        .map_err(|_| FormatError::MalformedText)?;

    let aad = meta.aad()?;

    let cipher = {
        let key = kdf::derive_key(passphrase, &salt, &params)?;
        Aes256Gcm::new(key.as_bytes().into())
    };

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &envelope.data,
                aad: &aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| BfeError::Authentication)?;

    Ok(Zeroizing::new(String::from_utf8_lossy(&plaintext).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> EncryptionParameters {
        EncryptionParameters::new(1, 64, 1).unwrap()
    }

    fn envelope(encoded: &str) -> serde_json::Value {
        serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap()
    }

    fn reencode(value: &serde_json::Value) -> String {
        STANDARD.encode(serde_json::to_string(value).unwrap())
    }

    #[test]
    fn text_roundtrip() {
        let encoded = encrypt_text("meet at noon ✓", "pw", &fast()).unwrap();
        let decoded = decrypt_text(&encoded, "pw").unwrap();
        assert_eq!(decoded.as_str(), "meet at noon ✓");
    }

    #[test]
    fn envelope_layout() {
        let encoded = encrypt_text("x", "pw", &fast()).unwrap();
        let json = String::from_utf8(STANDARD.decode(&encoded).unwrap()).unwrap();
        assert!(json.starts_with(r#"{"kdf":"argon2id","params":{"t":1,"m":64,"p":1},"salt":["#));

        let value = envelope(&encoded);
        assert_eq!(value["salt"].as_array().unwrap().len(), 32);
        assert_eq!(value["iv"].as_array().unwrap().len(), 12);
        assert_eq!(value["data"].as_array().unwrap().len(), 1 + 16);
    }

    #[test]
    fn aad_json_key_order() {
        let meta = TextMeta {
            kdf: KDF_NAME.to_string(),
            params: Some(TextKdfParams { t: 3, m: 65536, p: 2 }),
            salt: vec![1, 2],
            iv: vec![3],
        };
        let aad = meta.aad().unwrap();
        assert_eq!(
            aad,
            b"BFE-TEXT\0{\"kdf\":\"argon2id\",\"params\":{\"t\":3,\"m\":65536,\"p\":2},\"salt\":[1,2],\"iv\":[3]}"
        );
    }

    #[test]
    fn wrong_passphrase_fails() {
        let encoded = encrypt_text("secret", "right", &fast()).unwrap();
        assert!(matches!(
            decrypt_text(&encoded, "wrong"),
            Err(BfeError::Authentication)
        ));
    }

    #[test]
    fn metadata_is_authenticated() {
        let encoded = encrypt_text("secret", "pw", &fast()).unwrap();
        let mut value = envelope(&encoded);
        let first = value["iv"][0].as_u64().unwrap();
        value["iv"][0] = serde_json::json!((first + 1) % 256);

        assert!(matches!(
            decrypt_text(&reencode(&value), "pw"),
            Err(BfeError::Authentication)
        ));
    }

    #[test]
    fn unsupported_kdf_and_garbage_are_malformed() {
        let encoded = encrypt_text("secret", "pw", &fast()).unwrap();
        let mut value = envelope(&encoded);
        value["kdf"] = serde_json::json!("scrypt");

        assert!(matches!(
            decrypt_text(&reencode(&value), "pw"),
            Err(BfeError::Format(FormatError::MalformedText))
        ));
        assert!(matches!(
            decrypt_text("not base64 at all!", "pw"),
            Err(BfeError::Format(FormatError::MalformedText))
        ));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            encrypt_text("", "pw", &fast()),
            Err(BfeError::InvalidInput(_))
        ));
        assert!(matches!(
            decrypt_text("abc", ""),
            Err(BfeError::InvalidInput(_))
        ));
    }
}
