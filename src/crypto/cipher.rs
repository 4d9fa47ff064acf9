//! AES-256-GCM 加解密
//!
//! 输出格式: `nonce(12) || ciphertext || tag(16)`，无长度前缀，无附加数据。
//! 每次加密都生成新的随机 nonce。

use super::{CryptoError, Result, KEY_LEN, NONCE_LEN, TAG_LEN};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        got: key.len(),
    })
}

/// 加密数据
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm 返回的密文末尾已附带认证标签
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// 解密数据，标签校验失败返回 `AuthenticationFailed`
pub fn decrypt(blob: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated { len: blob.len() });
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [b'x'; 32];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for plaintext in [&b""[..], b"a", b"hello photo bytes", &[0u8; 4096][..]] {
            let blob = encrypt(plaintext, &KEY).unwrap();
            assert_eq!(blob.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
            assert_eq!(decrypt(&blob, &KEY).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let a = encrypt(b"same input", &KEY).unwrap();
        let b = encrypt(b"same input", &KEY).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt(b"secret", &KEY).unwrap();
        let other = [b'y'; 32];
        assert_eq!(
            decrypt(&blob, &other).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_single_byte_flip_detected() {
        let blob = encrypt(b"tamper with me", &KEY).unwrap();
        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            assert!(decrypt(&tampered, &KEY).is_err(), "byte {} flip not detected", i);
        }
    }

    #[test]
    fn test_invalid_key_length() {
        assert_eq!(
            encrypt(b"data", b"short").unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                got: 5
            }
        );
        assert!(matches!(
            decrypt(&[0u8; 64], &[0u8; 16]),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_truncated_blob() {
        assert_eq!(
            decrypt(&[0u8; 27], &KEY).unwrap_err(),
            CryptoError::Truncated { len: 27 }
        );
        assert_eq!(
            decrypt(&[], &KEY).unwrap_err(),
            CryptoError::Truncated { len: 0 }
        );
    }
}
