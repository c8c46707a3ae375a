//! Password-based cipher compatible with Maven's settings encryption scheme.
//! Tokens decode to salt + pad-length byte + AES ciphertext + junk trailer,
//! so encrypted values from existing `settings.xml` files decrypt unchanged.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

const SALT_SIZE: usize = 8;
const CHUNK_SIZE: usize = 16;
const SPICE_SIZE: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
    #[error("payload too short to hold salt, pad length, and ciphertext")]
    TruncatedPayload,
    #[error("decryption failed: padding check rejected the ciphertext")]
    Decryption,
    #[error("decrypted bytes are not valid UTF-8: {0}")]
    Utf8(String),
}

/// Derives the AES-128 key and CBC IV from a password and an 8-byte salt.
/// One round of SHA-256 over `password || salt`, split 16/16 between key and
/// IV. The scheme never iterates the hash because a single SHA-256 digest
/// already fills both halves.
fn derive_key_iv(password: &str, salt: &[u8; SALT_SIZE]) -> ([u8; SPICE_SIZE], [u8; SPICE_SIZE]) {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let mut digest: [u8; 32] = hasher.finalize().into();

    let mut key = [0u8; SPICE_SIZE];
    let mut iv = [0u8; SPICE_SIZE];
    key.copy_from_slice(&digest[..SPICE_SIZE]);
    iv.copy_from_slice(&digest[SPICE_SIZE..]);
    digest.zeroize();
    (key, iv)
}

/// Decrypts a base64 payload (the part between the braces of an encrypted
/// token) with the given password. Wrong passwords surface as
/// `CipherError::Decryption`; the PKCS#7 padding verification is what detects
/// them, so a bad key never silently yields garbage plaintext.
pub fn decrypt64(payload: &str, password: &str) -> Result<String, CipherError> {
    let raw = STANDARD
        .decode(payload.trim().as_bytes())
        .map_err(|e| CipherError::Base64DecodeFailed(format!("{e}")))?;
    if raw.len() < SALT_SIZE + 1 {
        return Err(CipherError::TruncatedPayload);
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&raw[..SALT_SIZE]);
    let pad_len = raw[SALT_SIZE] as usize;
    let body = &raw[SALT_SIZE + 1..];
    if body.len() < pad_len {
        return Err(CipherError::TruncatedPayload);
    }
    let ciphertext = &body[..body.len() - pad_len];
    if ciphertext.is_empty() || ciphertext.len() % CHUNK_SIZE != 0 {
        return Err(CipherError::TruncatedPayload);
    }

    let (mut key, mut iv) = derive_key_iv(password, &salt);
    let result = Aes128CbcDec::new((&key).into(), (&iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::Decryption);
    key.zeroize();
    iv.zeroize();

    let clear = result?;
    String::from_utf8(clear).map_err(|e| CipherError::Utf8(format!("{e}")))
}

/// Encrypts a plaintext with a fresh random salt and junk trailer, producing
/// the base64 payload that goes between the braces of an encrypted token.
/// Counterpart of `mvn --encrypt-password`; also used to build test fixtures.
pub fn encrypt64(plaintext: &str, password: &str) -> Result<String, CipherError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut junk = [0u8; CHUNK_SIZE];
    OsRng.fill_bytes(&mut junk);
    Ok(encrypt_with_salt(plaintext, password, &salt, &junk))
}

/// Deterministic encryption core. The junk trailer pads the packed payload to
/// a chunk boundary and carries no information; its length is recorded in the
/// byte after the salt.
fn encrypt_with_salt(
    plaintext: &str,
    password: &str,
    salt: &[u8; SALT_SIZE],
    junk: &[u8; CHUNK_SIZE],
) -> String {
    let (mut key, mut iv) = derive_key_iv(password, salt);
    let ciphertext = Aes128CbcEnc::new((&key).into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    key.zeroize();
    iv.zeroize();

    let pad_len = CHUNK_SIZE - (SALT_SIZE + ciphertext.len() + 1) % CHUNK_SIZE;
    let mut packed = Vec::with_capacity(SALT_SIZE + 1 + ciphertext.len() + pad_len);
    packed.extend_from_slice(salt);
    packed.push(pad_len as u8);
    packed.extend_from_slice(&ciphertext);
    packed.extend_from_slice(&junk[..pad_len]);
    STANDARD.encode(packed)
}
