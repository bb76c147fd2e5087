#![allow(dead_code)]
//! Thin wrappers over the primitive crates this crate treats as already
//! trustworthy: hashing, HMAC, HKDF and AEAD. Kept in one place so every
//! caller goes through the same error mapping instead of matching on
//! crate-specific error types.

use anyhow::Result;

use hmac::Mac;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn hkdf_sha256(salt: &[u8], secret: &[u8], info: &[u8], size: usize) -> Result<Vec<u8>> {
    let hk = hkdf::Hkdf::<Sha256>::new(Some(salt), secret);
    let mut okm = vec![0u8; size];
    match hk.expand(info, &mut okm) {
        Ok(()) => Ok(okm),
        Err(e) => Err(anyhow::anyhow!(format!("hkdf error {:?}", e))),
    }
}

pub fn hmac_sha256(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if let Ok(mut hm) = hmac::Hmac::<Sha256>::new_from_slice(key) {
        hm.update(data);
        Ok(hm.finalize().into_bytes().to_vec())
    } else {
        Err(anyhow::anyhow!(format!("can't create hmac {:?}", key)))
    }
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn sha1_enc(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Constant-time byte equality, used for confirmation values, resumption
/// MICs and any other secret-derived comparison (spec §4.3/§4.4/§9).
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

type Aes128Ccm = ccm::Ccm<aes::Aes128, ccm::consts::U16, ccm::consts::U13>;

pub fn aes128_ccm_encrypt(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let key = aes::cipher::crypto_common::Key::<Aes128Ccm>::from_slice(key);
    let cipher = <Aes128Ccm as ccm::KeyInit>::new(key);
    match ccm::aead::Aead::encrypt(
        &cipher,
        aes::cipher::generic_array::GenericArray::from_slice(nonce),
        ccm::aead::Payload { msg, aad },
    ) {
        Ok(o) => Ok(o),
        Err(e) => Err(anyhow::anyhow!("encrypt error {:?}", e)),
    }
}

pub fn aes128_ccm_decrypt(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let key = aes::cipher::crypto_common::Key::<Aes128Ccm>::from_slice(key);
    let cipher = <Aes128Ccm as ccm::KeyInit>::new(key);
    match ccm::aead::Aead::decrypt(
        &cipher,
        aes::cipher::generic_array::GenericArray::from_slice(nonce),
        ccm::aead::Payload { msg, aad },
    ) {
        Ok(o) => Ok(o),
        Err(e) => Err(anyhow::anyhow!(format!("decrypt error {:?}", e))),
    }
}

/// Decode the payload of a PEM block (certificate or key) carried as an
/// in-memory string; this crate never touches the filesystem itself.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    Ok(pem::parse(pem)?.contents().to_vec())
}

pub fn der_to_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, der.to_vec()))
}

/// Encode an EC private key as RFC 5915 `ECPrivateKey` DER. Test fixtures
/// need this to turn a raw `p256::SecretKey` into a PEM an operational-key
/// holder can load.
pub fn secret_key_to_rfc5915(key: &p256::SecretKey) -> Result<Vec<u8>> {
    let mut enc = crate::util::asn1::Encoder::new();
    enc.start_seq(0x30)?;
    enc.write_int(1)?;
    enc.write_octet_string(key.to_bytes().as_slice())?;
    enc.start_seq(0xa0)?;
    enc.write_oid("1.2.840.10045.3.1.7")?;
    enc.end_seq();
    enc.start_seq(0xa1)?;
    let mut b: Vec<u8> = vec![0];
    b.extend_from_slice(&key.public_key().to_sec1_bytes());
    enc.write_octet_string_with_tag(0x3, &b)?;
    enc.end_seq();
    enc.end_seq();
    Ok(enc.encode())
}

#[cfg(test)]
mod tests {
    use super::ct_eq;

    #[test]
    fn ct_eq_matches_slice_eq() {
        assert!(ct_eq(b"abcd", b"abcd"));
        assert!(!ct_eq(b"abcd", b"abce"));
        assert!(!ct_eq(b"abcd", b"abc"));
    }

    #[test]
    fn hkdf_known_answer() {
        let okm = super::hkdf_sha256(b"salt123", b"secret", b"info123", 48).unwrap();
        assert_eq!(
            hex::encode(okm),
            "a134e284e8628486f4d620a711f3cb508a84a74c1550cf1dc57e5f8a099dcf37739184dd1465856473706661f5116be5"
        );
    }
}
