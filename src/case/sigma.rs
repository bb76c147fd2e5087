//! Sigma message codecs, transcript/key-schedule math and the destination-id
//! computation for CASE (C4, spec §4.4). Generalises the initiator-only
//! Sigma1/Sigma3 building the original CA tooling carried into both roles,
//! plus Sigma2 and Sigma2Resume which that tooling never needed.

use p256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{EngineError, EngineResult};
use crate::tlv::{self, TlvBuffer, TlvItem};
use crate::util::cryptoutil;

const NONCE_SIGMA2: &[u8] = b"NCASE_Sigma2N";
const NONCE_SIGMA3: &[u8] = b"NCASE_Sigma3N";
const NONCE_SIGMA_R1: &[u8] = b"NCASE_SigmaR1";
const NONCE_SIGMA_R2: &[u8] = b"NCASE_SigmaR2";

pub struct Sigma1 {
    pub init_random: [u8; 32],
    pub init_sid: u16,
    pub destination_id: [u8; 32],
    pub init_eph_pub: [u8; 65],
    pub resumption_id: Option<[u8; 16]>,
    pub init_resume_mic: Option<[u8; 16]>,
}

impl Sigma1 {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.init_random).map_err(tlv_err)?;
        tlv.write_uint16(2, self.init_sid).map_err(tlv_err)?;
        tlv.write_octetstring(3, &self.destination_id).map_err(tlv_err)?;
        tlv.write_octetstring(4, &self.init_eph_pub).map_err(tlv_err)?;
        if let Some(id) = &self.resumption_id {
            tlv.write_octetstring(6, id).map_err(tlv_err)?;
        }
        if let Some(mic) = &self.init_resume_mic {
            tlv.write_octetstring(7, mic).map_err(tlv_err)?;
        }
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = decode(bytes)?;
        Ok(Self {
            init_random: fixed::<32>(&item, 1)?,
            init_sid: item.get_u16(&[2]).ok_or_else(|| missing("init_sid"))?,
            destination_id: fixed::<32>(&item, 3)?,
            init_eph_pub: fixed::<65>(&item, 4)?,
            resumption_id: optional_fixed::<16>(&item, 6),
            init_resume_mic: optional_fixed::<16>(&item, 7),
        })
    }
}

pub struct Sigma2 {
    pub resp_random: [u8; 32],
    pub resp_sid: u16,
    pub resp_eph_pub: [u8; 65],
    pub encrypted2: Vec<u8>,
}

impl Sigma2 {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.resp_random).map_err(tlv_err)?;
        tlv.write_uint16(2, self.resp_sid).map_err(tlv_err)?;
        tlv.write_octetstring(3, &self.resp_eph_pub).map_err(tlv_err)?;
        tlv.write_octetstring(4, &self.encrypted2).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = decode(bytes)?;
        Ok(Self {
            resp_random: fixed::<32>(&item, 1)?,
            resp_sid: item.get_u16(&[2]).ok_or_else(|| missing("resp_sid"))?,
            resp_eph_pub: fixed::<65>(&item, 3)?,
            encrypted2: item
                .get_octet_string_owned(&[4])
                .ok_or_else(|| missing("encrypted2"))?,
        })
    }
}

pub struct Sigma3 {
    pub encrypted3: Vec<u8>,
}

impl Sigma3 {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.encrypted3).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = decode(bytes)?;
        Ok(Self {
            encrypted3: item
                .get_octet_string_owned(&[1])
                .ok_or_else(|| missing("encrypted3"))?,
        })
    }
}

pub struct Sigma2Resume {
    pub resumption_id: [u8; 16],
    pub resume2_mic: [u8; 16],
    pub resp_sid: u16,
}

impl Sigma2Resume {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.resumption_id).map_err(tlv_err)?;
        tlv.write_octetstring(2, &self.resume2_mic).map_err(tlv_err)?;
        tlv.write_uint16(3, self.resp_sid).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = decode(bytes)?;
        Ok(Self {
            resumption_id: fixed::<16>(&item, 1)?,
            resume2_mic: fixed::<16>(&item, 2)?,
            resp_sid: item.get_u16(&[3]).ok_or_else(|| missing("resp_sid"))?,
        })
    }
}

/// `TBEData2`/`TBEData3`: signed credentials, AEAD-encrypted under S2K/S3K.
/// `resumption_id` is only present in TBEData2 (spec §4.4).
pub struct TbeData {
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    pub signature: [u8; 64],
    pub resumption_id: Option<[u8; 16]>,
}

impl TbeData {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.noc).map_err(tlv_err)?;
        if let Some(icac) = &self.icac {
            tlv.write_octetstring(2, icac).map_err(tlv_err)?;
        }
        tlv.write_octetstring(3, &self.signature).map_err(tlv_err)?;
        if let Some(id) = &self.resumption_id {
            tlv.write_octetstring(4, id).map_err(tlv_err)?;
        }
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = decode(bytes)?;
        Ok(Self {
            noc: item.get_octet_string_owned(&[1]).ok_or_else(|| missing("noc"))?,
            icac: item.get_octet_string_owned(&[2]),
            signature: fixed::<64>(&item, 3)?,
            resumption_id: optional_fixed::<16>(&item, 4),
        })
    }
}

/// `TBSData2`/`TBSData3`: signed, never transmitted on the wire directly —
/// only as the AEAD-encrypted `TbeData` above (spec §4.4).
pub fn tbs_data(noc: &[u8], icac: Option<&[u8]>, own_eph_pub: &[u8; 65], peer_eph_pub: &[u8; 65]) -> EngineResult<Vec<u8>> {
    let mut tlv = TlvBuffer::new();
    tlv.write_anon_struct().map_err(tlv_err)?;
    tlv.write_octetstring(1, noc).map_err(tlv_err)?;
    if let Some(icac) = icac {
        tlv.write_octetstring(2, icac).map_err(tlv_err)?;
    }
    tlv.write_octetstring(3, own_eph_pub).map_err(tlv_err)?;
    tlv.write_octetstring(4, peer_eph_pub).map_err(tlv_err)?;
    tlv.write_struct_end().map_err(tlv_err)?;
    Ok(tlv.data)
}

/// Signs `TBSData` with the sender's operational private key (spec §4.4).
pub fn sign_tbs(signing_key: &p256::SecretKey, tbs: &[u8]) -> [u8; 64] {
    use ecdsa::signature::Signer;
    let key = ecdsa::SigningKey::from(signing_key.clone());
    let sig: ecdsa::Signature<p256::NistP256> = key.sign(tbs);
    let mut out = [0u8; 64];
    out.copy_from_slice(&sig.to_bytes());
    out
}

pub fn verify_tbs(peer_public_key: &[u8; 65], tbs: &[u8], signature: &[u8; 64]) -> EngineResult<()> {
    use ecdsa::signature::Verifier;
    let key = p256::PublicKey::from_sec1_bytes(peer_public_key)
        .map_err(|_| EngineError::SignatureVerifyFailed)?;
    let verifying_key = ecdsa::VerifyingKey::from(key);
    let sig = ecdsa::Signature::<p256::NistP256>::from_slice(signature)
        .map_err(|_| EngineError::SignatureVerifyFailed)?;
    verifying_key.verify(tbs, &sig).map_err(|_| EngineError::SignatureVerifyFailed)
}

pub fn encrypt_tbe(key: &[u8], nonce_label: NonceLabel, tbe: &TbeData) -> EngineResult<Vec<u8>> {
    let plaintext = tbe.encode()?;
    cryptoutil::aes128_ccm_encrypt(key, nonce_label.bytes(), &[], &plaintext)
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

pub fn decrypt_tbe(key: &[u8], nonce_label: NonceLabel, encrypted: &[u8]) -> EngineResult<TbeData> {
    let plaintext = cryptoutil::aes128_ccm_decrypt(key, nonce_label.bytes(), &[], encrypted)
        .map_err(|_| EngineError::AeadFailure)?;
    TbeData::decode(&plaintext)
}

#[derive(Clone, Copy)]
pub enum NonceLabel {
    Sigma2,
    Sigma3,
}

impl NonceLabel {
    fn bytes(self) -> &'static [u8] {
        match self {
            NonceLabel::Sigma2 => NONCE_SIGMA2,
            NonceLabel::Sigma3 => NONCE_SIGMA3,
        }
    }
}

/// `HMAC-SHA256(IPK, init_random || root_public_key || fabric_id_le ||
/// node_id_le)` (spec §4.4).
pub fn destination_id(ipk: &[u8], init_random: &[u8; 32], root_public_key: &[u8], fabric_id: u64, node_id: u64) -> EngineResult<[u8; 32]> {
    let mut msg = Vec::with_capacity(32 + root_public_key.len() + 16);
    msg.extend_from_slice(init_random);
    msg.extend_from_slice(root_public_key);
    msg.extend_from_slice(&fabric_id.to_le_bytes());
    msg.extend_from_slice(&node_id.to_le_bytes());
    let mac = cryptoutil::hmac_sha256(&msg, ipk).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac);
    Ok(out)
}

/// `S2K = HKDF(Z, salt = IPK || SHA-256(transcript so far), info = "Sigma2", 16)`.
pub fn derive_s2k(shared_secret: &[u8], ipk: &[u8], transcript_hash: &[u8; 32]) -> EngineResult<Vec<u8>> {
    let mut salt = Vec::with_capacity(ipk.len() + 32);
    salt.extend_from_slice(ipk);
    salt.extend_from_slice(transcript_hash);
    cryptoutil::hkdf_sha256(&salt, shared_secret, b"Sigma2", 16).map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

/// `S3K = HKDF(Z, salt = IPK || SHA-256(transcript through TBEData2 decryption), info = "Sigma3", 16)`.
pub fn derive_s3k(shared_secret: &[u8], ipk: &[u8], transcript_hash: &[u8; 32]) -> EngineResult<Vec<u8>> {
    let mut salt = Vec::with_capacity(ipk.len() + 32);
    salt.extend_from_slice(ipk);
    salt.extend_from_slice(transcript_hash);
    cryptoutil::hkdf_sha256(&salt, shared_secret, b"Sigma3", 16).map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

/// Final 48-byte `SessionKeys` derivation, split identically to PASE's
/// (I2R, R2I, AttestationChallenge) — `HKDF(Z, salt = full transcript hash,
/// info = "SessionKeys", 48)` (spec §4.4).
pub fn derive_session_keys(shared_secret: &[u8], full_transcript_hash: &[u8; 32]) -> EngineResult<Vec<u8>> {
    cryptoutil::hkdf_sha256(full_transcript_hash, shared_secret, b"SessionKeys", 48)
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

/// Resumption key schedule (spec §4.4 *Resumption*).
pub fn derive_resumption_key(prev_shared_secret: &[u8], len: usize) -> EngineResult<Vec<u8>> {
    cryptoutil::hkdf_sha256(&[], prev_shared_secret, b"SessionResumptionKeys", len)
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

fn resume_mic(resumption_key: &[u8], nonce: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16]) -> EngineResult<[u8; 16]> {
    let mut aad = Vec::with_capacity(48);
    aad.extend_from_slice(init_random);
    aad.extend_from_slice(resumption_id);
    let tag = cryptoutil::aes128_ccm_encrypt(resumption_key, nonce, &aad, &[])
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
    if tag.len() != 16 {
        return Err(EngineError::InvalidMessage("resume MIC must be 16 bytes".into()));
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn verify_resume_mic(resumption_key: &[u8], nonce: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16], mic: &[u8; 16]) -> EngineResult<()> {
    let mut aad = Vec::with_capacity(48);
    aad.extend_from_slice(init_random);
    aad.extend_from_slice(resumption_id);
    cryptoutil::aes128_ccm_decrypt(resumption_key, nonce, &aad, mic)
        .map(|_| ())
        .map_err(|_| EngineError::ResumptionMicFailed)
}

/// Initiator-side resume tag carried in Sigma1 (spec §4.4 *Resumption*).
pub fn init_resume_mic(resumption_key: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16]) -> EngineResult<[u8; 16]> {
    resume_mic(resumption_key, NONCE_SIGMA_R1, init_random, resumption_id)
}

pub fn verify_init_resume_mic(resumption_key: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16], mic: &[u8; 16]) -> EngineResult<()> {
    verify_resume_mic(resumption_key, NONCE_SIGMA_R1, init_random, resumption_id, mic)
}

/// Responder-side resume tag carried in Sigma2Resume (spec §4.4 *Resumption*).
pub fn resume2_mic(resumption_key: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16]) -> EngineResult<[u8; 16]> {
    resume_mic(resumption_key, NONCE_SIGMA_R2, init_random, resumption_id)
}

pub fn verify_resume2_mic(resumption_key: &[u8], init_random: &[u8; 32], resumption_id: &[u8; 16], mic: &[u8; 16]) -> EngineResult<()> {
    verify_resume_mic(resumption_key, NONCE_SIGMA_R2, init_random, resumption_id, mic)
}

/// `Z = ECDH(local_eph_priv, peer_eph_pub)` (spec §4.4 key schedule).
pub fn ecdh_shared_secret(secret: &p256::ecdh::EphemeralSecret, peer_eph_pub: &[u8; 65]) -> EngineResult<Vec<u8>> {
    let peer = p256::PublicKey::from_sec1_bytes(peer_eph_pub).map_err(|_| EngineError::MalformedEphemeralPoint)?;
    let shared = secret.diffie_hellman(&peer);
    Ok(shared.raw_secret_bytes().to_vec())
}

pub fn encode_point(point: &p256::EncodedPoint) -> [u8; 65] {
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    out
}

pub fn eph_public_bytes(secret: &p256::ecdh::EphemeralSecret) -> [u8; 65] {
    encode_point(&secret.public_key().to_encoded_point(false))
}

fn decode(bytes: &[u8]) -> EngineResult<TlvItem> {
    tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))
}

fn fixed<const N: usize>(item: &TlvItem, tag: u8) -> EngineResult<[u8; N]> {
    let bytes = item
        .get_octet_string(&[tag])
        .ok_or_else(|| EngineError::InvalidMessage(format!("missing octet string at tag {tag}")))?;
    if bytes.len() != N {
        return Err(EngineError::InvalidMessage(format!("tag {tag} must be {N} bytes")));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn optional_fixed<const N: usize>(item: &TlvItem, tag: u8) -> Option<[u8; N]> {
    let bytes = item.get_octet_string(&[tag])?;
    if bytes.len() != N {
        return None;
    }
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Some(out)
}

fn missing(what: &str) -> EngineError {
    EngineError::InvalidMessage(format!("missing {what}"))
}

fn tlv_err(e: std::io::Error) -> EngineError {
    EngineError::InvalidMessage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma1_round_trips() {
        let msg = Sigma1 {
            init_random: [1u8; 32],
            init_sid: 7,
            destination_id: [2u8; 32],
            init_eph_pub: [4u8; 65],
            resumption_id: Some([5u8; 16]),
            init_resume_mic: Some([6u8; 16]),
        };
        let bytes = msg.encode().unwrap();
        let decoded = Sigma1::decode(&bytes).unwrap();
        assert_eq!(decoded.init_random, msg.init_random);
        assert_eq!(decoded.init_sid, msg.init_sid);
        assert_eq!(decoded.resumption_id, msg.resumption_id);
    }

    #[test]
    fn destination_id_is_selective_per_fabric() {
        let ipk_a = [9u8; 16];
        let ipk_b = [10u8; 16];
        let init_random = [1u8; 32];
        let root = vec![4u8; 65];
        let a = destination_id(&ipk_a, &init_random, &root, 1, 2).unwrap();
        let b = destination_id(&ipk_b, &init_random, &root, 1, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tbe_round_trips_through_aead() {
        let key = [3u8; 16];
        let tbe = TbeData {
            noc: vec![1, 2, 3],
            icac: Some(vec![4, 5]),
            signature: [9u8; 64],
            resumption_id: Some([7u8; 16]),
        };
        let encrypted = encrypt_tbe(&key, NonceLabel::Sigma2, &tbe).unwrap();
        let decrypted = decrypt_tbe(&key, NonceLabel::Sigma2, &encrypted).unwrap();
        assert_eq!(decrypted.noc, tbe.noc);
        assert_eq!(decrypted.signature, tbe.signature);
        assert_eq!(decrypted.resumption_id, tbe.resumption_id);
    }

    #[test]
    fn corrupted_ciphertext_fails_aead() {
        let key = [3u8; 16];
        let tbe = TbeData { noc: vec![1], icac: None, signature: [0u8; 64], resumption_id: None };
        let mut encrypted = encrypt_tbe(&key, NonceLabel::Sigma3, &tbe).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        assert!(matches!(decrypt_tbe(&key, NonceLabel::Sigma3, &encrypted), Err(EngineError::AeadFailure)));
    }
}
