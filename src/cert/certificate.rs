//! Matter-TLV certificate representation, codec and typed accessors (spec §3, §4.1).

use crate::cert::dn::{DistinguishedName, TAG_FIRMWARE_SIGNING_ID, TAG_ICAC_ID, TAG_NODE_ID, TAG_RCAC_ID, TAG_VVS_ID};
use crate::cert::extensions::Extensions;
use crate::error::{CodecError, CodecResult};
use crate::tlv::{self, TlvBuffer, TlvItem, TlvItemValue};
use crate::util::cryptoutil;

pub const MAX_SERIAL_LEN: usize = 20;
pub const MAX_TLV_LEN: usize = 400;
pub const MAX_X509_LEN: usize = 600;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const SIGNATURE_LEN: usize = 64;

pub const SIG_ALGO_ECDSA_SHA256: u8 = 1;
pub const PUBKEY_ALGO_EC: u8 = 1;
pub const CURVE_PRIME256V1: u8 = 1;

const TAG_SERIAL: u8 = 1;
const TAG_SIG_ALGO: u8 = 2;
const TAG_ISSUER: u8 = 3;
const TAG_NOT_BEFORE: u8 = 4;
const TAG_NOT_AFTER: u8 = 5;
const TAG_SUBJECT: u8 = 6;
const TAG_PUBKEY_ALGO: u8 = 7;
const TAG_CURVE: u8 = 8;
const TAG_PUBKEY: u8 = 9;
const TAG_EXTENSIONS: u8 = 10;
const TAG_SIGNATURE: u8 = 11;

/// The certificate's role, inferred from its Subject DN (spec §3: "derived
/// purely from the Subject DN's first Matter-specific attribute in
/// precedence order").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateType {
    Noc,
    Icac,
    Rcac,
    Vvsc,
    Fwsc,
    Unknown,
}

impl CertificateType {
    /// Node-ID -> ICAC-ID -> RCAC-ID -> VVS-ID -> Firmware-Signing-ID (spec §3).
    pub fn infer(subject: &DistinguishedName) -> Self {
        if subject.matter_id(TAG_NODE_ID).is_some() {
            CertificateType::Noc
        } else if subject.matter_id(TAG_ICAC_ID).is_some() {
            CertificateType::Icac
        } else if subject.matter_id(TAG_RCAC_ID).is_some() {
            CertificateType::Rcac
        } else if subject.matter_id(TAG_VVS_ID).is_some() {
            CertificateType::Vvsc
        } else if subject.matter_id(TAG_FIRMWARE_SIGNING_ID).is_some() {
            CertificateType::Fwsc
        } else {
            CertificateType::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub serial: Vec<u8>,
    pub issuer: DistinguishedName,
    /// Seconds since the Matter epoch (2000-01-01T00:00:00Z).
    pub not_before: u32,
    /// Seconds since the Matter epoch; 0 means "does not expire".
    pub not_after: u32,
    pub subject: DistinguishedName,
    /// 65-byte uncompressed P-256 public key, first byte 0x04.
    pub public_key: [u8; PUBLIC_KEY_LEN],
    pub extensions: Extensions,
    /// Raw `r || s`, 64 bytes; absent only while a certificate is being built
    /// prior to signing.
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl Certificate {
    pub fn cert_type(&self) -> CertificateType {
        CertificateType::infer(&self.subject)
    }
    pub fn node_id(&self) -> Option<u64> {
        self.subject.node_id()
    }
    pub fn fabric_id(&self) -> Option<u64> {
        self.subject.fabric_id()
    }
    pub fn rcac_id(&self) -> Option<u64> {
        self.subject.rcac_id()
    }
    pub fn icac_id(&self) -> Option<u64> {
        self.subject.icac_id()
    }
    pub fn noc_cats(&self) -> Vec<u32> {
        self.subject.noc_cats()
    }
    pub fn is_ca(&self) -> bool {
        self.extensions.basic_constraints.map(|b| b.is_ca).unwrap_or(false)
    }
    pub fn subject_key_id(&self) -> Option<[u8; 20]> {
        self.extensions.subject_key_id
    }
    pub fn authority_key_id(&self) -> Option<[u8; 20]> {
        self.extensions.authority_key_id
    }

    /// SHA-256 over the TLV encoding of this certificate with the
    /// `signature` element (tag 11) elided, i.e. the "to be signed" hash
    /// (spec §4.2, §9). Built by writing fields 1-10 directly rather than
    /// encoding the signed form and truncating it, so the elided form never
    /// exists with a signature attached.
    pub fn tbs_hash(&self) -> CodecResult<[u8; 32]> {
        let bytes = self.encode_tlv_for_signing()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&cryptoutil::sha256(&bytes));
        Ok(out)
    }

    /// The TLV encoding of this certificate with the signature elided, i.e.
    /// exactly the bytes [`Certificate::tbs_hash`] hashes and the bytes a
    /// signer/verifier should feed to ECDSA-with-SHA-256 directly.
    pub fn encode_tlv_for_signing(&self) -> CodecResult<Vec<u8>> {
        self.encode_fields(false)
    }

    fn encode_fields(&self, with_signature: bool) -> CodecResult<Vec<u8>> {
        if self.serial.is_empty() || self.serial.len() > MAX_SERIAL_LEN {
            return Err(CodecError::InvalidSerialNumber);
        }
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(TAG_SERIAL, &self.serial).map_err(tlv_err)?;
        tlv.write_uint8(TAG_SIG_ALGO, SIG_ALGO_ECDSA_SHA256).map_err(tlv_err)?;
        self.issuer.encode_tlv(&mut tlv, TAG_ISSUER)?;
        tlv.write_uint32(TAG_NOT_BEFORE, self.not_before).map_err(tlv_err)?;
        tlv.write_uint32(TAG_NOT_AFTER, self.not_after).map_err(tlv_err)?;
        self.subject.encode_tlv(&mut tlv, TAG_SUBJECT)?;
        tlv.write_uint8(TAG_PUBKEY_ALGO, PUBKEY_ALGO_EC).map_err(tlv_err)?;
        tlv.write_uint8(TAG_CURVE, CURVE_PRIME256V1).map_err(tlv_err)?;
        tlv.write_octetstring(TAG_PUBKEY, &self.public_key).map_err(tlv_err)?;
        self.extensions.encode_tlv(&mut tlv, TAG_EXTENSIONS)?;
        if with_signature {
            let sig = self.signature.ok_or_else(|| {
                CodecError::InvalidCertificate("certificate is not signed".into())
            })?;
            tlv.write_octetstring(TAG_SIGNATURE, &sig).map_err(tlv_err)?;
        }
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    pub fn encode_tlv(&self) -> CodecResult<Vec<u8>> {
        let bytes = self.encode_fields(true)?;
        if bytes.len() > MAX_TLV_LEN {
            return Err(CodecError::CertificateTooLarge);
        }
        Ok(bytes)
    }

    pub fn decode_tlv(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() > MAX_TLV_LEN {
            return Err(CodecError::CertificateTooLarge);
        }
        let item = tlv::decode_tlv(bytes)
            .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
        Self::from_tlv_item(&item)
    }

    pub(crate) fn from_tlv_item(item: &TlvItem) -> CodecResult<Self> {
        let serial = item
            .get_octet_string_owned(&[TAG_SERIAL])
            .ok_or(CodecError::InvalidSerialNumber)?;
        if serial.is_empty() || serial.len() > MAX_SERIAL_LEN {
            return Err(CodecError::InvalidSerialNumber);
        }
        let sig_algo = item.get_u8(&[TAG_SIG_ALGO]).ok_or_else(|| {
            CodecError::InvalidCertificate("missing signature algorithm".into())
        })?;
        if sig_algo != SIG_ALGO_ECDSA_SHA256 {
            return Err(CodecError::InvalidSignatureAlgo);
        }
        let issuer = DistinguishedName::decode_tlv(item, TAG_ISSUER)?;
        let not_before = item
            .get_u32(&[TAG_NOT_BEFORE])
            .ok_or_else(|| CodecError::InvalidCertificate("missing not-before".into()))?;
        let not_after = item
            .get_u32(&[TAG_NOT_AFTER])
            .ok_or_else(|| CodecError::InvalidCertificate("missing not-after".into()))?;
        let subject = DistinguishedName::decode_tlv(item, TAG_SUBJECT)?;
        let pubkey_algo = item.get_u8(&[TAG_PUBKEY_ALGO]).ok_or_else(|| {
            CodecError::InvalidCertificate("missing public key algorithm".into())
        })?;
        if pubkey_algo != PUBKEY_ALGO_EC {
            return Err(CodecError::InvalidPublicKeyAlgo);
        }
        let curve = item
            .get_u8(&[TAG_CURVE])
            .ok_or_else(|| CodecError::InvalidCertificate("missing curve".into()))?;
        if curve != CURVE_PRIME256V1 {
            return Err(CodecError::InvalidEllipticCurve);
        }
        let raw_pubkey = item
            .get_octet_string(&[TAG_PUBKEY])
            .ok_or_else(|| CodecError::InvalidCertificate("missing public key".into()))?;
        if raw_pubkey.len() != PUBLIC_KEY_LEN || raw_pubkey[0] != 0x04 {
            return Err(CodecError::InvalidPublicKey);
        }
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(raw_pubkey);

        let extensions = Extensions::decode_tlv(item, TAG_EXTENSIONS)?;

        let signature = match item.get_octet_string(&[TAG_SIGNATURE]) {
            Some(raw) => {
                if raw.len() != SIGNATURE_LEN {
                    return Err(CodecError::InvalidSignature);
                }
                let mut sig = [0u8; SIGNATURE_LEN];
                sig.copy_from_slice(raw);
                Some(sig)
            }
            None => None,
        };

        Ok(Self {
            serial,
            issuer,
            not_before,
            not_after,
            subject,
            public_key,
            extensions,
            signature,
        })
    }

    pub fn expect_type(&self, expected: CertificateType) -> CodecResult<()> {
        if self.cert_type() != expected {
            return Err(CodecError::InvalidCertificate(format!(
                "expected {expected:?}, found {:?}",
                self.cert_type()
            )));
        }
        Ok(())
    }
}

fn tlv_err(e: std::io::Error) -> CodecError {
    CodecError::InvalidCertificate(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::dn::DnAttribute;

    fn sample_cert(node_id: u64, fabric_id: u64) -> Certificate {
        let mut subject = DistinguishedName::new();
        subject
            .push(DnAttribute::MatterId { tag: crate::cert::dn::TAG_NODE_ID, value: node_id })
            .unwrap();
        subject
            .push(DnAttribute::MatterId { tag: crate::cert::dn::TAG_FABRIC_ID, value: fabric_id })
            .unwrap();
        let mut issuer = DistinguishedName::new();
        issuer
            .push(DnAttribute::MatterId { tag: crate::cert::dn::TAG_RCAC_ID, value: 0xCAFE })
            .unwrap();
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key[0] = 0x04;
        Certificate {
            serial: vec![1, 2, 3],
            issuer,
            not_before: 100,
            not_after: 0,
            subject,
            public_key,
            extensions: Extensions::default(),
            signature: Some([9u8; SIGNATURE_LEN]),
        }
    }

    #[test]
    fn codec_round_trip() {
        let cert = sample_cert(0xDEDEDEDE00010001, 0xFAB000000000001D);
        let encoded = cert.encode_tlv().unwrap();
        let decoded = Certificate::decode_tlv(&encoded).unwrap();
        assert_eq!(cert, decoded);
        let re_encoded = decoded.encode_tlv().unwrap();
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn type_inference_is_precedence_ordered() {
        let cert = sample_cert(0x1, 0x2);
        assert_eq!(cert.cert_type(), CertificateType::Noc);

        let mut icac_subject = DistinguishedName::new();
        icac_subject
            .push(DnAttribute::MatterId { tag: crate::cert::dn::TAG_ICAC_ID, value: 3 })
            .unwrap();
        assert_eq!(CertificateType::infer(&icac_subject), CertificateType::Icac);
    }

    #[test]
    fn tbs_hash_elides_signature() {
        let mut cert = sample_cert(1, 2);
        cert.signature = Some([1u8; SIGNATURE_LEN]);
        let h1 = cert.tbs_hash().unwrap();
        cert.signature = Some([2u8; SIGNATURE_LEN]);
        let h2 = cert.tbs_hash().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn oversize_serial_rejected() {
        let mut cert = sample_cert(1, 2);
        cert.serial = vec![0u8; MAX_SERIAL_LEN + 1];
        assert!(matches!(cert.encode_tlv(), Err(CodecError::InvalidSerialNumber)));
    }
}
