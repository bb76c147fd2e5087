//! Matter-TLV certificate ↔ X.509 DER translation (spec §4.1).
//!
//! Decoding an X.509 certificate uses the `x509-cert` crate's DER parser;
//! encoding writes DER directly with [`crate::util::asn1::Encoder`], the same
//! split the reference controller library uses (it never builds X.509 with
//! `x509-cert`, only reads it). Certificate issuance/signing is out of scope
//! (spec §1 non-goals) — translation to X.509 re-packages an *already
//! signed* Matter certificate's signature, it never produces a new one.

use p256::NistP256;
use x509_cert::der::{Decode, Encode};

use crate::cert::certificate::Certificate;
use crate::cert::dn::{self, DistinguishedName};
use crate::cert::extensions::{BasicConstraints, ExtendedKeyPurpose, Extensions, FutureExtension};
use crate::error::{CodecError, CodecResult};
use crate::types::{MATTER_EPOCH_UNIX_SECONDS, X509_NO_EXPIRY_UNIX_SECONDS};
use crate::util::asn1;

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_PRIME256V1: &str = "1.2.840.10045.3.1.7";
const OID_SIG_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";

const OID_CE_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
const OID_CE_KEY_USAGE: &str = "2.5.29.15";
const OID_CE_BASIC_CONSTRAINTS: &str = "2.5.29.19";
const OID_CE_EXT_KEY_USAGE: &str = "2.5.29.37";
const OID_CE_AUTHORITY_KEY_IDENTIFIER: &str = "2.5.29.35";

/// Matter's KeyUsage bitmap numbers bits LSB-first in named-bit order
/// (digitalSignature=0x0001 ... decipherOnly=0x0100), matching declaration
/// order. The DER BIT STRING numbers the same named bits MSB-first within
/// each octet (digitalSignature is bit 0 = 0x80, keyCertSign is bit 5 =
/// 0x04, cRLSign is bit 6 = 0x02, ...), so bit `i` of `ku` becomes bit `i`
/// of the BIT STRING counted from the most significant end. Trailing zero
/// bits are trimmed per DER's minimal-length requirement for BIT STRINGs.
fn key_usage_to_der_bitstring(ku: u16) -> Vec<u8> {
    let mut octets = [0u8; 2];
    let mut highest_bit = None;
    for i in 0..16u16 {
        if ku & (1 << i) != 0 {
            octets[(i / 8) as usize] |= 0x80 >> (i % 8);
            highest_bit = Some(i);
        }
    }
    let Some(highest_bit) = highest_bit else {
        return vec![0x03, 0x01, 0x00];
    };
    let num_octets = (highest_bit / 8) as usize + 1;
    let unused_bits = 7 - (highest_bit % 8) as u8;
    let mut out = vec![0x03, (num_octets + 1) as u8, unused_bits];
    out.extend_from_slice(&octets[..num_octets]);
    out
}

fn matter_seconds_to_unix(secs: u32) -> u64 {
    if secs == 0 {
        X509_NO_EXPIRY_UNIX_SECONDS
    } else {
        MATTER_EPOCH_UNIX_SECONDS + secs as u64
    }
}

fn unix_to_matter_seconds(unix_secs: u64) -> CodecResult<u32> {
    if unix_secs == X509_NO_EXPIRY_UNIX_SECONDS {
        return Ok(0);
    }
    unix_secs
        .checked_sub(MATTER_EPOCH_UNIX_SECONDS)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| CodecError::InvalidCertificate("validity time out of range".into()))
}

fn encode_dn(encoder: &mut asn1::Encoder, dn: &DistinguishedName) -> CodecResult<()> {
    for attr in &dn.attributes {
        encoder.start_seq(0x31).map_err(asn1_err)?; // RDN (SET OF)
        encoder.start_seq(0x30).map_err(asn1_err)?; // AttributeTypeAndValue
        match attr {
            crate::cert::dn::DnAttribute::String { tag, printable, value } => {
                let oid = dn::oid_for_tag(*tag)?;
                encoder.write_oid(&oid).map_err(asn1_err)?;
                let str_tag = if *printable { 0x13 } else { 0x0c };
                encoder.write_string_with_tag(str_tag, value).map_err(asn1_err)?;
            }
            crate::cert::dn::DnAttribute::MatterId { tag, value } => {
                let oid = dn::oid_for_tag(*tag)?;
                let width = dn::width_for_tag(*tag).unwrap_or(8);
                encoder.write_oid(&oid).map_err(asn1_err)?;
                let hex = dn::matter_specific_to_hex_string(*value, width);
                encoder.write_string(&hex).map_err(asn1_err)?;
            }
        }
        encoder.end_seq();
        encoder.end_seq();
    }
    Ok(())
}

fn add_ext(encoder: &mut asn1::Encoder, oid: &str, critical: bool, value: &[u8]) -> CodecResult<()> {
    encoder.start_seq(0x30).map_err(asn1_err)?;
    encoder.write_oid(oid).map_err(asn1_err)?;
    if critical {
        encoder.write_bool(critical).map_err(asn1_err)?;
    }
    encoder.write_octet_string(value).map_err(asn1_err)?;
    encoder.end_seq();
    Ok(())
}

/// Translate a Matter-TLV certificate into an X.509 v3 DER structure
/// (spec §4.1).
pub fn matter_to_x509(cert: &Certificate) -> CodecResult<Vec<u8>> {
    let signature = cert
        .signature
        .ok_or_else(|| CodecError::InvalidCertificate("certificate is not signed".into()))?;

    let mut tbs = asn1::Encoder::new();
    tbs.start_seq(0xa0).map_err(asn1_err)?; // [0] version
    tbs.write_int(2).map_err(asn1_err)?; // v3
    tbs.end_seq();

    if cert.serial.len() > 1 && cert.serial[0] & 0x80 != 0 {
        // avoid emitting a negative INTEGER for a high-bit-set serial
        let mut padded = vec![0u8];
        padded.extend_from_slice(&cert.serial);
        tbs.write_octet_string_with_tag(0x02, &padded).map_err(asn1_err)?;
    } else {
        tbs.write_octet_string_with_tag(0x02, &cert.serial).map_err(asn1_err)?;
    }

    tbs.start_seq(0x30).map_err(asn1_err)?; // signature algorithm
    tbs.write_oid(OID_SIG_ECDSA_WITH_SHA256).map_err(asn1_err)?;
    tbs.end_seq();

    tbs.start_seq(0x30).map_err(asn1_err)?; // issuer
    encode_dn(&mut tbs, &cert.issuer)?;
    tbs.end_seq();

    tbs.start_seq(0x30).map_err(asn1_err)?; // validity
    let (nb_tag, nb_str) = asn1::unix_seconds_to_x509_time(matter_seconds_to_unix(cert.not_before));
    tbs.write_string_with_tag(nb_tag, &nb_str).map_err(asn1_err)?;
    let (na_tag, na_str) = asn1::unix_seconds_to_x509_time(matter_seconds_to_unix(cert.not_after));
    tbs.write_string_with_tag(na_tag, &na_str).map_err(asn1_err)?;
    tbs.end_seq();

    tbs.start_seq(0x30).map_err(asn1_err)?; // subject
    encode_dn(&mut tbs, &cert.subject)?;
    tbs.end_seq();

    tbs.start_seq(0x30).map_err(asn1_err)?; // subjectPublicKeyInfo
    tbs.start_seq(0x30).map_err(asn1_err)?;
    tbs.write_oid(OID_EC_PUBLIC_KEY).map_err(asn1_err)?;
    tbs.write_oid(OID_PRIME256V1).map_err(asn1_err)?;
    tbs.end_seq();
    let mut spk = vec![0u8]; // unused-bits prefix
    spk.extend_from_slice(&cert.public_key);
    tbs.write_octet_string_with_tag(0x03, &spk).map_err(asn1_err)?;
    tbs.end_seq();

    tbs.start_seq(0xa3).map_err(asn1_err)?; // [3] extensions
    tbs.start_seq(0x30).map_err(asn1_err)?;
    if let Some(bc) = cert.extensions.basic_constraints {
        let mut v = Vec::new();
        if bc.is_ca {
            v.extend_from_slice(&[0x01, 0x01, 0xff]);
            if let Some(path_len) = bc.path_len {
                v.extend_from_slice(&[0x02, 0x01, path_len]);
            }
        }
        let mut inner = vec![0x30, v.len() as u8];
        inner.extend_from_slice(&v);
        add_ext(&mut tbs, OID_CE_BASIC_CONSTRAINTS, true, &inner)?;
    }
    if let Some(ku) = cert.extensions.key_usage {
        add_ext(&mut tbs, OID_CE_KEY_USAGE, true, &key_usage_to_der_bitstring(ku))?;
    }
    if let Some(eku) = &cert.extensions.extended_key_usage {
        let mut enc = asn1::Encoder::new();
        enc.start_seq(0x30).map_err(asn1_err)?;
        for purpose in eku {
            enc.write_oid(purpose.oid()).map_err(asn1_err)?;
        }
        enc.end_seq();
        add_ext(&mut tbs, OID_CE_EXT_KEY_USAGE, true, &enc.encode())?;
    }
    if let Some(skid) = cert.extensions.subject_key_id {
        let mut enc = asn1::Encoder::new();
        enc.write_octet_string(&skid).map_err(asn1_err)?;
        add_ext(&mut tbs, OID_CE_SUBJECT_KEY_IDENTIFIER, false, &enc.encode())?;
    }
    if let Some(akid) = cert.extensions.authority_key_id {
        let mut enc = asn1::Encoder::new();
        enc.start_seq(0x30).map_err(asn1_err)?;
        enc.write_octet_string_with_tag(0x80, &akid).map_err(asn1_err)?;
        add_ext(&mut tbs, OID_CE_AUTHORITY_KEY_IDENTIFIER, false, &enc.encode())?;
    }
    for fe in &cert.extensions.future_extensions {
        // persisted verbatim: already a full DER `Extension` SEQUENCE.
        tbs.write_raw(&fe.der).map_err(asn1_err)?;
    }
    tbs.end_seq();
    tbs.end_seq();

    let mut encoder = asn1::Encoder::new();
    encoder.start_seq(0x30).map_err(asn1_err)?;
    // splice in the already-built TBSCertificate as a single nested SEQUENCE
    let tbs_der = {
        let mut wrapped = asn1::Encoder::new();
        wrapped.start_seq(0x30).map_err(asn1_err)?;
        wrapped.write_raw(&tbs.encode()).map_err(asn1_err)?;
        wrapped.end_seq();
        wrapped.encode()
    };
    encoder.write_raw(&tbs_der).map_err(asn1_err)?;

    encoder.start_seq(0x30).map_err(asn1_err)?; // signatureAlgorithm
    encoder.write_oid(OID_SIG_ECDSA_WITH_SHA256).map_err(asn1_err)?;
    encoder.end_seq();

    let sig_der = ecdsa::Signature::<NistP256>::from_slice(&signature)
        .map_err(|_| CodecError::InvalidSignature)?
        .to_der();
    let mut sig_bits = vec![0u8];
    sig_bits.extend_from_slice(sig_der.as_bytes());
    encoder.write_octet_string_with_tag(0x03, &sig_bits).map_err(asn1_err)?;
    encoder.end_seq();

    let der = encoder.encode();
    if der.len() > crate::cert::certificate::MAX_X509_LEN {
        return Err(CodecError::CertificateTooLarge);
    }
    Ok(der)
}

/// Translate an X.509 DER certificate into Matter-TLV form (spec §4.1).
pub fn x509_to_matter(der: &[u8]) -> CodecResult<Certificate> {
    let x509 = x509_cert::Certificate::from_der(der)
        .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
    let tbs = &x509.tbs_certificate;

    let serial = tbs.serial_number.as_bytes().to_vec();
    // DER INTEGER may carry a leading zero byte to keep it non-negative.
    let serial = if serial.len() > 1 && serial[0] == 0 { serial[1..].to_vec() } else { serial };
    if serial.is_empty() || serial.len() > crate::cert::certificate::MAX_SERIAL_LEN {
        return Err(CodecError::InvalidSerialNumber);
    }

    let sig_oid = x509.signature_algorithm.oid.to_string();
    if sig_oid != OID_SIG_ECDSA_WITH_SHA256 {
        return Err(CodecError::InvalidSignatureAlgo);
    }

    let spki_alg = tbs.subject_public_key_info.algorithm.oid.to_string();
    if spki_alg != OID_EC_PUBLIC_KEY {
        return Err(CodecError::InvalidPublicKeyAlgo);
    }
    let curve_oid = tbs
        .subject_public_key_info
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.decode_as::<x509_cert::der::asn1::ObjectIdentifier>().ok())
        .map(|o| o.to_string());
    if curve_oid.as_deref() != Some(OID_PRIME256V1) {
        return Err(CodecError::InvalidEllipticCurve);
    }

    let raw_pubkey = tbs
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| CodecError::InvalidPublicKey)?;
    if raw_pubkey.len() != crate::cert::certificate::PUBLIC_KEY_LEN || raw_pubkey[0] != 0x04 {
        return Err(CodecError::InvalidPublicKey);
    }
    let mut public_key = [0u8; crate::cert::certificate::PUBLIC_KEY_LEN];
    public_key.copy_from_slice(raw_pubkey);

    let issuer = decode_dn(&tbs.issuer)?;
    let subject = decode_dn(&tbs.subject)?;

    let not_before = unix_to_matter_seconds(tbs.validity.not_before.to_unix_duration().as_secs())?;
    let not_after = unix_to_matter_seconds(tbs.validity.not_after.to_unix_duration().as_secs())?;

    let extensions = decode_extensions(tbs)?;

    let sig_bytes = x509
        .signature
        .as_bytes()
        .ok_or_else(|| CodecError::InvalidSignature)?;
    let sig = ecdsa::Signature::<NistP256>::from_der(sig_bytes)
        .map_err(|_| CodecError::InvalidSignature)?;
    let mut signature = [0u8; crate::cert::certificate::SIGNATURE_LEN];
    signature.copy_from_slice(sig.to_bytes().as_slice());

    Ok(Certificate {
        serial,
        issuer,
        not_before,
        not_after,
        subject,
        public_key,
        extensions,
        signature: Some(signature),
    })
}

fn decode_dn(rdn: &x509_cert::name::RdnSequence) -> CodecResult<DistinguishedName> {
    let mut dn = DistinguishedName::new();
    for relative in &rdn.0 {
        for atv in relative.0.as_slice() {
            let oid = atv.oid.to_string();
            let Some(tag) = dn::tag_for_oid(&oid) else {
                return Err(CodecError::UnsupportedOid(oid));
            };
            if let Some(width) = dn::width_for_tag(tag) {
                let hex = atv
                    .value
                    .decode_as::<String>()
                    .map_err(|e| CodecError::InvalidDn(e.to_string()))?;
                let value = dn::hex_string_to_matter_specific(&hex)?;
                let _ = width;
                dn.push(crate::cert::dn::DnAttribute::MatterId { tag, value })?;
            } else {
                let value = atv
                    .value
                    .decode_as::<String>()
                    .map_err(|e| CodecError::InvalidDn(e.to_string()))?;
                let printable = atv.value.tag() == x509_cert::der::Tag::PrintableString;
                dn.push(crate::cert::dn::DnAttribute::String {
                    tag: if printable { tag | 0x80 } else { tag },
                    printable,
                    value,
                })?;
            }
        }
    }
    Ok(dn)
}

fn find_extension<'a>(
    tbs: &'a x509_cert::TbsCertificate,
    oid: &str,
) -> Option<&'a x509_cert::ext::Extension> {
    tbs.extensions
        .as_ref()?
        .iter()
        .find(|e| e.extn_id.to_string() == oid)
}

fn decode_extensions(tbs: &x509_cert::TbsCertificate) -> CodecResult<Extensions> {
    let mut out = Extensions::default();

    if let Some(ext) = find_extension(tbs, OID_CE_BASIC_CONSTRAINTS) {
        let v = ext.extn_value.as_bytes();
        let content = if v.len() >= 2 { &v[2..] } else { &[][..] };
        if content.is_empty() {
            out.basic_constraints = Some(BasicConstraints { is_ca: false, path_len: None });
        } else if content.len() >= 3 && content[0] == 0x01 {
            let is_ca = content[2] == 0xff;
            let path_len = if content.len() > 3 && content[3] == 0x02 {
                content.get(5).copied()
            } else {
                None
            };
            out.basic_constraints = Some(BasicConstraints { is_ca, path_len });
        } else {
            return Err(CodecError::InvalidExtension("malformed basicConstraints".into()));
        }
    }

    if let Some(ext) = find_extension(tbs, OID_CE_KEY_USAGE) {
        let ku = x509_cert::ext::pkix::KeyUsage::from_der(ext.extn_value.as_bytes())
            .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        out.key_usage = Some(ku.0.bits() as u16);
    }

    if let Some(ext) = find_extension(tbs, OID_CE_EXT_KEY_USAGE) {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())
            .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        let mut purposes = Vec::new();
        for oid in eku.0 {
            purposes.push(ExtendedKeyPurpose::from_oid(&oid.to_string())?);
        }
        out.extended_key_usage = Some(purposes);
    }

    if let Some(ext) = find_extension(tbs, OID_CE_SUBJECT_KEY_IDENTIFIER) {
        let v = ext.extn_value.as_bytes();
        out.subject_key_id = Some(fixed20(&v[2..])?);
    }

    if let Some(ext) = find_extension(tbs, OID_CE_AUTHORITY_KEY_IDENTIFIER) {
        let v = ext.extn_value.as_bytes();
        out.authority_key_id = Some(fixed20(&v[4..])?);
    }

    if let Some(exts) = &tbs.extensions {
        let known = [
            OID_CE_BASIC_CONSTRAINTS,
            OID_CE_KEY_USAGE,
            OID_CE_EXT_KEY_USAGE,
            OID_CE_SUBJECT_KEY_IDENTIFIER,
            OID_CE_AUTHORITY_KEY_IDENTIFIER,
        ];
        for ext in exts {
            if known.contains(&ext.extn_id.to_string().as_str()) {
                continue;
            }
            let der = ext
                .to_der()
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            out.future_extensions.push(FutureExtension { der });
        }
    }

    Ok(out)
}

fn fixed20(bytes: &[u8]) -> CodecResult<[u8; 20]> {
    if bytes.len() != 20 {
        return Err(CodecError::InvalidExtension("key identifier must be 20 bytes".into()));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn asn1_err(e: std::io::Error) -> CodecError {
    CodecError::InvalidCertificate(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matter_epoch_sentinel_round_trips() {
        assert_eq!(matter_seconds_to_unix(0), X509_NO_EXPIRY_UNIX_SECONDS);
        assert_eq!(unix_to_matter_seconds(X509_NO_EXPIRY_UNIX_SECONDS).unwrap(), 0);
        let unix = matter_seconds_to_unix(1000);
        assert_eq!(unix_to_matter_seconds(unix).unwrap(), 1000);
    }

    #[test]
    fn generalized_time_sentinel_format() {
        let (tag, s) = asn1::unix_seconds_to_x509_time(X509_NO_EXPIRY_UNIX_SECONDS);
        assert_eq!(tag, 0x18);
        assert_eq!(s, "99991231235959Z");
    }

    #[test]
    fn key_usage_bits_map_to_der_named_bit_order() {
        // digitalSignature (Matter 0x0001) is DER named bit 0 -> 0x80.
        assert_eq!(key_usage_to_der_bitstring(0x0001), vec![0x03, 0x02, 0x07, 0x80]);
        // keyCertSign (0x0020) | cRLSign (0x0040), matching a typical CA cert.
        assert_eq!(key_usage_to_der_bitstring(0x0060), vec![0x03, 0x02, 0x01, 0x06]);
        // decipherOnly (0x0100) is DER named bit 8, spilling into the second octet.
        assert_eq!(key_usage_to_der_bitstring(0x0100), vec![0x03, 0x03, 0x07, 0x00, 0x80]);
        assert_eq!(key_usage_to_der_bitstring(0), vec![0x03, 0x01, 0x00]);
    }
}
