//! Certificate extensions (spec §3): at most one of each well-known kind,
//! plus zero or more opaque "future" extensions carried through unchanged.

use crate::error::{CodecError, CodecResult};
use crate::tlv::{TlvBuffer, TlvItem, TlvItemValue};

pub const TAG_BASIC_CONSTRAINTS: u8 = 1;
pub const TAG_KEY_USAGE: u8 = 2;
pub const TAG_EXTENDED_KEY_USAGE: u8 = 3;
pub const TAG_SUBJECT_KEY_ID: u8 = 4;
pub const TAG_AUTHORITY_KEY_ID: u8 = 5;
pub const TAG_FUTURE_EXTENSIONS: u8 = 6;

pub const SUBJECT_KEY_ID_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub is_ca: bool,
    /// Only meaningful, and only ever present on the wire, when `is_ca`.
    pub path_len: Option<u8>,
}

/// Key-usage purpose OIDs this crate understands (spec §4.1's `ExtendedKeyUsage`
/// array of integers): `1.3.6.1.5.5.7.3.{1,2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedKeyPurpose {
    ServerAuth,
    ClientAuth,
}

impl ExtendedKeyPurpose {
    fn to_code(self) -> u8 {
        match self {
            ExtendedKeyPurpose::ServerAuth => 1,
            ExtendedKeyPurpose::ClientAuth => 2,
        }
    }
    fn from_code(code: u8) -> CodecResult<Self> {
        match code {
            1 => Ok(ExtendedKeyPurpose::ServerAuth),
            2 => Ok(ExtendedKeyPurpose::ClientAuth),
            other => Err(CodecError::InvalidExtension(format!(
                "unsupported extended key usage code {other}"
            ))),
        }
    }
    pub fn oid(self) -> &'static str {
        match self {
            ExtendedKeyPurpose::ServerAuth => "1.3.6.1.5.5.7.3.1",
            ExtendedKeyPurpose::ClientAuth => "1.3.6.1.5.5.7.3.2",
        }
    }
    pub fn from_oid(oid: &str) -> CodecResult<Self> {
        match oid {
            "1.3.6.1.5.5.7.3.1" => Ok(ExtendedKeyPurpose::ServerAuth),
            "1.3.6.1.5.5.7.3.2" => Ok(ExtendedKeyPurpose::ClientAuth),
            other => Err(CodecError::UnsupportedOid(other.to_owned())),
        }
    }
}

/// An extension this crate does not model explicitly. Per the open question
/// in spec §9 about `FutureExtension` round-tripping, the raw DER of the
/// X.509 `Extension` SEQUENCE (OID, optional critical flag, octet-string
/// value) is persisted verbatim so translation back to X.509 is lossless;
/// callers that need to interpret it must decode the DER themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureExtension {
    pub der: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    pub basic_constraints: Option<BasicConstraints>,
    pub key_usage: Option<u16>,
    pub extended_key_usage: Option<Vec<ExtendedKeyPurpose>>,
    pub subject_key_id: Option<[u8; SUBJECT_KEY_ID_LEN]>,
    pub authority_key_id: Option<[u8; SUBJECT_KEY_ID_LEN]>,
    pub future_extensions: Vec<FutureExtension>,
}

impl Extensions {
    pub fn encode_tlv(&self, tlv: &mut TlvBuffer, list_tag: u8) -> CodecResult<()> {
        tlv.write_list(list_tag)
            .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        if let Some(bc) = &self.basic_constraints {
            tlv.write_struct(TAG_BASIC_CONSTRAINTS)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            tlv.write_bool(1, bc.is_ca)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            if bc.is_ca {
                if let Some(path_len) = bc.path_len {
                    tlv.write_uint8(2, path_len)
                        .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
                }
            } else if bc.path_len.is_some() {
                return Err(CodecError::InvalidExtension(
                    "path-length only valid when is-CA".into(),
                ));
            }
            tlv.write_struct_end()
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        if let Some(ku) = self.key_usage {
            tlv.write_uint16(TAG_KEY_USAGE, ku)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        if let Some(eku) = &self.extended_key_usage {
            tlv.write_array(TAG_EXTENDED_KEY_USAGE)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            for purpose in eku {
                tlv.write_uint8_notag(purpose.to_code())
                    .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            }
            tlv.write_struct_end()
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        if let Some(skid) = &self.subject_key_id {
            tlv.write_octetstring(TAG_SUBJECT_KEY_ID, skid)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        if let Some(akid) = &self.authority_key_id {
            tlv.write_octetstring(TAG_AUTHORITY_KEY_ID, akid)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        if !self.future_extensions.is_empty() {
            tlv.write_array(TAG_FUTURE_EXTENSIONS)
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            for fe in &self.future_extensions {
                tlv.write_octetstring(0, &fe.der)
                    .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
            }
            tlv.write_struct_end()
                .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        }
        tlv.write_struct_end()
            .map_err(|e| CodecError::InvalidExtension(e.to_string()))?;
        Ok(())
    }

    pub fn decode_tlv(item: &TlvItem, list_tag: u8) -> CodecResult<Self> {
        let mut out = Extensions::default();
        let Some(TlvItemValue::List(children)) = item.get(&[list_tag]) else {
            return Ok(out);
        };
        for child in children {
            match child.tag {
                TAG_BASIC_CONSTRAINTS => {
                    let is_ca = child.get_bool(&[1]).unwrap_or(false);
                    let path_len = child.get_u8(&[2]);
                    if !is_ca && path_len.is_some() {
                        return Err(CodecError::InvalidExtension(
                            "path-length present without is-CA".into(),
                        ));
                    }
                    out.basic_constraints = Some(BasicConstraints { is_ca, path_len });
                }
                TAG_KEY_USAGE => {
                    let TlvItemValue::Int(v) = child.value else {
                        return Err(CodecError::InvalidExtension("key usage not an int".into()));
                    };
                    out.key_usage = Some(v as u16);
                }
                TAG_EXTENDED_KEY_USAGE => {
                    let TlvItemValue::List(items) = &child.value else {
                        return Err(CodecError::InvalidExtension("ext key usage not a list".into()));
                    };
                    let mut purposes = Vec::new();
                    for i in items {
                        let TlvItemValue::Int(code) = i.value else {
                            return Err(CodecError::InvalidExtension(
                                "ext key usage entry not an int".into(),
                            ));
                        };
                        purposes.push(ExtendedKeyPurpose::from_code(code as u8)?);
                    }
                    out.extended_key_usage = Some(purposes);
                }
                TAG_SUBJECT_KEY_ID => {
                    out.subject_key_id = Some(fixed_octets(child)?);
                }
                TAG_AUTHORITY_KEY_ID => {
                    out.authority_key_id = Some(fixed_octets(child)?);
                }
                TAG_FUTURE_EXTENSIONS => {
                    let TlvItemValue::List(items) = &child.value else {
                        return Err(CodecError::InvalidExtension(
                            "future extensions not a list".into(),
                        ));
                    };
                    for i in items {
                        let TlvItemValue::OctetString(der) = &i.value else {
                            return Err(CodecError::InvalidExtension(
                                "future extension not an octet string".into(),
                            ));
                        };
                        out.future_extensions.push(FutureExtension { der: der.clone() });
                    }
                }
                _ => {} // unknown context tag: skip, per spec §6
            }
        }
        Ok(out)
    }
}

fn fixed_octets(item: &TlvItem) -> CodecResult<[u8; SUBJECT_KEY_ID_LEN]> {
    let TlvItemValue::OctetString(bytes) = &item.value else {
        return Err(CodecError::InvalidExtension("expected octet string".into()));
    };
    if bytes.len() != SUBJECT_KEY_ID_LEN {
        return Err(CodecError::InvalidExtension(format!(
            "key id must be {SUBJECT_KEY_ID_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; SUBJECT_KEY_ID_LEN];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_constraints_round_trip() {
        let ext = Extensions {
            basic_constraints: Some(BasicConstraints { is_ca: true, path_len: Some(1) }),
            key_usage: Some(0x0006),
            extended_key_usage: None,
            subject_key_id: Some([9u8; 20]),
            authority_key_id: Some([8u8; 20]),
            future_extensions: Vec::new(),
        };
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().unwrap();
        ext.encode_tlv(&mut tlv, 10).unwrap();
        tlv.write_struct_end().unwrap();
        let decoded = crate::tlv::decode_tlv(&tlv.data).unwrap();
        let back = Extensions::decode_tlv(&decoded, 10).unwrap();
        assert_eq!(ext, back);
    }

    #[test]
    fn path_len_without_ca_rejected() {
        let ext = Extensions {
            basic_constraints: Some(BasicConstraints { is_ca: false, path_len: Some(1) }),
            ..Default::default()
        };
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().unwrap();
        assert!(ext.encode_tlv(&mut tlv, 10).is_err());
    }
}
