//! Matter Distinguished Name attributes and their X.509 OID mapping (spec §3, §6).

use crate::error::{CodecError, CodecResult};
use crate::tlv::{TlvBuffer, TlvItem, TlvItemValue};

pub const MAX_DN_ATTRIBUTES: usize = 5;
pub const MAX_NOC_CATS: usize = 3;

/// One string attribute's tag, its OID and whether it prefers PrintableString
/// encoding in X.509 (tags 1-16; `tag + 0x80` selects PrintableString).
pub(crate) const STRING_ATTRS: &[(u8, &str)] = &[
    (1, "2.5.4.3"),                        // CN
    (2, "2.5.4.4"),                        // SN (surname)
    (3, "2.5.4.5"),                        // serialNumber
    (4, "2.5.4.6"),                        // C
    (5, "2.5.4.7"),                        // L
    (6, "2.5.4.8"),                        // ST
    (7, "2.5.4.10"),                       // O
    (8, "2.5.4.11"),                       // OU
    (9, "2.5.4.12"),                       // title
    (10, "2.5.4.41"),                      // name
    (11, "2.5.4.42"),                      // GN
    (12, "2.5.4.43"),                      // initials
    (13, "2.5.4.44"),                      // generationQualifier
    (14, "2.5.4.46"),                      // dnQualifier
    (15, "2.5.4.65"),                      // pseudonym
    (16, "0.9.2342.19200300.100.1.25"),    // DC
];

/// Matter-specific integer attributes (tags 17-23), the OID suffix under
/// `1.3.6.1.4.1.37244.1`, and their fixed byte width (spec §3, §6). NOC-CAT
/// is the sole 4-byte attribute; the rest are 8-byte node/cert identifiers.
pub(crate) const MATTER_ATTRS: &[(u8, u32, u8)] = &[
    (17, 1, 8), // node-id
    (18, 2, 8), // firmware-signing-id
    (19, 3, 8), // icac-id
    (20, 4, 8), // rcac-id
    (21, 5, 8), // fabric-id
    (22, 6, 4), // noc-cat
    (23, 7, 8), // vvs-id
];

pub const TAG_NODE_ID: u8 = 17;
pub const TAG_FIRMWARE_SIGNING_ID: u8 = 18;
pub const TAG_ICAC_ID: u8 = 19;
pub const TAG_RCAC_ID: u8 = 20;
pub const TAG_FABRIC_ID: u8 = 21;
pub const TAG_NOC_CAT: u8 = 22;
pub const TAG_VVS_ID: u8 = 23;

fn matter_oid(tag: u8) -> Option<String> {
    MATTER_ATTRS
        .iter()
        .find(|(t, _, _)| *t == tag)
        .map(|(_, suffix, _)| format!("1.3.6.1.4.1.37244.1.{suffix}"))
}

fn matter_width(tag: u8) -> Option<u8> {
    MATTER_ATTRS.iter().find(|(t, _, _)| *t == tag).map(|(_, _, w)| *w)
}

fn tag_for_matter_oid(oid: &str) -> Option<u8> {
    let suffix: u32 = oid.strip_prefix("1.3.6.1.4.1.37244.1.")?.parse().ok()?;
    MATTER_ATTRS.iter().find(|(_, s, _)| *s == suffix).map(|(t, _, _)| *t)
}

fn string_oid(tag: u8) -> Option<&'static str> {
    STRING_ATTRS.iter().find(|(t, _)| *t == tag & 0x7f).map(|(_, oid)| *oid)
}

fn tag_for_string_oid(oid: &str) -> Option<u8> {
    STRING_ATTRS.iter().find(|(_, o)| *o == oid).map(|(t, _)| *t)
}

/// Render a Matter-specific integer DN value the way X.509 carries it: an
/// uppercase, zero-padded hex string of exactly `width * 2` characters
/// (spec §4.1, §8 testable property).
pub fn matter_specific_to_hex_string(value: u64, width: u8) -> String {
    format!("{:0width$X}", value, width = (width as usize) * 2)
}

/// Inverse of [`matter_specific_to_hex_string`].
pub fn hex_string_to_matter_specific(s: &str) -> CodecResult<u64> {
    u64::from_str_radix(s, 16).map_err(|_| CodecError::InvalidDn(format!("not hex: {s}")))
}

/// A single attribute-value pair in a Distinguished Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnAttribute {
    /// Tags 1-16 (or 1-16 + 0x80 for PrintableString).
    String { tag: u8, printable: bool, value: String },
    /// Tags 17-23, the Matter-specific identifiers.
    MatterId { tag: u8, value: u64 },
}

impl DnAttribute {
    pub fn tag(&self) -> u8 {
        match self {
            DnAttribute::String { tag, .. } => *tag,
            DnAttribute::MatterId { tag, .. } => *tag,
        }
    }
}

/// An ordered sequence of DN attributes (spec §3). At most
/// [`MAX_DN_ATTRIBUTES`] entries; NOCs further restrict `noc-cat` to at most
/// [`MAX_NOC_CATS`] distinct values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub attributes: Vec<DnAttribute>,
}

impl DistinguishedName {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attr: DnAttribute) -> CodecResult<()> {
        if self.attributes.len() >= MAX_DN_ATTRIBUTES {
            return Err(CodecError::InvalidDn("too many attributes".into()));
        }
        if let DnAttribute::MatterId { tag: TAG_NOC_CAT, .. } = attr {
            let cats = self.noc_cats().len();
            if cats >= MAX_NOC_CATS {
                return Err(CodecError::InvalidDn("too many NOC-CAT entries".into()));
            }
        }
        self.attributes.push(attr);
        Ok(())
    }

    pub fn matter_id(&self, tag: u8) -> Option<u64> {
        self.attributes.iter().find_map(|a| match a {
            DnAttribute::MatterId { tag: t, value } if *t == tag => Some(*value),
            _ => None,
        })
    }

    pub fn node_id(&self) -> Option<u64> {
        self.matter_id(TAG_NODE_ID)
    }
    pub fn fabric_id(&self) -> Option<u64> {
        self.matter_id(TAG_FABRIC_ID)
    }
    pub fn icac_id(&self) -> Option<u64> {
        self.matter_id(TAG_ICAC_ID)
    }
    pub fn rcac_id(&self) -> Option<u64> {
        self.matter_id(TAG_RCAC_ID)
    }
    pub fn vvs_id(&self) -> Option<u64> {
        self.matter_id(TAG_VVS_ID)
    }
    pub fn firmware_signing_id(&self) -> Option<u64> {
        self.matter_id(TAG_FIRMWARE_SIGNING_ID)
    }

    pub fn noc_cats(&self) -> Vec<u32> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                DnAttribute::MatterId { tag: TAG_NOC_CAT, value } => Some(*value as u32),
                _ => None,
            })
            .collect()
    }

    pub fn encode_tlv(&self, tlv: &mut TlvBuffer, list_tag: u8) -> CodecResult<()> {
        tlv.write_list(list_tag)
            .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
        for attr in &self.attributes {
            match attr {
                DnAttribute::String { tag, printable: _, value } => {
                    tlv.write_string(*tag, value)
                        .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
                }
                DnAttribute::MatterId { tag, value } => {
                    let width = matter_width(*tag)
                        .ok_or_else(|| CodecError::InvalidDn(format!("unknown tag {tag}")))?;
                    if width == 4 {
                        tlv.write_uint32(*tag, *value as u32)
                    } else {
                        tlv.write_uint64(*tag, *value)
                    }
                    .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
                }
            }
        }
        tlv.write_struct_end()
            .map_err(|e| CodecError::InvalidCertificate(e.to_string()))?;
        Ok(())
    }

    pub fn decode_tlv(item: &TlvItem, list_tag: u8) -> CodecResult<Self> {
        let mut dn = DistinguishedName::new();
        let Some(TlvItemValue::List(children)) = item.get(&[list_tag]) else {
            return Ok(dn);
        };
        for child in children {
            let attr = match &child.value {
                TlvItemValue::String(s) => DnAttribute::String {
                    tag: child.tag & 0x7f,
                    printable: child.tag & 0x80 != 0,
                    value: s.clone(),
                },
                TlvItemValue::Int(v) => {
                    if matter_width(child.tag).is_none() {
                        continue;
                    }
                    DnAttribute::MatterId { tag: child.tag, value: *v }
                }
                _ => continue,
            };
            dn.push(attr)?;
        }
        Ok(dn)
    }
}

pub(crate) fn oid_for_tag(tag: u8) -> CodecResult<String> {
    if let Some(oid) = matter_oid(tag) {
        return Ok(oid);
    }
    string_oid(tag).map(str::to_owned).ok_or_else(|| CodecError::InvalidDn(format!("unknown tag {tag}")))
}

pub(crate) fn tag_for_oid(oid: &str) -> Option<u8> {
    tag_for_matter_oid(oid).or_else(|| tag_for_string_oid(oid))
}

pub(crate) fn width_for_tag(tag: u8) -> Option<u8> {
    matter_width(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_string_round_trip() {
        let s = matter_specific_to_hex_string(0xDEDEDEDE00010001, 8);
        assert_eq!(s, "DEDEDEDE00010001");
        assert_eq!(hex_string_to_matter_specific(&s).unwrap(), 0xDEDEDEDE00010001);

        let s = matter_specific_to_hex_string(0xABCD, 4);
        assert_eq!(s, "0000ABCD");
        assert_eq!(hex_string_to_matter_specific(&s).unwrap(), 0xABCD);
    }

    #[test]
    fn dn_encode_decode_round_trip() {
        let mut dn = DistinguishedName::new();
        dn.push(DnAttribute::MatterId { tag: TAG_NODE_ID, value: 0x1122 }).unwrap();
        dn.push(DnAttribute::MatterId { tag: TAG_FABRIC_ID, value: 0x3344 }).unwrap();
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().unwrap();
        dn.encode_tlv(&mut tlv, 6).unwrap();
        tlv.write_struct_end().unwrap();
        let decoded = crate::tlv::decode_tlv(&tlv.data).unwrap();
        let back = DistinguishedName::decode_tlv(&decoded, 6).unwrap();
        assert_eq!(dn, back);
    }

    #[test]
    fn noc_cat_limit_enforced() {
        let mut dn = DistinguishedName::new();
        for i in 0..MAX_NOC_CATS {
            dn.push(DnAttribute::MatterId { tag: TAG_NOC_CAT, value: i as u64 }).unwrap();
        }
        assert!(dn
            .push(DnAttribute::MatterId { tag: TAG_NOC_CAT, value: 99 })
            .is_err());
    }
}
