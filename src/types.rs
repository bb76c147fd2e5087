//! Shared value types handed between the engines (C3/C4) and the manager (C5).

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::tlv::{TlvBuffer, TlvItem, TlvItemValue};

/// Seconds since the Unix epoch corresponding to the Matter epoch
/// (2000-01-01T00:00:00Z), used to convert Matter `not-before`/`not-after`
/// fields to/from calendar time.
pub const MATTER_EPOCH_UNIX_SECONDS: u64 = 946_684_800;

/// `not-after = 0` means "does not expire"; on the X.509 side this is
/// represented as GeneralizedTime `99991231235959Z`.
pub const X509_NO_EXPIRY_UNIX_SECONDS: u64 = 253_402_300_799;

/// Role a PASE or CASE engine instance is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Which handshake protocol a [`crate::manager::HandshakeContext`] is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    Pase,
    Case,
}

/// Three 16-byte keys derived at the end of a successful handshake
/// (spec §3 `SessionKeys`).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub i2r_key: [u8; 16],
    pub r2i_key: [u8; 16],
    pub attestation_challenge: [u8; 16],
}

impl SessionKeys {
    /// Split a 48-byte HKDF output into the three session keys, in the order
    /// every key schedule in this crate uses (spec §4.3/§4.4): I2R, R2I, AC.
    pub fn from_okm(okm: &[u8]) -> Option<Self> {
        if okm.len() != 48 {
            return None;
        }
        let mut i2r_key = [0u8; 16];
        let mut r2i_key = [0u8; 16];
        let mut attestation_challenge = [0u8; 16];
        i2r_key.copy_from_slice(&okm[0..16]);
        r2i_key.copy_from_slice(&okm[16..32]);
        attestation_challenge.copy_from_slice(&okm[32..48]);
        Some(Self {
            i2r_key,
            r2i_key,
            attestation_challenge,
        })
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Output of a successful PASE or CASE handshake (spec §3 `SecureContext`),
/// handed to the external session store and owned by it thereafter.
#[derive(Debug, Clone)]
pub struct SecureContext {
    pub handshake_type: HandshakeType,
    pub role: Role,
    pub local_session_id: u16,
    pub peer_session_id: u16,
    pub i2r_key: [u8; 16],
    pub r2i_key: [u8; 16],
    pub attestation_challenge: [u8; 16],
    pub fabric_index: Option<u16>,
    pub peer_node_id: Option<u64>,
    pub local_node_id: Option<u64>,
    pub case_auth_tags: Option<Vec<u32>>,
    pub shared_secret: Option<Vec<u8>>,
    pub resumption_id: Option<[u8; 16]>,
}

impl SecureContext {
    pub fn from_session_keys(
        handshake_type: HandshakeType,
        role: Role,
        local_session_id: u16,
        peer_session_id: u16,
        keys: &SessionKeys,
    ) -> Self {
        Self {
            handshake_type,
            role,
            local_session_id,
            peer_session_id,
            i2r_key: keys.i2r_key,
            r2i_key: keys.r2i_key,
            attestation_challenge: keys.attestation_challenge,
            fabric_index: None,
            peer_node_id: None,
            local_node_id: None,
            case_auth_tags: None,
            shared_secret: None,
            resumption_id: None,
        }
    }
}

/// MRP timing hints that may accompany any handshake message (spec §6).
/// Fields are omitted on the wire when zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionParameters {
    pub idle_retrans_ms: u32,
    pub active_retrans_ms: u32,
    pub active_threshold_ms: u16,
}

impl SessionParameters {
    pub fn encode_tlv(&self, tlv: &mut TlvBuffer, tag: u8) -> std::io::Result<()> {
        tlv.write_struct(tag)?;
        if self.idle_retrans_ms != 0 {
            tlv.write_uint32(1, self.idle_retrans_ms)?;
        }
        if self.active_retrans_ms != 0 {
            tlv.write_uint32(2, self.active_retrans_ms)?;
        }
        if self.active_threshold_ms != 0 {
            tlv.write_uint16(3, self.active_threshold_ms)?;
        }
        tlv.write_struct_end()
    }

    pub fn decode_tlv(item: &TlvItem, tag: u8) -> Option<Self> {
        let TlvItemValue::List(children) = item.get(&[tag])? else {
            return None;
        };
        let mut out = Self::default();
        for child in children {
            match (child.tag, &child.value) {
                (1, TlvItemValue::Int(v)) => out.idle_retrans_ms = *v as u32,
                (2, TlvItemValue::Int(v)) => out.active_retrans_ms = *v as u32,
                (3, TlvItemValue::Int(v)) => out.active_threshold_ms = *v as u16,
                _ => {}
            }
        }
        Some(out)
    }
}
