//! StatusReport codec for the Secure Channel protocol (spec §6).
//!
//! Fixed 8-byte little-endian header — `general_code:u16 || protocol_id:u32
//! || protocol_code:u16` — followed by an optional payload whose shape
//! depends on the protocol code (only `Busy` carries one: a 2-byte
//! little-endian wait-time in milliseconds).

use crate::error::{CodecError, CodecResult};

pub const SECURE_CHANNEL_PROTOCOL_ID: u32 = 0x0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralCode {
    Success = 0,
    Failure = 1,
    BadPrecondition = 2,
    OutOfRange = 3,
    BadRequest = 4,
    Unsupported = 5,
    Unexpected = 6,
    ResourceExhausted = 7,
    Busy = 8,
    Timeout = 9,
    Continue = 10,
    Aborted = 11,
    InvalidArgument = 12,
    NotFound = 13,
    AlreadyExists = 14,
    PermissionDenied = 15,
    DataLoss = 16,
}

impl GeneralCode {
    fn from_u16(v: u16) -> CodecResult<Self> {
        use GeneralCode::*;
        Ok(match v {
            0 => Success,
            1 => Failure,
            2 => BadPrecondition,
            3 => OutOfRange,
            4 => BadRequest,
            5 => Unsupported,
            6 => Unexpected,
            7 => ResourceExhausted,
            8 => Busy,
            9 => Timeout,
            10 => Continue,
            11 => Aborted,
            12 => InvalidArgument,
            13 => NotFound,
            14 => AlreadyExists,
            15 => PermissionDenied,
            16 => DataLoss,
            other => return Err(CodecError::InvalidCertificate(format!("unknown general code {other}"))),
        })
    }
}

/// Protocol codes for the Secure Channel protocol (protocol-id `0x0000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolCode {
    Success = 0x0000,
    NoSharedTrustRoots = 0x0001,
    InvalidParameter = 0x0002,
    CloseSession = 0x0003,
    Busy = 0x0004,
    SessionNotFound = 0x0005,
    GeneralFailure = 0xFFFF,
}

impl ProtocolCode {
    fn from_u16(v: u16) -> Self {
        match v {
            0x0000 => ProtocolCode::Success,
            0x0001 => ProtocolCode::NoSharedTrustRoots,
            0x0002 => ProtocolCode::InvalidParameter,
            0x0003 => ProtocolCode::CloseSession,
            0x0004 => ProtocolCode::Busy,
            0x0005 => ProtocolCode::SessionNotFound,
            _ => ProtocolCode::GeneralFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub general_code: GeneralCode,
    pub protocol_id: u32,
    pub protocol_code: ProtocolCode,
    pub data: Vec<u8>,
}

impl StatusReport {
    pub fn secure_channel_success() -> Self {
        Self {
            general_code: GeneralCode::Success,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::Success,
            data: Vec::new(),
        }
    }

    pub fn close_session() -> Self {
        Self {
            general_code: GeneralCode::Success,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::CloseSession,
            data: Vec::new(),
        }
    }

    pub fn busy(wait_ms: u16) -> Self {
        Self {
            general_code: GeneralCode::Busy,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::Busy,
            data: wait_ms.to_le_bytes().to_vec(),
        }
    }

    pub fn no_shared_trust_roots() -> Self {
        Self {
            general_code: GeneralCode::Failure,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::NoSharedTrustRoots,
            data: Vec::new(),
        }
    }

    pub fn invalid_parameter() -> Self {
        Self {
            general_code: GeneralCode::BadRequest,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::InvalidParameter,
            data: Vec::new(),
        }
    }

    pub fn session_not_found() -> Self {
        Self {
            general_code: GeneralCode::NotFound,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::SessionNotFound,
            data: Vec::new(),
        }
    }

    pub fn general_failure() -> Self {
        Self {
            general_code: GeneralCode::Failure,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: ProtocolCode::GeneralFailure,
            data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.general_code == GeneralCode::Success && self.protocol_code == ProtocolCode::Success
    }

    pub fn is_busy(&self) -> bool {
        self.protocol_code == ProtocolCode::Busy
    }

    pub fn is_close_session(&self) -> bool {
        self.protocol_code == ProtocolCode::CloseSession
    }

    /// Wait time in milliseconds carried by a `Busy` status, if this is one.
    pub fn busy_wait_ms(&self) -> Option<u16> {
        if !self.is_busy() || self.data.len() != 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.data[0], self.data[1]]))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len());
        out.extend_from_slice(&(self.general_code as u16).to_le_bytes());
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        out.extend_from_slice(&(self.protocol_code as u16).to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < 8 {
            return Err(CodecError::InvalidCertificate("status report shorter than 8 bytes".into()));
        }
        let general_code = GeneralCode::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))?;
        let protocol_id = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let protocol_code = ProtocolCode::from_u16(u16::from_le_bytes([bytes[6], bytes[7]]));
        let data = bytes[8..].to_vec();
        Ok(Self { general_code, protocol_id, protocol_code, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_success() {
        let report = StatusReport::secure_channel_success();
        let decoded = StatusReport::decode(&report.encode()).unwrap();
        assert_eq!(report, decoded);
        assert!(decoded.is_success());
    }

    #[test]
    fn round_trips_busy_wait_times() {
        for wait_ms in [0u16, 1, 5000, 65535] {
            let report = StatusReport::busy(wait_ms);
            let decoded = StatusReport::decode(&report.encode()).unwrap();
            assert_eq!(report, decoded);
            assert_eq!(decoded.busy_wait_ms(), Some(wait_ms));
        }
    }

    #[test]
    fn close_session_is_recognised() {
        let report = StatusReport::close_session();
        let decoded = StatusReport::decode(&report.encode()).unwrap();
        assert!(decoded.is_close_session());
    }
}
