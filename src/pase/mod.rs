//! PASE (SPAKE2+) handshake state machine (C3, spec §4.3).

mod spake2p;

pub use spake2p::{create_verifier, Verifier};

use crate::error::{EngineError, EngineResult};
use crate::tlv::{self, TlvBuffer, TlvItemValue};
use crate::types::{Role, SessionKeys, SessionParameters};
use crate::util::cryptoutil;

const TRANSCRIPT_CONTEXT: &[u8] = b"CHIP PAKE V1 Commissioning";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaseState {
    Init,
    WaitingPbkdfResponse,
    WaitingPake1,
    WaitingPake2,
    WaitingPake3,
    WaitingStatusReport,
    Complete,
    Failed,
}

struct PbkdfParamRequest {
    init_random: [u8; 32],
    init_sid: u16,
    passcode_id: u16,
    has_params: bool,
    mrp: Option<SessionParameters>,
}

impl PbkdfParamRequest {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.init_random).map_err(tlv_err)?;
        tlv.write_uint16(2, self.init_sid).map_err(tlv_err)?;
        tlv.write_uint16(3, self.passcode_id).map_err(tlv_err)?;
        tlv.write_bool(4, self.has_params).map_err(tlv_err)?;
        if let Some(mrp) = &self.mrp {
            mrp.encode_tlv(&mut tlv, 5).map_err(tlv_err)?;
        }
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let init_random = fixed32(&item, 1)?;
        let init_sid = item.get_u16(&[2]).ok_or_else(|| missing("init_sid"))?;
        let passcode_id = item.get_u16(&[3]).unwrap_or(0);
        let has_params = item.get_bool(&[4]).unwrap_or(false);
        let mrp = SessionParameters::decode_tlv(&item, 5);
        Ok(Self { init_random, init_sid, passcode_id, has_params, mrp })
    }
}

struct PbkdfParamResponse {
    init_random: [u8; 32],
    resp_random: [u8; 32],
    resp_sid: u16,
    params: Option<(u32, Vec<u8>)>,
    mrp: Option<SessionParameters>,
}

impl PbkdfParamResponse {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.init_random).map_err(tlv_err)?;
        tlv.write_octetstring(2, &self.resp_random).map_err(tlv_err)?;
        tlv.write_uint16(3, self.resp_sid).map_err(tlv_err)?;
        if let Some((iterations, salt)) = &self.params {
            tlv.write_struct(4).map_err(tlv_err)?;
            tlv.write_uint32(1, *iterations).map_err(tlv_err)?;
            tlv.write_octetstring(2, salt).map_err(tlv_err)?;
            tlv.write_struct_end().map_err(tlv_err)?;
        }
        if let Some(mrp) = &self.mrp {
            mrp.encode_tlv(&mut tlv, 5).map_err(tlv_err)?;
        }
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let init_random = fixed32(&item, 1)?;
        let resp_random = fixed32(&item, 2)?;
        let resp_sid = item.get_u16(&[3]).ok_or_else(|| missing("resp_sid"))?;
        let params = match item.get(&[4]) {
            Some(TlvItemValue::List(_)) => {
                let item4 = item.get_item(&[4]).ok_or_else(|| missing("params"))?;
                let iterations = item4.get_u32(&[1]).ok_or_else(|| missing("iterations"))?;
                let salt = item4
                    .get_octet_string_owned(&[2])
                    .ok_or_else(|| missing("salt"))?;
                Some((iterations, salt))
            }
            _ => None,
        };
        let mrp = SessionParameters::decode_tlv(&item, 5);
        Ok(Self { init_random, resp_random, resp_sid, params, mrp })
    }
}

struct Pake1 {
    p_a: [u8; 65],
}

impl Pake1 {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.p_a).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        Ok(Self { p_a: fixed65(&item, 1)? })
    }
}

struct Pake2 {
    p_b: [u8; 65],
    c_b: [u8; 32],
}

impl Pake2 {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.p_b).map_err(tlv_err)?;
        tlv.write_octetstring(2, &self.c_b).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        Ok(Self { p_b: fixed65(&item, 1)?, c_b: fixed32(&item, 2)? })
    }
}

struct Pake3 {
    c_a: [u8; 32],
}

impl Pake3 {
    fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut tlv = TlvBuffer::new();
        tlv.write_anon_struct().map_err(tlv_err)?;
        tlv.write_octetstring(1, &self.c_a).map_err(tlv_err)?;
        tlv.write_struct_end().map_err(tlv_err)?;
        Ok(tlv.data)
    }

    fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let item = tlv::decode_tlv(bytes).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        Ok(Self { c_a: fixed32(&item, 1)? })
    }
}

fn fixed32(item: &tlv::TlvItem, tag: u8) -> EngineResult<[u8; 32]> {
    let bytes = item
        .get_octet_string(&[tag])
        .ok_or_else(|| EngineError::InvalidMessage(format!("missing octet string at tag {tag}")))?;
    if bytes.len() != 32 {
        return Err(EngineError::InvalidMessage(format!("tag {tag} must be 32 bytes")));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn fixed65(item: &tlv::TlvItem, tag: u8) -> EngineResult<[u8; 65]> {
    let bytes = item
        .get_octet_string(&[tag])
        .ok_or_else(|| EngineError::InvalidMessage(format!("missing octet string at tag {tag}")))?;
    if bytes.len() != 65 {
        return Err(EngineError::InvalidMessage(format!("tag {tag} must be 65 bytes")));
    }
    let mut out = [0u8; 65];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn missing(what: &str) -> EngineError {
    EngineError::InvalidMessage(format!("missing {what}"))
}

fn tlv_err(e: std::io::Error) -> EngineError {
    EngineError::InvalidMessage(e.to_string())
}

/// One side of a PASE handshake. Holds only handshake-scoped state; on
/// success the caller pulls [`PaseEngine::session_keys`] and discards the
/// engine, which zeroises its secrets on drop via the underlying scalars'
/// own `Drop` impls (the `p256`/`pbkdf2` crates already zeroise).
pub struct PaseEngine {
    role: Role,
    state: PaseState,
    local_session_id: u16,
    peer_session_id: Option<u16>,
    passcode: Option<u32>,
    verifier: Option<Verifier>,
    salt: Option<Vec<u8>>,
    iterations: Option<u32>,
    prover_ctx: Option<spake2p::ProverContext>,
    verifier_ctx: Option<spake2p::VerifierContext>,
    request_bytes: Option<Vec<u8>>,
    response_bytes: Option<Vec<u8>>,
    confirm_expected: Option<Vec<u8>>,
    session_keys: Option<SessionKeys>,
}

impl PaseEngine {
    pub fn new_initiator(local_session_id: u16, passcode: u32) -> EngineResult<Self> {
        spake2p::validate_passcode(passcode)?;
        Ok(Self {
            role: Role::Initiator,
            state: PaseState::Init,
            local_session_id,
            peer_session_id: None,
            passcode: Some(passcode),
            verifier: None,
            salt: None,
            iterations: None,
            prover_ctx: None,
            verifier_ctx: None,
            request_bytes: None,
            response_bytes: None,
            confirm_expected: None,
            session_keys: None,
        })
    }

    pub fn new_responder(local_session_id: u16, verifier: Verifier, salt: Vec<u8>, iterations: u32) -> EngineResult<Self> {
        spake2p::validate_salt(&salt)?;
        spake2p::validate_iterations(iterations)?;
        Ok(Self {
            role: Role::Responder,
            state: PaseState::Init,
            local_session_id,
            peer_session_id: None,
            passcode: None,
            verifier: Some(verifier),
            salt: Some(salt),
            iterations: Some(iterations),
            prover_ctx: None,
            verifier_ctx: None,
            request_bytes: None,
            response_bytes: None,
            confirm_expected: None,
            session_keys: None,
        })
    }

    pub fn state(&self) -> PaseState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_session_id(&self) -> u16 {
        self.local_session_id
    }

    pub fn peer_session_id(&self) -> Option<u16> {
        self.peer_session_id
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.session_keys.as_ref()
    }

    /// Initiator entry point: builds and records PBKDFParamRequest.
    pub fn start(&mut self) -> EngineResult<Vec<u8>> {
        if self.role != Role::Initiator || self.state != PaseState::Init {
            return Err(EngineError::InvalidState);
        }
        let mut init_random = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut init_random);
        let request = PbkdfParamRequest {
            init_random,
            init_sid: self.local_session_id,
            passcode_id: 0,
            has_params: false,
            mrp: None,
        };
        let bytes = request.encode()?;
        self.request_bytes = Some(bytes.clone());
        self.state = PaseState::WaitingPbkdfResponse;
        Ok(bytes)
    }

    /// Responder entry point: consumes PBKDFParamRequest, returns PBKDFParamResponse.
    pub fn handle_pbkdf_param_request(&mut self, payload: &[u8]) -> EngineResult<Vec<u8>> {
        if self.role != Role::Responder || self.state != PaseState::Init {
            return Err(EngineError::InvalidState);
        }
        self.request_bytes = Some(payload.to_vec());
        let request = PbkdfParamRequest::decode(payload)?;
        self.peer_session_id = Some(request.init_sid);

        let mut resp_random = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut resp_random);
        let response = PbkdfParamResponse {
            init_random: request.init_random,
            resp_random,
            resp_sid: self.local_session_id,
            params: if request.has_params {
                None
            } else {
                Some((self.iterations.unwrap(), self.salt.clone().unwrap()))
            },
            mrp: None,
        };
        let bytes = response.encode()?;
        self.response_bytes = Some(bytes.clone());

        let verifier = self.verifier.clone().expect("responder always holds a verifier");
        self.verifier_ctx = Some(spake2p::start_verifier(&verifier)?);
        self.state = PaseState::WaitingPake1;
        Ok(bytes)
    }

    /// Initiator: consumes PBKDFParamResponse, returns Pake1.
    pub fn handle_pbkdf_param_response(&mut self, payload: &[u8]) -> EngineResult<Vec<u8>> {
        if self.role != Role::Initiator || self.state != PaseState::WaitingPbkdfResponse {
            return Err(EngineError::InvalidState);
        }
        let response = PbkdfParamResponse::decode(payload)?;
        let request = PbkdfParamRequest::decode(self.request_bytes.as_ref().unwrap())?;
        if response.init_random != request.init_random {
            return Err(EngineError::RandomMismatch);
        }
        self.peer_session_id = Some(response.resp_sid);
        self.response_bytes = Some(payload.to_vec());

        let (iterations, salt) = response
            .params
            .ok_or_else(|| EngineError::InvalidMessage("responder omitted PBKDF parameters".into()))?;
        self.iterations = Some(iterations);
        self.salt = Some(salt.clone());

        let passcode = self.passcode.expect("initiator always holds a passcode");
        let ctx = spake2p::start_prover_from_passcode(passcode, &salt, iterations)?;
        let pake1 = Pake1 { p_a: ctx.x };
        self.prover_ctx = Some(ctx);
        let bytes = pake1.encode()?;
        self.state = PaseState::WaitingPake2;
        Ok(bytes)
    }

    /// Responder: consumes Pake1, returns Pake2.
    pub fn handle_pake1(&mut self, payload: &[u8]) -> EngineResult<Vec<u8>> {
        if self.role != Role::Responder || self.state != PaseState::WaitingPake1 {
            return Err(EngineError::InvalidState);
        }
        let pake1 = Pake1::decode(payload)?;
        let ctx = self.verifier_ctx.as_ref().expect("set in handle_pbkdf_param_request");
        let context_hash = self.transcript_hash()?;
        let completion = spake2p::finish_verifier(ctx, &pake1.p_a, &context_hash)?;

        self.confirm_expected = Some(completion.confirm_peer_expected.clone());
        self.session_keys = SessionKeys::from_okm(&completion.shared_secret);

        let pake2 = Pake2 {
            p_b: ctx.y,
            c_b: completion.confirm_own.clone().try_into().map_err(|_| {
                EngineError::InvalidMessage("confirmation value must be 32 bytes".into())
            })?,
        };
        let bytes = pake2.encode()?;
        self.state = PaseState::WaitingPake3;
        Ok(bytes)
    }

    /// Initiator: consumes Pake2, returns Pake3. Fails with
    /// [`EngineError::ConfirmationFailed`] on a wrong passcode.
    pub fn handle_pake2(&mut self, payload: &[u8]) -> EngineResult<Vec<u8>> {
        if self.role != Role::Initiator || self.state != PaseState::WaitingPake2 {
            return Err(EngineError::InvalidState);
        }
        let pake2 = Pake2::decode(payload)?;
        let ctx = self.prover_ctx.as_ref().expect("set in handle_pbkdf_param_response");
        let context_hash = self.transcript_hash()?;
        let completion = match spake2p::finish_prover(ctx, &pake2.p_b, &context_hash) {
            Ok(c) => c,
            Err(e) => {
                self.state = PaseState::Failed;
                return Err(e);
            }
        };

        if !cryptoutil::ct_eq(&completion.confirm_peer_expected, &pake2.c_b) {
            self.state = PaseState::Failed;
            return Err(EngineError::ConfirmationFailed);
        }

        self.session_keys = SessionKeys::from_okm(&completion.shared_secret);

        let pake3 = Pake3 {
            c_a: completion
                .confirm_own
                .try_into()
                .map_err(|_| EngineError::InvalidMessage("confirmation value must be 32 bytes".into()))?,
        };
        let bytes = pake3.encode()?;
        self.state = PaseState::WaitingStatusReport;
        Ok(bytes)
    }

    /// Responder: consumes Pake3, returns a Success StatusReport.
    pub fn handle_pake3(&mut self, payload: &[u8]) -> EngineResult<Vec<u8>> {
        if self.role != Role::Responder || self.state != PaseState::WaitingPake3 {
            return Err(EngineError::InvalidState);
        }
        let pake3 = Pake3::decode(payload)?;
        let expected = self.confirm_expected.as_ref().expect("set in handle_pake1");
        if !cryptoutil::ct_eq(expected, &pake3.c_a) {
            self.state = PaseState::Failed;
            return Err(EngineError::ConfirmationFailed);
        }
        self.state = PaseState::Complete;
        Ok(crate::status::StatusReport::secure_channel_success().encode())
    }

    /// Initiator: consumes the responder's final StatusReport.
    pub fn handle_status_report(&mut self, payload: &[u8]) -> EngineResult<()> {
        if self.role != Role::Initiator || self.state != PaseState::WaitingStatusReport {
            return Err(EngineError::InvalidState);
        }
        let report = crate::status::StatusReport::decode(payload)
            .map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        if report.is_success() {
            self.state = PaseState::Complete;
            Ok(())
        } else {
            self.state = PaseState::Failed;
            Err(EngineError::InvalidMessage(format!("PASE failed: {report:?}")))
        }
    }

    fn transcript_hash(&self) -> EngineResult<[u8; 32]> {
        let mut buf = Vec::new();
        buf.extend_from_slice(TRANSCRIPT_CONTEXT);
        buf.extend_from_slice(
            self.request_bytes
                .as_ref()
                .ok_or_else(|| missing("PBKDFParamRequest"))?,
        );
        buf.extend_from_slice(
            self.response_bytes
                .as_ref()
                .ok_or_else(|| missing("PBKDFParamResponse"))?,
        );
        let mut out = [0u8; 32];
        out.copy_from_slice(&cryptoutil::sha256(&buf));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_happy_path(passcode_initiator: u32, passcode_responder: u32) -> Result<(PaseEngine, PaseEngine), EngineError> {
        let verifier = create_verifier(passcode_responder, b"SPAKE2P Key Salt", 1000).unwrap();
        let mut initiator = PaseEngine::new_initiator(1, passcode_initiator).unwrap();
        let mut responder = PaseEngine::new_responder(2, verifier, b"SPAKE2P Key Salt".to_vec(), 1000).unwrap();

        let request = initiator.start().unwrap();
        let response = responder.handle_pbkdf_param_request(&request).unwrap();
        let pake1 = initiator.handle_pbkdf_param_response(&response).unwrap();
        let pake2 = responder.handle_pake1(&pake1).unwrap();
        let pake3 = initiator.handle_pake2(&pake2)?;
        let status = responder.handle_pake3(&pake3).unwrap();
        initiator.handle_status_report(&status).unwrap();
        Ok((initiator, responder))
    }

    #[test]
    fn pase_happy_path_derives_matching_keys() {
        let (initiator, responder) = run_happy_path(20_202_021, 20_202_021).unwrap();
        assert_eq!(initiator.state(), PaseState::Complete);
        assert_eq!(responder.state(), PaseState::Complete);
        let ik = initiator.session_keys().unwrap();
        let rk = responder.session_keys().unwrap();
        assert_eq!(ik.i2r_key, rk.i2r_key);
        assert_eq!(ik.r2i_key, rk.r2i_key);
        assert_eq!(ik.attestation_challenge, rk.attestation_challenge);
        assert_eq!(initiator.peer_session_id(), Some(2));
        assert_eq!(responder.peer_session_id(), Some(1));
    }

    #[test]
    fn pase_wrong_passcode_fails_confirmation() {
        let err = run_happy_path(12_341_234, 20_202_021).unwrap_err();
        assert_eq!(err, EngineError::ConfirmationFailed);
    }
}
