//! Secure-Channel Manager (C5, spec §4.5): the stateful coordinator between
//! the transport and the PASE/CASE engines. Routes opcodes on the Secure
//! Channel protocol (protocol-id `0x0000`) to the right handshake, enforces
//! the collision/Busy policy, and hands completed handshakes to the session
//! store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::case::{CaseEngine, CaseState, OperationalCredentialStore, ResumptionStore};
use crate::chain::ChainValidator;
use crate::error::{EngineError, ManagerError, ManagerResult};
use crate::fabric::FabricStore;
use crate::pase::{PaseEngine, PaseState, Verifier};
use crate::status::StatusReport;
use crate::types::{HandshakeType, Role, SecureContext};

pub const OP_PBKDF_PARAM_REQUEST: u8 = 0x20;
pub const OP_PBKDF_PARAM_RESPONSE: u8 = 0x21;
pub const OP_PAKE1: u8 = 0x22;
pub const OP_PAKE2: u8 = 0x23;
pub const OP_PAKE3: u8 = 0x24;
pub const OP_SIGMA1: u8 = 0x30;
pub const OP_SIGMA2: u8 = 0x31;
pub const OP_SIGMA3: u8 = 0x32;
pub const OP_SIGMA2_RESUME: u8 = 0x33;
pub const OP_STATUS_REPORT: u8 = 0x40;
pub const OP_STANDALONE_ACK: u8 = 0x10;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);
const BUSY_WAIT_MS: u16 = 5000;
const BUSY_WAIT_MS_LATE: u16 = 10000;

/// `AllocateSessionID`/`AddSecureContext`/`FindSecureContext`/
/// `RemoveSecureContext` (spec §6 *SessionStore*). Implemented by the caller;
/// this crate never persists sessions itself.
pub trait SessionStore: Send + Sync {
    fn allocate_session_id(&self) -> ManagerResult<u16>;
    fn add_secure_context(&self, ctx: SecureContext) -> ManagerResult<()>;
    fn find_secure_context(&self, local_sid: u16) -> Option<SecureContext>;
    fn remove_secure_context(&self, local_sid: u16);
}

/// `OnSessionEstablished`/`OnSessionError`/`OnSessionClosed`/`OnResponderBusy`
/// (spec §4.5). Every method has a no-op default so a caller only overrides
/// the events it cares about.
pub trait ManagerCallbacks: Send + Sync {
    fn on_session_established(&self, _ctx: &SecureContext) {}
    fn on_session_error(&self, _err: &str, _stage: &str) {}
    fn on_session_closed(&self, _local_sid: u16) {}
    fn on_responder_busy(&self, _wait_ms: u16) {}
}

#[derive(Clone)]
struct PaseResponderConfig {
    verifier: Verifier,
    salt: Vec<u8>,
    iterations: u32,
}

enum HandshakeEngine {
    Pase(PaseEngine),
    Case(CaseEngine),
}

impl HandshakeEngine {
    fn is_past_sigma2(&self) -> bool {
        match self {
            HandshakeEngine::Pase(_) => false,
            HandshakeEngine::Case(e) => e.is_past_sigma2(),
        }
    }
}

struct HandshakeContext {
    engine: HandshakeEngine,
    created_at: Instant,
}

fn busy_wait_ms(ctx: &HandshakeContext) -> u16 {
    if ctx.engine.is_past_sigma2() {
        BUSY_WAIT_MS_LATE
    } else {
        BUSY_WAIT_MS
    }
}

/// Stateful coordinator between the transport and the two engines (spec
/// §4.5). Every entry point acquires the manager-wide lock for the
/// inspection/mutation of `handshakes`/`pase_responder` only; crypto, the
/// session store and the fabric store are called without the lock held
/// except where spec §5 requires `AllocateSessionID` to be lock-safe, and
/// callbacks always fire after the lock is released.
pub struct SecureChannelManager {
    handshakes: RwLock<HashMap<u64, HandshakeContext>>,
    pase_responder: RwLock<Option<PaseResponderConfig>>,
    session_store: Box<dyn SessionStore>,
    fabric_store: Box<dyn FabricStore>,
    credentials: Box<dyn OperationalCredentialStore>,
    resumption_store: Option<Box<dyn ResumptionStore>>,
    chain_validator: ChainValidator,
    callbacks: Box<dyn ManagerCallbacks>,
}

impl SecureChannelManager {
    pub fn new(
        session_store: Box<dyn SessionStore>,
        fabric_store: Box<dyn FabricStore>,
        credentials: Box<dyn OperationalCredentialStore>,
        resumption_store: Option<Box<dyn ResumptionStore>>,
        callbacks: Box<dyn ManagerCallbacks>,
    ) -> Self {
        Self {
            handshakes: RwLock::new(HashMap::new()),
            pase_responder: RwLock::new(None),
            session_store,
            fabric_store,
            credentials,
            resumption_store,
            chain_validator: ChainValidator::new(),
            callbacks,
        }
    }

    pub fn has_active_handshake(&self, exchange_id: u64) -> bool {
        self.handshakes.read().unwrap().contains_key(&exchange_id)
    }

    pub fn active_handshake_count(&self) -> usize {
        self.handshakes.read().unwrap().len()
    }

    /// Opens the commissioning window: PASE responses will be built from
    /// this verifier until [`SecureChannelManager::clear_pase_responder`].
    pub fn set_pase_responder(&self, verifier: Verifier, salt: Vec<u8>, iterations: u32) {
        *self.pase_responder.write().unwrap() = Some(PaseResponderConfig { verifier, salt, iterations });
    }

    pub fn clear_pase_responder(&self) {
        *self.pase_responder.write().unwrap() = None;
    }

    /// Initiator entry point: allocates a session id, starts a PASE engine,
    /// returns the PBKDFParamRequest bytes. `HandshakeInProgress` if this
    /// exchange already has an active handshake.
    pub fn start_pase(&self, exchange_id: u64, passcode: u32) -> ManagerResult<Vec<u8>> {
        self.reject_if_active(exchange_id)?;
        let local_sid = self.session_store.allocate_session_id()?;
        let mut engine = PaseEngine::new_initiator(local_sid, passcode)?;
        let bytes = engine.start()?;
        self.insert_handshake(exchange_id, HandshakeEngine::Pase(engine))?;
        info!("PASE initiator started on exchange {exchange_id:#x}, local session {local_sid}");
        Ok(bytes)
    }

    /// Initiator entry point: allocates a session id, starts a CASE engine
    /// against the given fabric, returns the Sigma1 bytes.
    pub fn start_case(
        &self,
        exchange_id: u64,
        fabric_index: u16,
        target_node_id: u64,
        resumption: Option<([u8; 16], Vec<u8>)>,
    ) -> ManagerResult<Vec<u8>> {
        self.reject_if_active(exchange_id)?;
        let fabric = find_fabric_by_index(self.fabric_store.as_ref(), fabric_index)
            .ok_or(ManagerError::Engine(EngineError::NoSharedRoot))?;
        let signing_key = self
            .credentials
            .signing_key(fabric_index)
            .ok_or_else(|| ManagerError::Engine(EngineError::InvalidMessage("no operational key for fabric".into())))?;
        let local_sid = self.session_store.allocate_session_id()?;
        let mut engine = CaseEngine::new_initiator(local_sid, fabric, signing_key, target_node_id);
        if let Some((resumption_id, prev_shared_secret)) = resumption {
            engine = engine.with_resumption(resumption_id, prev_shared_secret);
        }
        let bytes = engine.start()?;
        self.insert_handshake(exchange_id, HandshakeEngine::Case(engine))?;
        info!("CASE initiator started on exchange {exchange_id:#x}, local session {local_sid}");
        Ok(bytes)
    }

    /// Dispatches one handshake message and returns the `(opcode, payload)`
    /// to send back, if any (spec §4.5 *Route*). `0x10 StandaloneAck` is
    /// consumed silently; anything outside the opcode whitelist is rejected.
    pub fn route(&self, exchange_id: u64, opcode: u8, payload: &[u8]) -> ManagerResult<Option<(u8, Vec<u8>)>> {
        match opcode {
            OP_STANDALONE_ACK => Ok(None),
            OP_PBKDF_PARAM_REQUEST => self.route_pbkdf_param_request(exchange_id, payload),
            OP_SIGMA1 => self.route_sigma1(exchange_id, payload),
            OP_PBKDF_PARAM_RESPONSE | OP_PAKE1 | OP_PAKE2 | OP_PAKE3 | OP_SIGMA2 | OP_SIGMA3 | OP_SIGMA2_RESUME | OP_STATUS_REPORT => {
                self.route_to_active(exchange_id, opcode, payload)
            }
            other => Err(ManagerError::InvalidOpcode(other)),
        }
    }

    /// Evicts any handshake older than 60s, zeroising its engine and firing
    /// `OnSessionError("handshake timeout", "Timeout")` for each (spec §4.5/§5).
    pub fn cleanup_expired_handshakes(&self) {
        let expired: Vec<u64> = {
            let handshakes = self.handshakes.read().unwrap();
            handshakes
                .iter()
                .filter(|(_, ctx)| ctx.created_at.elapsed() > HANDSHAKE_TIMEOUT)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        {
            let mut handshakes = self.handshakes.write().unwrap();
            for id in &expired {
                handshakes.remove(id);
            }
        }
        for _ in &expired {
            self.callbacks.on_session_error("handshake timeout", "Timeout");
        }
        warn!("evicted {} expired handshake(s)", expired.len());
    }

    /// Separate handler for a StatusReport arriving on an already-established
    /// session (spec §4.5 *Unsolicited statuses*), as opposed to one arriving
    /// mid-handshake via [`SecureChannelManager::route`].
    pub fn handle_unsolicited_status(&self, local_sid: u16, report: &StatusReport) {
        if report.is_close_session() {
            self.session_store.remove_secure_context(local_sid);
            self.callbacks.on_session_closed(local_sid);
        } else if let Some(wait_ms) = report.busy_wait_ms() {
            self.callbacks.on_responder_busy(wait_ms);
        }
    }

    fn reject_if_active(&self, exchange_id: u64) -> ManagerResult<()> {
        if self.handshakes.read().unwrap().contains_key(&exchange_id) {
            return Err(ManagerError::HandshakeInProgress);
        }
        Ok(())
    }

    fn insert_handshake(&self, exchange_id: u64, engine: HandshakeEngine) -> ManagerResult<()> {
        let mut handshakes = self.handshakes.write().unwrap();
        if handshakes.contains_key(&exchange_id) {
            return Err(ManagerError::HandshakeInProgress);
        }
        handshakes.insert(exchange_id, HandshakeContext { engine, created_at: Instant::now() });
        Ok(())
    }

    fn route_pbkdf_param_request(&self, exchange_id: u64, payload: &[u8]) -> ManagerResult<Option<(u8, Vec<u8>)>> {
        if let Some(busy) = self.busy_reply_for_collision(exchange_id) {
            return Ok(Some(busy));
        }
        let config = self.pase_responder.read().unwrap().clone().ok_or(ManagerError::CommissioningWindowNotOpen)?;
        let local_sid = self.session_store.allocate_session_id()?;
        let mut engine = PaseEngine::new_responder(local_sid, config.verifier, config.salt, config.iterations)?;
        let response = engine.handle_pbkdf_param_request(payload)?;

        match self.insert_handshake(exchange_id, HandshakeEngine::Pase(engine)) {
            Ok(()) => Ok(Some((OP_PBKDF_PARAM_RESPONSE, response))),
            Err(ManagerError::HandshakeInProgress) => Ok(self.busy_reply_for_collision(exchange_id)),
            Err(e) => Err(e),
        }
    }

    fn route_sigma1(&self, exchange_id: u64, payload: &[u8]) -> ManagerResult<Option<(u8, Vec<u8>)>> {
        if let Some(busy) = self.busy_reply_for_collision(exchange_id) {
            return Ok(Some(busy));
        }
        let local_sid = self.session_store.allocate_session_id()?;
        let mut engine = CaseEngine::new_responder(local_sid);
        let response = match engine.handle_sigma1(
            payload,
            self.fabric_store.as_ref(),
            self.credentials.as_ref(),
            self.resumption_store.as_deref(),
        ) {
            Ok(bytes) => bytes,
            Err(EngineError::NoSharedRoot) => {
                return Ok(Some((OP_STATUS_REPORT, StatusReport::no_shared_trust_roots().encode())));
            }
            Err(e) => return Err(e.into()),
        };

        if engine.state() == CaseState::Complete {
            // Resumption matched: no HandshakeContext to keep, session is ready now.
            self.register_session(HandshakeEngine::Case(engine));
            return Ok(Some((OP_SIGMA2_RESUME, response)));
        }

        match self.insert_handshake(exchange_id, HandshakeEngine::Case(engine)) {
            Ok(()) => Ok(Some((OP_SIGMA2, response))),
            Err(ManagerError::HandshakeInProgress) => Ok(self.busy_reply_for_collision(exchange_id)),
            Err(e) => Err(e),
        }
    }

    fn busy_reply_for_collision(&self, exchange_id: u64) -> Option<(u8, Vec<u8>)> {
        let handshakes = self.handshakes.read().unwrap();
        let ctx = handshakes.get(&exchange_id)?;
        let wait_ms = busy_wait_ms(ctx);
        Some((OP_STATUS_REPORT, StatusReport::busy(wait_ms).encode()))
    }

    fn route_to_active(&self, exchange_id: u64, opcode: u8, payload: &[u8]) -> ManagerResult<Option<(u8, Vec<u8>)>> {
        let mut engine = {
            let mut handshakes = self.handshakes.write().unwrap();
            let ctx = handshakes.remove(&exchange_id).ok_or(ManagerError::NoActiveHandshake)?;
            ctx.engine
        };

        let outcome = self.step(&mut engine, opcode, payload);

        match outcome {
            Ok(StepOutcome::Continue(reply)) => {
                self.insert_handshake(exchange_id, engine)?;
                Ok(reply.map(|(op, bytes)| (op, bytes)))
            }
            Ok(StepOutcome::Done(reply)) => {
                self.register_session(engine);
                Ok(reply)
            }
            Err(e) => {
                self.callbacks.on_session_error(&e.to_string(), "Handshake");
                Err(e)
            }
        }
    }

    fn step(&self, engine: &mut HandshakeEngine, opcode: u8, payload: &[u8]) -> ManagerResult<StepOutcome> {
        match engine {
            HandshakeEngine::Pase(e) => self.step_pase(e, opcode, payload),
            HandshakeEngine::Case(e) => self.step_case(e, opcode, payload),
        }
    }

    fn step_pase(&self, e: &mut PaseEngine, opcode: u8, payload: &[u8]) -> ManagerResult<StepOutcome> {
        match (opcode, e.role()) {
            (OP_PBKDF_PARAM_RESPONSE, Role::Initiator) => {
                let pake1 = e.handle_pbkdf_param_response(payload)?;
                Ok(StepOutcome::Continue(Some((OP_PAKE1, pake1))))
            }
            (OP_PAKE1, Role::Responder) => {
                let pake2 = e.handle_pake1(payload)?;
                Ok(StepOutcome::Continue(Some((OP_PAKE2, pake2))))
            }
            (OP_PAKE2, Role::Initiator) => {
                let pake3 = e.handle_pake2(payload)?;
                Ok(StepOutcome::Continue(Some((OP_PAKE3, pake3))))
            }
            (OP_PAKE3, Role::Responder) => {
                let status = e.handle_pake3(payload)?;
                Ok(StepOutcome::Done(Some((OP_STATUS_REPORT, status))))
            }
            (OP_STATUS_REPORT, Role::Initiator) => {
                e.handle_status_report(payload)?;
                Ok(StepOutcome::Done(None))
            }
            _ => {
                let _ = e.state();
                Err(ManagerError::InvalidOpcode(opcode))
            }
        }
    }

    fn step_case(&self, e: &mut CaseEngine, opcode: u8, payload: &[u8]) -> ManagerResult<StepOutcome> {
        match (opcode, e.role()) {
            (OP_SIGMA2, Role::Initiator) => {
                let sigma3 = e.handle_sigma2(payload, &self.chain_validator)?;
                Ok(StepOutcome::Continue(Some((OP_SIGMA3, sigma3))))
            }
            (OP_SIGMA2_RESUME, Role::Initiator) => {
                e.handle_sigma2_resume(payload)?;
                Ok(StepOutcome::Done(None))
            }
            (OP_SIGMA3, Role::Responder) => {
                let status = e.handle_sigma3(payload, &self.chain_validator)?;
                Ok(StepOutcome::Done(Some((OP_STATUS_REPORT, status))))
            }
            (OP_STATUS_REPORT, Role::Initiator) => {
                e.handle_status_report(payload)?;
                Ok(StepOutcome::Done(None))
            }
            _ => Err(ManagerError::InvalidOpcode(opcode)),
        }
    }

    /// Assembles and registers the `SecureContext` for a completed handshake
    /// (spec §4.5 *Completion handling*): `OnSessionEstablished` fires after
    /// this returns, with the manager lock already released.
    fn register_session(&self, engine: HandshakeEngine) {
        let ctx = match engine {
            HandshakeEngine::Pase(e) => e.session_keys().map(|keys| {
                SecureContext::from_session_keys(HandshakeType::Pase, e.role(), e.local_session_id(), e.peer_session_id().unwrap_or(0), keys)
            }),
            HandshakeEngine::Case(e) => e.session_keys().map(|keys| {
                let mut ctx = SecureContext::from_session_keys(HandshakeType::Case, e.role(), e.local_session_id(), e.peer_session_id().unwrap_or(0), keys);
                ctx.fabric_index = e.fabric_index();
                ctx.peer_node_id = e.peer_node_id();
                ctx
            }),
        };
        let Some(ctx) = ctx else {
            debug!("handshake completed without session keys; dropping");
            return;
        };
        match self.session_store.add_secure_context(ctx.clone()) {
            Ok(()) => self.callbacks.on_session_established(&ctx),
            Err(e) => self.callbacks.on_session_error(&e.to_string(), "AddSecureContext"),
        }
    }
}

enum StepOutcome {
    Continue(Option<(u8, Vec<u8>)>),
    Done(Option<(u8, Vec<u8>)>),
}

fn find_fabric_by_index(fabrics: &dyn FabricStore, fabric_index: u16) -> Option<crate::fabric::FabricInfo> {
    let mut found = None;
    fabrics.for_each(&mut |info| {
        if info.index == fabric_index {
            found = Some(info.clone());
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::certificate::Certificate;
    use crate::cert::dn::{DistinguishedName, DnAttribute, TAG_FABRIC_ID, TAG_NODE_ID, TAG_RCAC_ID};
    use crate::cert::extensions::Extensions;
    use crate::fabric::FabricInfo;
    use crate::pase::create_verifier;
    use std::sync::Mutex;

    struct MemSessionStore {
        next_id: Mutex<u16>,
        contexts: Mutex<HashMap<u16, SecureContext>>,
    }

    impl MemSessionStore {
        fn new() -> Self {
            Self { next_id: Mutex::new(1), contexts: Mutex::new(HashMap::new()) }
        }
    }

    impl SessionStore for MemSessionStore {
        fn allocate_session_id(&self) -> ManagerResult<u16> {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            Ok(id)
        }
        fn add_secure_context(&self, ctx: SecureContext) -> ManagerResult<()> {
            self.contexts.lock().unwrap().insert(ctx.local_session_id, ctx);
            Ok(())
        }
        fn find_secure_context(&self, local_sid: u16) -> Option<SecureContext> {
            self.contexts.lock().unwrap().get(&local_sid).cloned()
        }
        fn remove_secure_context(&self, local_sid: u16) {
            self.contexts.lock().unwrap().remove(&local_sid);
        }
    }

    struct EmptyFabricStore;
    impl FabricStore for EmptyFabricStore {
        fn for_each(&self, _f: &mut dyn FnMut(&FabricInfo)) {}
    }

    struct NoCredentials;
    impl OperationalCredentialStore for NoCredentials {
        fn signing_key(&self, _fabric_index: u16) -> Option<p256::SecretKey> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        established: Mutex<Vec<u16>>,
        errors: Mutex<Vec<(String, String)>>,
    }
    impl ManagerCallbacks for RecordingCallbacks {
        fn on_session_established(&self, ctx: &SecureContext) {
            self.established.lock().unwrap().push(ctx.local_session_id);
        }
        fn on_session_error(&self, err: &str, stage: &str) {
            self.errors.lock().unwrap().push((err.to_string(), stage.to_string()));
        }
    }

    fn build_manager() -> SecureChannelManager {
        SecureChannelManager::new(
            Box::new(MemSessionStore::new()),
            Box::new(EmptyFabricStore),
            Box::new(NoCredentials),
            None,
            Box::new(RecordingCallbacks::default()),
        )
    }

    #[test]
    fn pbkdf_param_request_without_responder_configured_is_rejected() {
        let manager = build_manager();
        let mut initiator = PaseEngine::new_initiator(1, 20_202_021).unwrap();
        let request = initiator.start().unwrap();
        assert!(matches!(
            manager.route(1, OP_PBKDF_PARAM_REQUEST, &request),
            Err(ManagerError::CommissioningWindowNotOpen)
        ));
    }

    #[test]
    fn full_pase_handshake_through_the_manager_establishes_a_session() {
        let manager = build_manager();
        let verifier = create_verifier(20_202_021, b"SPAKE2P Key Salt", 1000).unwrap();
        manager.set_pase_responder(verifier, b"SPAKE2P Key Salt".to_vec(), 1000);

        let mut initiator = PaseEngine::new_initiator(1, 20_202_021).unwrap();
        let request = initiator.start().unwrap();

        let (op, response) = manager.route(1, OP_PBKDF_PARAM_REQUEST, &request).unwrap().unwrap();
        assert_eq!(op, OP_PBKDF_PARAM_RESPONSE);

        let pake1 = initiator.handle_pbkdf_param_response(&response).unwrap();
        let (op, pake2) = manager.route(1, OP_PAKE1, &pake1).unwrap().unwrap();
        assert_eq!(op, OP_PAKE2);

        let pake3 = initiator.handle_pake2(&pake2).unwrap();
        let (op, status) = manager.route(1, OP_PAKE3, &pake3).unwrap().unwrap();
        assert_eq!(op, OP_STATUS_REPORT);

        initiator.handle_status_report(&status).unwrap();
        assert!(!manager.has_active_handshake(1));
    }

    #[test]
    fn collision_on_same_exchange_reports_busy() {
        let manager = build_manager();
        let verifier = create_verifier(20_202_021, b"SPAKE2P Key Salt", 1000).unwrap();
        manager.set_pase_responder(verifier, b"SPAKE2P Key Salt".to_vec(), 1000);

        let mut first_initiator = PaseEngine::new_initiator(1, 20_202_021).unwrap();
        let first_request = first_initiator.start().unwrap();
        manager.route(1, OP_PBKDF_PARAM_REQUEST, &first_request).unwrap();

        let mut second_initiator = PaseEngine::new_initiator(2, 20_202_021).unwrap();
        let second_request = second_initiator.start().unwrap();
        let (op, status_bytes) = manager.route(1, OP_PBKDF_PARAM_REQUEST, &second_request).unwrap().unwrap();
        assert_eq!(op, OP_STATUS_REPORT);
        let status = StatusReport::decode(&status_bytes).unwrap();
        assert!(status.is_busy());
        assert_eq!(status.busy_wait_ms(), Some(BUSY_WAIT_MS));
    }

    #[test]
    fn standalone_ack_is_ignored() {
        let manager = build_manager();
        assert_eq!(manager.route(1, OP_STANDALONE_ACK, &[]).unwrap(), None);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let manager = build_manager();
        assert!(matches!(manager.route(1, 0x99, &[]), Err(ManagerError::InvalidOpcode(0x99))));
    }

    fn issue_noc(root_key: &p256::SecretKey, node_key: &p256::SecretKey, node_id: u64, fabric_id: u64) -> Vec<u8> {
        let mut subject = DistinguishedName::new();
        subject.push(DnAttribute::MatterId { tag: TAG_NODE_ID, value: node_id }).unwrap();
        subject.push(DnAttribute::MatterId { tag: TAG_FABRIC_ID, value: fabric_id }).unwrap();
        let mut issuer = DistinguishedName::new();
        issuer.push(DnAttribute::MatterId { tag: TAG_RCAC_ID, value: 0xCACACACA00000001 }).unwrap();
        let mut public_key = [0u8; 65];
        public_key.copy_from_slice(&node_key.public_key().to_sec1_bytes());
        let mut cert = Certificate {
            serial: vec![1],
            issuer,
            not_before: 0,
            not_after: 0,
            subject,
            public_key,
            extensions: Extensions::default(),
            signature: None,
        };
        let tbs = cert.encode_tlv_for_signing().unwrap();
        let signing_key = ecdsa::SigningKey::from(root_key.clone());
        let sig: ecdsa::Signature<p256::NistP256> = ecdsa::signature::Signer::sign(&signing_key, &tbs);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(&sig.to_bytes());
        cert.signature = Some(raw);
        cert.encode_tlv().unwrap()
    }

    struct OneFabricStore(FabricInfo);
    impl FabricStore for OneFabricStore {
        fn for_each(&self, f: &mut dyn FnMut(&FabricInfo)) {
            f(&self.0);
        }
    }
    struct OneKeyStore(p256::SecretKey);
    impl OperationalCredentialStore for OneKeyStore {
        fn signing_key(&self, _fabric_index: u16) -> Option<p256::SecretKey> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn full_case_handshake_through_the_manager_establishes_a_session_on_both_sides() {
        let root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_key = p256::SecretKey::random(&mut rand::thread_rng());
        let responder_key = p256::SecretKey::random(&mut rand::thread_rng());

        let initiator_fabric = FabricInfo {
            index: 0,
            fabric_id: 1,
            node_id: 0xAAAA,
            root_public_key: root_key.public_key().to_sec1_bytes().to_vec(),
            ipk_epoch_key: [9u8; 16],
            noc_bytes: issue_noc(&root_key, &initiator_key, 0xAAAA, 1),
            icac_bytes: None,
        };
        let responder_fabric = FabricInfo {
            index: 0,
            fabric_id: 1,
            node_id: 0xBBBB,
            root_public_key: root_key.public_key().to_sec1_bytes().to_vec(),
            ipk_epoch_key: [9u8; 16],
            noc_bytes: issue_noc(&root_key, &responder_key, 0xBBBB, 1),
            icac_bytes: None,
        };

        let responder_manager = SecureChannelManager::new(
            Box::new(MemSessionStore::new()),
            Box::new(OneFabricStore(responder_fabric)),
            Box::new(OneKeyStore(responder_key)),
            None,
            Box::new(RecordingCallbacks::default()),
        );

        let mut initiator = CaseEngine::new_initiator(1, initiator_fabric, initiator_key, 0xBBBB);
        let sigma1 = initiator.start().unwrap();

        let (op, sigma2) = responder_manager.route(1, OP_SIGMA1, &sigma1).unwrap().unwrap();
        assert_eq!(op, OP_SIGMA2);
        assert!(responder_manager.has_active_handshake(1));

        let validator = ChainValidator::new();
        let sigma3 = initiator.handle_sigma2(&sigma2, &validator).unwrap();

        let (op, status) = responder_manager.route(1, OP_SIGMA3, &sigma3).unwrap().unwrap();
        assert_eq!(op, OP_STATUS_REPORT);
        assert!(!responder_manager.has_active_handshake(1));

        initiator.handle_status_report(&status).unwrap();
        assert_eq!(initiator.state(), CaseState::Complete);
    }
}
