//! CASE (Sigma) handshake state machine (C4, spec §4.4). Mirrors
//! [`crate::pase::PaseEngine`]'s shape — handshake-scoped state only,
//! consumed into [`SessionKeys`] on success — but drives four message types
//! instead of five and depends on the chain validator (C2) and the fabric
//! table (an external collaborator) rather than a single shared passcode.

pub mod sigma;

use rand::RngCore;

use crate::chain::ChainValidator;
use crate::error::{EngineError, EngineResult};
use crate::fabric::{FabricInfo, FabricStore};
use crate::types::{Role, SessionKeys};
use crate::util::cryptoutil;

use sigma::{NonceLabel, Sigma1, Sigma2, Sigma2Resume, Sigma3, TbeData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Init,
    WaitingSigma2,
    WaitingSigma3,
    WaitingStatusReport,
    Complete,
    Failed,
}

/// A previous session this node may resume (spec §4.4 *Resumption*, §6
/// *Resumption store*).
#[derive(Clone)]
pub struct ResumptionEntry {
    pub shared_secret: Vec<u8>,
    pub fabric_index: u16,
    pub peer_node_id: u64,
}

/// External collaborator resolving a fabric's resumption history. This crate
/// never persists resumption state itself.
pub trait ResumptionStore: Send + Sync {
    fn lookup(&self, resumption_id: &[u8; 16]) -> Option<ResumptionEntry>;
    fn store(&self, resumption_id: [u8; 16], entry: ResumptionEntry);
}

/// External collaborator resolving a fabric's operational (NOC) signing key.
/// Kept separate from [`FabricInfo`] — the private key only needs to leave
/// the caller's key storage to sign one TBSData blob per handshake.
pub trait OperationalCredentialStore: Send + Sync {
    fn signing_key(&self, fabric_index: u16) -> Option<p256::SecretKey>;
}

struct PendingResumption {
    resumption_id: [u8; 16],
    prev_shared_secret: Vec<u8>,
}

/// One side of a CASE handshake.
pub struct CaseEngine {
    role: Role,
    state: CaseState,
    local_session_id: u16,
    peer_session_id: Option<u16>,
    fabric: Option<FabricInfo>,
    signing_key: Option<p256::SecretKey>,
    target_node_id: Option<u64>,
    eph_secret: Option<p256::ecdh::EphemeralSecret>,
    own_eph_pub: Option<[u8; 65]>,
    peer_eph_pub: Option<[u8; 65]>,
    init_random: Option<[u8; 32]>,
    shared_secret: Option<Vec<u8>>,
    sigma1_bytes: Option<Vec<u8>>,
    sigma2_bytes: Option<Vec<u8>>,
    pending_resumption: Option<PendingResumption>,
    peer_node_id: Option<u64>,
    session_keys: Option<SessionKeys>,
}

impl CaseEngine {
    pub fn new_initiator(local_session_id: u16, fabric: FabricInfo, signing_key: p256::SecretKey, target_node_id: u64) -> Self {
        Self {
            role: Role::Initiator,
            state: CaseState::Init,
            local_session_id,
            peer_session_id: None,
            fabric: Some(fabric),
            signing_key: Some(signing_key),
            target_node_id: Some(target_node_id),
            eph_secret: None,
            own_eph_pub: None,
            peer_eph_pub: None,
            init_random: None,
            shared_secret: None,
            sigma1_bytes: None,
            sigma2_bytes: None,
            pending_resumption: None,
            peer_node_id: None,
            session_keys: None,
        }
    }

    /// Attempt resumption of a previous session with the same target node
    /// (spec §4.4 *Resumption*). Call before [`CaseEngine::start`].
    pub fn with_resumption(mut self, resumption_id: [u8; 16], prev_shared_secret: Vec<u8>) -> Self {
        self.pending_resumption = Some(PendingResumption { resumption_id, prev_shared_secret });
        self
    }

    pub fn new_responder(local_session_id: u16) -> Self {
        Self {
            role: Role::Responder,
            state: CaseState::Init,
            local_session_id,
            peer_session_id: None,
            fabric: None,
            signing_key: None,
            target_node_id: None,
            eph_secret: None,
            own_eph_pub: None,
            peer_eph_pub: None,
            init_random: None,
            shared_secret: None,
            sigma1_bytes: None,
            sigma2_bytes: None,
            pending_resumption: None,
            peer_node_id: None,
            session_keys: None,
        }
    }

    pub fn state(&self) -> CaseState {
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

    pub fn peer_node_id(&self) -> Option<u64> {
        self.peer_node_id
    }

    pub fn fabric_index(&self) -> Option<u16> {
        self.fabric.as_ref().map(|f| f.index)
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.session_keys.as_ref()
    }

    /// Past the point where a fresh collision on this exchange should be
    /// reported at the higher 10s Busy wait time (spec §4.5 *Collision policy*).
    pub fn is_past_sigma2(&self) -> bool {
        matches!(self.state, CaseState::WaitingSigma3 | CaseState::WaitingStatusReport | CaseState::Complete)
    }

    /// Initiator entry point: builds and records Sigma1.
    pub fn start(&mut self) -> EngineResult<Vec<u8>> {
        if self.role != Role::Initiator || self.state != CaseState::Init {
            return Err(EngineError::InvalidState);
        }
        let fabric = self.fabric.as_ref().expect("initiator always holds a fabric");
        let target_node_id = self.target_node_id.expect("initiator always holds a target");

        let mut init_random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut init_random);

        let ipk = fabric.operational_ipk().map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let destination_id = sigma::destination_id(&ipk, &init_random, &fabric.root_public_key, fabric.fabric_id, target_node_id)?;

        let eph_secret = p256::ecdh::EphemeralSecret::random(&mut rand::thread_rng());
        let eph_pub = sigma::eph_public_bytes(&eph_secret);

        let (resumption_id, init_resume_mic) = match &self.pending_resumption {
            Some(p) => {
                let key = sigma::derive_resumption_key(&p.prev_shared_secret, 16)?;
                let mic = sigma::init_resume_mic(&key, &init_random, &p.resumption_id)?;
                (Some(p.resumption_id), Some(mic))
            }
            None => (None, None),
        };

        let sigma1 = Sigma1 {
            init_random,
            init_sid: self.local_session_id,
            destination_id,
            init_eph_pub: eph_pub,
            resumption_id,
            init_resume_mic,
        };
        let bytes = sigma1.encode()?;
        self.sigma1_bytes = Some(bytes.clone());
        self.init_random = Some(init_random);
        self.own_eph_pub = Some(eph_pub);
        self.eph_secret = Some(eph_secret);
        self.state = CaseState::WaitingSigma2;
        Ok(bytes)
    }

    /// Responder entry point: consumes Sigma1, returns Sigma2 or (on a
    /// matched resumption) Sigma2Resume bytes and transitions straight to
    /// `Complete`. Callers must check [`CaseEngine::state`] to tell the two
    /// outcomes apart and route the reply opcode accordingly.
    pub fn handle_sigma1(
        &mut self,
        payload: &[u8],
        fabrics: &dyn FabricStore,
        credentials: &dyn OperationalCredentialStore,
        resumption_store: Option<&dyn ResumptionStore>,
    ) -> EngineResult<Vec<u8>> {
        if self.role != Role::Responder || self.state != CaseState::Init {
            return Err(EngineError::InvalidState);
        }
        self.sigma1_bytes = Some(payload.to_vec());
        let sigma1 = Sigma1::decode(payload)?;
        self.peer_session_id = Some(sigma1.init_sid);
        self.init_random = Some(sigma1.init_random);
        self.peer_eph_pub = Some(sigma1.init_eph_pub);

        let fabric = find_fabric_by_destination_id(fabrics, &sigma1.init_random, &sigma1.destination_id)?;

        if let (Some(resumption_id), Some(mic), Some(store)) = (sigma1.resumption_id, sigma1.init_resume_mic, resumption_store) {
            if let Some(entry) = store.lookup(&resumption_id) {
                if entry.fabric_index == fabric.index {
                    let resume_key = sigma::derive_resumption_key(&entry.shared_secret, 16)?;
                    if sigma::verify_init_resume_mic(&resume_key, &sigma1.init_random, &resumption_id, &mic).is_ok() {
                        return self.complete_resumption(fabric, &sigma1, resumption_id, entry, resumption_store);
                    }
                }
            }
        }

        let signing_key = credentials
            .signing_key(fabric.index)
            .ok_or_else(|| EngineError::InvalidMessage("no operational key for fabric".into()))?;

        let mut resp_random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut resp_random);
        let eph_secret = p256::ecdh::EphemeralSecret::random(&mut rand::thread_rng());
        let eph_pub = sigma::eph_public_bytes(&eph_secret);
        let shared_secret = sigma::ecdh_shared_secret(&eph_secret, &sigma1.init_eph_pub)?;

        let tbs = sigma::tbs_data(&fabric.noc_bytes, fabric.icac_bytes.as_deref(), &eph_pub, &sigma1.init_eph_pub)?;
        let signature = sigma::sign_tbs(&signing_key, &tbs);
        let resumption_id = random_resumption_id();

        let tbe = TbeData {
            noc: fabric.noc_bytes.clone(),
            icac: fabric.icac_bytes.clone(),
            signature,
            resumption_id: Some(resumption_id),
        };

        let transcript = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap()]);
        let ipk = fabric.operational_ipk().map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let s2k = sigma::derive_s2k(&shared_secret, &ipk, &transcript)?;
        let encrypted2 = sigma::encrypt_tbe(&s2k, NonceLabel::Sigma2, &tbe)?;

        let sigma2 = Sigma2 { resp_random, resp_sid: self.local_session_id, resp_eph_pub: eph_pub, encrypted2 };
        let bytes = sigma2.encode()?;

        self.fabric = Some(fabric);
        self.signing_key = Some(signing_key);
        self.own_eph_pub = Some(eph_pub);
        self.eph_secret = Some(eph_secret);
        self.shared_secret = Some(shared_secret);
        self.sigma2_bytes = Some(bytes.clone());
        self.state = CaseState::WaitingSigma3;
        Ok(bytes)
    }

    /// Initiator: consumes Sigma2, validates the responder's chain, returns Sigma3.
    pub fn handle_sigma2(&mut self, payload: &[u8], chain_validator: &ChainValidator) -> EngineResult<Vec<u8>> {
        if self.role != Role::Initiator || self.state != CaseState::WaitingSigma2 {
            return Err(EngineError::InvalidState);
        }
        let sigma2 = Sigma2::decode(payload)?;
        self.peer_session_id = Some(sigma2.resp_sid);
        self.peer_eph_pub = Some(sigma2.resp_eph_pub);

        let fabric = self.fabric.as_ref().expect("initiator always holds a fabric").clone();
        let eph_secret = self.eph_secret.as_ref().expect("set in start()");
        let shared_secret = sigma::ecdh_shared_secret(eph_secret, &sigma2.resp_eph_pub)?;

        let root_pub = root_public_key(&fabric)?;
        let transcript_after_sigma1 = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap()]);
        let ipk = fabric.operational_ipk().map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let s2k = sigma::derive_s2k(&shared_secret, &ipk, &transcript_after_sigma1)?;
        let tbe = sigma::decrypt_tbe(&s2k, NonceLabel::Sigma2, &sigma2.encrypted2)?;

        let chain_output = chain_validator.validate(&tbe.noc, tbe.icac.as_deref(), &root_pub)?;
        let target_node_id = self.target_node_id.expect("initiator always holds a target");
        if chain_output.node_id != target_node_id {
            return Err(EngineError::NodeIdMismatch);
        }
        if chain_output.fabric_id != fabric.fabric_id {
            return Err(EngineError::FabricIdMismatch);
        }

        let own_eph_pub = self.own_eph_pub.expect("set in start()");
        let peer_tbs = sigma::tbs_data(&tbe.noc, tbe.icac.as_deref(), &sigma2.resp_eph_pub, &own_eph_pub)?;
        sigma::verify_tbs(&chain_output.public_key, &peer_tbs, &tbe.signature)?;
        self.peer_node_id = Some(chain_output.node_id);

        let signing_key = self.signing_key.as_ref().expect("initiator always holds a signing key");
        let own_tbs = sigma::tbs_data(&fabric.noc_bytes, fabric.icac_bytes.as_deref(), &own_eph_pub, &sigma2.resp_eph_pub)?;
        let own_signature = sigma::sign_tbs(signing_key, &own_tbs);
        let tbe3 = TbeData { noc: fabric.noc_bytes.clone(), icac: fabric.icac_bytes.clone(), signature: own_signature, resumption_id: None };

        let sigma2_bytes = payload.to_vec();
        let transcript_through_sigma2 = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap(), &sigma2_bytes]);
        let s3k = sigma::derive_s3k(&shared_secret, &ipk, &transcript_through_sigma2)?;
        let encrypted3 = sigma::encrypt_tbe(&s3k, NonceLabel::Sigma3, &tbe3)?;

        let sigma3 = Sigma3 { encrypted3 };
        let bytes = sigma3.encode()?;

        let full_transcript = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap(), &sigma2_bytes, &bytes]);
        self.session_keys = SessionKeys::from_okm(&sigma::derive_session_keys(&shared_secret, &full_transcript)?);

        self.shared_secret = Some(shared_secret);
        self.sigma2_bytes = Some(sigma2_bytes);
        self.state = CaseState::WaitingStatusReport;
        Ok(bytes)
    }

    /// Initiator: consumes Sigma2Resume instead of Sigma2 — the responder
    /// matched a prior session, so no Sigma3 follows (spec §4.4 *Resumption*).
    pub fn handle_sigma2_resume(&mut self, payload: &[u8]) -> EngineResult<()> {
        if self.role != Role::Initiator || self.state != CaseState::WaitingSigma2 {
            return Err(EngineError::InvalidState);
        }
        let resume = Sigma2Resume::decode(payload)?;
        let pending = self
            .pending_resumption
            .as_ref()
            .ok_or_else(|| EngineError::InvalidMessage("no resumption was attempted".into()))?;
        if resume.resumption_id != pending.resumption_id {
            return Err(EngineError::InvalidMessage("resumption id mismatch".into()));
        }
        let resume_key = sigma::derive_resumption_key(&pending.prev_shared_secret, 16)?;
        let init_random = self.init_random.expect("set in start()");
        sigma::verify_resume2_mic(&resume_key, &init_random, &resume.resumption_id, &resume.resume2_mic)?;

        self.peer_session_id = Some(resume.resp_sid);
        let okm = sigma::derive_resumption_key(&pending.prev_shared_secret, 48)?;
        self.session_keys = SessionKeys::from_okm(&okm);
        self.state = CaseState::Complete;
        Ok(())
    }

    /// Responder: consumes Sigma3, derives final session keys, returns a
    /// Success StatusReport.
    pub fn handle_sigma3(&mut self, payload: &[u8], chain_validator: &ChainValidator) -> EngineResult<Vec<u8>> {
        if self.role != Role::Responder || self.state != CaseState::WaitingSigma3 {
            return Err(EngineError::InvalidState);
        }
        let sigma3 = Sigma3::decode(payload)?;
        let fabric = self.fabric.as_ref().expect("set in handle_sigma1").clone();
        let shared_secret = self.shared_secret.as_ref().expect("set in handle_sigma1").clone();
        let root_pub = root_public_key(&fabric)?;

        let ipk = fabric.operational_ipk().map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let transcript_through_sigma2 = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap(), self.sigma2_bytes.as_ref().unwrap()]);
        let s3k = sigma::derive_s3k(&shared_secret, &ipk, &transcript_through_sigma2)?;
        let tbe = sigma::decrypt_tbe(&s3k, NonceLabel::Sigma3, &sigma3.encrypted3)?;

        let chain_output = chain_validator.validate(&tbe.noc, tbe.icac.as_deref(), &root_pub)?;
        if chain_output.fabric_id != fabric.fabric_id {
            return Err(EngineError::FabricIdMismatch);
        }

        let own_eph_pub = self.own_eph_pub.expect("set in handle_sigma1");
        let peer_eph_pub = self.peer_eph_pub.expect("set in handle_sigma1");
        let tbs = sigma::tbs_data(&tbe.noc, tbe.icac.as_deref(), &peer_eph_pub, &own_eph_pub)?;
        sigma::verify_tbs(&chain_output.public_key, &tbs, &tbe.signature)?;
        self.peer_node_id = Some(chain_output.node_id);

        let full_transcript = transcript_hash(&[self.sigma1_bytes.as_ref().unwrap(), self.sigma2_bytes.as_ref().unwrap(), payload]);
        self.session_keys = SessionKeys::from_okm(&sigma::derive_session_keys(&shared_secret, &full_transcript)?);

        self.state = CaseState::Complete;
        Ok(crate::status::StatusReport::secure_channel_success().encode())
    }

    /// Initiator: consumes the responder's final StatusReport.
    pub fn handle_status_report(&mut self, payload: &[u8]) -> EngineResult<()> {
        if self.role != Role::Initiator || self.state != CaseState::WaitingStatusReport {
            return Err(EngineError::InvalidState);
        }
        let report = crate::status::StatusReport::decode(payload).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        if report.is_success() {
            self.state = CaseState::Complete;
            Ok(())
        } else {
            self.state = CaseState::Failed;
            Err(EngineError::InvalidMessage(format!("CASE failed: {report:?}")))
        }
    }

    fn complete_resumption(
        &mut self,
        fabric: FabricInfo,
        sigma1: &Sigma1,
        resumption_id: [u8; 16],
        entry: ResumptionEntry,
        resumption_store: Option<&dyn ResumptionStore>,
    ) -> EngineResult<Vec<u8>> {
        let resume_key = sigma::derive_resumption_key(&entry.shared_secret, 16)?;
        let mic = sigma::resume2_mic(&resume_key, &sigma1.init_random, &resumption_id)?;
        let okm = sigma::derive_resumption_key(&entry.shared_secret, 48)?;

        let resume2 = Sigma2Resume { resumption_id, resume2_mic: mic, resp_sid: self.local_session_id };
        let bytes = resume2.encode()?;

        if let Some(store) = resumption_store {
            store.store(resumption_id, entry.clone());
        }

        self.fabric = Some(fabric);
        self.peer_node_id = Some(entry.peer_node_id);
        self.session_keys = SessionKeys::from_okm(&okm);
        self.state = CaseState::Complete;
        Ok(bytes)
    }
}

fn root_public_key(fabric: &FabricInfo) -> EngineResult<[u8; 65]> {
    fabric
        .root_public_key
        .as_slice()
        .try_into()
        .map_err(|_| EngineError::InvalidMessage("malformed root public key".into()))
}

fn find_fabric_by_destination_id(fabrics: &dyn FabricStore, init_random: &[u8; 32], destination_id: &[u8; 32]) -> EngineResult<FabricInfo> {
    let mut found: Option<FabricInfo> = None;
    fabrics.for_each(&mut |info: &FabricInfo| {
        if found.is_some() {
            return;
        }
        let Ok(ipk) = info.operational_ipk() else { return };
        let Ok(candidate) = sigma::destination_id(&ipk, init_random, &info.root_public_key, info.fabric_id, info.node_id) else { return };
        if cryptoutil::ct_eq(&candidate, destination_id) {
            found = Some(info.clone());
        }
    });
    found.ok_or(EngineError::NoSharedRoot)
}

fn random_resumption_id() -> [u8; 16] {
    let mut out = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

fn transcript_hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut buf = Vec::new();
    for p in parts {
        buf.extend_from_slice(p);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&cryptoutil::sha256(&buf));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::certificate::Certificate;
    use crate::cert::dn::{DistinguishedName, DnAttribute, TAG_FABRIC_ID, TAG_NODE_ID, TAG_RCAC_ID};
    use crate::cert::extensions::Extensions;
    use std::sync::Mutex;

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

    #[derive(Default)]
    struct MemResumptionStore(Mutex<Option<([u8; 16], ResumptionEntry)>>);
    impl ResumptionStore for MemResumptionStore {
        fn lookup(&self, resumption_id: &[u8; 16]) -> Option<ResumptionEntry> {
            let guard = self.0.lock().unwrap();
            guard.as_ref().filter(|(id, _)| id == resumption_id).map(|(_, e)| e.clone())
        }
        fn store(&self, resumption_id: [u8; 16], entry: ResumptionEntry) {
            *self.0.lock().unwrap() = Some((resumption_id, entry));
        }
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

    fn build_fabric(root_key: &p256::SecretKey, node_key: &p256::SecretKey, index: u16, node_id: u64, fabric_id: u64) -> FabricInfo {
        let root_public_key = root_key.public_key().to_sec1_bytes().to_vec();
        FabricInfo {
            index,
            fabric_id,
            node_id,
            root_public_key,
            ipk_epoch_key: [9u8; 16],
            noc_bytes: issue_noc(root_key, node_key, node_id, fabric_id),
            icac_bytes: None,
        }
    }

    fn run_happy_path() -> (CaseEngine, CaseEngine) {
        let root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_key = p256::SecretKey::random(&mut rand::thread_rng());
        let responder_key = p256::SecretKey::random(&mut rand::thread_rng());

        let initiator_fabric = build_fabric(&root_key, &initiator_key, 0, 0xAAAA, 0xFAB0000000000001);
        let responder_fabric = build_fabric(&root_key, &responder_key, 0, 0xBBBB, 0xFAB0000000000001);

        let mut initiator = CaseEngine::new_initiator(1, initiator_fabric, initiator_key, 0xBBBB);
        let mut responder = CaseEngine::new_responder(2);

        let fabric_store = OneFabricStore(responder_fabric);
        let key_store = OneKeyStore(responder_key);
        let validator = ChainValidator::new();

        let sigma1 = initiator.start().unwrap();
        let sigma2 = responder.handle_sigma1(&sigma1, &fabric_store, &key_store, None).unwrap();
        let sigma3 = initiator.handle_sigma2(&sigma2, &validator).unwrap();
        let status = responder.handle_sigma3(&sigma3, &validator).unwrap();
        initiator.handle_status_report(&status).unwrap();
        (initiator, responder)
    }

    #[test]
    fn case_happy_path_derives_matching_keys_and_identities() {
        let (initiator, responder) = run_happy_path();
        assert_eq!(initiator.state(), CaseState::Complete);
        assert_eq!(responder.state(), CaseState::Complete);
        let ik = initiator.session_keys().unwrap();
        let rk = responder.session_keys().unwrap();
        assert_eq!(ik.i2r_key, rk.i2r_key);
        assert_eq!(ik.r2i_key, rk.r2i_key);
        assert_eq!(initiator.peer_node_id(), Some(0xBBBB));
        assert_eq!(responder.peer_node_id(), Some(0xAAAA));
        assert_eq!(initiator.peer_session_id(), Some(2));
        assert_eq!(responder.peer_session_id(), Some(1));
    }

    #[test]
    fn wrong_target_node_id_is_rejected() {
        let root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_key = p256::SecretKey::random(&mut rand::thread_rng());
        let responder_key = p256::SecretKey::random(&mut rand::thread_rng());

        let initiator_fabric = build_fabric(&root_key, &initiator_key, 0, 0xAAAA, 1);
        let responder_fabric = build_fabric(&root_key, &responder_key, 0, 0xBBBB, 1);

        let mut initiator = CaseEngine::new_initiator(1, initiator_fabric, initiator_key, 0xFFFF);
        let mut responder = CaseEngine::new_responder(2);
        let fabric_store = OneFabricStore(responder_fabric);
        let key_store = OneKeyStore(responder_key);
        let validator = ChainValidator::new();

        let sigma1 = initiator.start().unwrap();
        let sigma2 = responder.handle_sigma1(&sigma1, &fabric_store, &key_store, None).unwrap();
        assert_eq!(initiator.handle_sigma2(&sigma2, &validator), Err(EngineError::NodeIdMismatch));
    }

    #[test]
    fn sigma1_with_no_matching_fabric_reports_no_shared_root() {
        let root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let other_root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_key = p256::SecretKey::random(&mut rand::thread_rng());
        let responder_key = p256::SecretKey::random(&mut rand::thread_rng());

        let initiator_fabric = build_fabric(&root_key, &initiator_key, 0, 0xAAAA, 1);
        let responder_fabric = build_fabric(&other_root_key, &responder_key, 0, 0xBBBB, 1);

        let mut initiator = CaseEngine::new_initiator(1, initiator_fabric, initiator_key, 0xBBBB);
        let mut responder = CaseEngine::new_responder(2);
        let fabric_store = OneFabricStore(responder_fabric);
        let key_store = OneKeyStore(responder_key);

        let sigma1 = initiator.start().unwrap();
        assert_eq!(
            responder.handle_sigma1(&sigma1, &fabric_store, &key_store, None),
            Err(EngineError::NoSharedRoot)
        );
    }

    #[test]
    fn resumption_round_trips_without_sigma3() {
        let root_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_key = p256::SecretKey::random(&mut rand::thread_rng());
        let responder_key = p256::SecretKey::random(&mut rand::thread_rng());
        let initiator_fabric = build_fabric(&root_key, &initiator_key, 0, 0xAAAA, 1);
        let responder_fabric = build_fabric(&root_key, &responder_key, 0, 0xBBBB, 1);

        let prev_shared_secret = vec![42u8; 32];
        let resumption_id = [7u8; 16];
        let resumption_store = MemResumptionStore::default();
        resumption_store.store(
            resumption_id,
            ResumptionEntry { shared_secret: prev_shared_secret.clone(), fabric_index: 0, peer_node_id: 0xAAAA },
        );

        let mut initiator = CaseEngine::new_initiator(1, initiator_fabric, initiator_key, 0xBBBB)
            .with_resumption(resumption_id, prev_shared_secret.clone());
        let mut responder = CaseEngine::new_responder(2);
        let fabric_store = OneFabricStore(responder_fabric);
        let key_store = OneKeyStore(responder_key);

        let sigma1 = initiator.start().unwrap();
        let reply = responder.handle_sigma1(&sigma1, &fabric_store, &key_store, Some(&resumption_store)).unwrap();
        assert_eq!(responder.state(), CaseState::Complete);

        initiator.handle_sigma2_resume(&reply).unwrap();
        assert_eq!(initiator.state(), CaseState::Complete);
        assert_eq!(initiator.session_keys().unwrap().i2r_key, responder.session_keys().unwrap().i2r_key);
    }
}
