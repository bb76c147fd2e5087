//! Certificate chain validation (C2, spec §4.2): NOC -> [ICAC] -> RCAC.

use crate::cert::certificate::{Certificate, CertificateType};
use crate::error::{ChainError, ChainResult};
use crate::types::MATTER_EPOCH_UNIX_SECONDS;

/// Result of a successful chain validation: the peer identity and public key
/// extracted from the NOC (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    pub node_id: u64,
    pub fabric_id: u64,
    pub public_key: [u8; 65],
}

/// Validates NOC -> [ICAC] -> RCAC chains against a trusted root public key.
///
/// Two constructors: [`ChainValidator::new`] performs full signature and time
/// validation and is what production code must hold; the
/// [`ChainValidator::insecure_skip_checks`] variant is a distinct type
/// reserved for test fixtures, so the unchecked path can never be reached
/// through a value of the production type (spec §4.2, §7, §9).
pub struct ChainValidator {
    skip_checks: bool,
    now_unix_seconds: fn() -> u64,
}

fn real_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ChainValidator {
    pub fn new() -> Self {
        Self { skip_checks: false, now_unix_seconds: real_now }
    }

    /// Skips signature verification and time-window checks. Reserved for
    /// controlled testing (spec §4.2) — never construct this in production
    /// code paths.
    pub fn insecure_skip_checks() -> Self {
        Self { skip_checks: true, now_unix_seconds: real_now }
    }

    #[cfg(test)]
    fn with_clock(mut self, now_unix_seconds: fn() -> u64) -> Self {
        self.now_unix_seconds = now_unix_seconds;
        self
    }

    pub fn validate(
        &self,
        noc_bytes: &[u8],
        icac_bytes: Option<&[u8]>,
        trusted_root_public_key: &[u8; 65],
    ) -> ChainResult<ChainOutput> {
        let noc = Certificate::decode_tlv(noc_bytes)?;
        if noc.cert_type() != CertificateType::Noc {
            return Err(ChainError::CertificateTypeMismatch);
        }

        let icac = match icac_bytes {
            Some(bytes) => {
                let icac = Certificate::decode_tlv(bytes)?;
                if icac.cert_type() != CertificateType::Icac {
                    return Err(ChainError::CertificateTypeMismatch);
                }
                Some(icac)
            }
            None => None,
        };

        let noc_signer_key: [u8; 65] = match &icac {
            Some(icac) => icac.public_key,
            None => *trusted_root_public_key,
        };

        if !self.skip_checks {
            if let Some(icac) = &icac {
                verify_signature(icac, trusted_root_public_key)?;
                if let Some(icac_fabric) = icac.fabric_id() {
                    if Some(icac_fabric) != noc.fabric_id() {
                        return Err(ChainError::FabricIdMismatch);
                    }
                }
            }
            verify_signature(&noc, &noc_signer_key)?;

            let now = (self.now_unix_seconds)().saturating_sub(MATTER_EPOCH_UNIX_SECONDS);
            for cert in std::iter::once(&noc).chain(icac.iter()) {
                check_validity(cert, now as u32)?;
            }
        }

        let node_id = noc.node_id().filter(|n| *n != 0).ok_or(ChainError::MissingNodeId)?;
        let fabric_id = noc.fabric_id().filter(|f| *f != 0).ok_or(ChainError::MissingFabricId)?;

        Ok(ChainOutput { node_id, fabric_id, public_key: noc.public_key })
    }
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_validity(cert: &Certificate, now_matter_seconds: u32) -> ChainResult<()> {
    if now_matter_seconds < cert.not_before {
        return Err(ChainError::CertificateNotYetValid);
    }
    if cert.not_after != 0 && now_matter_seconds > cert.not_after {
        return Err(ChainError::CertificateExpired);
    }
    Ok(())
}

fn verify_signature(cert: &Certificate, signer_public_key: &[u8; 65]) -> ChainResult<()> {
    use ecdsa::signature::Verifier;
    let signature = cert.signature.ok_or(ChainError::SignatureVerifyFailed)?;
    let sig = ecdsa::Signature::<p256::NistP256>::from_slice(&signature)
        .map_err(|_| ChainError::SignatureVerifyFailed)?;
    let key = p256::PublicKey::from_sec1_bytes(signer_public_key)
        .map_err(|_| ChainError::SignatureVerifyFailed)?;
    let verifying_key = ecdsa::VerifyingKey::from(key);
    let tbs = cert.encode_tlv_for_signing()?;
    verifying_key
        .verify(&tbs, &sig)
        .map_err(|_| ChainError::SignatureVerifyFailed)
}
