//! Typed error kinds for the certificate codec, chain validator, PASE/CASE
//! engines and secure-channel manager (spec §7).
//!
//! Every public operation returns one of these enums (or a `std::io`/`anyhow`
//! error from a purely internal helper) — never a generic string error and
//! never a panic on attacker-controlled input.

use thiserror::Error;

/// Errors raised by the Matter-TLV certificate codec and X.509 translation (C1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("certificate is malformed: {0}")]
    InvalidCertificate(String),
    #[error("serial number longer than 20 bytes")]
    InvalidSerialNumber,
    #[error("unsupported signature algorithm (only ECDSA-with-SHA-256 is allowed)")]
    InvalidSignatureAlgo,
    #[error("unsupported public key algorithm (only EC is allowed)")]
    InvalidPublicKeyAlgo,
    #[error("unsupported elliptic curve (only prime256v1 is allowed)")]
    InvalidEllipticCurve,
    #[error("public key is not a valid uncompressed P-256 point")]
    InvalidPublicKey,
    #[error("signature is not 64 raw bytes (r||s)")]
    InvalidSignature,
    #[error("distinguished name is malformed: {0}")]
    InvalidDn(String),
    #[error("extension value is malformed: {0}")]
    InvalidExtension(String),
    #[error("required extension {0} is missing")]
    MissingExtension(&'static str),
    #[error("encoding exceeds the size limit for its kind")]
    CertificateTooLarge,
    #[error("unsupported OID: {0}")]
    UnsupportedOid(String),
}

/// Errors raised validating a NOC/ICAC/RCAC chain (C2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("certificate could not be parsed: {0}")]
    CertificateParseFailed(#[from] CodecError),
    #[error("certificate is not of the expected type")]
    CertificateTypeMismatch,
    #[error("certificate has expired")]
    CertificateExpired,
    #[error("certificate is not yet valid")]
    CertificateNotYetValid,
    #[error("chain does not terminate at the trusted root")]
    ChainBroken,
    #[error("signature verification failed")]
    SignatureVerifyFailed,
    #[error("NOC subject is missing a node id")]
    MissingNodeId,
    #[error("NOC subject is missing a fabric id")]
    MissingFabricId,
    #[error("ICAC fabric id does not match NOC fabric id")]
    FabricIdMismatch,
}

/// Errors shared by the PASE and CASE handshake state machines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("message received in an unexpected handshake state")]
    InvalidState,
    #[error("message is malformed: {0}")]
    InvalidMessage(String),
    #[error("passcode is not in the allowed range or is a disallowed value")]
    InvalidPasscode,
    #[error("salt length must be between 16 and 32 bytes")]
    InvalidSalt,
    #[error("iteration count must be between 1000 and 100000")]
    InvalidIterations,
    #[error("initiator random in response does not match the request")]
    RandomMismatch,
    #[error("confirmation value verification failed")]
    ConfirmationFailed,
    #[error("session keys are not yet available")]
    SessionNotReady,
    #[error("no fabric shares a trust root with the initiator")]
    NoSharedRoot,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("peer signature verification failed")]
    SignatureVerifyFailed,
    #[error("peer node id does not match the expected target")]
    NodeIdMismatch,
    #[error("peer fabric id does not match the expected fabric")]
    FabricIdMismatch,
    #[error("resumption MIC verification failed")]
    ResumptionMicFailed,
    #[error("AEAD authentication failed")]
    AeadFailure,
    #[error("ephemeral public key is not a valid uncompressed P-256 point")]
    MalformedEphemeralPoint,
}

/// Errors raised by the secure-channel manager (C5).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("no handler registered for opcode 0x{0:02x}")]
    NoHandler(u8),
    #[error("a handshake is already in progress on this exchange")]
    HandshakeInProgress,
    #[error("no active handshake on this exchange")]
    NoActiveHandshake,
    #[error("session table is full")]
    SessionTableFull,
    #[error("opcode 0x{0:02x} is not valid during session establishment")]
    InvalidOpcode(u8),
    #[error("session is closed")]
    SessionClosed,
    #[error("commissioning window not open")]
    CommissioningWindowNotOpen,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type CodecResult<T> = Result<T, CodecError>;
pub type ChainResult<T> = Result<T, ChainError>;
pub type EngineResult<T> = Result<T, EngineError>;
pub type ManagerResult<T> = Result<T, ManagerError>;
