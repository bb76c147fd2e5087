//! SPAKE2+ primitive over P-256: verifier derivation, the prover's and
//! verifier's share/confirmation computations (spec §4.3). Generalises the
//! initiator-only math the original CA tooling carried, which was always
//! the "prover" side, into both roles.

use p256::elliptic_curve::{
    scalar::FromUintUnchecked,
    sec1::{FromEncodedPoint, ToEncodedPoint},
    Curve, Field,
};
use std::ops::Mul;

use crate::error::{EngineError, EngineResult};
use crate::util::cryptoutil;

/// Passcodes the Matter specification calls out as trivially guessable and
/// therefore refuses regardless of range (spec §4.3).
const DISALLOWED_PASSCODES: [u32; 11] = [
    11_111_111, 22_222_222, 33_333_333, 44_444_444, 55_555_555, 66_666_666, 77_777_777, 88_888_888,
    99_999_999, 12_345_678, 87_654_321,
];

pub fn validate_passcode(passcode: u32) -> EngineResult<()> {
    if passcode < 1 || passcode > 99_999_999 {
        return Err(EngineError::InvalidPasscode);
    }
    if DISALLOWED_PASSCODES.contains(&passcode) {
        return Err(EngineError::InvalidPasscode);
    }
    Ok(())
}

pub fn validate_salt(salt: &[u8]) -> EngineResult<()> {
    if salt.len() < 16 || salt.len() > 32 {
        return Err(EngineError::InvalidSalt);
    }
    Ok(())
}

pub fn validate_iterations(iterations: u32) -> EngineResult<()> {
    if !(1000..=100_000).contains(&iterations) {
        return Err(EngineError::InvalidIterations);
    }
    Ok(())
}

/// `W0 || L`, 97 bytes: what a PASE responder stores instead of the passcode
/// itself (spec §4.3).
#[derive(Clone)]
pub struct Verifier {
    pub w0: [u8; 32],
    pub l: [u8; 65],
}

impl Verifier {
    pub fn to_bytes(&self) -> [u8; 97] {
        let mut out = [0u8; 97];
        out[..32].copy_from_slice(&self.w0);
        out[32..].copy_from_slice(&self.l);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() != 97 {
            return Err(EngineError::InvalidMessage("verifier must be 97 bytes".into()));
        }
        let mut w0 = [0u8; 32];
        let mut l = [0u8; 65];
        w0.copy_from_slice(&bytes[..32]);
        l.copy_from_slice(&bytes[32..]);
        Ok(Self { w0, l })
    }
}

fn p256_scalar_from_40_bytes(bytes: &[u8]) -> p256::Scalar {
    let int = crypto_bigint::U320::from_be_slice(bytes);
    let modulo = int.rem(&crypto_bigint::NonZero::from_uint(crypto_bigint::U320::from(
        &p256::NistP256::ORDER,
    )));
    let u256 = crypto_bigint::U256::from(&modulo);
    p256::Scalar::from_uint_unchecked(u256)
}

fn derive_w0_w1(passcode: u32, salt: &[u8], iterations: u32) -> (p256::Scalar, p256::Scalar) {
    let key = passcode.to_le_bytes();
    let mut kdf = [0u8; 80];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(&key, salt, iterations, &mut kdf);
    (p256_scalar_from_40_bytes(&kdf[..40]), p256_scalar_from_40_bytes(&kdf[40..]))
}

/// Steps 1-4 of the verifier derivation (spec §4.3), exposed standalone so
/// commissioners can provision a responder out-of-band.
pub fn create_verifier(passcode: u32, salt: &[u8], iterations: u32) -> EngineResult<Verifier> {
    validate_passcode(passcode)?;
    validate_salt(salt)?;
    validate_iterations(iterations)?;
    let (w0, w1) = derive_w0_w1(passcode, salt, iterations);
    let l = p256::ProjectivePoint::GENERATOR.mul(w1);
    let mut w0_bytes = [0u8; 32];
    w0_bytes.copy_from_slice(w0.to_bytes().as_slice());
    let mut l_bytes = [0u8; 65];
    l_bytes.copy_from_slice(l.to_encoded_point(false).as_bytes());
    Ok(Verifier { w0: w0_bytes, l: l_bytes })
}

fn point_m() -> p256::AffinePoint {
    decode_fixed_point("02886e2f97ace46e55ba9dd7242579f2993b64e16ef3dcab95afd497333d8fa12f")
}

fn point_n() -> p256::AffinePoint {
    decode_fixed_point("03d8bbd6c639c62937b04d997f38c3770719c629d7014d49a24b4f98baa1292b49")
}

fn decode_fixed_point(hex_str: &str) -> p256::AffinePoint {
    let bin = hex::decode(hex_str).expect("fixed SPAKE2+ constant is valid hex");
    let encoded = p256::EncodedPoint::from_bytes(bin).expect("fixed SPAKE2+ constant is a valid point");
    p256::AffinePoint::from_encoded_point(&encoded)
        .into_option()
        .expect("fixed SPAKE2+ constant is on the curve")
}

fn decode_point(bytes: &[u8]) -> EngineResult<p256::EncodedPoint> {
    p256::EncodedPoint::from_bytes(bytes).map_err(|_| EngineError::MalformedEphemeralPoint)
}

fn to_projective(point: &p256::EncodedPoint) -> EngineResult<p256::ProjectivePoint> {
    p256::ProjectivePoint::from_encoded_point(point)
        .into_option()
        .ok_or(EngineError::MalformedEphemeralPoint)
}

/// In-progress handshake state held by either side between its own share
/// being generated and the peer's share arriving.
pub struct ProverContext {
    w0: p256::Scalar,
    w1: p256::Scalar,
    x_random: p256::Scalar,
    pub x: [u8; 65],
}

pub struct VerifierContext {
    w0: p256::Scalar,
    l: p256::EncodedPoint,
    y_random: p256::Scalar,
    pub y: [u8; 65],
}

/// Output of a completed SPAKE2+ exchange: confirmation values plus the
/// session keys this side derived (spec §4.3's `SessionKeys`).
pub struct Completion {
    pub confirm_own: Vec<u8>,
    pub confirm_peer_expected: Vec<u8>,
    pub shared_secret: Vec<u8>,
}

fn encoded65(point: &p256::ProjectivePoint) -> [u8; 65] {
    let mut out = [0u8; 65];
    out.copy_from_slice(point.to_encoded_point(false).as_bytes());
    out
}

pub fn start_prover(w0: [u8; 32], w1: [u8; 32]) -> EngineResult<ProverContext> {
    let w0 = p256::Scalar::from_uint_unchecked(crypto_bigint::U256::from_be_slice(&w0));
    let w1 = p256::Scalar::from_uint_unchecked(crypto_bigint::U256::from_be_slice(&w1));
    let x_random = p256::Scalar::random(rand::thread_rng());
    let share = point_m().mul(&w0) + p256::ProjectivePoint::GENERATOR.mul(x_random);
    Ok(ProverContext { w0, w1, x_random, x: encoded65(&share) })
}

pub fn start_prover_from_passcode(passcode: u32, salt: &[u8], iterations: u32) -> EngineResult<ProverContext> {
    validate_passcode(passcode)?;
    validate_salt(salt)?;
    validate_iterations(iterations)?;
    let (w0, w1) = derive_w0_w1(passcode, salt, iterations);
    let x_random = p256::Scalar::random(rand::thread_rng());
    let share = point_m().mul(&w0) + p256::ProjectivePoint::GENERATOR.mul(x_random);
    Ok(ProverContext { w0, w1, x_random, x: encoded65(&share) })
}

pub fn start_verifier(verifier: &Verifier) -> EngineResult<VerifierContext> {
    let w0 = p256::Scalar::from_uint_unchecked(crypto_bigint::U256::from_be_slice(&verifier.w0));
    let l = decode_point(&verifier.l)?;
    let y_random = p256::Scalar::random(rand::thread_rng());
    let share = point_n().mul(&w0) + p256::ProjectivePoint::GENERATOR.mul(y_random);
    Ok(VerifierContext { w0, l, y_random, y: encoded65(&share) })
}

/// Builds the `TT` transcript and derives `(Z, V)` then the confirmation and
/// session keys, shared by both roles once `Z`/`V` are known (spec §4.3).
/// Raw confirmation MACs, independent of which side is computing them:
/// `cA = HMAC(KcA, Y)`, `cB = HMAC(KcB, X)` (RFC 9383 / Matter §4.3), each
/// keyed over the *other* party's share. `x` is always the A-side
/// (prover) share, `y` always the B-side (verifier) share, regardless of
/// which role is calling.
struct RawConfirmation {
    c_a: Vec<u8>,
    c_b: Vec<u8>,
    shared_secret: Vec<u8>,
}

fn finish_common(context_hash: &[u8], m_bytes: &[u8], n_bytes: &[u8], x: &[u8], y: &[u8],
                  z: &p256::ProjectivePoint, v: &p256::ProjectivePoint, w0: &p256::Scalar) -> EngineResult<RawConfirmation> {
    let mut tt = Vec::with_capacity(256);
    append_len_prefixed(&mut tt, context_hash);
    append_len_prefixed(&mut tt, &[]);
    append_len_prefixed(&mut tt, &[]);
    append_len_prefixed(&mut tt, m_bytes);
    append_len_prefixed(&mut tt, n_bytes);
    append_len_prefixed(&mut tt, x);
    append_len_prefixed(&mut tt, y);
    append_len_prefixed(&mut tt, z.to_encoded_point(false).as_bytes());
    append_len_prefixed(&mut tt, v.to_encoded_point(false).as_bytes());
    append_len_prefixed(&mut tt, w0.to_bytes().as_slice());

    let hashed = cryptoutil::sha256(&tt);
    let ka = &hashed[..16];
    let ke = &hashed[16..32];

    let okm = cryptoutil::hkdf_sha256(&[], ka, b"ConfirmationKeys", 32)
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
    let kc_a = &okm[..16];
    let kc_b = &okm[16..];

    let c_a = cryptoutil::hmac_sha256(y, kc_a).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
    let c_b = cryptoutil::hmac_sha256(x, kc_b).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;

    let session_keys = cryptoutil::hkdf_sha256(&[], ke, b"SessionKeys", 48)
        .map_err(|e| EngineError::InvalidMessage(e.to_string()))?;

    Ok(RawConfirmation { c_a, c_b, shared_secret: session_keys })
}

fn append_len_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
    buf.extend_from_slice(data);
}

/// Prover (initiator) side: `cA = own confirmation` (sent in Pake3), `cB =
/// expected peer confirmation` (verified against Pake2). The prover is
/// always the A side, so `cA`/`cB` map to own/peer directly.
pub fn finish_prover(ctx: &ProverContext, peer_y: &[u8], context_hash: &[u8]) -> EngineResult<Completion> {
    let y_point = decode_point(peer_y)?;
    let y_proj = to_projective(&y_point)?;
    let w0n = point_n().mul(&ctx.w0).neg();
    let shifted = y_proj + w0n;
    let z = shifted.mul(ctx.x_random);
    let v = shifted.mul(ctx.w1);
    let raw = finish_common(
        context_hash,
        point_m().to_encoded_point(false).as_bytes(),
        point_n().to_encoded_point(false).as_bytes(),
        &ctx.x,
        peer_y,
        &z,
        &v,
        &ctx.w0,
    )?;
    Ok(Completion { confirm_own: raw.c_a, confirm_peer_expected: raw.c_b, shared_secret: raw.shared_secret })
}

/// Verifier (responder) side: `cB = own confirmation` (sent in Pake2), `cA =
/// expected peer confirmation` (verified against Pake3). The verifier is
/// always the B side, so `cA`/`cB` map to peer/own respectively.
pub fn finish_verifier(ctx: &VerifierContext, peer_x: &[u8], context_hash: &[u8]) -> EngineResult<Completion> {
    let x_point = decode_point(peer_x)?;
    let x_proj = to_projective(&x_point)?;
    let w0m = point_m().mul(&ctx.w0).neg();
    let shifted = x_proj + w0m;
    let z = shifted.mul(ctx.y_random);
    let l_proj = to_projective(&ctx.l)?;
    let v = l_proj.mul(ctx.y_random);
    let raw = finish_common(
        context_hash,
        point_m().to_encoded_point(false).as_bytes(),
        point_n().to_encoded_point(false).as_bytes(),
        peer_x,
        &ctx.y,
        &z,
        &v,
        &ctx.w0,
    )?;
    Ok(Completion { confirm_own: raw.c_b, confirm_peer_expected: raw.c_a, shared_secret: raw.shared_secret })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passcode_range_and_blocklist() {
        assert!(validate_passcode(0).is_err());
        assert!(validate_passcode(100_000_000).is_err());
        assert!(validate_passcode(11_111_111).is_err());
        assert!(validate_passcode(12_345_678).is_err());
        assert!(validate_passcode(20_202_021).is_ok());
    }

    #[test]
    fn spake2p_verifier_known_answer() {
        // Known-answer values published alongside the Matter SPAKE2+ test
        // vector: only the prefix and suffix of W0 are quoted here, the
        // rest elided.
        let verifier = create_verifier(20_202_021, b"SPAKE2P Key Salt", 1000).unwrap();
        let w0_hex = hex::encode_upper(verifier.w0);
        assert!(w0_hex.starts_with("B96170AAE8033468"));
        assert!(w0_hex.ends_with("AECB35"));
        assert_eq!(verifier.w0.len(), 32);
        assert_eq!(verifier.l[0], 0x04);
        assert_eq!(verifier.l.len(), 65);
    }

    #[test]
    fn prover_and_verifier_agree_on_shared_secret() {
        let verifier = create_verifier(20_202_021, b"SPAKE2P Key Salt", 1000).unwrap();
        let prover = start_prover_from_passcode(20_202_021, b"SPAKE2P Key Salt", 1000).unwrap();
        let ver_ctx = start_verifier(&verifier).unwrap();

        let context_hash = cryptoutil::sha256(b"transcript");
        let prover_done = finish_prover(&prover, &ver_ctx.y, &context_hash).unwrap();
        let verifier_done = finish_verifier(&ver_ctx, &prover.x, &context_hash).unwrap();

        assert_eq!(prover_done.shared_secret, verifier_done.shared_secret);
        assert_eq!(prover_done.confirm_own, verifier_done.confirm_peer_expected);
        assert_eq!(verifier_done.confirm_own, prover_done.confirm_peer_expected);
    }
}
