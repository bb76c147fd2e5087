//! Matter PASE/CASE secure channel establishment core and certificate codec.
//!
//! - [`cert`] / [`chain`] — Matter-TLV certificate codec, X.509 translation
//!   and NOC/ICAC/RCAC chain validation (C1/C2).
//! - [`pase`] / [`case`] — the SPAKE2+ and Sigma handshake state machines
//!   (C3/C4).
//! - [`manager`] — the stateful coordinator that routes Secure Channel
//!   protocol messages to the right handshake and hands completed ones to a
//!   caller-supplied session store (C5).

pub mod case;
pub mod cert;
pub mod chain;
pub mod error;
pub mod fabric;
pub mod manager;
pub mod pase;
pub mod status;
pub mod tlv;
pub mod types;
pub mod util;
