//! Matter-TLV certificate codec and X.509 translation (C1, spec §4.1).

pub mod certificate;
pub mod dn;
pub mod extensions;
pub mod x509;

pub use certificate::{Certificate, CertificateType};
pub use dn::{DistinguishedName, DnAttribute};
pub use extensions::Extensions;
pub use x509::{matter_to_x509, x509_to_matter};
