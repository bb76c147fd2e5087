//! Fabric membership data consumed by the CASE engine (C4) and the
//! secure-channel manager (C5). Fabric storage itself is an external
//! collaborator (spec §1); this module only defines the shape of what it
//! hands over and the small set of derivations that depend on it.

use byteorder::{BigEndian, WriteBytesExt};

use crate::util::cryptoutil;

/// Everything the CASE engine needs about one fabric this node has joined.
/// Supplied by an external `FabricStore` implementation; this crate never
/// persists fabric data itself.
#[derive(Clone)]
pub struct FabricInfo {
    pub index: u16,
    pub fabric_id: u64,
    pub node_id: u64,
    /// 65-byte uncompressed root CA public key.
    pub root_public_key: Vec<u8>,
    /// Identity Protection Key epoch key (16 bytes), before per-fabric derivation.
    pub ipk_epoch_key: [u8; 16],
    /// This node's NOC, Matter-TLV encoded.
    pub noc_bytes: Vec<u8>,
    /// This node's ICAC, Matter-TLV encoded, if the chain has one.
    pub icac_bytes: Option<Vec<u8>>,
}

impl FabricInfo {
    /// 8-byte compressed fabric id (spec §9 glossary), `HKDF-SHA256(fabric_id_be,
    /// root_public_key[1..], "CompressedFabric", 8)`.
    pub fn compressed_fabric_id(&self) -> anyhow::Result<[u8; 8]> {
        let compressed = compressed_fabric_id(self.fabric_id, &self.root_public_key)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&compressed);
        Ok(out)
    }

    /// Per-fabric IPK operational key, `DeriveGroupOperationalKeyV1` over this
    /// fabric's epoch key and compressed fabric id (spec §4.4).
    pub fn operational_ipk(&self) -> anyhow::Result<[u8; 16]> {
        let compressed = self.compressed_fabric_id()?;
        let derived = derive_group_operational_key_v1(&self.ipk_epoch_key, &compressed)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&derived);
        Ok(out)
    }
}

/// Iteration over the fabrics this node belongs to. Implemented by the
/// caller; the CASE responder uses it to resolve a Sigma1 destination-id to
/// a fabric (spec §4.4, §9 — every fabric's HMAC must actually be computed
/// and compared, not just the first one returned).
pub trait FabricStore: Send + Sync {
    fn for_each(&self, f: &mut dyn FnMut(&FabricInfo));
}

pub fn compressed_fabric_id(fabric_id: u64, root_public_key: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut buf_id = Vec::new();
    buf_id.write_u64::<BigEndian>(fabric_id)?;
    cryptoutil::hkdf_sha256(&buf_id, &root_public_key[1..], b"CompressedFabric", 8)
}

/// `DeriveGroupOperationalKeyV1`: HKDF over the raw epoch key salted by the
/// compressed fabric id, labelled `"GroupKey v1.0"` (Matter group-key schedule
/// §9 glossary entry for IPK/"Compressed Fabric ID").
pub fn derive_group_operational_key_v1(
    epoch_key: &[u8],
    compressed_fabric_id: &[u8],
) -> anyhow::Result<Vec<u8>> {
    cryptoutil::hkdf_sha256(compressed_fabric_id, epoch_key, b"GroupKey v1.0", 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_fabric_id_is_deterministic() {
        let root_public_key = vec![4u8; 65];
        let a = compressed_fabric_id(0x1234567890ABCDEF, &root_public_key).unwrap();
        let b = compressed_fabric_id(0x1234567890ABCDEF, &root_public_key).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        let c = compressed_fabric_id(0x1234567890ABCDEE, &root_public_key).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn operational_ipk_differs_per_fabric() {
        let fab1 = FabricInfo {
            index: 0,
            fabric_id: 1,
            node_id: 1,
            root_public_key: vec![4u8; 65],
            ipk_epoch_key: [7u8; 16],
            noc_bytes: Vec::new(),
            icac_bytes: None,
        };
        let mut fab2 = fab1.clone();
        fab2.fabric_id = 2;
        assert_ne!(fab1.operational_ipk().unwrap(), fab2.operational_ipk().unwrap());
    }
}
