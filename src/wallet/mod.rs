use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A keypair whose address can be used as a miner identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerIdentity {
    pub private_key: String,
    pub public_key: String,
    pub address: String,
}

/// Generate a new secp256k1 keypair (compressed public key) and its address.
pub fn generate_identity() -> MinerIdentity {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    MinerIdentity {
        private_key: hex::encode(sk.secret_bytes()),
        public_key: hex::encode(pk.serialize()),
        address: address_of(&pk),
    }
}

/// Derive the address of a hex-encoded public key.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(address_of(&pk))
}

/// `0x` + the first 20 bytes of sha256(compressed pubkey).
fn address_of(pk: &PublicKey) -> String {
    let digest = Sha256::digest(pk.serialize());
    format!("0x{}", hex::encode(&digest[..20]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_address_matches_its_public_key() {
        let id = generate_identity();
        assert_eq!(id.private_key.len(), 64);
        assert_eq!(id.public_key.len(), 66);
        assert_eq!(id.address.len(), 42);
        assert!(id.address.starts_with("0x"));
        assert_eq!(pubkey_to_address_hex(&id.public_key).unwrap(), id.address);
    }

    #[test]
    fn identities_are_unique() {
        assert_ne!(generate_identity().address, generate_identity().address);
    }

    #[test]
    fn rejects_garbage_pubkeys() {
        assert!(pubkey_to_address_hex("zz").is_err());
        assert!(pubkey_to_address_hex("02abcd").is_err());
    }
}
