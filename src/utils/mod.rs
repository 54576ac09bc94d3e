//! Hashing, signing and encoding helpers shared by the ledger and wallets.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, ripemd160_digest, sha256_digest, EcdsaP256, SignatureScheme,
};

pub use serialization::{deserialize, serialize};
