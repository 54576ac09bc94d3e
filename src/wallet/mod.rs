//! Key pairs and Base58 addresses
//!
//! A wallet owns an ECDSA P-256 key pair; its address is the Base58 encoding
//! of version byte, public key hash and checksum.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
