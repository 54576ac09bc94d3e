use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Wallets keyed by address, persisted as one bincode file.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    /// Load the wallet file, or start empty if it does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Wallets> {
        let path = path.as_ref().to_path_buf();
        let wallets = if path.exists() {
            let bytes = fs::read(&path)?;
            deserialize(&bytes).map_err(|e| {
                BlockchainError::Wallet(format!(
                    "Could not load wallets from {}: {e}",
                    path.display()
                ))
            })?
        } else {
            HashMap::new()
        };
        Ok(Wallets { wallets, path })
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        log::info!("Created wallet {address}");
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallets_persist_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.dat");

        let mut wallets = Wallets::load(&path).unwrap();
        let first = wallets.create_wallet().unwrap();
        let second = wallets.create_wallet().unwrap();

        let reloaded = Wallets::load(&path).unwrap();
        let addresses = reloaded.get_addresses();
        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&first));
        assert!(addresses.contains(&second));

        let wallet = reloaded.get_wallet(&first).unwrap();
        assert_eq!(wallet.get_address(), first);
    }

    #[test]
    fn test_corrupt_wallet_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.dat");
        fs::write(&path, [0xFF, 0xFF, 0xFF]).unwrap();

        assert!(matches!(Wallets::load(&path), Err(BlockchainError::Wallet(_))));
    }

    #[test]
    fn test_missing_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let wallets = Wallets::load(dir.path().join("none.dat")).unwrap();
        assert!(wallets.get_wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").is_none());
        assert!(wallets.get_addresses().is_empty());
    }
}
