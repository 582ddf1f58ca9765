use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Context, Result};

/// Storage key for the crypto dashboard's favorites list. Other domains
/// (e.g. weather cities) use their own key in the same store.
pub const CRYPTO_FAVORITES_KEY: &str = "favoriteCryptoCoins";

/// JSON-backed favorites persistence, one file per domain key.
pub struct FavoritesStore {
    dir: PathBuf,
}

impl FavoritesStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// A missing or corrupt file yields an empty list, never a hard failure.
    pub fn load(&self, key: &str) -> Vec<String> {
        let path = self.path_for(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&data) {
            Ok(favorites) => favorites,
            Err(err) => {
                log::warn!(
                    "ignoring unreadable favorites file {}: {}",
                    path.display(),
                    err
                );
                Vec::new()
            }
        }
    }

    pub fn save(&self, key: &str, favorites: &[String]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).context("Failed to create favorites directory")?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(favorites)?;
        let mut file = fs::File::create(&path)
            .with_context(|| format!("Failed to create favorites file {:?}", path))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write favorites file {:?}", path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_favorites_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::new(dir.path());

        let favorites = vec!["BTC".to_string(), "ADA".to_string()];
        store.save(CRYPTO_FAVORITES_KEY, &favorites).unwrap();
        assert_eq!(store.load(CRYPTO_FAVORITES_KEY), favorites);
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::new(dir.path());
        assert!(store.load(CRYPTO_FAVORITES_KEY).is_empty());
    }

    #[test]
    fn corrupt_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.path_for(CRYPTO_FAVORITES_KEY), "{not json").unwrap();
        assert!(store.load(CRYPTO_FAVORITES_KEY).is_empty());
    }
}
