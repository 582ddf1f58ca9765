pub mod favorites;

pub use favorites::{FavoritesStore, CRYPTO_FAVORITES_KEY};
