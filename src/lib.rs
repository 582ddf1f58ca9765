pub mod config;
pub mod error;
pub mod fetch;
pub mod live;
pub mod market;
pub mod notice;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod store;

pub use error::{AppError, Result};
pub use session::Session;
