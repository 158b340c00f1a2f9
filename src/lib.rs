pub mod auth;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod store;
pub mod wildcard;

pub use error::{RegistryError, Result};
pub use http::{build_router, AppState};
