pub mod admin;
pub mod auth;
pub mod headers;
pub mod registry;
pub mod routes;
pub mod state;
pub mod token;

pub use routes::build_router;
pub use state::AppState;
