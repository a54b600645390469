//! HTTP API layer for the NFT media pipeline.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
