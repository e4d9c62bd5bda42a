//! Map server (GeoServer) integration: REST client, publication and retries.

pub mod client;
pub mod publisher;
pub mod retry;

pub use client::GeoServerClient;
pub use publisher::{layer_urls, LayerPublisher};

#[derive(Debug, thiserror::Error)]
pub enum GeoServerError {
    #[error("map server request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("map server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected map server response: {0}")]
    Decode(String),
}
