//! # Imaging archive client
//!
//! Read-only client for the imaging archive's REST API. The archive stores the standard
//! Study → Series → Instance hierarchy; an instance is one cine clip made of frames.
//!
//! Operations:
//! - [`ImagingClient::find_studies`]: studies for a patient identifier on a given date
//! - [`ImagingClient::series_instances`]: ordered instance ids of a series
//! - [`ImagingClient::frame_count`]: number of frames in an instance (0 when absent)
//! - [`ImagingClient::frame_preview`]: one frame rendered as a still image
//!
//! Nothing in this crate mutates archive state.

pub mod client;
pub mod config;
pub mod instances;
pub mod series;
pub mod studies;

pub use client::ImagingClient;
pub use config::ImagingConfig;
pub use studies::Study;

/// Errors returned by the imaging client.
#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive answered with a non-success status
    #[error("imaging archive returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The response did not match the expected wire schema
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Type alias for Results that can fail with an [`ImagingError`].
pub type ImagingResult<T> = Result<T, ImagingError>;
