//! pdfink Client Library
//!
//! HTTP implementation of the backend boundary: opening documents, fetching the IR,
//! submitting patches and downloading the edited file.

pub mod config;
pub mod error;
pub mod http;
pub mod wire;

pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use http::HttpBackend;
