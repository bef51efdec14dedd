//! API types shared between the gallery backend and its browsing frontend.
//!
//! This crate contains:
//! - `ImageRecord` - the derived listing/detail representation of one stored image
//! - Query and response types for the image endpoints
//! - Diagnostic payloads (`HealthResponse`, `DiagnosticResponse`)

pub mod health;
pub mod image;
pub mod response;

pub use health::*;
pub use image::*;
pub use response::*;
