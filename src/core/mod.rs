//! Core Module - Business Logic
//!
//! Otak aplikasi: ekstraksi fitur, model scoring, dan orkestrasi request.

pub mod features;
pub mod orchestrator;
pub mod scoring;

pub use features::*;
pub use orchestrator::*;
pub use scoring::*;
