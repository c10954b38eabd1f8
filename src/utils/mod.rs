//! Utils Module - Helper Functions & Shared Utilities
//!
//! Berisi cache hasil scoring dan konstanta yang digunakan di seluruh aplikasi.

pub mod cache;
pub mod constants;

pub use cache::*;
pub use constants::*;
