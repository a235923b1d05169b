//! # apiary-client
//!
//! reqwest-backed implementation of the [`apiary_core::traits::Platform`]
//! contract.

mod http;

pub use http::HttpPlatform;
