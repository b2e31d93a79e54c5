//! HTTP middleware.

pub mod identity;
