//! HTTP endpoint handlers, grouped by surface.

pub mod chat;
pub mod clinician;
pub mod escalation;
pub mod health;
pub mod profile;
pub mod sessions;
