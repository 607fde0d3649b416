/// Health check payload.
pub mod health;
/// Caller identity extractor.
pub mod identity;
/// Round action payloads.
pub mod round;
/// Session action payloads.
pub mod session;
/// Custom validators shared by payloads.
pub mod validation;
