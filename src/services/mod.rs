/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Round actions driven by the dasher and the players.
pub mod round_service;
/// Session-level actions: lookup, launch and kick.
pub mod session_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
