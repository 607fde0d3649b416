/// Write batches, preconditions and their in-memory application.
pub mod batch;
/// Session document stores.
pub mod session_store;
/// Storage error types shared by every backend.
pub mod storage;
