/// Persisted data shapes.
pub mod models;
/// Snapshot persistence backends.
pub mod snapshot_store;
/// Storage abstraction layer errors.
pub mod storage;
