/// Live match persistence: the store trait and its backends.
pub mod live_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
