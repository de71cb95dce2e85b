use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

/// Result alias of the MongoDB backend.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Server error code returned when a unique index rejects an insert.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending connection string.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A required environment variable is unset.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection being indexed.
        collection: &'static str,
        /// Name of the index.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A query failed.
    #[error("failed to read `{collection}` ({operation})")]
    Read {
        /// Collection being read.
        collection: &'static str,
        /// Store operation that issued the query.
        operation: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A write failed.
    #[error("failed to write `{collection}` ({operation})")]
    Write {
        /// Collection being written.
        collection: &'static str,
        /// Store operation that issued the write.
        operation: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored document could not be decoded.
    #[error("unexpected document in `{collection}`: {message}")]
    Malformed {
        /// Collection holding the document.
        collection: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl MongoDaoError {
    /// Error mapper for a failed query.
    pub fn read(
        collection: &'static str,
        operation: &'static str,
    ) -> impl FnOnce(MongoError) -> Self {
        move |source| MongoDaoError::Read {
            collection,
            operation,
            source,
        }
    }

    /// Error mapper for a failed write.
    pub fn write(
        collection: &'static str,
        operation: &'static str,
    ) -> impl FnOnce(MongoError) -> Self {
        move |source| MongoDaoError::Write {
            collection,
            operation,
            source,
        }
    }
}

/// Whether the error is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}
