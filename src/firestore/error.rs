use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreErrorCode {
    InvalidArgument,
    UnsupportedDisjunction,
    UnsupportedFilteredGroupScope,
    InvalidCollectionPath,
    InvalidArrayableClause,
    InvalidIncrementAmount,
    InvalidDocumentScope,
    TransportFailure,
    MissingProjectId,
    AlreadyExists,
    FailedPrecondition,
    Internal,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
}

impl FirestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreErrorCode::UnsupportedDisjunction => "firestore/unsupported-disjunction",
            FirestoreErrorCode::UnsupportedFilteredGroupScope => {
                "firestore/unsupported-filtered-group-scope"
            }
            FirestoreErrorCode::InvalidCollectionPath => "firestore/invalid-collection-path",
            FirestoreErrorCode::InvalidArrayableClause => "firestore/invalid-arrayable-clause",
            FirestoreErrorCode::InvalidIncrementAmount => "firestore/invalid-increment-amount",
            FirestoreErrorCode::InvalidDocumentScope => "firestore/invalid-document-scope",
            FirestoreErrorCode::TransportFailure => "firestore/transport-failure",
            FirestoreErrorCode::MissingProjectId => "firestore/missing-project-id",
            FirestoreErrorCode::AlreadyExists => "firestore/already-exists",
            FirestoreErrorCode::FailedPrecondition => "firestore/failed-precondition",
            FirestoreErrorCode::Internal => "firestore/internal",
            FirestoreErrorCode::NotFound => "firestore/not-found",
            FirestoreErrorCode::PermissionDenied => "firestore/permission-denied",
            FirestoreErrorCode::Unauthenticated => "firestore/unauthenticated",
            FirestoreErrorCode::Unavailable => "firestore/unavailable",
            FirestoreErrorCode::DeadlineExceeded => "firestore/deadline-exceeded",
            FirestoreErrorCode::ResourceExhausted => "firestore/resource-exhausted",
        }
    }

    /// Upstream status name as reported by the Firestore REST surface.
    pub fn status_name(&self) -> &'static str {
        match self {
            FirestoreErrorCode::InvalidArgument
            | FirestoreErrorCode::UnsupportedDisjunction
            | FirestoreErrorCode::UnsupportedFilteredGroupScope
            | FirestoreErrorCode::InvalidCollectionPath
            | FirestoreErrorCode::InvalidArrayableClause
            | FirestoreErrorCode::InvalidIncrementAmount
            | FirestoreErrorCode::InvalidDocumentScope => "INVALID_ARGUMENT",
            FirestoreErrorCode::TransportFailure => "UNKNOWN",
            FirestoreErrorCode::MissingProjectId => "FAILED_PRECONDITION",
            FirestoreErrorCode::AlreadyExists => "ALREADY_EXISTS",
            FirestoreErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            FirestoreErrorCode::Internal => "INTERNAL",
            FirestoreErrorCode::NotFound => "NOT_FOUND",
            FirestoreErrorCode::PermissionDenied => "PERMISSION_DENIED",
            FirestoreErrorCode::Unauthenticated => "UNAUTHENTICATED",
            FirestoreErrorCode::Unavailable => "UNAVAILABLE",
            FirestoreErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            FirestoreErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
        }
    }
}

/// Position of a failed mutation chunk, `index` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPosition {
    pub index: usize,
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct FirestoreError {
    pub code: FirestoreErrorCode,
    message: String,
    query: Option<String>,
    chunk: Option<ChunkPosition>,
    status: Option<String>,
}

impl FirestoreError {
    pub fn new(code: FirestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            query: None,
            chunk: None,
            status: None,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic form of the statement that was being executed, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn chunk(&self) -> Option<ChunkPosition> {
        self.chunk
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_chunk(mut self, index: usize, total: usize) -> Self {
        self.chunk = Some(ChunkPosition { index, total });
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Validation failures are raised locally before any store round-trip.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code,
            FirestoreErrorCode::InvalidArgument
                | FirestoreErrorCode::UnsupportedDisjunction
                | FirestoreErrorCode::UnsupportedFilteredGroupScope
                | FirestoreErrorCode::InvalidCollectionPath
                | FirestoreErrorCode::InvalidArrayableClause
                | FirestoreErrorCode::InvalidIncrementAmount
                | FirestoreErrorCode::InvalidDocumentScope
        )
    }

    /// Wraps a store error as a transport failure carrying `[STATUS] message`.
    ///
    /// Validation errors and errors that are already wrapped pass through.
    pub fn into_transport_failure(self) -> Self {
        if self.is_validation() || self.code == FirestoreErrorCode::TransportFailure {
            return self;
        }
        let status = self
            .status
            .clone()
            .unwrap_or_else(|| self.code.status_name().to_string());
        let message = format!("[{status}] {}", self.message);
        Self {
            code: FirestoreErrorCode::TransportFailure,
            message,
            query: self.query,
            chunk: self.chunk,
            status: Some(status),
        }
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())?;
        if let Some(chunk) = self.chunk {
            write!(f, " [chunk {}/{}]", chunk.index, chunk.total)?;
        }
        if let Some(query) = &self.query {
            write!(f, " (query: {query})")?;
        }
        Ok(())
    }
}

impl Error for FirestoreError {}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArgument, message)
}

pub fn unsupported_disjunction() -> FirestoreError {
    FirestoreError::new(
        FirestoreErrorCode::UnsupportedDisjunction,
        "Firestore does not support OR operator on WHERE clauses",
    )
}

pub fn unsupported_filtered_group_scope() -> FirestoreError {
    FirestoreError::new(
        FirestoreErrorCode::UnsupportedFilteredGroupScope,
        "Query collection group in document path does not support where clauses",
    )
}

pub fn invalid_collection_path(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidCollectionPath, message)
}

pub fn invalid_arrayable_clause(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArrayableClause, message)
}

pub fn invalid_increment_amount(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidIncrementAmount, message)
}

pub fn invalid_document_scope(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidDocumentScope, message)
}

pub fn missing_project_id() -> FirestoreError {
    FirestoreError::new(
        FirestoreErrorCode::MissingProjectId,
        "Connection configuration must include a project_id",
    )
}

pub fn already_exists(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::AlreadyExists, message)
}

pub fn failed_precondition(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::FailedPrecondition, message)
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::NotFound, message)
}

pub fn permission_denied(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::PermissionDenied, message)
}

pub fn unauthenticated(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unauthenticated, message)
}

pub fn unavailable(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unavailable, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::ResourceExhausted, message)
}
