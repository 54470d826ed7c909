//! Error taxonomy for the dispatcher + lifecycle engine (`spec.md` §7).
//! Every variant knows how to become the exact wire error the codec sends;
//! callers that need the underlying cause (e.g. delete-on-termination
//! cleanup, which joins errors rather than aborting) match on the enum
//! directly instead of going through `WireError`.

use dc2_wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("the {kind} ID '{id}' does not exist")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    InvalidParameterValue(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Request would have succeeded, but DryRun flag is set")]
    DryRun,

    #[error("{0}")]
    MissingParameter(String),

    #[error("executor failure: {0}")]
    Executor(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { kind, id: id.into() }
    }
}

impl From<dc2_store::StoreError> for EngineError {
    /// Store errors never carry a resource kind by themselves; callers that
    /// can attach one should map the error explicitly instead of relying on
    /// this generic conversion, which is only used where kind doesn't matter
    /// for the response.
    fn from(e: dc2_store::StoreError) -> Self {
        match e {
            dc2_store::StoreError::NotFound(id) => EngineError::NotFound { kind: "Resource", id },
            dc2_store::StoreError::AlreadyExists(id) => {
                EngineError::Internal(format!("resource {id} already exists"))
            }
        }
    }
}

impl From<dc2_filter::FilterError> for EngineError {
    fn from(e: dc2_filter::FilterError) -> Self {
        EngineError::InvalidParameterValue(e.to_string())
    }
}

impl From<dc2_filter::PaginationError> for EngineError {
    fn from(_: dc2_filter::PaginationError) -> Self {
        EngineError::InvalidParameterValue("malformed NextToken".to_string())
    }
}

impl From<dc2_executor::ExecutorError> for EngineError {
    fn from(e: dc2_executor::ExecutorError) -> Self {
        EngineError::Executor(e.to_string())
    }
}

impl From<EngineError> for WireError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound { kind, id } => WireError::resource_not_found(kind, &id),
            EngineError::InvalidParameterValue(msg) => WireError::invalid_parameter_value(msg),
            EngineError::ValidationError(msg) => WireError::validation_error(msg),
            EngineError::DryRun => WireError::dry_run_operation(),
            EngineError::MissingParameter(name) => WireError::missing_parameter(&name),
            EngineError::Executor(msg) => WireError::internal(msg),
            EngineError::Internal(msg) => WireError::internal(msg),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
