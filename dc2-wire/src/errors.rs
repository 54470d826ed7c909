//! Wire-level error taxonomy (`spec.md` §6/§7): exact EC2/AutoScaling error
//! code strings and the HTTP status they map to.

#[derive(Debug, Clone)]
pub struct WireError {
    pub code: String,
    pub message: String,
    pub status: u16,
}

impl WireError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self { code: code.into(), message: message.into(), status }
    }

    pub fn invalid_action(action: &str) -> Self {
        Self::new("InvalidAction", format!("The action '{action}' is not valid"), 400)
    }

    pub fn invalid_form(detail: impl std::fmt::Display) -> Self {
        Self::new("InvalidForm", detail.to_string(), 400)
    }

    pub fn invalid_parameter_value(detail: impl std::fmt::Display) -> Self {
        Self::new("InvalidParameterValue", detail.to_string(), 400)
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new("MissingParameter", format!("The request is missing required parameter {name}"), 400)
    }

    pub fn dry_run_operation() -> Self {
        Self::new("DryRunOperation", "Request would have succeeded, but DryRun flag is set", 400)
    }

    pub fn validation_error(detail: impl std::fmt::Display) -> Self {
        Self::new("ValidationError", detail.to_string(), 400)
    }

    pub fn resource_not_found(kind: &str, id: &str) -> Self {
        Self::new(
            format!("Invalid{kind}ID.NotFound"),
            format!("The {kind} ID '{id}' does not exist"),
            400,
        )
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new("InternalError", detail.to_string(), 500)
    }

    pub fn method_not_allowed() -> Self {
        Self::new("InvalidAction", "Only POST is supported", 405)
    }
}

impl From<crate::form::FormError> for WireError {
    fn from(e: crate::form::FormError) -> Self {
        match e {
            crate::form::FormError::InvalidForm(_) | crate::form::FormError::NonContiguousIndices(_) => {
                WireError::invalid_form(e)
            }
            crate::form::FormError::MissingParameter(name) => WireError::missing_parameter(&name),
            crate::form::FormError::BadValue(_) => WireError::invalid_parameter_value(e),
        }
    }
}
