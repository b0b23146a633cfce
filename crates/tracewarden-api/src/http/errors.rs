//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracewarden_config::ConfigError;
use tracewarden_pipeline::PipelineError;

use crate::http::constants::{
    PROBLEM_BAD_REQUEST, PROBLEM_CONFIG_INVALID, PROBLEM_INTERNAL, PROBLEM_START_FAILED,
};
use crate::models::{ProblemDetails, ProblemInvalidParam};

/// Structured API error with optional RFC9457 fields.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    invalid_params: Option<Vec<ProblemInvalidParam>>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_params(mut self, params: Vec<ProblemInvalidParam>) -> Self {
        self.invalid_params = Some(params);
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn config_invalid(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            PROBLEM_CONFIG_INVALID,
            "configuration invalid",
        )
        .with_detail(detail)
    }

    pub(crate) fn start_failed(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_START_FAILED,
            "pipeline start failed",
        )
        .with_detail(detail)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidField {
                field,
                reason,
                value,
            } => {
                let detail = value.map_or_else(
                    || format!("{field}: {reason}"),
                    |value| format!("{field}: {reason} (got {value})"),
                );
                Self::config_invalid(detail).with_invalid_params(vec![ProblemInvalidParam {
                    pointer: format!("/{field}"),
                    message: reason.to_string(),
                }])
            }
            ConfigError::MalformedPatch { source } => Self::bad_request(source.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Config { source } => source.into(),
            other => {
                let detail = other.path().map_or_else(
                    || other.to_string(),
                    |path| format!("{other}: {}", path.display()),
                );
                Self::start_failed(detail)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn invalid_field_maps_to_unprocessable_with_pointer() {
        let err = ApiError::from(ConfigError::InvalidField {
            field: "capture_extension",
            reason: "must_start_with_dot",
            value: Some("pcap".into()),
        });
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind, PROBLEM_CONFIG_INVALID);
        let params = err.invalid_params.unwrap_or_default();
        assert_eq!(params[0].pointer, "/capture_extension");
    }

    #[test]
    fn directory_failure_maps_to_internal_with_path() {
        let err = ApiError::from(PipelineError::Io {
            operation: "create_working_dir",
            path: "/readonly/pcap_files".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            err.detail
                .as_deref()
                .is_some_and(|detail| detail.contains("/readonly/pcap_files"))
        );
    }
}
