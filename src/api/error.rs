use serde::{Deserialize, Serialize};

use crate::core::error::ClientError;

/// 对宿主暴露的错误类型，FRB 友好的设计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            error_type: "InvalidInput".to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn runtime(e: std::io::Error) -> Self {
        Self {
            error_type: "RuntimeError".to_string(),
            message: format!("failed to start async runtime: {}", e),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        Self {
            error_type: e.kind().as_str().to_string(),
            message: e.user_message(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_error_mapping() {
        let err: ApiError = ClientError::Permission("NotAllowedError".into()).into();
        assert_eq!(err.error_type, "PermissionError");
        assert_eq!(err.message, "Unable to access camera.");
        assert_eq!(err.to_string(), "[PermissionError] Unable to access camera.");
    }

    #[test]
    fn test_server_error_keeps_detail() {
        let err: ApiError = ClientError::Server {
            status: 422,
            message: "Name is required".into(),
        }
        .into();
        assert_eq!(err.error_type, "ServerError");
        assert!(err.message.contains("Name is required"));
    }
}
