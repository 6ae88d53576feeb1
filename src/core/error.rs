use thiserror::Error;

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Camera permission denied: {0}")]
    Permission(String),
    #[error("Camera device error: {0}")]
    Device(String),
    #[error("Inference service unreachable: {0}")]
    Network(String),
    #[error("Malformed inference response: {0}")]
    Validation(String),
    #[error("Inference service error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Session cannot {action} while {state}")]
    InvalidState { state: String, action: &'static str },
    #[error("Session cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permission,
    Device,
    Network,
    Validation,
    Server,
    Image,
    Io,
    Config,
    InvalidState,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Device => "DeviceError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Server => "ServerError",
            ErrorKind::Image => "ImageError",
            ErrorKind::Io => "IoError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Permission(_) => ErrorKind::Permission,
            ClientError::Device(_) => ErrorKind::Device,
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Image(_) => ErrorKind::Image,
            ClientError::Io(_) => ErrorKind::Io,
            ClientError::Config(_) => ErrorKind::Config,
            ClientError::InvalidState { .. } => ErrorKind::InvalidState,
            ClientError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 终止型错误：会话进入 error 状态，需要重新挂载
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::Permission(_) | ClientError::Device(_))
    }

    /// 展示在视图旁边的错误文案
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Permission(_) => "Unable to access camera.".to_string(),
            ClientError::Device(reason) => format!("Camera unavailable: {}", reason),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Validation(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(ClientError::Permission("denied".into()).is_terminal());
        assert!(ClientError::Device("unplugged".into()).is_terminal());
        assert!(!ClientError::Network("timeout".into()).is_terminal());
        assert!(!ClientError::Validation("bad json".into()).is_terminal());
    }

    #[test]
    fn test_permission_user_message() {
        let err = ClientError::Permission("NotAllowedError".into());
        assert_eq!(err.user_message(), "Unable to access camera.");
        assert_eq!(err.kind().as_str(), "PermissionError");
    }

    #[test]
    fn test_json_error_is_validation() {
        let err: ClientError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
