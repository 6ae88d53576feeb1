use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ClientError;

pub const BASE_URL_ENV: &str = "FACECAM_API_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// 推理服务地址配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// 读取 `FACECAM_API_BASE_URL`，未设置时使用默认地址
    pub fn from_env() -> Self {
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::with_base_url(url),
            _ => Self::default(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base url must be http(s): {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// 每次推理请求携带的参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub recognize: bool,
    pub emotions: bool,
    pub top_k: Option<u32>,
    pub threshold: Option<f32>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            recognize: true,
            emotions: true,
            top_k: Some(3),
            threshold: Some(0.6),
        }
    }
}

impl PipelineParams {
    pub const TOP_K_RANGE: (u32, u32) = (1, 10);

    /// 收敛到服务端接受的范围（top_k 1-10，threshold 0-1）
    pub fn clamped(self) -> Self {
        let (lo, hi) = Self::TOP_K_RANGE;
        Self {
            top_k: self.top_k.map(|k| k.clamp(lo, hi)),
            threshold: self
                .threshold
                .filter(|t| t.is_finite())
                .map(|t| t.clamp(0.0, 1.0)),
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub max_in_flight: usize,
    /// 单次派发的超时上限
    pub request_timeout: Duration,
    pub params: PipelineParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            jpeg_quality: 85,
            max_in_flight: 4,
            request_timeout: DEFAULT_TIMEOUT,
            params: PipelineParams::default(),
        }
    }
}

impl SessionConfig {
    pub fn for_slow_network() -> Self {
        Self {
            interval: Duration::from_millis(500),
            jpeg_quality: 75,
            max_in_flight: 2,
            ..Default::default()
        }
    }

    pub fn for_fast_network() -> Self {
        Self {
            interval: Duration::from_millis(150),
            jpeg_quality: 90,
            max_in_flight: 6,
            ..Default::default()
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval = Duration::from_millis(interval_ms.max(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.params.top_k, Some(3));
    }

    #[test]
    fn test_params_clamped() {
        let params = PipelineParams {
            top_k: Some(42),
            threshold: Some(1.7),
            ..Default::default()
        }
        .clamped();
        assert_eq!(params.top_k, Some(10));
        assert_eq!(params.threshold, Some(1.0));

        let params = PipelineParams {
            top_k: Some(0),
            threshold: Some(f32::NAN),
            ..Default::default()
        }
        .clamped();
        assert_eq!(params.top_k, Some(1));
        assert_eq!(params.threshold, None);
    }

    #[test]
    fn test_client_config_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::with_base_url("ftp://nope").validate().is_err());
    }
}
