use async_trait::async_trait;

use crate::api::models::pipeline::PipelineResult;
use crate::core::config::PipelineParams;
use crate::core::error::ClientError;

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpInferenceClient;

/// 推理图片载荷：摄像头走 base64 JSON，照片走 multipart
#[derive(Debug, Clone)]
pub enum ImagePayload {
    DataUrl(String),
    File {
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub image: ImagePayload,
    pub params: PipelineParams,
}

/// 外部推理服务的唯一契约
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn run_pipeline(&self, request: &InferenceRequest) -> Result<PipelineResult, ClientError>;
}
