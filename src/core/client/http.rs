use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::api::models::pipeline::{
    DeleteResponse, EnrollRequest, EnrollResponse, HealthResponse, PersonsResponse, PipelineResult,
};
use crate::core::client::{ImagePayload, InferenceRequest, InferenceService};
use crate::core::config::{ClientConfig, PipelineParams};
use crate::core::error::ClientError;

/// 推理服务 HTTP 客户端
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PipelineBody<'a> {
    image_base64: &'a str,
    recognize: bool,
    emotions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,
}

impl<'a> PipelineBody<'a> {
    fn new(image_base64: &'a str, params: &PipelineParams) -> Self {
        let params = params.clamped();
        Self {
            image_base64,
            recognize: params.recognize,
            emotions: params.emotions,
            top_k: params.top_k,
            threshold: params.threshold,
        }
    }
}

impl HttpInferenceClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("facecam_lib/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn enroll(&self, request: &EnrollRequest) -> Result<EnrollResponse, ClientError> {
        let resp = self
            .client
            .post(self.endpoint("enroll"))
            .json(request)
            .send()
            .await?;
        decode_response(resp).await
    }

    pub async fn list_persons(&self, limit: u32, offset: u32) -> Result<PersonsResponse, ClientError> {
        let resp = self
            .client
            .get(self.endpoint("persons"))
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        decode_response(resp).await
    }

    pub async fn delete_person(&self, person_id: i64) -> Result<DeleteResponse, ClientError> {
        let resp = self
            .client
            .delete(self.endpoint(&format!("persons/{}", person_id)))
            .send()
            .await?;
        decode_response(resp).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.client.get(self.endpoint("health")).send().await?;
        decode_response(resp).await
    }
}

#[async_trait]
impl InferenceService for HttpInferenceClient {
    async fn run_pipeline(&self, request: &InferenceRequest) -> Result<PipelineResult, ClientError> {
        let builder = self.client.post(self.endpoint("pipeline"));
        let builder = match &request.image {
            ImagePayload::DataUrl(data_url) => {
                builder.json(&PipelineBody::new(data_url, &request.params))
            }
            ImagePayload::File {
                file_name,
                mime,
                bytes,
            } => {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| ClientError::Validation(format!("bad mime type {}: {}", mime, e)))?;
                builder.multipart(Form::new().part("file", part))
            }
        };

        let resp = builder.send().await?;
        let result: PipelineResult = decode_response(resp).await?;
        debug!(
            "📥 HttpInferenceClient: {} face(s), total {:?}ms",
            result.faces.len(),
            result.total_ms()
        );
        Ok(result)
    }
}

async fn decode_response<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        let message = error_detail(&body)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| "request failed".to_string());
        warn!("❌ HttpInferenceClient: {} {}", status.as_u16(), message);
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

/// 取出 FastAPI 风格的 `{"detail": ...}`，否则回退到纯文本
fn error_detail(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return match value.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(value.to_string()),
        };
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.chars().take(200).collect())
    }
}
