//! 测试用的脚本化推理服务：按载荷内容决定延迟与返回值

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::models::pipeline::{BoundingBox, Emotion, FaceAnnotation, Identity, PipelineResult};
use crate::core::client::{ImagePayload, InferenceRequest, InferenceService};
use crate::core::error::ClientError;

#[derive(Debug, Clone)]
pub enum Reply {
    Ok(PipelineResult),
    Network,
    Validation,
    Server(u16),
}

pub struct ScriptedService {
    script: Mutex<HashMap<String, (Duration, Reply)>>,
    default_delay: Mutex<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            default_delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, key: &str, delay: Duration, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .insert(key.to_string(), (delay, reply));
    }

    pub fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_payloads(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn payload_key(image: &ImagePayload) -> String {
    match image {
        ImagePayload::DataUrl(url) => url.clone(),
        ImagePayload::File { file_name, .. } => file_name.clone(),
    }
}

pub fn request(key: &str) -> InferenceRequest {
    InferenceRequest {
        image: ImagePayload::DataUrl(key.to_string()),
        params: Default::default(),
    }
}

#[async_trait]
impl InferenceService for ScriptedService {
    async fn run_pipeline(&self, request: &InferenceRequest) -> Result<PipelineResult, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = payload_key(&request.image);
        self.seen.lock().unwrap().push(key.clone());

        let scripted = self.script.lock().unwrap().get(&key).cloned();
        let (delay, reply) = scripted.unwrap_or_else(|| {
            (
                *self.default_delay.lock().unwrap(),
                Reply::Ok(PipelineResult::default()),
            )
        });

        tokio::time::sleep(delay).await;
        match reply {
            Reply::Ok(result) => Ok(result),
            Reply::Network => Err(ClientError::Network("connection refused".into())),
            Reply::Validation => Err(ClientError::Validation("missing field `faces`".into())),
            Reply::Server(status) => Err(ClientError::Server {
                status,
                message: "pipeline failed".into(),
            }),
        }
    }
}

pub fn face(bbox: [f32; 4], score: f32, person: Option<&str>, emotion: Option<(&str, &[(&str, f32)])>) -> FaceAnnotation {
    FaceAnnotation {
        bbox: BoundingBox::from(bbox),
        score,
        identity: person.map(|p| Identity {
            person: p.to_string(),
            similarity: 0.8,
        }),
        emotion: emotion.map(|(label, probs)| Emotion {
            label: label.to_string(),
            probabilities: probs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }),
        landmarks: BTreeMap::new(),
    }
}

/// 以 total 耗时作为结果标记
pub fn result_marked(total_ms: f64, faces: Vec<FaceAnnotation>) -> PipelineResult {
    PipelineResult {
        faces,
        timing_ms: BTreeMap::from([("total".to_string(), total_ms)]),
    }
}
