use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// 人脸框，源图像素坐标 (x, y, width, height)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub person: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    /// 服务端的 `/emotion` 路由用 `emotion` 字段名
    #[serde(alias = "emotion")]
    pub label: String,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    pub score: f32,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub emotion: Option<Emotion>,
    #[serde(default, deserialize_with = "deserialize_landmarks")]
    pub landmarks: BTreeMap<String, [f32; 2]>,
}

impl FaceAnnotation {
    pub fn display_name(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.person.as_str())
            .unwrap_or("Unknown")
    }
}

/// 一次推理的完整结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub faces: Vec<FaceAnnotation>,
    #[serde(default, deserialize_with = "deserialize_timings")]
    pub timing_ms: BTreeMap<String, f64>,
}

impl PipelineResult {
    pub fn total_ms(&self) -> Option<f64> {
        self.timing_ms.get("total").copied()
    }
}

// 服务端 LandmarkSet 中缺失的点是 null
fn deserialize_landmarks<'de, D>(deserializer: D) -> Result<BTreeMap<String, [f32; 2]>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<Vec<f32>>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, point)| match point.as_deref() {
            Some([x, y, ..]) => Some((name, [*x, *y])),
            _ => None,
        })
        .collect())
}

fn deserialize_timings<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<f64>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(stage, ms)| ms.map(|ms| (stage, ms)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub embedding_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonsResponse {
    pub results: Vec<PersonRecord>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub name: String,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub person_id: i64,
    pub name: String,
    #[serde(default)]
    pub samples: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
