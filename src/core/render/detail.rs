//! 每张人脸的情绪分布面板和延迟徽标，都是仓库快照的纯投影

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::api::models::pipeline::FaceAnnotation;

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionEntry {
    pub label: String,
    pub probability: f32,
    /// 四舍五入后的百分比
    pub percent: u32,
    /// 进度条长度，0..=1
    pub bar_fraction: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionPanel {
    pub title: String,
    pub entries: Vec<EmotionEntry>,
}

impl EmotionPanel {
    pub fn from_face(face: &FaceAnnotation) -> Self {
        let entries = face
            .emotion
            .as_ref()
            .map(|e| sorted_entries(&e.probabilities))
            .unwrap_or_default();
        Self {
            title: face.display_name().to_string(),
            entries,
        }
    }

}

/// 概率从高到低，相同概率按标签排序保证稳定
pub fn sorted_entries(probabilities: &BTreeMap<String, f32>) -> Vec<EmotionEntry> {
    let mut entries: Vec<EmotionEntry> = probabilities
        .iter()
        .filter(|(_, p)| p.is_finite())
        .map(|(label, &p)| {
            let fraction = p.clamp(0.0, 1.0);
            EmotionEntry {
                label: label.clone(),
                probability: p,
                percent: (fraction * 100.0).round() as u32,
                bar_fraction: fraction,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    entries
}

pub fn emotion_panels(faces: &[FaceAnnotation]) -> Vec<EmotionPanel> {
    faces.iter().map(EmotionPanel::from_face).collect()
}

pub const LATENCY_PLACEHOLDER: &str = "—";

/// 后端缺少计时时会给 0，按没有测量处理
pub fn latency_badge(latency_ms: Option<f64>) -> String {
    match latency_ms.filter(|ms| ms.is_finite() && *ms > 0.0) {
        Some(ms) => format!("Latency {:.0} ms", ms.max(0.0)),
        None => format!("Latency {}", LATENCY_PLACEHOLDER),
    }
}
