use serde::{Deserialize, Serialize};

use crate::api::models::pipeline::FaceAnnotation;
use crate::core::pipeline::store::StoreSnapshot;
use crate::core::render::detail::{emotion_panels, latency_badge, EmotionPanel};
use crate::core::render::overlay::{face_label, render_overlay, DrawCommand, OverlayStyle};

/// 单张人脸，坐标为媒体原始像素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceView {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
    pub person: Option<String>,
    pub similarity: Option<f32>,
    pub emotion: Option<String>,
    pub label: String,
}

impl From<&FaceAnnotation> for FaceView {
    fn from(face: &FaceAnnotation) -> Self {
        Self {
            x: face.bbox.x,
            y: face.bbox.y,
            width: face.bbox.width,
            height: face.bbox.height,
            score: face.score,
            person: face.identity.as_ref().map(|i| i.person.clone()),
            similarity: face.identity.as_ref().map(|i| i.similarity),
            emotion: face.emotion.as_ref().map(|e| e.label.clone()),
            label: face_label(face),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionEntryView {
    pub label: String,
    pub percent: u32,
    pub bar_fraction: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionPanelView {
    pub title: String,
    pub entries: Vec<EmotionEntryView>,
}

impl From<EmotionPanel> for EmotionPanelView {
    fn from(panel: EmotionPanel) -> Self {
        Self {
            title: panel.title,
            entries: panel
                .entries
                .into_iter()
                .map(|e| EmotionEntryView {
                    label: e.label,
                    percent: e.percent,
                    bar_fraction: e.bar_fraction,
                })
                .collect(),
        }
    }
}

/// 宿主侧 Canvas 逐条执行的绘制指令，颜色为 RGBA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayCommandView {
    Clear { width: u32, height: u32 },
    StrokeRect { x: f32, y: f32, width: f32, height: f32, rgba: Vec<u8>, line_width: f32 },
    FillRect { x: f32, y: f32, width: f32, height: f32, rgba: Vec<u8> },
    Text { x: f32, y: f32, text: String, rgba: Vec<u8>, font_px: f32 },
}

impl From<DrawCommand> for OverlayCommandView {
    fn from(command: DrawCommand) -> Self {
        match command {
            DrawCommand::Clear { width, height } => OverlayCommandView::Clear { width, height },
            DrawCommand::StrokeRect {
                x,
                y,
                width,
                height,
                color,
                line_width,
            } => OverlayCommandView::StrokeRect {
                x,
                y,
                width,
                height,
                rgba: color.to_vec(),
                line_width,
            },
            DrawCommand::FillRect {
                x,
                y,
                width,
                height,
                color,
            } => OverlayCommandView::FillRect {
                x,
                y,
                width,
                height,
                rgba: color.to_vec(),
            },
            DrawCommand::Text {
                x,
                y,
                text,
                color,
                font_px,
            } => OverlayCommandView::Text {
                x,
                y,
                text,
                rgba: color.to_vec(),
                font_px,
            },
        }
    }
}

/// 某一时刻可直接渲染的全部内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationView {
    pub width: u32,
    pub height: u32,
    pub faces: Vec<FaceView>,
    pub panels: Vec<EmotionPanelView>,
    pub overlay: Vec<OverlayCommandView>,
    pub latency_ms: Option<f64>,
    pub latency_label: String,
    pub error: Option<String>,
    pub revision: u64,
}

impl AnnotationView {
    pub(crate) fn project(snapshot: &StoreSnapshot, style: &OverlayStyle) -> Self {
        let faces = snapshot.faces();
        let overlay = render_overlay(faces, snapshot.dimensions, style);
        Self {
            width: snapshot.dimensions.width,
            height: snapshot.dimensions.height,
            faces: faces.iter().map(FaceView::from).collect(),
            panels: emotion_panels(faces)
                .into_iter()
                .map(EmotionPanelView::from)
                .collect(),
            overlay: overlay
                .commands
                .into_iter()
                .map(OverlayCommandView::from)
                .collect(),
            latency_ms: snapshot.latency_ms,
            latency_label: latency_badge(snapshot.latency_ms),
            error: snapshot.error.clone(),
            revision: snapshot.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveView {
    /// idle / acquiring / streaming / error / stopped
    pub state: String,
    pub annotations: AnnotationView,
}
