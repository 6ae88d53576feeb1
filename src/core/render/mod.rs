pub mod detail;
pub mod overlay;

pub use detail::{emotion_panels, latency_badge, EmotionEntry, EmotionPanel};
pub use overlay::{render_overlay, DrawCommand, OverlayFrame, OverlayStyle, OverlaySurface};
