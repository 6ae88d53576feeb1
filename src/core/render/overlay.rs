//! 叠加层渲染
//!
//! `render_overlay` 是纯函数：同样的人脸和尺寸得到同样的绘制指令。
//! `OverlaySurface` 保留一块与媒体同尺寸的 RGBA 画布，每次变化都整帧重画；
//! 文字只以指令形式交给宿主绘制。

use image::{Rgba, RgbaImage};

use crate::api::models::pipeline::FaceAnnotation;
use crate::core::capture::frame::Dimensions;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear {
        width: u32,
        height: u32,
    },
    StrokeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: [u8; 4],
        line_width: f32,
    },
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: [u8; 4],
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        color: [u8; 4],
        font_px: f32,
    },
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub stroke: [u8; 4],
    pub label_background: [u8; 4],
    pub text: [u8; 4],
    pub line_width: f32,
    pub font_px: f32,
    /// 估算的平均字宽，用来计算标签背景宽度
    pub char_width: f32,
    pub label_height: f32,
    pub label_padding: f32,
    /// 文字基线距框顶的距离
    pub baseline_offset: f32,
    /// 贴近顶边时基线的最小 y
    pub min_baseline: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke: [0x38, 0xbd, 0xf8, 0xff],
            label_background: [15, 23, 42, 179],
            text: [0xf8, 0xfa, 0xfc, 0xff],
            line_width: 2.0,
            font_px: 14.0,
            char_width: 7.5,
            label_height: 20.0,
            label_padding: 6.0,
            baseline_offset: 6.0,
            min_baseline: 12.0,
        }
    }
}

impl OverlayStyle {
    pub fn measure(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.char_width
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayFrame {
    pub dimensions: Dimensions,
    pub commands: Vec<DrawCommand>,
}

impl OverlayFrame {
    pub fn rect_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::StrokeRect { .. }))
            .count()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// "姓名 • 情绪"，没有身份时显示 Unknown
pub fn face_label(face: &FaceAnnotation) -> String {
    match face.emotion.as_ref().filter(|e| !e.label.is_empty()) {
        Some(emotion) => format!("{} • {}", face.display_name(), emotion.label),
        None => face.display_name().to_string(),
    }
}

pub fn render_overlay(
    faces: &[FaceAnnotation],
    dimensions: Dimensions,
    style: &OverlayStyle,
) -> OverlayFrame {
    let mut commands = Vec::with_capacity(1 + faces.len() * 3);
    commands.push(DrawCommand::Clear {
        width: dimensions.width,
        height: dimensions.height,
    });

    for face in faces {
        let bbox = face.bbox;
        commands.push(DrawCommand::StrokeRect {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
            color: style.stroke,
            line_width: style.line_width,
        });

        let label = face_label(face);
        let label_width = style.measure(&label) + style.label_padding * 2.0;
        let max_x = (dimensions.width as f32 - label_width).max(0.0);
        let label_x = bbox.x.clamp(0.0, max_x);
        let label_y = (bbox.y - style.label_height).max(0.0);

        commands.push(DrawCommand::FillRect {
            x: label_x,
            y: label_y,
            width: label_width,
            height: style.label_height,
            color: style.label_background,
        });
        commands.push(DrawCommand::Text {
            x: label_x + style.label_padding,
            y: (bbox.y - style.baseline_offset).max(style.min_baseline),
            text: label,
            color: style.text,
            font_px: style.font_px,
        });
    }

    OverlayFrame {
        dimensions,
        commands,
    }
}

/// 保留式画布：尺寸先对齐媒体，再整帧重画
pub struct OverlaySurface {
    style: OverlayStyle,
    raster: RgbaImage,
    frame: OverlayFrame,
    redraws: u64,
}

impl OverlaySurface {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            raster: RgbaImage::new(0, 0),
            frame: OverlayFrame::default(),
            redraws: 0,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.raster.dimensions();
        Dimensions::new(width, height)
    }

    pub fn redraw(&mut self, faces: &[FaceAnnotation], dimensions: Dimensions) -> &OverlayFrame {
        if self.dimensions() != dimensions {
            self.raster = RgbaImage::new(dimensions.width, dimensions.height);
        }

        self.frame = render_overlay(faces, dimensions, &self.style);
        for command in &self.frame.commands {
            match command {
                DrawCommand::Clear { .. } => {
                    for pixel in self.raster.pixels_mut() {
                        *pixel = Rgba([0, 0, 0, 0]);
                    }
                }
                DrawCommand::StrokeRect {
                    x,
                    y,
                    width,
                    height,
                    color,
                    line_width,
                } => stroke_rect(
                    &mut self.raster,
                    [*x, *y, *width, *height],
                    Rgba(*color),
                    line_width.round().max(1.0) as u32,
                ),
                DrawCommand::FillRect {
                    x,
                    y,
                    width,
                    height,
                    color,
                } => fill_rect(&mut self.raster, [*x, *y, *width, *height], Rgba(*color)),
                DrawCommand::Text { .. } => {}
            }
        }
        self.redraws += 1;
        &self.frame
    }

    pub fn frame(&self) -> &OverlayFrame {
        &self.frame
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

/// 把 (x, y, w, h) 收敛成画布内的闭区间像素坐标
fn pixel_bounds(img: &RgbaImage, rect: [f32; 4]) -> Option<[u32; 4]> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let [x, y, rw, rh] = rect;
    let clamp = |v: f32, max: u32| -> u32 { v.round().max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(x, w);
    let y0 = clamp(y, h);
    let x1 = clamp(x + rw - 1.0, w);
    let y1 = clamp(y + rh - 1.0, h);
    if x0 > x1 || y0 > y1 || x >= w as f32 || y >= h as f32 || x + rw <= 0.0 || y + rh <= 0.0 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn stroke_rect(img: &mut RgbaImage, rect: [f32; 4], color: Rgba<u8>, thickness: u32) {
    let Some([x0, y0, x1, y1]) = pixel_bounds(img, rect) else {
        return;
    };
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, rect: [f32; 4], color: Rgba<u8>) {
    let Some([x0, y0, x1, y1]) = pixel_bounds(img, rect) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, color);
        }
    }
}
