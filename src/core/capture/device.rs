//! 摄像头接入层
//!
//! 真实的摄像头由宿主（Flutter camera 插件）持有：宿主上报权限结果、推送 RGBA 帧、
//! 在设备断开时通知。这里把它抽象成 `CameraDevice` / `MediaTrack` / `VideoSurface`，
//! 会话层只依赖这些 trait。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::core::capture::frame::{Dimensions, Frame};
use crate::core::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// 一路媒体轨道，只能由生命周期管理器停止
pub trait MediaTrack: Send {
    fn label(&self) -> &str;
    fn stop(&mut self);
}

/// 视频表面：提供原生分辨率的当前帧
#[async_trait]
pub trait VideoSurface: Send + Sync {
    fn dimensions(&self) -> Dimensions;

    fn capture(&self) -> Option<Frame>;

    /// 设备中途丢失时返回原因
    fn ended(&self) -> Option<String>;

    /// 订阅表面状态，原始尺寸一变化就会收到通知
    fn subscribe(&self) -> watch::Receiver<SurfaceState>;

    /// 等待开始播放并拿到原始尺寸
    async fn wait_for_playback(&self) -> Result<Dimensions, ClientError>;
}

pub struct MediaStream {
    pub tracks: Vec<Box<dyn MediaTrack>>,
    pub surface: Arc<dyn VideoSurface>,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn acquire(&self, facing: FacingMode) -> Result<MediaStream, ClientError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceState {
    pub dimensions: Dimensions,
    pub ended: Option<String>,
}

/// 宿主推帧的视频表面
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    state: watch::Sender<SurfaceState>,
    live: AtomicBool,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SurfaceState::default());
        Self {
            latest: Mutex::new(None),
            state,
            live: AtomicBool::new(false),
        }
    }

    /// 推送最新一帧；未开流或缓冲区尺寸不对时丢弃
    pub fn push(&self, frame: Frame) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        if !frame.is_well_formed() {
            warn!(
                "⚠️ FrameSlot: dropping malformed frame {}x{} ({} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
            return false;
        }

        let dims = frame.dimensions();
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);

        self.state.send_if_modified(|state| {
            if state.dimensions != dims {
                debug!("📐 FrameSlot: dimensions {}x{}", dims.width, dims.height);
                state.dimensions = dims;
                true
            } else {
                false
            }
        });
        true
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn open(&self) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(SurfaceState::default());
        self.live.store(true, Ordering::Release);
    }

    pub(crate) fn close(&self) {
        self.live.store(false, Ordering::Release);
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn end(&self, reason: String) {
        self.state.send_modify(|state| state.ended = Some(reason));
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSurface for FrameSlot {
    fn dimensions(&self) -> Dimensions {
        self.state.borrow().dimensions
    }

    fn capture(&self) -> Option<Frame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ended(&self) -> Option<String> {
        self.state.borrow().ended.clone()
    }

    fn subscribe(&self) -> watch::Receiver<SurfaceState> {
        self.state.subscribe()
    }

    async fn wait_for_playback(&self) -> Result<Dimensions, ClientError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !s.dimensions.is_empty() || s.ended.is_some())
            .await
            .map(|s| (*s).clone())
            .map_err(|_| ClientError::Device("video surface closed".into()))?;

        match state.ended {
            Some(reason) => Err(ClientError::Device(reason)),
            None => Ok(state.dimensions),
        }
    }
}

/// 宿主上报的权限状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    Pending,
    Granted,
    Denied(String),
    Unavailable(String),
}

/// 宿主驱动的摄像头
pub struct HostCamera {
    permission: watch::Sender<PermissionState>,
    slot: Arc<FrameSlot>,
    releases: Arc<AtomicU64>,
}

impl HostCamera {
    pub fn new() -> Self {
        let (permission, _) = watch::channel(PermissionState::Pending);
        Self {
            permission,
            slot: Arc::new(FrameSlot::new()),
            releases: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn grant(&self) {
        info!("✅ HostCamera: permission granted");
        self.permission.send_replace(PermissionState::Granted);
    }

    pub fn deny(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!("🚫 HostCamera: permission denied ({})", reason);
        self.permission.send_replace(PermissionState::Denied(reason));
    }

    /// 没有摄像头硬件
    pub fn report_unavailable(&self, reason: impl Into<String>) {
        self.permission
            .send_replace(PermissionState::Unavailable(reason.into()));
    }

    /// 流在播放中断开
    pub fn report_device_lost(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("⚠️ HostCamera: device lost ({})", reason);
        self.slot.end(reason);
    }

    pub fn push_frame(&self, frame: Frame) -> bool {
        self.slot.push(frame)
    }

    /// 宿主据此决定是否继续采集
    pub fn is_streaming(&self) -> bool {
        self.slot.is_live()
    }

    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::Acquire)
    }

    pub fn surface(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }
}

impl Default for HostCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for HostCamera {
    async fn acquire(&self, facing: FacingMode) -> Result<MediaStream, ClientError> {
        info!("📷 HostCamera: requesting {:?} camera", facing);

        let mut rx = self.permission.subscribe();
        let state = rx
            .wait_for(|s| *s != PermissionState::Pending)
            .await
            .map(|s| (*s).clone())
            .map_err(|_| ClientError::Device("camera host detached".into()))?;

        match state {
            PermissionState::Granted => {
                self.slot.open();
                let track = HostTrack {
                    label: format!("{:?}-facing video", facing).to_lowercase(),
                    slot: self.slot.clone(),
                    releases: self.releases.clone(),
                    stopped: false,
                };
                Ok(MediaStream {
                    tracks: vec![Box::new(track)],
                    surface: self.slot.clone(),
                })
            }
            PermissionState::Denied(reason) => Err(ClientError::Permission(reason)),
            PermissionState::Unavailable(reason) => Err(ClientError::Device(reason)),
            PermissionState::Pending => Err(ClientError::Device("permission unresolved".into())),
        }
    }
}

struct HostTrack {
    label: String,
    slot: Arc<FrameSlot>,
    releases: Arc<AtomicU64>,
    stopped: bool,
}

impl MediaTrack for HostTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.slot.close();
        self.releases.fetch_add(1, Ordering::AcqRel);
        debug!("🛑 HostTrack: {} stopped", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(width, height, vec![0u8; (width * height * 4) as usize], 0, 0)
    }

    #[tokio::test]
    async fn test_denied_camera_is_permission_error() {
        let camera = HostCamera::new();
        camera.deny("NotAllowedError");

        let result = camera.acquire(FacingMode::User).await;
        assert!(matches!(result, Err(ClientError::Permission(_))));
        assert!(!camera.is_streaming());
    }

    #[tokio::test]
    async fn test_unavailable_camera_is_device_error() {
        let camera = HostCamera::new();
        camera.report_unavailable("no video input");

        let result = camera.acquire(FacingMode::User).await;
        assert!(matches!(result, Err(ClientError::Device(_))));
    }

    #[tokio::test]
    async fn test_frames_ignored_until_granted() {
        let camera = HostCamera::new();
        assert!(!camera.push_frame(frame(4, 4)));

        camera.grant();
        let stream = camera.acquire(FacingMode::User).await.expect("应该拿到流");
        assert_eq!(stream.tracks.len(), 1);
        assert!(camera.push_frame(frame(4, 4)));
        assert_eq!(stream.surface.dimensions(), Dimensions::new(4, 4));
    }

    #[tokio::test]
    async fn test_subscribers_see_dimension_changes() {
        let camera = HostCamera::new();
        camera.grant();
        let stream = camera.acquire(FacingMode::User).await.unwrap();
        camera.push_frame(frame(8, 6));

        let mut rx = stream.surface.subscribe();
        camera.push_frame(frame(8, 6));
        assert!(!rx.has_changed().unwrap());

        camera.push_frame(frame(6, 8));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().dimensions, Dimensions::new(6, 8));
    }

    #[tokio::test]
    async fn test_wait_for_playback_resolves_on_first_frame() {
        let camera = HostCamera::new();
        camera.grant();
        let stream = camera.acquire(FacingMode::User).await.unwrap();

        let surface = stream.surface.clone();
        let waiter = tokio::spawn(async move { surface.wait_for_playback().await });
        tokio::task::yield_now().await;

        camera.push_frame(frame(8, 6));
        let dims = waiter.await.unwrap().unwrap();
        assert_eq!(dims, Dimensions::new(8, 6));
    }

    #[tokio::test]
    async fn test_device_lost_fails_playback() {
        let camera = HostCamera::new();
        camera.grant();
        let stream = camera.acquire(FacingMode::User).await.unwrap();

        camera.report_device_lost("unplugged");
        let result = stream.surface.wait_for_playback().await;
        assert!(matches!(result, Err(ClientError::Device(_))));
        assert_eq!(stream.surface.ended().as_deref(), Some("unplugged"));
    }

    #[tokio::test]
    async fn test_track_stop_is_counted_once() {
        let camera = HostCamera::new();
        camera.grant();
        let mut stream = camera.acquire(FacingMode::User).await.unwrap();

        for track in stream.tracks.iter_mut() {
            track.stop();
            track.stop();
        }
        assert_eq!(camera.release_count(), 1);
        assert!(!camera.is_streaming());
    }
}
