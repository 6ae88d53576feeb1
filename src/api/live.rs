//! 实时摄像头标注

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flutter_rust_bridge::frb;
use log::info;
use tokio::runtime::Runtime;

use crate::api::error::ApiError;
use crate::api::models::view::{AnnotationView, LiveView};
use crate::core::capture::device::HostCamera;
use crate::core::capture::frame::Frame;
use crate::core::capture::sampler::SampleOutcome;
use crate::core::client::{HttpInferenceClient, InferenceService};
use crate::core::config::{ClientConfig, SessionConfig};
use crate::core::pipeline::session::LiveSession;
use crate::core::pipeline::state_machine::SessionState;
use crate::core::render::overlay::OverlayStyle;

/// 抽帧参数预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPreset {
    #[default]
    Standard,
    SlowNetwork,
    FastNetwork,
}

impl SessionPreset {
    fn config(self) -> SessionConfig {
        match self {
            SessionPreset::Standard => SessionConfig::default(),
            SessionPreset::SlowNetwork => SessionConfig::for_slow_network(),
            SessionPreset::FastNetwork => SessionConfig::for_fast_network(),
        }
    }
}

/// 实时摄像头 - 宿主推帧，Rust 负责抽帧、推理和叠加层
///
/// ```dart
/// final camera = LiveCamera.create(baseUrl: null, preset: SessionPreset.standard);
/// camera.grantPermission();
/// final view = await camera.mount();
/// controller.startImageStream((img) => camera.pushFrame(...));
/// ...
/// camera.unmount();
/// ```
#[frb(opaque)]
pub struct LiveCamera {
    runtime: Runtime,
    camera: Arc<HostCamera>,
    service: Arc<dyn InferenceService>,
    config: SessionConfig,
    session: Mutex<Option<Arc<LiveSession>>>,
    style: OverlayStyle,
}

impl LiveCamera {
    /// `base_url` 为空时读取 `FACECAM_API_BASE_URL`
    #[frb(sync)]
    pub fn create(base_url: Option<String>, preset: SessionPreset) -> Result<Self, ApiError> {
        let client_config = match base_url {
            Some(url) => ClientConfig::with_base_url(url),
            None => ClientConfig::from_env(),
        };
        let client = HttpInferenceClient::new(&client_config)?;
        info!("🎥 LiveCamera: created, backend {}", client.base_url());
        Self::with_service(Arc::new(client), preset.config())
    }

    pub(crate) fn with_service(
        service: Arc<dyn InferenceService>,
        config: SessionConfig,
    ) -> Result<Self, ApiError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("facecam-live")
            .enable_all()
            .build()
            .map_err(ApiError::runtime)?;

        Ok(Self {
            runtime,
            camera: Arc::new(HostCamera::new()),
            service,
            config,
            session: Mutex::new(None),
            style: OverlayStyle::default(),
        })
    }

    fn current(&self) -> Option<Arc<LiveSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 挂载：每次都从全新的会话开始，等待权限和首帧
    #[frb(dart_async)]
    pub fn mount(&self) -> Result<LiveView, ApiError> {
        let session = Arc::new(LiveSession::new(
            self.camera.clone(),
            self.service.clone(),
            self.config.clone(),
        ));
        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session.clone());
        if let Some(previous) = previous {
            previous.stop();
        }

        self.runtime.block_on(session.start())?;
        Ok(self.view_of(&session))
    }

    /// 卸载：停止抽帧并释放摄像头，可重复调用
    #[frb(sync)]
    pub fn unmount(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.stop();
        }
    }

    #[frb(sync)]
    pub fn grant_permission(&self) {
        self.camera.grant();
    }

    #[frb(sync)]
    pub fn deny_permission(&self, reason: String) {
        self.camera.deny(reason);
    }

    #[frb(sync)]
    pub fn report_unavailable(&self, reason: String) {
        self.camera.report_unavailable(reason);
    }

    #[frb(sync)]
    pub fn report_device_lost(&self, reason: String) {
        self.camera.report_device_lost(reason);
    }

    /// 推送一帧 RGBA；未开流时返回 false，宿主可据此暂停采集
    #[frb(sync)]
    pub fn push_frame(
        &self,
        width: u32,
        height: u32,
        rgba: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> bool {
        self.camera
            .push_frame(Frame::new(width, height, rgba, timestamp_ms, frame_number))
    }

    #[frb(sync, getter)]
    pub fn is_streaming(&self) -> bool {
        self.camera.is_streaming()
    }

    /// 立即抽一帧，返回是否真正发出了请求
    #[frb(sync)]
    pub fn capture_now(&self) -> bool {
        let Some(session) = self.current() else {
            return false;
        };
        let _guard = self.runtime.enter();
        matches!(session.capture_now(), SampleOutcome::Dispatched(_))
    }

    #[frb(sync)]
    pub fn set_threshold(&self, threshold: f32) {
        if let Some(session) = self.current() {
            session.set_threshold(threshold);
        }
    }

    #[frb(sync)]
    pub fn set_top_k(&self, top_k: u32) {
        if let Some(session) = self.current() {
            session.set_top_k(top_k);
        }
    }

    #[frb(sync)]
    pub fn snapshot(&self) -> LiveView {
        match self.current() {
            Some(session) => self.view_of(&session),
            None => LiveView {
                state: SessionState::Idle.label().to_string(),
                annotations: AnnotationView::project(&Default::default(), &self.style),
            },
        }
    }

    /// 等待下一次标注变化（最多 `timeout_ms`），供宿主的重绘循环使用
    #[frb(dart_async)]
    pub fn next_view(&self, timeout_ms: u64) -> LiveView {
        if let Some(session) = self.current() {
            let mut revisions = session.store().subscribe();
            self.runtime.block_on(async {
                let _ = tokio::time::timeout(Duration::from_millis(timeout_ms), revisions.changed()).await;
            });
        }
        self.snapshot()
    }

    fn view_of(&self, session: &LiveSession) -> LiveView {
        LiveView {
            state: session.state().label().to_string(),
            annotations: AnnotationView::project(&session.snapshot(), &self.style),
        }
    }
}

impl Drop for LiveCamera {
    fn drop(&mut self) {
        self.unmount();
        info!("🗑️ LiveCamera: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::testing::ScriptedService;

    fn live() -> (Arc<ScriptedService>, LiveCamera) {
        let service = Arc::new(ScriptedService::new());
        let camera = LiveCamera::with_service(service.clone(), SessionConfig::default())
            .expect("应该能创建运行时");
        (service, camera)
    }

    #[test]
    fn test_denied_mount_reports_permission_error() {
        let (service, camera) = live();
        camera.deny_permission("NotAllowedError".into());

        let err = camera.mount().unwrap_err();
        assert_eq!(err.error_type, "PermissionError");
        assert_eq!(err.message, "Unable to access camera.");

        let view = camera.snapshot();
        assert_eq!(view.state, "error");
        assert_eq!(view.annotations.error.as_deref(), Some("Unable to access camera."));
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_mount_streams_and_unmount_releases() {
        let (service, camera) = live();
        camera.grant_permission();
        assert!(!camera.push_frame(4, 4, vec![0; 64], 0, 0));

        let camera = Arc::new(camera);
        let pusher = {
            let camera = camera.clone();
            std::thread::spawn(move || {
                for n in 0..200 {
                    if camera.push_frame(8, 6, vec![200; 8 * 6 * 4], n * 33, n) {
                        return true;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                false
            })
        };

        let view = camera.mount().expect("应该开始推流");
        assert!(pusher.join().unwrap());
        assert_eq!(view.state, "streaming");
        assert_eq!((view.annotations.width, view.annotations.height), (8, 6));

        assert!(camera.capture_now());
        let view = camera.next_view(2_000);
        assert!(view.annotations.revision > 0);
        assert!(service.calls() >= 1);

        camera.unmount();
        assert!(!camera.is_streaming());
        assert_eq!(camera.snapshot().state, "idle");
        assert!(!camera.capture_now());
    }
}
