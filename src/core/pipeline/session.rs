//! 实时摄像头会话
//!
//! 把生命周期、抽帧、派发、仓库串起来，并由状态机约束各阶段：
//! Idle → Acquiring → Streaming → (Error | Stopped)。
//! 一个会话只对应一次挂载，重新挂载请新建会话。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::core::capture::device::{CameraDevice, FacingMode, MediaStream, SurfaceState, VideoSurface};
use crate::core::capture::frame::Dimensions;
use crate::core::capture::lifecycle::StreamLifecycle;
use crate::core::capture::sampler::{FrameSampler, SampleOutcome, SamplerContext, SamplerExit};
use crate::core::client::InferenceService;
use crate::core::config::{PipelineParams, SessionConfig};
use crate::core::error::ClientError;
use crate::core::pipeline::dispatcher::InferenceDispatcher;
use crate::core::pipeline::state_machine::{SessionAction, SessionEvent, SessionMachine, SessionState};
use crate::core::pipeline::store::{AnnotationStore, StoreSnapshot};

pub struct LiveSession {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    camera: Arc<dyn CameraDevice>,
    dispatcher: Arc<InferenceDispatcher>,
    store: Arc<AnnotationStore>,
    sampler: FrameSampler,
    facing: FacingMode,
    machine: Mutex<SessionMachine>,
    lifecycle: Mutex<StreamLifecycle>,
    tasks: Mutex<Vec<AbortHandle>>,
    shutdown: watch::Sender<bool>,
    params: watch::Sender<PipelineParams>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn until_stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl LiveSession {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        service: Arc<dyn InferenceService>,
        config: SessionConfig,
    ) -> Self {
        let dispatcher = Arc::new(InferenceDispatcher::new(
            service,
            config.request_timeout,
            config.max_in_flight,
        ));
        let (shutdown, _) = watch::channel(false);
        let (params, _) = watch::channel(config.params.clamped());

        Self {
            shared: Arc::new(SessionShared {
                camera,
                dispatcher,
                store: Arc::new(AnnotationStore::new()),
                sampler: FrameSampler::new(&config),
                facing: FacingMode::User,
                machine: Mutex::new(SessionMachine::new()),
                lifecycle: Mutex::new(StreamLifecycle::new()),
                tasks: Mutex::new(Vec::new()),
                shutdown,
                params,
            }),
        }
    }

    /// 申请摄像头并开始抽帧，返回视频原始尺寸
    pub async fn start(&self) -> Result<Dimensions, ClientError> {
        let shared = &self.shared;
        let action = lock(&shared.machine).apply(SessionEvent::Activate);
        if action != SessionAction::AcquireCamera {
            return Err(ClientError::InvalidState {
                state: self.state().label().to_string(),
                action: "start",
            });
        }

        info!("🎬 LiveSession: acquiring {:?} camera", shared.facing);
        let acquired = tokio::select! {
            biased;
            _ = until_stopped(shared.shutdown.subscribe()) => Err(ClientError::Cancelled),
            stream = shared.camera.acquire(shared.facing) => stream,
        };
        let stream = match acquired {
            Ok(stream) => stream,
            Err(e) => return Err(shared.fail(e)),
        };

        let surface = shared.bind(stream)?;
        let surface_state = surface.subscribe();

        let playback = tokio::select! {
            biased;
            _ = until_stopped(shared.shutdown.subscribe()) => Err(ClientError::Cancelled),
            dims = surface.wait_for_playback() => dims,
        };
        let dimensions = match playback {
            Ok(dims) => dims,
            Err(e) => return Err(shared.fail(e)),
        };

        shared.store.set_dimensions(dimensions);
        let action = lock(&shared.machine).apply(SessionEvent::Acquired { dimensions });
        if action != SessionAction::StartSampler {
            return Err(ClientError::Cancelled);
        }

        let sampler = shared.sampler.clone().spawn(
            SamplerContext {
                surface,
                dispatcher: shared.dispatcher.clone(),
                store: shared.store.clone(),
                params: shared.params.subscribe(),
            },
            shared.shutdown.subscribe(),
        );
        let sampler_abort = sampler.abort_handle();
        let supervisor = tokio::spawn(supervise(
            Arc::downgrade(shared),
            sampler,
            shared.store.subscribe(),
            surface_state,
        ));
        lock(&shared.tasks).extend([sampler_abort, supervisor.abort_handle()]);

        info!(
            "✅ LiveSession: streaming {}x{}",
            dimensions.width, dimensions.height
        );
        Ok(dimensions)
    }

    /// 卸载：无论进行到哪一步都会释放轨道，可重复调用
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// 在定时器之外立即抽一帧
    pub fn capture_now(&self) -> SampleOutcome {
        let shared = &self.shared;
        if !lock(&shared.machine).current_state().is_streaming() {
            return SampleOutcome::NotReady;
        }
        let Some(surface) = lock(&shared.lifecycle).surface() else {
            return SampleOutcome::NotReady;
        };
        let ctx = SamplerContext {
            surface,
            dispatcher: shared.dispatcher.clone(),
            store: shared.store.clone(),
            params: shared.params.subscribe(),
        };
        shared.sampler.tick(&ctx)
    }

    pub fn set_params(&self, params: PipelineParams) {
        self.shared.params.send_replace(params.clamped());
    }

    pub fn set_threshold(&self, threshold: f32) {
        self.update_params(|p| p.threshold = Some(threshold));
    }

    pub fn set_top_k(&self, top_k: u32) {
        self.update_params(|p| p.top_k = Some(top_k));
    }

    fn update_params(&self, modify: impl FnOnce(&mut PipelineParams)) {
        self.shared.params.send_modify(|params| {
            modify(params);
            *params = params.clamped();
        });
    }

    pub fn params(&self) -> PipelineParams {
        *self.shared.params.borrow()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.machine).current_state().clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.shared.store.snapshot()
    }

    pub fn store(&self) -> Arc<AnnotationStore> {
        self.shared.store.clone()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl SessionShared {
    fn bind(&self, stream: MediaStream) -> Result<Arc<dyn VideoSurface>, ClientError> {
        let surface = lock(&self.lifecycle).bind(stream);
        // 绑定和卸载可能交错：卸载先改状态再释放，这里先绑定再检查状态
        if matches!(lock(&self.machine).current_state(), SessionState::Stopped) {
            lock(&self.lifecycle).release();
            return Err(ClientError::Cancelled);
        }
        Ok(surface)
    }

    fn stop(&self) {
        let action = lock(&self.machine).apply(SessionEvent::Deactivate);
        self.shutdown.send_replace(true);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        let released = lock(&self.lifecycle).release();
        if action == SessionAction::ReleaseStream {
            info!("⏹️ LiveSession: stopped, {} track(s) released", released);
        }
    }

    /// 终止型失败：进入 Error 并释放资源，返回原错误
    fn fail(&self, err: ClientError) -> ClientError {
        if matches!(err, ClientError::Cancelled) {
            return err;
        }
        let message = err.user_message();
        let action = lock(&self.machine).apply(SessionEvent::Failed {
            kind: err.kind(),
            message: message.clone(),
        });
        if action == SessionAction::ReleaseStream {
            warn!("❌ LiveSession: {}", err);
            self.store.set_error(message);
            self.shutdown.send_replace(true);
            lock(&self.lifecycle).release();
        }
        err
    }

    /// 媒体原始尺寸一变就写入仓库，不等下一次抽帧
    fn follow_surface(&self, dimensions: Dimensions) {
        if dimensions.is_empty() {
            return;
        }
        if self.store.set_dimensions(dimensions) {
            self.sync_dimensions();
        }
    }

    fn sync_dimensions(&self) {
        let dimensions = self.store.snapshot().dimensions;
        let action = lock(&self.machine).apply(SessionEvent::DimensionsChanged { dimensions });
        if action == SessionAction::ResizeOverlay {
            debug!(
                "📐 LiveSession: dimensions now {}x{}",
                dimensions.width, dimensions.height
            );
        }
    }
}

/// 盯住抽帧任务和视频表面：设备丢失时让会话进入 Error，
/// 表面尺寸变化时立即更新仓库并同步状态机
async fn supervise(
    session: Weak<SessionShared>,
    mut sampler: JoinHandle<SamplerExit>,
    mut revisions: watch::Receiver<u64>,
    mut surface: watch::Receiver<SurfaceState>,
) {
    let mut surface_open = true;
    loop {
        tokio::select! {
            exit = &mut sampler => {
                if let Ok(SamplerExit::DeviceLost(reason)) = exit {
                    if let Some(session) = session.upgrade() {
                        session.fail(ClientError::Device(reason));
                    }
                }
                return;
            }
            changed = surface.changed(), if surface_open => {
                if changed.is_err() {
                    surface_open = false;
                    continue;
                }
                let dimensions = surface.borrow_and_update().dimensions;
                match session.upgrade() {
                    Some(session) => session.follow_surface(dimensions),
                    None => return,
                }
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    return;
                }
                match session.upgrade() {
                    Some(session) => session.sync_dimensions(),
                    None => return,
                }
            }
        }
    }
}
