//! 媒体流生命周期：唯一可以停止轨道的地方

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::{info, warn};

use crate::core::capture::device::{MediaStream, VideoSurface};

/// 持有当前会话的媒体流。无论初始化走到哪一步，`release` / `Drop` 都会把已拿到的
/// 轨道恰好停止一次。
pub struct StreamLifecycle {
    stream: Option<MediaStream>,
    released_tracks: usize,
}

impl StreamLifecycle {
    pub fn new() -> Self {
        Self {
            stream: None,
            released_tracks: 0,
        }
    }

    /// 绑定新流；旧流先释放
    pub fn bind(&mut self, stream: MediaStream) -> Arc<dyn VideoSurface> {
        if self.stream.is_some() {
            warn!("⚠️ StreamLifecycle: rebinding, releasing previous stream");
            self.release();
        }
        let surface = stream.surface.clone();
        info!(
            "🔗 StreamLifecycle: bound stream with {} track(s)",
            stream.tracks.len()
        );
        self.stream = Some(stream);
        surface
    }

    pub fn surface(&self) -> Option<Arc<dyn VideoSurface>> {
        self.stream.as_ref().map(|s| s.surface.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.stream.is_some()
    }

    /// 累计释放的轨道数
    pub fn released_tracks(&self) -> usize {
        self.released_tracks
    }

    /// 停止所有轨道，返回本次停止的数量。不会 panic。
    pub fn release(&mut self) -> usize {
        let Some(mut stream) = self.stream.take() else {
            return 0;
        };

        let mut stopped = 0;
        for track in stream.tracks.iter_mut() {
            let label = track.label().to_string();
            match catch_unwind(AssertUnwindSafe(|| track.stop())) {
                Ok(()) => stopped += 1,
                Err(_) => warn!("⚠️ StreamLifecycle: track {} panicked on stop", label),
            }
        }
        self.released_tracks += stopped;
        info!("🗑️ StreamLifecycle: released {} track(s)", stopped);
        stopped
    }
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamLifecycle {
    fn drop(&mut self) {
        self.release();
    }
}
