//! 标注仓库：渲染的唯一数据源

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::watch;

use crate::api::models::pipeline::{FaceAnnotation, PipelineResult};
use crate::core::capture::frame::Dimensions;

/// 派发序号，发送时单调递增分配，从 1 开始
pub type Sequence = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// 序号落后于已应用的结果，被丢弃
    Stale,
}

/// 某一时刻的只读快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub result: Option<Arc<PipelineResult>>,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
    pub dimensions: Dimensions,
    /// 已应用结果的最高序号
    pub applied_seq: Sequence,
    pub revision: u64,
}

impl StoreSnapshot {
    pub fn faces(&self) -> &[FaceAnnotation] {
        self.result
            .as_deref()
            .map(|r| r.faces.as_slice())
            .unwrap_or(&[])
    }
}

pub struct AnnotationStore {
    state: Mutex<StoreSnapshot>,
    revision: watch::Sender<u64>,
    applied: AtomicU64,
    discarded: AtomicU64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(StoreSnapshot::default()),
            revision,
            applied: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut StoreSnapshot) {
        state.revision += 1;
        self.revision.send_replace(state.revision);
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().clone()
    }

    /// 订阅版本号变化，渲染端收到后重新取快照
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// 应用一次推理结果；同时清除错误。`measured_ms` 在服务端没给 total 时作为延迟展示。
    pub fn apply_result(&self, seq: Sequence, result: PipelineResult, measured_ms: f64) -> ApplyOutcome {
        let mut state = self.lock();
        if seq < state.applied_seq {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "🗑️ AnnotationStore: discarding stale result #{} (applied #{})",
                seq, state.applied_seq
            );
            return ApplyOutcome::Stale;
        }

        state.latency_ms = Some(result.total_ms().unwrap_or(measured_ms));
        state.result = Some(Arc::new(result));
        state.error = None;
        state.applied_seq = seq;
        self.publish(&mut state);
        self.applied.fetch_add(1, Ordering::Relaxed);
        ApplyOutcome::Applied
    }

    /// 派发失败：只记录错误，保留上一次成功的标注
    pub fn apply_error(&self, seq: Sequence, message: impl Into<String>) -> ApplyOutcome {
        let mut state = self.lock();
        if seq < state.applied_seq {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return ApplyOutcome::Stale;
        }
        state.error = Some(message.into());
        self.publish(&mut state);
        ApplyOutcome::Applied
    }

    /// 会话级错误（权限、设备），不受序号约束
    pub fn set_error(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.error = Some(message.into());
        self.publish(&mut state);
    }

    /// 返回尺寸是否发生变化
    pub fn set_dimensions(&self, dimensions: Dimensions) -> bool {
        let mut state = self.lock();
        if state.dimensions == dimensions {
            return false;
        }
        state.dimensions = dimensions;
        self.publish(&mut state);
        true
    }

    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}
