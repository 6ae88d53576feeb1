//! 定时抽帧：按固定间隔截取视频表面、压缩 JPEG、交给派发器。
//! 不等待上一次请求完成，并发上限由派发器负责。

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::capture::device::VideoSurface;
use crate::core::capture::frame::to_data_url;
use crate::core::client::{ImagePayload, InferenceRequest};
use crate::core::config::{PipelineParams, SessionConfig};
use crate::core::pipeline::dispatcher::InferenceDispatcher;
use crate::core::pipeline::store::{AnnotationStore, Sequence};

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// 表面还没有尺寸
    NotReady,
    /// 在途请求已达上限
    Throttled,
    Dispatched(Sequence),
    Dropped(String),
    DeviceLost(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerExit {
    Cancelled,
    DeviceLost(String),
}

/// 一次抽帧需要的全部协作者
#[derive(Clone)]
pub struct SamplerContext {
    pub surface: Arc<dyn VideoSurface>,
    pub dispatcher: Arc<InferenceDispatcher>,
    pub store: Arc<AnnotationStore>,
    pub params: watch::Receiver<PipelineParams>,
}

#[derive(Debug, Clone)]
pub struct FrameSampler {
    interval: Duration,
    jpeg_quality: u8,
}

impl FrameSampler {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            interval: config.interval,
            jpeg_quality: config.jpeg_quality,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 单次抽帧（定时器和"立即拍摄"共用）
    pub fn tick(&self, ctx: &SamplerContext) -> SampleOutcome {
        if let Some(reason) = ctx.surface.ended() {
            return SampleOutcome::DeviceLost(reason);
        }
        if ctx.surface.dimensions().is_empty() {
            return SampleOutcome::NotReady;
        }

        let Some(permit) = ctx.dispatcher.try_reserve() else {
            debug!(
                "⏳ FrameSampler: {} request(s) in flight, skipping tick",
                ctx.dispatcher.in_flight()
            );
            return SampleOutcome::Throttled;
        };

        let frame = match ctx.surface.capture() {
            Some(frame) if !frame.dimensions().is_empty() => frame,
            _ => return SampleOutcome::NotReady,
        };

        // 会话另有任务跟随表面尺寸；单独使用抽帧器时由这里兜底
        ctx.store.set_dimensions(frame.dimensions());

        let jpeg = match frame.encode_jpeg(self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("⚠️ FrameSampler: encode failed: {}", e);
                return SampleOutcome::Dropped(e.to_string());
            }
        };

        let request = InferenceRequest {
            image: ImagePayload::DataUrl(to_data_url("image/jpeg", &jpeg)),
            params: *ctx.params.borrow(),
        };
        let seq = ctx.dispatcher.dispatch(permit, request, &ctx.store);
        debug!(
            "📤 FrameSampler: frame #{} ({} bytes) dispatched as #{}",
            frame.frame_number,
            jpeg.len(),
            seq
        );
        SampleOutcome::Dispatched(seq)
    }

    /// 启动定时器任务。`shutdown` 置为 true 后不再触发任何 tick。
    pub fn spawn(
        self,
        ctx: SamplerContext,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<SamplerExit> {
        tokio::spawn(async move { self.run(ctx, shutdown).await })
    }

    async fn run(self, ctx: SamplerContext, mut shutdown: watch::Receiver<bool>) -> SamplerExit {
        info!(
            "⏱️ FrameSampler: started, interval {}ms",
            self.interval.as_millis()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("⏹️ FrameSampler: cancelled");
                        return SamplerExit::Cancelled;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            // 持有读锁跑完整个 tick，停止方的写入会等当前 tick 结束
            let outcome = {
                let stopped = shutdown.borrow();
                if *stopped {
                    None
                } else {
                    Some(self.tick(&ctx))
                }
            };

            match outcome {
                None => {
                    info!("⏹️ FrameSampler: cancelled");
                    return SamplerExit::Cancelled;
                }
                Some(SampleOutcome::DeviceLost(reason)) => {
                    warn!("⚠️ FrameSampler: device lost, stopping ({})", reason);
                    return SamplerExit::DeviceLost(reason);
                }
                Some(_) => {}
            }
        }
    }
}
