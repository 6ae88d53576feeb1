//! 推理派发器
//!
//! 每次派发在发送时分配单调递增的序号；结果回来时交给仓库按序号丢弃过期结果。
//! 在途请求数量有上限，超限时由调用方丢弃新样本。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::api::models::pipeline::PipelineResult;
use crate::core::client::{InferenceRequest, InferenceService};
use crate::core::error::ClientError;
use crate::core::pipeline::store::{AnnotationStore, ApplyOutcome, Sequence};

/// 在途名额，drop 时归还
pub struct InFlightPermit {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct InferenceDispatcher {
    service: Arc<dyn InferenceService>,
    timeout: Duration,
    max_in_flight: usize,
    next_seq: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

impl InferenceDispatcher {
    pub fn new(service: Arc<dyn InferenceService>, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            service,
            timeout,
            max_in_flight: max_in_flight.max(1),
            next_seq: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 申请在途名额，已满时返回 None
    pub fn try_reserve(&self) -> Option<InFlightPermit> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max_in_flight {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(InFlightPermit {
                        counter: self.in_flight.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn next_sequence(&self) -> Sequence {
        self.next_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 发出即返回（定时抽帧用）。结果只通过弱引用写回仓库，视图销毁后直接丢弃。
    pub fn dispatch(
        &self,
        permit: InFlightPermit,
        request: InferenceRequest,
        store: &Arc<AnnotationStore>,
    ) -> Sequence {
        let seq = self.next_sequence();
        let service = self.service.clone();
        let timeout = self.timeout;
        let store = Arc::downgrade(store);

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = execute(service.as_ref(), timeout, seq, &request).await;
            settle(&store, seq, outcome);
        });
        seq
    }

    /// 等待结果（照片上传用），失败时同样写入仓库并返回错误
    pub async fn dispatch_and_wait(
        &self,
        request: InferenceRequest,
        store: &Arc<AnnotationStore>,
    ) -> Result<ApplyOutcome, ClientError> {
        let seq = self.next_sequence();
        match execute(self.service.as_ref(), self.timeout, seq, &request).await {
            Ok((result, measured_ms)) => Ok(store.apply_result(seq, result, measured_ms)),
            Err(e) => {
                store.apply_error(seq, e.user_message());
                Err(e)
            }
        }
    }
}

async fn execute(
    service: &dyn InferenceService,
    timeout: Duration,
    seq: Sequence,
    request: &InferenceRequest,
) -> Result<(PipelineResult, f64), ClientError> {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, service.run_pipeline(request)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Network(format!(
            "request timed out after {}ms",
            timeout.as_millis()
        ))),
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(result) => {
            debug!(
                "✅ dispatch #{}: {} face(s) in {:.0}ms",
                seq,
                result.faces.len(),
                elapsed_ms
            );
            Ok((result, elapsed_ms))
        }
        Err(e) => {
            warn!("❌ dispatch #{} failed after {:.0}ms: {}", seq, elapsed_ms, e);
            Err(e)
        }
    }
}

fn settle(
    store: &Weak<AnnotationStore>,
    seq: Sequence,
    outcome: Result<(PipelineResult, f64), ClientError>,
) {
    let Some(store) = store.upgrade() else {
        debug!("🗑️ dispatch #{}: view gone, result dropped", seq);
        return;
    };
    match outcome {
        Ok((result, measured_ms)) => {
            store.apply_result(seq, result, measured_ms);
        }
        Err(e) => {
            store.apply_error(seq, e.user_message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::testing::{request, result_marked, Reply, ScriptedService};

    fn setup(max_in_flight: usize) -> (Arc<ScriptedService>, InferenceDispatcher, Arc<AnnotationStore>) {
        let service = Arc::new(ScriptedService::new());
        let dispatcher =
            InferenceDispatcher::new(service.clone(), Duration::from_secs(15), max_in_flight);
        (service, dispatcher, Arc::new(AnnotationStore::new()))
    }

    fn send(dispatcher: &InferenceDispatcher, store: &Arc<AnnotationStore>, key: &str) -> Sequence {
        let permit = dispatcher.try_reserve().expect("应该有名额");
        dispatcher.dispatch(permit, request(key), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion_keeps_newest() {
        let (service, dispatcher, store) = setup(8);
        for n in 1..=3 {
            service.script(
                &format!("frame-{}", n),
                Duration::from_millis(10),
                Reply::Ok(result_marked(n as f64, vec![])),
            );
        }
        service.script("frame-4", Duration::from_millis(300), Reply::Ok(result_marked(4.0, vec![])));
        service.script("frame-5", Duration::from_millis(100), Reply::Ok(result_marked(5.0, vec![])));

        for n in 1..=5 {
            assert_eq!(send(&dispatcher, &store, &format!("frame-{}", n)), n);
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        let snap = store.snapshot();
        assert_eq!(snap.applied_seq, 5);
        assert_eq!(snap.latency_ms, Some(5.0));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snap = store.snapshot();
        assert_eq!(snap.applied_seq, 5);
        assert_eq!(snap.latency_ms, Some(5.0));
        assert_eq!(store.discarded_count(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_block_next_dispatch() {
        let (service, dispatcher, store) = setup(4);
        service.script("stuck", Duration::from_secs(60), Reply::Ok(result_marked(1.0, vec![])));
        service.script("next", Duration::from_millis(40), Reply::Ok(result_marked(2.0, vec![])));

        send(&dispatcher, &store, "stuck");
        tokio::time::sleep(Duration::from_millis(250)).await;
        send(&dispatcher, &store, "next");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.snapshot().applied_seq, 2);
        assert_eq!(service.calls(), 2);

        tokio::time::sleep(Duration::from_secs(16)).await;
        let snap = store.snapshot();
        // 超时的 #1 比已应用的 #2 旧，错误也被丢弃
        assert!(snap.error.is_none());
        assert_eq!(snap.applied_seq, 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_network_error() {
        let (service, dispatcher, store) = setup(4);
        service.script("stuck", Duration::from_secs(60), Reply::Ok(result_marked(1.0, vec![])));

        let result = dispatcher.dispatch_and_wait(request("stuck"), &store).await;
        assert!(matches!(result, Err(ClientError::Network(_))));
        assert!(store.snapshot().error.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_surface_without_clearing_overlay() {
        let (service, dispatcher, store) = setup(4);
        service.script("ok", Duration::ZERO, Reply::Ok(result_marked(3.0, vec![])));
        service.script("bad-json", Duration::ZERO, Reply::Validation);
        service.script("boom", Duration::ZERO, Reply::Server(500));

        dispatcher.dispatch_and_wait(request("ok"), &store).await.unwrap();
        let kept = store.snapshot().result;

        let err = dispatcher.dispatch_and_wait(request("bad-json"), &store).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        let err = dispatcher.dispatch_and_wait(request("boom"), &store).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));

        let snap = store.snapshot();
        assert_eq!(snap.result, kept);
        assert!(snap.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_after_teardown_are_ignored() {
        let (service, dispatcher, store) = setup(4);
        service.script("slow", Duration::from_secs(1), Reply::Ok(result_marked(1.0, vec![])));

        send(&dispatcher, &store, "slow");
        drop(store);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(service.calls(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_respects_cap() {
        let (_service, dispatcher, _store) = setup(2);
        let a = dispatcher.try_reserve();
        let b = dispatcher.try_reserve();
        assert!(a.is_some() && b.is_some());
        assert!(dispatcher.try_reserve().is_none());

        drop(a);
        assert!(dispatcher.try_reserve().is_some());
    }
}
