//! 采集 → 派发 → 仓库 的主流程
//!
//! 结果可能乱序返回，只靠派发序号保证"旧结果不覆盖新结果"。

pub mod dispatcher;
pub mod photo;
pub mod session;
pub mod state_machine;
pub mod store;

pub use dispatcher::InferenceDispatcher;
pub use photo::{PhotoAnalysis, PhotoSession};
pub use session::LiveSession;
pub use state_machine::{SessionAction, SessionEvent, SessionMachine, SessionState};
pub use store::{AnnotationStore, ApplyOutcome, Sequence, StoreSnapshot};
