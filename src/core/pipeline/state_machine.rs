use crate::core::capture::frame::Dimensions;
use crate::core::error::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Streaming { dimensions: Dimensions },
    Error { kind: ErrorKind, message: String },
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Activate,
    Acquired { dimensions: Dimensions },
    DimensionsChanged { dimensions: Dimensions },
    Failed { kind: ErrorKind, message: String },
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    AcquireCamera,
    StartSampler,
    ResizeOverlay,
    /// 停止全部轨道；任何阶段收到 Deactivate 都会执行
    ReleaseStream,
    Ignore,
}

impl SessionState {
    pub fn transition(&self, event: &SessionEvent) -> (SessionState, SessionAction) {
        match (self, event) {
            (SessionState::Idle, SessionEvent::Activate) => {
                (SessionState::Acquiring, SessionAction::AcquireCamera)
            }

            (SessionState::Acquiring, SessionEvent::Acquired { dimensions }) => (
                SessionState::Streaming {
                    dimensions: *dimensions,
                },
                SessionAction::StartSampler,
            ),

            (SessionState::Streaming { dimensions: current }, SessionEvent::DimensionsChanged { dimensions }) => {
                if current == dimensions {
                    (self.clone(), SessionAction::Ignore)
                } else {
                    (
                        SessionState::Streaming {
                            dimensions: *dimensions,
                        },
                        SessionAction::ResizeOverlay,
                    )
                }
            }

            // 失败不重试，释放已拿到的资源
            (
                SessionState::Acquiring | SessionState::Streaming { .. },
                SessionEvent::Failed { kind, message },
            ) => (
                SessionState::Error {
                    kind: *kind,
                    message: message.clone(),
                },
                SessionAction::ReleaseStream,
            ),

            (SessionState::Stopped, _) => (SessionState::Stopped, SessionAction::Ignore),

            (_, SessionEvent::Deactivate) => (SessionState::Stopped, SessionAction::ReleaseStream),

            _ => (self.clone(), SessionAction::Ignore),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Streaming { .. } => "streaming",
            SessionState::Error { .. } => "error",
            SessionState::Stopped => "stopped",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming { .. })
    }
}

pub struct SessionMachine {
    state: SessionState,
    transitions: u64,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transitions: 0,
        }
    }

    pub fn apply(&mut self, event: SessionEvent) -> SessionAction {
        let (next, action) = self.state.transition(&event);
        if next != self.state {
            self.transitions += 1;
        }
        self.state = next;
        action
    }

    pub fn current_state(&self) -> &SessionState {
        &self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transitions
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
