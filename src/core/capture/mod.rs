pub mod device;
pub mod frame;
pub mod lifecycle;
pub mod sampler;

pub use device::{
    CameraDevice, FacingMode, FrameSlot, HostCamera, MediaStream, MediaTrack, SurfaceState, VideoSurface,
};
pub use frame::{Dimensions, Frame};
pub use lifecycle::StreamLifecycle;
pub use sampler::{FrameSampler, SampleOutcome};
