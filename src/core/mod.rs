pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;

pub use config::{ClientConfig, PipelineParams, SessionConfig};
pub use error::{ClientError, ErrorKind};
