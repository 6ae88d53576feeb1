pub mod directory;
pub mod error;
pub mod live;
pub mod models;
pub mod photo;
