//! Operator front end for the memory manager, driving a simulated target whose memory is
//! persisted between invocations.

pub mod config;
pub mod image;
pub mod logging;
pub mod parse;
pub mod session;

pub use config::{CliConfig, RegionConfig, RegionKind};
pub use image::TargetImage;
pub use logging::log_filter;
pub use session::Session;
