//! hostpack turns a module-based web app (a browser UI and a server API
//! module) into the four flat files a managed script host accepts.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use crate::core::{BuildReport, PipelineConfig, PipelineService, PipelineStage};
pub use crate::utils::{HostpackError, Result};
