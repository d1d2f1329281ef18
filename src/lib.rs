//! shiplane - build, test, package, and deploy lane for Xcode projects
//!
//! This crate implements shiplane, a stage orchestrator that drives the
//! Xcode command-line toolchain through a product's lifecycle: build,
//! test, clean, sign, package, and deploy. External tools are invoked
//! through a narrow seam with streamed line output, signing credentials
//! are held in scoped resources, and deployment methods dispatch through
//! a static registry.

pub mod config;
pub mod deploy;
pub mod invoke;
pub mod lane;
pub mod mock;
pub mod parse;
pub mod scope;

pub use config::{ConfigError, LaneConfig};
pub use deploy::{DeployBackend, DeployContext, DeployError, DeployEvent};
pub use invoke::{InvokeError, Invocation, SystemInvoker, ToolInvoker};
pub use lane::{BuildOptions, Lane, LaneError, OutputMode, RawOutputOptions, TestOptions};
pub use parse::{BuildLogParser, TestLogParser, TestReport};
