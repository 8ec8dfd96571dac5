//! Terminal Farm daemon library
//!
//! This module provides the core components for the farm daemon:
//! - Control-plane fetcher
//! - Container runtime backends
//! - Instance launcher
//! - Reconciler and poll loop

pub mod config;
pub mod error;
pub mod fetcher;
pub mod launcher;
pub mod runtime;
pub mod scheduler;

pub use config::FarmConfig;
pub use error::{DaemonError, FetchError, RuntimeError};
pub use fetcher::{ConfigFetcher, HttpConfigFetcher};
pub use launcher::Launcher;
pub use runtime::{ContainerRuntime, DockerRuntime, InMemoryRuntime, TimedRuntime};
pub use scheduler::{Clock, CycleOutcome, PollLoop, Reconciler, TokioClock};
