//! Runtime initialization and lifecycle management.
//!
//! Wires the configuration into a [`ClientSet`](crate::upstream::ClientSet), a
//! [`RequestManager`](crate::orchestrator::RequestManager) and an optional background
//! health monitor, and coordinates their shutdown over a broadcast channel.
//!
//! # Examples
//!
//! ```no_run
//! use conduit_core::{config::AppConfig, runtime::ConduitRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = ConduitRuntime::builder()
//!         .with_config(config)
//!         .enable_health_monitor()
//!         .build()?;
//!
//!     let manager = runtime.request_manager();
//!     // ... serve reads through `manager.execute(..)` ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod lifecycle;

pub use builder::{ConduitRuntimeBuilder, RuntimeError};
pub use lifecycle::ConduitRuntime;
