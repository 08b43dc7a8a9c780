//! The berth agent
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Service                      │
//! │  open: subscribe → provisioner → bootstrap    │
//! │                  │                            │
//! │                  ▼                            │
//! │  ┌────────────────────────────────────┐       │
//! │  │  Dispatcher (receive loop)         │       │
//! │  │  decode → convert → Handler task   │       │
//! │  │  bounded by max_concurrent_deploys │       │
//! │  └────────────────────────────────────┘       │
//! │                  │                            │
//! │                  ▼                            │
//! │       Provisioner::deploy (pipeline)          │
//! └──────────────────────────────────────────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod filelog;
pub mod handler;
pub mod httpd;
pub mod service;

pub use config::{AgentConfig, AgentSection, HttpConfig, MetaConfig};
pub use error::{ConfigError, Result, ServiceError};
pub use filelog::{BoxLogSink, FileLogNotifier};
pub use handler::Handler;
pub use httpd::HttpService;
pub use service::{Service, LEADER_WAIT_TIMEOUT};
