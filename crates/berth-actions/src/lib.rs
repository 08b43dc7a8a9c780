//! Berth Action Pipeline Engine
//!
//! Ordered, failure-aware pipelines of named actions. Each action has a
//! forward step and an optional backward step. When a forward step fails,
//! every stage that already completed is undone in reverse order before the
//! error is returned.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Pipeline<A>                   │
//! │  ┌─────────────────────────────────┐    │
//! │  │  stage 1 → stage 2 → stage 3    │    │
//! │  │  (forward, shared args: &A)     │    │
//! │  └─────────────────────────────────┘    │
//! │                  │ failure at k          │
//! │                  ▼                       │
//! │  ┌─────────────────────────────────┐    │
//! │  │  backward k-1 → ... → 1         │    │
//! │  │  - Collect undo failures        │    │
//! │  │  - Report progress              │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use berth_actions::{Pipeline, NoopAction};
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::new(vec![Arc::new(NoopAction::new("prepare"))]);
//! let result = pipeline.execute(&args).await?;
//! ```

pub mod context;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod traits;

pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use progress::*;
pub use traits::*;
