//! # Kozane Core
//!
//! Fundamental building blocks shared by the Kozane array engine:
//! - Error types
//! - Configuration
//! - Vector clocks
//! - Metrics
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   kozane-core                   │
//! ├─────────────────────────────────────────────────┤
//! │  • error      - Error handling                  │
//! │  • config     - Array configuration             │
//! │  • clock      - Vector clock value object       │
//! │  • metrics    - Engine counters                 │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use clock::{Clock, Occurred};
pub use config::ArrayConfig;
pub use error::{Error, Result};
pub use metrics::Metrics;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
