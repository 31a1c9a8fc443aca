//! Configuration system — schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use valet_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Followup window: {}s", cfg.session.followup_window_command_s);
//! ```

pub mod loader;
pub mod schema;

// Re-export key types
pub use loader::{get_config_path, load_config, save_config};
pub use schema::Config;
