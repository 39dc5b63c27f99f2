//! Fixtures and assertions for testing profiling runs.
//!
//! - **Fixtures**: [`toy_input`], [`generate_rows`], [`generate_input`]
//! - **Assertions**: [`assert_aggregates_equal`] compares two results,
//!   allowing for floating-point noise in the averages.
//!
//! ```
//! use colprofile::testing::*;
//! use colprofile::{ExecMode, ProfileConfig, Profiler};
//!
//! # fn main() -> colprofile::Result<()> {
//! let input = generate_input(500, 4, Some(7));
//! let cfg = ProfileConfig::default().with_batch_size(16);
//! let seq = Profiler::new(cfg.clone())
//!     .with_mode(ExecMode::Sequential)
//!     .profile_reader(input.as_bytes())?;
//! let par = Profiler::new(cfg).profile_reader(input.as_bytes())?;
//! assert_aggregates_equal(&par, &seq);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
