//! # LAZYSCOPE CORE LIBRARY
//!
//! **TYPE-KEYED, SCOPED DEPENDENCY RESOLUTION**
//!
//! **ARCHITECTURE**: Per-thread stacks of scope nodes anchored to one app-root
//! **GUARANTEE**: A value is created at most once per scope and found by
//! walking the active parent chain
//!
//! ```
//! use lazyscope::api::*;
//!
//! #[derive(Default)]
//! struct Config {
//!     retries: u32,
//! }
//!
//! let scope = ScopeNode::builder().detached().seed(Config { retries: 3 }).build()?;
//! let guard = scope.enter()?;
//! assert_eq!(current_scope().get::<Config>()?.retries, 3);
//! guard.exit()?;
//! # Ok::<(), ScopeError>(())
//! ```

pub mod api;
pub mod dependencies;
pub mod errors;
pub mod scope;
pub mod testing;
pub mod types;
