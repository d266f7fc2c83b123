//! Type system utilities and aliases.
//!
//! - [`aliases`]: Type alias for `Arc<RwLock<HashMap>>`.

pub mod aliases;

pub use aliases::*;
