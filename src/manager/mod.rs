//! Connection manager and its configuration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent builder for [`ConnectionManager`] |
//! | `core` | [`ConnectionManager`] lifecycle, rooms and events |
//! | `options` | [`ConnectionOptions`] and environment loading |

// ============================================================================
// Submodules
// ============================================================================

/// Manager builder.
pub mod builder;

/// Manager implementation.
pub mod core;

/// Connection options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionManagerBuilder;
pub use core::ConnectionManager;
pub use options::{ConnectionOptions, TransportKind};
