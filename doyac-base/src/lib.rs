//! # doyac-base
//!
//! Shared, structural atoms for the doyac workspace: string interning and
//! spanned errors. This crate has no knowledge of terms, protocols or
//! search — it provides only generic infrastructure the higher-level
//! crates build on.
//!
//! # Example
//!
//! ```
//! use doyac_base::{Interner, Span};
//!
//! let mut interner = Interner::new();
//! let alice = interner.intern("Alice");
//! let span = Span::new(0, 5);
//! assert_eq!(interner.resolve(alice), "Alice");
//! assert_eq!(span.start, 0);
//! ```

pub mod error;
pub mod intern;
pub mod span;

pub use error::{Result, SpannedError};
pub use intern::{Interner, Symbol};
pub use span::Span;
