#![forbid(unsafe_code)]

//! Reactive state nodes and the lenses that derive them from one another.
//!
//! - [`StateNode`]: a cached value with a change stream, a write path and
//!   reference-counted downstream connection.
//! - [`SubDownstream`] / [`SubUpstream`]: adapters binding a derived node
//!   to one key of its parent.
//! - [`state`]: a root node looped back through its own
//!   [`ConnectionGuard`](crate::stream::ConnectionGuard).
//!
//! # Example
//!
//! ```
//! use lenstate::{Value, state};
//!
//! let root = state(Value::object([("x", Value::from(1)), ("y", Value::from(2))]));
//! let x = root.sub("x");
//! x.set(Value::from(10));
//!
//! assert_eq!(x.get(), Some(Value::from(10)));
//! assert_eq!(
//!     root.get(),
//!     Some(Value::object([("x", Value::from(10)), ("y", Value::from(2))]))
//! );
//! ```

pub mod lens;
mod node;

pub use lens::{SubDownstream, SubUpstream};
pub use node::{StateNode, make_state, state};
