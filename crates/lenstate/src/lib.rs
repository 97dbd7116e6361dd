#![forbid(unsafe_code)]

//! Lens-addressable reactive state.
//!
//! A [`StateNode`] caches one value and speaks a small synchronous
//! Open / Emit / Close [stream protocol](stream). Writes are sent upstream as
//! [`Change`]s, echoed back downstream, refined by the [tracer](trace) and
//! broadcast to subscribers. [`StateNode::sub`] derives a node bound to one
//! key of its parent: it only hears about changes under that key, and its
//! writes are merged into the parent's value without clobbering siblings.
//!
//! Everything is single-threaded (`Rc`, `RefCell`). Every message is a
//! plain function call that returns after all of its effects, re-entrant
//! ones included, have completed.

pub mod error;
pub mod state;
pub mod stream;
pub mod trace;
pub mod value;

pub use error::Reason;
pub use state::{StateNode, SubDownstream, SubUpstream, make_state, state};
pub use stream::{
    ConnectionGuard, Downstream, Message, Sink, SinkRef, Source, SourceRef, Talkback, Upstream,
};
pub use trace::{Change, Trace, change, post_trace, trace};
pub use value::{Key, Traceable, Value};
