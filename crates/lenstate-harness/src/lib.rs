#![forbid(unsafe_code)]

//! Stream collaborators for exercising `lenstate` from the outside.
//!
//! - [`Subject`]: a multicast source that is also a sink, for pushing values
//!   into nodes and fanning them out.
//! - [`subscribe`]: a terminal consumer returning an RAII [`Subscription`].
//! - [`Recorder`]: a sink that records every message it receives.
//! - [`Probe`]: a source wrapper counting connections.
//! - [`TraceCapture`]: a `tracing` layer recording emitted events.

pub mod capture;
pub mod probe;
pub mod recorder;
pub mod subject;
pub mod subscribe;

pub use capture::{CapturedEvent, TraceCapture};
pub use probe::Probe;
pub use recorder::{Event, Recorder};
pub use subject::Subject;
pub use subscribe::{Subscription, subscribe, subscribe_with};
