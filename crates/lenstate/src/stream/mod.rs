#![forbid(unsafe_code)]

//! The Open / Emit / Close stream protocol.
//!
//! Every endpoint in the crate, and every collaborator that wants to talk to
//! it, speaks this protocol:
//!
//! 1. A consumer calls [`Source::open`] with its [`Sink`].
//! 2. The producer answers with [`Message::Open`], handing back a
//!    [`Talkback`] the consumer later uses to request `Close`.
//! 3. The producer pushes payloads with [`Message::Emit`].
//! 4. Either side ends the exchange for good with [`Message::Close`],
//!    optionally carrying a [`Reason`].
//!
//! Messages are ordinary synchronous calls. There is no buffering and no
//! scheduler: a call returns only after all of its effects, including
//! re-entrant ones, have completed.

pub mod broadcast;
pub mod guard;

use std::fmt;
use std::rc::Rc;

use crate::error::Reason;
use crate::trace::Change;

pub use broadcast::{RecipientId, Recipients, broadcast};
pub use guard::ConnectionGuard;

/// One protocol message.
#[derive(Debug, Clone)]
pub enum Message<T> {
    /// Producer greeting, carrying the consumer's way back.
    Open(Talkback),
    /// One payload.
    Emit(T),
    /// Permanent termination. `Some` marks an abnormal end.
    Close(Option<Reason>),
}

/// Consumer side of a stream.
pub trait Sink<T> {
    fn send(&self, message: Message<T>);
}

impl<T, F> Sink<T> for F
where
    F: Fn(Message<T>),
{
    fn send(&self, message: Message<T>) {
        self(message);
    }
}

/// Producer side of a stream.
pub trait Source<T> {
    /// Attach `sink`. The producer greets it with [`Message::Open`].
    fn open(&self, sink: SinkRef<T>);
}

impl<T, F> Source<T> for F
where
    F: Fn(SinkRef<T>),
{
    fn open(&self, sink: SinkRef<T>) {
        self(sink);
    }
}

pub type SinkRef<T> = Rc<dyn Sink<T>>;
pub type SourceRef<T> = Rc<dyn Source<T>>;

/// Read side of a state node: a source of [`Change`]s.
pub type Downstream<T> = SourceRef<Change<T>>;

/// Write side of a state node: a sink of [`Change`]s.
pub type Upstream<T> = SinkRef<Change<T>>;

/// Wrap a closure as a shared sink.
pub fn sink<T: 'static>(f: impl Fn(Message<T>) + 'static) -> SinkRef<T> {
    Rc::new(f)
}

/// Wrap a closure as a shared source.
pub fn source<T: 'static>(f: impl Fn(SinkRef<T>) + 'static) -> SourceRef<T> {
    Rc::new(f)
}

/// Handle a producer gives its consumer on `Open`.
///
/// Cloning shares the same handle. Whether closing twice is harmless is up
/// to the producer; every producer in this crate treats it as a no-op.
#[derive(Clone)]
pub struct Talkback(Rc<dyn Fn(Option<Reason>)>);

impl Talkback {
    pub fn new(close: impl Fn(Option<Reason>) + 'static) -> Self {
        Self(Rc::new(close))
    }

    /// Talkback for producers that have nothing to release.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Ask the producer to stop.
    pub fn close(&self, reason: Option<Reason>) {
        (self.0)(reason);
    }
}

impl fmt::Debug for Talkback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Talkback")
    }
}
