//! Message-recording sink.

use std::cell::RefCell;
use std::rc::Rc;

use lenstate::Reason;
use lenstate::stream::{Message, SinkRef, Talkback};

/// One recorded message, minus the talkback.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Open,
    Emit(T),
    Close(Option<Reason>),
}

struct Log<T> {
    events: Vec<Event<T>>,
    talkback: Option<Talkback>,
}

/// Sink that records everything it is sent.
///
/// Cloning shares the same log.
pub struct Recorder<T> {
    log: Rc<RefCell<Log<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: Rc::clone(&self.log),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            log: Rc::new(RefCell::new(Log {
                events: Vec::new(),
                talkback: None,
            })),
        }
    }
}

impl<T: Clone + 'static> Recorder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink appending to this recorder.
    #[must_use]
    pub fn sink(&self) -> SinkRef<T> {
        let log = Rc::clone(&self.log);
        Rc::new(move |message: Message<T>| {
            let mut log = log.borrow_mut();
            match message {
                Message::Open(talkback) => {
                    log.talkback = Some(talkback);
                    log.events.push(Event::Open);
                }
                Message::Emit(value) => log.events.push(Event::Emit(value)),
                Message::Close(reason) => log.events.push(Event::Close(reason)),
            }
        })
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event<T>> {
        self.log.borrow().events.clone()
    }

    /// Emitted payloads, in order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.log
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Emit(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Most recent payload.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.values().pop()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_reason().is_some()
    }

    /// `Some(reason)` once a `Close` has been recorded.
    #[must_use]
    pub fn close_reason(&self) -> Option<Option<Reason>> {
        self.log.borrow().events.iter().find_map(|event| match event {
            Event::Close(reason) => Some(reason.clone()),
            _ => None,
        })
    }

    /// Forget everything recorded so far, keeping the talkback.
    pub fn reset(&self) {
        self.log.borrow_mut().events.clear();
    }

    /// Ask the producer to stop. Safe to call repeatedly; every call is
    /// forwarded so producers can be checked for idempotence.
    pub fn hang_up(&self) {
        let talkback = self.log.borrow().talkback.clone();
        if let Some(talkback) = talkback {
            talkback.close(None);
        }
    }
}
