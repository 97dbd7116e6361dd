#![forbid(unsafe_code)]

//! Single-connection loop-back between a node's upstream and downstream.
//!
//! A [`ConnectionGuard`] is both a [`Source`] and a [`Sink`]. Whatever is
//! sent into it is forwarded to the one consumer currently attached, which
//! makes it the echo path of a root state node: writes go in through the
//! sink side and come straight back out of the source side.
//!
//! # Invariants
//!
//! 1. At most one consumer is attached at any time. A second `open` while
//!    one is attached is ignored.
//! 2. Closing through the talkback releases the slot so a later `open` can
//!    attach again.
//! 3. A talkback only releases the connection it was issued for. A stale
//!    talkback from an earlier connection is a no-op.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::{Message, Sink, SinkRef, Source, Talkback};

struct Slot<T> {
    generation: u64,
    attached: Option<(u64, SinkRef<T>)>,
}

/// Loop-back connection holding at most one consumer.
pub struct ConnectionGuard<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Default for ConnectionGuard<T> {
    fn default() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                generation: 0,
                attached: None,
            })),
        }
    }
}

impl<T> fmt::Debug for ConnectionGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("ConnectionGuard")
            .field("generation", &slot.generation)
            .field("open", &slot.attached.is_some())
            .finish()
    }
}

impl<T> ConnectionGuard<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a consumer is attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.borrow().attached.is_some()
    }

    fn current(&self) -> Option<SinkRef<T>> {
        self.slot
            .borrow()
            .attached
            .as_ref()
            .map(|(_, sink)| Rc::clone(sink))
    }
}

fn release<T>(slot: &Weak<RefCell<Slot<T>>>, generation: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let released = {
        let mut slot = slot.borrow_mut();
        let current = slot
            .attached
            .as_ref()
            .is_some_and(|(attached, _)| *attached == generation);
        if current { slot.attached.take() } else { None }
    };
    if released.is_some() {
        debug!(message = "guard.release", generation);
    }
}

impl<T: 'static> Source<T> for ConnectionGuard<T> {
    fn open(&self, sink: SinkRef<T>) {
        let generation = {
            let mut slot = self.slot.borrow_mut();
            if slot.attached.is_some() {
                trace!(message = "guard.busy", generation = slot.generation);
                return;
            }
            slot.generation += 1;
            let generation = slot.generation;
            slot.attached = Some((generation, Rc::clone(&sink)));
            generation
        };
        debug!(message = "guard.open", generation);

        let slot = Rc::downgrade(&self.slot);
        sink.send(Message::Open(Talkback::new(move |_| release(&slot, generation))));
    }
}

impl<T> Sink<T> for ConnectionGuard<T> {
    fn send(&self, message: Message<T>) {
        match message {
            // Producers writing into the guard manage their own lifecycle.
            Message::Open(_) => {}
            Message::Emit(payload) => {
                if let Some(sink) = self.current() {
                    sink.send(Message::Emit(payload));
                }
            }
            Message::Close(reason) => {
                let detached = self.slot.borrow_mut().attached.take();
                if let Some((generation, sink)) = detached {
                    debug!(message = "guard.release", generation);
                    sink.send(Message::Close(reason));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Reason;
    use std::cell::Cell;

    #[derive(Default)]
    struct Probe {
        opens: Cell<u32>,
        emits: RefCell<Vec<u32>>,
        closes: RefCell<Vec<Option<Reason>>>,
        talkback: RefCell<Option<Talkback>>,
    }

    fn attach(guard: &ConnectionGuard<u32>) -> Rc<Probe> {
        let probe = Rc::new(Probe::default());
        let p = Rc::clone(&probe);
        guard.open(Rc::new(move |m: Message<u32>| match m {
            Message::Open(tb) => {
                p.opens.set(p.opens.get() + 1);
                *p.talkback.borrow_mut() = Some(tb);
            }
            Message::Emit(n) => p.emits.borrow_mut().push(n),
            Message::Close(r) => p.closes.borrow_mut().push(r),
        }));
        probe
    }

    fn hang_up(probe: &Probe) {
        let tb = probe.talkback.borrow().clone();
        if let Some(tb) = tb {
            tb.close(None);
        }
    }

    #[test]
    fn echoes_to_the_attached_consumer() {
        let guard = ConnectionGuard::new();
        let probe = attach(&guard);
        assert_eq!(probe.opens.get(), 1);
        guard.send(Message::Emit(5));
        guard.send(Message::Emit(6));
        assert_eq!(*probe.emits.borrow(), vec![5, 6]);
    }

    #[test]
    fn emits_without_consumer_are_dropped() {
        let guard: ConnectionGuard<u32> = ConnectionGuard::new();
        guard.send(Message::Emit(1));
        assert!(!guard.is_open());
    }

    #[test]
    fn second_open_is_ignored() {
        let guard = ConnectionGuard::new();
        let first = attach(&guard);
        let second = attach(&guard);
        guard.send(Message::Emit(9));
        assert_eq!(second.opens.get(), 0);
        assert!(second.emits.borrow().is_empty());
        assert_eq!(*first.emits.borrow(), vec![9]);
    }

    #[test]
    fn talkback_close_allows_reconnect() {
        let guard = ConnectionGuard::new();
        let first = attach(&guard);
        hang_up(&first);
        assert!(!guard.is_open());

        let second = attach(&guard);
        assert_eq!(second.opens.get(), 1);
        guard.send(Message::Emit(3));
        assert_eq!(*second.emits.borrow(), vec![3]);
        assert!(first.emits.borrow().is_empty());
    }

    #[test]
    fn stale_talkback_keeps_newer_connection() {
        let guard = ConnectionGuard::new();
        let first = attach(&guard);
        hang_up(&first);
        let second = attach(&guard);

        hang_up(&first);
        assert!(guard.is_open());
        guard.send(Message::Emit(4));
        assert_eq!(*second.emits.borrow(), vec![4]);
    }

    #[test]
    fn close_is_forwarded_once_and_releases() {
        let guard = ConnectionGuard::new();
        let probe = attach(&guard);
        guard.send(Message::Close(Some(Reason::new("done"))));
        guard.send(Message::Close(None));
        assert_eq!(*probe.closes.borrow(), vec![Some(Reason::new("done"))]);
        assert!(!guard.is_open());
    }
}
