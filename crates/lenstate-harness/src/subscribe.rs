//! Terminal consumer with RAII unsubscription.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lenstate::Reason;
use lenstate::stream::{Message, Source, Talkback};

/// Handle to a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    talkback: Rc<RefCell<Option<Talkback>>>,
    closed: Rc<Cell<bool>>,
}

impl Subscription {
    /// Close the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        self.closed.set(true);
        let talkback = self.talkback.borrow_mut().take();
        if let Some(talkback) = talkback {
            talkback.close(None);
        }
    }

    /// Whether either side has closed the subscription.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Keep the subscription running for as long as the source lives.
    pub fn detach(self) {
        self.talkback.borrow_mut().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscribe `on_value` to `source`.
pub fn subscribe<T, S>(source: &S, on_value: impl Fn(T) + 'static) -> Subscription
where
    T: 'static,
    S: Source<T> + ?Sized,
{
    subscribe_with(source, on_value, |_| {})
}

/// Subscribe with separate value and close handlers.
pub fn subscribe_with<T, S>(
    source: &S,
    on_value: impl Fn(T) + 'static,
    on_close: impl Fn(Option<Reason>) + 'static,
) -> Subscription
where
    T: 'static,
    S: Source<T> + ?Sized,
{
    let talkback: Rc<RefCell<Option<Talkback>>> = Rc::default();
    let closed = Rc::new(Cell::new(false));

    let slot = Rc::clone(&talkback);
    let done = Rc::clone(&closed);
    source.open(Rc::new(move |message: Message<T>| match message {
        Message::Open(tb) => {
            if done.get() {
                tb.close(None);
            } else {
                *slot.borrow_mut() = Some(tb);
            }
        }
        Message::Emit(value) => {
            if !done.get() {
                on_value(value);
            }
        }
        Message::Close(reason) => {
            done.set(true);
            slot.borrow_mut().take();
            on_close(reason);
        }
    }));

    Subscription { talkback, closed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Subject;
    use lenstate::stream::Sink;

    #[test]
    fn drop_unsubscribes() {
        let subject: Subject<u8> = Subject::new();
        let seen = Rc::new(Cell::new(0));
        let hits = Rc::clone(&seen);
        let sub = subscribe(&subject, move |n| hits.set(hits.get() + n));
        subject.emit(2);
        assert_eq!(subject.observers(), 1);
        drop(sub);
        subject.emit(5);
        assert_eq!(seen.get(), 2);
        assert_eq!(subject.observers(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let subject: Subject<u8> = Subject::new();
        let sub = subscribe(&subject, |_| {});
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(sub.is_closed());
    }

    #[test]
    fn producer_close_is_observed() {
        let subject: Subject<u8> = Subject::new();
        let reason = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&reason);
        let sub = subscribe_with(&subject, |_| {}, move |r| *slot.borrow_mut() = Some(r));
        subject.send(Message::Close(Some(Reason::new("eof"))));
        assert!(sub.is_closed());
        assert_eq!(*reason.borrow(), Some(Some(Reason::new("eof"))));
    }

    #[test]
    fn detached_subscriptions_outlive_their_handle() {
        let subject: Subject<u8> = Subject::new();
        subscribe(&subject, |_| {}).detach();
        assert_eq!(subject.observers(), 1);
    }
}
