//! Multicast source and sink.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lenstate::stream::{Message, Recipients, Sink, SinkRef, Source, Talkback, broadcast};

/// Hot multicast stream: every value sent in is delivered to every sink
/// attached at that moment.
///
/// Cloning shares the same subject.
pub struct Subject<T> {
    sinks: Rc<RefCell<Recipients<T>>>,
    closed: Rc<Cell<bool>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            sinks: Rc::clone(&self.sinks),
            closed: Rc::clone(&self.closed),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            sinks: Rc::new(RefCell::new(Recipients::new())),
            closed: Rc::new(Cell::new(false)),
        }
    }
}

impl<T: Clone + 'static> Subject<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, value: T) {
        self.send(Message::Emit(value));
    }

    pub fn complete(&self) {
        self.send(Message::Close(None));
    }

    #[must_use]
    pub fn observers(&self) -> usize {
        self.sinks.borrow().len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl<T: Clone + 'static> Source<T> for Subject<T> {
    fn open(&self, sink: SinkRef<T>) {
        if self.closed.get() {
            sink.send(Message::Open(Talkback::noop()));
            sink.send(Message::Close(None));
            return;
        }
        let id = self.sinks.borrow_mut().add(Rc::clone(&sink));
        let sinks = Rc::downgrade(&self.sinks);
        sink.send(Message::Open(Talkback::new(move |_| {
            if let Some(sinks) = sinks.upgrade() {
                sinks.borrow_mut().remove(id);
            }
        })));
    }
}

impl<T: Clone + 'static> Sink<T> for Subject<T> {
    fn send(&self, message: Message<T>) {
        if self.closed.get() {
            return;
        }
        match message {
            Message::Open(_) => {}
            Message::Emit(value) => broadcast(&Message::Emit(value), &self.sinks),
            Message::Close(reason) => {
                self.closed.set(true);
                broadcast(&Message::Close(reason), &self.sinks);
                self.sinks.borrow_mut().clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Recorder;

    #[test]
    fn multicasts_in_attachment_order() {
        let subject = Subject::new();
        let (a, b) = (Recorder::new(), Recorder::new());
        subject.open(a.sink());
        subject.open(b.sink());
        subject.emit(1);
        subject.emit(2);
        assert_eq!(a.values(), vec![1, 2]);
        assert_eq!(b.values(), vec![1, 2]);
    }

    #[test]
    fn completion_closes_everyone_and_sticks() {
        let subject = Subject::new();
        let early = Recorder::new();
        subject.open(early.sink());
        subject.complete();
        subject.emit(3);
        assert!(early.is_closed());
        assert!(early.values().is_empty());

        let late = Recorder::new();
        subject.open(late.sink());
        assert!(late.is_closed());
        assert_eq!(subject.observers(), 0);
    }
}
