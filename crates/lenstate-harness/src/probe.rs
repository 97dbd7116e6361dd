//! Connection-counting source wrapper.

use std::cell::Cell;
use std::rc::Rc;

use lenstate::stream::{Message, SinkRef, Source, SourceRef, Talkback};

#[derive(Default)]
struct Counters {
    opens: Cell<usize>,
    closes: Cell<usize>,
}

/// Wraps a source and counts how often it is opened and released.
///
/// A release is counted once per connection, however many times the
/// consumer closes its talkback.
pub struct Probe<T> {
    inner: SourceRef<T>,
    counters: Rc<Counters>,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            counters: Rc::clone(&self.counters),
        }
    }
}

impl<T: 'static> Probe<T> {
    pub fn new(inner: SourceRef<T>) -> Self {
        Self {
            inner,
            counters: Rc::default(),
        }
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.counters.opens.get()
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.counters.closes.get()
    }

    /// Connections opened and not yet released.
    #[must_use]
    pub fn active(&self) -> usize {
        self.opens() - self.closes()
    }
}

impl<T: 'static> Source<T> for Probe<T> {
    fn open(&self, sink: SinkRef<T>) {
        let counters = Rc::clone(&self.counters);
        counters.opens.set(counters.opens.get() + 1);

        let released = Rc::new(Cell::new(false));
        let relay: SinkRef<T> = Rc::new(move |message: Message<T>| match message {
            Message::Open(talkback) => {
                let counters = Rc::clone(&counters);
                let released = Rc::clone(&released);
                sink.send(Message::Open(Talkback::new(move |reason| {
                    if !released.replace(true) {
                        counters.closes.set(counters.closes.get() + 1);
                    }
                    talkback.close(reason);
                })));
            }
            Message::Close(reason) => {
                if !released.replace(true) {
                    counters.closes.set(counters.closes.get() + 1);
                }
                sink.send(Message::Close(reason));
            }
            emit @ Message::Emit(_) => sink.send(emit),
        });
        self.inner.open(relay);
    }
}
