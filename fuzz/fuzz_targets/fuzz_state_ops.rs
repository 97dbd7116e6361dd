#![no_main]

use arbitrary::Arbitrary;
use lenstate::stream::{Message, Source, Talkback, sink};
use lenstate::{Key, StateNode, Value, state};
use libfuzzer_sys::fuzz_target;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Arbitrary, Debug)]
enum Op {
    /// Derive a lens from an existing node.
    Lens { node: u8, key: u8 },
    /// Write a number through a node.
    Set { node: u8, value: i8 },
    /// Write an array of numbers through a node.
    SetArray { node: u8, len: u8 },
    Subscribe { node: u8 },
    Unsubscribe { subscription: u8 },
    Clear { node: u8 },
}

fn key(k: u8) -> Key {
    if k % 2 == 0 {
        Key::index(usize::from(k / 2 % 4))
    } else {
        Key::field(format!("f{}", k / 2 % 3))
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let root = state(Value::object([
        ("f0", Value::array([1_i32, 2, 3])),
        ("f1", Value::from(0)),
    ]));
    let mut nodes: Vec<StateNode<Value>> = vec![root.clone()];
    let mut talkbacks: Vec<Rc<RefCell<Option<Talkback>>>> = Vec::new();

    for op in ops.into_iter().take(256) {
        let pick = |i: u8| nodes[usize::from(i) % nodes.len()].clone();
        match op {
            Op::Lens { node, key: k } => {
                if nodes.len() < 64 {
                    let lens = pick(node).sub(key(k));
                    nodes.push(lens);
                }
            }
            Op::Set { node, value } => pick(node).set(Value::from(i32::from(value))),
            Op::SetArray { node, len } => {
                pick(node).set(Value::array((0..usize::from(len % 6)).map(Value::from)));
            }
            Op::Subscribe { node } => {
                let slot: Rc<RefCell<Option<Talkback>>> = Rc::default();
                let held = Rc::clone(&slot);
                pick(node).open(sink(move |m: Message<Option<Value>>| {
                    if let Message::Open(tb) = m {
                        *held.borrow_mut() = Some(tb);
                    }
                }));
                talkbacks.push(slot);
            }
            Op::Unsubscribe { subscription } => {
                if !talkbacks.is_empty() {
                    let slot = &talkbacks[usize::from(subscription) % talkbacks.len()];
                    let tb = slot.borrow().clone();
                    if let Some(tb) = tb {
                        tb.close(None);
                    }
                }
            }
            Op::Clear { node } => pick(node).clear(),
        }
    }

    if !root.is_terminated() {
        assert!(root.subscriber_count() <= talkbacks.len() + nodes.len());
    }
});
