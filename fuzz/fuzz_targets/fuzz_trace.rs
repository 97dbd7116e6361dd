#![no_main]

use arbitrary::Arbitrary;
use lenstate::{Change, Trace, Value, post_trace, trace};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Number(i8),
    Text(u8),
    Array(Vec<FuzzValue>),
    Object(Vec<(u8, FuzzValue)>),
}

impl FuzzValue {
    fn build(&self, depth: usize) -> Value {
        if depth > 6 {
            return Value::Null;
        }
        match self {
            FuzzValue::Null => Value::Null,
            FuzzValue::Bool(b) => Value::from(*b),
            FuzzValue::Number(n) => Value::from(i32::from(*n)),
            FuzzValue::Text(c) => Value::from(format!("{}", char::from(b'a' + c % 4))),
            FuzzValue::Array(items) => {
                Value::array(items.iter().take(16).map(|v| v.build(depth + 1)))
            }
            FuzzValue::Object(fields) => Value::object(
                fields
                    .iter()
                    .take(16)
                    .map(|(k, v)| (format!("k{}", k % 8), v.build(depth + 1))),
            ),
        }
    }
}

fuzz_target!(|input: (FuzzValue, FuzzValue)| {
    let (a, b) = (input.0.build(0), input.1.build(0));

    let diff = trace(Some(&a), Some(&b));
    if a == b {
        assert!(diff.is_none());
    }

    let once = post_trace(Change::new(
        Some(b.clone()),
        Some(Trace::leaf(Some(a), Some(b))),
    ));
    let twice = post_trace(once.clone());
    assert_eq!(once, twice);
});
