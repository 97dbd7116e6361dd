use std::rc::Rc;

use thiserror::Error;

/// Reason carried by an abnormal `Close`.
///
/// A bare `Close(None)` is a normal completion or unsubscription. A
/// `Close(Some(reason))` terminates every node it reaches and is passed on
/// unchanged to subscribers and upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Reason {
    message: Rc<str>,
}

impl Reason {
    #[must_use]
    pub fn new(message: impl AsRef<str>) -> Self {
        Self {
            message: Rc::from(message.as_ref()),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether both handles were cloned from the same reason.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.message, &other.message)
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
