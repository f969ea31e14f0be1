//! Outcome codes and transport errors.
//!
//! Every programming operation ends with an [`Rc`] that is recorded on the
//! hardware-backed attribute it targeted. Failures are values, not errors:
//! the reconciler reads them back and retries on the next update.

use std::fmt;
use thiserror::Error;

/// Outcome of a programming operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rc {
    /// The attribute is known but not programmed (initial or after delete).
    #[default]
    Noop,
    /// The operation was acknowledged by the engine.
    Ok,
    /// The engine rejected the operation.
    Invalid,
    /// The engine did not answer in time.
    Timeout,
}

impl Rc {
    /// Maps an engine return value onto an outcome code.
    pub fn from_retval(retval: i32) -> Self {
        if retval == 0 {
            Rc::Ok
        } else {
            Rc::Invalid
        }
    }

    /// Returns true if the operation was acknowledged.
    pub fn is_ok(&self) -> bool {
        *self == Rc::Ok
    }

    /// Returns true if the last attempt failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Rc::Invalid | Rc::Timeout)
    }

    /// Combines two outcomes, keeping the first failure.
    pub fn first_failure(self, next: Rc) -> Rc {
        if self.is_ok() {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for Rc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rc::Noop => "no-op",
            Rc::Ok => "ok",
            Rc::Invalid => "invalid",
            Rc::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Error type for engine transport operations.
#[derive(Debug, Clone, Error)]
pub enum HwError {
    /// No connection to the engine.
    #[error("Not connected to the forwarding engine")]
    Disconnected,

    /// The engine did not answer.
    #[error("Engine request timed out: {request}")]
    Timeout { request: String },

    /// The engine answered with a reply of the wrong shape.
    #[error("Unexpected reply to {request}")]
    UnexpectedReply { request: String },

    /// Lower-level transport failure.
    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl HwError {
    /// Creates a timeout error.
    pub fn timeout(request: impl Into<String>) -> Self {
        HwError::Timeout {
            request: request.into(),
        }
    }

    /// Creates an unexpected-reply error.
    pub fn unexpected_reply(request: impl Into<String>) -> Self {
        HwError::UnexpectedReply {
            request: request.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        HwError::Transport {
            message: message.into(),
        }
    }

    /// The outcome code recorded when a command fails with this error.
    pub fn rc(&self) -> Rc {
        match self {
            HwError::Timeout { .. } => Rc::Timeout,
            _ => Rc::Invalid,
        }
    }
}

/// Result type for engine transport operations.
pub type HwResult<T> = Result<T, HwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc_from_retval() {
        assert_eq!(Rc::from_retval(0), Rc::Ok);
        assert_eq!(Rc::from_retval(-6), Rc::Invalid);
        assert_eq!(Rc::from_retval(17), Rc::Invalid);
    }

    #[test]
    fn test_rc_classification() {
        assert!(Rc::Ok.is_ok());
        assert!(!Rc::Noop.is_ok());
        assert!(!Rc::Noop.is_failure());
        assert!(Rc::Invalid.is_failure());
        assert!(Rc::Timeout.is_failure());
        assert_eq!(Rc::default(), Rc::Noop);
    }

    #[test]
    fn test_first_failure() {
        assert_eq!(Rc::Ok.first_failure(Rc::Ok), Rc::Ok);
        assert_eq!(Rc::Ok.first_failure(Rc::Timeout), Rc::Timeout);
        assert_eq!(Rc::Invalid.first_failure(Rc::Timeout), Rc::Invalid);
        assert_eq!(Rc::Invalid.first_failure(Rc::Ok), Rc::Invalid);
    }

    #[test]
    fn test_rc_display() {
        assert_eq!(Rc::Ok.to_string(), "ok");
        assert_eq!(Rc::Noop.to_string(), "no-op");
        assert_eq!(Rc::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_error_rc() {
        assert_eq!(HwError::timeout("ping").rc(), Rc::Timeout);
        assert_eq!(HwError::Disconnected.rc(), Rc::Invalid);
        assert_eq!(HwError::transport("socket closed").rc(), Rc::Invalid);
    }
}
