// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::traits::{Event, Runnable};

/// A boxed [`Event`] that can be passed around.
pub type Eventable<T> = Box<dyn Event<T> + 'static>;

/// The type of a component that can be registered with the `Engine` so that it
/// will automatically be spawned.
pub type Component = Rc<dyn Runnable + 'static>;

#[macro_export]
/// Build an `Err(SimError)` from a message.
///
/// Accepts a format string with arguments, a string literal (which may use
/// inline format arguments), or any expression that supports `to_string`.
macro_rules! sim_error {
    ($msg:literal $(,)?) => {
        Err($crate::types::SimError(format!($msg)))
    };
    ($fmt:literal, $($arg:tt)+) => {
        Err($crate::types::SimError(format!($fmt, $($arg)+)))
    };
    ($msg:expr) => {
        Err($crate::types::SimError($msg.to_string()))
    };
}

/// The `SimError` is what should be returned in the case of an error
#[derive(Debug, PartialEq)]
pub struct SimError(pub String);

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}

impl Error for SimError {}

/// The SimResult is the return type for most simulation functions
pub type SimResult = Result<(), SimError>;

/// Generic access types
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessType {
    #[default]
    Read,
    Write,
    Control,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AccessType::Read => "Read",
            AccessType::Write => "Write",
            AccessType::Control => "Control",
        };
        write!(f, "{name}")
    }
}
