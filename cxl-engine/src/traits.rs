// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the CXL engine.

use core::mem::size_of;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use cxl_track::id::Unique;

use crate::types::{AccessType, SimResult};

/// The `TotalBytes` trait is used to determine how many bytes an object
/// represents
///
/// This trait is used to determine how much time an object will take to be
/// sent.
pub trait TotalBytes {
    fn total_bytes(&self) -> usize;
}

/// The `Routable` trait provides an interface to an object to enable it to be
/// routed
pub trait Routable {
    /// Address used to select the destination.
    fn destination(&self) -> u64;
    fn access_type(&self) -> AccessType;
}

/// A super-trait that objects that are passed around the simulation have to
/// implement
///
///  - Clone:       Allow the application to keep copies of objects sent
///    around.
///  - Debug/Display: Printing in log messages.
///  - Routable:    Allows routing.
///  - Unique:      Allows objects to be tracked through entities.
///  - TotalBytes:  Allows rate limiting.
///  - 'static:     Objects are moved into futures.
pub trait SimObject:
    Clone + Debug + Display + Routable + Unique + TotalBytes + 'static
{
}

// Implementations for basic types that can be sent around the simulation for
// testing

impl TotalBytes for i32 {
    fn total_bytes(&self) -> usize {
        size_of::<i32>()
    }
}

impl Routable for i32 {
    fn destination(&self) -> u64 {
        *self as u64
    }
    fn access_type(&self) -> AccessType {
        AccessType::Read
    }
}

impl SimObject for i32 {}

impl TotalBytes for usize {
    fn total_bytes(&self) -> usize {
        size_of::<usize>()
    }
}

impl Routable for usize {
    fn destination(&self) -> u64 {
        *self as u64
    }
    fn access_type(&self) -> AccessType {
        AccessType::Read
    }
}

impl SimObject for usize {}

/// The `Event` trait defines an object that can be used as an Event
///
/// This is a trait that defines the `listen` function that returns a future
/// so that it can be used in `async` code.
pub trait Event<T> {
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    fn listen(&self) -> BoxFuture<'static, T>;

    /// Allow cloning of Boxed events.
    fn clone_dyn(&self) -> Box<dyn Event<T>>;
}

impl<T> Clone for Box<dyn Event<T>> {
    fn clone(self: &Box<dyn Event<T>>) -> Box<dyn Event<T>> {
        self.clone_dyn()
    }
}

/// A component that is spawned when the simulation starts.
///
/// Passive components can use the default implementation which does nothing.
#[async_trait(?Send)]
pub trait Runnable {
    async fn run(&self) -> SimResult {
        Ok(())
    }
}

pub type BoxFuture<'a, T> = Pin<std::boxed::Box<dyn Future<Output = T> + 'a>>;
