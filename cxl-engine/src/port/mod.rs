// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Ports connect components.
//!
//! An [`OutPort`] is connected to exactly one [`InPort`]. A `put()` on the
//! [`OutPort`] completes once the value has been taken by a `get()` on the
//! [`InPort`], which gives natural back-pressure between components.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use cxl_track::connect;
use cxl_track::entity::Entity;
use futures::Future;
use futures::future::FusedFuture;

use crate::engine::Engine;
use crate::port::monitor::Monitor;
use crate::sim_error;
use crate::time::clock::Clock;
use crate::traits::SimObject;
use crate::types::{SimError, SimResult};

pub mod monitor;

pub type PortStateResult<T> = Result<Rc<PortState<T>>, SimError>;
pub type PortGetResult<T> = Result<PortGet<T>, SimError>;
pub type PortPutResult<T> = Result<PortPut<T>, SimError>;
pub type PortTryPutResult<T> = Result<PortTryPut<T>, SimError>;

/// State shared between one connected [`OutPort`]/[`InPort`] pair.
pub struct PortState<T>
where
    T: SimObject,
{
    value: RefCell<Option<T>>,

    /// Set from the `put()` of a value until the receiver has finished with it.
    in_flight: Cell<bool>,
    waiting_get: RefCell<Option<Waker>>,
    waiting_put: RefCell<Option<Waker>>,
    pub in_port_entity: Rc<Entity>,
    monitor: RefCell<Option<Rc<Monitor>>>,
}

impl<T> PortState<T>
where
    T: SimObject,
{
    fn new(in_port_entity: Rc<Entity>) -> Self {
        Self {
            value: RefCell::new(None),
            in_flight: Cell::new(false),
            waiting_get: RefCell::new(None),
            waiting_put: RefCell::new(None),
            in_port_entity,
            monitor: RefCell::new(None),
        }
    }

    /// Attach a bandwidth monitor to this port.
    pub fn monitor(&self, engine: &Engine, clock: &Clock, window_size_ticks: u64) {
        *self.monitor.borrow_mut() = Some(Monitor::new_and_register(
            engine,
            &self.in_port_entity,
            clock,
            window_size_ticks,
        ));
    }

    fn wake_put(&self) {
        if let Some(waker) = self.waiting_put.borrow_mut().take() {
            waker.wake();
        }
    }

    fn take_value(&self) -> Option<T> {
        let value = self.value.borrow_mut().take()?;
        if let Some(monitor) = self.monitor.borrow().as_ref() {
            monitor.sample(&value);
        }
        Some(value)
    }

    fn release(&self) {
        self.in_flight.set(false);
        self.wake_put();
    }
}

pub struct InPort<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    state: Rc<PortState<T>>,
    connected: Cell<bool>,
}

impl<T> fmt::Display for InPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> InPort<T>
where
    T: SimObject,
{
    /// Create an input port.
    ///
    /// A bandwidth monitor is attached if the tracker enables monitoring for
    /// this port.
    #[must_use]
    pub fn new(engine: &Engine, clock: &Clock, parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let state = Rc::new(PortState::new(entity.clone()));
        if let Some(window_size_ticks) = entity.tracker.monitoring_window_size_for(entity.id) {
            state.monitor(engine, clock, window_size_ticks);
        }
        Self {
            entity,
            state,
            connected: Cell::new(false),
        }
    }

    /// Hand out the shared state so an [`OutPort`] can connect to this port.
    pub fn state(&self) -> PortStateResult<T> {
        if self.connected.replace(true) {
            return sim_error!("{self} already connected");
        }
        Ok(self.state.clone())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn get(&self) -> PortGetResult<T> {
        self.get_future(true)
    }

    /// Receive a value but keep the sender blocked until `finish_get()`.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn start_get(&self) -> PortGetResult<T> {
        self.get_future(false)
    }

    /// Must be matched with a `start_get` to allow the [`OutPort`] to continue.
    pub fn finish_get(&self) {
        self.state.release();
    }

    fn get_future(&self, release: bool) -> PortGetResult<T> {
        if !self.connected.get() {
            return sim_error!("{self} not connected");
        }
        Ok(PortGet {
            state: self.state.clone(),
            release,
            done: false,
        })
    }
}

pub struct OutPort<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    state: Option<Rc<PortState<T>>>,
}

impl<T> fmt::Display for OutPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> OutPort<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            state: None,
        }
    }

    pub fn connect(&mut self, port_state: PortStateResult<T>) -> SimResult {
        let port_state = port_state?;
        if self.state.is_some() {
            return sim_error!("{self} already connected");
        }
        connect!(self.entity ; port_state.in_port_entity);
        self.state = Some(port_state);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    fn connected_state(&self) -> Result<Rc<PortState<T>>, SimError> {
        match &self.state {
            Some(state) => Ok(state.clone()),
            None => sim_error!("{self} not connected"),
        }
    }

    /// Send a value. Completes once the receiver has taken it.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn put(&self, value: T) -> PortPutResult<T> {
        Ok(PortPut {
            state: self.connected_state()?,
            value: Some(value),
            done: false,
        })
    }

    /// Wait until the receiver is waiting for a value.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn try_put(&self) -> PortTryPutResult<T> {
        Ok(PortTryPut {
            state: self.connected_state()?,
            done: false,
        })
    }
}

pub struct PortPut<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    value: Option<T>,
    done: bool,
}

// No self-references are held so the future can be moved freely.
impl<T> Unpin for PortPut<T> where T: SimObject {}

impl<T> Future for PortPut<T>
where
    T: SimObject,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.value.take() {
            // One put/get pair at a time shares the state.
            debug_assert!(!self.state.in_flight.get());
            *self.state.value.borrow_mut() = Some(value);
            self.state.in_flight.set(true);
            if let Some(waker) = self.state.waiting_get.borrow_mut().take() {
                waker.wake();
            }
        } else if !self.state.in_flight.get() {
            self.done = true;
            return Poll::Ready(());
        }
        *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> FusedFuture for PortPut<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

pub struct PortTryPut<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    done: bool,
}

impl<T> Future for PortTryPut<T>
where
    T: SimObject,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.waiting_get.borrow().is_some() {
            self.done = true;
            Poll::Ready(())
        } else {
            *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for PortTryPut<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

pub struct PortGet<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,

    /// Release the sender as soon as the value is taken.
    release: bool,
    done: bool,
}

impl<T> Future for PortGet<T>
where
    T: SimObject,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.state.take_value() {
            self.done = true;
            if self.release {
                self.state.release();
            }
            Poll::Ready(value)
        } else {
            *self.state.waiting_get.borrow_mut() = Some(cx.waker().clone());
            // Let a sender blocked in `try_put()` know there is a receiver.
            self.state.wake_put();
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for PortGet<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
