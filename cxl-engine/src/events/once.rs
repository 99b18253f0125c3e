// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An event that can only be triggered once.
//!
//! Listeners that arrive after the event has fired complete immediately.

use std::cell::{Cell, RefCell};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Future;
use futures::future::FusedFuture;

use crate::sim_error;
use crate::traits::{BoxFuture, Event};
use crate::types::SimResult;

struct OnceState<T> {
    waiting: RefCell<Vec<Waker>>,
    triggered: Cell<bool>,
    result: T,
}

#[derive(Clone)]
pub struct Once<T>
where
    T: Copy,
{
    state: Rc<OnceState<T>>,
}

impl<T> Once<T>
where
    T: Copy,
{
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(OnceState {
                waiting: RefCell::new(Vec::new()),
                triggered: Cell::new(false),
                result: value,
            }),
        }
    }

    pub fn notify(&self) -> SimResult {
        if self.state.triggered.replace(true) {
            return sim_error!("once event already triggered");
        }
        for waker in self.state.waiting.borrow_mut().drain(..) {
            waker.wake();
        }
        Ok(())
    }

    #[must_use]
    pub fn has_triggered(&self) -> bool {
        self.state.triggered.get()
    }
}

impl Default for Once<()> {
    fn default() -> Self {
        Self::new(())
    }
}

pub struct OnceFuture<T> {
    state: Rc<OnceState<T>>,
    done: bool,
}

impl<T> Event<T> for Once<T>
where
    T: Copy + 'static,
{
    fn listen(&self) -> BoxFuture<'static, T> {
        Box::pin(OnceFuture {
            state: self.state.clone(),
            done: false,
        })
    }

    fn clone_dyn(&self) -> Box<dyn Event<T>> {
        Box::new(self.clone())
    }
}

impl<T> Future for OnceFuture<T>
where
    T: Copy,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.triggered.get() {
            self.done = true;
            Poll::Ready(self.state.result)
        } else {
            self.state.waiting.borrow_mut().push(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for OnceFuture<T>
where
    T: Copy,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
