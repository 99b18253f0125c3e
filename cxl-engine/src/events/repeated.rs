// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An event that can be triggered multiple times.
//!
//! Each `listen()` waits for the next notification. The notifier can pass a
//! value to the listeners with `notify_result()`, otherwise listeners see the
//! last value set.

use std::cell::{Cell, RefCell};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Future;
use futures::future::FusedFuture;

use crate::traits::{BoxFuture, Event};
use crate::types::SimResult;

struct RepeatedState<T> {
    waiting: RefCell<Vec<Waker>>,
    result: Cell<T>,

    /// Count of notifications so that a future knows when it has been woken
    /// by its own event.
    generation: Cell<u64>,
}

#[derive(Clone)]
pub struct Repeated<T>
where
    T: Copy,
{
    state: Rc<RepeatedState<T>>,
}

impl<T> Repeated<T>
where
    T: Copy,
{
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(RepeatedState {
                waiting: RefCell::new(Vec::new()),
                result: Cell::new(value),
                generation: Cell::new(0),
            }),
        }
    }

    pub fn notify(&self) -> SimResult {
        self.state.generation.set(self.state.generation.get() + 1);
        for waker in self.state.waiting.borrow_mut().drain(..) {
            waker.wake();
        }
        Ok(())
    }

    pub fn notify_result(&self, result: T) -> SimResult {
        self.state.result.set(result);
        self.notify()
    }
}

impl Default for Repeated<()> {
    fn default() -> Self {
        Self::new(())
    }
}

pub struct RepeatedFuture<T> {
    state: Rc<RepeatedState<T>>,
    listening_from: Option<u64>,
    done: bool,
}

impl<T> Event<T> for Repeated<T>
where
    T: Copy + 'static,
{
    fn listen(&self) -> BoxFuture<'static, T> {
        Box::pin(RepeatedFuture {
            state: self.state.clone(),
            listening_from: None,
            done: false,
        })
    }

    fn clone_dyn(&self) -> Box<dyn Event<T>> {
        Box::new(self.clone())
    }
}

impl<T> Future for RepeatedFuture<T>
where
    T: Copy,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let generation = self.state.generation.get();
        match self.listening_from {
            Some(from) if generation > from => {
                self.done = true;
                Poll::Ready(self.state.result.get())
            }
            Some(_) => Poll::Pending,
            None => {
                self.listening_from = Some(generation);
                self.state.waiting.borrow_mut().push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> FusedFuture for RepeatedFuture<T>
where
    T: Copy,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
