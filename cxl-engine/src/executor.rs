// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Single-threaded executor.
//!
//! Tasks are polled when they are woken. When no task is runnable the next
//! entry is taken from the global event queue, which advances time.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use cxl_track::entity::Entity;
use cxl_track::set_time;

use crate::time::clock::Clock;
use crate::time::{Action, SimTime};
use crate::types::SimResult;

const VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_raw_waker, wake_task, wake_task_by_ref, drop_task);

fn waker_for_task(task: Rc<Task>) -> Waker {
    let ptr = Rc::into_raw(task) as *const ();
    // SAFETY: the vtable functions treat the pointer as an `Rc<Task>` created
    // by `Rc::into_raw` and keep the reference count balanced.
    unsafe { Waker::from_raw(RawWaker::new(ptr, &VTABLE)) }
}

unsafe fn clone_raw_waker(data: *const ()) -> RawWaker {
    // SAFETY: `data` came from `Rc::into_raw` in `waker_for_task`.
    unsafe { Rc::increment_strong_count(data as *const Task) };
    RawWaker::new(data, &VTABLE)
}

unsafe fn wake_task(data: *const ()) {
    // SAFETY: consumes the reference owned by this waker.
    let task = unsafe { Rc::from_raw(data as *const Task) };
    task.schedule();
}

unsafe fn wake_task_by_ref(data: *const ()) {
    // SAFETY: borrows the reference owned by the waker without consuming it.
    unsafe { Rc::increment_strong_count(data as *const Task) };
    let task = unsafe { Rc::from_raw(data as *const Task) };
    task.schedule();
}

unsafe fn drop_task(data: *const ()) {
    // SAFETY: releases the reference owned by this waker.
    unsafe { drop(Rc::from_raw(data as *const Task)) };
}

struct Task {
    future: RefCell<Pin<Box<dyn Future<Output = SimResult>>>>,
    state: Rc<ExecutorState>,
    queued: Cell<bool>,
    done: Cell<bool>,
}

impl Task {
    fn schedule(self: Rc<Self>) {
        if !self.done.get() && !self.queued.replace(true) {
            let state = self.state.clone();
            state.ready.borrow_mut().push(self);
        }
    }

    fn poll(self: &Rc<Self>) -> Poll<SimResult> {
        self.queued.set(false);
        let waker = waker_for_task(self.clone());
        let mut context = Context::from_waker(&waker);
        let poll = self.future.borrow_mut().as_mut().poll(&mut context);
        if poll.is_ready() {
            self.done.set(true);
        }
        poll
    }
}

struct ExecutorState {
    ready: RefCell<Vec<Rc<Task>>>,
    time: Rc<SimTime>,
}

/// Single-threaded executor
///
/// A thin wrapper (using [`Rc`]) around the shared executor state so that it
/// can be cloned and passed around.
#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    state: Rc<ExecutorState>,
}

impl Executor {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        spawn_into(&self.state, future);
    }

    /// Run until no task is runnable and the event queue holds nothing that
    /// keeps the simulation alive.
    pub fn run(&self) -> SimResult {
        loop {
            self.step()?;

            let Some(next) = self.state.time.pop() else {
                break;
            };
            set_time!(self.entity ; next.time_ns);
            match next.action {
                Action::Wake { waker, .. } => waker.wake(),
                Action::Call(callback) => callback()?,
            }
        }
        Ok(())
    }

    /// Poll tasks until none are runnable at the current time.
    fn step(&self) -> SimResult {
        loop {
            let ready: Vec<Rc<Task>> = self.state.ready.borrow_mut().drain(..).collect();
            if ready.is_empty() {
                return Ok(());
            }
            for task in ready {
                if let Poll::Ready(Err(e)) = task.poll() {
                    return Err(e);
                }
            }
        }
    }

    #[must_use]
    pub fn get_clock(&self, freq_mhz: f64) -> Clock {
        Clock::new(freq_mhz, self.state.time.clone())
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.state.time.now_ns()
    }
}

/// `Spawner` spawns new futures into the executor.
#[derive(Clone)]
pub struct Spawner {
    state: Rc<ExecutorState>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        spawn_into(&self.state, future);
    }
}

fn spawn_into(state: &Rc<ExecutorState>, future: impl Future<Output = SimResult> + 'static) {
    let task = Rc::new(Task {
        future: RefCell::new(Box::pin(future)),
        state: state.clone(),
        queued: Cell::new(false),
        done: Cell::new(false),
    });
    task.schedule();
}

#[must_use]
pub fn new_executor_and_spawner(top: &Rc<Entity>) -> (Executor, Spawner) {
    let state = Rc::new(ExecutorState {
        ready: RefCell::new(Vec::new()),
        time: Rc::new(SimTime::new()),
    });
    let entity = Rc::new(Entity::new(top, "executor"));
    (
        Executor {
            entity,
            state: state.clone(),
        },
        Spawner { state },
    )
}
