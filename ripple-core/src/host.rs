//! Deferred-execution hosts.
//!
//! The scheduler never flushes inline. When the first write after a flush
//! marks a signal dirty, the flush is handed to a [`Host`], which must run
//! it later, after the writing call stack has unwound.
//!
//! Two hosts ship with the crate:
//!
//! - [`ManualHost`]: a FIFO queue the embedder drains with
//!   [`tick`](crate::reactive::tick) or
//!   [`run_until_idle`](crate::reactive::run_until_idle). This is the
//!   default, and what the tests use.
//! - [`TokioHost`]: spawns the flush with [`tokio::task::spawn_local`], so
//!   it runs on the next turn of the surrounding `LocalSet`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::config::HostKind;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Something that can run a task on a later turn.
pub trait Host {
    /// Queue `task`. Must not run it before returning.
    fn defer(&self, task: Task);

    /// Tasks queued and not yet run, if the host can tell.
    fn pending(&self) -> usize {
        0
    }
}

/// A host whose queue is drained explicitly by the embedder.
#[derive(Default)]
pub struct ManualHost {
    queue: RefCell<VecDeque<Task>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Host for ManualHost {
    fn defer(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }

    fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl std::fmt::Debug for ManualHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualHost")
            .field("pending", &self.pending())
            .finish()
    }
}

/// A host backed by the current tokio `LocalSet`.
///
/// Deferring outside of a `LocalSet` panics, as
/// [`spawn_local`](tokio::task::spawn_local) does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl Host for TokioHost {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}

/// The host installed on a runtime.
#[derive(Clone)]
pub(crate) enum HostHandle {
    Manual(Rc<ManualHost>),
    Custom(Rc<dyn Host>),
}

impl HostHandle {
    pub(crate) fn from_kind(kind: HostKind) -> Self {
        match kind {
            HostKind::Manual => HostHandle::Manual(Rc::new(ManualHost::new())),
            HostKind::Tokio => HostHandle::Custom(Rc::new(TokioHost)),
        }
    }

    pub(crate) fn defer(&self, task: Task) {
        match self {
            HostHandle::Manual(host) => host.defer(task),
            HostHandle::Custom(host) => host.defer(task),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        match self {
            HostHandle::Manual(host) => host.pending(),
            HostHandle::Custom(host) => host.pending(),
        }
    }
}
