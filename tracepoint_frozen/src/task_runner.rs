// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::boxed;
use std::cell;
use std::collections;

/// A unit of work posted to a [`TaskRunner`].
pub type Task = boxed::Box<dyn FnOnce() + 'static>;

/// Cooperative, single-threaded task queue provided by the host.
pub trait TaskRunner {
    /// Queues `task` to run after the tasks already queued.
    fn post_task(&self, task: Task);
}

/// FIFO [`TaskRunner`] driven explicitly by its owner.
///
/// Tasks may post further tasks while running; those run after everything
/// already queued.
#[derive(Default)]
pub struct LocalTaskRunner {
    queue: cell::RefCell<collections::VecDeque<Task>>,
}

impl LocalTaskRunner {
    /// Creates an empty runner.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the oldest queued task. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running so the task can post.
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                return true;
            }
            None => return false,
        }
    }

    /// Runs tasks until the queue is empty and returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }

        return ran;
    }
}

impl TaskRunner for LocalTaskRunner {
    fn post_task(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

impl core::fmt::Debug for LocalTaskRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        return f
            .debug_struct("LocalTaskRunner")
            .field("pending_tasks", &self.pending_tasks())
            .finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc;
    use std::vec;

    #[test]
    fn runs_in_fifo_order() {
        let runner = LocalTaskRunner::new();
        let log = rc::Rc::new(cell::RefCell::new(vec::Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            runner.post_task(boxed::Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(runner.pending_tasks(), 3);
        assert!(runner.run_next());
        assert_eq!(*log.borrow(), [0]);
        assert_eq!(runner.run_until_idle(), 2);
        assert_eq!(*log.borrow(), [0, 1, 2]);
        assert!(!runner.run_next());
    }

    #[test]
    fn tasks_can_post_tasks() {
        let runner = rc::Rc::new(LocalTaskRunner::new());
        let log = rc::Rc::new(cell::RefCell::new(vec::Vec::new()));

        let inner_runner = runner.clone();
        let inner_log = log.clone();
        runner.post_task(boxed::Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let log = inner_log.clone();
            inner_runner.post_task(boxed::Box::new(move || log.borrow_mut().push("inner")));
        }));
        let last_log = log.clone();
        runner.post_task(boxed::Box::new(move || last_log.borrow_mut().push("second")));

        assert_eq!(runner.run_until_idle(), 3);
        assert_eq!(*log.borrow(), ["outer", "second", "inner"]);
    }
}
