// task.rs - single-threaded settle-once future used for animations, loads and gyroscope requests

use crate::error::ViewerError;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// How a task settled.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
    Failed(ViewerError),
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

struct Shared<T> {
    state: TaskState,
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

/// Handle to an operation that settles exactly once.
///
/// Clones share the same state. Awaiting yields the [`Outcome`]; only one waiter
/// receives a completed value, every clone can still query [`Task::state`].
pub struct Task<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("state", &self.state()).finish()
    }
}

impl<T> Default for Task<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> Task<T> {
    pub fn pending() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: TaskState::Pending,
                outcome: None,
                waker: None,
            })),
        }
    }

    pub fn completed(value: T) -> Self {
        let task = Self::pending();
        task.complete(value);
        task
    }

    pub fn failed(error: ViewerError) -> Self {
        let task = Self::pending();
        task.fail(error);
        task
    }

    pub fn state(&self) -> TaskState {
        self.shared.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    fn settle(&self, state: TaskState, outcome: Outcome<T>) -> bool {
        let waker = {
            let mut shared = self.shared.borrow_mut();
            if shared.state != TaskState::Pending {
                return false;
            }
            shared.state = state;
            shared.outcome = Some(outcome);
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Returns false if the task had already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(TaskState::Completed, Outcome::Completed(value))
    }

    pub fn cancel(&self) -> bool {
        self.settle(TaskState::Cancelled, Outcome::Cancelled)
    }

    pub fn fail(&self, error: ViewerError) -> bool {
        self.settle(TaskState::Failed, Outcome::Failed(error))
    }

    /// Takes the outcome without waiting, if settled and not yet taken.
    pub fn try_take(&self) -> Option<Outcome<T>> {
        self.shared.borrow_mut().outcome.take()
    }
}

impl<T> Future for Task<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.borrow_mut();
        match shared.state {
            TaskState::Pending => {
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            TaskState::Cancelled => {
                shared.outcome.take();
                Poll::Ready(Outcome::Cancelled)
            }
            _ => match shared.outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                // outcome already handed to another waiter
                None => Poll::Ready(Outcome::Cancelled),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_only_once() {
        let task = Task::pending();
        assert!(task.complete(1));
        assert!(!task.cancel());
        assert_eq!(task.state(), TaskState::Completed);
        assert!(matches!(pollster::block_on(task), Outcome::Completed(1)));
    }

    #[test]
    fn cancelled_is_distinct_from_failure() {
        let task: Task<()> = Task::pending();
        let waiter = task.clone();
        task.cancel();
        assert!(pollster::block_on(waiter).is_cancelled());

        let failed: Task<()> = Task::failed(ViewerError::GyroscopeUnavailable);
        assert!(pollster::block_on(failed).is_failed());
    }

    #[test]
    fn try_take_is_none_while_pending() {
        let task: Task<u8> = Task::pending();
        assert!(task.try_take().is_none());
        task.complete(3);
        assert!(matches!(task.try_take(), Some(Outcome::Completed(3))));
    }
}
