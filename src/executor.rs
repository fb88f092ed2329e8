use std::{
    cell::RefCell,
    collections::VecDeque,
    future::{Future, IntoFuture},
    task::{Context, Poll},
};

use async_task::{Runnable, Task};

/// Drive a future to completion, interleaving polls with a ticker that plays
/// the event loop's role (deliver events, expire timers, run spawned tasks)
///
/// # Errors
///
/// If the ticker fails
pub fn block_on<F, T, E>(future: F, ticker: T) -> Result<F::Output, E>
where
    F: IntoFuture,
    T: Fn() -> Result<(), E>,
{
    let waker = noop_waker::noop_waker();
    let mut context = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future.into_future());

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut context) {
            return Ok(output);
        }

        ticker()?;
    }
}

/// Single threaded FIFO executor for background tasks
#[derive(Default)]
#[must_use]
pub struct Executor {
    queue: RefCell<VecDeque<Runnable>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task, polling it once immediately
    pub fn spawn<'a, F>(&'a self, future: F) -> Task<F::Output>
    where
        F: IntoFuture,
        F::IntoFuture: 'a,
        F::Output: 'a,
    {
        // SAFETY: everything is single threaded and the future cannot outlive
        // the executor that schedules it
        let (runnable, task) = unsafe {
            async_task::spawn_unchecked(future.into_future(), |runnable| {
                self.queue.borrow_mut().push_back(runnable);
            })
        };

        runnable.run();
        task
    }

    /// Poll every task scheduled so far
    pub fn tick(&self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(runnable) => _ = runnable.run(),
                None => return,
            }
        }
    }
}
