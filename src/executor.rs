use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use log::trace;
use queues::{IsQueue, Queue};
use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{TbError, TbResult};

thread_local! {
    static READY_QUEUE: RefCell<Queue<Arc<Task>>> = RefCell::new(Queue::new());
}

pub(crate) fn schedule_task(task: Arc<Task>) {
    // wakes arriving while the thread shuts down have nowhere to go
    let _ = READY_QUEUE.try_with(|q| q.borrow_mut().add(task));
}

fn next_task() -> Option<Arc<Task>> {
    READY_QUEUE
        .try_with(|q| q.borrow_mut().remove().ok())
        .ok()
        .flatten()
}

pub(crate) fn clear_ready_queue() {
    // dropping a task can wake one that awaits it, so drain until nothing comes back
    while let Ok(old) = READY_QUEUE.try_with(|q| q.replace(Queue::new())) {
        if old.size() == 0 {
            break;
        }
    }
}

pub(crate) fn has_ready_tasks() -> bool {
    READY_QUEUE
        .try_with(|q| q.borrow().size() > 0)
        .unwrap_or(false)
}

#[inline]
pub fn run_once() {
    while let Some(task) = next_task() {
        process_task(task);
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if *lock(&task.state) == TaskState::Cancelled {
        // do not execute if state is cancelled, will be dropped once all references disappear
        return;
    }

    let mut fut_slot = lock(&task.future);
    if let Some(mut fut) = fut_slot.take() {
        let waker = waker_ref(&task);
        let context = &mut Context::from_waker(&waker);
        match fut.as_mut().poll(context) {
            Poll::Pending => *fut_slot = Some(fut),
            Poll::Ready(()) => {
                trace!("task '{}' done", task.name);
                *lock(&task.state) = TaskState::Done;
            }
        }
    }
    // a completed task can still be woken by a trigger it left behind, nothing to do then
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    state: Mutex<TaskState>,
    name: String,
}

impl Task {
    pub fn fork<T: Send + 'static>(
        future: impl Future<Output = T> + Send + 'static,
    ) -> JoinHandle<T> {
        Task::spawn(future, "forked")
    }

    pub fn spawn<T: Send + 'static>(
        future: impl Future<Output = T> + Send + 'static,
        name: &str,
    ) -> JoinHandle<T> {
        let (task, join_handle) = Task::new(future, name);
        schedule_task(task);
        join_handle
    }

    fn new<T: Send + 'static>(
        future: impl Future<Output = T> + Send + 'static,
        name: &str,
    ) -> (Arc<Self>, JoinHandle<T>) {
        let (tx, rx) = oneshot::channel::<T>();
        let fut = async move {
            // the receiver may have been dropped already; the result is then of no interest
            let _ = tx.send(future.await);
        };
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut.boxed())),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
        });
        let join_handle = JoinHandle {
            join_rx: rx,
            awaited_task: task.clone(),
        };
        (task, join_handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_done(&self) -> bool {
        *lock(&self.state) == TaskState::Done
    }

    pub fn cancel(&self) {
        // set state to Cancelled, Executor will drop the Task without execution on callback
        *lock(&self.state) = TaskState::Cancelled;
        // drop the future right away unless it is cancelling itself while being polled
        if let Ok(mut slot) = self.future.try_lock() {
            slot.take();
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.clone());
    }
}

pub struct JoinHandle<T> {
    awaited_task: Arc<Task>,
    join_rx: oneshot::Receiver<T>,
}

impl<T> JoinHandle<T> {
    pub fn cancel(self) {
        self.awaited_task.cancel();
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.awaited_task
    }

    pub fn try_result(&mut self) -> Option<TbResult<T>> {
        match self.join_rx.try_recv() {
            Ok(Some(val)) => Some(Ok(val)),
            Ok(None) => None,
            Err(_) => Some(Err(TbError::TaskCancelled)),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = TbResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(result) => Poll::Ready(result.map_err(|_| TbError::TaskCancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_forked_tasks_in_order() {
        clear_ready_queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let mut a = Task::fork(async move {
            l1.lock().unwrap().push(1);
            1
        });
        let mut b = Task::spawn(
            async move {
                l2.lock().unwrap().push(2);
                2
            },
            "second",
        );
        assert_eq!(b.task().name(), "second");
        assert!(a.try_result().is_none());
        run_once();
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(a.try_result(), Some(Ok(1)));
        assert_eq!(b.try_result(), Some(Ok(2)));
    }

    #[test]
    fn cancelled_task_never_runs() {
        clear_ready_queue();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let handle = Task::fork(async move {
            *flag.lock().unwrap() = true;
        });
        let task = handle.task().clone();
        handle.cancel();
        run_once();
        assert!(!*ran.lock().unwrap());
        assert!(!task.is_done());
    }

    #[test]
    fn join_reports_cancellation() {
        clear_ready_queue();
        let mut handle = Task::fork(async { 5 });
        handle.task().cancel();
        run_once();
        assert_eq!(handle.try_result(), Some(Err(TbError::TaskCancelled)));
    }
}
