//! Bounded worker pool running remote calls off the caller's task.
//!
//! A fixed number of workers pull jobs from one shared queue. Submission
//! never waits; only awaiting the returned [`Pending`] does. Closing the
//! executor stops intake, lets every accepted job finish, and rejects
//! anything submitted afterwards with [`ClientError::ExecutorClosed`].

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::response::Response;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug)]
pub struct Executor {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    pool_size: usize,
}

impl Executor {
    /// Spawn `pool_size` workers on the current tokio runtime.
    pub fn open(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..pool_size)
            .map(|id| tokio::spawn(worker_loop(id, queue.clone())))
            .collect();

        info!(pool_size, "Executor opened");
        Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(workers),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Queue a unit of work; the returned future resolves to its outcome.
    pub fn submit<T, F>(&self, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(run_guarded(work).await);
        });

        if !self.enqueue(job) {
            return Pending::rejected();
        }
        Pending { receiver: rx }
    }

    /// Queue a unit of work and hand its outcome to `callback` exactly once.
    ///
    /// The callback runs on the worker that executed the work. If the
    /// executor is closed the callback is invoked immediately with a failure.
    pub fn submit_with<T, F, C>(&self, work: F, callback: C)
    where
        T: Send + 'static,
        F: Future<Output = ClientResult<T>> + Send + 'static,
        C: FnOnce(Response<T>) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(callback)));
        let in_job = slot.clone();
        let job: Job = Box::pin(async move {
            let response = run_guarded(work).await;
            let callback = in_job.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(callback) = callback {
                callback(response);
            }
        });

        if !self.enqueue(job) {
            let callback = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(callback) = callback {
                callback(Response::failure(ClientError::ExecutorClosed));
            }
        }
    }

    /// Stop accepting work and wait for every accepted job to finish.
    pub async fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            debug!("Executor already closed");
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Executor worker ended abnormally: {}", e);
            }
        }
        info!("Executor closed");
    }

    fn enqueue(&self, job: Job) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => {
                debug!("Rejected work submitted after shutdown");
                false
            }
        }
    }
}

async fn worker_loop(id: usize, queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else { break };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!(worker = id, "Callback panicked on executor worker");
        }
    }
    debug!(worker = id, "Executor worker drained");
}

async fn run_guarded<T, F>(work: F) -> Response<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome.into(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Unit of work panicked: {}", message);
            Response::failure(ClientError::WorkerPanic(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Outcome of a submitted unit of work.
#[derive(Debug)]
pub struct Pending<T> {
    receiver: oneshot::Receiver<Response<T>>,
}

impl<T> Pending<T> {
    fn rejected() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Response::failure(ClientError::ExecutorClosed));
        Self { receiver: rx }
    }

    /// Deliver the outcome to `callback` once it is ready, without blocking
    /// the caller or occupying a worker while waiting.
    pub fn on_complete<C>(self, callback: C)
    where
        T: Send + 'static,
        C: FnOnce(Response<T>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.await) });
    }
}

impl<T> Future for Pending<T> {
    type Output = Response<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(response),
            // The job was dropped without running, e.g. the runtime shut down.
            Poll::Ready(Err(_)) => Poll::Ready(Response::failure(ClientError::ExecutorClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
