//! Background polling of one installed filter.
//!
//! A watch moves from `Polling` to either `Cancelled` (caller request,
//! filter uninstalled afterwards) or `Failed` (a poll call failed, filter
//! left installed). Polls are strictly sequential: the next one is only
//! scheduled after the previous result has been handled and the poll
//! interval has elapsed.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::ethereum::gateway::RpcGateway;
use crate::ethereum::{FilterHandle, FilterId};
use crate::executor::Executor;
use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Cancelled,
    Failed,
}

impl WatchState {
    pub fn is_running(&self) -> bool {
        matches!(self, WatchState::Polling)
    }
}

/// Handle to a running watch. Dropping it cancels the watch.
#[derive(Debug)]
pub struct FilterWatch {
    handle: FilterHandle,
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<WatchState>,
}

struct PollLoop<P, C> {
    executor: Arc<Executor>,
    gateway: Arc<dyn RpcGateway>,
    handle: FilterHandle,
    interval: Duration,
    poll: P,
    callback: C,
    cancel_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<WatchState>,
}

impl FilterWatch {
    /// Start polling an already installed filter.
    ///
    /// Every poll runs as a unit of work on `executor`. `callback` receives
    /// one successful response per non-empty batch and at most one failure.
    pub fn start<E, P, Fut, C>(
        executor: Arc<Executor>,
        gateway: Arc<dyn RpcGateway>,
        handle: FilterHandle,
        interval: Duration,
        poll: P,
        callback: C,
    ) -> Self
    where
        E: Send + 'static,
        P: Fn(FilterId) -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<Vec<E>>> + Send + 'static,
        C: FnMut(Response<Vec<E>>) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WatchState::Polling);

        let poll_loop = PollLoop {
            executor,
            gateway,
            handle: handle.clone(),
            interval,
            poll,
            callback,
            cancel_rx,
            state_tx,
        };
        tokio::spawn(poll_loop.run());

        Self {
            handle,
            cancel_tx,
            state_rx,
        }
    }

    pub fn handle(&self) -> &FilterHandle {
        &self.handle
    }

    pub fn state(&self) -> WatchState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Request cancellation. A poll already in flight may still complete;
    /// no new poll starts once the request is observed.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Wait until the watch has stopped, including filter cleanup after a cancel.
    pub async fn stopped(&self) -> WatchState {
        let mut state_rx = self.state_rx.clone();
        if let Ok(state) = state_rx.wait_for(|state| !state.is_running()).await {
            return *state;
        }
        let state = *state_rx.borrow();
        state
    }

    /// Cancel and wait for the filter to be uninstalled.
    pub async fn cancel_and_wait(&self) -> WatchState {
        self.cancel();
        self.stopped().await
    }
}

fn cancellation_requested(cancel_rx: &watch::Receiver<bool>) -> bool {
    // a dropped FilterWatch counts as a cancel
    *cancel_rx.borrow() || cancel_rx.has_changed().is_err()
}

impl<E, P, Fut, C> PollLoop<P, C>
where
    E: Send + 'static,
    P: Fn(FilterId) -> Fut + Send + 'static,
    Fut: Future<Output = ClientResult<Vec<E>>> + Send + 'static,
    C: FnMut(Response<Vec<E>>) + Send + 'static,
{
    async fn run(mut self) {
        let filter_id = self.handle.id.clone();
        info!(%filter_id, kind = %self.handle.kind, "Filter watch started");

        let mut tick: u64 = 0;
        loop {
            if cancellation_requested(&self.cancel_rx) {
                break;
            }

            tick += 1;
            let poll = (self.poll)(filter_id.clone());
            let response = self.executor.submit(poll).await;
            match response.into_result() {
                Ok(events) if events.is_empty() => {
                    debug!(%filter_id, tick, "Empty poll");
                }
                Ok(events) => {
                    debug!(%filter_id, tick, count = events.len(), "Delivering filter changes");
                    self.deliver(Response::success(events));
                }
                Err(e) => {
                    warn!(%filter_id, tick, "Filter poll failed, stopping watch: {}", e);
                    self.deliver(Response::failure(ClientError::poll(&filter_id, e)));
                    self.state_tx.send_replace(WatchState::Failed);
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel_rx.changed() => {}
            }
        }

        uninstall(self.executor.clone(), self.gateway.clone(), filter_id.clone()).await;
        self.state_tx.send_replace(WatchState::Cancelled);
        info!(%filter_id, polls = tick, "Filter watch cancelled");
    }

    fn deliver(&mut self, response: Response<Vec<E>>) {
        let callback = &mut self.callback;
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(response))).is_err() {
            warn!(filter_id = %self.handle.id, "Filter watch callback panicked");
        }
    }
}

/// Best effort; failures are only logged.
async fn uninstall(executor: Arc<Executor>, gateway: Arc<dyn RpcGateway>, filter_id: FilterId) {
    let id = filter_id.clone();
    let outcome = executor
        .submit(async move { gateway.uninstall_filter(&id).await })
        .await;

    match outcome.into_result() {
        Ok(true) => debug!(%filter_id, "Filter uninstalled"),
        Ok(false) => warn!(%filter_id, "Node did not know the filter"),
        Err(e) => warn!(%filter_id, "Failed to uninstall filter: {}", e),
    }
}
