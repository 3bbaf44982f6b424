//! Event queue handle and cancellable timers
//!
//! [`Scheduler`] is the only way work gets back onto the event loop. Delayed
//! and periodic events, as well as async fetches, run as `tokio` tasks wrapped
//! in a [`ScheduledTask`]; dropping the handle aborts the task, so a torn-down
//! connection or a superseded puzzle can never deliver a late event.

use crate::core::events::ClientEvent;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receiving end of the client event queue
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Cloneable handle for posting to the client event queue
#[derive(Debug, Clone)]
pub struct Scheduler {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Scheduler {
    /// Create the event queue
    pub fn channel() -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }

    /// Post an event right away. Returns `false` once the loop has gone.
    pub fn post(&self, event: ClientEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Post `event` after `delay`
    pub fn after(&self, delay: Duration, event: ClientEvent) -> ScheduledTask {
        let events = self.events.clone();
        ScheduledTask::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        })
    }

    /// Post `make()` every `period`, first one `period` from now
    pub fn every<F>(&self, period: Duration, mut make: F) -> ScheduledTask
    where
        F: FnMut() -> ClientEvent + Send + 'static,
    {
        let events = self.events.clone();
        let period = period.max(Duration::from_millis(1));
        ScheduledTask::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(make()).is_err() {
                    break;
                }
            }
        })
    }

    /// Run `future` and post the event it resolves to
    pub fn spawn<F>(&self, future: F) -> ScheduledTask
    where
        F: Future<Output = ClientEvent> + Send + 'static,
    {
        let events = self.events.clone();
        ScheduledTask::spawn(async move {
            let event = future.await;
            let _ = events.send(event);
        })
    }
}

/// Handle to a spawned timer or fetch; aborts the task when dropped
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(future)),
        }
    }

    /// Cancel the task
    pub fn cancel(self) {
        drop(self);
    }

    /// Let the task run to completion on its own
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
