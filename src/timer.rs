use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Delayed work owned by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Retry a closed connection
    Reconnect,
    /// Send the source query of an in-flight state check
    PollSecondStep,
    /// Re-check state after the speaker reported it is powering on
    SettleRecheck,
    /// Query the source after a power-off command
    PostOffQuery,
    /// Periodic state check
    PeriodicPoll,
}

/// A timer that went off, tagged with the epoch it was scheduled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fired {
    pub epoch: u64,
    pub kind: TimerKind,
}

/// Cancellable timers whose firings are delivered back over a channel
///
/// Cancelling bumps the epoch and aborts every outstanding task. A firing that
/// was already queued before cancellation still arrives, so receivers must
/// check [`Scheduler::is_current`].
pub(crate) struct Scheduler {
    epoch: u64,
    tx: mpsc::UnboundedSender<Fired>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(tx: mpsc::UnboundedSender<Fired>) -> Self {
        Self {
            epoch: 0,
            tx,
            tasks: Vec::new(),
        }
    }

    pub fn is_current(&self, fired: &Fired) -> bool {
        fired.epoch == self.epoch
    }

    /// Fire `kind` once after `delay`
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        let fired = Fired {
            epoch: self.epoch,
            kind,
        };
        let tx = self.tx.clone();
        self.track(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(fired);
        }));
    }

    /// Fire `kind` every `period`, first after one full period
    pub fn repeat(&mut self, kind: TimerKind, period: Duration) {
        let fired = Fired {
            epoch: self.epoch,
            kind,
        };
        let tx = self.tx.clone();
        self.track(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(fired).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn cancel_all(&mut self) {
        self.epoch += 1;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
