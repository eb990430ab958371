use crate::error::{KefError, Result};
use std::time::Duration;
use tokio::sync::oneshot;

/// Gap between the volume query and the source query. Asking for the source
/// straight after the volume returns a stale input.
pub(crate) const INTER_QUERY_DELAY: Duration = Duration::from_millis(300);

/// Phase of a single-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Started; its delayed step has not run yet
    InProgress,
    /// Final step running; cleared once it returns
    Completing,
}

/// Guarantees at most one instance of an operation is active
#[derive(Debug, Default)]
pub struct SingleFlight {
    phase: Phase,
}

impl SingleFlight {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Claim the flight. Returns `false` if one is already active.
    pub fn try_begin(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::InProgress;
        true
    }

    /// Move an in-progress flight into its final step
    pub fn complete(&mut self) -> bool {
        if self.phase != Phase::InProgress {
            return false;
        }
        self.phase = Phase::Completing;
        true
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
    }
}

type Waiter = oneshot::Sender<Result<()>>;

/// Drives the "volume, wait, source" state query
///
/// The sequencer only tracks phases and the caller waiting on the result;
/// the session performs the writes and owns the delay timer.
#[derive(Debug, Default)]
pub(crate) struct PollSequencer {
    flight: SingleFlight,
    waiter: Option<Waiter>,
}

impl PollSequencer {
    pub fn phase(&self) -> Phase {
        self.flight.phase()
    }

    /// Start a sequence. On refusal the waiter is handed back with the reason.
    pub fn begin(&mut self, waiter: Option<Waiter>) -> std::result::Result<(), Option<Waiter>> {
        if !self.flight.try_begin() {
            return Err(waiter);
        }
        self.waiter = waiter;
        Ok(())
    }

    /// The inter-query delay elapsed. Returns `false` for a stale timer.
    pub fn second_step(&mut self) -> bool {
        self.flight.complete()
    }

    /// End the sequence and report its outcome to the waiter, if any
    pub fn finish(&mut self, result: Result<()>) {
        self.flight.finish();
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(result);
        }
    }

    /// Abandon an in-flight sequence because the connection went away
    pub fn abort(&mut self) {
        if !self.flight.is_idle() {
            self.finish(Err(KefError::ConnectionClosed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_phases() {
        let mut flight = SingleFlight::default();
        assert_eq!(flight.phase(), Phase::Idle);
        assert!(!flight.complete());

        assert!(flight.try_begin());
        assert_eq!(flight.phase(), Phase::InProgress);
        assert!(!flight.try_begin());

        assert!(flight.complete());
        assert_eq!(flight.phase(), Phase::Completing);
        assert!(!flight.try_begin());
        assert!(!flight.complete());

        flight.finish();
        assert!(flight.is_idle());
        assert!(flight.try_begin());
    }

    #[test]
    fn second_begin_is_refused_and_waiter_returned() {
        let mut poll = PollSequencer::default();
        assert!(poll.begin(None).is_ok());

        let (tx, _rx) = oneshot::channel();
        let refused = poll.begin(Some(tx)).unwrap_err();
        assert!(refused.is_some());
        assert_eq!(poll.phase(), Phase::InProgress);
    }

    #[tokio::test]
    async fn finish_reports_to_waiter() {
        let mut poll = PollSequencer::default();
        let (tx, rx) = oneshot::channel();
        poll.begin(Some(tx)).unwrap();
        assert!(poll.second_step());
        assert_eq!(poll.phase(), Phase::Completing);
        poll.finish(Ok(()));
        assert_eq!(poll.phase(), Phase::Idle);
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn abort_fails_the_waiter() {
        let mut poll = PollSequencer::default();
        let (tx, rx) = oneshot::channel();
        poll.begin(Some(tx)).unwrap();
        poll.abort();
        assert_eq!(poll.phase(), Phase::Idle);
        assert!(matches!(rx.await.unwrap(), Err(KefError::ConnectionClosed)));
    }

    #[test]
    fn stale_second_step_is_ignored() {
        let mut poll = PollSequencer::default();
        assert!(!poll.second_step());
        poll.begin(None).unwrap();
        poll.abort();
        assert!(!poll.second_step());
    }
}
