//! Pure state machine for the sync coordinator
//!
//! `Idle → Running → {Idle | Backoff} → Running | Cancelled`
//!
//! The machine owns no timers and does no I/O; the coordinator drives it
//! and schedules the delays it returns. Keeping the transitions pure makes
//! the retry behavior testable independently of tokio time.

use std::time::Duration;

use rand::Rng;

/// Coordinator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Backoff,
    Cancelled,
}

/// Capped exponential backoff: `base * 2^(n-1)`, bounded by `cap`.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base: Duration,
    cap: Duration,
}

impl BackoffSchedule {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base: Duration::from_millis(base_ms.max(1)), cap: Duration::from_millis(cap_ms) }
    }

    /// Delay before retry number `consecutive_failures` (1-based).
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.saturating_sub(1).min(31);
        let multiplier = 2u64.saturating_pow(shift);
        self.base.saturating_mul(u32::try_from(multiplier).unwrap_or(u32::MAX)).min(self.cap)
    }

    /// Delay with ±10% jitter so concurrent clients do not retry in step.
    pub fn jittered_delay(&self, consecutive_failures: u32) -> Duration {
        let raw = self.delay(consecutive_failures);
        let factor = rand::thread_rng().gen_range(0.9..=1.1);
        raw.mul_f64(factor).min(self.cap)
    }
}

/// The coordinator's drain state with backoff bookkeeping.
#[derive(Debug)]
pub struct SyncStateMachine {
    state: SyncState,
    consecutive_failures: u32,
    schedule: BackoffSchedule,
}

impl SyncStateMachine {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self { state: SyncState::Idle, consecutive_failures: 0, schedule }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Attempt to enter `Running`. Returns false when a cycle is already
    /// in flight (the trigger is a no-op) or the machine is cancelled.
    pub fn begin_cycle(&mut self) -> bool {
        match self.state {
            SyncState::Idle | SyncState::Backoff => {
                self.state = SyncState::Running;
                true
            }
            SyncState::Running | SyncState::Cancelled => false,
        }
    }

    /// Finish the running cycle. A clean cycle returns to `Idle`; any
    /// transient failure moves to `Backoff` and yields the next delay.
    pub fn complete_cycle(&mut self, had_transient_failures: bool) -> Option<Duration> {
        if self.state != SyncState::Running {
            return None;
        }
        if had_transient_failures {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.state = SyncState::Backoff;
            Some(self.schedule.jittered_delay(self.consecutive_failures))
        } else {
            self.consecutive_failures = 0;
            self.state = SyncState::Idle;
            None
        }
    }

    /// An online transition resets the backoff clock so the next trigger
    /// runs immediately.
    pub fn connectivity_restored(&mut self) {
        self.consecutive_failures = 0;
        if self.state == SyncState::Backoff {
            self.state = SyncState::Idle;
        }
    }

    pub fn cancel(&mut self) {
        self.state = SyncState::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> BackoffSchedule {
        BackoffSchedule::new(1_000, 300_000)
    }

    #[test]
    fn delay_doubles_until_cap() {
        let s = schedule();
        assert_eq!(s.delay(1), Duration::from_secs(1));
        assert_eq!(s.delay(2), Duration::from_secs(2));
        assert_eq!(s.delay(3), Duration::from_secs(4));
        assert_eq!(s.delay(9), Duration::from_secs(256));
        assert_eq!(s.delay(10), Duration::from_secs(300));
        assert_eq!(s.delay(40), Duration::from_secs(300));
    }

    #[test]
    fn jitter_stays_near_nominal() {
        let s = schedule();
        for _ in 0..32 {
            let d = s.jittered_delay(2);
            assert!(d >= Duration::from_millis(1_800));
            assert!(d <= Duration::from_millis(2_200));
        }
    }

    #[test]
    fn clean_cycle_returns_to_idle() {
        let mut machine = SyncStateMachine::new(schedule());
        assert!(machine.begin_cycle());
        assert_eq!(machine.state(), SyncState::Running);
        assert!(machine.complete_cycle(false).is_none());
        assert_eq!(machine.state(), SyncState::Idle);
    }

    #[test]
    fn concurrent_trigger_is_noop_while_running() {
        let mut machine = SyncStateMachine::new(schedule());
        assert!(machine.begin_cycle());
        assert!(!machine.begin_cycle());
    }

    #[test]
    fn transient_failures_escalate_backoff() {
        let mut machine = SyncStateMachine::new(schedule());

        machine.begin_cycle();
        let first = machine.complete_cycle(true).expect("backoff scheduled");
        machine.begin_cycle();
        let second = machine.complete_cycle(true).expect("backoff scheduled");

        assert_eq!(machine.state(), SyncState::Backoff);
        // nominal 1s vs 2s; jitter is only ±10%
        assert!(second > first);
    }

    #[test]
    fn online_transition_resets_backoff() {
        let mut machine = SyncStateMachine::new(schedule());
        machine.begin_cycle();
        machine.complete_cycle(true);

        machine.connectivity_restored();
        assert_eq!(machine.state(), SyncState::Idle);

        machine.begin_cycle();
        let delay = machine.complete_cycle(true).expect("backoff scheduled");
        assert!(delay <= Duration::from_millis(1_100));
    }

    #[test]
    fn cancelled_machine_rejects_cycles() {
        let mut machine = SyncStateMachine::new(schedule());
        machine.cancel();
        assert!(!machine.begin_cycle());
        assert_eq!(machine.state(), SyncState::Cancelled);
    }
}
