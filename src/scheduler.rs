use crate::models::TimeSlot;
use crate::providers::{JobOutcome, Provider};
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Where the loop currently is. `Idle` only before the first and after the
/// last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Waiting(TimeSlot),
    Running(TimeSlot),
}

/// Drives one provider: wake at every period boundary plus the provider's
/// delay, run the fetch-job for that boundary, repeat.
///
/// Jobs run one at a time. A boundary that passes while a job is still
/// running is skipped, never caught up.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    max_ticks: Option<u64>,
    state: LoopState,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_ticks: None,
            state: LoopState::Idle,
        }
    }

    /// Stop after this many completed ticks instead of running forever.
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Next slot after `now` and how long to sleep before fetching it.
    pub fn next_wakeup(now: i64, frequency: u64, delay: u64) -> (TimeSlot, Duration) {
        let slot = TimeSlot::following(now, frequency);
        let wait = slot.seconds_from(now) + delay;
        (slot, Duration::from_secs(wait))
    }

    /// Run ticks until `max_ticks` is reached. Returns the number of ticks
    /// completed.
    pub async fn run<P>(&mut self, provider: &mut P) -> u64
    where
        P: Provider + ?Sized,
    {
        let settings = provider.settings().clone();
        info!(
            service = %settings.service,
            frequency = settings.frequency,
            delay = settings.delay,
            "Starting provider loop"
        );

        let mut ticks: u64 = 0;
        let mut stored: u64 = 0;

        while self.max_ticks.map_or(true, |max| ticks < max) {
            let (slot, wait) = Self::next_wakeup(self.clock.now(), settings.frequency, settings.delay);
            self.state = LoopState::Waiting(slot);
            info!(
                service = %settings.service,
                %slot,
                wait_secs = wait.as_secs(),
                "Next download scheduled"
            );
            tokio::time::sleep(wait).await;

            self.state = LoopState::Running(slot);
            let started = Instant::now();
            let outcome = provider.fetch_job(slot).await;
            ticks += 1;
            if let JobOutcome::Stored { .. } = outcome {
                stored += 1;
            }

            info!(
                service = %settings.service,
                %slot,
                elapsed_secs = started.elapsed().as_secs_f64(),
                ticks,
                stored,
                "Tick finished"
            );
        }

        self.state = LoopState::Idle;
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectorError, Result};
    use crate::providers::ProviderSettings;
    use crate::utils::MonotonicClock;
    use async_trait::async_trait;

    const START: i64 = 1_700_000_123;

    /// Records when each slot was fetched, in clock seconds.
    struct Recorder {
        settings: ProviderSettings,
        clock: Arc<MonotonicClock>,
        calls: Vec<(TimeSlot, i64)>,
        job_duration: Duration,
        fail_every_other: bool,
    }

    impl Recorder {
        fn new(clock: Arc<MonotonicClock>) -> Self {
            Self {
                settings: ProviderSettings::new("RECORDER", 600, 5, std::env::temp_dir()),
                clock,
                calls: Vec::new(),
                job_duration: Duration::ZERO,
                fail_every_other: false,
            }
        }
    }

    #[async_trait]
    impl Provider for Recorder {
        fn settings(&self) -> &ProviderSettings {
            &self.settings
        }

        async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome> {
            self.calls.push((slot, self.clock.now()));
            tokio::time::sleep(self.job_duration).await;

            if self.fail_every_other {
                match self.calls.len() % 2 {
                    1 => panic!("flaky upstream"),
                    _ => return Err(CollectorError::MissingData("flaky upstream".to_string())),
                }
            }
            Ok(JobOutcome::Stored {
                key: slot.to_string(),
                bytes: 0,
            })
        }
    }

    #[test]
    fn test_next_wakeup() {
        let (slot, wait) = Scheduler::next_wakeup(START, 600, 5);
        assert_eq!(slot.timestamp(), 1_700_000_400);
        assert_eq!(wait, Duration::from_secs(282));

        // Exactly on a boundary waits a full period
        let (slot, wait) = Scheduler::next_wakeup(1_700_000_400, 600, 0);
        assert_eq!(slot.timestamp(), 1_700_001_000);
        assert_eq!(wait, Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_exactly_n_aligned_ticks() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut recorder = Recorder::new(clock.clone());
        let mut scheduler = Scheduler::new(clock.clone()).with_max_ticks(Some(3));

        let ticks = scheduler.run(&mut recorder).await;

        assert_eq!(ticks, 3);
        assert_eq!(
            recorder.calls,
            vec![
                (TimeSlot::new(1_700_000_400, 600).unwrap(), 1_700_000_405),
                (TimeSlot::new(1_700_001_000, 600).unwrap(), 1_700_001_005),
                (TimeSlot::new(1_700_001_600, 600).unwrap(), 1_700_001_605),
            ]
        );
        assert_eq!(scheduler.state(), LoopState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_jobs_do_not_stop_the_loop() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut recorder = Recorder::new(clock.clone());
        recorder.fail_every_other = true;
        let mut scheduler = Scheduler::new(clock).with_max_ticks(Some(4));

        assert_eq!(scheduler.run(&mut recorder).await, 4);
        assert_eq!(recorder.calls.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_job_skips_missed_boundaries() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut recorder = Recorder::new(clock.clone());
        recorder.job_duration = Duration::from_secs(700);
        let mut scheduler = Scheduler::new(clock).with_max_ticks(Some(2));

        scheduler.run(&mut recorder).await;

        let slots: Vec<i64> = recorder.calls.iter().map(|(slot, _)| slot.timestamp()).collect();
        assert_eq!(slots, vec![1_700_000_400, 1_700_001_600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_between_ticks_is_waiting_for_next_slot() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut recorder = Recorder::new(clock.clone());
        let mut scheduler = Scheduler::new(clock);
        assert_eq!(scheduler.state(), LoopState::Idle);

        // First tick runs 282 s in, then the loop waits for the next boundary
        let interrupted =
            tokio::time::timeout(Duration::from_secs(400), scheduler.run(&mut recorder)).await;

        assert!(interrupted.is_err());
        assert_eq!(recorder.calls.len(), 1);
        assert_eq!(
            scheduler.state(),
            LoopState::Waiting(TimeSlot::new(1_700_001_000, 600).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_during_job_is_running() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut recorder = Recorder::new(clock.clone());
        recorder.job_duration = Duration::from_secs(100);
        let mut scheduler = Scheduler::new(clock);

        let interrupted =
            tokio::time::timeout(Duration::from_secs(300), scheduler.run(&mut recorder)).await;

        assert!(interrupted.is_err());
        assert_eq!(
            scheduler.state(),
            LoopState::Running(TimeSlot::new(1_700_000_400, 600).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_boxed_providers() {
        let clock = Arc::new(MonotonicClock::starting_at(START));
        let mut provider: Box<dyn Provider> = Box::new(Recorder::new(clock.clone()));
        let mut scheduler = Scheduler::new(clock).with_max_ticks(Some(1));

        assert_eq!(scheduler.run(provider.as_mut()).await, 1);
    }
}
