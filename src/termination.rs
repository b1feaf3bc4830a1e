use std::time::Duration;

use serde::Serialize;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Stagnation,
    FellOver,
    PolicyFault,
    TimeLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Fallen(Duration),
    Complete(TerminationReason),
}

/// Decides when a trial is over. Times are simulated time since the start.
#[derive(Clone, Debug)]
pub struct RunTerminator {
    stagnation_timeout: Duration,
    fall_grace: Duration,
    max_duration: Duration,
    state: RunState,
    best_fitness: f32,
    last_progress: Duration,
    fall_time: Option<Duration>,
}

impl RunTerminator {
    pub fn new(stagnation_timeout: Duration, fall_grace: Duration, max_duration: Duration) -> Self {
        Self {
            stagnation_timeout,
            fall_grace,
            max_duration,
            state: RunState::Running,
            best_fitness: 0.0,
            last_progress: Duration::ZERO,
            fall_time: None,
        }
    }

    /// Advances the clock. Progress means fitness strictly increased.
    pub fn update(&mut self, now: Duration, fitness: f32) {
        if fitness > self.best_fitness {
            self.best_fitness = fitness;
            self.last_progress = now;
        }
        match self.state {
            RunState::Complete(_) => {}
            RunState::Fallen(fell_at) => {
                if now.saturating_sub(fell_at) >= self.fall_grace {
                    self.complete(TerminationReason::FellOver);
                } else if now >= self.max_duration {
                    self.complete(TerminationReason::TimeLimit);
                }
            }
            RunState::Running => {
                if now.saturating_sub(self.last_progress) >= self.stagnation_timeout {
                    debug!(
                        "no progress for {:.2}s; stopping",
                        now.saturating_sub(self.last_progress).as_secs_f32()
                    );
                    self.complete(TerminationReason::Stagnation);
                } else if now >= self.max_duration {
                    self.complete(TerminationReason::TimeLimit);
                }
            }
        }
    }

    /// Records the first fall; later falls are ignored.
    pub fn fall(&mut self, now: Duration) {
        if self.state == RunState::Running {
            debug!("upper body down at {:.2}s", now.as_secs_f32());
            self.fall_time = Some(now);
            self.state = RunState::Fallen(now);
        }
    }

    pub fn fail(&mut self) {
        if !self.is_complete() {
            self.complete(TerminationReason::PolicyFault);
        }
    }

    fn complete(&mut self, reason: TerminationReason) {
        self.state = RunState::Complete(reason);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, RunState::Complete(_))
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        match self.state {
            RunState::Complete(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn fall_time(&self) -> Option<Duration> {
        self.fall_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(20);

    fn terminator(stagnation_ms: u64, grace_ms: u64) -> RunTerminator {
        RunTerminator::new(
            Duration::from_millis(stagnation_ms),
            Duration::from_millis(grace_ms),
            Duration::from_secs(600),
        )
    }

    fn run_until_complete(
        terminator: &mut RunTerminator,
        mut on_step: impl FnMut(&mut RunTerminator, Duration),
    ) -> Duration {
        let mut now = Duration::ZERO;
        loop {
            on_step(terminator, now);
            terminator.update(now, 0.0);
            if terminator.is_complete() {
                return now;
            }
            now += STEP;
        }
    }

    #[test]
    fn stalls_out_after_stagnation_timeout() {
        let mut terminator = terminator(2000, 500);
        let done = run_until_complete(&mut terminator, |_, _| {});
        assert_eq!(done, Duration::from_millis(2000));
        assert_eq!(terminator.reason(), Some(TerminationReason::Stagnation));
    }

    #[test]
    fn grace_period_counts_from_first_fall() {
        let mut terminator = terminator(5000, 500);
        let done = run_until_complete(&mut terminator, |terminator, now| {
            if now == Duration::from_millis(500) || now == Duration::from_millis(700) {
                terminator.fall(now);
            }
        });
        assert_eq!(done, Duration::from_millis(1000));
        assert_eq!(terminator.reason(), Some(TerminationReason::FellOver));
        assert_eq!(terminator.fall_time(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn progress_postpones_stagnation() {
        let mut terminator = terminator(1000, 500);
        terminator.update(Duration::ZERO, 0.0);
        terminator.update(Duration::from_millis(800), 0.4);
        terminator.update(Duration::from_millis(1600), 0.4);
        assert!(!terminator.is_complete());
        terminator.update(Duration::from_millis(1800), 0.4);
        assert_eq!(terminator.reason(), Some(TerminationReason::Stagnation));
    }

    #[test]
    fn fallen_body_is_not_stopped_by_stagnation() {
        let mut terminator = terminator(100, 1000);
        terminator.fall(Duration::from_millis(40));
        terminator.update(Duration::from_millis(500), 0.0);
        assert_eq!(terminator.state(), RunState::Fallen(Duration::from_millis(40)));
    }

    #[test]
    fn complete_is_terminal() {
        let mut terminator = terminator(100, 100);
        terminator.fail();
        terminator.fall(Duration::from_millis(10));
        terminator.update(Duration::from_millis(500), 5.0);
        assert_eq!(terminator.reason(), Some(TerminationReason::PolicyFault));
        assert_eq!(terminator.fall_time(), None);
    }

    #[test]
    fn time_limit_caps_progressing_runs() {
        let mut terminator = RunTerminator::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );
        let mut now = Duration::ZERO;
        let mut fitness = 0.0;
        while !terminator.is_complete() {
            fitness += 0.01;
            terminator.update(now, fitness);
            now += STEP;
        }
        assert_eq!(terminator.reason(), Some(TerminationReason::TimeLimit));
    }
}
