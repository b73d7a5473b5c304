//! AutoScalingController (C9): samples request-rate/latency and emits
//! scaling intents (§4.11).
//!
//! Samples per-interval `(rps, p95_ms)` pairs into a fixed-size ring buffer
//! sized to cover `sustain_duration`/`cool_down`; `sample()` is the only
//! entry point and returns an intent without ever touching worker count
//! itself — `ClusterSupervisor::apply_intent` is the sole mutator (§5).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::AutoScaleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleIntent {
    ScaleOut(usize),
    ScaleIn(usize),
    Hold,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: Instant,
    rps: f64,
    p95_ms: f64,
}

pub struct AutoScalingController {
    config: AutoScaleConfig,
    history: VecDeque<Observation>,
}

impl AutoScalingController {
    pub fn new(config: AutoScaleConfig) -> Self {
        Self { config, history: VecDeque::new() }
    }

    fn push(&mut self, observation: Observation) {
        self.history.push_back(observation);
        let horizon = self.config.sustain_duration.max(self.config.cool_down);
        while let Some(front) = self.history.front() {
            if observation.at.duration_since(front.at) > horizon {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// A condition is "sustained for `since`" only once the retained history
    /// actually spans at least `since` — a single fresh sample (age ~0) must
    /// never count, or the very first observation over threshold would read
    /// as sustained. Requires the oldest retained observation to be at least
    /// `since` old, and every observation within the trailing `since` window
    /// to satisfy `predicate`.
    fn sustained_over(&self, since: Duration, now: Instant, predicate: impl Fn(&Observation) -> bool) -> bool {
        let oldest = match self.history.front() {
            Some(observation) => observation,
            None => return false,
        };
        if now.duration_since(oldest.at) < since {
            return false;
        }

        for observation in self.history.iter().rev() {
            if now.duration_since(observation.at) > since {
                break;
            }
            if !predicate(observation) {
                return false;
            }
        }
        true
    }

    /// Record one `(rps, p95_ms)` sample for the current interval and
    /// produce the resulting intent. `current_workers` bounds the emitted
    /// delta so the controller never proposes exceeding `[minWorkers,
    /// maxWorkers]` itself, even though enforcement of that bound is
    /// `ClusterSupervisor`'s job too (defense in depth, not a contradiction).
    pub fn sample(&mut self, rps: f64, p95_ms: f64, current_workers: usize) -> ScaleIntent {
        let now = Instant::now();
        self.push(Observation { at: now, rps, p95_ms });

        let over_upper = self.sustained_over(self.config.sustain_duration, now, |o| {
            o.rps > self.config.upper_rps || o.p95_ms > self.config.upper_p95_ms
        });
        if over_upper && current_workers < self.config.max_workers {
            return ScaleIntent::ScaleOut(1);
        }

        let under_lower = self.sustained_over(self.config.cool_down, now, |o| {
            o.rps < self.config.lower_rps && o.p95_ms < self.config.lower_p95_ms
        });
        if under_lower && current_workers > self.config.min_workers {
            return ScaleIntent::ScaleIn(1);
        }

        ScaleIntent::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AutoScaleConfig {
        AutoScaleConfig {
            min_workers: 1,
            max_workers: 4,
            upper_rps: 100.0,
            lower_rps: 10.0,
            upper_p95_ms: 200.0,
            lower_p95_ms: 50.0,
            sample_interval: Duration::from_millis(1),
            sustain_duration: Duration::from_millis(5),
            cool_down: Duration::from_millis(5),
        }
    }

    #[test]
    fn single_sample_never_scales_out_immediately_without_sustain() {
        let mut controller = AutoScalingController::new(config());
        assert_eq!(controller.sample(500.0, 500.0, 2), ScaleIntent::Hold);
    }

    #[test]
    fn sustained_high_load_scales_out() {
        let mut controller = AutoScalingController::new(config());
        controller.sample(500.0, 500.0, 2);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(controller.sample(500.0, 500.0, 2), ScaleIntent::ScaleOut(1));
    }

    #[test]
    fn never_scales_out_past_max_workers() {
        let mut controller = AutoScalingController::new(config());
        controller.sample(500.0, 500.0, 4);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(controller.sample(500.0, 500.0, 4), ScaleIntent::Hold);
    }

    #[test]
    fn sustained_low_load_scales_in() {
        let mut controller = AutoScalingController::new(config());
        controller.sample(1.0, 5.0, 2);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(controller.sample(1.0, 5.0, 2), ScaleIntent::ScaleIn(1));
    }

    #[test]
    fn never_scales_in_past_min_workers() {
        let mut controller = AutoScalingController::new(config());
        controller.sample(1.0, 5.0, 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(controller.sample(1.0, 5.0, 1), ScaleIntent::Hold);
    }
}
