use embedded_hal::blocking::delay::DelayMs;

use crate::acquire::{CancelToken, Outcome, SensorReader};
use crate::sensor::HygroThermometer;

/// Repeats single acquisitions on behalf of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub interval_ms: u32,
    /// Stop after this many acquisitions. `None` keeps going until cancelled.
    pub limit: Option<u32>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSummary {
    pub successes: u32,
    pub failures: u32,
    pub cancelled: bool,
}

impl SampleSummary {
    pub fn total(&self) -> u32 {
        self.successes + self.failures
    }
}

impl Sampler {
    pub fn every(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Acquire until the limit is reached or `cancel` fires, handing every outcome to `sink`.
    ///
    /// The sink runs before the interval wait, so it may cancel to stop the loop early.
    pub fn run<S, D, F>(
        &self,
        reader: &mut SensorReader<S, D>,
        cancel: &CancelToken,
        mut sink: F,
    ) -> SampleSummary
    where
        S: HygroThermometer<D>,
        D: DelayMs<u32>,
        F: FnMut(&Outcome),
    {
        let mut summary = SampleSummary::default();

        loop {
            if self.limit.is_some_and(|limit| summary.total() >= limit) {
                break;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let outcome = reader.acquire(cancel);
            sink(&outcome);
            match outcome {
                Outcome::Success(_) => summary.successes += 1,
                Outcome::Failure(_) => summary.failures += 1,
                Outcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
            }

            let done = self.limit.is_some_and(|limit| summary.total() >= limit);
            if !done && !cancel.is_cancelled() {
                reader.delay_mut().delay_ms(self.interval_ms);
            }
        }

        log::info!(
            "Sampling stopped: {} ok, {} failed, cancelled: {}",
            summary.successes,
            summary.failures,
            summary.cancelled
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::tests::ScriptedSensor;
    use crate::acquire::RetryPolicy;
    use crate::sensor::tests::FakeDelay;
    use crate::sensor::{RawMeasurement, ReadError};
    use alloc::vec::Vec;

    #[test]
    fn runs_until_limit_waiting_between_samples() {
        let script = [
            Ok(RawMeasurement::new(50.0, 20.0)),
            Err(ReadError::Timeout),
            Ok(RawMeasurement::new(52.0, 20.5)),
        ];
        let mut reader = SensorReader::with_retry(
            ScriptedSensor::new(script),
            FakeDelay::default(),
            RetryPolicy::new(1, 0),
        );
        let mut seen = Vec::new();

        let summary = Sampler::every(1_000).limit(3).run(&mut reader, &CancelToken::new(), |o| {
            seen.push(o.is_success())
        });

        assert_eq!(
            summary,
            SampleSummary {
                successes: 2,
                failures: 1,
                cancelled: false
            }
        );
        assert_eq!(seen, [true, false, true]);
        assert_eq!(reader.delay_mut().total_us, 2 * 1_000 * 1_000);
        assert_eq!(reader.sensor().releases, 3);
    }

    #[test]
    fn sink_can_cancel_the_loop() {
        let script = (0..10).map(|_| Ok(RawMeasurement::new(45.0, 21.0)));
        let mut reader = SensorReader::with_retry(
            ScriptedSensor::new(script),
            FakeDelay::default(),
            RetryPolicy::new(1, 0),
        );
        let cancel = CancelToken::new();
        let mut calls = 0;

        let summary = Sampler::every(500).run(&mut reader, &cancel, |_| {
            calls += 1;
            if calls == 4 {
                cancel.cancel();
            }
        });

        assert_eq!(summary.successes, 4);
        assert!(summary.cancelled);
        assert_eq!(reader.delay_mut().total_us, 3 * 500 * 1_000);
    }

    #[test]
    fn already_cancelled_token_acquires_nothing() {
        let mut reader = SensorReader::new(ScriptedSensor::new([]), FakeDelay::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        let summary = Sampler::default().run(&mut reader, &cancel, |_| {});

        assert_eq!(summary.total(), 0);
        assert!(summary.cancelled);
        assert_eq!(reader.sensor().reads, 0);
    }
}
