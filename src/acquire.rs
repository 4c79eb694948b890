use alloc::string::{String, ToString};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayMs;
use serde::Serialize;
use thiserror::Error;

use crate::reading::{to_pretty_json, Snapshot};
use crate::sensor::{HygroThermometer, ReadError, Release};

/// How hard a single acquisition tries before reporting that no data arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u8,
    backoff_ms: u32,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u8, backoff_ms: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_ms,
        }
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn backoff_ms(&self) -> u32 {
        self.backoff_ms
    }
}

impl Default for RetryPolicy {
    /// 15 attempts two seconds apart. The DHT chips need at least that long between reads.
    fn default() -> Self {
        Self::new(15, 2_000)
    }
}

/// Caller-side interrupt flag. Only plain loads and stores are used, which the
/// ESP32-C3 supports without atomic read-modify-write instructions.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoData,
    Hardware,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("error reading data from temperature sensor ({attempts} attempts, last: {last})")]
    NoData { attempts: u8, last: ReadError },
    #[error("sensor hardware failure: {0}")]
    Hardware(ReadError),
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::NoData { .. } => FailureKind::NoData,
            Failure::Hardware(_) => FailureKind::Hardware,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Failed(#[from] Failure),
    #[error("acquisition cancelled by caller")]
    Cancelled,
}

/// Terminal state of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Snapshot),
    Failure(Failure),
    Cancelled,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutcomeDocument<'a> {
    Snapshot(&'a Snapshot),
    Error { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> Result<Snapshot, AcquireError> {
        match self {
            Outcome::Success(snapshot) => Ok(snapshot),
            Outcome::Failure(failure) => Err(AcquireError::Failed(failure)),
            Outcome::Cancelled => Err(AcquireError::Cancelled),
        }
    }

    /// The snapshot array on success, otherwise a `{ "kind", "message" }` object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = match self {
            Outcome::Success(snapshot) => OutcomeDocument::Snapshot(snapshot),
            Outcome::Failure(failure) => OutcomeDocument::Error {
                kind: failure.kind(),
                message: failure.to_string(),
            },
            Outcome::Cancelled => OutcomeDocument::Error {
                kind: FailureKind::Cancelled,
                message: AcquireError::Cancelled.to_string(),
            },
        };
        to_pretty_json(&document)
    }
}

/// Releases the wrapped sensor when dropped, whichever way the acquisition ends.
struct Released<'a, S: Release>(&'a mut S);

impl<S: Release> Deref for Released<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.0
    }
}

impl<S: Release> DerefMut for Released<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.0
    }
}

impl<S: Release> Drop for Released<'_, S> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Reads one sensor and shapes the result into a [`Snapshot`].
pub struct SensorReader<S, D> {
    sensor: S,
    delay: D,
    retry: RetryPolicy,
}

impl<S, D> SensorReader<S, D>
where
    S: HygroThermometer<D>,
    D: DelayMs<u32>,
{
    pub fn new(sensor: S, delay: D) -> Self {
        Self::with_retry(sensor, delay, RetryPolicy::default())
    }

    pub fn with_retry(sensor: S, delay: D, retry: RetryPolicy) -> Self {
        Self {
            sensor,
            delay,
            retry,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn into_parts(self) -> (S, D) {
        (self.sensor, self.delay)
    }

    /// Perform one blocking acquisition.
    ///
    /// Transient read errors and half-empty measurements are retried according to the
    /// [`RetryPolicy`]. The sensor line is released exactly once before returning.
    pub fn acquire(&mut self, cancel: &CancelToken) -> Outcome {
        let mut sensor = Released(&mut self.sensor);
        let attempts = self.retry.attempts;
        let mut last = ReadError::Timeout;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                log::info!("Acquisition cancelled before attempt {}", attempt);
                return Outcome::Cancelled;
            }

            let result = sensor.read(&mut self.delay);
            if cancel.is_cancelled() {
                log::info!("Acquisition cancelled during attempt {}", attempt);
                return Outcome::Cancelled;
            }

            match result.and_then(|m| m.complete().ok_or(ReadError::Incomplete)) {
                Ok((humidity, temperature)) => {
                    log::debug!(
                        "Read {} C / {} % on attempt {}",
                        temperature,
                        humidity,
                        attempt
                    );
                    return Outcome::Success(Snapshot::new(temperature, humidity));
                }
                Err(err) if !err.is_transient() => {
                    log::warn!("Sensor read failed: {}", err);
                    return Outcome::Failure(Failure::Hardware(err));
                }
                Err(err) => {
                    log::debug!("Attempt {}/{} failed: {}", attempt, attempts, err);
                    last = err;
                }
            }

            if attempt < attempts {
                self.delay.delay_ms(self.retry.backoff_ms);
            }
        }

        log::warn!("No data from sensor after {} attempts", attempts);
        Outcome::Failure(Failure::NoData { attempts, last })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reading::Reading;
    use crate::sensor::tests::FakeDelay;
    use crate::sensor::RawMeasurement;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    /// Plays back scripted reads and counts releases.
    #[derive(Default)]
    pub struct ScriptedSensor<'a> {
        pub script: VecDeque<Result<RawMeasurement, ReadError>>,
        pub reads: usize,
        pub releases: usize,
        pub cancel_on_read: Option<&'a CancelToken>,
    }

    impl<'a> ScriptedSensor<'a> {
        pub fn new(script: impl IntoIterator<Item = Result<RawMeasurement, ReadError>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl Release for ScriptedSensor<'_> {
        fn release(&mut self) {
            self.releases += 1;
        }
    }

    impl HygroThermometer<FakeDelay> for ScriptedSensor<'_> {
        fn read(&mut self, _delay: &mut FakeDelay) -> Result<RawMeasurement, ReadError> {
            self.reads += 1;
            if let Some(token) = self.cancel_on_read {
                token.cancel();
            }
            self.script.pop_front().unwrap_or(Err(ReadError::Timeout))
        }
    }

    fn reader(sensor: ScriptedSensor<'_>, attempts: u8) -> SensorReader<ScriptedSensor<'_>, FakeDelay> {
        SensorReader::with_retry(sensor, FakeDelay::default(), RetryPolicy::new(attempts, 2_000))
    }

    #[test]
    fn successful_read_yields_temperature_then_humidity() {
        let mut reader = reader(ScriptedSensor::new([Ok(RawMeasurement::new(55.0, 23.5))]), 3);
        let outcome = reader.acquire(&CancelToken::new());

        let snapshot = outcome.clone().into_result().unwrap();
        assert_eq!(snapshot.temperature(), &Reading::temperature(23.5));
        assert_eq!(snapshot.humidity(), &Reading::humidity(55.0));

        let parsed: Vec<Reading> = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(parsed[0].reading, [23.5]);
        assert_eq!(parsed[0].name, "Temperature Sensor");
        assert_eq!(parsed[1].reading, [55.0]);
        assert_eq!(parsed[1].name, "Humidity Sensor");
    }

    #[test]
    fn transient_errors_are_retried_with_backoff() {
        let script = [
            Err(ReadError::Timeout),
            Err(ReadError::ChecksumMismatch),
            Ok(RawMeasurement::new(40.0, 19.0)),
        ];
        let mut reader = reader(ScriptedSensor::new(script), 5);

        assert!(reader.acquire(&CancelToken::new()).is_success());
        assert_eq!(reader.sensor().reads, 3);
        assert_eq!(reader.delay_mut().total_us, 2 * 2_000 * 1_000);
    }

    #[test]
    fn repeated_calls_produce_independent_snapshots() {
        let script = [
            Ok(RawMeasurement::new(50.0, 20.0)),
            Ok(RawMeasurement::new(60.0, 25.0)),
        ];
        let mut reader = reader(ScriptedSensor::new(script), 1);
        let cancel = CancelToken::new();

        let first = reader.acquire(&cancel).into_result().unwrap();
        let second = reader.acquire(&cancel).into_result().unwrap();

        assert_eq!(first, Snapshot::new(20.0, 50.0));
        assert_eq!(second, Snapshot::new(25.0, 60.0));
        assert_eq!(second.readings().len(), 2);
        assert_eq!(second.temperature().reading.len(), 1);
    }

    #[test]
    fn half_measurement_is_a_failure() {
        let humidity_only = RawMeasurement {
            humidity: Some(55.0),
            temperature: None,
        };
        let mut reader = reader(ScriptedSensor::new([Ok(humidity_only), Ok(humidity_only)]), 2);

        assert_eq!(
            reader.acquire(&CancelToken::new()),
            Outcome::Failure(Failure::NoData {
                attempts: 2,
                last: ReadError::Incomplete,
            })
        );
    }

    #[test]
    fn no_data_is_a_typed_failure() {
        let mut reader = reader(ScriptedSensor::new([Ok(RawMeasurement::default())]), 1);
        let outcome = reader.acquire(&CancelToken::new());

        let err = outcome.clone().into_result().unwrap_err();
        assert!(matches!(err, AcquireError::Failed(f) if f.kind() == FailureKind::NoData));

        let doc: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(doc["kind"], "no_data");
        assert!(doc["message"]
            .as_str()
            .unwrap()
            .starts_with("error reading data from temperature sensor"));
    }

    #[test]
    fn pin_fault_stops_immediately() {
        let mut reader = reader(ScriptedSensor::new([Err(ReadError::Pin)]), 15);
        let outcome = reader.acquire(&CancelToken::new());

        assert_eq!(outcome, Outcome::Failure(Failure::Hardware(ReadError::Pin)));
        assert_eq!(reader.sensor().reads, 1);
        assert_eq!(reader.sensor().releases, 1);
        assert_eq!(reader.delay_mut().total_us, 0);

        let doc: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(doc["kind"], "hardware");
        assert_eq!(doc["message"], "sensor hardware failure: gpio pin fault");
    }

    #[test]
    fn interrupt_during_read_cancels() {
        let cancel = CancelToken::new();
        let mut sensor = ScriptedSensor::new([Ok(RawMeasurement::new(55.0, 23.5))]);
        sensor.cancel_on_read = Some(&cancel);
        let mut reader = reader(sensor, 3);

        let outcome = reader.acquire(&cancel);
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(outcome.clone().into_result(), Err(AcquireError::Cancelled));

        let doc: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(doc["kind"], "cancelled");
        assert_eq!(reader.sensor().releases, 1);
    }

    #[test]
    fn cancelled_token_skips_the_read() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut reader = reader(ScriptedSensor::new([]), 3);

        assert_eq!(reader.acquire(&cancel), Outcome::Cancelled);
        assert_eq!(reader.sensor().reads, 0);
        assert_eq!(reader.sensor().releases, 1);

        cancel.reset();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn line_released_once_per_call() {
        let mut reader = reader(ScriptedSensor::new([]), 4);
        let cancel = CancelToken::new();

        for expected in 1..=3 {
            assert!(matches!(reader.acquire(&cancel), Outcome::Failure(_)));
            assert_eq!(reader.sensor().releases, expected);
        }

        let (sensor, _) = reader.into_parts();
        assert_eq!(sensor.reads, 12);
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        assert_eq!(RetryPolicy::new(0, 10).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 15);
        assert_eq!(RetryPolicy::default().backoff_ms(), 2_000);
    }
}
