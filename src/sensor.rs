use core::marker::PhantomData;

use dht_sensor::{DhtError, DhtReading};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use thiserror::Error;

/// Values returned by one driver read. Either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawMeasurement {
    pub humidity: Option<f32>,
    pub temperature: Option<f32>,
}

impl RawMeasurement {
    pub fn new(humidity: f32, temperature: f32) -> Self {
        Self {
            humidity: Some(humidity),
            temperature: Some(temperature),
        }
    }

    /// `(humidity, temperature)` when both values are present.
    pub fn complete(&self) -> Option<(f32, f32)> {
        Some((self.humidity?, self.temperature?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("sensor did not answer in time")]
    Timeout,
    #[error("checksum mismatch in sensor frame")]
    ChecksumMismatch,
    #[error("gpio pin fault")]
    Pin,
    #[error("sensor returned an incomplete measurement")]
    Incomplete,
}

impl ReadError {
    /// Noisy single-wire reads fail routinely; only a pin fault is worth giving up on immediately.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ReadError::Pin)
    }
}

impl<E> From<DhtError<E>> for ReadError {
    fn from(err: DhtError<E>) -> Self {
        match err {
            DhtError::PinError(_) => ReadError::Pin,
            DhtError::ChecksumMismatch => ReadError::ChecksumMismatch,
            DhtError::Timeout => ReadError::Timeout,
        }
    }
}

/// Puts the data line back into its idle state.
pub trait Release {
    fn release(&mut self);
}

/// A combined humidity/temperature sensor read with the help of a delay provider.
pub trait HygroThermometer<D>: Release {
    fn read(&mut self, delay: &mut D) -> Result<RawMeasurement, ReadError>;
}

/// Sensor model understood by the `dht-sensor` driver.
pub trait Model {
    const NAME: &'static str;

    fn read<P, E, D>(delay: &mut D, pin: &mut P) -> Result<RawMeasurement, DhtError<E>>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
        D: DelayUs<u8> + DelayMs<u8>;
}

pub struct Dht11;
pub struct Dht22;

impl Model for Dht11 {
    const NAME: &'static str = "DHT11";

    fn read<P, E, D>(delay: &mut D, pin: &mut P) -> Result<RawMeasurement, DhtError<E>>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
        D: DelayUs<u8> + DelayMs<u8>,
    {
        let frame = dht_sensor::dht11::Reading::read(delay, pin)?;
        Ok(RawMeasurement::new(
            frame.relative_humidity as f32,
            frame.temperature as f32,
        ))
    }
}

impl Model for Dht22 {
    const NAME: &'static str = "DHT22";

    fn read<P, E, D>(delay: &mut D, pin: &mut P) -> Result<RawMeasurement, DhtError<E>>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
        D: DelayUs<u8> + DelayMs<u8>,
    {
        let frame = dht_sensor::dht22::Reading::read(delay, pin)?;
        Ok(RawMeasurement::new(frame.relative_humidity, frame.temperature))
    }
}

/// A DHT sensor on a single open-drain data line.
///
/// The line needs a pull-up so its idle state is high.
pub struct Dht<P, M> {
    pin: P,
    _model: PhantomData<M>,
}

impl<P, E, M> Dht<P, M>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    M: Model,
{
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            _model: PhantomData,
        }
    }

    /// Hold the line high for `ms` so the chip settles before its first read.
    pub fn warm_up<D: DelayMs<u32>>(&mut self, delay: &mut D, ms: u32) {
        log::info!("Warming up {} for {} ms", M::NAME, ms);
        self.release();
        delay.delay_ms(ms);
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin, M> Release for Dht<P, M> {
    fn release(&mut self) {
        if self.pin.set_high().is_err() {
            log::warn!("Failed to release the sensor line");
        }
    }
}

impl<P, E, M, D> HygroThermometer<D> for Dht<P, M>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    M: Model,
    D: DelayUs<u8> + DelayMs<u8>,
{
    fn read(&mut self, delay: &mut D) -> Result<RawMeasurement, ReadError> {
        M::read(delay, &mut self.pin).map_err(ReadError::from)
    }
}
