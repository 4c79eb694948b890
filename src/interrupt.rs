use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::InputPin;

use crate::acquire::CancelToken;

/// Delay provider that watches an active-low button while it waits.
///
/// Millisecond waits of `u32` length (retry backoff, sampling interval) are sliced and the
/// button is polled between slices. A press fires `cancel` and cuts the wait short.
/// The short `u8` waits used inside a sensor frame pass straight through, since the
/// single-wire protocol cannot tolerate the extra latency.
pub struct CancelOnPress<'a, D, B> {
    delay: D,
    button: B,
    cancel: &'a CancelToken,
    slice_ms: u32,
}

impl<'a, D, B> CancelOnPress<'a, D, B>
where
    D: DelayMs<u32>,
    B: InputPin,
{
    pub fn new(delay: D, button: B, cancel: &'a CancelToken) -> Self {
        Self {
            delay,
            button,
            cancel,
            slice_ms: 50,
        }
    }

    pub fn slice_ms(mut self, slice_ms: u32) -> Self {
        self.slice_ms = slice_ms.max(1);
        self
    }

    /// Fire the token if the button is held. Returns whether cancellation is pending.
    pub fn poll(&mut self) -> bool {
        if !self.cancel.is_cancelled() && self.button.is_low().unwrap_or(false) {
            log::info!("Interrupted by user");
            self.cancel.cancel();
        }
        self.cancel.is_cancelled()
    }

    pub fn into_inner(self) -> (D, B) {
        (self.delay, self.button)
    }
}

impl<D, B> DelayMs<u32> for CancelOnPress<'_, D, B>
where
    D: DelayMs<u32>,
    B: InputPin,
{
    fn delay_ms(&mut self, ms: u32) {
        let mut remaining = ms;
        while remaining > 0 {
            if self.poll() {
                return;
            }
            let step = remaining.min(self.slice_ms);
            self.delay.delay_ms(step);
            remaining -= step;
        }
        self.poll();
    }
}

impl<D: DelayMs<u8>, B> DelayMs<u8> for CancelOnPress<'_, D, B> {
    fn delay_ms(&mut self, ms: u8) {
        self.delay.delay_ms(ms);
    }
}

impl<D: DelayUs<u8>, B> DelayUs<u8> for CancelOnPress<'_, D, B> {
    fn delay_us(&mut self, us: u8) {
        self.delay.delay_us(us);
    }
}
