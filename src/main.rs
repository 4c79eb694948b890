#![no_std]
#![no_main]

extern crate alloc;

use dht_edge::{CancelOnPress, CancelToken, Dht, Outcome, RetryPolicy, Sampler, SensorReader};
#[cfg(not(feature = "dht22"))]
use dht_edge::Dht11 as SensorModel;
#[cfg(feature = "dht22")]
use dht_edge::Dht22 as SensorModel;
use esp_backtrace as _;
use esp_println::logger::init_logger;
use esp_println::println;
use hal::clock::{ClockControl, CpuClock};
use hal::system::SystemExt;
use hal::{peripherals::Peripherals, prelude::*, Delay, Rtc, IO};

#[global_allocator]
static ALLOCATOR: esp_alloc::EspHeap = esp_alloc::EspHeap::empty();

/// Set by the BOOT button, polled while the sensor waits.
static CANCEL: CancelToken = CancelToken::new();

/// Sampling period. The DHT chips cannot be read faster than every two seconds.
const INTERVAL_MS: u32 = 20 * 1000;
/// Apparently necessary to not confuse the DHT chips after power-up
const WARM_UP_MS: u32 = 2 * 1000;

/// This initializes the heap to be used by the allocator.
/// DANGER: If something doesn't work for no apparent reason, try decreasing the heap size if you're not using it all.
fn init_heap() {
    const HEAP_SIZE: usize = 8 * 1024;

    extern "C" {
        static mut _heap_start: u32;
    }
    unsafe {
        let heap_start = &_heap_start as *const _ as usize;
        ALLOCATOR.init(heap_start as *mut u8, HEAP_SIZE);
    }
}

#[entry]
fn main() -> ! {
    init_logger(log::LevelFilter::Info);
    init_heap();
    println!("Hello from Rust");

    let peripherals = Peripherals::take();

    let system = peripherals.SYSTEM.split();
    let clocks = ClockControl::configure(system.clock_control, CpuClock::Clock160MHz).freeze();
    let mut rtc = Rtc::new(peripherals.RTC_CNTL);
    rtc.swd.disable();
    rtc.rwdt.disable();

    let io = IO::new(peripherals.GPIO, peripherals.IO_MUX);
    let mut delay = Delay::new(&clocks);

    // The DHT data line is on gpio20, which is D7 on the XIAO ESP32C3
    let mut dht: Dht<_, SensorModel> = Dht::new(io.pins.gpio20.into_open_drain_output());
    // BOOT button, low while pressed
    let button = io.pins.gpio9.into_pull_up_input();

    dht.warm_up(&mut delay, WARM_UP_MS);

    let delay = CancelOnPress::new(delay, button, &CANCEL);
    let mut reader = SensorReader::with_retry(dht, delay, RetryPolicy::default());
    let summary = Sampler::every(INTERVAL_MS).run(&mut reader, &CANCEL, |outcome| {
        match outcome.to_json() {
            Ok(json) => println!("{}", json),
            Err(err) => log::error!("Failed to serialize outcome: {}", err),
        }
        if let Outcome::Failure(failure) = outcome {
            log::warn!("{:?}: {}", failure.kind(), failure);
        }
    });
    println!("Stopped after {} readings", summary.total());

    loop {}
}
