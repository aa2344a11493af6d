//! Bluetooth Classic HID host for Pico 2 W

#![no_std]
#![no_main]

use bt_classic::host::{HidHost, HidReportSink};
use cyw43::aligned_bytes;
use cyw43_pio::{PioSpi, RM2_CLOCK_DIVIDER};
use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_time::{Duration, Ticker};
use hal_pico2w::bluetooth::BluetoothHci;
use hid_app::AppConfig;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

// CYW43 runner task - must run continuously
#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, cyw43::SpiBus<Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>>,
) -> ! {
    runner.run().await
}

/// Logs every inbound HID report until a real consumer exists
struct ReportLogger;

impl HidReportSink for ReportLogger {
    fn on_hid_input(&mut self, report: &[u8]) {
        info!("hid report: {=[u8]:x}", report);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("=== Bluetooth Classic HID Host ===");

    let p = embassy_rp::init(Default::default());
    info!("Embassy RP initialized");

    // CYW43 firmware - included at compile time
    let fw = aligned_bytes!("../../../firmware/43439A0.bin");
    let clm = aligned_bytes!("../../../firmware/43439A0_clm.bin");

    info!("Configuring PIO SPI...");
    let pwr = Output::new(p.PIN_23, Level::Low);
    let cs = Output::new(p.PIN_25, Level::High);

    let mut pio = Pio::new(p.PIO0, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        RM2_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        p.PIN_24,
        p.PIN_29,
        p.DMA_CH0,
    );

    // Initialize CYW43
    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (_net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw, clm).await;
    unwrap!(spawner.spawn(cyw43_task(runner)));
    control.init(clm).await;
    info!("CYW43 initialized");

    let config = AppConfig::default();
    if let Err(reason) = config.validate() {
        panic!("invalid configuration: {}", reason);
    }

    let mut transport = BluetoothHci::new();
    // TODO: bridge the CYW43 Bluetooth HCI channel into the transport
    // queues; until then the stack idles in its init state
    transport.set_ready();

    let mut host = HidHost::new(transport, ReportLogger, config.host_config());
    host.on_ready();

    info!("starting link state machine");
    let mut ticker = Ticker::every(Duration::from_millis(config.tick_ms));
    loop {
        ticker.next().await;
        host.tick();

        while let Some(packet) = host.transport_mut().poll_inbound() {
            host.on_packet(&packet);
        }

        // The on-board LED mirrors the connection state.
        control.gpio_set(0, host.is_connected()).await;
    }
}
