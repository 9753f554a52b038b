#![no_std]
#![no_main]

mod ble;
mod board;
mod downloader;
mod net;

use airtag_relay::config::{CyclerConfig, NUM_TAGS};
use airtag_relay::radio::{ChannelRadio, CompletionSignal, RadioCommand};
use airtag_relay::{ConfigError, Cycler, FetchError, RadioError, TagStore};
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Delay;
use static_cell::StaticCell;
use trouble_host::prelude::ExternalController;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

pub type RelayStore = TagStore<CriticalSectionRawMutex, NUM_TAGS>;

static TAG_STORE: RelayStore = TagStore::new(NUM_TAGS);
static RADIO_COMMANDS: Channel<CriticalSectionRawMutex, RadioCommand, 1> = Channel::new();
static RADIO_COMPLETION: CompletionSignal<CriticalSectionRawMutex> = CompletionSignal::new();

/// Conditions the relay cannot recover from without a reboot.
#[derive(Debug, defmt::Format)]
pub enum Fatal {
    WifiJoin,
    Dhcp,
    Endpoint(ConfigError),
    Request(FetchError),
    Radio(RadioError),
    BleHost,
}

pub fn fatal(reason: Fatal) -> ! {
    error!("fatal: {}, resetting", reason);
    cortex_m::peripheral::SCB::sys_reset()
}

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn cycler_task() {
    let mut cycler = Cycler::new(
        &TAG_STORE,
        &RADIO_COMPLETION,
        ChannelRadio::new(&RADIO_COMMANDS),
        Delay,
        CyclerConfig::from_build_config(),
    );
    let err = cycler.run().await;
    fatal(Fatal::Radio(err))
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("AirTag relay booting, up to {} tags", NUM_TAGS);

    let p = embassy_rp::init(Default::default());
    let board = board::Board::new(p);

    #[cfg(feature = "skip-cyw43-firmware")]
    let (fw, clm, btfw) = (&[], &[], &[]);

    #[cfg(not(feature = "skip-cyw43-firmware"))]
    let (fw, clm, btfw) = (
        include_bytes!("../cyw43-firmware/43439A0.bin"),
        include_bytes!("../cyw43-firmware/43439A0_clm.bin"),
        include_bytes!("../cyw43-firmware/43439A0_btfw.bin"),
    );

    let pwr = Output::new(board.wl_pwr, Level::Low);
    let cs = Output::new(board.wl_cs, Level::High);
    let mut pio = Pio::new(board.pio0, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        board.wl_dio,
        board.wl_clk,
        board.dma_ch0,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, bt_device, mut control, runner) =
        cyw43::new_with_bluetooth(state, pwr, spi, fw, btfw).await;
    spawner.spawn(unwrap!(cyw43_task(runner)));
    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;
    info!("CYW43 initialized");

    // The cycler idles until the first download fills the store.
    let controller: ble::BleController = ExternalController::new(bt_device);
    spawner.spawn(unwrap!(ble::ble_task(
        controller,
        &RADIO_COMMANDS,
        &RADIO_COMPLETION
    )));
    spawner.spawn(unwrap!(cycler_task()));

    let stack = match net::connect(spawner, &mut control, net_device).await {
        Ok(stack) => stack,
        Err(reason) => fatal(reason),
    };
    spawner.spawn(unwrap!(downloader::downloader_task(stack, &TAG_STORE)));
}
