use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::Peri;

/// Raspberry Pi Pico W: the CYW43439 hangs off a PIO-driven SPI bus.
pub struct Board {
    pub wl_pwr: Peri<'static, PIN_23>,
    pub wl_dio: Peri<'static, PIN_24>,
    pub wl_cs: Peri<'static, PIN_25>,
    pub wl_clk: Peri<'static, PIN_29>,
    pub pio0: Peri<'static, PIO0>,
    pub dma_ch0: Peri<'static, DMA_CH0>,
}

impl Board {
    pub fn new(p: embassy_rp::Peripherals) -> Self {
        Self {
            wl_pwr: p.PIN_23,
            wl_dio: p.PIN_24,
            wl_cs: p.PIN_25,
            wl_clk: p.PIN_29,
            pio0: p.PIO0,
            dma_ch0: p.DMA_CH0,
        }
    }
}
