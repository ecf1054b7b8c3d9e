//! STM32F405 board bring-up: clock tree and the LTC6811 SPI port.

pub mod spi_device;

use embassy_stm32::rcc::{AHBPrescaler, APBPrescaler, Hse, HseMode, Pll, PllMul, PllPDiv, PllPreDiv, PllSource, Sysclk};
use embassy_stm32::time::Hertz;
use embassy_stm32::Config;

pub use spi_device::{ltc_spi_device, LtcSpiDevice};

const HSE_HZ: u32 = 12_000_000;

/// 12 MHz / 6 * 168 / 2 = 168 MHz on P. Q and R stay off, nothing needs 48 MHz.
const SYS_PLL: Pll = Pll {
    prediv: PllPreDiv::DIV6,
    mul: PllMul::MUL168,
    divp: Some(PllPDiv::DIV2),
    divq: None,
    divr: None,
};

pub fn prepare_config() -> Config {
    let mut config = Config::default();
    let rcc = &mut config.rcc;

    rcc.hse = Some(Hse {
        freq: Hertz(HSE_HZ),
        mode: HseMode::Oscillator,
    });
    rcc.pll_src = PllSource::HSE;
    rcc.pll = Some(SYS_PLL);
    rcc.sys = Sysclk::PLL1_P;

    // APB2 at 84 MHz feeds SPI1, APB1 at 42 MHz
    rcc.ahb_pre = AHBPrescaler::DIV1;
    rcc.apb2_pre = APBPrescaler::DIV2;
    rcc.apb1_pre = APBPrescaler::DIV4;

    config
}
