use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::mode::Async;
use embassy_stm32::spi::{BitOrder, Config, Instance, MisoPin, MosiPin, RxDma, SckPin, Spi, TxDma, MODE_3};
use embassy_stm32::time::Hertz;
use embassy_stm32::Peripheral;
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;

/// SPI port to the isoSPI transceiver, chip select owned by the device.
pub type LtcSpiDevice = ExclusiveDevice<Spi<'static, Async>, Output<'static>, Delay>;

/// SPI mode 3, MSB first, 1 MHz, DMA in both directions.
pub fn ltc_spi_device<T: Instance>(
    peri: impl Peripheral<P = T> + 'static,
    sck: impl Peripheral<P = impl SckPin<T>> + 'static,
    mosi: impl Peripheral<P = impl MosiPin<T>> + 'static,
    miso: impl Peripheral<P = impl MisoPin<T>> + 'static,
    cs: impl Peripheral<P = impl Pin> + 'static,
    tx_dma: impl Peripheral<P = impl TxDma<T>> + 'static,
    rx_dma: impl Peripheral<P = impl RxDma<T>> + 'static,
) -> LtcSpiDevice {
    let mut spi_config = Config::default();
    spi_config.mode = MODE_3;
    spi_config.bit_order = BitOrder::MsbFirst;
    spi_config.frequency = Hertz(1_000_000);

    let spi = Spi::new(peri, sck, mosi, miso, tx_dma, rx_dma, spi_config);
    let cs = Output::new(cs, Level::High, Speed::VeryHigh);

    ExclusiveDevice::new(spi, cs, Delay).unwrap()
}
