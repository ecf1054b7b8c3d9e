use embedded_hal_async::delay::DelayNs;

use super::bus::{BusError, ChipBus, DischargeMask, GpioOutputState, MuxSelect};
use super::command::{
    AdcMode, AuxGroup, CellGroup, CellSelection, Command, GpioSelection, SelfTestMode, SELF_TEST_1_7K,
};
use super::thermistor::temperature_from_mv;
use crate::config::{
    ADC_POLL_TIMEOUT_MS, AUX_ADC_SETTLE_MS, BANK_COUNT, CELLS_PER_BANK, CELL_ADC_SETTLE_MS, CELL_MAP,
    CHANNELS_PER_BANK, DISCHARGE_OFF_SETTLE_MS, SELF_TEST_SETTLE_MS, TEMPS_PER_BANK,
};
use crate::types::CellFrame;

const CELL_CONVERSION: Command = Command::StartCellVoltageAdc {
    mode: AdcMode::K7k,
    discharge_permitted: false,
    cells: CellSelection::All,
};

const TEMP_CONVERSION: Command = Command::StartGpioAdc {
    mode: AdcMode::K7k,
    channel: GpioSelection::Gpio4,
};

/// Banks whose self-test readback did not match the expected pattern, or
/// could not be read at all.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestReport {
    pub cell_failures: u8,
    pub aux_failures: u8,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.cell_failures == 0 && self.aux_failures == 0
    }
}

/// Drives the chip bus through self-test and the per-cycle sampling sequence.
///
/// Bus errors never abort a cycle: they are logged, counted, and the affected
/// slot keeps the value from the previous frame.
pub struct AcquisitionEngine<B> {
    bus: B,
    last_frame: CellFrame,
    warnings: u32,
}

fn words(group: &[u8; 6]) -> [u16; 3] {
    [
        u16::from_le_bytes([group[0], group[1]]),
        u16::from_le_bytes([group[2], group[3]]),
        u16::from_le_bytes([group[4], group[5]]),
    ]
}

impl<B: ChipBus> AcquisitionEngine<B> {
    pub fn new(bus: B) -> Self {
        AcquisitionEngine {
            bus,
            last_frame: CellFrame::new(),
            warnings: 0,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Soft bus errors seen since start-up.
    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    fn bus_warning(&mut self, what: &'static str, bank: usize, err: BusError) {
        self.warnings = self.warnings.wrapping_add(1);
        warn!("{=str} failed on bank {}: {}", what, bank, err);
    }

    /// Writes the staged configuration to every bank.
    pub async fn configure(&mut self) {
        self.bus.wake().await;
        for bank in 0..BANK_COUNT {
            if let Err(err) = self.bus.write_config(bank).await {
                self.bus_warning("initial config write", bank, err);
            }
        }
    }

    pub async fn self_test<D: DelayNs>(&mut self, delay: &mut D) -> SelfTestReport {
        let mut report = SelfTestReport::default();

        self.bus.wake().await;
        let cvst = Command::StartSelfTestCellVoltage {
            mode: AdcMode::K7k,
            test: SelfTestMode::SelfTest1,
        };
        if let Err(err) = self.bus.send_broadcast(cvst).await {
            self.bus_warning("cell self test start", 0, err);
        }
        delay.delay_ms(SELF_TEST_SETTLE_MS).await;
        self.bus.wake().await;
        for bank in 0..BANK_COUNT {
            let mut ok = true;
            for group in CellGroup::ALL {
                ok &= self.check_pattern(Command::ReadCellVoltage(group), bank, "cell self test").await;
            }
            if !ok {
                report.cell_failures += 1;
            }
        }

        self.bus.wake().await;
        let axst = Command::StartSelfTestGpio {
            mode: AdcMode::K7k,
            test: SelfTestMode::SelfTest1,
        };
        if let Err(err) = self.bus.send_broadcast(axst).await {
            self.bus_warning("aux self test start", 0, err);
        }
        delay.delay_ms(SELF_TEST_SETTLE_MS).await;
        self.bus.wake().await;
        for bank in 0..BANK_COUNT {
            let mut ok = true;
            for group in AuxGroup::ALL {
                ok &= self.check_pattern(Command::ReadAuxiliary(group), bank, "aux self test").await;
            }
            if !ok {
                report.aux_failures += 1;
            }
        }

        if report.passed() {
            info!("self test passed on {} banks", BANK_COUNT);
        } else {
            error!(
                "self test failed: {} cell banks, {} aux banks",
                report.cell_failures,
                report.aux_failures
            );
        }
        report
    }

    async fn check_pattern(&mut self, cmd: Command, bank: usize, what: &'static str) -> bool {
        match self.bus.read_addressed(cmd, bank).await {
            Ok(group) => {
                let mismatch = words(&group).iter().any(|&w| w != SELF_TEST_1_7K);
                if mismatch {
                    warn!("{=str} pattern mismatch on bank {}", what, bank);
                }
                !mismatch
            }
            Err(err) => {
                self.bus_warning(what, bank, err);
                false
            }
        }
    }

    /// Reads every cell voltage, then every temperature.
    pub async fn sample<D: DelayNs>(&mut self, delay: &mut D) -> CellFrame {
        let mut frame = self.last_frame;

        self.bus.wake().await;

        // discharge off so balancing current does not skew the readings
        for bank in 0..BANK_COUNT {
            self.bus.set_status_line(bank, GpioOutputState::Low);
            self.bus.set_discharge_mask(bank, DischargeMask::NONE);
            if let Err(err) = self.bus.write_config(bank).await {
                self.bus_warning("config write", bank, err);
            }
        }
        delay.delay_ms(DISCHARGE_OFF_SETTLE_MS).await;

        if let Err(err) = self.bus.send_broadcast(CELL_CONVERSION).await {
            self.bus_warning("cell ADC start", 0, err);
        }
        delay.delay_ms(CELL_ADC_SETTLE_MS).await;

        for bank in 0..BANK_COUNT {
            self.read_bank_voltages(bank, &mut frame).await;
        }

        self.sample_temperatures(delay, &mut frame).await;

        let (cells, sensors) = frame.unread();
        if cells > 0 || sensors > 0 {
            warn!("{} cells and {} sensors not read yet, left out of evaluation", cells, sensors);
        }

        self.last_frame = frame;
        frame
    }

    async fn read_bank_voltages(&mut self, bank: usize, frame: &mut CellFrame) {
        if let Err(err) = self.bus.poll_adc_completion(bank, ADC_POLL_TIMEOUT_MS).await {
            self.bus_warning("cell ADC poll", bank, err);
        }

        let mut raw: [Option<u16>; CHANNELS_PER_BANK] = [None; CHANNELS_PER_BANK];
        for (g, group) in CellGroup::ALL.into_iter().enumerate() {
            match self.bus.read_addressed(Command::ReadCellVoltage(group), bank).await {
                Ok(data) => {
                    for (k, word) in words(&data).into_iter().enumerate() {
                        raw[g * 3 + k] = Some(word);
                    }
                }
                Err(err) => self.bus_warning("cell voltage read", bank, err),
            }
        }

        for (channel, cell) in CELL_MAP.iter().enumerate() {
            if let (Some(cell), Some(value)) = (cell, raw[channel]) {
                // 100 µV per LSB
                frame.set_voltage(bank * CELLS_PER_BANK + *cell as usize, value / 10);
            }
        }
    }

    async fn sample_temperatures<D: DelayNs>(&mut self, delay: &mut D, frame: &mut CellFrame) {
        for select in MuxSelect::all() {
            for bank in 0..BANK_COUNT {
                self.bus.set_mux_select(bank, select);
                if let Err(err) = self.bus.write_config(bank).await {
                    self.bus_warning("mux select", bank, err);
                }
                if let Err(err) = self.bus.send_addressed(TEMP_CONVERSION, bank).await {
                    self.bus_warning("aux ADC start", bank, err);
                }
            }
            delay.delay_ms(AUX_ADC_SETTLE_MS).await;

            for bank in 0..BANK_COUNT {
                match self.bus.read_addressed(Command::ReadAuxiliary(AuxGroup::B), bank).await {
                    Ok(data) => {
                        let gpio4 = words(&data)[0];
                        frame.set_temperature(
                            bank * TEMPS_PER_BANK + select.index(),
                            temperature_from_mv(gpio4 / 10),
                        );
                    }
                    Err(err) => self.bus_warning("temperature read", bank, err),
                }
            }
        }
    }

    /// Stages and writes the discharge masks for the next cycle, status line low.
    pub async fn apply_discharge(&mut self, masks: &[DischargeMask; BANK_COUNT]) {
        for (bank, mask) in masks.iter().enumerate() {
            self.bus.set_discharge_mask(bank, *mask);
            self.bus.set_status_line(bank, GpioOutputState::Low);
            if let Err(err) = self.bus.write_config(bank).await {
                self.bus_warning("discharge write", bank, err);
            }
        }
    }
}
