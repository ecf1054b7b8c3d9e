#![allow(dead_code)]

use core::convert::Infallible;

use bms_hv_rust::config::{channel_of_cell, BANK_COUNT, CELLS_PER_BANK, CELL_MAP, CHANNELS_PER_BANK, TEMPS_PER_BANK};
use bms_hv_rust::ltc_management::command::{AuxGroup, CellGroup, Command, SELF_TEST_1_7K};
use bms_hv_rust::ltc_management::thermistor::temperature_from_mv;
use bms_hv_rust::ltc_management::{BusError, ChipBus, DischargeMask, GpioOutputState, MuxSelect, RegisterGroup};
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

/// Raw value left on unwired channels; must never show up in a frame.
pub const UNWIRED_RAW: u16 = 0xBEEF;

/// Divider voltage that the thermistor conversion maps to `celsius`.
pub fn mv_for_temp(celsius: i8) -> u16 {
    (1..3300)
        .find(|&mv| temperature_from_mv(mv) == celsius)
        .expect("temperature out of sensor range")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    pub discharge: DischargeMask,
    pub mux: Option<MuxSelect>,
    pub status: Option<GpioOutputState>,
}

impl BankConfig {
    const fn new() -> Self {
        BankConfig {
            discharge: DischargeMask::NONE,
            mux: None,
            status: None,
        }
    }
}

/// Chain of simulated LTC6811s.
pub struct MockBus {
    /// Raw cell readings, 100 µV per LSB, by physical channel.
    pub cells: [[u16; CHANNELS_PER_BANK]; BANK_COUNT],
    /// GPIO4 voltage (mV) for each mux position.
    pub aux_mv: [[u16; TEMPS_PER_BANK]; BANK_COUNT],
    pub self_test_word: u16,
    staged: [BankConfig; BANK_COUNT],
    /// Configuration as last written to each chip.
    pub written: [BankConfig; BANK_COUNT],
    /// Mux position latched by the last aux conversion.
    converted_mux: [Option<MuxSelect>; BANK_COUNT],
    self_test_running: bool,
    pub failing_reads: Vec<(Command, usize)>,
    pub poll_timeout: bool,
    pub wakes: u32,
    pub broadcasts: Vec<Command>,
    pub config_writes: u32,
    /// `config_writes` as it stood when each broadcast went out.
    pub config_writes_at_broadcast: Vec<u32>,
}

impl MockBus {
    pub fn uniform(cell_mv: u16, celsius: i8) -> Self {
        let mut cells = [[UNWIRED_RAW; CHANNELS_PER_BANK]; BANK_COUNT];
        for bank in cells.iter_mut() {
            for (channel, cell) in CELL_MAP.iter().enumerate() {
                if cell.is_some() {
                    bank[channel] = cell_mv * 10;
                }
            }
        }
        MockBus {
            cells,
            aux_mv: [[mv_for_temp(celsius); TEMPS_PER_BANK]; BANK_COUNT],
            self_test_word: SELF_TEST_1_7K,
            staged: [BankConfig::new(); BANK_COUNT],
            written: [BankConfig::new(); BANK_COUNT],
            converted_mux: [None; BANK_COUNT],
            self_test_running: false,
            failing_reads: Vec::new(),
            poll_timeout: false,
            wakes: 0,
            broadcasts: Vec::new(),
            config_writes: 0,
            config_writes_at_broadcast: Vec::new(),
        }
    }

    /// Sets logical cell `index` (pack-wide) to `mv`.
    pub fn set_cell_mv(&mut self, index: usize, mv: u16) {
        let channel = channel_of_cell(index % CELLS_PER_BANK).unwrap();
        self.cells[index / CELLS_PER_BANK][channel] = mv * 10;
    }

    /// Sets sensor `index` (pack-wide) to read `celsius`.
    pub fn set_temp(&mut self, index: usize, celsius: i8) {
        self.aux_mv[index / TEMPS_PER_BANK][index % TEMPS_PER_BANK] = mv_for_temp(celsius);
    }

    fn bank(bank: usize) -> Result<usize, BusError> {
        if bank < BANK_COUNT {
            Ok(bank)
        } else {
            Err(BusError::InvalidBank)
        }
    }

    fn group_words(&self, cmd: Command, bank: usize) -> [u16; 3] {
        if self.self_test_running {
            return [self.self_test_word; 3];
        }
        match cmd {
            Command::ReadCellVoltage(group) => {
                let first = match group {
                    CellGroup::A => 0,
                    CellGroup::B => 3,
                    CellGroup::C => 6,
                    CellGroup::D => 9,
                };
                let c = &self.cells[bank];
                [c[first], c[first + 1], c[first + 2]]
            }
            Command::ReadAuxiliary(AuxGroup::B) => {
                let gpio4 = self.converted_mux[bank].map_or(0, |m| self.aux_mv[bank][m.index()] * 10);
                [gpio4, 0, 30_000]
            }
            _ => [0; 3],
        }
    }
}

impl ChipBus for MockBus {
    async fn wake(&mut self) {
        self.wakes += 1;
    }

    async fn send_broadcast(&mut self, cmd: Command) -> Result<(), BusError> {
        self.self_test_running = matches!(
            cmd,
            Command::StartSelfTestCellVoltage { .. } | Command::StartSelfTestGpio { .. }
        );
        self.broadcasts.push(cmd);
        self.config_writes_at_broadcast.push(self.config_writes);
        Ok(())
    }

    async fn send_addressed(&mut self, cmd: Command, bank: usize) -> Result<(), BusError> {
        let bank = Self::bank(bank)?;
        if let Command::StartGpioAdc { .. } = cmd {
            self.converted_mux[bank] = self.written[bank].mux;
        }
        Ok(())
    }

    async fn read_addressed(&mut self, cmd: Command, bank: usize) -> Result<RegisterGroup, BusError> {
        let bank = Self::bank(bank)?;
        if self.failing_reads.contains(&(cmd, bank)) {
            return Err(BusError::Pec);
        }
        let words = self.group_words(cmd, bank);
        let mut data = [0u8; 6];
        for (i, w) in words.iter().enumerate() {
            data[2 * i..2 * i + 2].copy_from_slice(&w.to_le_bytes());
        }
        Ok(data)
    }

    async fn poll_adc_completion(&mut self, bank: usize, _timeout_ms: u32) -> Result<(), BusError> {
        Self::bank(bank)?;
        if self.poll_timeout {
            Err(BusError::PollTimeout)
        } else {
            Ok(())
        }
    }

    fn set_discharge_mask(&mut self, bank: usize, mask: DischargeMask) {
        self.staged[bank].discharge = mask;
    }

    fn set_mux_select(&mut self, bank: usize, select: MuxSelect) {
        self.staged[bank].mux = Some(select);
    }

    fn set_status_line(&mut self, bank: usize, state: GpioOutputState) {
        self.staged[bank].status = Some(state);
    }

    async fn write_config(&mut self, bank: usize) -> Result<(), BusError> {
        let bank = Self::bank(bank)?;
        self.written[bank] = self.staged[bank];
        self.config_writes += 1;
        Ok(())
    }
}

/// Adds up every requested delay instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
}

impl MockDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

/// Hardware fault output.
#[derive(Default)]
pub struct MockPin {
    pub high: bool,
    pub assertions: u32,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        self.assertions += 1;
        Ok(())
    }
}
