use super::command::Command;
use crate::config::{CHANNELS_PER_BANK, TEMPS_PER_BANK};
use crate::types::Voltages;

/// Six data bytes of one register group, PEC already stripped.
pub type RegisterGroup = [u8; 6];

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The SPI transfer itself failed.
    Spi,
    /// Received data did not match its packet error code.
    Pec,
    /// ADC conversion did not report completion in time.
    PollTimeout,
    /// Bank index outside `0..BANK_COUNT`.
    InvalidBank,
}

/// Transport to the chain of analog front ends.
///
/// Configuration is staged per bank with the `set_*` methods and only reaches
/// the chip on [`ChipBus::write_config`].
#[allow(async_fn_in_trait)]
pub trait ChipBus {
    async fn wake(&mut self);

    async fn send_broadcast(&mut self, cmd: Command) -> Result<(), BusError>;

    async fn send_addressed(&mut self, cmd: Command, bank: usize) -> Result<(), BusError>;

    async fn read_addressed(&mut self, cmd: Command, bank: usize) -> Result<RegisterGroup, BusError>;

    async fn poll_adc_completion(&mut self, bank: usize, timeout_ms: u32) -> Result<(), BusError>;

    fn set_discharge_mask(&mut self, bank: usize, mask: DischargeMask);

    fn set_mux_select(&mut self, bank: usize, select: MuxSelect);

    /// Drives GPIO5, the status indicator.
    fn set_status_line(&mut self, bank: usize, state: GpioOutputState);

    async fn write_config(&mut self, bank: usize) -> Result<(), BusError>;
}

/// GPIO pin state in the configuration register. A `1` bit turns the pull-down
/// off, so `High` and `Passive` (pin used as ADC input) encode the same way.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioOutputState {
    Low,
    High,
    Passive,
}

impl GpioOutputState {
    pub const fn bit(&self) -> u8 {
        match self {
            GpioOutputState::Low => 0,
            GpioOutputState::High | GpioOutputState::Passive => 1,
        }
    }

    const fn from_bit(bit: bool) -> Self {
        if bit {
            GpioOutputState::High
        } else {
            GpioOutputState::Low
        }
    }
}

/// Thermistor multiplexer position, `0..TEMPS_PER_BANK`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxSelect(u8);

impl MuxSelect {
    pub const fn new(index: usize) -> Option<Self> {
        if index < TEMPS_PER_BANK {
            Some(MuxSelect(index as u8))
        } else {
            None
        }
    }

    pub fn all() -> impl Iterator<Item = MuxSelect> {
        (0..TEMPS_PER_BANK as u8).map(MuxSelect)
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Levels for GPIO1, GPIO2 and GPIO3, least significant bit first.
    pub const fn select_lines(&self) -> [GpioOutputState; 3] {
        [
            GpioOutputState::from_bit(self.0 & 0b001 != 0),
            GpioOutputState::from_bit(self.0 & 0b010 != 0),
            GpioOutputState::from_bit(self.0 & 0b100 != 0),
        ]
    }
}

/// Discharge switches of one bank, bit `n` is physical cell input `n`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DischargeMask(u16);

impl DischargeMask {
    pub const NONE: DischargeMask = DischargeMask(0);

    pub const fn from_bits(bits: u16) -> Self {
        DischargeMask(bits & ((1 << CHANNELS_PER_BANK) - 1))
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub fn set(&mut self, channel: usize) {
        if channel < CHANNELS_PER_BANK {
            self.0 |= 1 << channel;
        }
    }

    pub const fn is_set(&self, channel: usize) -> bool {
        channel < CHANNELS_PER_BANK && self.0 & (1 << channel) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Staged contents of Configuration Register Group A.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    /// GPIO1..GPIO5
    pub gpio: [GpioOutputState; 5],
    /// REFON: reference stays powered between conversions.
    pub reference_on: bool,
    pub discharge_timer_enabled: bool,
    pub adc_option: bool,
    pub undervoltage: u16,
    pub overvoltage: u16,
    pub discharge: DischargeMask,
    /// DCTO nibble, 0 disables the discharge timer.
    pub discharge_timeout: u8,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub const fn new() -> Self {
        Configuration {
            gpio: [
                GpioOutputState::Passive,
                GpioOutputState::Passive,
                GpioOutputState::Passive,
                GpioOutputState::High,
                GpioOutputState::High,
            ],
            reference_on: false,
            discharge_timer_enabled: false,
            adc_option: false,
            undervoltage: undervoltage_code(Voltages::FaultLow.as_raw()),
            overvoltage: overvoltage_code(Voltages::FaultHigh.as_raw()),
            discharge: DischargeMask::NONE,
            discharge_timeout: 0,
        }
    }

    /// Points the three mux select lines at `select`; GPIO4 is left as the ADC input.
    pub fn set_mux(&mut self, select: MuxSelect) {
        let [gpio1, gpio2, gpio3] = select.select_lines();
        self.gpio[0] = gpio1;
        self.gpio[1] = gpio2;
        self.gpio[2] = gpio3;
        self.gpio[3] = GpioOutputState::Passive;
    }

    pub fn encode(&self) -> [u8; 6] {
        let mut cfg = [0u8; 6];

        cfg[0] = (self.gpio[4].bit() << 7)
            | (self.gpio[3].bit() << 6)
            | (self.gpio[2].bit() << 5)
            | (self.gpio[1].bit() << 4)
            | (self.gpio[0].bit() << 3)
            | (self.reference_on as u8) << 2
            | (self.discharge_timer_enabled as u8) << 1
            | self.adc_option as u8;

        cfg[1] = (self.undervoltage & 0xFF) as u8;
        cfg[2] = ((self.undervoltage >> 8) & 0x0F) as u8 | ((self.overvoltage & 0x0F) << 4) as u8;
        cfg[3] = ((self.overvoltage >> 4) & 0xFF) as u8;

        let dcto = self.discharge_timeout & 0x0F;
        let discharge = self.discharge.bits();
        cfg[4] = (discharge & 0xFF) as u8;
        cfg[5] = (dcto << 4) | ((discharge >> 8) & 0x0F) as u8;

        cfg
    }
}

/// VUV code: threshold = (VUV + 1) * 16 * 100 µV
pub const fn undervoltage_code(mv: u16) -> u16 {
    ((mv as u32 * 10 / 16) as u16).saturating_sub(1) & 0x0FFF
}

/// VOV code: threshold = VOV * 16 * 100 µV
pub const fn overvoltage_code(mv: u16) -> u16 {
    (mv as u32 * 10 / 16) as u16 & 0x0FFF
}
