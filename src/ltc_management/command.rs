//! LTC6811 command op-codes.

/// ADC conversion speed. Values are the MD bits with ADCOPT = 0.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcMode {
    K27k = 0b01,
    K7k = 0b10,
    K26Hz = 0b11,
}

/// Which cells a cell-voltage conversion covers.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CellSelection {
    All = 0,
    Cells1And7 = 1,
    Cells2And8 = 2,
    Cells3And9 = 3,
    Cells4And10 = 4,
    Cells5And11 = 5,
    Cells6And12 = 6,
}

/// Which auxiliary input an auxiliary conversion covers.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioSelection {
    All = 0,
    Gpio1 = 1,
    Gpio2 = 2,
    Gpio3 = 3,
    Gpio4 = 4,
    Gpio5 = 5,
    SecondReference = 6,
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelfTestMode {
    SelfTest1 = 0b01,
    SelfTest2 = 0b10,
}

/// Cell voltage register groups, three cells each.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CellGroup {
    A,
    B,
    C,
    D,
}

/// Auxiliary register groups. A holds GPIO1-3, B holds GPIO4, GPIO5 and REF.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuxGroup {
    A,
    B,
}

impl CellGroup {
    pub const ALL: [CellGroup; 4] = [CellGroup::A, CellGroup::B, CellGroup::C, CellGroup::D];
}

impl AuxGroup {
    pub const ALL: [AuxGroup; 2] = [AuxGroup::A, AuxGroup::B];
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Write Configuration Register Group A
    WriteConfigA,
    ReadCellVoltage(CellGroup),
    ReadAuxiliary(AuxGroup),
    /// Start cell voltage ADC conversion (ADCV)
    StartCellVoltageAdc {
        mode: AdcMode,
        discharge_permitted: bool,
        cells: CellSelection,
    },
    /// Start GPIO ADC conversion (ADAX)
    StartGpioAdc { mode: AdcMode, channel: GpioSelection },
    /// Start self test, cell voltage (CVST)
    StartSelfTestCellVoltage { mode: AdcMode, test: SelfTestMode },
    /// Start self test, GPIO (AXST)
    StartSelfTestGpio { mode: AdcMode, test: SelfTestMode },
    /// Poll ADC conversion status (PLADC)
    PollAdcStatus,
}

impl Command {
    /// 11 bit op-code as listed in the LTC6811 command table.
    pub const fn code(&self) -> u16 {
        match *self {
            Command::WriteConfigA => 0x001,
            Command::ReadCellVoltage(group) => match group {
                CellGroup::A => 0x004,
                CellGroup::B => 0x006,
                CellGroup::C => 0x008,
                CellGroup::D => 0x00A,
            },
            Command::ReadAuxiliary(group) => match group {
                AuxGroup::A => 0x00C,
                AuxGroup::B => 0x00E,
            },
            Command::StartCellVoltageAdc {
                mode,
                discharge_permitted,
                cells,
            } => 0x260 | ((mode as u16) << 7) | ((discharge_permitted as u16) << 4) | cells as u16,
            Command::StartGpioAdc { mode, channel } => 0x460 | ((mode as u16) << 7) | channel as u16,
            Command::StartSelfTestCellVoltage { mode, test } => {
                0x207 | ((mode as u16) << 7) | ((test as u16) << 5)
            }
            Command::StartSelfTestGpio { mode, test } => {
                0x407 | ((mode as u16) << 7) | ((test as u16) << 5)
            }
            Command::PollAdcStatus => 0x714,
        }
    }

    /// Command bytes for every chip on the bus.
    pub const fn broadcast(&self) -> [u8; 2] {
        let code = self.code();
        [(code >> 8) as u8, code as u8]
    }

    /// Command bytes for the chip strapped to `address` (LTC6811-2 addressing).
    pub const fn addressed(&self, address: u8) -> [u8; 2] {
        let code = self.code();
        [0x80 | ((address & 0x0F) << 3) | ((code >> 8) as u8 & 0x07), code as u8]
    }
}

/// Register value every self-test word reads back with self test 1 at 7 kHz.
pub const SELF_TEST_1_7K: u16 = 0x9565;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_commands_match_datasheet() {
        assert_eq!(Command::ReadCellVoltage(CellGroup::A).broadcast(), [0x00, 0x04]);
        assert_eq!(Command::ReadCellVoltage(CellGroup::D).broadcast(), [0x00, 0x0A]);
        assert_eq!(Command::ReadAuxiliary(AuxGroup::B).broadcast(), [0x00, 0x0E]);
        assert_eq!(Command::WriteConfigA.broadcast(), [0x00, 0x01]);
    }

    #[test]
    fn conversion_commands_encode_mode_bits() {
        let adcv = Command::StartCellVoltageAdc {
            mode: AdcMode::K7k,
            discharge_permitted: false,
            cells: CellSelection::All,
        };
        assert_eq!(adcv.code(), 0x360);

        let adcv_dcp = Command::StartCellVoltageAdc {
            mode: AdcMode::K7k,
            discharge_permitted: true,
            cells: CellSelection::All,
        };
        assert_eq!(adcv_dcp.code(), 0x370);

        let adax = Command::StartGpioAdc {
            mode: AdcMode::K7k,
            channel: GpioSelection::Gpio4,
        };
        assert_eq!(adax.broadcast(), [0x05, 0x64]);

        let cvst = Command::StartSelfTestCellVoltage {
            mode: AdcMode::K7k,
            test: SelfTestMode::SelfTest1,
        };
        assert_eq!(cvst.code(), 0x327);

        let axst = Command::StartSelfTestGpio {
            mode: AdcMode::K7k,
            test: SelfTestMode::SelfTest1,
        };
        assert_eq!(axst.code(), 0x527);
    }

    #[test]
    fn addressed_commands_carry_the_address() {
        let cmd = Command::ReadCellVoltage(CellGroup::A);
        assert_eq!(cmd.addressed(0), [0x80, 0x04]);
        assert_eq!(cmd.addressed(3), [0x98, 0x04]);

        let adax = Command::StartGpioAdc {
            mode: AdcMode::K7k,
            channel: GpioSelection::Gpio4,
        };
        assert_eq!(adax.addressed(4), [0xA5, 0x64]);
    }
}
