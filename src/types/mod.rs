pub mod bms;
pub use bms::{BmsSnapshot, CellFrame, FaultStats};

/// Cell voltage thresholds, millivolts.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Voltages {
    FaultHigh = 4150,
    FaultLow = 2650,
    /// Cells below this are never discharged.
    Balance = 3900,
    /// Minimum distance above the pack minimum before a cell is discharged.
    Discharge = 5,
}

/// Cell temperature thresholds, degrees celsius.
#[repr(i8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Temperatures {
    FaultHigh = 60,
    FaultHighCharging = 45,
    FaultLow = 0,
}

impl Voltages {
    pub const fn as_raw(&self) -> u16 {
        *self as u16
    }
}

impl Temperatures {
    pub const fn as_raw(&self) -> i8 {
        *self as i8
    }
}

/// Lifecycle of the BMS task.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThreadState {
    /// Self test running on every bank.
    #[default]
    Startup,
    /// No fault, cells monitored and balancing permitted.
    Idle,
    /// A threshold was violated last cycle; latches if it is seen again.
    FaultRecover,
    /// Latched fault, hardware fault line asserted.
    Fault,
}

/// Supervisor → BMS command. Only the newest one queued before a cycle counts.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MainToBmsCommand {
    pub balance_allowed: bool,
    pub charging: bool,
}
