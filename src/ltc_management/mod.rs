pub mod acquisition;
pub mod bus;
pub mod command;
pub mod ltc6811;
pub mod thermistor;

pub use acquisition::{AcquisitionEngine, SelfTestReport};
pub use bus::{BusError, ChipBus, DischargeMask, GpioOutputState, MuxSelect, RegisterGroup};
pub use ltc6811::Ltc6811Bus;
