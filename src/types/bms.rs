use crate::config::{CELL_COUNT, TEMP_COUNT};
use crate::types::{Temperatures, ThreadState, Voltages};

/// Everything read from the banks during one cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellFrame {
    /// Cell voltages in mV, indexed `bank * CELLS_PER_BANK + cell`.
    pub voltages: [u16; CELL_COUNT],
    /// Cell temperatures in °C, indexed `bank * TEMPS_PER_BANK + mux`.
    pub temperatures: [i8; TEMP_COUNT],
    /// Bit `i` set once `voltages[i]` has been read successfully.
    pub voltages_read: u32,
    /// Bit `i` set once `temperatures[i]` has been read successfully.
    pub temperatures_read: u32,
}

impl Default for CellFrame {
    fn default() -> Self {
        Self::new()
    }
}

const ALL_CELLS: u32 = u32::MAX >> (32 - CELL_COUNT);
const ALL_TEMPS: u32 = u32::MAX >> (32 - TEMP_COUNT);

impl CellFrame {
    /// Nothing read yet.
    pub const fn new() -> Self {
        CellFrame {
            voltages: [0; CELL_COUNT],
            temperatures: [0; TEMP_COUNT],
            voltages_read: 0,
            temperatures_read: 0,
        }
    }

    /// Frame with every slot read.
    pub const fn from_readings(voltages: [u16; CELL_COUNT], temperatures: [i8; TEMP_COUNT]) -> Self {
        CellFrame {
            voltages,
            temperatures,
            voltages_read: ALL_CELLS,
            temperatures_read: ALL_TEMPS,
        }
    }

    pub const fn voltage_read(&self, cell: usize) -> bool {
        cell < CELL_COUNT && self.voltages_read & (1 << cell) != 0
    }

    pub const fn temperature_read(&self, sensor: usize) -> bool {
        sensor < TEMP_COUNT && self.temperatures_read & (1 << sensor) != 0
    }

    pub fn set_voltage(&mut self, cell: usize, mv: u16) {
        self.voltages[cell] = mv;
        self.voltages_read |= 1 << cell;
    }

    pub fn set_temperature(&mut self, sensor: usize, celsius: i8) {
        self.temperatures[sensor] = celsius;
        self.temperatures_read |= 1 << sensor;
    }

    /// Slots that have never been read, voltages then temperatures.
    pub const fn unread(&self) -> (u32, u32) {
        (
            (ALL_CELLS & !self.voltages_read).count_ones(),
            (ALL_TEMPS & !self.temperatures_read).count_ones(),
        )
    }
}

/// Aggregates and threshold verdict for one [`CellFrame`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultStats {
    pub min_voltage: u16,
    pub max_voltage: u16,
    pub min_temp: i8,
    pub max_temp: i8,
    pub avg_temp: i8,
    pub volt_low: bool,
    pub volt_high: bool,
    pub temp_low: bool,
    pub temp_high: bool,
    pub temp_high_while_charging: bool,
    /// One bit per cell index. Voltage and temperature violations share the
    /// same bit, so the bitmap alone cannot tell them apart.
    pub fault_bitmap: u32,
}

impl FaultStats {
    pub fn evaluate(frame: &CellFrame, charging: bool) -> Self {
        let volt_high_mv = Voltages::FaultHigh.as_raw();
        let volt_low_mv = Voltages::FaultLow.as_raw();
        let temp_high_c = Temperatures::FaultHigh.as_raw();
        let temp_low_c = Temperatures::FaultLow.as_raw();

        let mut fault_bitmap: u32 = 0;

        // never-read slots hold no measurement and are left out entirely
        let mut min_voltage = u16::MAX;
        let mut max_voltage = 0;
        let mut volt_count = 0;
        for (i, &volt) in frame.voltages.iter().enumerate() {
            if !frame.voltage_read(i) {
                continue;
            }
            if volt > volt_high_mv || volt < volt_low_mv {
                fault_bitmap |= 1 << i;
            }
            min_voltage = min_voltage.min(volt);
            max_voltage = max_voltage.max(volt);
            volt_count += 1;
        }

        let mut min_temp = i8::MAX;
        let mut max_temp = i8::MIN;
        let mut temp_sum: i32 = 0;
        let mut temp_count: i32 = 0;
        for (i, &temp) in frame.temperatures.iter().enumerate() {
            if !frame.temperature_read(i) {
                continue;
            }
            temp_sum += temp as i32;
            temp_count += 1;
            if temp > temp_high_c || temp < temp_low_c {
                fault_bitmap |= 1 << i;
            }
            min_temp = min_temp.min(temp);
            max_temp = max_temp.max(temp);
        }

        if volt_count == 0 {
            min_voltage = 0;
        }
        let temp_known = temp_count > 0;
        if !temp_known {
            min_temp = 0;
            max_temp = 0;
        }
        // Integer division truncates toward zero, the average of i8 values always fits.
        let avg_temp = if temp_known { (temp_sum / temp_count) as i8 } else { 0 };

        let temp_limit = if charging {
            Temperatures::FaultHighCharging.as_raw()
        } else {
            temp_high_c
        };

        let volt_known = volt_count > 0;
        let volt_low = volt_known && min_voltage <= volt_low_mv;
        let volt_high = volt_known && max_voltage >= volt_high_mv;
        let temp_low = temp_known && min_temp <= temp_low_c;
        let temp_high = temp_known && max_temp >= temp_limit;

        FaultStats {
            min_voltage,
            max_voltage,
            min_temp,
            max_temp,
            avg_temp,
            volt_low,
            volt_high,
            temp_low,
            temp_high,
            temp_high_while_charging: temp_high && charging,
            fault_bitmap,
        }
    }

    /// True when any aggregate threshold is violated this cycle.
    pub fn fault_present(&self) -> bool {
        self.volt_low || self.volt_high || self.temp_low || self.temp_high
    }
}

/// Per-cycle telemetry handed to the supervisor.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BmsSnapshot {
    pub voltages: [u16; CELL_COUNT],
    pub temperatures: [i8; TEMP_COUNT],
    pub fault_bitmap: u32,
    pub state: ThreadState,
    pub is_balancing: bool,
    /// Minimum cell voltage, 20 mV per bit.
    pub min_volt: u8,
    /// Maximum cell voltage, 20 mV per bit.
    pub max_volt: u8,
    pub min_temp: i8,
    pub max_temp: i8,
    pub avg_temp: i8,
    pub volt_low: bool,
    pub volt_high: bool,
    pub temp_low: bool,
    pub temp_high: bool,
    pub temp_high_while_charging: bool,
}

impl BmsSnapshot {
    pub fn new(frame: CellFrame, stats: &FaultStats, state: ThreadState, is_balancing: bool) -> Self {
        BmsSnapshot {
            voltages: frame.voltages,
            temperatures: frame.temperatures,
            fault_bitmap: stats.fault_bitmap,
            state,
            is_balancing,
            min_volt: scale_voltage(stats.min_voltage),
            max_volt: scale_voltage(stats.max_voltage),
            min_temp: stats.min_temp,
            max_temp: stats.max_temp,
            avg_temp: stats.avg_temp,
            volt_low: stats.volt_low,
            volt_high: stats.volt_high,
            temp_low: stats.temp_low,
            temp_high: stats.temp_high,
            temp_high_while_charging: stats.temp_high_while_charging,
        }
    }

    pub fn pack_voltage_mv(&self) -> u32 {
        self.voltages.iter().map(|&v| v as u32).sum()
    }

    pub fn has_fault(&self) -> bool {
        self.state == ThreadState::Fault
    }
}

/// mV → 20 mV/bit, saturating.
pub fn scale_voltage(mv: u16) -> u8 {
    (mv as u32 * 50 / 1000).min(u8::MAX as u32) as u8
}
