//! Pack topology and task timing. Fault thresholds live in [`crate::types`].
//!
//! Everything here is fixed at compile time; changing the wiring of a segment
//! means editing [`CELL_MAP`] and the counts below.

/// Number of LTC6811 banks on the isoSPI bus.
pub const BANK_COUNT: usize = 5;

/// Cell voltage readings per bank.
pub const CELLS_PER_BANK: usize = 6;

/// Temperature readings per bank, one thermistor per cell.
pub const TEMPS_PER_BANK: usize = CELLS_PER_BANK;

/// Physical cell inputs on one LTC6811.
pub const CHANNELS_PER_BANK: usize = 12;

pub const CELL_COUNT: usize = BANK_COUNT * CELLS_PER_BANK;
pub const TEMP_COUNT: usize = BANK_COUNT * TEMPS_PER_BANK;

/// Mapping from LTC6811 cell input to logical cell index inside the bank.
/// `None` marks an input that is not wired.
pub const CELL_MAP: [Option<u8>; CHANNELS_PER_BANK] = [
    Some(0),
    Some(1),
    Some(2),
    None,
    None,
    None,
    Some(3),
    Some(4),
    Some(5),
    None,
    None,
    None,
];

/// Rated capacity of one cell (mAh).
pub const CELL_CAPACITY_RATED_MAH: u32 = 50_000;

// Timing, all in milliseconds
pub const SELF_TEST_SETTLE_MS: u32 = 4;
pub const DISCHARGE_OFF_SETTLE_MS: u32 = 5;
pub const CELL_ADC_SETTLE_MS: u32 = 10;
pub const AUX_ADC_SETTLE_MS: u32 = 5;
pub const ADC_POLL_TIMEOUT_MS: u32 = 5;
pub const CYCLE_PERIOD_MS: u32 = 100;
pub const CYCLE_PERIOD_CHARGING_MS: u32 = 500;
pub const FAULT_RECOVER_EXTRA_MS: u32 = 10;

/// Depth of the supervisor → BMS command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 4;
/// Depth of the BMS → supervisor snapshot queue.
pub const SNAPSHOT_QUEUE_DEPTH: usize = 4;

const fn cell_map_is_valid() -> bool {
    let mut seen = [false; CELLS_PER_BANK];
    let mut connected = 0;
    let mut i = 0;
    while i < CHANNELS_PER_BANK {
        if let Some(cell) = CELL_MAP[i] {
            let cell = cell as usize;
            if cell >= CELLS_PER_BANK || seen[cell] {
                return false;
            }
            seen[cell] = true;
            connected += 1;
        }
        i += 1;
    }
    connected == CELLS_PER_BANK
}

const _: () = assert!(cell_map_is_valid(), "CELL_MAP must cover every cell exactly once");
const _: () = assert!(CELL_COUNT <= 32, "fault bitmap holds at most 32 cells");
const _: () = assert!(TEMP_COUNT <= 32, "read mask holds at most 32 sensors");
const _: () = assert!(TEMPS_PER_BANK <= 8, "temperature mux has three select lines");

/// Physical channel that carries logical cell `cell`, if any.
pub const fn channel_of_cell(cell: usize) -> Option<usize> {
    let mut i = 0;
    while i < CHANNELS_PER_BANK {
        if let Some(c) = CELL_MAP[i] {
            if c as usize == cell {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}
