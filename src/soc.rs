//! Open-circuit state-of-charge estimate from the average cell voltage.

use crate::config::{CELL_CAPACITY_RATED_MAH, CELL_COUNT};

/// Cell voltage (mV) → capacity already discharged (mAh). The last segment
/// (4100..4200 mV) is interpolated too, it is not clamped to 0 mAh.
const DISCHARGE_CURVE: [(u32, u32); 15] = [
    (2800, 50_000),
    (2900, 49_600),
    (3000, 48_000),
    (3100, 47_000),
    (3200, 45_000),
    (3300, 43_400),
    (3400, 40_400),
    (3500, 36_000),
    (3600, 32_000),
    (3700, 25_400),
    (3800, 18_200),
    (3900, 14_200),
    (4000, 8_000),
    (4100, 3_600),
    (4200, 0),
];

/// Capacity discharged from one cell, interpolated on the average cell
/// voltage of a pack at `pack_mv`.
pub fn capacity_discharged_mah(pack_mv: u32) -> u32 {
    let cell_mv = pack_mv / CELL_COUNT as u32;

    let (first_mv, _) = DISCHARGE_CURVE[0];
    if cell_mv < first_mv {
        return CELL_CAPACITY_RATED_MAH;
    }

    for pair in DISCHARGE_CURVE.windows(2) {
        let (low_mv, low_mah) = pair[0];
        let (high_mv, high_mah) = pair[1];
        if cell_mv < high_mv {
            // capacity falls as voltage rises
            return low_mah - (cell_mv - low_mv) * (low_mah - high_mah) / (high_mv - low_mv);
        }
    }

    0
}

/// Percentage of rated capacity left, 0..=100.
pub fn state_of_charge(pack_mv: u32) -> u8 {
    let discharged = capacity_discharged_mah(pack_mv).min(CELL_CAPACITY_RATED_MAH);
    (100 - 100 * discharged / CELL_CAPACITY_RATED_MAH) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(cell_mv: u32) -> u32 {
        cell_mv * CELL_COUNT as u32
    }

    #[test]
    fn table_points_are_exact() {
        assert_eq!(capacity_discharged_mah(pack(2800)), 50_000);
        assert_eq!(capacity_discharged_mah(pack(3700)), 25_400);
        assert_eq!(capacity_discharged_mah(pack(4100)), 3_600);
    }

    #[test]
    fn interpolates_between_points() {
        // halfway between 3700 (25400) and 3800 (18200)
        assert_eq!(capacity_discharged_mah(pack(3750)), 21_800);
        assert_eq!(capacity_discharged_mah(pack(4150)), 1_800);
    }

    #[test]
    fn out_of_range_saturates() {
        assert_eq!(capacity_discharged_mah(pack(2500)), CELL_CAPACITY_RATED_MAH);
        assert_eq!(capacity_discharged_mah(pack(4200)), 0);
        assert_eq!(capacity_discharged_mah(pack(4350)), 0);
        assert_eq!(state_of_charge(0), 0);
        assert_eq!(state_of_charge(pack(4200)), 100);
    }

    #[test]
    fn soc_follows_discharged_capacity() {
        // 25400 of 50000 mAh gone: 100 - 50 (truncated from 50.8)
        assert_eq!(state_of_charge(pack(3700)), 50);
        assert_eq!(state_of_charge(pack(3900)), 72);
    }
}
