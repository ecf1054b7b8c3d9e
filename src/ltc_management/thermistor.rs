//! NTC thermistor on the mux output, 10 kΩ pull-up to the 3.3 V reference.

use libm::{logf, roundf};

/// Divider supply (mV).
const VREF_MV: u16 = 3300;
/// Fixed pull-up resistor (Ω).
const R_PULLUP_OHM: f32 = 10_000.0;
/// Thermistor resistance at 25 °C (Ω).
const R_NOMINAL_OHM: f32 = 10_000.0;
/// Beta coefficient (K).
const B_COEFF: f32 = 3950.0;
const T_NOMINAL_K: f32 = 298.15;
const KELVIN_2_CELSIUS: f32 = 273.15;

/// Converts the divider voltage to °C.
///
/// A shorted sensor (0 mV) reads as [`i8::MAX`] and an open one (at or above
/// the reference) as [`i8::MIN`], so both trip the fault thresholds.
pub fn temperature_from_mv(mv: u16) -> i8 {
    if mv == 0 {
        return i8::MAX;
    }
    if mv >= VREF_MV {
        return i8::MIN;
    }

    let v_out = mv as f32;
    let r_th = R_PULLUP_OHM * v_out / (VREF_MV as f32 - v_out);

    // 1/T = 1/T0 + ln(R/R0)/B
    let inv_t = 1.0 / T_NOMINAL_K + logf(r_th / R_NOMINAL_OHM) / B_COEFF;
    let celsius = roundf(1.0 / inv_t - KELVIN_2_CELSIUS);

    if celsius >= i8::MAX as f32 {
        i8::MAX
    } else if celsius <= i8::MIN as f32 {
        i8::MIN
    } else {
        celsius as i8
    }
}
