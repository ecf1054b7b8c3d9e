use crate::config::{BANK_COUNT, CELLS_PER_BANK, CELL_MAP};
use crate::ltc_management::DischargeMask;
use crate::types::{CellFrame, ThreadState, Voltages};

/// Discharge masks for every bank, valid for one cycle.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BalancePlan {
    pub masks: [DischargeMask; BANK_COUNT],
}

impl BalancePlan {
    pub const fn off() -> Self {
        BalancePlan {
            masks: [DischargeMask::NONE; BANK_COUNT],
        }
    }

    pub fn is_balancing(&self) -> bool {
        self.masks.iter().any(|m| !m.is_empty())
    }
}

pub struct BalancingController;

impl BalancingController {
    /// Picks the cells to bleed. Only balances in `Idle` with the supervisor's
    /// permission; a cell is bled when it is at or above the balance floor and
    /// at least the discharge hysteresis above the pack minimum.
    pub fn plan(frame: &CellFrame, min_voltage: u16, state: ThreadState, balance_allowed: bool) -> BalancePlan {
        let mut plan = BalancePlan::off();
        if state != ThreadState::Idle || !balance_allowed {
            return plan;
        }

        let floor = Voltages::Balance.as_raw();
        let target = min_voltage.saturating_add(Voltages::Discharge.as_raw());

        for (bank, mask) in plan.masks.iter_mut().enumerate() {
            for (channel, cell) in CELL_MAP.iter().enumerate() {
                let Some(cell) = cell else { continue };
                let index = bank * CELLS_PER_BANK + *cell as usize;
                let voltage = frame.voltages[index];
                if frame.voltage_read(index) && voltage >= floor && voltage >= target {
                    mask.set(channel);
                }
            }
        }

        if plan.is_balancing() {
            debug!("balancing above {} mV", target);
        }
        plan
    }
}
