//! The BMS task: sample, evaluate, debounce, balance, publish, sleep.

pub mod balancing;
pub mod state;

pub use balancing::{BalancePlan, BalancingController};
pub use state::{StateAction, ThreadStateMachine};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config::{CYCLE_PERIOD_CHARGING_MS, CYCLE_PERIOD_MS, FAULT_RECOVER_EXTRA_MS};
use crate::events::BmsEndpoint;
use crate::ltc_management::{AcquisitionEngine, ChipBus, SelfTestReport};
use crate::types::{BmsSnapshot, FaultStats, MainToBmsCommand, ThreadState};

/// Sleep between cycles for the given charging mode (ms).
pub const fn cycle_period_ms(charging: bool) -> u32 {
    if charging {
        CYCLE_PERIOD_CHARGING_MS
    } else {
        CYCLE_PERIOD_MS
    }
}

pub struct BmsThread<'a, B, D, P, M, const CMD: usize, const SNAP: usize>
where
    M: RawMutex,
{
    engine: AcquisitionEngine<B>,
    delay: D,
    fault_line: P,
    events: BmsEndpoint<'a, M, CMD, SNAP>,
    machine: ThreadStateMachine,
    command: MainToBmsCommand,
    dropped_snapshots: u32,
}

impl<'a, B, D, P, M, const CMD: usize, const SNAP: usize> BmsThread<'a, B, D, P, M, CMD, SNAP>
where
    B: ChipBus,
    D: DelayNs,
    P: OutputPin,
    M: RawMutex,
{
    pub fn new(bus: B, delay: D, fault_line: P, events: BmsEndpoint<'a, M, CMD, SNAP>) -> Self {
        BmsThread {
            engine: AcquisitionEngine::new(bus),
            delay,
            fault_line,
            events,
            machine: ThreadStateMachine::new(),
            command: MainToBmsCommand::default(),
            dropped_snapshots: 0,
        }
    }

    pub fn state(&self) -> ThreadState {
        self.machine.state()
    }

    /// Command in force for the current cycle.
    pub fn command(&self) -> MainToBmsCommand {
        self.command
    }

    /// Snapshots lost because the supervisor queue was full.
    pub fn dropped_snapshots(&self) -> u32 {
        self.dropped_snapshots
    }

    pub fn engine(&self) -> &AcquisitionEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AcquisitionEngine<B> {
        &mut self.engine
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn fault_line(&self) -> &P {
        &self.fault_line
    }

    /// Configures every bank and runs the self test; the thread is `Idle`
    /// afterwards whatever the result.
    pub async fn start(&mut self) -> SelfTestReport {
        self.engine.configure().await;
        let report = self.engine.self_test(&mut self.delay).await;
        self.machine.startup_complete();
        info!("BMS startup complete, state {}", self.machine.state());
        report
    }

    /// One full cycle including the trailing sleep. Returns what was published
    /// (or would have been, had the queue had room).
    pub async fn run_cycle(&mut self) -> BmsSnapshot {
        self.command = self.events.drain_commands(self.command);

        let frame = self.engine.sample(&mut self.delay).await;
        let stats = FaultStats::evaluate(&frame, self.command.charging);
        let fault_present = stats.fault_present();
        if fault_present {
            warn!(
                "threshold violated: volt {}..{} mV, temp {}..{} C",
                stats.min_voltage,
                stats.max_voltage,
                stats.min_temp,
                stats.max_temp
            );
        }

        match self.machine.on_evaluation(fault_present) {
            StateAction::ExtendCycle => {
                warn!("entering fault recovery");
                self.delay.delay_ms(FAULT_RECOVER_EXTRA_MS).await;
            }
            StateAction::AssertFault => self.assert_fault(),
            StateAction::None => {}
        }

        let plan = BalancingController::plan(
            &frame,
            stats.min_voltage,
            self.machine.state(),
            self.command.balance_allowed,
        );
        self.engine.apply_discharge(&plan.masks).await;

        let snapshot = BmsSnapshot::new(frame, &stats, self.machine.state(), plan.is_balancing());
        if !self.events.publish(snapshot) {
            self.dropped_snapshots = self.dropped_snapshots.wrapping_add(1);
            debug!("snapshot queue full, {} dropped", self.dropped_snapshots);
        }

        self.delay.delay_ms(cycle_period_ms(self.command.charging)).await;
        self.machine.end_of_cycle(fault_present);
        snapshot
    }

    pub async fn run(mut self) -> ! {
        self.start().await;
        loop {
            self.run_cycle().await;
        }
    }

    fn assert_fault(&mut self) {
        error!("BMS fault latched");
        if self.fault_line.set_high().is_err() {
            error!("failed to drive fault line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charging_slows_the_cycle() {
        assert_eq!(cycle_period_ms(false), 100);
        assert_eq!(cycle_period_ms(true), 500);
    }
}
