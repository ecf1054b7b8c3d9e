#![no_std]
#![no_main]

use bms_hv_rust::bms_thread::BmsThread;
use bms_hv_rust::config::{COMMAND_QUEUE_DEPTH, SNAPSHOT_QUEUE_DEPTH};
use bms_hv_rust::events::BmsEventChannels;
use bms_hv_rust::ltc_management::Ltc6811Bus;
use bms_hv_rust::soc::state_of_charge;
use bms_hv_rust::types::{MainToBmsCommand, ThreadState};
use defmt::{debug, info, warn};
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Duration, Ticker};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

mod board;

use board::{ltc_spi_device, prepare_config, LtcSpiDevice};

const SUPERVISOR_PERIOD_MS: u64 = 5;

type FirmwareBmsThread = BmsThread<
    'static,
    Ltc6811Bus<LtcSpiDevice, Delay>,
    Delay,
    Output<'static>,
    CriticalSectionRawMutex,
    COMMAND_QUEUE_DEPTH,
    SNAPSHOT_QUEUE_DEPTH,
>;

static EVENTS: StaticCell<BmsEventChannels> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(prepare_config());
    info!("BMS booting");

    let events: &'static BmsEventChannels = EVENTS.init(BmsEventChannels::new());

    let spi = ltc_spi_device(p.SPI1, p.PA5, p.PA7, p.PA6, p.PA4, p.DMA2_CH3, p.DMA2_CH0);
    let bus = Ltc6811Bus::new(spi, Delay);

    let fault_line = Output::new(p.PA2, Level::Low, Speed::High);
    let shutdown_sense = Input::new(p.PB0, Pull::Down);
    let charge_sense = Input::new(p.PB1, Pull::Down);
    let voltage_led = Output::new(p.PC11, Level::Low, Speed::Low);
    let temp_led = Output::new(p.PC9, Level::Low, Speed::Low);

    let bms = BmsThread::new(bus, Delay, fault_line, events.bms());

    spawner.spawn(bms_task(bms)).unwrap();
    spawner
        .spawn(supervisor_task(events, shutdown_sense, charge_sense, voltage_led, temp_led))
        .unwrap();
}

#[embassy_executor::task]
async fn bms_task(bms: FirmwareBmsThread) {
    bms.run().await
}

/// Feeds the shutdown-loop and charger inputs to the BMS task and reports
/// what comes back.
#[embassy_executor::task]
async fn supervisor_task(
    events: &'static BmsEventChannels,
    shutdown_sense: Input<'static>,
    charge_sense: Input<'static>,
    mut voltage_led: Output<'static>,
    mut temp_led: Output<'static>,
) {
    let supervisor = events.supervisor();
    let mut last_state = ThreadState::Startup;
    let mut ticker = Ticker::every(Duration::from_millis(SUPERVISOR_PERIOD_MS));

    loop {
        let command = MainToBmsCommand {
            balance_allowed: shutdown_sense.is_high(),
            charging: charge_sense.is_high(),
        };
        if !supervisor.try_send_command(command) {
            debug!("command queue full");
        }

        while let Some(snapshot) = supervisor.try_receive_snapshot() {
            if snapshot.state != last_state {
                info!("BMS state {} -> {}", last_state, snapshot.state);
                last_state = snapshot.state;
            }
            if snapshot.has_fault() {
                warn!("BMS fault, cells {=u32:#x}", snapshot.fault_bitmap);
            }

            voltage_led.set_level(Level::from(snapshot.volt_low || snapshot.volt_high));
            temp_led.set_level(Level::from(snapshot.temp_low || snapshot.temp_high));

            let pack_mv = snapshot.pack_voltage_mv();
            debug!(
                "pack {} mV, SoC {}%, temp {}/{}/{} C, balancing {}",
                pack_mv,
                state_of_charge(pack_mv),
                snapshot.min_temp,
                snapshot.avg_temp,
                snapshot.max_temp,
                snapshot.is_balancing
            );
        }

        ticker.next().await;
    }
}
