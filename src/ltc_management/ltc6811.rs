use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{Operation, SpiDevice};

use super::bus::{BusError, ChipBus, Configuration, DischargeMask, GpioOutputState, MuxSelect, RegisterGroup};
use super::command::Command;
use crate::config::BANK_COUNT;

/// isoSPI port wake-up time, one per chip in the chain.
const WAKE_DELAY_US: u32 = 300;
const POLL_INTERVAL_US: u32 = 200;

const CRC15_TABLE: [u16; 256] = [
    0x0, 0xc599, 0xceab, 0xb32, 0xd8cf, 0x1d56, 0x1664, 0xd3fd, 0xf407, 0x319e, 0x3aac, 0xff35,
    0x2cc8, 0xe951, 0xe263, 0x27fa, 0xad97, 0x680e, 0x633c, 0xa6a5, 0x7558, 0xb0c1, 0xbbf3, 0x7e6a,
    0x5990, 0x9c09, 0x973b, 0x52a2, 0x815f, 0x44c6, 0x4ff4, 0x8a6d, 0x5b2e, 0x9eb7, 0x9585, 0x501c,
    0x83e1, 0x4678, 0x4d4a, 0x88d3, 0xaf29, 0x6ab0, 0x6182, 0xa41b, 0x77e6, 0xb27f, 0xb94d, 0x7cd4,
    0xf6b9, 0x3320, 0x3812, 0xfd8b, 0x2e76, 0xebef, 0xe0dd, 0x2544, 0x2be, 0xc727, 0xcc15, 0x98c,
    0xda71, 0x1fe8, 0x14da, 0xd143, 0xf3c5, 0x365c, 0x3d6e, 0xf8f7, 0x2b0a, 0xee93, 0xe5a1, 0x2038,
    0x7c2, 0xc25b, 0xc969, 0xcf0, 0xdf0d, 0x1a94, 0x11a6, 0xd43f, 0x5e52, 0x9bcb, 0x90f9, 0x5560,
    0x869d, 0x4304, 0x4836, 0x8daf, 0xaa55, 0x6fcc, 0x64fe, 0xa167, 0x729a, 0xb703, 0xbc31, 0x79a8,
    0xa8eb, 0x6d72, 0x6640, 0xa3d9, 0x7024, 0xb5bd, 0xbe8f, 0x7b16, 0x5cec, 0x9975, 0x9247, 0x57de,
    0x8423, 0x41ba, 0x4a88, 0x8f11, 0x57c, 0xc0e5, 0xcbd7, 0xe4e, 0xddb3, 0x182a, 0x1318, 0xd681,
    0xf17b, 0x34e2, 0x3fd0, 0xfa49, 0x29b4, 0xec2d, 0xe71f, 0x2286, 0xa213, 0x678a, 0x6cb8, 0xa921,
    0x7adc, 0xbf45, 0xb477, 0x71ee, 0x5614, 0x938d, 0x98bf, 0x5d26, 0x8edb, 0x4b42, 0x4070, 0x85e9,
    0xf84, 0xca1d, 0xc12f, 0x4b6, 0xd74b, 0x12d2, 0x19e0, 0xdc79, 0xfb83, 0x3e1a, 0x3528, 0xf0b1,
    0x234c, 0xe6d5, 0xede7, 0x287e, 0xf93d, 0x3ca4, 0x3796, 0xf20f, 0x21f2, 0xe46b, 0xef59, 0x2ac0,
    0xd3a, 0xc8a3, 0xc391, 0x608, 0xd5f5, 0x106c, 0x1b5e, 0xdec7, 0x54aa, 0x9133, 0x9a01, 0x5f98,
    0x8c65, 0x49fc, 0x42ce, 0x8757, 0xa0ad, 0x6534, 0x6e06, 0xab9f, 0x7862, 0xbdfb, 0xb6c9, 0x7350,
    0x51d6, 0x944f, 0x9f7d, 0x5ae4, 0x8919, 0x4c80, 0x47b2, 0x822b, 0xa5d1, 0x6048, 0x6b7a, 0xaee3,
    0x7d1e, 0xb887, 0xb3b5, 0x762c, 0xfc41, 0x39d8, 0x32ea, 0xf773, 0x248e, 0xe117, 0xea25, 0x2fbc,
    0x846, 0xcddf, 0xc6ed, 0x374, 0xd089, 0x1510, 0x1e22, 0xdbbb, 0xaf8, 0xcf61, 0xc453, 0x1ca,
    0xd237, 0x17ae, 0x1c9c, 0xd905, 0xfeff, 0x3b66, 0x3054, 0xf5cd, 0x2630, 0xe3a9, 0xe89b, 0x2d02,
    0xa76f, 0x62f6, 0x69c4, 0xac5d, 0x7fa0, 0xba39, 0xb10b, 0x7492, 0x5368, 0x96f1, 0x9dc3, 0x585a,
    0x8ba7, 0x4e3e, 0x450c, 0x8095,
];

/// Packet error code (CRC15, seed 16) for an LTC681x command or register group.
pub fn calculate_pec(data: &[u8]) -> [u8; 2] {
    let mut remainder: u16 = 16;

    for byte in data {
        let address = (((remainder >> 7) ^ (*byte as u16)) & 0xff) as usize;
        remainder = (remainder << 8) ^ CRC15_TABLE[address];
    }

    // The CRC15 has a 0 in the LSB
    remainder <<= 1;

    [(remainder >> 8) as u8, remainder as u8]
}

fn with_pec(cmd: [u8; 2]) -> [u8; 4] {
    let pec = calculate_pec(&cmd);
    [cmd[0], cmd[1], pec[0], pec[1]]
}

/// LTC6811-2 chain behind one SPI device, banks addressed by index.
pub struct Ltc6811Bus<SPI, D> {
    spi: SPI,
    delay: D,
    configs: [Configuration; BANK_COUNT],
}

impl<SPI, D> Ltc6811Bus<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    pub fn new(spi: SPI, delay: D) -> Self {
        Ltc6811Bus {
            spi,
            delay,
            configs: [Configuration::new(); BANK_COUNT],
        }
    }

    /// Staged configuration of `bank`, as it will be sent on the next write.
    pub fn config(&self, bank: usize) -> Option<&Configuration> {
        self.configs.get(bank)
    }

    fn address(bank: usize) -> Result<u8, BusError> {
        if bank < BANK_COUNT {
            Ok(bank as u8)
        } else {
            Err(BusError::InvalidBank)
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.spi.write(frame).await.map_err(|_| BusError::Spi)
    }
}

impl<SPI, D> ChipBus for Ltc6811Bus<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    async fn wake(&mut self) {
        for _ in 0..BANK_COUNT {
            if self.spi.write(&[0xFF]).await.is_err() {
                warn!("wake pulse failed");
            }
            self.delay.delay_us(WAKE_DELAY_US).await;
        }
    }

    async fn send_broadcast(&mut self, cmd: Command) -> Result<(), BusError> {
        self.write_frame(&with_pec(cmd.broadcast())).await
    }

    async fn send_addressed(&mut self, cmd: Command, bank: usize) -> Result<(), BusError> {
        let address = Self::address(bank)?;
        self.write_frame(&with_pec(cmd.addressed(address))).await
    }

    async fn read_addressed(&mut self, cmd: Command, bank: usize) -> Result<RegisterGroup, BusError> {
        let address = Self::address(bank)?;
        let tx = with_pec(cmd.addressed(address));
        let mut rx = [0u8; 8];

        self.spi
            .transaction(&mut [Operation::Write(&tx), Operation::Read(&mut rx)])
            .await
            .map_err(|_| BusError::Spi)?;

        if calculate_pec(&rx[..6]) != [rx[6], rx[7]] {
            return Err(BusError::Pec);
        }

        let mut data = [0u8; 6];
        data.copy_from_slice(&rx[..6]);
        Ok(data)
    }

    async fn poll_adc_completion(&mut self, bank: usize, timeout_ms: u32) -> Result<(), BusError> {
        let address = Self::address(bank)?;
        let tx = with_pec(Command::PollAdcStatus.addressed(address));
        let attempts = (timeout_ms.saturating_mul(1000) / POLL_INTERVAL_US).max(1);

        // SDO is held low until the conversion finishes
        for _ in 0..attempts {
            let mut status = [0u8; 1];
            self.spi
                .transaction(&mut [Operation::Write(&tx), Operation::Read(&mut status)])
                .await
                .map_err(|_| BusError::Spi)?;
            if status[0] != 0 {
                return Ok(());
            }
            self.delay.delay_us(POLL_INTERVAL_US).await;
        }

        Err(BusError::PollTimeout)
    }

    fn set_discharge_mask(&mut self, bank: usize, mask: DischargeMask) {
        if let Some(cfg) = self.configs.get_mut(bank) {
            cfg.discharge = mask;
        }
    }

    fn set_mux_select(&mut self, bank: usize, select: MuxSelect) {
        if let Some(cfg) = self.configs.get_mut(bank) {
            cfg.set_mux(select);
        }
    }

    fn set_status_line(&mut self, bank: usize, state: GpioOutputState) {
        if let Some(cfg) = self.configs.get_mut(bank) {
            cfg.gpio[4] = state;
        }
    }

    async fn write_config(&mut self, bank: usize) -> Result<(), BusError> {
        let address = Self::address(bank)?;
        let cmd = with_pec(Command::WriteConfigA.addressed(address));
        let data = self.configs[bank].encode();
        let pec = calculate_pec(&data);

        let mut frame = [0u8; 12];
        frame[0..4].copy_from_slice(&cmd);
        frame[4..10].copy_from_slice(&data);
        frame[10..12].copy_from_slice(&pec);

        self.write_frame(&frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltc_management::command::{AdcMode, CellGroup, CellSelection};
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    /// Records written frames and answers reads from a queue.
    #[derive(Default)]
    struct FakeSpi {
        written: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl embedded_hal_async::spi::ErrorType for FakeSpi {
        type Error = Infallible;
    }

    impl SpiDevice for FakeSpi {
        async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            for op in operations {
                match op {
                    Operation::Write(buf) => self.written.push(buf.to_vec()),
                    Operation::Read(buf) => {
                        let reply = self.replies.pop_front().unwrap_or_default();
                        for (dst, src) in buf.iter_mut().zip(reply.iter()) {
                            *dst = *src;
                        }
                    }
                    Operation::Transfer(read, write) => {
                        self.written.push(write.to_vec());
                        read.fill(0);
                    }
                    Operation::TransferInPlace(buf) => {
                        self.written.push(buf.to_vec());
                        buf.fill(0);
                    }
                    Operation::DelayNs(_) => {}
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    fn group_with_pec(data: [u8; 6]) -> Vec<u8> {
        let mut reply = data.to_vec();
        reply.extend_from_slice(&calculate_pec(&data));
        reply
    }

    #[test]
    fn pec_matches_datasheet_values() {
        assert_eq!(calculate_pec(&[0x00, 0x01]), [0x3D, 0x6E]);
        assert_eq!(calculate_pec(&[0x00, 0x04]), [0x07, 0xC2]);
        // ADCV, 7 kHz, all cells
        assert_eq!(calculate_pec(&[0x03, 0x60]), [0xF4, 0x6C]);
    }

    #[test]
    fn addressed_read_checks_pec() {
        let mut spi = FakeSpi::default();
        let data = [0x65, 0x95, 0x65, 0x95, 0x65, 0x95];
        spi.replies.push_back(group_with_pec(data));
        let mut corrupted = group_with_pec(data);
        corrupted[2] ^= 0x01;
        spi.replies.push_back(corrupted);

        let mut bus = Ltc6811Bus::new(spi, NoDelay);
        let cmd = Command::ReadCellVoltage(CellGroup::A);

        assert_eq!(block_on(bus.read_addressed(cmd, 0)), Ok(data));
        assert_eq!(block_on(bus.read_addressed(cmd, 0)), Err(BusError::Pec));
        assert_eq!(bus.spi.written[0], std::vec![0x80, 0x04, 0x77, 0xD6]);
    }

    #[test]
    fn out_of_range_bank_is_rejected() {
        let mut bus = Ltc6811Bus::new(FakeSpi::default(), NoDelay);
        let cmd = Command::StartCellVoltageAdc {
            mode: AdcMode::K7k,
            discharge_permitted: false,
            cells: CellSelection::All,
        };
        assert_eq!(block_on(bus.send_addressed(cmd, BANK_COUNT)), Err(BusError::InvalidBank));
        assert_eq!(block_on(bus.write_config(BANK_COUNT)), Err(BusError::InvalidBank));
        assert!(bus.spi.written.is_empty());
    }

    #[test]
    fn broadcast_frame_carries_pec() {
        let mut bus = Ltc6811Bus::new(FakeSpi::default(), NoDelay);
        let cmd = Command::StartCellVoltageAdc {
            mode: AdcMode::K7k,
            discharge_permitted: false,
            cells: CellSelection::All,
        };
        assert_eq!(block_on(bus.send_broadcast(cmd)), Ok(()));
        assert_eq!(bus.spi.written[0], std::vec![0x03, 0x60, 0xF4, 0x6C]);
    }

    #[test]
    fn write_config_sends_staged_register() {
        let mut bus = Ltc6811Bus::new(FakeSpi::default(), NoDelay);
        bus.set_discharge_mask(2, DischargeMask::from_bits(0x0107));
        bus.set_status_line(2, GpioOutputState::Low);
        block_on(bus.write_config(2)).unwrap();

        let frame = &bus.spi.written[0];
        assert_eq!(frame.len(), 12);
        assert_eq!(frame[0..2], Command::WriteConfigA.addressed(2));
        let data: [u8; 6] = frame[4..10].try_into().unwrap();
        assert_eq!(data, bus.config(2).unwrap().encode());
        assert_eq!(data[4], 0x07);
        assert_eq!(data[5] & 0x0F, 0x01);
        assert_eq!(data[0] & 0x80, 0);
        assert_eq!(frame[10..12], calculate_pec(&data));

        // other banks keep their own staging
        assert_eq!(bus.config(1).unwrap().discharge, DischargeMask::NONE);
    }

    #[test]
    fn poll_times_out_when_sdo_stays_low() {
        let mut bus = Ltc6811Bus::new(FakeSpi::default(), NoDelay);
        assert_eq!(block_on(bus.poll_adc_completion(0, 1)), Err(BusError::PollTimeout));

        let mut spi = FakeSpi::default();
        spi.replies.push_back(std::vec![0x00]);
        spi.replies.push_back(std::vec![0xFF]);
        let mut bus = Ltc6811Bus::new(spi, NoDelay);
        assert_eq!(block_on(bus.poll_adc_completion(3, 1)), Ok(()));
        assert_eq!(bus.spi.written.len(), 2);
    }
}
