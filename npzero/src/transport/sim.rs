//! Simulated nPZero on an I2C bus.
//!
//! [`SimBus`] is a 256-byte register file behind one device address. It
//! records every completed transaction, models the two SLEEP_RST commands,
//! and can be told to NAK particular registers or to stop answering
//! altogether. Transactions that fail are not recorded.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::hw_trait::{HwError, I2cError, Result, i2c::I2c};
use crate::peripheral::npz::protocol::{DEFAULT_ADDRESS, EXPECTED_CHIP_ID, regs, sleep_rst};

/// STA1 after power-on: reset source PowerOn.
const STA1_POWER_ON: u8 = 0x01;
/// STA1 after a soft reset: reset source Soft.
const STA1_SOFT_RESET: u8 = 0x04;

/// A completed bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// Register pointer followed by `data`, which may be empty.
    Write { register: u8, data: Vec<u8> },
    /// `len` bytes read starting at `register`.
    Read { register: u8, len: usize },
}

/// Register-file model of the device.
#[derive(Debug, Clone)]
pub struct SimBus {
    address: u8,
    registers: [u8; 256],
    pointer: u8,
    log: Vec<Transaction>,
    nak: HashSet<u8>,
    stalled: bool,
    asleep: bool,
    frequency: Option<u32>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// A freshly powered device at the default address.
    pub fn new() -> Self {
        Self::with_address(DEFAULT_ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            registers: power_on_registers(),
            pointer: 0,
            log: Vec::new(),
            nak: HashSet::new(),
            stalled: false,
            asleep: false,
            frequency: None,
        }
    }

    pub fn set_register(&mut self, reg: u8, value: u8) {
        self.registers[reg as usize] = value;
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.registers[reg as usize]
    }

    /// Every transaction that completed, in order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Completed writes flattened to (register, value) pairs, following
    /// auto-increment for multi-byte writes.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { register, data } => Some((*register, data)),
                Transaction::Read { .. } => None,
            })
            .flat_map(|(register, data)| {
                data.iter()
                    .enumerate()
                    .map(move |(i, byte)| (register.wrapping_add(i as u8), *byte))
            })
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// NAK any transaction that touches `reg`.
    pub fn nak_on(&mut self, reg: u8) {
        self.nak.insert(reg);
    }

    pub fn clear_naks(&mut self) {
        self.nak.clear();
    }

    /// Stop answering. Every later call pends forever.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    /// True once SLEEP has been written and until [`SimBus::wake`].
    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    /// Hand the bus back to the host, as the device does when it wakes it.
    pub fn wake(&mut self) {
        self.asleep = false;
    }

    /// Clock rate last set through [`I2c::set_frequency`].
    pub fn frequency(&self) -> Option<u32> {
        self.frequency
    }

    fn check(&self, addr: u8, first: u8, len: usize) -> Result<()> {
        if addr != self.address || self.asleep {
            return Err(I2cError::Nak(addr).into());
        }
        if (0..len.max(1))
            .map(|i| first.wrapping_add(i as u8))
            .any(|reg| self.nak.contains(&reg))
        {
            return Err(I2cError::Nak(addr).into());
        }
        Ok(())
    }

    fn store(&mut self, register: u8, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let reg = register.wrapping_add(i as u8);
            if reg == regs::SLEEP_RST {
                self.command(*byte);
            } else if reg != regs::ID {
                self.registers[reg as usize] = *byte;
            }
        }
    }

    fn command(&mut self, byte: u8) {
        match byte {
            sleep_rst::SLEEP => self.asleep = true,
            sleep_rst::SOFT_RESET => {
                self.registers = power_on_registers();
                self.registers[regs::STA1 as usize] = STA1_SOFT_RESET;
            }
            _ => {}
        }
    }

    fn load(&mut self, register: u8, buffer: &mut [u8]) {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.registers[register.wrapping_add(i as u8) as usize];
        }
        self.pointer = register.wrapping_add(buffer.len() as u8);
    }
}

fn power_on_registers() -> [u8; 256] {
    let mut registers = [0u8; 256];
    registers[regs::ID as usize] = EXPECTED_CHIP_ID;
    registers[regs::STA1 as usize] = STA1_POWER_ON;
    registers
}

#[async_trait]
impl I2c for SimBus {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        if self.stalled {
            return std::future::pending().await;
        }
        let Some((&register, payload)) = data.split_first() else {
            return Err(HwError::InvalidParameter(
                "write needs a register address".into(),
            ));
        };
        self.check(addr, register, payload.len())?;

        self.store(register, payload);
        self.pointer = register.wrapping_add(payload.len() as u8);
        self.log.push(Transaction::Write {
            register,
            data: payload.to_vec(),
        });
        Ok(())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        if self.stalled {
            return std::future::pending().await;
        }
        let register = self.pointer;
        self.check(addr, register, buffer.len())?;

        self.load(register, buffer);
        self.log.push(Transaction::Read {
            register,
            len: buffer.len(),
        });
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        if self.stalled {
            return std::future::pending().await;
        }
        let &[register] = write else {
            return Err(HwError::InvalidParameter(format!(
                "expected a single register address, got {} bytes",
                write.len()
            )));
        };
        self.check(addr, register, read.len())?;

        self.load(register, read);
        self.log.push(Transaction::Read {
            register,
            len: read.len(),
        });
        Ok(())
    }

    async fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(HwError::InvalidParameter("frequency must be non-zero".into()));
        }
        self.frequency = Some(hz);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multi_byte_write_auto_increments() {
        let mut bus = SimBus::new();
        bus.write(DEFAULT_ADDRESS, &[0x80, 1, 2, 3]).await.unwrap();
        assert_eq!(bus.writes(), vec![(0x80, 1), (0x81, 2), (0x82, 3)]);
        assert_eq!(bus.register(0x82), 3);
    }

    #[tokio::test]
    async fn plain_read_continues_from_pointer() {
        let mut bus = SimBus::new();
        bus.set_register(0x50, 0xAA);
        bus.set_register(0x51, 0xBB);
        bus.write(DEFAULT_ADDRESS, &[0x50]).await.unwrap();

        let mut buf = [0u8; 2];
        bus.read(DEFAULT_ADDRESS, &mut buf).await.unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);
        assert_eq!(
            bus.transactions().last(),
            Some(&Transaction::Read {
                register: 0x50,
                len: 2
            })
        );
    }

    #[tokio::test]
    async fn id_register_is_read_only() {
        let mut bus = SimBus::new();
        bus.write(DEFAULT_ADDRESS, &[regs::ID, 0x00]).await.unwrap();
        assert_eq!(bus.register(regs::ID), EXPECTED_CHIP_ID);
    }

    #[tokio::test]
    async fn sleep_naks_until_woken() {
        let mut bus = SimBus::new();
        bus.write(DEFAULT_ADDRESS, &[regs::SLEEP_RST, sleep_rst::SLEEP])
            .await
            .unwrap();
        assert!(bus.is_asleep());

        let mut buf = [0u8; 1];
        let err = bus
            .write_read(DEFAULT_ADDRESS, &[regs::ID], &mut buf)
            .await
            .unwrap_err();
        assert_eq!(err, HwError::I2c(I2cError::Nak(DEFAULT_ADDRESS)));

        bus.wake();
        bus.write_read(DEFAULT_ADDRESS, &[regs::ID], &mut buf)
            .await
            .unwrap();
        assert_eq!(buf[0], EXPECTED_CHIP_ID);
    }

    #[tokio::test]
    async fn soft_reset_restores_defaults() {
        let mut bus = SimBus::new();
        bus.set_register(regs::PSWCTL, 0x2C);
        bus.write(DEFAULT_ADDRESS, &[regs::SLEEP_RST, sleep_rst::SOFT_RESET])
            .await
            .unwrap();
        assert_eq!(bus.register(regs::PSWCTL), 0);
        assert_eq!(bus.register(regs::STA1), STA1_SOFT_RESET);
        assert!(!bus.is_asleep());
    }

    #[tokio::test]
    async fn nak_covers_every_touched_register() {
        let mut bus = SimBus::new();
        bus.nak_on(0x81);
        assert!(bus.write(DEFAULT_ADDRESS, &[0x80, 1, 2]).await.is_err());
        assert!(bus.transactions().is_empty());
        assert_eq!(bus.register(0x80), 0);

        bus.clear_naks();
        bus.write(DEFAULT_ADDRESS, &[0x80, 1, 2]).await.unwrap();
        assert_eq!(bus.register(0x81), 2);
    }

    #[tokio::test]
    async fn other_addresses_nak() {
        let mut bus = SimBus::new();
        let err = bus.write(0x50, &[0x00, 0x00]).await.unwrap_err();
        assert_eq!(err, HwError::I2c(I2cError::Nak(0x50)));
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let mut bus = SimBus::new();
        assert!(matches!(
            bus.write(DEFAULT_ADDRESS, &[]).await,
            Err(HwError::InvalidParameter(_))
        ));
        let mut buf = [0u8; 1];
        assert!(matches!(
            bus.write_read(DEFAULT_ADDRESS, &[0x01, 0x02], &mut buf).await,
            Err(HwError::InvalidParameter(_))
        ));
        assert!(bus.set_frequency(0).await.is_err());
    }
}
