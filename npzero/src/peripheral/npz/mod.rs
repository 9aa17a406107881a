//! nPZero power-management companion chip driver.
//!
//! The nPZero keeps up to four peripherals powered, polled and compared
//! against thresholds while the host MCU is switched off, and wakes the host
//! when something interesting happens. The host programs it once over I2C,
//! hands over with [`Npz::sleep`], and reads the wake reasons back with
//! [`Npz::wake_report`] after it is powered up again.
//!
//! The module is split along the same lines as the device:
//!
//! - [`protocol`]: register addresses and the per-slot address table
//! - [`codec`]: typed register values and their bit layouts
//! - [`arena`]: packing of the 128-byte command SRAM
//! - [`config`]: the declarative [`DeviceConfig`]
//! - [`orchestrator`]: turning a [`DeviceConfig`] into register writes
//! - [`telemetry`]: ADC code and peripheral value interpretation

pub mod arena;
pub mod codec;
pub mod config;
mod dump;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod telemetry;
pub mod wake;

pub use config::{
    AdcChannelConfig, DeviceConfig, I2cPeripheral, PeripheralBus, PeripheralConfig, SpiPeripheral,
};
pub use error::{FieldError, NpzError, Result};
pub use orchestrator::{ConfigurationSession, ConfigureReport, Step, Unit};
pub use protocol::{DEFAULT_ADDRESS, Slot};

use std::time::Duration;

use crate::{
    hw_trait::{self, HwError, i2c::I2c},
    tracing::prelude::*,
};

use arena::ArenaRange;
use codec::{
    AdcChannel, GlobalRegister, GlobalWordRegister, Register, SlotRegister, SlotWordRegister,
};
use protocol::{EXPECTED_CHIP_ID, regs, sleep_rst};
use telemetry::AdcReading;

/// Time allowed for each bus transaction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1300);

/// Standard-mode I2C clock.
pub const BUS_FREQUENCY_HZ: u32 = 100_000;

/// nPZero driver
pub struct Npz<I: I2c> {
    i2c: I,
    address: u8,
    timeout: Duration,
}

impl<I: I2c> Npz<I> {
    /// Create a new driver with the default address
    pub fn new(i2c: I) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Create a new driver with a custom address
    pub fn new_with_address(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different per-transaction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn i2c(&self) -> &I {
        &self.i2c
    }

    pub fn i2c_mut(&mut self) -> &mut I {
        &mut self.i2c
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Bring up the bus and check that an nPZero answers on it.
    pub async fn init(&mut self) -> Result<()> {
        with_timeout(self.timeout, self.i2c.init()).await?;
        with_timeout(self.timeout, self.i2c.set_frequency(BUS_FREQUENCY_HZ)).await?;
        self.detect().await?;
        Ok(())
    }

    /// Read the chip ID and verify it.
    pub async fn detect(&mut self) -> Result<u8> {
        let id = self.read_register(regs::ID).await?;
        if id != EXPECTED_CHIP_ID {
            return Err(NpzError::UnexpectedChipId {
                found: id,
                expected: EXPECTED_CHIP_ID,
            });
        }

        debug!(id = format!("{:#04x}", id), "Detected nPZero");
        Ok(id)
    }

    /// Enter sleep. The device takes over the bus and powers the host down;
    /// nothing more should be sent until it wakes the host again.
    pub async fn sleep(&mut self) -> Result<()> {
        info!("Entering sleep, handing bus to nPZero");
        self.write_register(regs::SLEEP_RST, sleep_rst::SLEEP).await
    }

    /// Soft reset. Every configuration register returns to its default.
    pub async fn soft_reset(&mut self) -> Result<()> {
        debug!("Soft reset");
        self.write_register(regs::SLEEP_RST, sleep_rst::SOFT_RESET)
            .await
    }

    /// Program the device from `config`.
    ///
    /// Failures are collected per unit in the returned report rather than
    /// stopping the pass; see [`orchestrator`].
    pub async fn configure(&mut self, config: &DeviceConfig) -> ConfigureReport {
        ConfigurationSession::new().run(self, config).await
    }

    /// Read the latest conversion of an ADC channel.
    pub async fn read_adc(&mut self, channel: AdcChannel) -> Result<AdcReading> {
        let code = self.read_register(channel.value_address()).await?;
        Ok(AdcReading { channel, code })
    }

    /// Read back a range of the command arena.
    pub async fn read_arena(&mut self, range: ArenaRange) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(range.len());
        for addr in range.addresses() {
            bytes.push(self.read_register(addr).await?);
        }
        Ok(bytes)
    }

    /// Read a global register.
    pub async fn read<R: GlobalRegister>(&mut self) -> Result<R> {
        let raw = self.read_register(R::ADDRESS).await?;
        Ok(R::decode(raw)?)
    }

    /// Write a global register.
    pub async fn write<R: GlobalRegister>(&mut self, value: &R) -> Result<()> {
        self.write_register(R::ADDRESS, value.encode()).await
    }

    /// Read one register of a peripheral slot.
    pub async fn read_slot<R: SlotRegister>(&mut self, slot: Slot) -> Result<R> {
        let raw = self.read_register(R::address(slot)).await?;
        Ok(R::decode(raw)?)
    }

    /// Write one register of a peripheral slot.
    pub async fn write_slot<R: SlotRegister>(&mut self, slot: Slot, value: &R) -> Result<()> {
        self.write_register(R::address(slot), value.encode()).await
    }

    /// Write a register value to an explicit address.
    pub async fn write_at<R: Register>(&mut self, address: u8, value: &R) -> Result<()> {
        self.write_register(address, value.encode()).await
    }

    pub async fn read_word<R: GlobalWordRegister>(&mut self) -> Result<R> {
        let bytes = self.read_pair(R::ADDRESSES).await?;
        Ok(R::decode(bytes))
    }

    pub async fn write_word<R: GlobalWordRegister>(&mut self, value: &R) -> Result<()> {
        self.write_pair(R::ADDRESSES, value.encode()).await
    }

    pub async fn read_slot_word<R: SlotWordRegister>(&mut self, slot: Slot) -> Result<R> {
        let bytes = self.read_pair(R::addresses(slot)).await?;
        Ok(R::decode(bytes))
    }

    pub async fn write_slot_word<R: SlotWordRegister>(
        &mut self,
        slot: Slot,
        value: &R,
    ) -> Result<()> {
        self.write_pair(R::addresses(slot), value.encode()).await
    }

    // Helper methods for register access

    // Two single-byte writes, low then high. A failed low write skips the high.
    async fn write_pair(&mut self, (low, high): (u8, u8), bytes: [u8; 2]) -> Result<()> {
        self.write_register(low, bytes[0]).await?;
        self.write_register(high, bytes[1]).await
    }

    async fn read_pair(&mut self, (low, high): (u8, u8)) -> Result<[u8; 2]> {
        let low = self.read_register(low).await?;
        let high = self.read_register(high).await?;
        Ok([low, high])
    }

    pub(crate) async fn read_register(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        with_timeout(
            self.timeout,
            self.i2c.write_read(self.address, &[reg], &mut buf),
        )
        .await?;
        trace!("{}", protocol::format_transaction(reg, Some(&buf[..]), true));
        Ok(buf[0])
    }

    pub(crate) async fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        trace!("{}", protocol::format_transaction(reg, Some(&[value][..]), false));
        with_timeout(self.timeout, self.i2c.write(self.address, &[reg, value])).await
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    op: impl Future<Output = hw_trait::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(HwError::Timeout(timeout).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::I2cError;
    use crate::transport::sim::{SimBus, Transaction};
    use codec::{Cfgp, Perp, Sta1, Tout};

    #[tokio::test]
    async fn init_detects_chip() {
        let mut npz = Npz::new(SimBus::new());
        npz.init().await.unwrap();
        assert_eq!(npz.i2c().frequency(), Some(BUS_FREQUENCY_HZ));
        assert_eq!(
            npz.i2c().transactions(),
            &[Transaction::Read {
                register: regs::ID,
                len: 1
            }]
        );
    }

    #[tokio::test]
    async fn init_rejects_wrong_id() {
        let mut bus = SimBus::new();
        bus.set_register(regs::ID, 0x42);
        let mut npz = Npz::new(bus);
        let err = npz.init().await.unwrap_err();
        assert_eq!(
            err,
            NpzError::UnexpectedChipId {
                found: 0x42,
                expected: 0x60
            }
        );
    }

    #[tokio::test]
    async fn wrong_address_is_a_nak() {
        let mut npz = Npz::new_with_address(SimBus::new(), 0x3E);
        let err = npz.detect().await.unwrap_err();
        assert_eq!(err, NpzError::Bus(HwError::I2c(I2cError::Nak(0x3E))));
    }

    #[tokio::test]
    async fn sleep_is_a_single_write() {
        let mut npz = Npz::new(SimBus::new());
        npz.sleep().await.unwrap();
        assert_eq!(npz.i2c().writes(), vec![(regs::SLEEP_RST, 0xFF)]);
        assert_eq!(npz.i2c().transactions().len(), 1);
    }

    #[tokio::test]
    async fn soft_reset_writes_magic_byte() {
        let mut npz = Npz::new(SimBus::new());
        npz.soft_reset().await.unwrap();
        assert_eq!(npz.i2c().writes(), vec![(regs::SLEEP_RST, 0xA5)]);

        let status: Sta1 = npz.read().await.unwrap();
        assert_eq!(status.reset_source, Some(codec::ResetSource::Soft));
    }

    #[tokio::test]
    async fn words_are_written_low_then_high() {
        let mut npz = Npz::new(SimBus::new());
        npz.write_word(&Tout(0x0BB8)).await.unwrap();
        npz.write_slot_word(Slot::P2, &Perp(0x1234)).await.unwrap();
        assert_eq!(
            npz.i2c().writes(),
            vec![(0x08, 0xB8), (0x09, 0x0B), (0x1F, 0x34), (0x20, 0x12)]
        );

        let perp: Perp = npz.read_slot_word(Slot::P2).await.unwrap();
        assert_eq!(perp, Perp(0x1234));
    }

    #[tokio::test]
    async fn failed_low_byte_skips_high_byte() {
        let mut bus = SimBus::new();
        bus.nak_on(regs::TOUT_L);
        let mut npz = Npz::new(bus);
        assert!(npz.write_word(&Tout(0x0BB8)).await.is_err());
        assert!(npz.i2c().writes().is_empty());
    }

    #[tokio::test]
    async fn slot_registers_land_in_their_block() {
        let mut npz = Npz::new(SimBus::new());
        let cfgp = Cfgp {
            power_mode: codec::PowerMode::AlwaysOn,
            polling_mode: codec::PollingMode::AsyncWaitInterrupt,
            power_switch_mode: codec::PowerSwitchMode::Standard,
            interrupt_pin_mode: codec::InterruptPinMode::InputActiveLow,
        };
        npz.write_slot(Slot::P4, &cfgp).await.unwrap();
        assert_eq!(npz.i2c().register(0x37), cfgp.encode());
        assert_eq!(npz.read_slot::<Cfgp>(Slot::P4).await.unwrap(), cfgp);
    }

    #[tokio::test]
    async fn undefined_field_pattern_surfaces_as_decode_error() {
        let mut bus = SimBus::new();
        bus.set_register(regs::PSWCTL, 0x00);
        let mut npz = Npz::new(bus);
        let err = npz.read::<codec::Pswctl>().await.unwrap_err();
        assert!(matches!(err, NpzError::Decode(FieldError { field: "host_mode", .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_bus_times_out() {
        let mut bus = SimBus::new();
        bus.stall();
        let mut npz = Npz::new(bus).with_timeout(Duration::from_millis(50));
        let err = npz.detect().await.unwrap_err();
        assert_eq!(
            err,
            NpzError::Bus(HwError::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn arena_reads_back_byte_by_byte() {
        let mut bus = SimBus::new();
        bus.set_register(0x80, 0x20);
        bus.set_register(0x81, 0x10);
        let mut npz = Npz::new(bus);
        let mut arena = arena::CommandArena::new();
        let range = arena.allocate(2).unwrap();
        assert_eq!(npz.read_arena(range).await.unwrap(), vec![0x20, 0x10]);
    }
}
