//! Debug dump of the device configuration.

use std::fmt::Debug;

use crate::{hw_trait::i2c::I2c, tracing::prelude::*};

use super::{
    Npz,
    codec::{
        AdcChannel, AdcThreshold, Addrp, Cfgp, GlobalRegister, Intcfg, Modp, Ncmdp, Perp,
        PowerMode, Pswctl, Register, Rregp, SlotRegister, Sta1, Sta2, Syscfg1, Syscfg2, Syscfg3,
        Tcfgp, Thrunp, Throvp, Tout, Twtp,
    },
    error::{NpzError, Result},
    protocol::{Slot, register_name},
};

impl<I: I2c> Npz<I> {
    /// Read back every configuration register and log it, decoded, at debug
    /// level. Disabled slots are skipped after their CFGP.
    ///
    /// A register holding an undefined field pattern is logged as a warning
    /// and the dump carries on; bus errors end it.
    pub async fn dump_configuration(&mut self) -> Result<()> {
        debug!("=== nPZero Configuration Dump ===");

        debug!("--- Global ---");
        self.dump_global::<Sta1>().await?;
        self.dump_global::<Sta2>().await?;
        self.dump_global::<Pswctl>().await?;
        self.dump_global::<Syscfg1>().await?;
        self.dump_global::<Syscfg2>().await?;
        self.dump_global::<Syscfg3>().await?;
        let tout: Tout = self.read_word().await?;
        debug!("TOUT: {} ticks", tout.0);
        self.dump_global::<Intcfg>().await?;

        debug!("--- ADC ---");
        for channel in [AdcChannel::Internal, AdcChannel::External] {
            for addr in [
                channel.over_threshold_address(),
                channel.under_threshold_address(),
            ] {
                self.dump_at::<AdcThreshold>(addr).await?;
            }
        }

        for slot in Slot::ALL {
            debug!("--- Peripheral {} ---", slot);
            match self.read_slot::<Cfgp>(slot).await {
                Ok(cfgp) if cfgp.power_mode == PowerMode::Disabled => {
                    debug!("{}: disabled", register_name(Cfgp::address(slot)));
                    continue;
                }
                Ok(cfgp) => debug!("{}: {:?}", register_name(Cfgp::address(slot)), cfgp),
                Err(NpzError::Decode(e)) => warn!("{}: {}", register_name(Cfgp::address(slot)), e),
                Err(e) => return Err(e),
            }

            self.dump_slot::<Modp>(slot).await?;
            let perp: Perp = self.read_slot_word(slot).await?;
            debug!("PERP{}: {} ticks", slot.number(), perp.0);
            self.dump_slot::<Ncmdp>(slot).await?;
            self.dump_slot::<Addrp>(slot).await?;
            self.dump_slot::<Rregp>(slot).await?;
            let throvp: Throvp = self.read_slot_word(slot).await?;
            let thrunp: Thrunp = self.read_slot_word(slot).await?;
            debug!(
                "THROVP{}: 0x{:04X}, THRUNP{}: 0x{:04X}",
                slot.number(),
                throvp.0,
                slot.number(),
                thrunp.0
            );
            self.dump_slot::<Twtp>(slot).await?;
            self.dump_slot::<Tcfgp>(slot).await?;
        }

        Ok(())
    }

    async fn dump_global<R: GlobalRegister + Debug>(&mut self) -> Result<()> {
        self.dump_at::<R>(R::ADDRESS).await
    }

    async fn dump_slot<R: SlotRegister + Debug>(&mut self, slot: Slot) -> Result<()> {
        self.dump_at::<R>(R::address(slot)).await
    }

    async fn dump_at<R: Register + Debug>(&mut self, addr: u8) -> Result<()> {
        let raw = self.read_register(addr).await?;
        match R::decode(raw) {
            Ok(value) => debug!("{}: 0x{:02X} {:?}", register_name(addr), raw, value),
            Err(e) => warn!("{}: {}", register_name(addr), e),
        }
        Ok(())
    }
}
