//! Reading back why the host was woken.

use crate::{hw_trait::i2c::I2c, tracing::prelude::*};

use super::{
    Npz,
    codec::{AdcChannel, Cfgp, Modp, Sta1, Sta2, Syscfg1, Syscfg2, Valp},
    error::Result,
    protocol::Slot,
    telemetry::{AdcReading, PeripheralValue},
};

/// Wake state of one peripheral slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralWake {
    pub slot: Slot,
    pub triggered: bool,
    pub timed_out: bool,
    /// Last value read, for slots that compare against thresholds.
    pub value: Option<PeripheralValue>,
}

/// Everything the device reports after waking the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeReport {
    pub status: Sta1,
    /// External channel first, then internal, for whichever triggered.
    pub adc: Vec<AdcReading>,
    /// Slots that triggered or timed out, in slot order.
    pub peripherals: Vec<PeripheralWake>,
}

impl WakeReport {
    /// True if the global timeout expired before any source triggered.
    pub fn woke_on_timeout(&self) -> bool {
        self.status.global_timeout
    }

    pub fn triggered_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.peripherals
            .iter()
            .filter(|p| p.triggered)
            .map(|p| p.slot)
    }
}

impl<I: I2c> Npz<I> {
    /// Collect the wake reasons: status flags, the ADC channels that fired
    /// and the slots that triggered, with their last values.
    pub async fn wake_report(&mut self) -> Result<WakeReport> {
        let status: Sta1 = self.read().await?;
        match status.reset_source {
            Some(source) => debug!(reset_source = ?source, "Read wake status"),
            None => warn!("STA1 reset source undefined, continuing"),
        }

        let mut adc = Vec::new();
        if status.external_adc_triggered {
            // The external channel only has a meaningful value while it is
            // both sampled and allowed to wake the host.
            let syscfg1: Syscfg1 = self.read().await?;
            let syscfg2: Syscfg2 = self.read().await?;
            if syscfg2.adc_external_sampling && syscfg1.adc_external_wake {
                let reading = self.read_adc(AdcChannel::External).await?;
                if reading.is_disconnected() {
                    warn!("ADC_IN pin not connected");
                }
                adc.push(reading);
            }
        }
        if status.internal_adc_triggered {
            adc.push(self.read_adc(AdcChannel::Internal).await?);
        }
        for reading in &adc {
            info!("{}", reading);
        }

        if status.global_timeout {
            info!("Global timeout expired before any wake source triggered");
        }

        let sta2: Sta2 = self.read().await?;
        let mut peripherals = Vec::new();
        for slot in Slot::ALL {
            let triggered = sta2.triggered[slot.index()];
            let timed_out = sta2.timed_out[slot.index()];
            if !triggered && !timed_out {
                continue;
            }

            let value = if triggered {
                self.read_peripheral_value(slot).await?
            } else {
                None
            };
            debug!(slot = %slot, triggered, timed_out, value = ?value, "Peripheral wake");
            peripherals.push(PeripheralWake {
                slot,
                triggered,
                timed_out,
                value,
            });
        }

        Ok(WakeReport {
            status,
            adc,
            peripherals,
        })
    }

    /// Last value read from the peripheral on `slot`.
    ///
    /// `None` when the slot's polling mode does not read values.
    pub async fn read_peripheral_value(&mut self, slot: Slot) -> Result<Option<PeripheralValue>> {
        let cfgp: Cfgp = self.read_slot(slot).await?;
        if !cfgp.polling_mode.compares_threshold() {
            return Ok(None);
        }

        let modp: Modp = self.read_slot(slot).await?;
        let valp: Valp = self.read_slot_word(slot).await?;
        Ok(Some(PeripheralValue::interpret(valp.0, modp.data_type)))
    }
}
