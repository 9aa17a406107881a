//! Configuration orchestrator.
//!
//! Turns a [`DeviceConfig`] into the exact sequence of register writes that
//! programs the device. The work is split into units: the global register
//! group, each configured peripheral slot and each enabled ADC channel. A
//! unit is validated before its first write; a failure at any step abandons
//! the rest of that unit but not the others. Nothing is rolled back, so the
//! returned [`ConfigureReport`] is the only record of how far each unit got.

use std::fmt;

use thiserror::Error;

use crate::{hw_trait::i2c::I2c, tracing::prelude::*};

use super::{
    Npz,
    arena::{ArenaRange, CommandArena},
    codec::{
        AdcChannel, AdcThreshold, Addrp, Cfgp, Intcfg, Modp, Ncmdp, Perp, Pswctl, Rregp, SpiMode,
        Syscfg1, Syscfg2, Syscfg3, Tcfgp, Thrunp, Throvp, Tout, Twtp,
    },
    config::{AdcChannelConfig, DeviceConfig, PeripheralBus, PeripheralConfig, SpiPeripheral},
    error::{NpzError, Result},
    protocol::Slot,
};

/// Independently configured part of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Global,
    Peripheral(Slot),
    Adc(AdcChannel),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Global => write!(f, "global"),
            Unit::Peripheral(slot) => write!(f, "peripheral {}", slot),
            Unit::Adc(channel) => write!(f, "{}", channel),
        }
    }
}

/// Logical step within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Validate,
    GlobalTimeout,
    WakeSources,
    SystemClock,
    IoConfig,
    PowerSwitch,
    InterruptPins,
    PowerModes,
    DataMode,
    PollingPeriod,
    CommandArena,
    CommandCount,
    ArenaBytes,
    Address,
    ReadRegister,
    UnderThreshold,
    OverThreshold,
    WaitTime,
    WaitConfig,
    AdcOverThreshold,
    AdcUnderThreshold,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Validate => "validation",
            Step::GlobalTimeout => "global timeout (TOUT)",
            Step::WakeSources => "wake sources (SYSCFG1)",
            Step::SystemClock => "system clock (SYSCFG2)",
            Step::IoConfig => "I/O configuration (SYSCFG3)",
            Step::PowerSwitch => "power switch (PSWCTL)",
            Step::InterruptPins => "interrupt pins (INTCFG)",
            Step::PowerModes => "power modes (CFGP)",
            Step::DataMode => "data mode (MODP)",
            Step::PollingPeriod => "polling period (PERP)",
            Step::CommandArena => "command arena allocation",
            Step::CommandCount => "command count (NCMDP)",
            Step::ArenaBytes => "command arena bytes",
            Step::Address => "address (ADDRP)",
            Step::ReadRegister => "read register (RREGP)",
            Step::UnderThreshold => "under-threshold (THRUNP)",
            Step::OverThreshold => "over-threshold (THROVP)",
            Step::WaitTime => "wait time (TWTP)",
            Step::WaitConfig => "wait configuration (TCFGP)",
            Step::AdcOverThreshold => "ADC over-threshold (THROVA)",
            Step::AdcUnderThreshold => "ADC under-threshold (THRUNA)",
        };
        f.write_str(name)
    }
}

/// The step a unit stopped at and why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step}: {error}")]
pub struct StepFailure {
    pub step: Step,
    pub error: NpzError,
}

trait AtStep<T> {
    fn at(self, step: Step) -> std::result::Result<T, StepFailure>;
}

impl<T, E: Into<NpzError>> AtStep<T> for std::result::Result<T, E> {
    fn at(self, step: Step) -> std::result::Result<T, StepFailure> {
        self.map_err(|error| StepFailure {
            step,
            error: error.into(),
        })
    }
}

/// Result of configuring one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: Unit,
    pub result: std::result::Result<(), StepFailure>,
}

/// What an arena range holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaUse {
    /// I2C register/value pairs.
    InitCommands,
    /// SPI bytes clocked out after power-up.
    InitSequence,
    /// SPI bytes clocked out to read the value.
    ReadSequence,
}

/// Arena range handed to a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub slot: Slot,
    pub purpose: ArenaUse,
    pub range: ArenaRange,
}

/// Outcome of a configuration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReport {
    outcomes: Vec<UnitOutcome>,
    allocations: Vec<Allocation>,
    arena_used: usize,
}

impl ConfigureReport {
    /// One entry per attempted unit, in the order they ran.
    pub fn outcomes(&self) -> &[UnitOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, unit: Unit) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.unit == unit)
    }

    /// Arena ranges reserved during the pass, including those of
    /// peripherals that later failed.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Bytes of the arena consumed.
    pub fn arena_used(&self) -> usize {
        self.arena_used
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (Unit, &StepFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|failure| (o.unit, failure)))
    }
}

impl fmt::Display for ConfigureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => writeln!(f, "{}: ok", outcome.unit)?,
                Err(failure) => writeln!(f, "{}: failed at {}", outcome.unit, failure)?,
            }
        }
        for allocation in &self.allocations {
            writeln!(
                f,
                "arena {} {:?} {}",
                allocation.slot, allocation.purpose, allocation.range
            )?;
        }
        write!(f, "arena used: {} bytes", self.arena_used)
    }
}

/// One configuration pass.
///
/// Owns the arena cursor, so every pass packs the arena from offset 0.
#[derive(Debug, Default)]
pub struct ConfigurationSession {
    arena: CommandArena,
    allocations: Vec<Allocation>,
    outcomes: Vec<UnitOutcome>,
}

impl ConfigurationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &CommandArena {
        &self.arena
    }

    /// Program the device: global group, then configured peripherals in slot
    /// order, then the enabled ADC channels.
    pub async fn run<I: I2c>(mut self, npz: &mut Npz<I>, config: &DeviceConfig) -> ConfigureReport {
        let result = configure_global(npz, config).await;
        self.record(Unit::Global, result);

        for (slot, peripheral) in config.configured_slots() {
            let result = self.configure_peripheral(npz, slot, peripheral).await;
            self.record(Unit::Peripheral(slot), result);
        }

        for (channel, adc) in [
            (AdcChannel::Internal, &config.adc_internal),
            (AdcChannel::External, &config.adc_external),
        ] {
            if !adc_enabled(channel, adc, config) {
                trace!(channel = %channel, "ADC channel not enabled, skipping");
                continue;
            }
            let result = configure_adc(npz, channel, adc).await;
            self.record(Unit::Adc(channel), result);
        }

        let report = ConfigureReport {
            outcomes: self.outcomes,
            allocations: self.allocations,
            arena_used: self.arena.cursor(),
        };
        debug!(
            units = report.outcomes.len(),
            failed = report.failures().count(),
            arena_used = report.arena_used,
            "Configuration pass complete"
        );
        report
    }

    fn record(&mut self, unit: Unit, result: std::result::Result<(), StepFailure>) {
        match &result {
            Ok(()) => debug!(unit = %unit, "Unit configured"),
            Err(failure) => warn!(
                unit = %unit,
                step = %failure.step,
                error = %failure.error,
                "Unit configuration failed"
            ),
        }
        self.outcomes.push(UnitOutcome { unit, result });
    }

    async fn configure_peripheral<I: I2c>(
        &mut self,
        npz: &mut Npz<I>,
        slot: Slot,
        peripheral: &PeripheralConfig,
    ) -> std::result::Result<(), StepFailure> {
        validate_peripheral(peripheral).at(Step::Validate)?;

        let cfgp = Cfgp {
            power_mode: peripheral.power_mode,
            polling_mode: peripheral.polling_mode,
            power_switch_mode: peripheral.power_switch_mode,
            interrupt_pin_mode: peripheral.interrupt_pin_mode,
        };
        npz.write_slot(slot, &cfgp).await.at(Step::PowerModes)?;

        let (wake_on_nak, spi_mode) = match &peripheral.bus {
            PeripheralBus::I2c(i2c) => (i2c.wake_on_nak, SpiMode::Mode0),
            PeripheralBus::Spi(spi) => (false, spi.mode),
        };
        let modp = Modp {
            comparison_mode: peripheral.comparison_mode,
            data_type: peripheral.data_type,
            multi_byte: peripheral.multi_byte_transfer,
            wake_on_nak,
            endianness: peripheral.endianness,
            spi_mode,
        };
        npz.write_slot(slot, &modp).await.at(Step::DataMode)?;

        npz.write_slot_word(slot, &Perp(peripheral.polling_period))
            .await
            .at(Step::PollingPeriod)?;

        // Everything is reserved before the count goes out, so a peripheral
        // that does not fit leaves NCMDP and the arena untouched.
        let (count, sequences) = arena_sequences(&peripheral.bus);
        let lens: Vec<usize> = sequences.iter().map(|(_, bytes)| bytes.len()).collect();
        let ranges = self.arena.reserve(&lens).at(Step::CommandArena)?;
        for ((purpose, _), range) in sequences.iter().zip(&ranges) {
            trace!(slot = %slot, range = %range, "Reserved {:?}", purpose);
            self.allocations.push(Allocation {
                slot,
                purpose: *purpose,
                range: *range,
            });
        }

        npz.write_slot(slot, &Ncmdp(count)).await.at(Step::CommandCount)?;
        for ((_, bytes), range) in sequences.iter().zip(&ranges) {
            for (addr, byte) in range.addresses().zip(bytes) {
                npz.write_register(addr, *byte).await.at(Step::ArenaBytes)?;
            }
        }

        if peripheral.polling_mode.uses_address() {
            let value = match &peripheral.bus {
                PeripheralBus::I2c(i2c) => i2c.address,
                PeripheralBus::Spi(spi) => read_sequence_len(spi).at(Step::Address)?,
            };
            let addrp = Addrp {
                value,
                protocol: peripheral.protocol(),
            };
            npz.write_slot(slot, &addrp).await.at(Step::Address)?;
        }

        if peripheral.polling_mode.compares_threshold() {
            if let PeripheralBus::I2c(i2c) = &peripheral.bus {
                npz.write_slot(slot, &Rregp(i2c.read_register))
                    .await
                    .at(Step::ReadRegister)?;
            }
            npz.write_slot_word(slot, &Thrunp(peripheral.threshold_under))
                .await
                .at(Step::UnderThreshold)?;
            npz.write_slot_word(slot, &Throvp(peripheral.threshold_over))
                .await
                .at(Step::OverThreshold)?;
        }

        npz.write_slot(slot, &Twtp(peripheral.wait_time))
            .await
            .at(Step::WaitTime)?;

        let retries = match &peripheral.bus {
            PeripheralBus::I2c(i2c) => i2c.retries,
            PeripheralBus::Spi(_) => 0,
        };
        let tcfgp = Tcfgp {
            pre_wait: peripheral.pre_wait,
            post_wait: peripheral.post_wait,
            retries,
        };
        npz.write_slot(slot, &tcfgp).await.at(Step::WaitConfig)
    }
}

async fn configure_global<I: I2c>(
    npz: &mut Npz<I>,
    config: &DeviceConfig,
) -> std::result::Result<(), StepFailure> {
    validate_global(config).at(Step::Validate)?;

    npz.write_word(&Tout(config.global_timeout))
        .await
        .at(Step::GlobalTimeout)?;

    let syscfg1 = Syscfg1 {
        wake_up: config.wake_up,
        adc_internal_wake: config.adc_internal.wake_up,
        adc_external_wake: config.adc_external.wake_up,
        wake_policy: config.wake_policy,
    };
    npz.write(&syscfg1).await.at(Step::WakeSources)?;

    let syscfg2 = Syscfg2 {
        clock_divider: config.clock_divider,
        clock_source: config.clock_source,
        adc_external_sampling: config.adc_external_sampling,
        adc_clock: config.adc_clock,
    };
    npz.write(&syscfg2).await.at(Step::SystemClock)?;

    let syscfg3 = Syscfg3 {
        io_strength: config.io_strength,
        i2c_pull: config.i2c_pull,
        spi_pins: config.spi_pins,
        clock_out: config.clock_out,
        clock_source_status: config.clock_source,
    };
    npz.write(&syscfg3).await.at(Step::IoConfig)?;

    let pswctl = Pswctl {
        normal_mode: config.power_switch_normal_mode,
        host_mode: config.host_power_mode,
        gate_boost: config.gate_boost,
        gate_boost_active: false,
    };
    npz.write(&pswctl).await.at(Step::PowerSwitch)?;

    let intcfg = Intcfg {
        pins: config.interrupt_pin_pull,
    };
    npz.write(&intcfg).await.at(Step::InterruptPins)
}

async fn configure_adc<I: I2c>(
    npz: &mut Npz<I>,
    channel: AdcChannel,
    adc: &AdcChannelConfig,
) -> std::result::Result<(), StepFailure> {
    validate_adc(adc).at(Step::Validate)?;

    npz.write_at(
        channel.over_threshold_address(),
        &AdcThreshold(adc.over_threshold),
    )
    .await
    .at(Step::AdcOverThreshold)?;
    npz.write_at(
        channel.under_threshold_address(),
        &AdcThreshold(adc.under_threshold),
    )
    .await
    .at(Step::AdcUnderThreshold)
}

/// The external channel only converts while external sampling is on.
fn adc_enabled(channel: AdcChannel, adc: &AdcChannelConfig, config: &DeviceConfig) -> bool {
    match channel {
        AdcChannel::Internal => adc.wake_up,
        AdcChannel::External => adc.wake_up && config.adc_external_sampling,
    }
}

/// Command count and the byte sequences to pack into the arena, empty ones
/// dropped.
///
/// I2C counts register/value pairs; SPI counts init bytes only, the read
/// sequence length goes to ADDRP instead.
fn arena_sequences(bus: &PeripheralBus) -> (u8, Vec<(ArenaUse, Vec<u8>)>) {
    let (count, sequences) = match bus {
        PeripheralBus::I2c(i2c) => (
            i2c.init_commands.len(),
            vec![(ArenaUse::InitCommands, i2c.init_commands.as_flattened().to_vec())],
        ),
        PeripheralBus::Spi(spi) => (
            spi.init_sequence.len(),
            vec![
                (ArenaUse::InitSequence, spi.init_sequence.clone()),
                (ArenaUse::ReadSequence, spi.read_sequence.clone()),
            ],
        ),
    };
    let sequences = sequences
        .into_iter()
        .filter(|(_, bytes)| !bytes.is_empty())
        .collect();
    (count as u8, sequences)
}

fn validate_global(config: &DeviceConfig) -> Result<()> {
    if config.global_timeout == 0 {
        return Err(NpzError::invalid("global_timeout", "must be non-zero"));
    }
    Ok(())
}

fn validate_peripheral(peripheral: &PeripheralConfig) -> Result<()> {
    if peripheral.polling_period == 0 {
        return Err(NpzError::invalid("polling_period", "must be non-zero"));
    }

    let max_count = Ncmdp::MAX as usize;
    match &peripheral.bus {
        PeripheralBus::I2c(i2c) => {
            if i2c.address > Addrp::MAX_VALUE {
                return Err(NpzError::invalid(
                    "address",
                    format!("{:#04x} is not a 7-bit address", i2c.address),
                ));
            }
            if i2c.retries > Tcfgp::MAX_RETRIES {
                return Err(NpzError::invalid(
                    "retries",
                    format!("{} exceeds {}", i2c.retries, Tcfgp::MAX_RETRIES),
                ));
            }
            if i2c.init_commands.len() > max_count {
                return Err(NpzError::invalid(
                    "init_commands",
                    format!("{} commands exceeds {}", i2c.init_commands.len(), max_count),
                ));
            }
        }
        PeripheralBus::Spi(spi) => {
            if spi.init_sequence.len() > max_count {
                return Err(NpzError::invalid(
                    "init_sequence",
                    format!("{} bytes exceeds {}", spi.init_sequence.len(), max_count),
                ));
            }
            read_sequence_len(spi)?;
        }
    }
    Ok(())
}

/// Read-sequence length as the 7-bit ADDRP count.
fn read_sequence_len(spi: &SpiPeripheral) -> Result<u8> {
    let len = spi.read_sequence.len();
    u8::try_from(len)
        .ok()
        .filter(|&count| count <= Addrp::MAX_VALUE)
        .ok_or_else(|| {
            NpzError::invalid(
                "read_sequence",
                format!("{} bytes exceeds {}", len, Addrp::MAX_VALUE),
            )
        })
}

fn validate_adc(adc: &AdcChannelConfig) -> Result<()> {
    for (field, value) in [
        ("over_threshold", adc.over_threshold),
        ("under_threshold", adc.under_threshold),
    ] {
        if value == 0 || value > AdcThreshold::MAX {
            return Err(NpzError::invalid(
                field,
                format!("{} is outside 1-{}", value, AdcThreshold::MAX),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::{HwError, I2cError};
    use crate::peripheral::npz::codec::{IntPinPull, PollingMode};
    use crate::peripheral::npz::config::{I2cPeripheral, SpiPeripheral};
    use crate::transport::sim::SimBus;

    async fn run(bus: SimBus, config: &DeviceConfig) -> (ConfigureReport, SimBus) {
        let mut npz = Npz::new(bus);
        let report = npz.configure(config).await;
        (report, npz.release())
    }

    fn only_global(config: &mut DeviceConfig) {
        config.peripherals = [None, None, None, None];
    }

    const GLOBAL_WRITES: [(u8, u8); 7] = [
        (0x08, 0xB8),
        (0x09, 0x0B),
        (0x05, 0x0C),
        (0x06, 0x40),
        (0x07, 0x06),
        (0x04, 0x2C),
        (0x0A, 0xFF),
    ];

    #[tokio::test]
    async fn sensor_node_produces_exact_write_sequence() {
        let (report, bus) = run(SimBus::new(), &DeviceConfig::sensor_node()).await;
        assert!(report.is_success(), "{}", report);

        let mut expected = GLOBAL_WRITES.to_vec();
        // P3: SPI accelerometer
        expected.extend([
            (0x2A, 0x21),
            (0x2B, 0x02),
            (0x2C, 0x32),
            (0x2D, 0x00),
            (0x2E, 0x02),
            (0x80, 0x20),
            (0x81, 0x10),
            (0x82, 0xA8),
            (0x2F, 0x81),
            (0x33, 0x18),
            (0x34, 0xFC),
            (0x31, 0xE8),
            (0x32, 0x03),
            (0x35, 0x0A),
            (0x36, 0x05),
        ]);
        // P4: I2C temperature sensor
        expected.extend([
            (0x37, 0x21),
            (0x38, 0x3A),
            (0x39, 0x2C),
            (0x3A, 0x01),
            (0x3B, 0x02),
            (0x83, 0x01),
            (0x84, 0x82),
            (0x85, 0x02),
            (0x86, 0xA0),
            (0x3C, 0x49),
            (0x3D, 0x00),
            (0x40, 0x00),
            (0x41, 0x05),
            (0x3E, 0x80),
            (0x3F, 0x0C),
            (0x42, 0x31),
            (0x43, 0x35),
        ]);
        assert_eq!(bus.writes(), expected);
    }

    #[tokio::test]
    async fn sensor_node_packs_arena_in_slot_order() {
        let (report, _) = run(SimBus::new(), &DeviceConfig::sensor_node()).await;

        let ranges: Vec<(Slot, ArenaUse, usize, usize)> = report
            .allocations()
            .iter()
            .map(|a| (a.slot, a.purpose, a.range.offset(), a.range.end()))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (Slot::P3, ArenaUse::InitSequence, 0, 2),
                (Slot::P3, ArenaUse::ReadSequence, 2, 3),
                (Slot::P4, ArenaUse::InitCommands, 3, 7),
            ]
        );
        assert_eq!(report.arena_used(), 7);
    }

    #[tokio::test]
    async fn global_timeout_is_split_low_then_high() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let (report, bus) = run(SimBus::new(), &config).await;
        assert!(report.is_success());
        assert_eq!(&bus.writes()[..2], &[(0x08, 0xB8), (0x09, 0x0B)]);
    }

    #[tokio::test]
    async fn zero_global_timeout_writes_nothing_for_the_group() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        config.global_timeout = 0;
        let (report, bus) = run(SimBus::new(), &config).await;

        let failure = report.outcome(Unit::Global).unwrap().result.clone().unwrap_err();
        assert_eq!(failure.step, Step::Validate);
        assert!(matches!(
            failure.error,
            NpzError::InvalidField {
                field: "global_timeout",
                ..
            }
        ));
        assert!(bus.writes().is_empty());
    }

    #[tokio::test]
    async fn interrupt_pin_two_pulled_high() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        config.interrupt_pin_pull = [
            IntPinPull::Disabled,
            IntPinPull::PulledHigh,
            IntPinPull::Disabled,
            IntPinPull::Disabled,
        ];
        let (_, bus) = run(SimBus::new(), &config).await;
        assert_eq!(bus.writes().last(), Some(&(0x0A, 0x0C)));
    }

    #[tokio::test]
    async fn zero_polling_period_skips_every_write_for_that_slot() {
        let mut config = DeviceConfig::sensor_node();
        if let Some(p) = config.peripherals[2].as_mut() {
            p.polling_period = 0;
        }
        let (report, bus) = run(SimBus::new(), &config).await;

        let failure = report
            .outcome(Unit::Peripheral(Slot::P3))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert_eq!(failure.step, Step::Validate);

        let p3 = 0x2A..=0x36;
        assert!(bus.writes().iter().all(|(reg, _)| !p3.contains(reg)));

        // P4 still runs and now packs from offset 0.
        assert!(report.outcome(Unit::Peripheral(Slot::P4)).unwrap().result.is_ok());
        assert_eq!(report.allocations()[0].range.offset(), 0);
        assert_eq!(bus.register(0x80), 0x01);
    }

    #[tokio::test]
    async fn async_interrupt_mode_skips_address_and_thresholds() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let mut p = PeripheralConfig::temperature_sensor();
        p.polling_mode = PollingMode::AsyncWaitInterrupt;
        config.peripherals[0] = Some(p);

        let (report, bus) = run(SimBus::new(), &config).await;
        assert!(report.is_success());

        let regs = Slot::P1.registers();
        let written: Vec<u8> = bus.writes().iter().map(|(reg, _)| *reg).collect();
        for skipped in [
            regs.addrp,
            regs.rregp,
            regs.throvp_l,
            regs.throvp_h,
            regs.thrunp_l,
            regs.thrunp_h,
        ] {
            assert!(!written.contains(&skipped), "{:#04x} written", skipped);
        }
        assert!(written.contains(&regs.twtp));
        assert!(written.contains(&regs.tcfgp));
    }

    #[tokio::test]
    async fn wait_interrupt_mode_writes_address_but_not_thresholds() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let mut p = PeripheralConfig::temperature_sensor();
        p.polling_mode = PollingMode::PeriodicWaitInterrupt;
        config.peripherals[1] = Some(p);

        let (_, bus) = run(SimBus::new(), &config).await;
        let regs = Slot::P2.registers();
        let written: Vec<u8> = bus.writes().iter().map(|(reg, _)| *reg).collect();
        assert!(written.contains(&regs.addrp));
        assert!(!written.contains(&regs.rregp));
        assert!(!written.contains(&regs.throvp_l));
        assert!(!written.contains(&regs.thrunp_l));
    }

    #[tokio::test]
    async fn nak_aborts_only_the_failing_unit() {
        let mut bus = SimBus::new();
        bus.nak_on(Slot::P3.registers().modp);
        let (report, bus) = run(bus, &DeviceConfig::sensor_node()).await;

        let failure = report
            .outcome(Unit::Peripheral(Slot::P3))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert_eq!(failure.step, Step::DataMode);
        assert_eq!(
            failure.error,
            NpzError::Bus(HwError::I2c(I2cError::Nak(0x3D)))
        );

        // CFGP went out before the failure and stays written.
        assert_eq!(bus.register(0x2A), 0x21);
        assert!(
            bus.writes()
                .iter()
                .all(|(reg, _)| !(0x2C..=0x36).contains(reg))
        );

        assert!(report.outcome(Unit::Global).unwrap().result.is_ok());
        assert!(report.outcome(Unit::Peripheral(Slot::P4)).unwrap().result.is_ok());
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn global_failure_does_not_stop_peripherals() {
        let mut bus = SimBus::new();
        bus.nak_on(0x06);
        let (report, bus) = run(bus, &DeviceConfig::sensor_node()).await;

        let failures: Vec<(Unit, Step)> = report.failures().map(|(u, f)| (u, f.step)).collect();
        assert_eq!(failures, vec![(Unit::Global, Step::SystemClock)]);

        // SYSCFG1 was written, SYSCFG3 onwards was not.
        assert_eq!(bus.register(0x05), 0x0C);
        assert!(!bus.writes().iter().any(|(reg, _)| *reg == 0x07));
        assert_eq!(bus.register(0x43), 0x35);
    }

    #[tokio::test]
    async fn exhausted_arena_fails_the_peripheral_before_ncmdp() {
        let mut config = DeviceConfig::sensor_node();
        if let Some(PeripheralBus::Spi(spi)) = config.peripherals[2].as_mut().map(|p| &mut p.bus)
        {
            spi.init_sequence = vec![0xAA; 125];
        }
        let (report, bus) = run(SimBus::new(), &config).await;

        // P3 takes 126 bytes, P4 needs 4 and only 2 remain.
        assert!(report.outcome(Unit::Peripheral(Slot::P3)).unwrap().result.is_ok());
        let failure = report
            .outcome(Unit::Peripheral(Slot::P4))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert_eq!(failure.step, Step::CommandArena);
        assert!(matches!(failure.error, NpzError::ArenaExhausted(e) if e.requested == 4 && e.available == 2));

        let p4 = Slot::P4.registers();
        let written: Vec<u8> = bus.writes().iter().map(|(reg, _)| *reg).collect();
        assert!(written.contains(&p4.perp_h));
        assert!(!written.contains(&p4.ncmdp));
        assert!(!written.contains(&0xFE));
        assert_eq!(report.arena_used(), 126);
    }

    #[tokio::test]
    async fn spi_without_read_sequence_reserves_init_only() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let mut p = PeripheralConfig::accelerometer();
        p.bus = PeripheralBus::Spi(SpiPeripheral {
            mode: SpiMode::Mode3,
            init_sequence: vec![0x01, 0x02, 0x03],
            read_sequence: vec![],
        });
        config.peripherals[0] = Some(p);

        let (report, bus) = run(SimBus::new(), &config).await;
        assert_eq!(report.allocations().len(), 1);
        assert_eq!(report.allocations()[0].purpose, ArenaUse::InitSequence);
        assert_eq!(bus.register(Slot::P1.registers().ncmdp), 3);
        // ADDRP carries a zero read length with the SPI selector.
        assert_eq!(bus.register(Slot::P1.registers().addrp), 0x80);
        // MODP: Int16 plus SPI mode 3.
        assert_eq!(bus.register(Slot::P1.registers().modp), 0xC2);
    }

    #[test]
    fn read_sequence_len_fits_addrp() {
        let spi = |len: usize| SpiPeripheral {
            mode: SpiMode::Mode0,
            init_sequence: vec![],
            read_sequence: vec![0xA8; len],
        };
        assert_eq!(read_sequence_len(&spi(127)).unwrap(), 127);
        for len in [128, 256, 300] {
            assert!(matches!(
                read_sequence_len(&spi(len)),
                Err(NpzError::InvalidField {
                    field: "read_sequence",
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn oversized_read_sequence_is_rejected_before_writing() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let mut p = PeripheralConfig::accelerometer();
        p.bus = PeripheralBus::Spi(SpiPeripheral {
            mode: SpiMode::Mode0,
            init_sequence: vec![0x20],
            // Would wrap to 4 if cast to a byte.
            read_sequence: vec![0xA8; 260],
        });
        config.peripherals[0] = Some(p);

        let (report, bus) = run(SimBus::new(), &config).await;
        let failure = report
            .outcome(Unit::Peripheral(Slot::P1))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert_eq!(failure.step, Step::Validate);
        assert!(bus.writes().iter().all(|(reg, _)| *reg < 0x10 || *reg > 0x1C));
        assert_eq!(report.arena_used(), 0);
    }

    #[tokio::test]
    async fn invalid_i2c_fields_are_rejected_before_writing() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        let mut p = PeripheralConfig::temperature_sensor();
        p.bus = PeripheralBus::I2c(I2cPeripheral {
            address: 0x49,
            read_register: 0,
            retries: 4,
            wake_on_nak: false,
            init_commands: vec![],
        });
        config.peripherals[0] = Some(p);

        let (report, bus) = run(SimBus::new(), &config).await;
        let failure = report
            .outcome(Unit::Peripheral(Slot::P1))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert!(matches!(
            failure.error,
            NpzError::InvalidField {
                field: "retries",
                ..
            }
        ));
        assert!(
            bus.writes()
                .iter()
                .all(|(reg, _)| !(0x10..=0x1C).contains(reg))
        );
    }

    #[tokio::test]
    async fn adc_channels_follow_wake_and_sampling_flags() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        config.adc_internal.wake_up = true;
        config.adc_external.wake_up = true;

        // External sampling off: only the internal channel is programmed.
        let (report, bus) = run(SimBus::new(), &config).await;
        let units: Vec<Unit> = report.outcomes().iter().map(|o| o.unit).collect();
        assert_eq!(units, vec![Unit::Global, Unit::Adc(AdcChannel::Internal)]);
        assert_eq!(&bus.writes()[7..], &[(0x44, 0x0B), (0x45, 0x08)]);
        // Both wake bits still reach SYSCFG1.
        assert_eq!(bus.register(0x05), 0x3C);

        config.adc_external_sampling = true;
        let (report, bus) = run(SimBus::new(), &config).await;
        assert!(report.is_success());
        assert_eq!(
            &bus.writes()[7..],
            &[(0x44, 0x0B), (0x45, 0x08), (0x46, 0x0D), (0x47, 0x06)]
        );
    }

    #[tokio::test]
    async fn adc_threshold_out_of_range_is_rejected() {
        let mut config = DeviceConfig::sensor_node();
        only_global(&mut config);
        config.adc_internal = AdcChannelConfig {
            over_threshold: 0x20,
            under_threshold: 0x10,
            wake_up: true,
        };
        let (report, bus) = run(SimBus::new(), &config).await;
        let failure = report
            .outcome(Unit::Adc(AdcChannel::Internal))
            .unwrap()
            .result
            .clone()
            .unwrap_err();
        assert_eq!(failure.step, Step::Validate);
        assert!(!bus.writes().iter().any(|(reg, _)| *reg == 0x44));
    }

    #[tokio::test]
    async fn each_session_starts_at_arena_offset_zero() {
        let config = DeviceConfig::sensor_node();
        let mut npz = Npz::new(SimBus::new());
        let first = npz.configure(&config).await;
        let second = npz.configure(&config).await;
        assert_eq!(first.allocations(), second.allocations());
        assert_eq!(ConfigurationSession::new().arena().cursor(), 0);
    }

    #[test]
    fn report_display_names_failed_step() {
        let report = ConfigureReport {
            outcomes: vec![
                UnitOutcome {
                    unit: Unit::Global,
                    result: Ok(()),
                },
                UnitOutcome {
                    unit: Unit::Peripheral(Slot::P2),
                    result: Err(StepFailure {
                        step: Step::PollingPeriod,
                        error: NpzError::invalid("polling_period", "must be non-zero"),
                    }),
                },
            ],
            allocations: vec![],
            arena_used: 0,
        };
        let text = report.to_string();
        assert!(text.contains("global: ok"));
        assert!(text.contains(
            "peripheral P2: failed at polling period (PERP): Invalid polling_period: must be non-zero"
        ));
        assert!(text.ends_with("arena used: 0 bytes"));
    }
}
