//! Declarative device configuration.
//!
//! A [`DeviceConfig`] describes everything the host wants the nPZero to do
//! while it sleeps. It is plain data. Nothing here touches the bus; see
//! [`super::orchestrator`] for how it turns into register writes.

use serde::{Deserialize, Serialize};

use super::codec::{
    AdcClock, ClockDivider, ClockOut, ClockSource, ComparisonMode, DataType, Endianness,
    HostPowerMode, I2cPull, IntPinPull, InterruptPinMode, IoStrength, PollingMode, PowerMode,
    PowerSwitchMode, Protocol, SpiMode, SpiPins, WaitExtension, WakePolicy,
};
use super::protocol::Slot;

/// Complete nPZero configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host_power_mode: HostPowerMode,
    /// Per-slot power switch state while the host is awake.
    pub power_switch_normal_mode: [bool; 4],
    pub gate_boost: bool,
    /// Per-slot wake-up enables.
    pub wake_up: [bool; 4],
    pub wake_policy: WakePolicy,
    pub clock_source: ClockSource,
    pub clock_divider: ClockDivider,
    pub io_strength: IoStrength,
    pub i2c_pull: I2cPull,
    pub spi_pins: SpiPins,
    pub clock_out: ClockOut,
    /// System clock ticks before the host is woken regardless. Must be non-zero.
    pub global_timeout: u16,
    pub interrupt_pin_pull: [IntPinPull; 4],
    pub adc_external_sampling: bool,
    pub adc_clock: AdcClock,
    pub adc_internal: AdcChannelConfig,
    pub adc_external: AdcChannelConfig,
    pub peripherals: [Option<PeripheralConfig>; 4],
}

impl DeviceConfig {
    /// Configuration of `slot`, if any.
    pub fn peripheral(&self, slot: Slot) -> Option<&PeripheralConfig> {
        self.peripherals[slot.index()].as_ref()
    }

    /// Configured slots in ascending order.
    pub fn configured_slots(&self) -> impl Iterator<Item = (Slot, &PeripheralConfig)> {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.peripheral(slot).map(|p| (slot, p)))
    }

    /// Sensor node: SPI accelerometer on slot 3 and I2C temperature
    /// sensor on slot 4, host woken by either one.
    pub fn sensor_node() -> Self {
        Self {
            host_power_mode: HostPowerMode::LogicOutput,
            power_switch_normal_mode: [false, false, true, true],
            gate_boost: false,
            wake_up: [false, false, true, true],
            wake_policy: WakePolicy::Any,
            clock_source: ClockSource::Lf10Hz,
            clock_divider: ClockDivider::Disabled,
            io_strength: IoStrength::Normal,
            i2c_pull: I2cPull::Auto,
            spi_pins: SpiPins::AlwaysOn,
            clock_out: ClockOut::Off,
            global_timeout: 0x0BB8,
            interrupt_pin_pull: [IntPinPull::PulledHigh; 4],
            adc_external_sampling: false,
            adc_clock: AdcClock::Hz256,
            // Threshold fields are 5 bits wide.
            adc_internal: AdcChannelConfig {
                over_threshold: 0x0B,
                under_threshold: 0x08,
                wake_up: false,
            },
            adc_external: AdcChannelConfig {
                over_threshold: 0x0D,
                under_threshold: 0x06,
                wake_up: false,
            },
            peripherals: [
                None,
                None,
                Some(PeripheralConfig::accelerometer()),
                Some(PeripheralConfig::temperature_sensor()),
            ],
        }
    }
}

/// One ADC channel's window comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdcChannelConfig {
    /// 5-bit ADC code. Must be non-zero.
    pub over_threshold: u8,
    /// 5-bit ADC code. Must be non-zero.
    pub under_threshold: u8,
    pub wake_up: bool,
}

/// One peripheral slot's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    pub power_mode: PowerMode,
    pub polling_mode: PollingMode,
    pub power_switch_mode: PowerSwitchMode,
    pub interrupt_pin_mode: InterruptPinMode,
    pub comparison_mode: ComparisonMode,
    pub data_type: DataType,
    pub multi_byte_transfer: bool,
    pub endianness: Endianness,
    /// System clock ticks between polls. Must be non-zero.
    pub polling_period: u16,
    pub bus: PeripheralBus,
    pub threshold_over: u16,
    pub threshold_under: u16,
    pub wait_time: u8,
    pub pre_wait: WaitExtension,
    pub post_wait: WaitExtension,
}

impl PeripheralConfig {
    /// LIS2DH-style SPI accelerometer reporting signed X-axis samples.
    pub fn accelerometer() -> Self {
        Self {
            power_mode: PowerMode::Periodic,
            polling_mode: PollingMode::PeriodicReadCompareThreshold,
            power_switch_mode: PowerSwitchMode::LogicOutputHigh,
            interrupt_pin_mode: InterruptPinMode::InputActiveHigh,
            comparison_mode: ComparisonMode::InsideThreshold,
            data_type: DataType::Int16,
            multi_byte_transfer: false,
            endianness: Endianness::Little,
            polling_period: 50,
            bus: PeripheralBus::Spi(SpiPeripheral {
                mode: SpiMode::Mode0,
                init_sequence: vec![0x20, 0x10],
                read_sequence: vec![0xA8],
            }),
            threshold_over: 1000,
            // -1000 as a two's complement i16.
            threshold_under: 64536,
            wait_time: 10,
            pre_wait: WaitExtension::X256,
            post_wait: WaitExtension::X256,
        }
    }

    /// AS6212-style I2C temperature sensor.
    pub fn temperature_sensor() -> Self {
        Self {
            power_mode: PowerMode::Periodic,
            polling_mode: PollingMode::PeriodicReadCompareThreshold,
            power_switch_mode: PowerSwitchMode::LogicOutputHigh,
            interrupt_pin_mode: InterruptPinMode::InputActiveHigh,
            comparison_mode: ComparisonMode::InsideThreshold,
            data_type: DataType::Int16,
            multi_byte_transfer: true,
            endianness: Endianness::Big,
            polling_period: 0x012C,
            bus: PeripheralBus::I2c(I2cPeripheral {
                address: 0x49,
                read_register: 0x00,
                retries: 3,
                wake_on_nak: true,
                init_commands: vec![[0x01, 0x82], [0x02, 0xA0]],
            }),
            threshold_over: 3200,
            threshold_under: 1280,
            wait_time: 0x31,
            pre_wait: WaitExtension::X256,
            post_wait: WaitExtension::X256,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.bus {
            PeripheralBus::I2c(_) => Protocol::I2c,
            PeripheralBus::Spi(_) => Protocol::Spi,
        }
    }
}

/// Bus-specific part of a peripheral configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum PeripheralBus {
    I2c(I2cPeripheral),
    Spi(SpiPeripheral),
}

/// Peripheral on the nPZero's I2C master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cPeripheral {
    /// 7-bit address.
    pub address: u8,
    /// Register holding the value to compare against the thresholds.
    pub read_register: u8,
    /// NAK retries, 0-3.
    pub retries: u8,
    pub wake_on_nak: bool,
    /// Register/value pairs written after power-up, in order.
    pub init_commands: Vec<[u8; 2]>,
}

/// Peripheral on the nPZero's SPI master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiPeripheral {
    pub mode: SpiMode,
    /// Bytes clocked out after power-up.
    pub init_sequence: Vec<u8>,
    /// Bytes clocked out to read the value; empty if none.
    pub read_sequence: Vec<u8>,
}
