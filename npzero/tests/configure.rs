//! End-to-end configuration passes against the simulated device.

use npzero::{
    hw_trait::{HwError, I2cError},
    peripheral::npz::{
        DEFAULT_ADDRESS, DeviceConfig, Npz, NpzError, Slot, Unit,
        codec::{AdcChannel, ResetSource, Sta1},
        telemetry::PeripheralValue,
    },
    transport::sim::SimBus,
};

const CONFIG_JSON: &str = r#"{
    "host_power_mode": "switch",
    "power_switch_normal_mode": [false, true, false, false],
    "gate_boost": true,
    "wake_up": [false, true, false, false],
    "wake_policy": "all",
    "clock_source": "xo32_khz",
    "clock_divider": "div4",
    "io_strength": "high",
    "i2c_pull": "always_on",
    "spi_pins": "auto_disable",
    "clock_out": "khz1",
    "global_timeout": 600,
    "interrupt_pin_pull": ["disabled", "pulled_low", "disabled", "disabled"],
    "adc_external_sampling": true,
    "adc_clock": "hz64",
    "adc_internal": { "over_threshold": 20, "under_threshold": 10, "wake_up": false },
    "adc_external": { "over_threshold": 30, "under_threshold": 5, "wake_up": true },
    "peripherals": [
        null,
        {
            "power_mode": "periodic",
            "polling_mode": "periodic_wait_interrupt_compare_threshold",
            "power_switch_mode": "standard",
            "interrupt_pin_mode": "input_active_low",
            "comparison_mode": "outside_threshold",
            "data_type": "uint8",
            "multi_byte_transfer": false,
            "endianness": "little",
            "polling_period": 10,
            "bus": {
                "protocol": "i2c",
                "address": 72,
                "read_register": 5,
                "retries": 1,
                "wake_on_nak": false,
                "init_commands": [[1, 96]]
            },
            "threshold_over": 200,
            "threshold_under": 20,
            "wait_time": 4,
            "pre_wait": "disabled",
            "post_wait": "x4096"
        },
        null,
        null
    ]
}"#;

fn config() -> DeviceConfig {
    serde_json::from_str(CONFIG_JSON).expect("fixture parses")
}

#[tokio::test]
async fn json_config_programs_expected_registers() {
    let mut npz = Npz::new(SimBus::new());
    npz.init().await.unwrap();
    npz.i2c_mut().clear_log();

    let report = npz.configure(&config()).await;
    assert!(report.is_success(), "{}", report);

    let units: Vec<Unit> = report.outcomes().iter().map(|o| o.unit).collect();
    assert_eq!(
        units,
        vec![
            Unit::Global,
            Unit::Peripheral(Slot::P2),
            Unit::Adc(AdcChannel::External),
        ]
    );

    assert_eq!(
        npz.i2c().writes(),
        vec![
            // Global group
            (0x08, 0x58),
            (0x09, 0x02),
            (0x05, 0x62),
            (0x06, 0x3B),
            (0x07, 0x6B),
            (0x04, 0x52),
            (0x0A, 0x04),
            // P2
            (0x1D, 0x55),
            (0x1E, 0x05),
            (0x1F, 0x0A),
            (0x20, 0x00),
            (0x21, 0x01),
            (0x80, 0x01),
            (0x81, 0x60),
            (0x22, 0x48),
            (0x23, 0x05),
            (0x26, 0x14),
            (0x27, 0x00),
            (0x24, 0xC8),
            (0x25, 0x00),
            (0x28, 0x04),
            (0x29, 0x1C),
            // External ADC
            (0x46, 0x1E),
            (0x47, 0x05),
        ]
    );

    let allocation = report.allocations()[0];
    assert_eq!(allocation.slot, Slot::P2);
    assert_eq!(
        npz.read_arena(allocation.range).await.unwrap(),
        vec![0x01, 0x60]
    );
}

#[tokio::test]
async fn sleep_then_wake_report() {
    let mut npz = Npz::new(SimBus::new());
    npz.init().await.unwrap();
    assert!(npz.configure(&config()).await.is_success());
    npz.sleep().await.unwrap();

    // The device owns the bus until it wakes the host.
    let err = npz.detect().await.unwrap_err();
    assert_eq!(
        err,
        NpzError::Bus(HwError::I2c(I2cError::Nak(DEFAULT_ADDRESS)))
    );

    // It woke the host on P2 and saw a floating ADC_IN.
    let bus = npz.i2c_mut();
    bus.wake();
    bus.set_register(0x02, 0x21);
    bus.set_register(0x59, 0x1F);
    bus.set_register(0x03, 0x04);
    bus.set_register(0x52, 0xC8);
    bus.set_register(0x53, 0xAB);

    let report = npz.wake_report().await.unwrap();
    assert_eq!(report.status.reset_source, Some(ResetSource::PowerOn));
    assert_eq!(report.adc.len(), 1);
    assert!(report.adc[0].is_disconnected());
    assert_eq!(report.peripherals.len(), 1);
    assert_eq!(report.peripherals[0].slot, Slot::P2);
    assert_eq!(report.peripherals[0].value, Some(PeripheralValue::Byte(0xC8)));
}

#[tokio::test]
async fn soft_reset_clears_configuration() {
    let mut npz = Npz::new(SimBus::new());
    assert!(npz.configure(&config()).await.is_success());
    npz.soft_reset().await.unwrap();

    let status: Sta1 = npz.read().await.unwrap();
    assert_eq!(status.reset_source, Some(ResetSource::Soft));
    assert_eq!(npz.i2c().register(0x1D), 0);
    assert_eq!(npz.i2c().register(0x80), 0);
}

#[tokio::test]
async fn preset_survives_json_and_configures_identically() {
    let preset = DeviceConfig::sensor_node();
    let json = serde_json::to_string(&preset).unwrap();
    let parsed: DeviceConfig = serde_json::from_str(&json).unwrap();

    let mut direct = Npz::new(SimBus::new());
    let mut via_json = Npz::new(SimBus::new());
    let a = direct.configure(&preset).await;
    let b = via_json.configure(&parsed).await;

    assert_eq!(a, b);
    assert_eq!(direct.i2c().writes(), via_json.i2c().writes());
    assert_eq!(a.arena_used(), 7);
}
