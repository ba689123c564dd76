//! Integration tests for drivesight-common.

use drivesight_common::{
    Format, KeyExprBuilder, LogFormat, LoggingConfig, TelemetryPoint, TelemetryValue, decode,
    decode_auto, encode,
};

#[test]
fn test_drive_point_through_both_formats() {
    let point = TelemetryPoint::new("acs400", "output_freq", TelemetryValue::Gauge(50.0))
        .with_unit("Hz")
        .with_label("address", "0103");

    let json = encode(&point, Format::Json).expect("JSON encode failed");
    let cbor = encode(&point, Format::Cbor).expect("CBOR encode failed");
    assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");

    for bytes in [json, cbor] {
        let decoded: TelemetryPoint = decode_auto(&bytes).expect("decode failed");
        assert_eq!(decoded.source, "acs400");
        assert_eq!(decoded.metric, "output_freq");
        assert_eq!(decoded.value, TelemetryValue::Gauge(50.0));
        assert_eq!(decoded.labels.get("address").map(String::as_str), Some("0103"));
    }
}

#[test]
fn test_flag_and_gauge_values_stay_distinct() {
    for value in [TelemetryValue::Boolean(false), TelemetryValue::Gauge(0.0)] {
        let point = TelemetryPoint::new("acs400", "relay1", value);
        let encoded = encode(&point, Format::Json).unwrap();
        let decoded: TelemetryPoint = decode(&encoded, Format::Json).unwrap();
        assert_eq!(decoded.value, value);
    }
}

#[test]
fn test_key_layout() {
    let builder = KeyExprBuilder::new("drivesight");

    assert_eq!(builder.metric("acs400", "pressure"), "drivesight/acs400/pressure");
    assert_eq!(
        builder.command("acs400", "pressure_reference"),
        "drivesight/acs400/@/commands/pressure_reference"
    );
    assert_eq!(builder.device_wildcard("acs400"), "drivesight/acs400/**");
}

#[test]
fn test_logging_section_json5() {
    let config: LoggingConfig = json5::from_str(r#"{ level: "warn", format: "json" }"#).unwrap();

    assert_eq!(config.level, "warn");
    assert_eq!(config.format, LogFormat::Json);
}
