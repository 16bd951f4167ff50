use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use redenv_payload::{
    ccs811_status, decode, decode_text, hardware_set, DecodeError, GpsFix, ReconcileError,
    TimestampReconciler, WireFormatVersion,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("bad timestamp: {0}")]
    Reconcile(#[from] ReconcileError),
}

/// Everything one payload says, in display units.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub wire_format: WireFormatVersion,
    pub length: usize,
    /// IANA name of the zone the node clock was read in.
    pub zone: &'static str,
    /// Node clock in the reference zone.
    pub recorded_at: DateTime<Tz>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
    pub hardware: u8,
    pub peripherals: Vec<&'static str>,
    pub uptime_secs: u32,
    pub temperature_c: f32,
    pub calibrated: bool,
    pub calibration_temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_kpa: f32,
    pub co2_ppm: Option<i32>,
    pub tvoc_ppb: Option<i32>,
    pub voltage_v: f32,
    pub ccs811_status: &'static str,
    pub ccs811_status_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsFix>,
}

/// Decodes hex or base64 text and renders it against `reconciler`'s zone.
///
/// With `received_at` the gateway time is reconciled too, the way the
/// collector stores it.
pub fn translate(
    text: &str,
    reconciler: &TimestampReconciler,
    received_at: Option<DateTime<Utc>>,
) -> Result<Translation, TranslateError> {
    let payload = decode_text(text)?;
    let (version, fields) = decode(&payload, payload.len())?;
    let clock = fields.header.device_clock();

    let recorded_at = reconciler.recorded_local(clock)?;
    let arrived_at = match received_at {
        Some(t) => Some(reconciler.reconcile(t, clock)?.arrived_at),
        None => None,
    };

    let header = &fields.header;
    let status = ccs811_status(fields.trailer.ccs811_status());

    Ok(Translation {
        wire_format: version,
        length: payload.len(),
        zone: reconciler.zone().name(),
        recorded_at,
        arrived_at,
        hardware: header.hardware,
        peripherals: hardware_set(header.hardware, version)
            .into_iter()
            .map(|p| p.name())
            .collect(),
        uptime_secs: header.uptime,
        temperature_c: header.temperature,
        calibrated: fields.trailer.calibrated(),
        calibration_temperature_c: header.calibration_temperature,
        humidity_pct: header.humidity,
        pressure_kpa: header.pressure_kpa(),
        co2_ppm: header.co2_ppm(),
        tvoc_ppb: header.tvoc_ppb(),
        voltage_v: fields.voltage_volts(),
        ccs811_status: status.description(),
        ccs811_status_code: status.code(),
        gps: fields.trailer.gps(),
    })
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn or_not_recorded(value: Option<i32>, unit: &str) -> String {
    match value {
        Some(v) => format!("{} {}", v, unit),
        None => "not recorded".to_string(),
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Format: {}", self.wire_format)?;
        writeln!(
            f,
            "Timestamp: {}",
            self.recorded_at.format("%Y-%m-%d %H:%M:%S %Z")
        )?;
        if let Some(arrived_at) = self.arrived_at {
            writeln!(
                f,
                "Arrived: {}",
                arrived_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            )?;
        }
        writeln!(
            f,
            "\tHardware: {} (0x{:02x})",
            self.peripherals.join(", "),
            self.hardware
        )?;
        writeln!(f, "\tUptime: {}s", self.uptime_secs)?;
        writeln!(f, "\tTemperature: {:.2}°C", self.temperature_c)?;
        writeln!(f, "\t\tCalibrated? {}", yes_no(self.calibrated))?;
        writeln!(
            f,
            "\t\tCalibration temperature: {:.2}°C",
            self.calibration_temperature_c
        )?;
        writeln!(f, "\tHumidity: {:.2}%", self.humidity_pct)?;
        writeln!(f, "\tPressure: {:.3} kPa", self.pressure_kpa)?;
        writeln!(f, "\tCO2: {}", or_not_recorded(self.co2_ppm, "ppm"))?;
        writeln!(f, "\tTVOC: {}", or_not_recorded(self.tvoc_ppb, "ppb"))?;
        writeln!(f, "\tVoltage: {:.2}V", self.voltage_v)?;
        write!(
            f,
            "\tCCS811 status: {} ({})",
            self.ccs811_status, self.ccs811_status_code
        )?;
        if let Some(gps) = self.gps {
            write!(f, "\n\tSats: {} (fix: {})", gps.satellites, yes_no(gps.fix))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BACKYARD_V2: &str =
        "e3070a1d100f170d000000007b14d2410000000000d8984107f7c547ffffffffffffffffccff00";
    const BACKYARD_V2_BASE64: &str = "4wcKHRAPFw0AAAAAexTSQQAAAAAA2JhBB/fFR///////////zP8A";
    const CALIBRATED_V3: &str =
        "e3070a1d0b1e040fab080000af479d411c85f34000aaf441c27bc6473f0200001a000000fd00010000";

    #[test]
    fn test_translate_v2_hex() {
        let t = translate(BACKYARD_V2, &TimestampReconciler::default(), None).unwrap();

        assert_eq!(t.wire_format, WireFormatVersion::V2);
        assert_eq!(t.length, 39);
        assert_eq!(t.peripherals, vec!["BME280", "RTC", "SD"]);
        assert_eq!(t.co2_ppm, None);
        assert_eq!(t.tvoc_ppb, None);
        assert!(!t.calibrated);
        assert!(t.gps.is_none());
        assert!((t.voltage_v - 20.4).abs() < 1e-4);
        assert_eq!(t.ccs811_status, "unknown");
        assert_eq!(t.ccs811_status_code, 255);
        assert_eq!(
            t.recorded_at.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2019, 10, 29, 23, 15, 23).unwrap()
        );
    }

    #[test]
    fn test_hex_and_base64_agree() {
        let reconciler = TimestampReconciler::default();
        let from_hex = translate(BACKYARD_V2, &reconciler, None).unwrap();
        let from_base64 = translate(BACKYARD_V2_BASE64, &reconciler, None).unwrap();

        assert_eq!(from_hex.to_string(), from_base64.to_string());
    }

    #[test]
    fn test_render_v2_text() {
        let rendered = translate(BACKYARD_V2, &TimestampReconciler::default(), None)
            .unwrap()
            .to_string();

        assert!(rendered.starts_with(
            "Format: v2 (17 fields, 39 bytes)\nTimestamp: 2019-10-29 16:15:23 PDT\n"
        ));
        assert!(rendered.contains("\tHardware: BME280, RTC, SD (0x0d)\n"));
        assert!(rendered.contains("\tPressure: 101.358 kPa\n"));
        assert!(rendered.contains("\tCO2: not recorded\n"));
        assert!(rendered.contains("\tTVOC: not recorded\n"));
        assert!(rendered.contains("\tVoltage: 20.40V\n"));
        assert!(rendered.ends_with("\tCCS811 status: unknown (255)"));
        assert!(!rendered.contains("Sats"));
        assert!(!rendered.contains("Arrived"));
    }

    #[test]
    fn test_render_v3_text() {
        let rendered = translate(CALIBRATED_V3, &TimestampReconciler::default(), None)
            .unwrap()
            .to_string();

        assert!(rendered.contains("\tHardware: BME280, CCS811, RTC, SD (0x0f)\n"));
        assert!(rendered.contains("\tUptime: 2219s\n"));
        assert!(rendered.contains("\t\tCalibrated? yes\n"));
        assert!(rendered.contains("\tCO2: 575 ppm\n"));
        assert!(rendered.contains("\tTVOC: 26 ppb\n"));
        assert!(rendered.contains("\tVoltage: 2.53V\n"));
        assert!(rendered.contains("\tCCS811 status: OK (0)\n"));
        assert!(rendered.ends_with("\tSats: 0 (fix: no)"));
    }

    #[test]
    fn test_translate_with_arrival_time() {
        let received_at = "2019-10-30T02:10:27.094175318Z".parse().unwrap();
        let t = translate(
            BACKYARD_V2,
            &TimestampReconciler::default(),
            Some(received_at),
        )
        .unwrap();

        let arrived_at = t.arrived_at.unwrap();
        assert_eq!(arrived_at.timestamp_subsec_millis(), 94);
        assert_eq!(arrived_at.timestamp_subsec_nanos(), 94_000_000);
        assert!(t.to_string().contains("Arrived: 2019-10-30T02:10:27.094Z\n"));
    }

    #[test]
    fn test_translate_other_zone() {
        let reconciler = TimestampReconciler::new(chrono_tz::Europe::Amsterdam);
        let t = translate(BACKYARD_V2, &reconciler, None).unwrap();

        assert_eq!(t.zone, "Europe/Amsterdam");
        assert_eq!(
            t.recorded_at.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2019, 10, 29, 15, 15, 23).unwrap()
        );
        assert!(t.to_string().contains("Timestamp: 2019-10-29 16:15:23 CET\n"));
    }

    #[test]
    fn test_translate_json_shape() {
        let t = translate(CALIBRATED_V3, &TimestampReconciler::default(), None).unwrap();
        let json = serde_json::to_value(&t).unwrap();

        assert_eq!(json["wire_format"], "V3");
        assert_eq!(json["zone"], "America/Los_Angeles");
        assert_eq!(json["co2_ppm"], 575);
        assert_eq!(json["gps"]["satellites"], 0);
        assert_eq!(json["peripherals"][1], "CCS811");
        assert!(json.get("arrived_at").is_none());
    }

    #[test]
    fn test_translate_errors() {
        let reconciler = TimestampReconciler::default();

        assert!(matches!(
            translate("e3070a1d", &reconciler, None),
            Err(TranslateError::Decode(DecodeError::UnknownFormat { length: 4 }))
        ));
        assert!(matches!(
            translate("not a payload!", &reconciler, None),
            Err(TranslateError::Decode(DecodeError::Malformed(_)))
        ));
        // month 13
        assert!(matches!(
            translate(
                "e3070d1d100f170d000000007b14d2410000000000d8984107f7c547ffffffffffffffffccff00",
                &reconciler,
                None
            ),
            Err(TranslateError::Reconcile(ReconcileError::InvalidDate { month: 13, .. }))
        ));
    }
}
