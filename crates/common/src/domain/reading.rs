use crate::domain::result::StorageError;
use crate::domain::uplink::UplinkRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redenv_payload::{
    ccs811_status, ccs811_value, hardware_set, pascals_to_kpa, Ccs811Status, GpsFix, Peripheral,
    RawFields, Reconciled, WireFormatVersion,
};
use std::collections::BTreeSet;

/// One decoded uplink. Built once per ingested message and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: String,
    pub device_id: String,
    /// Gateway receive time, millisecond precision.
    pub arrived_at: DateTime<Utc>,
    /// Node clock time, seconds precision.
    pub recorded_at: DateTime<Utc>,
    /// Payload exactly as received.
    pub payload: Vec<u8>,
    pub version: WireFormatVersion,
    pub hardware: u8,
    pub peripherals: BTreeSet<Peripheral>,
    /// Seconds since the node booted.
    pub uptime: u32,
    pub temperature: f32,
    pub calibration_temperature: f32,
    pub calibrated: bool,
    pub humidity: f32,
    /// Pascals.
    pub pressure: f32,
    /// ppm, or [`redenv_payload::NOT_RECORDED`].
    pub co2: i32,
    /// ppb, or [`redenv_payload::NOT_RECORDED`].
    pub tvoc: i32,
    /// Raw voltage byte; see [`Reading::voltage_volts`].
    pub voltage: u8,
    pub ccs811_status: Ccs811Status,
    pub gps: Option<GpsFix>,
    /// Envelope the reading arrived in; stored alongside it.
    pub uplink: UplinkRecord,
}

impl Reading {
    pub fn new(
        id: String,
        uplink: UplinkRecord,
        payload: Vec<u8>,
        fields: &RawFields,
        times: Reconciled,
    ) -> Self {
        let version = fields.version();
        let header = &fields.header;
        Self {
            id,
            device_id: uplink.device_id.clone(),
            arrived_at: times.arrived_at,
            recorded_at: times.recorded_at,
            payload,
            version,
            hardware: header.hardware,
            peripherals: hardware_set(header.hardware, version),
            uptime: header.uptime,
            temperature: header.temperature,
            calibration_temperature: header.calibration_temperature,
            calibrated: fields.trailer.calibrated(),
            humidity: header.humidity,
            pressure: header.pressure,
            co2: header.co2,
            tvoc: header.tvoc,
            voltage: fields.trailer.voltage(),
            ccs811_status: ccs811_status(fields.trailer.ccs811_status()),
            gps: fields.trailer.gps(),
            uplink,
        }
    }

    pub fn pressure_kpa(&self) -> f32 {
        pascals_to_kpa(self.pressure)
    }

    pub fn voltage_volts(&self) -> f32 {
        f32::from(self.voltage) / self.version.voltage_scale()
    }

    pub fn co2_ppm(&self) -> Option<i32> {
        ccs811_value(self.co2)
    }

    pub fn tvoc_ppb(&self) -> Option<i32> {
        ccs811_value(self.tvoc)
    }
}

/// Write side of reading storage.
///
/// Implementations acquire whatever connection they need for the duration
/// of one call and release it on every path.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Stores the reading and its uplink envelope atomically.
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError>;

    /// Node clock time of the newest stored reading, if any.
    async fn latest_recorded_at(&self) -> Result<Option<DateTime<Utc>>, StorageError>;
}
