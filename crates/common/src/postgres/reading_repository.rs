use crate::domain::{Reading, ReadingRepository, StorageError};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Column values of one `uplinks` row.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkRow {
    pub id: String,
    pub app_id: String,
    pub dev_id: String,
    pub hw_serial: String,
    pub port: i16,
    pub counter: i64,
    pub is_retry: bool,
    pub is_confirmed: bool,
    pub payload_raw: String,
    pub uplink_time: i64,
    pub frequency: Option<f32>,
    pub modulation: Option<String>,
    pub data_rate: Option<String>,
    pub bit_rate: Option<i32>,
}

impl From<&Reading> for UplinkRow {
    fn from(reading: &Reading) -> Self {
        let uplink = &reading.uplink;
        let metadata = &uplink.metadata;
        UplinkRow {
            id: uplink.id.clone(),
            app_id: uplink.app_id.clone(),
            dev_id: uplink.device_id.clone(),
            hw_serial: metadata.hardware_serial.clone(),
            port: i16::from(uplink.port),
            counter: i64::from(uplink.counter),
            is_retry: metadata.is_retry,
            is_confirmed: metadata.confirmed,
            payload_raw: uplink.payload_raw.clone(),
            uplink_time: reading.arrived_at.timestamp(),
            frequency: metadata.frequency,
            modulation: metadata.modulation.clone(),
            data_rate: metadata.data_rate.clone(),
            bit_rate: metadata
                .bit_rate
                .map(|rate| i32::try_from(rate).unwrap_or(i32::MAX)),
        }
    }
}

/// Column values of one `readings` row, in the integer widths the table uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub id: String,
    pub received_at: i64,
    pub device: String,
    pub uplink: String,
    pub payload: Vec<u8>,
    pub recorded_at: i64,
    pub wire_format: i16,
    pub hardware: i16,
    pub uptime: i64,
    pub temperature: f32,
    pub temperature_cal: f32,
    pub temperature_is_cal: bool,
    pub humidity: f32,
    pub pressure: f32,
    pub ccs811_status: i16,
    pub co2: i32,
    pub tvoc: i32,
    pub voltage: i16,
    pub gps_fix: Option<bool>,
    pub satellites: Option<i16>,
}

impl From<&Reading> for ReadingRow {
    fn from(reading: &Reading) -> Self {
        ReadingRow {
            id: reading.id.clone(),
            received_at: reading.arrived_at.timestamp(),
            device: reading.device_id.clone(),
            uplink: reading.uplink.id.clone(),
            payload: reading.payload.clone(),
            recorded_at: reading.recorded_at.timestamp(),
            wire_format: i16::from(reading.version.as_u8()),
            hardware: i16::from(reading.hardware),
            uptime: i64::from(reading.uptime),
            temperature: reading.temperature,
            temperature_cal: reading.calibration_temperature,
            temperature_is_cal: reading.calibrated,
            humidity: reading.humidity,
            pressure: reading.pressure,
            ccs811_status: i16::from(reading.ccs811_status.code()),
            co2: reading.co2,
            tvoc: reading.tvoc,
            voltage: i16::from(reading.voltage),
            gps_fix: reading.gps.map(|gps| gps.fix),
            satellites: reading.gps.map(|gps| i16::from(gps.satellites)),
        }
    }
}

#[derive(Clone)]
pub struct PostgresReadingRepository {
    client: PostgresClient,
}

impl PostgresReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn storage(e: tokio_postgres::Error) -> StorageError {
    StorageError(e.into())
}

#[async_trait]
impl ReadingRepository for PostgresReadingRepository {
    #[instrument(skip(self, reading), fields(reading_id = %reading.id, uplink_id = %reading.uplink.id, device_id = %reading.device_id))]
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        let uplink = UplinkRow::from(reading);
        let row = ReadingRow::from(reading);

        let mut conn = self.client.get_connection().await.map_err(StorageError)?;
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction().await.map_err(storage)?;

        tx.execute(
            "INSERT INTO uplinks (id, app_id, dev_id, hw_serial, port, counter, is_retry,
                 is_confirmed, payload_raw, uplink_time, frequency, modulation, data_rate, bit_rate)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &uplink.id,
                &uplink.app_id,
                &uplink.dev_id,
                &uplink.hw_serial,
                &uplink.port,
                &uplink.counter,
                &uplink.is_retry,
                &uplink.is_confirmed,
                &uplink.payload_raw,
                &uplink.uplink_time,
                &uplink.frequency,
                &uplink.modulation,
                &uplink.data_rate,
                &uplink.bit_rate,
            ],
        )
        .await
        .map_err(storage)?;

        tx.execute(
            "INSERT INTO readings (id, received_at, device, uplink, payload, recorded_at,
                 wire_format, hardware, uptime, temperature, temperature_cal, temperature_is_cal,
                 humidity, pressure, ccs811_status, co2, tvoc, voltage, gps_fix, satellites)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            &[
                &row.id,
                &row.received_at,
                &row.device,
                &row.uplink,
                &row.payload,
                &row.recorded_at,
                &row.wire_format,
                &row.hardware,
                &row.uptime,
                &row.temperature,
                &row.temperature_cal,
                &row.temperature_is_cal,
                &row.humidity,
                &row.pressure,
                &row.ccs811_status,
                &row.co2,
                &row.tvoc,
                &row.voltage,
                &row.gps_fix,
                &row.satellites,
            ],
        )
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        debug!("stored reading");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_recorded_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let conn = self.client.get_connection().await.map_err(StorageError)?;

        let row = conn
            .query_one("SELECT max(recorded_at) FROM readings", &[])
            .await
            .map_err(storage)?;
        let latest: Option<i64> = row.try_get(0).map_err(storage)?;

        Ok(latest.and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }
}
