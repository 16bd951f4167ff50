use common::domain::{PayloadEncoding, RawUplink, UplinkMetadata};
use serde::{Deserialize, Serialize};

/// Uplink message as published on `{app_id}/devices/{dev_id}/up`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtnUplink {
    pub app_id: String,
    pub dev_id: String,
    /// DevEUI for LoRaWAN devices.
    #[serde(default)]
    pub hardware_serial: String,
    /// LoRaWAN FPort.
    #[serde(default)]
    pub port: u8,
    /// LoRaWAN frame counter.
    #[serde(default)]
    pub counter: u32,
    #[serde(default)]
    pub is_retry: bool,
    #[serde(default)]
    pub confirmed: bool,
    /// Base64 payload bytes.
    pub payload_raw: String,
    pub metadata: TtnMetadata,
}

/// Radio details of the delivery. TTN also lists the receiving gateways
/// here; they are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtnMetadata {
    /// Network server receive time, RFC3339 with nanoseconds.
    pub time: String,
    /// MHz.
    #[serde(default)]
    pub frequency: Option<f32>,
    #[serde(default)]
    pub modulation: Option<String>,
    /// LoRa only, e.g. `SF7BW125`.
    #[serde(default)]
    pub data_rate: Option<String>,
    /// FSK only.
    #[serde(default)]
    pub bit_rate: Option<u32>,
}

impl TtnUplink {
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    pub fn into_raw_uplink(self) -> RawUplink {
        RawUplink {
            device_id: self.dev_id,
            payload: self.payload_raw,
            encoding: PayloadEncoding::Base64,
            received_at: self.metadata.time,
            app_id: self.app_id,
            port: self.port,
            counter: self.counter,
            metadata: UplinkMetadata {
                hardware_serial: self.hardware_serial,
                is_retry: self.is_retry,
                confirmed: self.confirmed,
                frequency: self.metadata.frequency,
                modulation: self.metadata.modulation,
                data_rate: self.metadata.data_rate,
                bit_rate: self.metadata.bit_rate,
            },
        }
    }
}
