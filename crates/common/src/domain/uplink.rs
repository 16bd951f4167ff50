use redenv_payload::{decode_base64, decode_hex, DecodeError};

/// How the payload bytes of an uplink are written out as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadEncoding {
    #[default]
    Base64,
    Hex,
}

/// Radio and delivery details the network attaches to an uplink.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UplinkMetadata {
    /// DevEUI for LoRaWAN devices.
    pub hardware_serial: String,
    pub is_retry: bool,
    pub confirmed: bool,
    /// MHz.
    pub frequency: Option<f32>,
    pub modulation: Option<String>,
    pub data_rate: Option<String>,
    pub bit_rate: Option<u32>,
}

/// One uplink as handed over by the transport, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUplink {
    pub device_id: String,
    pub payload: String,
    pub encoding: PayloadEncoding,
    /// Gateway receive time, RFC3339, possibly with nanoseconds.
    pub received_at: String,
    pub app_id: String,
    pub port: u8,
    pub counter: u32,
    pub metadata: UplinkMetadata,
}

impl RawUplink {
    pub fn payload_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        match self.encoding {
            PayloadEncoding::Base64 => decode_base64(&self.payload),
            PayloadEncoding::Hex => decode_hex(&self.payload),
        }
    }

    /// Keeps the transport envelope under `id` once the payload is decoded.
    pub fn into_record(self, id: String) -> UplinkRecord {
        UplinkRecord {
            id,
            app_id: self.app_id,
            device_id: self.device_id,
            port: self.port,
            counter: self.counter,
            payload_raw: self.payload,
            metadata: self.metadata,
        }
    }
}

/// The envelope a reading arrived in, stored next to it for audit and replay.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkRecord {
    pub id: String,
    pub app_id: String,
    pub device_id: String,
    pub port: u8,
    pub counter: u32,
    /// Payload text exactly as the transport delivered it.
    pub payload_raw: String,
    pub metadata: UplinkMetadata,
}
