use crate::reconcile::DeviceClock;
use crate::{DecodeError, Result};
use serde::Serialize;

/// Size of the header shared by every layout, in bytes.
pub const HEADER_LEN: usize = 36;

/// Fields in the shared header: year, five clock bytes, hardware, uptime,
/// four floats and two signed integers.
const HEADER_FIELDS: usize = 14;

/// Known payload layouts, one per node firmware revision.
///
/// Layouts are told apart only by their exact byte length. A new firmware
/// revision must therefore pick a length no existing layout uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WireFormatVersion {
    /// Voltage and CCS811 status only.
    V1,
    /// Adds the temperature calibration flag.
    V2,
    /// Adds the GPS fix flag and satellite count; voltage in centivolts.
    V3,
}

impl WireFormatVersion {
    pub const ALL: [WireFormatVersion; 3] = [Self::V1, Self::V2, Self::V3];

    /// Layout written by current node firmware.
    pub fn latest() -> Self {
        Self::V3
    }

    /// Number of single-byte fields after the header.
    pub fn trailer_len(self) -> usize {
        match self {
            Self::V1 => 2,
            Self::V2 => 3,
            Self::V3 => 5,
        }
    }

    pub fn payload_len(self) -> usize {
        HEADER_LEN + self.trailer_len()
    }

    pub fn field_count(self) -> usize {
        HEADER_FIELDS + self.trailer_len()
    }

    /// Divisor turning the raw voltage byte into volts.
    pub fn voltage_scale(self) -> f32 {
        match self {
            Self::V1 | Self::V2 => 10.0,
            Self::V3 => 100.0,
        }
    }

    pub fn has_gps(self) -> bool {
        matches!(self, Self::V3)
    }

    pub fn from_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.payload_len() == len)
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

impl std::fmt::Display for WireFormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({} fields, {} bytes)", self.as_u8(), self.field_count(), self.payload_len())
    }
}

/// The fixed 36-byte header present in every layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Header {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hardware: u8,
    pub uptime: u32,
    pub temperature: f32,
    pub calibration_temperature: f32,
    pub humidity: f32,
    /// Pascals.
    pub pressure: f32,
    /// ppm, -1 when the CCS811 did not record.
    pub co2: i32,
    /// ppb, -1 when the CCS811 did not record.
    pub tvoc: i32,
}

/// Sentinel the node sends for CO2/TVOC when the CCS811 took no sample.
pub const NOT_RECORDED: i32 = -1;

/// `None` when a CCS811 value carries the not-recorded sentinel.
pub fn ccs811_value(raw: i32) -> Option<i32> {
    (raw != NOT_RECORDED).then_some(raw)
}

pub fn pascals_to_kpa(pascals: f32) -> f32 {
    pascals / 1000.0
}

impl Header {
    pub fn pressure_kpa(&self) -> f32 {
        pascals_to_kpa(self.pressure)
    }

    pub fn co2_ppm(&self) -> Option<i32> {
        ccs811_value(self.co2)
    }

    pub fn tvoc_ppb(&self) -> Option<i32> {
        ccs811_value(self.tvoc)
    }

    pub fn device_clock(&self) -> DeviceClock {
        DeviceClock {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        }
    }
}

/// Trailing single-byte fields, one variant per layout.
///
/// Flag bytes are kept as sent so the payload re-encodes exactly; a flag
/// counts as set only when its byte is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trailer {
    V1 {
        voltage: u8,
        ccs811_status: u8,
    },
    V2 {
        voltage: u8,
        ccs811_status: u8,
        calibrated: u8,
    },
    V3 {
        voltage: u8,
        ccs811_status: u8,
        calibrated: u8,
        gps_fix: u8,
        satellites: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpsFix {
    pub fix: bool,
    pub satellites: u8,
}

impl Trailer {
    pub fn version(&self) -> WireFormatVersion {
        match self {
            Self::V1 { .. } => WireFormatVersion::V1,
            Self::V2 { .. } => WireFormatVersion::V2,
            Self::V3 { .. } => WireFormatVersion::V3,
        }
    }

    pub fn voltage(&self) -> u8 {
        match *self {
            Self::V1 { voltage, .. } | Self::V2 { voltage, .. } | Self::V3 { voltage, .. } => {
                voltage
            }
        }
    }

    pub fn ccs811_status(&self) -> u8 {
        match *self {
            Self::V1 { ccs811_status, .. }
            | Self::V2 { ccs811_status, .. }
            | Self::V3 { ccs811_status, .. } => ccs811_status,
        }
    }

    /// V1 nodes never report calibration, so they read as uncalibrated.
    pub fn calibrated(&self) -> bool {
        match *self {
            Self::V1 { .. } => false,
            Self::V2 { calibrated, .. } | Self::V3 { calibrated, .. } => calibrated == 1,
        }
    }

    pub fn gps(&self) -> Option<GpsFix> {
        match *self {
            Self::V3 {
                gps_fix,
                satellites,
                ..
            } => Some(GpsFix {
                fix: gps_fix == 1,
                satellites,
            }),
            _ => None,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match *self {
            Self::V1 {
                voltage,
                ccs811_status,
            } => vec![voltage, ccs811_status],
            Self::V2 {
                voltage,
                ccs811_status,
                calibrated,
            } => vec![voltage, ccs811_status, calibrated],
            Self::V3 {
                voltage,
                ccs811_status,
                calibrated,
                gps_fix,
                satellites,
            } => vec![voltage, ccs811_status, calibrated, gps_fix, satellites],
        }
    }
}

/// One decoded payload: the shared header plus the layout's trailer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawFields {
    pub header: Header,
    pub trailer: Trailer,
}

impl RawFields {
    pub fn version(&self) -> WireFormatVersion {
        self.trailer.version()
    }

    /// Voltage in volts, using the layout's scale factor.
    pub fn voltage_volts(&self) -> f32 {
        f32::from(self.trailer.voltage()) / self.version().voltage_scale()
    }

    /// Re-encodes the fields in wire order.
    pub fn encode(&self) -> Vec<u8> {
        let h = &self.header;
        let mut buf = Vec::with_capacity(self.version().payload_len());
        buf.extend_from_slice(&h.year.to_le_bytes());
        buf.extend_from_slice(&[h.month, h.day, h.hour, h.minute, h.second, h.hardware]);
        buf.extend_from_slice(&h.uptime.to_le_bytes());
        buf.extend_from_slice(&h.temperature.to_le_bytes());
        buf.extend_from_slice(&h.calibration_temperature.to_le_bytes());
        buf.extend_from_slice(&h.humidity.to_le_bytes());
        buf.extend_from_slice(&h.pressure.to_le_bytes());
        buf.extend_from_slice(&h.co2.to_le_bytes());
        buf.extend_from_slice(&h.tvoc.to_le_bytes());
        buf.extend_from_slice(&self.trailer.bytes());
        buf
    }
}

/// Little-endian cursor over a payload whose length was already checked.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let bytes = self
            .data
            .get(self.offset..end)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or_else(|| {
                DecodeError::Malformed(format!(
                    "need {} bytes at offset {}, payload is {} bytes",
                    N,
                    self.offset,
                    self.data.len()
                ))
            })?;
        self.offset = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }
}

/// Decodes a payload into the layout matching `declared_len`.
///
/// `declared_len` is the length the transport says it delivered. A payload
/// that disagrees with it was truncated or padded on the way and is
/// rejected as malformed; a length no layout uses is an unknown format.
pub fn decode(payload: &[u8], declared_len: usize) -> Result<(WireFormatVersion, RawFields)> {
    if payload.len() != declared_len {
        return Err(DecodeError::Malformed(format!(
            "declared {} bytes, received {}",
            declared_len,
            payload.len()
        )));
    }

    let version = WireFormatVersion::from_len(declared_len)
        .ok_or(DecodeError::UnknownFormat { length: declared_len })?;

    let mut r = Reader::new(payload);
    let header = Header {
        year: r.u16()?,
        month: r.u8()?,
        day: r.u8()?,
        hour: r.u8()?,
        minute: r.u8()?,
        second: r.u8()?,
        hardware: r.u8()?,
        uptime: r.u32()?,
        temperature: r.f32()?,
        calibration_temperature: r.f32()?,
        humidity: r.f32()?,
        pressure: r.f32()?,
        co2: r.i32()?,
        tvoc: r.i32()?,
    };

    let trailer = match version {
        WireFormatVersion::V1 => Trailer::V1 {
            voltage: r.u8()?,
            ccs811_status: r.u8()?,
        },
        WireFormatVersion::V2 => Trailer::V2 {
            voltage: r.u8()?,
            ccs811_status: r.u8()?,
            calibrated: r.u8()?,
        },
        WireFormatVersion::V3 => Trailer::V3 {
            voltage: r.u8()?,
            ccs811_status: r.u8()?,
            calibrated: r.u8()?,
            gps_fix: r.u8()?,
            satellites: r.u8()?,
        },
    };

    Ok((version, RawFields { header, trailer }))
}
