use crate::WireFormatVersion;
use serde::Serialize;
use std::collections::BTreeSet;

/// Peripherals a node can report in its hardware bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Peripheral {
    Bme280,
    Ccs811,
    Rtc,
    SdCard,
    Gps,
}

impl Peripheral {
    pub fn bit(self) -> u8 {
        match self {
            Self::Bme280 => 1 << 0,
            Self::Ccs811 => 1 << 1,
            Self::Rtc => 1 << 2,
            Self::SdCard => 1 << 3,
            Self::Gps => 1 << 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bme280 => "BME280",
            Self::Ccs811 => "CCS811",
            Self::Rtc => "RTC",
            Self::SdCard => "SD",
            Self::Gps => "GPS",
        }
    }

    /// Peripherals a node running `version` firmware can report.
    fn known_to(version: WireFormatVersion) -> &'static [Peripheral] {
        const BASE: [Peripheral; 4] = [
            Peripheral::Bme280,
            Peripheral::Ccs811,
            Peripheral::Rtc,
            Peripheral::SdCard,
        ];
        const WITH_GPS: [Peripheral; 5] = [
            Peripheral::Bme280,
            Peripheral::Ccs811,
            Peripheral::Rtc,
            Peripheral::SdCard,
            Peripheral::Gps,
        ];
        if version.has_gps() {
            &WITH_GPS
        } else {
            &BASE
        }
    }
}

impl std::fmt::Display for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Expands a hardware bitmask. Bits the firmware version does not define
/// are ignored.
pub fn hardware_set(mask: u8, version: WireFormatVersion) -> BTreeSet<Peripheral> {
    Peripheral::known_to(version)
        .iter()
        .copied()
        .filter(|p| mask & p.bit() != 0)
        .collect()
}
