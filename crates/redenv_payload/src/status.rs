use serde::Serialize;

/// CCS811 air quality sensor status as reported by the node firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Ccs811Status {
    Ok,
    InvalidId,
    I2cError,
    InternalError,
    GenericError,
    Unknown(u8),
}

impl Ccs811Status {
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::InvalidId => 1,
            Self::I2cError => 2,
            Self::InternalError => 3,
            Self::GenericError => 4,
            Self::Unknown(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidId => "invalid ID",
            Self::I2cError => "I2C error",
            Self::InternalError => "internal error",
            Self::GenericError => "generic error",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl std::fmt::Display for Ccs811Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

pub fn ccs811_status(code: u8) -> Ccs811Status {
    match code {
        0 => Ccs811Status::Ok,
        1 => Ccs811Status::InvalidId,
        2 => Ccs811Status::I2cError,
        3 => Ccs811Status::InternalError,
        4 => Ccs811Status::GenericError,
        other => Ccs811Status::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(ccs811_status(0).description(), "OK");
        assert_eq!(ccs811_status(1).description(), "invalid ID");
        assert_eq!(ccs811_status(2).description(), "I2C error");
        assert_eq!(ccs811_status(3).description(), "internal error");
        assert_eq!(ccs811_status(4).description(), "generic error");
    }

    #[test]
    fn test_every_code_maps() {
        for code in 0..=u8::MAX {
            let status = ccs811_status(code);
            assert_eq!(status.code(), code);
            if code >= 5 {
                assert_eq!(status, Ccs811Status::Unknown(code));
                assert_eq!(status.to_string(), "unknown");
            }
        }
    }
}
