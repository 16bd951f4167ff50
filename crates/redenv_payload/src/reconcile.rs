use crate::ReconcileError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Zone the node clocks are set in unless configured otherwise.
pub const DEFAULT_ZONE: Tz = chrono_tz::America::Los_Angeles;

/// Date and time fields as read from the node's real-time clock.
///
/// The node has no notion of time zone; the fields are wall-clock time in
/// whatever zone the clock was set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DeviceClock {
    /// Validates the fields as a calendar date and time.
    pub fn to_naive(&self) -> Result<NaiveDateTime, ReconcileError> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
        })
        .ok_or(ReconcileError::InvalidDate {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        })
    }
}

/// The two instants attached to every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    /// When the gateway received the uplink, millisecond precision.
    pub arrived_at: DateTime<Utc>,
    /// When the node says it took the sample.
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimestampReconciler {
    zone: Tz,
}

impl Default for TimestampReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE)
    }
}

impl TimestampReconciler {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn reconcile(
        &self,
        gateway_time: DateTime<Utc>,
        clock: DeviceClock,
    ) -> Result<Reconciled, ReconcileError> {
        Ok(Reconciled {
            arrived_at: truncate_to_millis(gateway_time)?,
            recorded_at: self.recorded_local(clock)?.with_timezone(&Utc),
        })
    }

    /// Interprets the device clock in the reference zone.
    ///
    /// An ambiguous wall-clock time (autumn fall-back) resolves to the
    /// earlier instant. A time skipped by a spring-forward gap is read with
    /// the offset in effect just before the gap.
    pub fn recorded_local(&self, clock: DeviceClock) -> Result<DateTime<Tz>, ReconcileError> {
        let naive = clock.to_naive()?;
        if let Some(local) = self.zone.from_local_datetime(&naive).earliest() {
            return Ok(local);
        }

        (1..=48)
            .map(TimeDelta::hours)
            .find_map(|back| {
                let before_gap = naive.checked_sub_signed(back)?;
                let local = self.zone.from_local_datetime(&before_gap).earliest()?;
                local.checked_add_signed(back)
            })
            .ok_or(ReconcileError::InvalidDate {
                year: clock.year,
                month: clock.month,
                day: clock.day,
                hour: clock.hour,
                minute: clock.minute,
                second: clock.second,
            })
    }
}

/// Drops sub-millisecond digits. Never rounds up.
pub fn truncate_to_millis(time: DateTime<Utc>) -> Result<DateTime<Utc>, ReconcileError> {
    let nanos = time.nanosecond() / 1_000_000 * 1_000_000;
    time.with_nanosecond(nanos)
        .ok_or_else(|| ReconcileError::InvalidArrivalTime(time.to_rfc3339()))
}

/// Parses the gateway's RFC3339 receive time, any sub-second precision.
pub fn parse_gateway_time(text: &str) -> Result<DateTime<Utc>, ReconcileError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ReconcileError::InvalidArrivalTime(text.to_string()))
}
