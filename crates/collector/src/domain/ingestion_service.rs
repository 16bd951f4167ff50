use common::domain::{IngestResult, RawUplink, Reading, ReadingRepository};
use redenv_payload::{decode, parse_gateway_time, TimestampReconciler, WireFormatVersion};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns one raw uplink into one stored [`Reading`].
///
/// Flow:
/// 1. Decode the payload text and pick the wire format by length
/// 2. Reconcile gateway arrival time with the node clock
/// 3. Build the reading under a fresh id, keeping the uplink envelope under
///    another
/// 4. Insert both
///
/// Any failure is returned to the caller untouched. Nothing is retried and
/// redelivered uplinks are not deduplicated.
pub struct IngestionService {
    repository: Arc<dyn ReadingRepository>,
    reconciler: TimestampReconciler,
}

impl IngestionService {
    pub fn new(repository: Arc<dyn ReadingRepository>, reconciler: TimestampReconciler) -> Self {
        Self {
            repository,
            reconciler,
        }
    }

    pub async fn on_uplink(&self, raw: RawUplink) -> IngestResult<()> {
        debug!(
            device_id = %raw.device_id,
            counter = raw.counter,
            port = raw.port,
            "processing uplink"
        );

        let payload = raw.payload_bytes()?;
        let (version, fields) = decode(&payload, payload.len())?;

        let gateway_time = parse_gateway_time(&raw.received_at)?;
        let times = self
            .reconciler
            .reconcile(gateway_time, fields.header.device_clock())?;

        let uplink = raw.into_record(xid::new().to_string());
        let reading = Reading::new(xid::new().to_string(), uplink, payload, &fields, times);

        debug!(
            reading_id = %reading.id,
            uplink_id = %reading.uplink.id,
            wire_format = %version,
            outdated_firmware = version != WireFormatVersion::latest(),
            recorded_at = %reading.recorded_at,
            "decoded reading"
        );

        self.repository.insert(&reading).await?;

        info!(
            reading_id = %reading.id,
            device_id = %reading.device_id,
            "stored reading"
        );

        Ok(())
    }
}
