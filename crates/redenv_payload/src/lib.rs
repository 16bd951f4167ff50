//! Decoding of the redenv sensor node uplink payload.
//!
//! Everything in this crate is pure: byte buffers and timestamps in,
//! structured values out. No I/O and no shared state, so every function
//! here is safe to call from any number of tasks at once.

pub mod encoding;
mod error;
pub mod hardware;
pub mod reconcile;
pub mod status;
pub mod wire_format;

pub use encoding::{decode_base64, decode_hex, decode_text};
pub use error::{DecodeError, ReconcileError, Result};
pub use hardware::{hardware_set, Peripheral};
pub use reconcile::{parse_gateway_time, DeviceClock, Reconciled, TimestampReconciler};
pub use status::{ccs811_status, Ccs811Status};
pub use wire_format::{
    ccs811_value, decode, pascals_to_kpa, GpsFix, Header, RawFields, Trailer, WireFormatVersion,
    NOT_RECORDED,
};
