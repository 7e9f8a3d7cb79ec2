//! Outbound transports.
//!
//! - `alert`: length-prefixed TCP push of alert snapshots to the local
//!   alerting endpoint.
//! - `multipart`: part framing for the multipart/x-mixed-replace image stream.

pub mod alert;
pub mod multipart;

pub use alert::{
    encode_payload, read_payload, AlertDispatcher, ALERT_HEADER_LEN, DEFAULT_ALERT_ADDR,
};
pub use multipart::{frame_part, write_part, BOUNDARY, CONTENT_TYPE};
