//! The Things Network v2 MQTT data API.

mod subscriber;
mod topic;
mod uplink;

pub use subscriber::{TtnSubscriber, TtnSubscriberConfig};
pub use topic::{parse_topic, uplink_subscription, ParsedTopic, TopicError};
pub use uplink::{TtnMetadata, TtnUplink};
