use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("invalid topic '{0}': expected '{{app_id}}/devices/{{dev_id}}/up'")]
    Format(String),

    #[error("empty {0} in topic")]
    EmptySegment(&'static str),
}

/// Application and device named by an uplink topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub app_id: String,
    pub dev_id: String,
}

/// Wildcard subscription for every device's uplinks in one application.
pub fn uplink_subscription(app_id: &str) -> String {
    format!("{}/devices/+/up", app_id)
}

/// Parses `{app_id}/devices/{dev_id}/up`.
pub fn parse_topic(topic: &str) -> Result<ParsedTopic, TopicError> {
    let parts: Vec<&str> = topic.split('/').collect();

    let [app_id, "devices", dev_id, "up"] = parts.as_slice() else {
        return Err(TopicError::Format(topic.to_string()));
    };

    let app_id = app_id.trim();
    let dev_id = dev_id.trim();

    if app_id.is_empty() {
        return Err(TopicError::EmptySegment("app_id"));
    }

    if dev_id.is_empty() {
        return Err(TopicError::EmptySegment("dev_id"));
    }

    Ok(ParsedTopic {
        app_id: app_id.to_string(),
        dev_id: dev_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_topic() {
        let parsed = parse_topic("redenv/devices/backyard/up").unwrap();
        assert_eq!(parsed.app_id, "redenv");
        assert_eq!(parsed.dev_id, "backyard");
    }

    #[test]
    fn test_subscription_matches_parser() {
        assert_eq!(uplink_subscription("redenv"), "redenv/devices/+/up");
    }

    #[test]
    fn test_parse_topic_other_events() {
        assert!(matches!(
            parse_topic("redenv/devices/backyard/events/activations"),
            Err(TopicError::Format(_))
        ));
        assert!(matches!(
            parse_topic("redenv/devices/backyard/down"),
            Err(TopicError::Format(_))
        ));
    }

    #[test]
    fn test_parse_topic_empty_segments() {
        assert_eq!(
            parse_topic("/devices/backyard/up"),
            Err(TopicError::EmptySegment("app_id"))
        );
        assert_eq!(
            parse_topic("redenv/devices//up"),
            Err(TopicError::EmptySegment("dev_id"))
        );
    }

    #[test]
    fn test_parse_topic_empty_string() {
        assert!(parse_topic("").is_err());
    }
}
