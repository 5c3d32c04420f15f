use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Keys stamped by the service on every event. Payload keys with these
/// names are discarded.
pub const STAMPED_FIELDS: [&str; 4] = ["event_type", "timestamp", "session_id", "page_url"];

/// Tag identifying what kind of interaction an event records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PageView,
    ShopView,
    FormSubmission,
    ApiCall,
    Error,
    Performance,
    SessionStart,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::PageView => "page_view",
            EventType::ShopView => "shop_view",
            EventType::FormSubmission => "form_submission",
            EventType::ApiCall => "api_call",
            EventType::Error => "error",
            EventType::Performance => "performance",
            EventType::SessionStart => "session_start",
            EventType::Custom(tag) => tag,
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "page_view" => EventType::PageView,
            "shop_view" => EventType::ShopView,
            "form_submission" => EventType::FormSubmission,
            "api_call" => EventType::ApiCall,
            "error" => EventType::Error,
            "performance" => EventType::Performance,
            "session_start" => EventType::SessionStart,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        match EventType::from(tag.as_str()) {
            EventType::Custom(_) => EventType::Custom(tag),
            known => known,
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analytics record as it travels to the collector.
///
/// The four stamped fields are set by the service; everything else the
/// caller supplied lives in `fields` and is flattened into the same JSON
/// object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
    pub page_url: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        session_id: impl Into<String>,
        page_url: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self::with_timestamp(
            event_type,
            chrono::Utc::now().timestamp_millis(),
            session_id,
            page_url,
            fields,
        )
    }

    pub fn with_timestamp(
        event_type: EventType,
        timestamp: i64,
        session_id: impl Into<String>,
        page_url: impl Into<String>,
        mut fields: Map<String, Value>,
    ) -> Self {
        for key in STAMPED_FIELDS {
            if fields.remove(key).is_some() {
                debug!(event_type = %event_type, key, "Discarding payload key that shadows a stamped field");
            }
        }

        Self {
            event_type,
            timestamp,
            session_id: session_id.into(),
            page_url: page_url.into(),
            fields,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Turns a caller payload into the event's extra fields.
///
/// The payload must serialize to a JSON object. Anything else, or a value
/// whose `Serialize` impl fails, is rejected with a human-readable reason.
pub fn payload_to_fields<P>(payload: &P) -> Result<Map<String, Value>, String>
where
    P: Serialize + ?Sized,
{
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!(
            "payload must be a key/value mapping, got {}",
            json_kind(&other)
        )),
        Err(e) => Err(format!("payload is not serializable: {e}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_event_type_round_trips_known_and_custom_tags() {
        assert_eq!(EventType::from("api_call"), EventType::ApiCall);
        assert_eq!(
            EventType::from("listing_export".to_string()),
            EventType::Custom("listing_export".to_string())
        );
        assert_eq!(String::from(EventType::ShopView), "shop_view");
        assert_eq!(EventType::Custom("x".into()).to_string(), "x");
    }

    #[test]
    fn test_event_serializes_flat() {
        let fields = payload_to_fields(&json!({"shop_id": "S-12", "shop_name": "Corner Unit"})).unwrap();
        let event = Event::with_timestamp(EventType::ShopView, 1_700_000_000_000, "sess-1", "/shops/S-12", fields);

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(
            wire,
            json!({
                "event_type": "shop_view",
                "timestamp": 1_700_000_000_000_i64,
                "session_id": "sess-1",
                "page_url": "/shops/S-12",
                "shop_id": "S-12",
                "shop_name": "Corner Unit",
            })
        );
    }

    #[test]
    fn test_stamped_fields_win_over_payload() {
        let fields = payload_to_fields(&json!({
            "session_id": "forged",
            "timestamp": 1,
            "page_name": "dashboard",
        }))
        .unwrap();
        let event = Event::with_timestamp(EventType::PageView, 42, "real", "/", fields);

        assert_eq!(event.session_id, "real");
        assert_eq!(event.timestamp, 42);
        assert!(event.field("session_id").is_none());
        assert_eq!(event.field("page_name"), Some(&json!("dashboard")));
    }

    #[test]
    fn test_event_deserializes_extra_fields_into_map() {
        let event: Event = serde_json::from_value(json!({
            "event_type": "api_call",
            "timestamp": 5,
            "session_id": "s",
            "page_url": "/shops",
            "status_code": 200,
        }))
        .unwrap();

        assert_eq!(event.event_type, EventType::ApiCall);
        assert_eq!(event.fields().len(), 1);
        assert_eq!(event.field("status_code"), Some(&json!(200)));
    }

    #[test]
    fn test_payload_rejects_non_objects() {
        assert!(payload_to_fields(&json!([1, 2, 3])).is_err());
        assert!(payload_to_fields("just a string").is_err());
        assert!(payload_to_fields(&()).unwrap().is_empty());
    }

    #[test]
    fn test_payload_rejects_unserializable_keys() {
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);

        let err = payload_to_fields(&bad).unwrap_err();
        assert!(err.contains("not serializable"), "{err}");
    }
}
