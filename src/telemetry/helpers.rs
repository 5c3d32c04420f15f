use super::TelemetryService;
use crate::domain::{EventType, NavigationTiming};
use crate::sender::Transport;
use serde_json::{Map, Value, json};
use std::time::Duration;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(super) fn timing_fields(timing: &NavigationTiming) -> Map<String, Value> {
    fields(json!({
        "page_load_ms": timing.page_load_ms,
        "dom_ready_ms": timing.dom_ready_ms,
        "first_byte_ms": timing.first_byte_ms,
    }))
}

/// Typed shorthands for the events the dashboard records.
impl<T: Transport> TelemetryService<T> {
    pub fn track_page_view(&self, page_name: &str) {
        self.record(EventType::PageView, fields(json!({ "page_name": page_name })));
    }

    pub fn track_shop_view(&self, shop_id: &str, shop_name: &str) {
        self.record(
            EventType::ShopView,
            fields(json!({ "shop_id": shop_id, "shop_name": shop_name })),
        );
    }

    pub fn track_form_submission(&self, form_name: &str, success: bool) {
        self.record(
            EventType::FormSubmission,
            fields(json!({ "form_name": form_name, "success": success })),
        );
    }

    /// `response_time` is reported in whole milliseconds.
    pub fn track_api_call(
        &self,
        endpoint: &str,
        method: &str,
        response_time: Duration,
        status_code: u16,
    ) {
        self.record(
            EventType::ApiCall,
            fields(json!({
                "endpoint": endpoint,
                "method": method,
                "response_time": response_time.as_millis() as u64,
                "status_code": status_code,
            })),
        );
    }

    pub fn track_error(&self, message: &str, source: Option<&str>) {
        let mut payload = fields(json!({ "message": message }));
        if let Some(source) = source {
            payload.insert("source".into(), json!(source));
        }
        self.record(EventType::Error, payload);
    }

    pub fn track_performance(&self, timing: &NavigationTiming) {
        self.record(EventType::Performance, timing_fields(timing));
    }
}
