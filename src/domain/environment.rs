use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Page timing figures a host may have measured before telemetry started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTiming {
    pub page_load_ms: u64,
    pub dom_ready_ms: u64,
    pub first_byte_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Facts about the host environment, supplied by the caller at construction
/// instead of being read from ambient globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentFacts {
    /// Page the session starts on; used for `page_url` until `navigate` is called.
    pub initial_page: String,
    pub user_agent: String,
    pub language: Option<String>,
    pub platform: String,
    pub screen: Option<ScreenSize>,
    pub hostname: Option<String>,
    pub navigation_timing: Option<NavigationTiming>,
}

impl Default for EnvironmentFacts {
    fn default() -> Self {
        Self {
            initial_page: "/".to_string(),
            user_agent: format!("shopfront-telemetry/{}", env!("CARGO_PKG_VERSION")),
            language: None,
            platform: std::env::consts::OS.to_string(),
            screen: None,
            hostname: None,
            navigation_timing: None,
        }
    }
}

impl EnvironmentFacts {
    /// Facts for a process running outside a browser: hostname from the OS,
    /// language from `LANG`.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.to_str().map(str::to_string));
        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(str::to_string))
            .filter(|lang| !lang.is_empty());

        Self {
            hostname,
            language,
            ..Self::default()
        }
    }

    pub fn with_initial_page(mut self, page: impl Into<String>) -> Self {
        self.initial_page = page.into();
        self
    }

    pub fn with_navigation_timing(mut self, timing: NavigationTiming) -> Self {
        self.navigation_timing = Some(timing);
        self
    }

    /// Payload of the `session_start` event.
    pub fn session_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("user_agent".into(), json!(self.user_agent));
        fields.insert("platform".into(), json!(self.platform));
        if let Some(language) = &self.language {
            fields.insert("language".into(), json!(language));
        }
        if let Some(screen) = self.screen {
            fields.insert("screen_width".into(), json!(screen.width));
            fields.insert("screen_height".into(), json!(screen.height));
        }
        if let Some(hostname) = &self.hostname {
            fields.insert("hostname".into(), json!(hostname));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fields_skip_unknown_facts() {
        let facts = EnvironmentFacts {
            language: Some("en_IN".into()),
            screen: Some(ScreenSize { width: 1920, height: 1080 }),
            ..EnvironmentFacts::default()
        };

        let fields = facts.session_fields();
        assert_eq!(fields["language"], json!("en_IN"));
        assert_eq!(fields["screen_width"], json!(1920));
        assert!(!fields.contains_key("hostname"));
    }

    #[test]
    fn test_facts_deserialize_with_defaults() {
        let facts: EnvironmentFacts = serde_json::from_str(r#"{"initial_page": "/dashboard"}"#).unwrap();
        assert_eq!(facts.initial_page, "/dashboard");
        assert!(facts.user_agent.starts_with("shopfront-telemetry/"));
        assert!(facts.navigation_timing.is_none());
    }
}
