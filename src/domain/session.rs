use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Identifiers shared by every event recorded during one service lifetime.
///
/// Created lazily on first use and never persisted. The id is the creation
/// time plus a random suffix and carries no uniqueness guarantee.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    session_id: String,
    start_time: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: generate_session_id(start_time),
            start_time,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.start_time)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();

    format!("{}-{suffix}", now.timestamp_millis())
}
