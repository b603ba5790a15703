use chrono::Utc;
use uuid::Uuid;

/// Identifier of the chat between two peers. Both sides compute the same value
/// without coordinating: the identifiers are sorted before joining.
pub fn derive_chat_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Produces `msg_<millis>_<counter>_<random>` identifiers.
///
/// The counter never repeats within a process, so two ids generated in the
/// same millisecond still differ. The random part separates processes.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    counter: u64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: i64) -> String {
        self.counter += 1;
        let random = Uuid::new_v4().simple().to_string();
        format!("msg_{now}_{}_{}", self.counter, &random[..8])
    }
}
