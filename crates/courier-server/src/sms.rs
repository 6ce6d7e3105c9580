//! Inbox for plain SMS deliveries
//!
//! Texts sent to the service number (verification codes and the like) are
//! kept so they can be read back over HTTP. They never reach the model.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

/// Messages kept before the oldest is dropped
pub const SMS_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub sid: String,
}

/// Most recent SMS messages, oldest first
pub struct SmsInbox {
    capacity: usize,
    messages: Mutex<VecDeque<SmsMessage>>,
}

impl SmsInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, message: SmsMessage) {
        let mut messages = self.messages.lock();
        messages.push_back(message);
        while messages.len() > self.capacity {
            messages.pop_front();
        }
    }

    pub fn latest(&self) -> Vec<SmsMessage> {
        self.messages.lock().iter().cloned().collect()
    }
}

impl Default for SmsInbox {
    fn default() -> Self {
        Self::new(SMS_CAPACITY)
    }
}
