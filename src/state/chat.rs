use std::{collections::VecDeque, time::SystemTime};

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Username of the sender.
    pub author: String,
    /// Trimmed message body.
    pub text: String,
    /// When the server accepted the message.
    pub timestamp: SystemTime,
}

/// Shared chat log bounded to the most recent `capacity` entries.
#[derive(Debug, Clone)]
pub struct ChatChannel {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
    max_chars: usize,
}

impl ChatChannel {
    /// Build an empty channel.
    pub fn new(capacity: usize, max_chars: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_chars,
        }
    }

    /// Append a message, evicting the oldest entry past capacity.
    ///
    /// Over-long text (measured before trimming) or text that is empty once trimmed
    /// is dropped without error and `None` is returned.
    pub fn post(&mut self, author: &str, text: &str, timestamp: SystemTime) -> Option<ChatEntry> {
        if text.chars().count() > self.max_chars {
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let entry = ChatEntry {
            author: author.to_owned(),
            text: text.to_owned(),
            timestamp,
        };
        self.push(entry.clone());
        Some(entry)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Retained entries, oldest first.
    pub fn history(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seed the log from durable history, keeping only the newest entries.
    pub fn restore(&mut self, entries: impl IntoIterator<Item = ChatEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    fn push(&mut self, entry: ChatEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}
