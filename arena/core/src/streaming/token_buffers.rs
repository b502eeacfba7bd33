//! Token Multiplexer Implementation

use std::collections::HashMap;
use std::time::Instant;

// ============================================================================
// Per-model buffer
// ============================================================================

/// Statistics for one model's buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Fragments appended so far
    pub fragments: u32,
    /// When the first fragment arrived
    pub first_fragment_at: Option<Instant>,
    /// When the latest fragment arrived
    pub last_fragment_at: Option<Instant>,
}

/// Accumulated text for a single model
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelBuffer {
    content: String,
    stats: BufferStats,
}

impl ModelBuffer {
    /// Text received so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Buffer statistics
    #[must_use]
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    fn push(&mut self, fragment: &str) {
        let now = Instant::now();
        if self.stats.first_fragment_at.is_none() {
            self.stats.first_fragment_at = Some(now);
        }
        self.stats.last_fragment_at = Some(now);
        self.stats.fragments = self.stats.fragments.saturating_add(1);
        self.content.push_str(fragment);
    }
}

// ============================================================================
// Multiplexer
// ============================================================================

/// Per-model accumulation of streamed text
///
/// Append is the only content mutation. Reads of a model that never received
/// a fragment return the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenMultiplexer {
    buffers: HashMap<String, ModelBuffer>,
}

impl TokenMultiplexer {
    /// Create an empty multiplexer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to a model's buffer, creating it if absent
    pub fn append(&mut self, model_id: &str, fragment: &str) {
        match self.buffers.get_mut(model_id) {
            Some(buffer) => buffer.push(fragment),
            None => {
                let mut buffer = ModelBuffer::default();
                buffer.push(fragment);
                self.buffers.insert(model_id.to_string(), buffer);
            }
        }
    }

    /// Text accumulated for a model, empty if unseen
    #[must_use]
    pub fn get(&self, model_id: &str) -> &str {
        self.buffers.get(model_id).map_or("", ModelBuffer::content)
    }

    /// Full buffer for a model, including statistics
    #[must_use]
    pub fn buffer(&self, model_id: &str) -> Option<&ModelBuffer> {
        self.buffers.get(model_id)
    }

    /// Whether a model has received at least one fragment
    #[must_use]
    pub fn contains(&self, model_id: &str) -> bool {
        self.buffers.contains_key(model_id)
    }

    /// Number of models with a buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when no model has a buffer
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Iterate over `(model_id, text)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.buffers
            .iter()
            .map(|(model, buffer)| (model.as_str(), buffer.content()))
    }

    /// Owned copy of every buffer's text
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.buffers
            .iter()
            .map(|(model, buffer)| (model.clone(), buffer.content.clone()))
            .collect()
    }

    /// Drop every buffer
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
