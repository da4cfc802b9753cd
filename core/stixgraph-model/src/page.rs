use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// One page of a listing, with enough context to build a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Position of the first item in the full result set.
    pub offset: usize,
    /// Size of the full result set.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            offset: 0,
            total: 0,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.offset + self.items.len() < self.total
    }

    pub fn has_previous_page(&self) -> bool {
        self.offset > 0
    }

    /// Items paired with the cursor that resumes right after them.
    pub fn with_cursors(&self) -> impl Iterator<Item = (Cursor, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (Cursor::at(self.offset + i + 1), item))
    }
}

/// Opaque pagination cursor: the offset to resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor(usize);

impl Cursor {
    pub fn at(offset: usize) -> Self {
        Self(offset)
    }

    pub fn offset(self) -> usize {
        self.0
    }

    pub fn encode(self) -> String {
        STANDARD.encode(format!("offset:{}", self.0))
    }

    /// Decodes a cursor produced by [`Cursor::encode`]. Returns `None` for
    /// anything else.
    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = STANDARD.decode(raw.trim()).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        text.strip_prefix("offset:")?.parse().ok().map(Self)
    }
}
