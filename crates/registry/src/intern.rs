//! Shared string intern table and unique id source.
//!
//! Pipeline workers tag their output with interned strings and draw unique
//! integers while the pipeline is running, so both tables sit behind one
//! mutex and are handed out as a shared `Arc<SharedTables>` rather than
//! through the registry itself.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::error::{RegistryError, RegistryResult};

/// Content returned for [`StringId::INVALID`].
pub const UNDEFINED_STRING: &str = "undef";

/// Stable index of an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringId(u32);

impl StringId {
    /// Marker for "no string"; resolves to [`UNDEFINED_STRING`].
    pub const INVALID: StringId = StringId(u32::MAX);

    pub fn new(index: u32) -> Self {
        StringId(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for StringId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str(UNDEFINED_STRING)
        }
    }
}

#[derive(Debug)]
struct TablesInner {
    strings: Vec<Arc<str>>,
    next_id: u64,
}

/// Bounded string table plus a monotonic id counter, guarded by one lock.
#[derive(Debug)]
pub struct SharedTables {
    capacity: usize,
    inner: Mutex<TablesInner>,
}

impl SharedTables {
    /// Creates empty tables holding at most `capacity` strings.
    pub fn new(capacity: usize) -> Self {
        // One slot of the index space is reserved for `StringId::INVALID`.
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            capacity,
            inner: Mutex::new(TablesInner {
                strings: Vec::with_capacity(capacity.min(1024)),
                next_id: 1,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.lock().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interns `content`, returning the index of an existing equal string if
    /// there is one. A full table is left unchanged.
    pub fn add_string(&self, content: &str) -> RegistryResult<StringId> {
        let mut inner = self.inner.lock();
        trace!("add string '{}'", content);

        if let Some(index) = inner.strings.iter().position(|s| &**s == content) {
            return Ok(StringId(index as u32));
        }

        if inner.strings.len() >= self.capacity {
            warn!("#string exceeds available space '{}'", self.capacity);
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = inner.strings.len() as u32;
        inner.strings.push(Arc::from(content));
        Ok(StringId(index))
    }

    /// Looks up the index of an already interned string.
    pub fn string_id(&self, content: &str) -> Option<StringId> {
        let inner = self.inner.lock();
        match inner.strings.iter().position(|s| &**s == content) {
            Some(index) => Some(StringId(index as u32)),
            None => {
                warn!("string '{}' does not exist", content);
                None
            }
        }
    }

    /// Resolves an index back to its content.
    pub fn get_string(&self, id: StringId) -> Option<Arc<str>> {
        if !id.is_valid() {
            return Some(Arc::from(UNDEFINED_STRING));
        }

        let inner = self.inner.lock();
        match inner.strings.get(id.0 as usize) {
            Some(content) => Some(content.clone()),
            None => {
                warn!(
                    "id '{}' exceeds available #strings '{}'",
                    id.0,
                    inner.strings.len()
                );
                None
            }
        }
    }

    /// Next value of the process-unique counter; starts at 1.
    pub fn unique_id(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// All interned strings in index order.
    pub fn strings(&self) -> Vec<(StringId, Arc<str>)> {
        self.inner
            .lock()
            .strings
            .iter()
            .enumerate()
            .map(|(index, content)| (StringId(index as u32), content.clone()))
            .collect()
    }

    /// Empties the string table. The id counter keeps running.
    pub fn drain_strings(&self) -> usize {
        let mut inner = self.inner.lock();
        let drained = inner.strings.len();
        inner.strings.clear();
        drained
    }
}
