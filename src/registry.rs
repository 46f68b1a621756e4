//! Accumulation of unsolicited server data
//!
//! Untagged responses can arrive at any time, not only while the command
//! that solicited them is in progress. The registry accumulates them keyed
//! by response name (`EXISTS`, `FETCH`, ...) until the embedder retrieves
//! them.
//!
//! The registry grows without bound between retrievals. A client that
//! leaves a mailbox selected for a long time should drain it periodically
//! (or install a response handler and keep it empty).

use std::collections::HashMap;

use crate::response::ResponseData;

/// Per-name accumulation of untagged response payloads.
///
/// Insertion order is preserved within each name.
#[derive(Debug, Default)]
pub struct ResponseRegistry {
    entries: HashMap<String, Vec<ResponseData>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `data` under `name`. Names are case-insensitive and stored
    /// uppercased.
    pub(crate) fn record(&mut self, name: &str, data: ResponseData) {
        self.entries
            .entry(name.to_ascii_uppercase())
            .or_default()
            .push(data);
    }

    /// All payloads recorded under `name` so far, oldest first.
    pub fn get(&self, name: &str) -> &[ResponseData] {
        self.entries
            .get(&name.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Remove and return the payloads recorded under `name`.
    ///
    /// Clearing an absent name returns an empty vector; clearing twice is
    /// equivalent to clearing once.
    pub fn clear(&mut self, name: &str) -> Vec<ResponseData> {
        self.entries
            .remove(&name.to_ascii_uppercase())
            .unwrap_or_default()
    }

    /// Remove and return everything, keyed by name.
    pub fn clear_all(&mut self) -> HashMap<String, Vec<ResponseData>> {
        std::mem::take(&mut self.entries)
    }

    /// Remove and return the payloads under `name` for which `predicate`
    /// holds, keeping the rest in place.
    pub fn extract<F>(&mut self, name: &str, mut predicate: F) -> Vec<ResponseData>
    where
        F: FnMut(&ResponseData) -> bool,
    {
        let Some(entries) = self.entries.get_mut(&name.to_ascii_uppercase()) else {
            return Vec::new();
        };

        let mut extracted = Vec::new();
        entries.retain(|entry| {
            if predicate(entry) {
                extracted.push(entry.clone());
                false
            } else {
                true
            }
        });

        extracted
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Data, ResponseData};

    fn exists(count: u32) -> ResponseData {
        ResponseData::Data(Data::Exists(count))
    }

    #[test]
    fn test_record_and_get_preserves_order() {
        let mut registry = ResponseRegistry::new();

        registry.record("EXISTS", exists(3));
        registry.record("EXISTS", exists(7));

        assert_eq!(registry.get("EXISTS"), &[exists(3), exists(7)]);
        // Case-insensitive lookup.
        assert_eq!(registry.get("exists"), &[exists(3), exists(7)]);
        assert_eq!(registry.get("RECENT"), &[]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut registry = ResponseRegistry::new();

        registry.record("EXISTS", exists(3));

        assert_eq!(registry.clear("EXISTS"), vec![exists(3)]);
        assert_eq!(registry.clear("EXISTS"), vec![]);
        assert_eq!(registry.get("EXISTS"), &[]);
    }

    #[test]
    fn test_clear_all() {
        let mut registry = ResponseRegistry::new();

        registry.record("EXISTS", exists(3));
        registry.record("RECENT", ResponseData::Data(Data::Recent(1)));

        let drained = registry.clear_all();

        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_extract() {
        let mut registry = ResponseRegistry::new();

        registry.record("EXISTS", exists(3));
        registry.record("EXISTS", exists(7));
        registry.record("EXISTS", exists(9));

        let extracted = registry.extract("EXISTS", |entry| {
            matches!(entry, ResponseData::Data(Data::Exists(n)) if *n > 5)
        });

        assert_eq!(extracted, vec![exists(7), exists(9)]);
        assert_eq!(registry.get("EXISTS"), &[exists(3)]);
    }
}
