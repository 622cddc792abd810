//! Key-value store with nestable checkpoints
//!
//! Writes land in the topmost layer. `commit` folds a layer into the one
//! below it and `rollback` throws it away, together with any events
//! emitted since the checkpoint was taken.

use std::collections::BTreeMap;

use asgard_core::{Error, Event, Result};

#[derive(Debug, Default)]
struct Layer {
    writes: BTreeMap<String, Option<Vec<u8>>>,
    events_len: usize,
}

#[derive(Debug, Default)]
pub struct KvStore {
    base: BTreeMap<String, Vec<u8>>,
    layers: Vec<Layer>,
    events: Vec<Event>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.writes.get(key) {
                return value.clone();
            }
        }
        self.base.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        match self.layers.last_mut() {
            Some(layer) => {
                layer.writes.insert(key, Some(value));
            }
            None => {
                self.base.insert(key, value);
            }
        }
    }

    pub fn delete(&mut self, key: &str) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.writes.insert(key.to_string(), None);
            }
            None => {
                self.base.remove(key);
            }
        }
    }

    /// All live entries under `prefix`, in lexicographic key order
    pub fn prefix_iter(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let mut merged: BTreeMap<String, Vec<u8>> = self
            .base
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for layer in &self.layers {
            for (k, v) in layer
                .writes
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
            {
                match v {
                    Some(v) => {
                        merged.insert(k.clone(), v.clone());
                    }
                    None => {
                        merged.remove(k);
                    }
                }
            }
        }
        merged.into_iter().collect()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take all events, e.g. at the end of a block
    pub fn drain_events(&mut self) -> Vec<Event> {
        if !self.layers.is_empty() {
            tracing::warn!(depth = self.layers.len(), "draining events with open checkpoints");
        }
        for layer in &mut self.layers {
            layer.events_len = 0;
        }
        std::mem::take(&mut self.events)
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn checkpoint(&mut self) {
        self.layers.push(Layer {
            writes: BTreeMap::new(),
            events_len: self.events.len(),
        });
    }

    pub fn commit(&mut self) -> Result<()> {
        let layer = self
            .layers
            .pop()
            .ok_or_else(|| Error::Store("commit without checkpoint".into()))?;
        for (key, value) in layer.writes {
            match (self.layers.last_mut(), value) {
                (Some(parent), value) => {
                    parent.writes.insert(key, value);
                }
                (None, Some(value)) => {
                    self.base.insert(key, value);
                }
                (None, None) => {
                    self.base.remove(&key);
                }
            }
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let layer = self
            .layers
            .pop()
            .ok_or_else(|| Error::Store("rollback without checkpoint".into()))?;
        self.events.truncate(layer.events_len);
        Ok(())
    }

    /// Discard every checkpoint above `depth`
    pub fn rollback_to(&mut self, depth: usize) -> Result<()> {
        while self.layers.len() > depth {
            self.rollback()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::{Asset, SupplyType};
    use proptest::prelude::*;

    fn event() -> Event {
        Event::mint_burn(SupplyType::Mint, Asset::rune(), 1, "test")
    }

    #[test]
    fn test_commit_merges_into_parent() {
        let mut kv = KvStore::new();
        kv.set("a", b"1".to_vec());
        kv.checkpoint();
        kv.set("a", b"2".to_vec());
        kv.set("b", b"3".to_vec());
        assert_eq!(kv.get("a"), Some(b"2".to_vec()));
        kv.commit().unwrap();
        assert_eq!(kv.depth(), 0);
        assert_eq!(kv.get("a"), Some(b"2".to_vec()));
        assert_eq!(kv.get("b"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_rollback_discards_writes_and_events() {
        let mut kv = KvStore::new();
        kv.set("a", b"1".to_vec());
        kv.emit(event());
        kv.checkpoint();
        kv.delete("a");
        kv.emit(event());
        assert!(!kv.has("a"));
        kv.rollback().unwrap();
        assert_eq!(kv.get("a"), Some(b"1".to_vec()));
        assert_eq!(kv.events().len(), 1);
    }

    #[test]
    fn test_nested_checkpoints() {
        let mut kv = KvStore::new();
        kv.checkpoint();
        kv.set("x", b"outer".to_vec());
        kv.checkpoint();
        kv.set("x", b"inner".to_vec());
        kv.rollback().unwrap();
        assert_eq!(kv.get("x"), Some(b"outer".to_vec()));
        kv.checkpoint();
        kv.delete("x");
        kv.commit().unwrap();
        kv.commit().unwrap();
        assert!(!kv.has("x"));
    }

    #[test]
    fn test_prefix_iter_sees_layers() {
        let mut kv = KvStore::new();
        kv.set("pool/b", b"b".to_vec());
        kv.set("pool/a", b"a".to_vec());
        kv.set("poolx", b"no".to_vec());
        kv.checkpoint();
        kv.set("pool/c", b"c".to_vec());
        kv.delete("pool/a");
        let keys: Vec<String> = kv.prefix_iter("pool/").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["pool/b".to_string(), "pool/c".to_string()]);
    }

    #[test]
    fn test_commit_without_checkpoint_fails() {
        let mut kv = KvStore::new();
        assert!(kv.commit().is_err());
        assert!(kv.rollback().is_err());
    }

    proptest! {
        #[test]
        fn prop_rollback_restores_snapshot(
            base in proptest::collection::vec(("[a-d]{1,2}", any::<u8>()), 0..10),
            writes in proptest::collection::vec(("[a-d]{1,2}", proptest::option::of(any::<u8>())), 0..20),
        ) {
            let mut kv = KvStore::new();
            for (k, v) in &base {
                kv.set(k.clone(), vec![*v]);
            }
            let before = kv.prefix_iter("");
            kv.checkpoint();
            for (k, v) in &writes {
                match v {
                    Some(v) => kv.set(k.clone(), vec![*v]),
                    None => kv.delete(k),
                }
            }
            kv.rollback().unwrap();
            prop_assert_eq!(kv.prefix_iter(""), before);
        }
    }
}
