use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::ids::OpId;
use crate::operation::DraftOperation;
use crate::resource::ResourceKey;

/// Origin identifier stamped on every queue write. Subscribers never see
/// notifications for their own writes, which keeps multiple views sharing
/// one queue from reloading in response to themselves.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceTag({})", self.0)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type ChangeHandler = Box<dyn FnMut(&SourceTag)>;

/// Ordered store of draft operations keyed by canonical resource identity.
///
/// The per-key uniqueness invariant is structural: operations live in a map
/// keyed by `ResourceKey`, and the insertion-ordered key list is a derived
/// secondary index. Queue mutation itself cannot fail; only the later apply
/// step can, and a failed apply leaves the operation queued untouched.
#[derive(Default)]
pub struct DraftQueue {
    by_key: HashMap<ResourceKey, DraftOperation>,
    order: Vec<ResourceKey>,
    handlers: Vec<(SourceTag, ChangeHandler)>,
}

impl fmt::Debug for DraftQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftQueue")
            .field("len", &self.order.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl DraftQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Enqueue an operation. An existing operation with the same resource
    /// key is replaced and the new one goes to the tail: last local intent
    /// wins, and replay order stays deterministic.
    pub fn add(&mut self, op: DraftOperation, source: &SourceTag) {
        let key = op.resource_key;
        if self.by_key.remove(&key).is_some() {
            debug!("queue: replacing pending op for {key}");
            self.order.retain(|k| k != &key);
        }
        self.order.push(key);
        self.by_key.insert(key, op);
        self.notify(source);
    }

    /// Remove by operation id. Notifies iff something was removed.
    pub fn remove(&mut self, id: OpId, source: &SourceTag) -> bool {
        let key = self
            .by_key
            .iter()
            .find(|(_, op)| op.id == id)
            .map(|(key, _)| *key);
        if let Some(key) = key
            && self.remove_key_silent(&key)
        {
            self.notify(source);
            return true;
        }
        false
    }

    /// Remove by canonical key. Notifies iff something was removed.
    pub fn remove_by_key(&mut self, key: &ResourceKey, source: &SourceTag) -> bool {
        if self.remove_key_silent(key) {
            self.notify(source);
            true
        } else {
            false
        }
    }

    /// Remove every operation whose encoded temp id starts with `prefix`.
    /// Returns the number removed; notifies iff at least one was.
    pub fn remove_by_temp_prefix(&mut self, prefix: &str, source: &SourceTag) -> usize {
        let keys: Vec<ResourceKey> = self
            .by_key
            .values()
            .filter(|op| {
                op.temp_id
                    .as_ref()
                    .is_some_and(|t| t.to_string().starts_with(prefix))
            })
            .map(|op| op.resource_key)
            .collect();
        let removed = keys
            .iter()
            .filter(|key| self.remove_key_silent(key))
            .count();
        if removed > 0 {
            self.notify(source);
        }
        removed
    }

    /// Remove a batch by id with a single notification (undo of a paste).
    pub fn remove_many(&mut self, ids: &[OpId], source: &SourceTag) -> usize {
        let keys: Vec<ResourceKey> = self
            .by_key
            .values()
            .filter(|op| ids.contains(&op.id))
            .map(|op| op.resource_key)
            .collect();
        let removed = keys
            .iter()
            .filter(|key| self.remove_key_silent(key))
            .count();
        if removed > 0 {
            self.notify(source);
        }
        removed
    }

    fn remove_key_silent(&mut self, key: &ResourceKey) -> bool {
        if self.by_key.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<DraftOperation> {
        self.by_key.get(key).cloned()
    }

    /// Defensive copy, insertion order preserved.
    pub fn get_all(&self) -> Vec<DraftOperation> {
        self.order
            .iter()
            .map(|key| self.by_key[key].clone())
            .collect()
    }

    /// Operations whose encoded resource key starts with `prefix`,
    /// insertion order preserved.
    pub fn get_by_key_prefix(&self, prefix: &str) -> Vec<DraftOperation> {
        self.order
            .iter()
            .filter(|key| key.to_string().starts_with(prefix))
            .map(|key| self.by_key[key].clone())
            .collect()
    }

    /// Register a change handler. `own_tag` identifies the subscriber;
    /// notifications for writes carrying the same tag are suppressed.
    pub fn on_change(&mut self, own_tag: SourceTag, handler: ChangeHandler) {
        self.handlers.push((own_tag, handler));
    }

    fn notify(&mut self, source: &SourceTag) {
        for (tag, handler) in &mut self.handlers {
            if tag != source {
                handler(source);
            }
        }
    }
}
