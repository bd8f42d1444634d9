use std::collections::BTreeMap;

use netpulse_proto::{Target, TargetEntry, TargetSpec, BUILTIN_TARGETS};
use serde::{Serialize, Serializer};

use crate::error::HandlerError;

/// Monitored targets keyed by IP (or `gateway`). Built-ins are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        let targets = BUILTIN_TARGETS
            .iter()
            .map(|(key, name)| (key.to_string(), Target::builtin(key, name)))
            .collect();
        Self { targets }
    }
}

impl TargetRegistry {
    pub fn get(&self, key: &str) -> Option<&Target> {
        self.targets.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.targets.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn custom_count(&self) -> usize {
        self.targets.values().filter(|t| t.is_custom()).count()
    }

    /// Insert or overwrite a custom target.
    pub fn upsert_custom(&mut self, spec: &TargetSpec) -> Result<(), HandlerError> {
        let key = custom_key(&spec.ip)?;
        self.targets
            .insert(key.clone(), Target::custom(key, spec.name.clone(), spec.enabled));
        Ok(())
    }

    /// Move the target at `old_key` to `spec.ip` in one step. A missing
    /// `old_key` degrades to an upsert of the new key.
    pub fn rename_custom(&mut self, old_key: &str, spec: &TargetSpec) -> Result<(), HandlerError> {
        let old_key = custom_key(old_key)?;
        let key = custom_key(&spec.ip)?;
        if old_key != key {
            self.targets.remove(&old_key);
        }
        self.targets
            .insert(key.clone(), Target::custom(key, spec.name.clone(), spec.enabled));
        Ok(())
    }

    /// Returns `Ok(false)` if nothing was stored under `key`.
    pub fn remove_custom(&mut self, key: &str) -> Result<bool, HandlerError> {
        let key = custom_key(key)?;
        Ok(self.targets.remove(&key).is_some())
    }

    /// Replace every custom target; built-ins keep their current state.
    pub fn replace_custom(&mut self, custom: &BTreeMap<String, TargetEntry>) {
        self.targets.retain(|_, target| !target.is_custom());
        for (ip, entry) in custom {
            let key = ip.trim();
            if key.is_empty() || netpulse_proto::is_builtin(key) {
                continue;
            }
            self.targets.insert(
                key.to_string(),
                Target::custom(key, entry.name.clone(), entry.enabled),
            );
        }
    }

    /// Works for built-in and custom targets. Returns `false` for unknown keys.
    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> bool {
        match self.targets.get_mut(key.trim()) {
            Some(target) => {
                target.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

/// Serialized as a sequence of targets ordered by key.
impl Serialize for TargetRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.targets.values())
    }
}

fn custom_key(raw: &str) -> Result<String, HandlerError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(HandlerError::InvalidPayload("empty target key".into()));
    }
    if netpulse_proto::is_builtin(key) {
        return Err(HandlerError::BuiltinTarget(key.to_string()));
    }
    Ok(key.to_string())
}
