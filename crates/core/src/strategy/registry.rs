use std::collections::HashMap;

use super::{STRATEGY_SUFFIX, StrategyKind};
use crate::error::CoreError;

/// Maps log names to strategy kinds. Built once and shared by every codec of a process.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    by_name: HashMap<String, StrategyKind>,
}

impl StrategyRegistry {
    /// An empty registry; nothing decodes until kinds are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind that may appear in a log.
    pub fn with_defaults() -> Self {
        let by_name = StrategyKind::REGISTERED
            .iter()
            .map(|kind| (kind.name().to_string(), *kind))
            .collect();
        Self { by_name }
    }

    /// Registers `kind` under its type name stripped of the `Strategy` suffix.
    pub fn register(&mut self, kind: StrategyKind) -> Result<&str, CoreError> {
        if kind.is_internal() {
            return Err(CoreError::InvalidState(format!(
                "{} is internal and cannot be registered",
                kind.type_name()
            )));
        }
        let type_name = kind.type_name();
        let name = type_name.strip_suffix(STRATEGY_SUFFIX).unwrap_or(type_name);
        if self.by_name.contains_key(name) {
            return Err(CoreError::DuplicateStrategy(name.to_string()));
        }
        self.by_name.insert(name.to_string(), kind);
        Ok(name)
    }

    pub fn resolve(&self, name: &str) -> Result<StrategyKind, CoreError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownStrategy(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
