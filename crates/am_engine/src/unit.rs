//! Phonetic units.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the mandatory context-independent silence unit.
pub const SILENCE_NAME: &str = "SIL";

/// Single-phone left/right context of a triphone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeftRightContext {
    pub left: String,
    pub right: String,
}

/// A phone, either context-independent (monophone) or context-dependent
/// (triphone).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    name: String,
    filler: bool,
    context: Option<LeftRightContext>,
}

impl Unit {
    pub fn context_independent(name: impl Into<String>, filler: bool) -> Self {
        Unit {
            name: name.into(),
            filler,
            context: None,
        }
    }

    pub fn context_dependent(
        name: impl Into<String>,
        filler: bool,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Unit {
            name: name.into(),
            filler,
            context: Some(LeftRightContext {
                left: left.into(),
                right: right.into(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_filler(&self) -> bool {
        self.filler
    }

    pub fn context(&self) -> Option<&LeftRightContext> {
        self.context.as_ref()
    }

    pub fn is_context_dependent(&self) -> bool {
        self.context.is_some()
    }

    /// Stable key used by the HMM manager: `name` for monophones,
    /// `name(left,right)` for triphones.
    pub fn key(&self) -> String {
        match &self.context {
            None => self.name.clone(),
            Some(c) => format!("{}({},{})", self.name, c.left, c.right),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Interning map of context-independent units, keyed by phone name.
#[derive(Debug, Default)]
pub struct UnitManager {
    units: HashMap<String, Arc<Unit>>,
}

impl UnitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing unit under `name`, or creates it.
    pub fn intern(&mut self, name: &str, filler: bool) -> Arc<Unit> {
        self.units
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Unit::context_independent(name, filler)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Unit>> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// The distinguished silence unit, if registered.
    pub fn silence(&self) -> Option<&Arc<Unit>> {
        self.units.get(SILENCE_NAME)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Unit>)> {
        self.units.iter()
    }
}
