//! HMM topology: positions, senone sequences and the HMM registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::unit::Unit;

/// Dense senone id into the senone pool.
pub type SenoneId = usize;

/// Shared ordered list of senone ids; typically `numStatePerHMM - 1` long.
/// Shared handles into the senone pool, no back-pointers.
pub type SenoneSequence = Arc<[SenoneId]>;

/// Where a unit sits inside a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmmPosition {
    Begin,
    Middle,
    End,
    Single,
    Internal,
    Undefined,
}

impl HmmPosition {
    /// Parses the single-character mdef position symbol.
    pub fn from_symbol(symbol: &str) -> Option<HmmPosition> {
        match symbol {
            "b" => Some(HmmPosition::Begin),
            "m" => Some(HmmPosition::Middle),
            "e" => Some(HmmPosition::End),
            "s" => Some(HmmPosition::Single),
            "i" => Some(HmmPosition::Internal),
            "-" => Some(HmmPosition::Undefined),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            HmmPosition::Begin => 'b',
            HmmPosition::Middle => 'm',
            HmmPosition::End => 'e',
            HmmPosition::Single => 's',
            HmmPosition::Internal => 'i',
            HmmPosition::Undefined => '-',
        }
    }
}

/// One HMM: a unit bound to its senone sequence, tied transition matrix and
/// word position.
#[derive(Debug, Clone)]
pub struct SenoneHmm {
    unit: Arc<Unit>,
    senone_sequence: SenoneSequence,
    transition_matrix: usize,
    position: HmmPosition,
}

impl SenoneHmm {
    pub fn new(
        unit: Arc<Unit>,
        senone_sequence: SenoneSequence,
        transition_matrix: usize,
        position: HmmPosition,
    ) -> Self {
        SenoneHmm {
            unit,
            senone_sequence,
            transition_matrix,
            position,
        }
    }

    pub fn unit(&self) -> &Arc<Unit> {
        &self.unit
    }

    pub fn senone_sequence(&self) -> &SenoneSequence {
        &self.senone_sequence
    }

    /// Id of the tied transition matrix in the transition pool.
    pub fn transition_matrix(&self) -> usize {
        self.transition_matrix
    }

    pub fn position(&self) -> HmmPosition {
        self.position
    }

    /// Emitting states plus the terminal state.
    pub fn num_states(&self) -> usize {
        self.senone_sequence.len() + 1
    }
}

/// Registry of HMMs keyed by `(position, unit key)`.
#[derive(Debug, Default)]
pub struct HmmManager {
    hmms: HashMap<(HmmPosition, String), SenoneHmm>,
}

impl HmmManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, hmm: SenoneHmm) {
        let key = (hmm.position(), hmm.unit().key());
        self.hmms.insert(key, hmm);
    }

    pub fn get(&self, position: HmmPosition, unit_key: &str) -> Option<&SenoneHmm> {
        self.hmms.get(&(position, unit_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.hmms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hmms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SenoneHmm> {
        self.hmms.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_symbols() {
        for sym in ["b", "m", "e", "s", "i", "-"] {
            let pos = HmmPosition::from_symbol(sym).unwrap();
            assert_eq!(pos.symbol().to_string(), sym);
        }
        assert_eq!(HmmPosition::from_symbol("x"), None);
    }

    #[test]
    fn test_manager_keying() {
        let mut manager = HmmManager::new();
        let unit = Arc::new(Unit::context_independent("SIL", true));
        let seq: SenoneSequence = vec![0, 1, 2].into();
        manager.put(SenoneHmm::new(unit, seq, 0, HmmPosition::Undefined));

        let hmm = manager.get(HmmPosition::Undefined, "SIL").unwrap();
        assert_eq!(hmm.num_states(), 4);
        assert!(manager.get(HmmPosition::Begin, "SIL").is_none());
    }
}
