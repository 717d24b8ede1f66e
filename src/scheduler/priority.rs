//! Versioned task priority table and strategy-mode rescaling
//!
//! Base priorities live in one enum-keyed table. A strategy mode never edits
//! priorities ad hoc: it selects rows from [`MODE_OVERRIDES`] and
//! [`PriorityTable::rescaled`] applies them as a pure function.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coarse strategy signal emitted by the external policy module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StrategyMode {
    #[default]
    Normal,
    Aggressive,
    AllIn,
}

/// Row key of the priority table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityKey {
    /// Base defense against a threat containing high-threat units
    DefenseCritical,
    /// Base defense against ordinary units only
    DefenseLight,
    ExpansionDenial,
    MainAttack,
    Harass,
    Scout,
    /// Fallback when nothing else is pending
    Rally,
}

impl PriorityKey {
    pub const COUNT: usize = 7;

    pub const ALL: [PriorityKey; Self::COUNT] = [
        PriorityKey::DefenseCritical,
        PriorityKey::DefenseLight,
        PriorityKey::ExpansionDenial,
        PriorityKey::MainAttack,
        PriorityKey::Harass,
        PriorityKey::Scout,
        PriorityKey::Rally,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Current table layout version
pub const PRIORITY_TABLE_VERSION: u32 = 1;

/// Per-mode overrides: `(mode, key, priority)`
///
/// Normal has no rows. Whatever these rows say, main attack is clamped below
/// critical defense afterwards.
pub const MODE_OVERRIDES: &[(StrategyMode, PriorityKey, i32)] = &[
    (StrategyMode::Aggressive, PriorityKey::MainAttack, 90),
    (StrategyMode::Aggressive, PriorityKey::DefenseLight, 85),
    (StrategyMode::Aggressive, PriorityKey::Harass, 70),
    (StrategyMode::AllIn, PriorityKey::MainAttack, 95),
    (StrategyMode::AllIn, PriorityKey::DefenseLight, 70),
    (StrategyMode::AllIn, PriorityKey::ExpansionDenial, 60),
    (StrategyMode::AllIn, PriorityKey::Scout, 30),
];

/// Errors loading a priority table
#[derive(Debug, thiserror::Error)]
pub enum PriorityTableError {
    #[error("failed to read priority table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse priority table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported priority table version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Explicit task priority table passed into the evaluator as configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTable {
    pub version: u32,
    pub defense_critical: i32,
    pub defense_light: i32,
    pub expansion_denial: i32,
    pub main_attack: i32,
    pub harass: i32,
    pub scout: i32,
    pub rally: i32,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            version: PRIORITY_TABLE_VERSION,
            defense_critical: 100,
            defense_light: 100,
            expansion_denial: 90,
            main_attack: 40,
            harass: 60,
            scout: 50,
            rally: 20,
        }
    }
}

impl PriorityTable {
    /// Load a table from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PriorityTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PriorityTableError> {
        let table: PriorityTable = serde_json::from_str(raw)?;
        if table.version != PRIORITY_TABLE_VERSION {
            return Err(PriorityTableError::Version {
                found: table.version,
                expected: PRIORITY_TABLE_VERSION,
            });
        }
        Ok(table)
    }

    pub fn get(&self, key: PriorityKey) -> i32 {
        self.as_array()[key.index()]
    }

    pub fn set(&mut self, key: PriorityKey, value: i32) {
        let slot = match key {
            PriorityKey::DefenseCritical => &mut self.defense_critical,
            PriorityKey::DefenseLight => &mut self.defense_light,
            PriorityKey::ExpansionDenial => &mut self.expansion_denial,
            PriorityKey::MainAttack => &mut self.main_attack,
            PriorityKey::Harass => &mut self.harass,
            PriorityKey::Scout => &mut self.scout,
            PriorityKey::Rally => &mut self.rally,
        };
        *slot = value;
    }

    fn as_array(&self) -> [i32; PriorityKey::COUNT] {
        [
            self.defense_critical,
            self.defense_light,
            self.expansion_denial,
            self.main_attack,
            self.harass,
            self.scout,
            self.rally,
        ]
    }

    /// Table with the given mode's overrides applied
    pub fn rescaled(&self, mode: StrategyMode) -> PriorityTable {
        let mut table = self.clone();
        for &(row_mode, key, value) in MODE_OVERRIDES {
            if row_mode == mode {
                table.set(key, value);
            }
        }
        table.main_attack = table.main_attack.min(table.defense_critical.saturating_sub(1));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = PriorityTable::default();
        assert_eq!(table.get(PriorityKey::DefenseCritical), 100);
        assert_eq!(table.get(PriorityKey::DefenseLight), 100);
        assert_eq!(table.get(PriorityKey::ExpansionDenial), 90);
        assert_eq!(table.get(PriorityKey::MainAttack), 40);
        assert_eq!(table.get(PriorityKey::Scout), 50);
        assert_eq!(table.get(PriorityKey::Rally), 20);
    }

    #[test]
    fn test_get_set_roundtrip_every_key() {
        let mut table = PriorityTable::default();
        for (i, key) in PriorityKey::ALL.into_iter().enumerate() {
            table.set(key, i as i32 * 7);
        }
        for (i, key) in PriorityKey::ALL.into_iter().enumerate() {
            assert_eq!(table.get(key), i as i32 * 7);
        }
    }

    #[test]
    fn test_normal_mode_is_identity() {
        let table = PriorityTable::default();
        assert_eq!(table.rescaled(StrategyMode::Normal), table);
    }

    #[test]
    fn test_aggressive_attack_beats_light_defense_only() {
        let table = PriorityTable::default().rescaled(StrategyMode::Aggressive);
        assert!(table.main_attack > table.defense_light);
        assert!(table.main_attack < table.defense_critical);
    }

    #[test]
    fn test_all_in_never_exceeds_critical_defense() {
        let mut base = PriorityTable::default();
        base.defense_critical = 80;
        let table = base.rescaled(StrategyMode::AllIn);
        assert_eq!(table.main_attack, 79);
        assert!(table.main_attack > table.defense_light);
    }

    #[test]
    fn test_rescale_handles_extreme_critical_priority() {
        let mut base = PriorityTable::default();
        base.defense_critical = i32::MIN;
        let table = base.rescaled(StrategyMode::AllIn);
        assert_eq!(table.main_attack, i32::MIN);
    }

    #[test]
    fn test_rescale_does_not_mutate_base() {
        let base = PriorityTable::default();
        let _ = base.rescaled(StrategyMode::AllIn);
        assert_eq!(base.main_attack, 40);
    }

    #[test]
    fn test_from_json() {
        let raw = r#"{"version":1,"defense_critical":100,"defense_light":95,
            "expansion_denial":80,"main_attack":45,"harass":55,"scout":50,"rally":10}"#;
        let table = PriorityTable::from_json(raw).unwrap();
        assert_eq!(table.defense_light, 95);
        assert_eq!(table.rally, 10);
    }

    #[test]
    fn test_from_json_rejects_other_version() {
        let raw = r#"{"version":2,"defense_critical":100,"defense_light":95,
            "expansion_denial":80,"main_attack":45,"harass":55,"scout":50,"rally":10}"#;
        assert!(matches!(
            PriorityTable::from_json(raw),
            Err(PriorityTableError::Version { found: 2, expected: 1 })
        ));
    }
}
