use std::str::FromStr;

use crate::scheduler::priority::PriorityTable;
use crate::world::constants::{defense, ledger, offense, spatial, threat, throttle, timing};

/// Configuration errors reported by [`SchedulerConfig::validate`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroInterval(&'static str),
    #[error("{0} must be a positive finite distance")]
    InvalidRadius(&'static str),
    #[error("min_army_late ({late}) is below min_army_early ({early})")]
    ArmyThresholds { early: usize, late: usize },
    #[error("main attack priority {attack} must stay below critical defense {critical}")]
    PriorityOrder { attack: i32, critical: i32 },
}

/// Decision core configuration
///
/// Tuning values default to the constants in [`crate::world::constants`] and
/// can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Simulation steps per second (used for the tick budget)
    pub tick_rate: u32,

    // Throttle
    /// Ticks between full passes under normal load
    pub throttle_interval: u64,
    /// Ticks between emergency re-evaluations
    pub emergency_eval_interval: u64,
    pub strongpoint_alert_radius: f32,
    pub engagement_population: usize,
    pub engagement_sample_size: usize,
    pub engagement_radius: f32,
    pub worker_alert_radius: f32,

    // Threat and defense
    pub threat_radius: f32,
    pub defense_pull_radius: f32,
    pub defenders_per_threat_point: usize,
    pub critical_defender_bonus: usize,

    // Offense gating (early/late thresholds are tuning parameters)
    pub min_army_early: usize,
    pub min_army_late: usize,
    pub late_game_secs: f32,
    pub denial_min_army: usize,
    pub denial_squad_size: usize,
    pub harass_squad_size: usize,

    /// Reservations older than this many ticks are reclaimed
    pub stale_reservation_ticks: u64,
    /// Cell size of the spatial hash grids
    pub grid_cell_size: f32,
    /// Capacity of the outgoing command buffer
    pub command_buffer_capacity: usize,

    pub priorities: PriorityTable,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate: timing::TICK_RATE,
            throttle_interval: throttle::NORMAL_INTERVAL,
            emergency_eval_interval: throttle::EMERGENCY_EVAL_INTERVAL,
            strongpoint_alert_radius: throttle::STRONGPOINT_ALERT_RADIUS,
            engagement_population: throttle::ENGAGEMENT_POPULATION,
            engagement_sample_size: throttle::ENGAGEMENT_SAMPLE_SIZE,
            engagement_radius: throttle::ENGAGEMENT_RADIUS,
            worker_alert_radius: throttle::WORKER_ALERT_RADIUS,
            threat_radius: threat::RADIUS,
            defense_pull_radius: defense::PULL_RADIUS,
            defenders_per_threat_point: defense::DEFENDERS_PER_THREAT_POINT,
            critical_defender_bonus: defense::CRITICAL_DEFENDER_BONUS,
            min_army_early: offense::MIN_ARMY_EARLY,
            min_army_late: offense::MIN_ARMY_LATE,
            late_game_secs: offense::LATE_GAME_SECS,
            denial_min_army: offense::DENIAL_MIN_ARMY,
            denial_squad_size: offense::DENIAL_SQUAD_SIZE,
            harass_squad_size: offense::HARASS_SQUAD_SIZE,
            stale_reservation_ticks: ledger::STALE_RESERVATION_TICKS,
            grid_cell_size: spatial::GRID_CELL_SIZE,
            command_buffer_capacity: 4096,
            priorities: PriorityTable::default(),
        }
    }
}

/// Parse an environment variable into `slot` if present and accepted by `valid`
fn override_from_env<T>(name: &str, slot: &mut T, valid: impl Fn(&T) -> bool)
where
    T: FromStr,
{
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if valid(&parsed) => *slot = parsed,
        Ok(_) => tracing::warn!("{} value '{}' out of range, using default", name, raw),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
    }
}

impl SchedulerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        override_from_env("TICK_RATE", &mut config.tick_rate, |v| *v > 0 && *v <= 1000);
        override_from_env("THROTTLE_INTERVAL", &mut config.throttle_interval, |v| *v > 0);
        override_from_env(
            "EMERGENCY_EVAL_INTERVAL",
            &mut config.emergency_eval_interval,
            |v| *v > 0,
        );
        override_from_env(
            "STALE_RESERVATION_TICKS",
            &mut config.stale_reservation_ticks,
            |v| *v > 0,
        );
        override_from_env("MIN_ARMY_EARLY", &mut config.min_army_early, |_| true);
        override_from_env("MIN_ARMY_LATE", &mut config.min_army_late, |_| true);
        override_from_env("LATE_GAME_SECS", &mut config.late_game_secs, |v| {
            v.is_finite() && *v >= 0.0
        });
        override_from_env(
            "DEFENDERS_PER_THREAT_POINT",
            &mut config.defenders_per_threat_point,
            |v| *v > 0,
        );

        if let Ok(path) = std::env::var("PRIORITY_TABLE_PATH") {
            match PriorityTable::load(&path) {
                Ok(table) => config.priorities = table,
                Err(e) => tracing::warn!(
                    "Failed to load priority table from '{}': {}, using default",
                    path,
                    e
                ),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle_interval == 0 {
            return Err(ConfigError::ZeroInterval("throttle_interval"));
        }
        if self.emergency_eval_interval == 0 {
            return Err(ConfigError::ZeroInterval("emergency_eval_interval"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroInterval("tick_rate"));
        }

        let radii = [
            ("strongpoint_alert_radius", self.strongpoint_alert_radius),
            ("engagement_radius", self.engagement_radius),
            ("worker_alert_radius", self.worker_alert_radius),
            ("threat_radius", self.threat_radius),
            ("defense_pull_radius", self.defense_pull_radius),
            ("grid_cell_size", self.grid_cell_size),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidRadius(name));
            }
        }

        if self.min_army_late < self.min_army_early {
            return Err(ConfigError::ArmyThresholds {
                early: self.min_army_early,
                late: self.min_army_late,
            });
        }
        if self.priorities.main_attack >= self.priorities.defense_critical {
            return Err(ConfigError::PriorityOrder {
                attack: self.priorities.main_attack,
                critical: self.priorities.defense_critical,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.throttle_interval, 4);
        assert_eq!(config.emergency_eval_interval, 3);
        assert_eq!(config.priorities.defense_critical, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SchedulerConfig::load_or_default();
        assert!(config.throttle_interval > 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SchedulerConfig {
            throttle_interval: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("throttle_interval"))
        );

        let config = SchedulerConfig {
            threat_radius: f32::NAN,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRadius("threat_radius")));

        let config = SchedulerConfig {
            min_army_early: 10,
            min_army_late: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ArmyThresholds { .. })));

        let mut config = SchedulerConfig::default();
        config.priorities.main_attack = 100;
        assert!(matches!(config.validate(), Err(ConfigError::PriorityOrder { .. })));
    }
}
