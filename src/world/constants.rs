/// Simulation timing
pub mod timing {
    /// Simulation steps per real-time second
    pub const TICK_RATE: u32 = 22;
}

/// Threat scoring around friendly strongpoints
pub mod threat {
    /// Hostiles within this distance of a strongpoint contribute to its score
    pub const RADIUS: f32 = 25.0;
    /// Score for an ordinary hostile unit
    pub const ORDINARY_SCORE: u32 = 1;
    /// Score for a unit in the high-threat category set
    pub const HIGH_THREAT_SCORE: u32 = 5;
    /// Added on top of the base score for airborne hostiles
    pub const AIRBORNE_BONUS: u32 = 1;
}

/// Base defense task sizing
pub mod defense {
    /// Maximum distance a defender may be from the threat centroid
    pub const PULL_RADIUS: f32 = 60.0;
    /// Defenders requested per point of threat score
    pub const DEFENDERS_PER_THREAT_POINT: usize = 3;
    /// Extra defenders when the threat is critical
    pub const CRITICAL_DEFENDER_BONUS: usize = 4;
}

/// Offensive task gating
pub mod offense {
    /// Minimum live army before a main attack is considered (early game)
    pub const MIN_ARMY_EARLY: usize = 8;
    /// Minimum live army before a main attack is considered (late game)
    pub const MIN_ARMY_LATE: usize = 20;
    /// Game time (seconds) at which the late-game threshold applies
    pub const LATE_GAME_SECS: f32 = 480.0;
    /// Minimum live army before expansion denial is considered
    pub const DENIAL_MIN_ARMY: usize = 6;
    /// Units sent to deny an expansion
    pub const DENIAL_SQUAD_SIZE: usize = 4;
    /// Units sent on a harass run
    pub const HARASS_SQUAD_SIZE: usize = 2;
}

/// Rally point handling
pub mod rally {
    /// Units already this close to the rally point are told to hold
    pub const HOLD_RADIUS: f32 = 2.0;
}

/// Execution throttle and emergency detection
pub mod throttle {
    /// Ticks between full scheduling passes under normal load
    pub const NORMAL_INTERVAL: u64 = 4;
    /// Ticks between emergency re-evaluations
    pub const EMERGENCY_EVAL_INTERVAL: u64 = 3;
    /// A hostile this close to a strongpoint forces emergency mode
    pub const STRONGPOINT_ALERT_RADIUS: f32 = 20.0;
    /// Both combat populations must exceed this for an engagement check
    pub const ENGAGEMENT_POPULATION: usize = 8;
    /// Number of friendly combat units sampled during an engagement check
    pub const ENGAGEMENT_SAMPLE_SIZE: usize = 6;
    /// Hostile proximity that counts as an engagement for a sampled unit
    pub const ENGAGEMENT_RADIUS: f32 = 12.0;
    /// A hostile this close to a worker forces emergency mode
    pub const WORKER_ALERT_RADIUS: f32 = 8.0;
}

/// Resource ledger
pub mod ledger {
    /// Reservations older than this many ticks are reclaimed (~30s)
    pub const STALE_RESERVATION_TICKS: u64 = 660;
}

/// Spatial hashing
pub mod spatial {
    /// Cell size for unit hash grids (map units)
    pub const GRID_CELL_SIZE: f32 = 16.0;
}
