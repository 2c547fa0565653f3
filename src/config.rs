/// Configuration for the replication scheduler, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between two dispatch rounds (milliseconds).
    pub requests_interval_ms: u64,
    /// Max pending requests fetched per round.
    pub requests_limit: usize,
    /// Max concurrent per-pod sends within a round.
    pub requests_in_parallel: usize,
    /// Score delta applied to a pod after a successful delivery.
    pub score_bonus: i64,
    /// Score delta applied to a pod after a failed delivery (negative).
    pub score_malus: i64,
    /// Score a pod starts with when admitted.
    pub base_score: i64,
    /// Ceiling a pod's score is clamped to on the way up.
    pub max_score: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            requests_interval_ms: 600_000, // 10 min
            requests_limit: 10,
            requests_in_parallel: 10,
            score_bonus: 10,
            score_malus: -10,
            base_score: 100,
            max_score: 1000,
        }
    }
}

impl SchedulerConfig {
    /// Load config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            requests_interval_ms: env_parse("PODSYNC_REQUESTS_INTERVAL_MS")
                .unwrap_or(defaults.requests_interval_ms),
            requests_limit: env_parse("PODSYNC_REQUESTS_LIMIT").unwrap_or(defaults.requests_limit),
            requests_in_parallel: env_parse("PODSYNC_REQUESTS_IN_PARALLEL")
                .unwrap_or(defaults.requests_in_parallel),
            score_bonus: env_parse("PODSYNC_SCORE_BONUS").unwrap_or(defaults.score_bonus),
            score_malus: env_parse("PODSYNC_SCORE_MALUS").unwrap_or(defaults.score_malus),
            base_score: env_parse("PODSYNC_BASE_SCORE").unwrap_or(defaults.base_score),
            max_score: env_parse("PODSYNC_MAX_SCORE").unwrap_or(defaults.max_score),
        }
    }

    /// Config with a short interval and small base score (for tests).
    pub fn for_tests() -> Self {
        Self {
            requests_interval_ms: 10_000,
            base_score: 20,
            ..Self::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
