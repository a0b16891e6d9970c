/// Longest date range a single validation or count query may span (inclusive days).
pub const MAX_RANGE_DAYS: i64 = 731;

/// Registered rules per engine.
pub const MAX_RULES: usize = 256;

pub const MAX_RULE_ID_LEN: usize = 64;

/// Rule priorities must fall inside `[MIN_PRIORITY, MAX_PRIORITY]`.
pub const MIN_PRIORITY: i32 = -10_000;
pub const MAX_PRIORITY: i32 = 10_000;

pub const MAX_RULE_DEPENDENCIES: usize = 16;

/// Upper bound on units the resolver will ask the directory to materialize.
pub const MAX_MATERIALIZED_UNITS: u32 = 500;

/// Upper bound on the synthetic fallback range.
pub const MAX_SYNTHETIC_UNITS: u32 = 10_000;

/// Cached rule selections per engine before the cache is dropped wholesale.
pub const MAX_CONTEXT_CACHE_ENTRIES: usize = 1024;
