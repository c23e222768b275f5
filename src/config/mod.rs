mod structs;

pub use structs::{
    AnalyticsConfig, CacheConfig, DatabaseConfig, DispatchConfig, DomainsConfig, LoggingConfig,
    RateLimitConfig, ReconcilerConfig, RedisConfig, ServerConfig, SessionConfig, StaticConfig,
    WarehouseConfig,
};
