use std::fmt;

#[derive(Debug, Clone)]
pub enum LinkgateError {
    NotFound(String),
    Expired(String),
    Unauthorized(String),
    QuotaExceeded(String),
    RateLimited(String),
    Validation(String),
    UpstreamFailure(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    CacheOperation(String),
    Serialization(String),
}

impl LinkgateError {
    /// Stable error code, used in logs and API bodies
    pub fn code(&self) -> &'static str {
        match self {
            LinkgateError::NotFound(_) => "E001",
            LinkgateError::Expired(_) => "E002",
            LinkgateError::Unauthorized(_) => "E003",
            LinkgateError::QuotaExceeded(_) => "E004",
            LinkgateError::RateLimited(_) => "E005",
            LinkgateError::Validation(_) => "E006",
            LinkgateError::UpstreamFailure(_) => "E007",
            LinkgateError::DatabaseConfig(_) => "E008",
            LinkgateError::DatabaseConnection(_) => "E009",
            LinkgateError::DatabaseOperation(_) => "E010",
            LinkgateError::CacheOperation(_) => "E011",
            LinkgateError::Serialization(_) => "E012",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            LinkgateError::NotFound(_) => "Not Found",
            LinkgateError::Expired(_) => "Link Expired",
            LinkgateError::Unauthorized(_) => "Unauthorized",
            LinkgateError::QuotaExceeded(_) => "Quota Exceeded",
            LinkgateError::RateLimited(_) => "Rate Limited",
            LinkgateError::Validation(_) => "Validation Error",
            LinkgateError::UpstreamFailure(_) => "Upstream Failure",
            LinkgateError::DatabaseConfig(_) => "Database Configuration Error",
            LinkgateError::DatabaseConnection(_) => "Database Connection Error",
            LinkgateError::DatabaseOperation(_) => "Database Operation Error",
            LinkgateError::CacheOperation(_) => "Cache Operation Error",
            LinkgateError::Serialization(_) => "Serialization Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LinkgateError::NotFound(msg) => msg,
            LinkgateError::Expired(msg) => msg,
            LinkgateError::Unauthorized(msg) => msg,
            LinkgateError::QuotaExceeded(msg) => msg,
            LinkgateError::RateLimited(msg) => msg,
            LinkgateError::Validation(msg) => msg,
            LinkgateError::UpstreamFailure(msg) => msg,
            LinkgateError::DatabaseConfig(msg) => msg,
            LinkgateError::DatabaseConnection(msg) => msg,
            LinkgateError::DatabaseOperation(msg) => msg,
            LinkgateError::CacheOperation(msg) => msg,
            LinkgateError::Serialization(msg) => msg,
        }
    }

    /// HTTP status this error maps to when it reaches a handler boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            LinkgateError::NotFound(_) => 404,
            LinkgateError::Expired(_) => 410,
            LinkgateError::Unauthorized(_) => 401,
            LinkgateError::QuotaExceeded(_) => 403,
            LinkgateError::RateLimited(_) => 429,
            LinkgateError::Validation(_) => 400,
            LinkgateError::UpstreamFailure(_) => 502,
            LinkgateError::DatabaseConfig(_)
            | LinkgateError::DatabaseConnection(_)
            | LinkgateError::DatabaseOperation(_)
            | LinkgateError::CacheOperation(_)
            | LinkgateError::Serialization(_) => 500,
        }
    }
}

impl fmt::Display for LinkgateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type(), self.message())
    }
}

impl std::error::Error for LinkgateError {}

// Convenience constructors
impl LinkgateError {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LinkgateError::NotFound(msg.into())
    }

    pub fn expired<T: Into<String>>(msg: T) -> Self {
        LinkgateError::Expired(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        LinkgateError::Unauthorized(msg.into())
    }

    pub fn quota_exceeded<T: Into<String>>(msg: T) -> Self {
        LinkgateError::QuotaExceeded(msg.into())
    }

    pub fn rate_limited<T: Into<String>>(msg: T) -> Self {
        LinkgateError::RateLimited(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LinkgateError::Validation(msg.into())
    }

    pub fn upstream_failure<T: Into<String>>(msg: T) -> Self {
        LinkgateError::UpstreamFailure(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LinkgateError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LinkgateError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LinkgateError::DatabaseOperation(msg.into())
    }

    pub fn cache_operation<T: Into<String>>(msg: T) -> Self {
        LinkgateError::CacheOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        LinkgateError::Serialization(msg.into())
    }
}

impl From<sea_orm::DbErr> for LinkgateError {
    fn from(err: sea_orm::DbErr) -> Self {
        LinkgateError::DatabaseOperation(err.to_string())
    }
}

impl From<redis::RedisError> for LinkgateError {
    fn from(err: redis::RedisError) -> Self {
        LinkgateError::CacheOperation(err.to_string())
    }
}

impl From<std::io::Error> for LinkgateError {
    fn from(err: std::io::Error) -> Self {
        LinkgateError::UpstreamFailure(err.to_string())
    }
}

impl From<serde_json::Error> for LinkgateError {
    fn from(err: serde_json::Error) -> Self {
        LinkgateError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkgateError>;
