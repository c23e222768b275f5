pub mod headers;
pub mod rate_limit;
pub mod request_id;
pub mod session_gate;

pub use headers::SecurityHeaders;
pub use rate_limit::RateLimitGuard;
pub use request_id::RequestIdMiddleware;
pub use session_gate::SessionGate;
