//! Rate limiting logic and state management.

mod algorithm;
mod bucket;
mod identifier;
mod limiter;
mod store;

pub use algorithm::Decision;
pub use bucket::BucketState;
pub use identifier::Identifier;
pub use limiter::RateLimiter;
pub use store::BucketStore;
