/// Published on the tier-wide broadcast channel so other components (most
/// notably metrics/logging) can observe cache churn without polling.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Expired { cache: &'static str, key: String },
    Evicted { cache: &'static str, key: String },
    Flushed { cache: &'static str },
}
