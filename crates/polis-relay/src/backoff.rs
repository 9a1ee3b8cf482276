use std::time::Duration;

/// Publish retry delay for a 1-based attempt counter: 2, 4, 8, 16, 32 and
/// then 60s flat.
pub fn publish_backoff(attempt: i32) -> Duration {
    let attempt = attempt.clamp(1, 6) as u32;
    let delay = 2u64.pow(attempt);
    Duration::from_secs(delay.min(60))
}
