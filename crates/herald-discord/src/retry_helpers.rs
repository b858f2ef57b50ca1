use std::time::Duration;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Reads `retry-after`, which Discord sends as possibly fractional seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds.min(MAX_RETRY_DELAY_MS as f64 / 1_000.0)))
}

pub(crate) fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(MAX_RETRY_DELAY_MS))
}

/// Which failures a request may be replayed after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryPolicy {
    /// Replaying has the same effect as one delivery (PUT, PATCH).
    Idempotent,
    /// A replay may duplicate a message, so retry only when Discord provably did not act on it.
    NonIdempotent,
}

pub(crate) fn is_retryable_status(status: u16, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Idempotent => status == 429 || status >= 500,
        RetryPolicy::NonIdempotent => status == 429,
    }
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Idempotent => error.is_timeout() || error.is_connect() || error.is_request(),
        RetryPolicy::NonIdempotent => error.is_connect(),
    }
}

pub(crate) fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
