//! Classification of producer failures.
//!
//! Upstream generation services report throttling and quota exhaustion only
//! through error text, so the whole error chain is matched against known
//! patterns. The 429 pattern wins over the quota pattern because throttling
//! messages frequently mention a "rate limit" as well.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FlowError, ProducerError};

static TOO_MANY_REQUESTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)429|too\s+many\s+requests").expect("valid regex"));

static QUOTA_OR_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)quota|limit").expect("valid regex"));

/// Maps a producer error onto the flow error taxonomy
pub fn classify_producer_error(error: anyhow::Error) -> FlowError {
    // `{:#}` renders the full context chain on one line
    let message = format!("{error:#}");

    if TOO_MANY_REQUESTS.is_match(&message) {
        FlowError::UpstreamRateLimited { message }
    } else if QUOTA_OR_LIMIT.is_match(&message) {
        FlowError::QuotaExhausted { message }
    } else {
        FlowError::Producer(ProducerError::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowErrorKind;
    use anyhow::anyhow;

    fn kind_of(message: &str) -> FlowErrorKind {
        classify_producer_error(anyhow!("{}", message.to_string())).kind()
    }

    #[test]
    fn test_upstream_rate_limit_patterns() {
        assert_eq!(kind_of("[429 Too Many Requests] slow down"), FlowErrorKind::UpstreamRateLimited);
        assert_eq!(kind_of("HTTP 429"), FlowErrorKind::UpstreamRateLimited);
        assert_eq!(kind_of("too many requests"), FlowErrorKind::UpstreamRateLimited);
        // a throttling message that also says "limit" is still a 429
        assert_eq!(
            kind_of("429: rate limit reached for requests"),
            FlowErrorKind::UpstreamRateLimited
        );
    }

    #[test]
    fn test_quota_patterns() {
        assert_eq!(kind_of("Quota exceeded for quota metric"), FlowErrorKind::QuotaExhausted);
        assert_eq!(kind_of("daily LIMIT reached"), FlowErrorKind::QuotaExhausted);
    }

    #[test]
    fn test_other_messages_are_preserved() {
        let error = classify_producer_error(anyhow!("connection reset by peer"));
        assert_eq!(error.kind(), FlowErrorKind::Producer);
        assert_eq!(error.to_string(), "connection reset by peer");
    }

    #[test]
    fn test_429_anywhere_in_the_message_is_throttling() {
        assert_eq!(kind_of("HTTP429"), FlowErrorKind::UpstreamRateLimited);
        assert_eq!(kind_of("status_429"), FlowErrorKind::UpstreamRateLimited);
        assert_eq!(kind_of("request id 14290 failed"), FlowErrorKind::UpstreamRateLimited);
    }

    #[test]
    fn test_context_chain_is_inspected() {
        let error = anyhow!("status 429").context("generating daily verse");
        let classified = classify_producer_error(error);

        match classified {
            FlowError::UpstreamRateLimited { message } => {
                assert_eq!(message, "generating daily verse: status 429");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
