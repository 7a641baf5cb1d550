use std::collections::BTreeSet;

use http::StatusCode;

use crate::error::HttpieError;

/// Outcome of classifying one attempt.
#[derive(Debug)]
pub enum Verdict<T, E> {
    /// Stop and hand the value to the caller.
    Accept(T),
    /// Schedule another attempt if the budget allows it.
    Retry,
    /// Stop and surface the error as is.
    Reject(E),
}

pub trait RetryPolicy<T, E>: Send + Sync {
    fn classify(&self, outcome: Result<T, E>) -> Verdict<T, E>;
}

impl<T, E, F> RetryPolicy<T, E> for F
where
    F: Fn(Result<T, E>) -> Verdict<T, E> + Send + Sync,
{
    fn classify(&self, outcome: Result<T, E>) -> Verdict<T, E> {
        self(outcome)
    }
}

/// Accepts every success and retries every error.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl<T, E> RetryPolicy<T, E> for DefaultPolicy {
    fn classify(&self, outcome: Result<T, E>) -> Verdict<T, E> {
        match outcome {
            Ok(value) => Verdict::Accept(value),
            Err(_) => Verdict::Retry,
        }
    }
}

/// A successful call that still carries an HTTP status.
pub trait HttpOutcome {
    fn status_code(&self) -> StatusCode;

    fn into_http_error(self) -> HttpieError;
}

/// An error that may carry the HTTP status of the response it came from.
pub trait HttpFailure {
    fn http_status(&self) -> Option<StatusCode>;
}

impl HttpFailure for HttpieError {
    fn http_status(&self) -> Option<StatusCode> {
        self.status()
    }
}

pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 13] = [
    307, 408, 429, 444, 500, 502, 503, 504, 520, 521, 522, 523, 524,
];

/// Retries on a configurable set of HTTP status codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpStatusPolicy {
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for HttpStatusPolicy {
    fn default() -> Self {
        Self {
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl HttpStatusPolicy {
    /// Uses `codes` as the retryable set, on top of the defaults when
    /// `include_defaults` is set.
    pub fn new(codes: impl IntoIterator<Item = u16>, include_defaults: bool) -> Self {
        let mut retryable_status_codes: BTreeSet<u16> = codes.into_iter().collect();
        if include_defaults {
            retryable_status_codes.extend(DEFAULT_RETRYABLE_STATUS_CODES);
        }
        Self {
            retryable_status_codes,
        }
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status.as_u16())
    }
}

impl<T, E> RetryPolicy<T, E> for HttpStatusPolicy
where
    T: HttpOutcome,
    E: HttpFailure + From<HttpieError>,
{
    fn classify(&self, outcome: Result<T, E>) -> Verdict<T, E> {
        match outcome {
            Ok(response) => {
                let status = response.status_code();
                if self.is_retryable(status) {
                    Verdict::Retry
                } else if status.as_u16() < 400 {
                    Verdict::Accept(response)
                } else {
                    Verdict::Reject(E::from(response.into_http_error()))
                }
            }
            Err(error) => match error.http_status() {
                Some(status) if self.is_retryable(status) => Verdict::Retry,
                _ => Verdict::Reject(error),
            },
        }
    }
}

/// Status policy with the default retryable codes.
pub fn http_status() -> HttpStatusPolicy {
    HttpStatusPolicy::default()
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, StatusCode};

    use super::{DefaultPolicy, HttpOutcome, HttpStatusPolicy, RetryPolicy, Verdict, http_status};
    use crate::decode::ResponseData;
    use crate::error::HttpieError;

    #[derive(Debug)]
    struct Status(u16);

    impl HttpOutcome for Status {
        fn status_code(&self) -> StatusCode {
            StatusCode::from_u16(self.0).expect("valid status")
        }

        fn into_http_error(self) -> HttpieError {
            let status = self.status_code();
            HttpieError::OnHttpError {
                status,
                status_message: status.canonical_reason().unwrap_or_default().to_owned(),
                headers: Box::new(HeaderMap::new()),
                data: ResponseData::Text(String::new()),
            }
        }
    }

    fn http_error(code: u16) -> HttpieError {
        Status(code).into_http_error()
    }

    #[test]
    fn default_policy_retries_errors_only() {
        let policy = DefaultPolicy;
        assert!(matches!(
            RetryPolicy::<u8, &str>::classify(&policy, Ok(1)),
            Verdict::Accept(1)
        ));
        assert!(matches!(
            RetryPolicy::<u8, &str>::classify(&policy, Err("boom")),
            Verdict::Retry
        ));
    }

    #[test]
    fn closures_are_policies() {
        let policy = |outcome: Result<u8, &'static str>| match outcome {
            Ok(value) if value > 2 => Verdict::Accept(value),
            Ok(_) => Verdict::Retry,
            Err(error) => Verdict::Reject(error),
        };
        assert!(matches!(policy.classify(Ok(3)), Verdict::Accept(3)));
        assert!(matches!(policy.classify(Ok(1)), Verdict::Retry));
        assert!(matches!(policy.classify(Err("no")), Verdict::Reject("no")));
    }

    #[test]
    fn status_policy_defaults() {
        let policy = http_status();
        for code in [307, 408, 429, 444, 500, 502, 503, 504, 520, 521, 522, 523, 524] {
            assert!(policy.is_retryable(StatusCode::from_u16(code).expect("valid status")));
        }
        assert!(!policy.is_retryable(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn status_policy_classifies_successful_responses() {
        let policy = http_status();
        assert!(matches!(
            RetryPolicy::<Status, HttpieError>::classify(&policy, Ok(Status(200))),
            Verdict::Accept(Status(200))
        ));
        assert!(matches!(
            RetryPolicy::<Status, HttpieError>::classify(&policy, Ok(Status(503))),
            Verdict::Retry
        ));
        match RetryPolicy::<Status, HttpieError>::classify(&policy, Ok(Status(404))) {
            Verdict::Reject(error) => {
                assert!(error.is_http_error());
                assert_eq!(error.to_string(), "Not Found");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn status_policy_classifies_errors() {
        let policy = http_status();
        assert!(matches!(
            RetryPolicy::<Status, HttpieError>::classify(&policy, Err(http_error(500))),
            Verdict::Retry
        ));
        match RetryPolicy::<Status, HttpieError>::classify(&policy, Err(http_error(501))) {
            Verdict::Reject(error) => assert_eq!(error.to_string(), "Not Implemented"),
            other => panic!("unexpected verdict: {other:?}"),
        }
        let transport = HttpieError::ConcurrencyLimitClosed;
        assert!(matches!(
            RetryPolicy::<Status, HttpieError>::classify(&policy, Err(transport)),
            Verdict::Reject(HttpieError::ConcurrencyLimitClosed)
        ));
    }

    #[test]
    fn custom_codes_replace_or_extend_defaults() {
        let only = HttpStatusPolicy::new([501], false);
        assert!(only.is_retryable(StatusCode::NOT_IMPLEMENTED));
        assert!(!only.is_retryable(StatusCode::INTERNAL_SERVER_ERROR));

        let extended = HttpStatusPolicy::new([501], true);
        assert!(extended.is_retryable(StatusCode::NOT_IMPLEMENTED));
        assert!(extended.is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(extended.retryable_status_codes().len(), 14);
    }
}
