//! `httpie` is an ergonomic HTTP client layer: it maps logical requests onto
//! agents and dispatchers, decodes response bodies and retries fallible calls.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use httpie::prelude::{
//!     Client, CustomAgent, HyperDispatcher, RequestOptions, RetryOptions, policies,
//!     retry_with_policy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .agent(CustomAgent::new(
//!             "windev",
//!             "https://ws.dev.example.com",
//!             Arc::new(HyperDispatcher::new()?),
//!         )?)
//!         .try_build()?;
//!
//!     let options = RetryOptions::new()
//!         .retries(3)
//!         .min_timeout(Duration::from_millis(200));
//!     let uptime = retry_with_policy(
//!         |_| client.get("/windev/ws_monitoring", RequestOptions::new()),
//!         &options,
//!         &policies::http_status(),
//!     )
//!     .await?;
//!
//!     println!("attempt={} data={:?}", uptime.metrics.attempt, uptime.data.data());
//!     Ok(())
//! }
//! ```

mod agents;
#[cfg(feature = "transport-rustls-ring")]
mod body;
mod cache;
mod charset;
mod client;
mod content_encoding;
mod decode;
mod dispatcher;
mod error;
mod extensions;
mod limiters;
pub mod policies;
mod request;
mod response;
mod retry;
#[cfg(feature = "transport-rustls-ring")]
mod transport;
mod util;

pub use crate::agents::{
    AgentRegistry, CustomAgent, RequestTarget, ResolutionCache, ResolvedTarget, Resolver,
    match_path_prefix,
};
pub use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, TimedLruCache};
pub use crate::charset::Charset;
pub use crate::client::{Client, ClientBuilder};
pub use crate::decode::{
    DEFAULT_MAX_BODY_BYTES, DecodeMode, ResponseData, ResponseDecoder, ResponseEnvelope,
};
pub use crate::dispatcher::{
    BodyStream, DispatchBody, DispatchRequest, Dispatcher, MockDispatcher, MockReply, RawResponse,
    RecordedRequest,
};
pub use crate::error::{BoxError, HttpieError, HttpieErrorCode};
pub use crate::extensions::{Clock, ManualClock, SystemClock};
pub use crate::limiters::{ConcurrencyLimiter, LimiterPermit, SemaphoreLimiter};
pub use crate::policies::{
    DefaultPolicy, HttpFailure, HttpOutcome, HttpStatusPolicy, RetryPolicy, Verdict,
};
pub use crate::request::{DEFAULT_USER_AGENT, RequestBody, RequestOptions, authorization_value};
pub use crate::response::{RequestResponse, ResponseStream};
pub use crate::retry::{
    AttemptContext, Retried, RetryError, RetryMetrics, RetryOptions, retry, retry_with_policy,
};
#[cfg(feature = "transport-rustls-ring")]
pub use crate::transport::{HyperDispatcher, HyperDispatcherBuilder};

pub type HttpieResult<T> = std::result::Result<T, HttpieError>;

pub mod prelude {
    #[cfg(feature = "transport-rustls-ring")]
    pub use crate::{HyperDispatcher, HyperDispatcherBuilder};
    pub use crate::{
        AgentRegistry, Client, ClientBuilder, CustomAgent, DecodeMode, Dispatcher, HttpStatusPolicy,
        HttpieError, HttpieErrorCode, HttpieResult, MockDispatcher, MockReply, RequestOptions,
        RequestResponse, ResponseData, ResponseDecoder, Resolver, Retried, RetryError,
        RetryOptions, SemaphoreLimiter, Verdict, policies, retry, retry_with_policy,
    };
}

#[cfg(test)]
mod tests;
