use std::sync::{Arc, RwLock};
use std::time::Duration;

use http::Method;
use tracing::debug;
use url::Url;

use crate::HttpieResult;
use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, TimedLruCache};
use crate::dispatcher::Dispatcher;
use crate::error::HttpieError;
use crate::extensions::Clock;
use crate::limiters::ConcurrencyLimiter;
use crate::util::{read_unpoisoned, redact_uri_for_logs, write_unpoisoned};

/// An origin reachable through a dedicated dispatcher, addressable by a
/// short path prefix such as `"windev/ws_monitoring"`.
#[derive(Clone)]
pub struct CustomAgent {
    path_prefix: String,
    origin: Url,
    dispatcher: Arc<dyn Dispatcher>,
    limiter: Option<Arc<dyn ConcurrencyLimiter>>,
}

impl CustomAgent {
    pub fn new(
        path_prefix: impl Into<String>,
        origin: &str,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> HttpieResult<Self> {
        let origin = Url::parse(origin).map_err(|_| HttpieError::InvalidUri {
            uri: origin.to_owned(),
        })?;
        Ok(Self {
            path_prefix: path_prefix.into(),
            origin,
            dispatcher,
            limiter: None,
        })
    }

    pub fn limiter(mut self, limiter: Arc<dyn ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn concurrency_limiter(&self) -> Option<&Arc<dyn ConcurrencyLimiter>> {
        self.limiter.as_ref()
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.path_prefix == other.path_prefix && self.origin == other.origin
    }
}

impl std::fmt::Debug for CustomAgent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CustomAgent")
            .field("path_prefix", &self.path_prefix)
            .field("origin", &self.origin.as_str())
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

/// Returns the URL `uri` points to when it starts with the agent prefix.
///
/// Both `"/prefix/rest"` and `"prefix/rest"` match; the remainder is joined
/// onto the agent origin.
pub fn match_path_prefix(uri: &str, agent: &CustomAgent) -> Option<Url> {
    let remainder = match uri.strip_prefix('/') {
        Some(rest) => rest.strip_prefix(agent.path_prefix.as_str())?,
        None => uri.strip_prefix(agent.path_prefix.as_str())?,
    };
    agent.origin.join(remainder).ok()
}

/// Agents known to a client, in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<Vec<Arc<CustomAgent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `agent` unless one with the same prefix and origin is present.
    pub fn register(&self, agent: CustomAgent) -> bool {
        let mut agents = write_unpoisoned(&self.agents);
        if agents.iter().any(|known| known.same_identity(&agent)) {
            return false;
        }
        agents.push(Arc::new(agent));
        true
    }

    pub fn agents(&self) -> Vec<Arc<CustomAgent>> {
        read_unpoisoned(&self.agents).clone()
    }

    pub fn len(&self) -> usize {
        read_unpoisoned(&self.agents).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn match_prefix(&self, uri: &str) -> Option<(Url, Arc<CustomAgent>)> {
        read_unpoisoned(&self.agents).iter().find_map(|agent| {
            match_path_prefix(uri, agent).map(|url| (url, Arc::clone(agent)))
        })
    }

    pub fn resolve_by_hostname(&self, url: &Url) -> Option<Arc<CustomAgent>> {
        let hostname = url.host_str()?;
        read_unpoisoned(&self.agents)
            .iter()
            .find(|agent| agent.origin.host_str() == Some(hostname))
            .cloned()
    }
}

/// Concrete destination of a logical request.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub url: Url,
    pub dispatcher: Option<Arc<dyn Dispatcher>>,
    pub limiter: Option<Arc<dyn ConcurrencyLimiter>>,
}

impl ResolvedTarget {
    fn new(url: Url, agent: Option<&CustomAgent>) -> Self {
        Self {
            url,
            dispatcher: agent.map(|agent| Arc::clone(&agent.dispatcher)),
            limiter: agent.and_then(|agent| agent.limiter.clone()),
        }
    }
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResolvedTarget")
            .field("url", &self.url.as_str())
            .field("dispatcher", &self.dispatcher.is_some())
            .field("limiter", &self.limiter.is_some())
            .finish()
    }
}

/// A request target: either a raw string (bare path or absolute URL) or an
/// already parsed URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestTarget {
    Raw(String),
    Url(Url),
}

impl std::fmt::Display for RequestTarget {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw(raw) => formatter.write_str(raw),
            Self::Url(url) => formatter.write_str(url.as_str()),
        }
    }
}

impl From<&str> for RequestTarget {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_owned())
    }
}

impl From<String> for RequestTarget {
    fn from(value: String) -> Self {
        Self::Raw(value)
    }
}

impl From<&String> for RequestTarget {
    fn from(value: &String) -> Self {
        Self::Raw(value.clone())
    }
}

impl From<Url> for RequestTarget {
    fn from(value: Url) -> Self {
        Self::Url(value)
    }
}

impl From<&Url> for RequestTarget {
    fn from(value: &Url) -> Self {
        Self::Url(value.clone())
    }
}

pub type ResolutionCache = TimedLruCache<Arc<ResolvedTarget>>;

pub(crate) fn cache_key(method: &Method, target: &RequestTarget) -> String {
    format!("{}{target}", method.as_str().to_ascii_uppercase())
}

/// Maps `(method, target)` pairs onto resolved targets through the agent
/// registry, remembering the answers.
#[derive(Debug)]
pub struct Resolver {
    registry: Arc<AgentRegistry>,
    cache: ResolutionCache,
}

impl Resolver {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self::with_cache(
            registry,
            ResolutionCache::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL),
        )
    }

    pub fn with_cache(registry: Arc<AgentRegistry>, cache: ResolutionCache) -> Self {
        Self { registry, cache }
    }

    pub fn with_clock(registry: Arc<AgentRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self::with_cache(
            registry,
            ResolutionCache::with_clock(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, clock),
        )
    }

    pub fn with_capacity_and_ttl(
        registry: Arc<AgentRegistry>,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        Self::with_cache(registry, ResolutionCache::new(capacity, ttl))
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn resolve(
        &self,
        method: &Method,
        target: impl Into<RequestTarget>,
    ) -> HttpieResult<Arc<ResolvedTarget>> {
        let target = target.into();
        let key = cache_key(method, &target);
        if let Some(cached) = self.cache.get(&key) {
            debug!(uri = %redact_uri_for_logs(cached.url.as_str()), "resolution cache hit");
            return Ok(cached);
        }

        let resolved = match &target {
            RequestTarget::Raw(uri) => self.resolve_str(uri)?,
            RequestTarget::Url(url) => {
                let agent = self.registry.resolve_by_hostname(url);
                ResolvedTarget::new(url.clone(), agent.as_deref())
            }
        };
        debug!(
            uri = %redact_uri_for_logs(resolved.url.as_str()),
            dispatcher = resolved.dispatcher.is_some(),
            "resolution cache miss"
        );
        let resolved = Arc::new(resolved);
        self.cache.insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    pub fn resolve_str(&self, uri: &str) -> HttpieResult<ResolvedTarget> {
        if let Some((url, agent)) = self.registry.match_prefix(uri) {
            return Ok(ResolvedTarget::new(url, Some(&agent)));
        }

        let url = Url::parse(uri).map_err(|_| HttpieError::InvalidUri {
            uri: uri.to_owned(),
        })?;
        let agent = self.registry.resolve_by_hostname(&url);
        Ok(ResolvedTarget::new(url, agent.as_deref()))
    }
}
