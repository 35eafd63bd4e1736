//! Cache-backed stream resolution with ordered fallback strategies.
//!
//! Concurrent requests for the same uncached key share one in-flight
//! resolution. The cache is only written once a strategy produced a valid
//! URL, so an abandoned or failed resolution never leaves anything behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stream_extractor::{
    FormatClass, IdentityPool, ResolveRequest, ResolverBackend, Strategy, default_strategies,
    validate_stream_url,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;

/// Default bound on a single backend invocation.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(15);

/// Identifies one cache slot and one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub stream_id: String,
    pub format: FormatClass,
}

impl ResolutionKey {
    pub fn new(stream_id: impl Into<String>, format: FormatClass) -> Self {
        Self {
            stream_id: stream_id.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("all {attempts} strategies failed for stream {stream_id} ({format})")]
    Exhausted {
        stream_id: String,
        format: FormatClass,
        attempts: usize,
    },
}

/// Cache of resolved upstream URLs.
pub type UrlCache = TtlCache<ResolutionKey, String>;

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub hls_strategies: Vec<Strategy>,
    pub progressive_strategies: Vec<Strategy>,
    pub strategy_timeout: Duration,
}

impl ResolverOptions {
    /// Built-in strategy chains using identities from `identities`.
    pub fn defaults(identities: &IdentityPool) -> Self {
        Self {
            hls_strategies: default_strategies(FormatClass::Hls, identities),
            progressive_strategies: default_strategies(FormatClass::Progressive, identities),
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }

    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub fn strategies(&self, format: FormatClass) -> &[Strategy] {
        match format {
            FormatClass::Hls => &self.hls_strategies,
            FormatClass::Progressive => &self.progressive_strategies,
        }
    }
}

type InFlight = Arc<OnceCell<Result<String, ResolveError>>>;

/// A shared resolution and the number of callers currently awaiting it.
struct Flight {
    cell: InFlight,
    waiters: usize,
}

/// Leaves the in-flight map when its caller finishes or is dropped.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<ResolutionKey, Flight>>,
    key: &'a ResolutionKey,
    cell: &'a InFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        let Some(flight) = in_flight.get_mut(self.key) else {
            return;
        };
        if !Arc::ptr_eq(&flight.cell, self.cell) {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        // A finished flight must not serve its result to later callers, and
        // an unfinished one with nobody waiting would never be collected.
        if flight.waiters == 0 || flight.cell.initialized() {
            in_flight.remove(self.key);
        }
    }
}

pub struct Resolver {
    backend: Arc<dyn ResolverBackend>,
    cache: Arc<UrlCache>,
    options: ResolverOptions,
    in_flight: Mutex<HashMap<ResolutionKey, Flight>>,
}

impl Resolver {
    pub fn new(
        backend: Arc<dyn ResolverBackend>,
        cache: Arc<UrlCache>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            backend,
            cache,
            options,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<UrlCache> {
        &self.cache
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Resolve `stream_id` to a live URL of the requested format.
    pub async fn resolve(&self, stream_id: &str, format: FormatClass) -> Result<String, ResolveError> {
        let key = ResolutionKey::new(stream_id, format);
        if let Some(url) = self.cache.get(&key) {
            debug!(stream_id, %format, "Resolution cache hit");
            return Ok(url);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock();
            let flight = in_flight.entry(key.clone()).or_insert_with(|| Flight {
                cell: InFlight::default(),
                waiters: 0,
            });
            flight.waiters += 1;
            flight.cell.clone()
        };
        let _guard = FlightGuard {
            in_flight: &self.in_flight,
            key: &key,
            cell: &cell,
        };

        // If the caller driving the initialization is dropped, the next waiter
        // picks it up.
        cell.get_or_init(|| self.resolve_uncached(&key))
            .await
            .clone()
    }

    /// Forget a cached URL, e.g. after the upstream rejected it.
    pub fn invalidate(&self, stream_id: &str, format: FormatClass) {
        if self
            .cache
            .remove(&ResolutionKey::new(stream_id, format))
            .is_some()
        {
            debug!(stream_id, %format, "Invalidated cached resolution");
        }
    }

    /// Number of resolutions currently being computed.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    async fn resolve_uncached(&self, key: &ResolutionKey) -> Result<String, ResolveError> {
        // Another flight may have finished between our cache check and now.
        if let Some(url) = self.cache.get(key) {
            return Ok(url);
        }

        let strategies = self.options.strategies(key.format);
        let timeout = self.options.strategy_timeout;

        for strategy in strategies {
            let request = ResolveRequest {
                stream_id: &key.stream_id,
                format: key.format,
                strategy,
                timeout,
            };

            match tokio::time::timeout(timeout, self.backend.invoke(&request)).await {
                Ok(Ok(candidate)) => match validate_stream_url(&candidate) {
                    Ok(url) => {
                        info!(
                            stream_id = %key.stream_id,
                            format = %key.format,
                            strategy = %strategy.name,
                            backend = self.backend.name(),
                            "Resolved stream"
                        );
                        self.cache.set(key.clone(), url.clone());
                        return Ok(url);
                    }
                    Err(error) => warn!(
                        stream_id = %key.stream_id,
                        strategy = %strategy.name,
                        error = %error,
                        "Strategy returned an unusable URL"
                    ),
                },
                Ok(Err(error)) => warn!(
                    stream_id = %key.stream_id,
                    strategy = %strategy.name,
                    error = %error,
                    "Strategy failed"
                ),
                Err(_) => warn!(
                    stream_id = %key.stream_id,
                    strategy = %strategy.name,
                    timeout_secs = timeout.as_secs_f64(),
                    "Strategy timed out"
                ),
            }
        }

        Err(ResolveError::Exhausted {
            stream_id: key.stream_id.clone(),
            format: key.format,
            attempts: strategies.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stream_extractor::ExtractorError;

    #[derive(Clone)]
    enum Behavior {
        Fail,
        Garbage,
        Hang,
        Slow(Duration, &'static str),
        Url(&'static str),
    }

    /// Backend whose outcome is scripted per strategy name.
    struct ScriptedBackend {
        script: HashMap<String, Behavior>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                script: script
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResolverBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, request: &ResolveRequest<'_>) -> Result<String, ExtractorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(&request.strategy.name) {
                Some(Behavior::Url(url)) => Ok(url.to_string()),
                Some(Behavior::Garbage) => Ok("WARNING: something odd".to_string()),
                Some(Behavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("http://never/".to_string())
                }
                Some(Behavior::Slow(delay, url)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(url.to_string())
                }
                Some(Behavior::Fail) | None => Err(ExtractorError::Other("scripted".into())),
            }
        }
    }

    fn options(timeout: Duration) -> ResolverOptions {
        ResolverOptions {
            hls_strategies: vec![
                Strategy::new("first", "a", None),
                Strategy::new("second", "b", None),
            ],
            progressive_strategies: vec![Strategy::new("mp4", "c", None)],
            strategy_timeout: timeout,
        }
    }

    fn resolver(backend: Arc<ScriptedBackend>, cache: Arc<UrlCache>) -> Resolver {
        Resolver::new(backend, cache, options(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn falls_back_and_caches_first_success() {
        let backend = ScriptedBackend::new(&[
            ("first", Behavior::Fail),
            ("second", Behavior::Url("http://upstream/ok.m3u8")),
        ]);
        let resolver = resolver(backend.clone(), Arc::new(UrlCache::new()));

        let url = resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(url, "http://upstream/ok.m3u8");
        assert_eq!(backend.calls(), 2);

        let again = resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(again, url);
        assert_eq!(backend.calls(), 2, "cache hit must not invoke the backend");
    }

    #[tokio::test]
    async fn exhausted_strategies_are_not_cached() {
        let backend = ScriptedBackend::new(&[("first", Behavior::Fail), ("second", Behavior::Garbage)]);
        let cache = Arc::new(UrlCache::new());
        let resolver = resolver(backend.clone(), cache.clone());

        let err = resolver.resolve("x", FormatClass::Hls).await.unwrap_err();
        assert_eq!(
            err,
            ResolveError::Exhausted {
                stream_id: "x".into(),
                format: FormatClass::Hls,
                attempts: 2
            }
        );
        assert!(cache.is_empty());

        // A failure is retried on the next request.
        let _ = resolver.resolve("x", FormatClass::Hls).await;
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn timed_out_strategy_moves_on() {
        let backend = ScriptedBackend::new(&[
            ("first", Behavior::Hang),
            ("second", Behavior::Url("https://upstream/b.m3u8")),
        ]);
        let resolver = Resolver::new(
            backend.clone(),
            Arc::new(UrlCache::new()),
            options(Duration::from_millis(50)),
        );

        let url = resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(url, "https://upstream/b.m3u8");
    }

    #[tokio::test]
    async fn formats_are_cached_independently() {
        let backend = ScriptedBackend::new(&[
            ("first", Behavior::Url("https://upstream/x.m3u8")),
            ("mp4", Behavior::Url("https://upstream/x.mp4")),
        ]);
        let resolver = resolver(backend.clone(), Arc::new(UrlCache::new()));

        assert_eq!(
            resolver.resolve("x", FormatClass::Hls).await.unwrap(),
            "https://upstream/x.m3u8"
        );
        assert_eq!(
            resolver.resolve("x", FormatClass::Progressive).await.unwrap(),
            "https://upstream/x.mp4"
        );
        assert_eq!(resolver.cache().len(), 2);
    }

    #[tokio::test]
    async fn expired_entry_triggers_fresh_resolution() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(UrlCache::with_clock(Duration::from_secs(280), clock.clone()));
        let backend = ScriptedBackend::new(&[("first", Behavior::Url("https://upstream/a.m3u8"))]);
        let resolver = resolver(backend.clone(), cache);

        resolver.resolve("x", FormatClass::Hls).await.unwrap();
        clock.advance(Duration::from_secs(279));
        resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(backend.calls(), 1);

        clock.advance(Duration::from_secs(1));
        resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_re_resolution() {
        let backend = ScriptedBackend::new(&[("first", Behavior::Url("https://upstream/a.m3u8"))]);
        let resolver = resolver(backend.clone(), Arc::new(UrlCache::new()));

        resolver.resolve("x", FormatClass::Hls).await.unwrap();
        resolver.invalidate("x", FormatClass::Hls);
        resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_resolution() {
        let backend = ScriptedBackend::new(&[(
            "first",
            Behavior::Slow(Duration::from_millis(100), "https://upstream/shared.m3u8"),
        )]);
        let resolver = Arc::new(resolver(backend.clone(), Arc::new(UrlCache::new())));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve("popular", FormatClass::Hls).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "https://upstream/shared.m3u8");
        }
        assert_eq!(backend.calls(), 1);
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_resolution_leaves_cache_untouched() {
        let backend = ScriptedBackend::new(&[(
            "first",
            Behavior::Slow(Duration::from_millis(200), "https://upstream/late.m3u8"),
        )]);
        let cache = Arc::new(UrlCache::new());
        let resolver = resolver(backend.clone(), cache.clone());

        // Simulate a client disconnect by dropping the request future early.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            resolver.resolve("x", FormatClass::Hls),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(cache.is_empty());
        assert_eq!(resolver.in_flight_count(), 0);

        // The next caller takes over and completes.
        let url = resolver.resolve("x", FormatClass::Hls).await.unwrap();
        assert_eq!(url, "https://upstream/late.m3u8");
        assert_eq!(cache.len(), 1);
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_callers_do_not_accumulate_in_flight() {
        let backend = ScriptedBackend::new(&[(
            "first",
            Behavior::Slow(Duration::from_millis(500), "https://upstream/slow.m3u8"),
        )]);
        let resolver = resolver(backend, Arc::new(UrlCache::new()));

        for i in 0..20 {
            let id = format!("id-{i}");
            let cut_short =
                tokio::time::timeout(Duration::from_millis(5), resolver.resolve(&id, FormatClass::Hls))
                    .await;
            assert!(cut_short.is_err());
        }
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn waiter_keeps_flight_alive_after_leader_is_cancelled() {
        let backend = ScriptedBackend::new(&[(
            "first",
            Behavior::Slow(Duration::from_millis(100), "https://upstream/shared.m3u8"),
        )]);
        let resolver = Arc::new(resolver(backend.clone(), Arc::new(UrlCache::new())));

        let leader = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("x", FormatClass::Hls).await })
        };
        let follower = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("x", FormatClass::Hls).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.in_flight_count(), 1);
        leader.abort();
        let _ = leader.await;
        assert_eq!(resolver.in_flight_count(), 1);

        assert_eq!(
            follower.await.unwrap().unwrap(),
            "https://upstream/shared.m3u8"
        );
        assert_eq!(resolver.in_flight_count(), 0);
    }
}
