//! Async model loader
//!
//! Cache lookup, fetch, decode, optimize, cache store. At most one load per
//! cache key runs at a time: later callers for the same key join the
//! in-flight load and receive their own copy of its result.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use tracing_futures::Instrument;

use model_optimizer_core::{
    AssetFetcher, CacheKey, LoadProgress, LoadStage, LoadStatistics, OptimizationSettings,
    OptimizerError, PipelineConfig, Result, Scene, SceneDecoder,
};
use model_optimizer_processing::SceneOptimizer;

use crate::cache::CacheManager;
use crate::fetch::FileFetcher;
use crate::gltf_decoder::GltfDecoder;
use crate::monitor::PerformanceMonitor;

/// Callback receiving stage updates of a load
pub type ProgressCallback = Arc<dyn Fn(LoadProgress) + Send + Sync>;

type SharedLoad = Shared<BoxFuture<'static, Result<Scene>>>;

/// Pending load registered under a cache key
#[derive(Clone)]
struct InFlight {
    id: u64,
    load: SharedLoad,
}

type InFlightMap = Arc<Mutex<HashMap<CacheKey, InFlight>>>;

/// Drop `key` unless a newer load has been registered under it since
async fn release(in_flight: &InFlightMap, key: &CacheKey, id: u64) {
    let mut in_flight = in_flight.lock().await;
    if in_flight.get(key).is_some_and(|entry| entry.id == id) {
        in_flight.remove(key);
    }
}

enum LoadSource {
    Fetch(String),
    Decoded(Arc<Scene>),
}

fn report(progress: &Option<ProgressCallback>, stage: LoadStage, bytes_loaded: u64) {
    if let Some(callback) = progress {
        callback(LoadProgress::new(stage, bytes_loaded));
    }
}

/// Every fetch or decode failure is reported against the source URL
fn as_load_error(url: &str, error: OptimizerError) -> OptimizerError {
    match error {
        OptimizerError::Load { .. } | OptimizerError::Cancelled => error,
        other => OptimizerError::load(url, other.to_string()),
    }
}

#[derive(Clone)]
pub struct ModelLoader {
    fetcher: Arc<dyn AssetFetcher>,
    decoder: Arc<dyn SceneDecoder>,
    optimizer: Arc<SceneOptimizer>,
    cache: Arc<CacheManager>,
    statistics: Arc<LoadStatistics>,
    monitor: Arc<PerformanceMonitor>,
    in_flight: InFlightMap,
    next_load_id: Arc<AtomicU64>,
    config: PipelineConfig,
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ModelLoader {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        decoder: Arc<dyn SceneDecoder>,
        config: PipelineConfig,
    ) -> Self {
        let cache = Arc::new(CacheManager::new(config.cache_max_bytes));
        let statistics = Arc::new(LoadStatistics::new());
        let monitor = Arc::new(PerformanceMonitor::with_window(
            Arc::clone(&cache),
            Arc::clone(&statistics),
            config.metrics_window,
        ));
        Self {
            fetcher,
            decoder,
            optimizer: Arc::new(SceneOptimizer::new()),
            cache,
            statistics,
            monitor,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_load_id: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Filesystem fetcher and glTF decoder
    pub fn from_config(config: PipelineConfig) -> Self {
        let decoder = GltfDecoder::new().with_decoder_path(config.decoder_path.clone());
        Self::new(Arc::new(FileFetcher::new()), Arc::new(decoder), config)
    }

    pub fn with_optimizer(mut self, optimizer: SceneOptimizer) -> Self {
        self.optimizer = Arc::new(optimizer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn statistics(&self) -> &Arc<LoadStatistics> {
        &self.statistics
    }

    /// Load and optimize the model at `url`, serving from the cache unless
    /// `force_reload` is set
    #[instrument(skip(self, settings))]
    pub async fn load(
        &self,
        url: &str,
        settings: &OptimizationSettings,
        force_reload: bool,
    ) -> Result<Scene> {
        let key = settings.cache_key(url)?;
        self.load_keyed(key, LoadSource::Fetch(url.to_string()), *settings, force_reload, None)
            .await
    }

    /// Load with stage callbacks
    ///
    /// A cache hit or a joined in-flight load only reports [`LoadStage::Done`].
    pub async fn load_with_progress<F>(
        &self,
        url: &str,
        settings: &OptimizationSettings,
        progress_callback: F,
    ) -> Result<Scene>
    where
        F: Fn(LoadProgress) + Send + Sync + 'static,
    {
        let key = settings.cache_key(url)?;
        let progress: ProgressCallback = Arc::new(progress_callback);
        self.load_keyed(
            key,
            LoadSource::Fetch(url.to_string()),
            *settings,
            false,
            Some(progress),
        )
        .await
    }

    /// Optimize an already decoded scene, cached under `source` + settings
    ///
    /// `raw` is never modified; optimization runs on a copy.
    #[instrument(skip(self, raw, settings))]
    pub async fn optimize_scene(
        &self,
        source: &str,
        raw: Arc<Scene>,
        settings: &OptimizationSettings,
    ) -> Result<Scene> {
        let key = settings.cache_key(source)?;
        self.load_keyed(key, LoadSource::Decoded(raw), *settings, false, None)
            .await
    }

    /// Warm the cache for `urls`, at most `max_concurrent_loads` at a time
    ///
    /// Yields one outcome per URL in completion order.
    pub fn preload(
        &self,
        urls: Vec<String>,
        settings: OptimizationSettings,
    ) -> impl Stream<Item = (String, Result<()>)> + Send + 'static {
        let loader = self.clone();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_loads.max(1)));

        async_stream::stream! {
            let mut join_set = JoinSet::new();
            let mut task_urls = HashMap::new();

            for url in urls {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let loader = loader.clone();
                let task_url = url.clone();

                let handle = join_set.spawn(async move {
                    let _permit = permit;
                    loader.load(&url, &settings, false).await.map(|_| ())
                });
                task_urls.insert(handle.id(), task_url);
            }

            while let Some(joined) = join_set.join_next_with_id().await {
                let (id, result) = match joined {
                    Ok((id, result)) => (id, result),
                    Err(e) => (e.id(), Err(OptimizerError::from(e))),
                };
                let url = task_urls.remove(&id).unwrap_or_default();
                yield (url, result);
            }
        }
    }

    async fn load_keyed(
        &self,
        key: CacheKey,
        source: LoadSource,
        settings: OptimizationSettings,
        force_reload: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<Scene> {
        let pending = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(pending) => {
                    debug!("Joining in-flight load of {}", key);
                    self.statistics.record_coalesced();
                    pending.load.clone()
                }
                None => {
                    if !force_reload {
                        if let Some(scene) = self.cache.get(&key).await {
                            debug!("Cache hit for {}", key);
                            self.statistics.record_cache_hit();
                            report(&progress, LoadStage::Done, 0);
                            return Ok(scene);
                        }
                    }
                    self.statistics.record_cache_miss();
                    let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);

                    // The task owns the work so it completes even if every waiter goes away
                    let task = tokio::spawn(
                        self.clone()
                            .run(key.clone(), id, source, settings, progress.clone())
                            .in_current_span(),
                    );
                    // A panicked task never reaches its own release
                    let registry = Arc::clone(&self.in_flight);
                    let task_key = key.clone();
                    let pending = async move {
                        let result = task.await.unwrap_or_else(|e| Err(e.into()));
                        release(&registry, &task_key, id).await;
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(
                        key.clone(),
                        InFlight {
                            id,
                            load: pending.clone(),
                        },
                    );
                    pending
                }
            }
        };

        let scene = pending.await?;
        report(&progress, LoadStage::Done, 0);
        Ok(scene)
    }

    async fn run(
        self,
        key: CacheKey,
        id: u64,
        source: LoadSource,
        settings: OptimizationSettings,
        progress: Option<ProgressCallback>,
    ) -> Result<Scene> {
        let start = Instant::now();
        let result = self.produce(source, settings, &progress).await;

        match &result {
            Ok(scene) => {
                report(&progress, LoadStage::Caching, 0);
                self.cache.set(key.clone(), scene, true).await;
                self.monitor.record_load_duration(start.elapsed());
                self.monitor
                    .record_memory_usage(self.cache.stats().await.current_size);
                info!("Loaded {} in {:?}", key, start.elapsed());
            }
            Err(e) => {
                self.statistics.record_failure();
                warn!("Load of {} failed: {}", key, e);
            }
        }

        release(&self.in_flight, &key, id).await;
        result
    }

    async fn produce(
        &self,
        source: LoadSource,
        settings: OptimizationSettings,
        progress: &Option<ProgressCallback>,
    ) -> Result<Scene> {
        let mut bytes_loaded = 0;
        let raw = match source {
            LoadSource::Fetch(url) => {
                report(progress, LoadStage::Fetching, 0);
                let bytes = self
                    .fetcher
                    .fetch(&url)
                    .await
                    .map_err(|e| as_load_error(&url, e))?;
                self.statistics.record_fetch();
                bytes_loaded = bytes.len() as u64;

                report(progress, LoadStage::Decoding, bytes_loaded);
                let decoder = Arc::clone(&self.decoder);
                let decode_start = Instant::now();
                let scene = tokio::task::spawn_blocking(move || {
                    decoder
                        .decode(&bytes, &url)
                        .map_err(|e| as_load_error(&url, e))
                })
                .await??;
                self.statistics.record_decode();
                debug!("Decoded in {:?}", decode_start.elapsed());
                scene
            }
            LoadSource::Decoded(scene) => Arc::unwrap_or_clone(scene),
        };

        report(progress, LoadStage::Optimizing, bytes_loaded);
        let optimizer = Arc::clone(&self.optimizer);
        tokio::task::spawn_blocking(move || {
            let mut scene = raw;
            optimizer.optimize(&mut scene, &settings)?;
            Ok::<_, OptimizerError>(scene)
        })
        .await?
    }
}
