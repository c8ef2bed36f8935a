//! Optimization orchestration
//!
//! One [`OptimizationHook`] drives one displayed model through
//! `Idle -> Loading -> Ready | Failed`. State is published on a `watch`
//! channel. Only one optimization runs per hook; triggers arriving while
//! loading are coalesced into a single follow-up run with the latest
//! settings. While loading, the previous result stays readable.
//!
//! Triggering methods spawn onto the current Tokio runtime.

use futures::future::{AbortHandle, Aborted, abortable};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use model_optimizer_core::{OptimizationSettings, OptimizerError, Result, Scene, Tier};
use model_optimizer_processing::{SceneInspector, SceneStats};

use crate::loader::ModelLoader;

/// Result exposed once optimization completes
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedModel {
    pub scene: Arc<Scene>,
    pub stats: SceneStats,
    pub is_optimized: bool,
    /// Compression tier the scene was optimized with
    pub optimization_level: Tier,
    pub settings: OptimizationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookState {
    Idle,
    Loading {
        /// Last ready result, shown until the new one replaces it
        previous: Option<Arc<OptimizedModel>>,
    },
    Ready(Arc<OptimizedModel>),
    Failed(OptimizerError),
}

impl HookState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Result to display: the ready model, or the previous one while loading
    pub fn model(&self) -> Option<&Arc<OptimizedModel>> {
        match self {
            Self::Ready(model) => Some(model),
            Self::Loading { previous } => previous.as_ref(),
            Self::Idle | Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&OptimizerError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum ModelSource {
    /// Fetched and decoded by the loader
    Url(String),
    /// Supplied already decoded by an upstream scene loader
    Raw { name: String, scene: Arc<Scene> },
}

#[derive(Debug)]
struct Control {
    source: Option<ModelSource>,
    settings: OptimizationSettings,
    running: bool,
    /// A trigger arrived while running
    pending: bool,
    abort: Option<AbortHandle>,
    /// Bumped on every start and on dispose; stale completions are dropped
    epoch: u64,
}

struct HookInner {
    loader: ModelLoader,
    state: watch::Sender<HookState>,
    busy: watch::Sender<bool>,
    control: Mutex<Control>,
}

impl HookInner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trigger(self: &Arc<Self>) {
        let mut control = self.control();
        if control.source.is_none() {
            return;
        }
        if control.running {
            debug!("Optimization in flight, coalescing trigger");
            control.pending = true;
            return;
        }
        self.start(&mut control);
    }

    fn start(self: &Arc<Self>, control: &mut Control) {
        let Some(source) = control.source.clone() else {
            control.running = false;
            self.busy.send_replace(false);
            return;
        };
        let settings = control.settings;

        control.running = true;
        control.pending = false;
        control.epoch += 1;
        let epoch = control.epoch;

        self.busy.send_replace(true);
        self.state.send_modify(|state| {
            let previous = state.model().cloned();
            *state = HookState::Loading { previous };
        });
        debug!("Hook entered Loading (epoch {})", epoch);

        let (work, abort) = abortable(optimize(self.loader.clone(), source, settings));
        control.abort = Some(abort);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = work.await;
            inner.finish(epoch, outcome);
        });
    }

    fn finish(
        self: &Arc<Self>,
        epoch: u64,
        outcome: std::result::Result<Result<OptimizedModel>, Aborted>,
    ) {
        let mut control = self.control();
        if control.epoch != epoch {
            return;
        }
        let Ok(result) = outcome else {
            return;
        };
        control.abort = None;

        match result {
            Ok(model) => {
                info!(
                    "Hook ready: {} triangles, {} complexity",
                    model.stats.triangles, model.stats.complexity
                );
                self.state.send_replace(HookState::Ready(Arc::new(model)));
            }
            Err(error) => {
                warn!("Hook optimization failed: {}", error);
                self.state.send_replace(HookState::Failed(error));
            }
        }

        if control.pending {
            self.start(&mut control);
        } else {
            control.running = false;
            self.busy.send_replace(false);
        }
    }
}

async fn optimize(
    loader: ModelLoader,
    source: ModelSource,
    settings: OptimizationSettings,
) -> Result<OptimizedModel> {
    let scene = match source {
        ModelSource::Url(url) => loader.load(&url, &settings, false).await?,
        ModelSource::Raw { name, scene } => loader.optimize_scene(&name, scene, &settings).await?,
    };
    let stats = SceneInspector::new().inspect(&scene);
    Ok(OptimizedModel {
        scene: Arc::new(scene),
        stats,
        is_optimized: true,
        optimization_level: settings.compression_level,
        settings,
    })
}

/// Per-view coordinator of loading and optimization
pub struct OptimizationHook {
    inner: Arc<HookInner>,
}

impl std::fmt::Debug for OptimizationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("OptimizationHook")
            .field("state", &state)
            .field("control", &*self.inner.control())
            .finish()
    }
}

impl OptimizationHook {
    pub fn new(loader: ModelLoader, settings: OptimizationSettings) -> Self {
        let (state, _) = watch::channel(HookState::Idle);
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::new(HookInner {
                loader,
                state,
                busy,
                control: Mutex::new(Control {
                    source: None,
                    settings,
                    running: false,
                    pending: false,
                    abort: None,
                    epoch: 0,
                }),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HookState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> HookState {
        self.inner.state.borrow().clone()
    }

    pub fn settings(&self) -> OptimizationSettings {
        self.inner.control().settings
    }

    /// A raw scene became available from an upstream loader
    pub fn on_scene_available(&self, name: impl Into<String>, scene: Scene) {
        self.inner.control().source = Some(ModelSource::Raw {
            name: name.into(),
            scene: Arc::new(scene),
        });
        self.inner.trigger();
    }

    /// Load `url` through the model loader
    pub fn load(&self, url: impl Into<String>) {
        self.inner.control().source = Some(ModelSource::Url(url.into()));
        self.inner.trigger();
    }

    /// Run again with the last-seen source and current settings
    pub fn reoptimize(&self) -> Result<()> {
        if self.inner.control().source.is_none() {
            return Err(OptimizerError::validation(
                "source",
                "no scene has been supplied to reoptimize",
            ));
        }
        self.inner.trigger();
        Ok(())
    }

    /// Replace the settings; re-runs when a source is known
    pub fn update_settings(&self, settings: OptimizationSettings) {
        let changed = {
            let mut control = self.inner.control();
            let changed = control.settings != settings;
            control.settings = settings;
            changed
        };
        if changed {
            self.inner.trigger();
        }
    }

    /// Wait until no optimization is running or queued and return the state
    pub async fn settled(&self) -> HookState {
        let mut busy = self.inner.busy.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = busy.wait_for(|busy| !*busy).await;
        self.state()
    }

    /// Stop waiting for in-flight work and return to `Idle`
    ///
    /// A shared load already running in the loader still completes and
    /// populates the cache.
    pub fn dispose(&self) {
        let mut control = self.inner.control();
        if let Some(abort) = control.abort.take() {
            abort.abort();
        }
        control.epoch += 1;
        control.running = false;
        control.pending = false;
        control.source = None;
        self.inner.state.send_replace(HookState::Idle);
        self.inner.busy.send_replace(false);
        debug!("Hook disposed");
    }
}

impl Drop for OptimizationHook {
    fn drop(&mut self) {
        if let Some(abort) = self.inner.control().abort.take() {
            abort.abort();
        }
    }
}
