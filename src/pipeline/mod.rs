//! Per-request render pipeline.
//!
//! A pipeline is created for every request whose component declares a
//! construction hook. The hook runs with the pipeline as its receiver: it
//! sets props, records hydration state, may report a cache hit, and requests
//! a render decision. After the hook completes and pending emissions settle,
//! the dispatcher freezes the decision and releases the pipeline.
//!
//! ```text
//! INIT → CONSTRUCTING → { FAILED | AWAITING_FLUSH } → DECIDED → RELEASED
//! ```

mod cache;
mod emissions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::SerializationError;
use crate::isolator::Isolator;
use crate::lock::mutex_lock;
use crate::render::{HydrationPayload, Props};
use crate::transport::Transport;

pub use cache::{CacheEntry, CacheHit, CacheHitFn, CacheWriter};
pub(crate) use cache::PendingCacheUpdate;
pub use emissions::{EmissionGuard, EmissionTracker};

const SOURCE: &str = "pipeline";

/// Terminal classification of whether a render should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    Needed,
    Abort,
    NoChange,
}

impl RenderDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Needed => "needed",
            Self::Abort => "abort",
            Self::NoChange => "no_change",
        }
    }
}

type Disposer = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PipelineState {
    props: Option<Props>,
    coordinator_state: Map<String, Value>,
    requested: Option<RenderDecision>,
    cache_key: Option<String>,
    disposers: Vec<Disposer>,
}

pub struct Pipeline {
    incoming: Option<HydrationPayload>,
    transport: Arc<Transport>,
    request_context: Option<Value>,
    locales: Vec<String>,
    root_isolator: Arc<Isolator>,
    cache_hit: CacheHitFn,
    cache_writer: Option<Arc<dyn CacheWriter>>,
    state: Mutex<PipelineState>,
    decision: OnceLock<RenderDecision>,
    emissions: EmissionTracker,
    released: AtomicBool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_context", &self.request_context)
            .field("locales", &self.locales)
            .field("decision", &self.decision.get())
            .field("pending_emissions", &self.emissions.pending())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub const RENDER_NEEDED: RenderDecision = RenderDecision::Needed;
    pub const RENDER_ABORT: RenderDecision = RenderDecision::Abort;
    pub const RENDER_NO_CHANGE: RenderDecision = RenderDecision::NoChange;

    /// Build a pipeline from the serialized context sent by the other side,
    /// the request transport, and the cache-hit callback for this request.
    pub fn new(
        incoming: Option<HydrationPayload>,
        transport: Arc<Transport>,
        isolated_config: Option<Value>,
        request_context: Option<Value>,
        locales: Vec<String>,
        cache_hit: CacheHitFn,
    ) -> Self {
        let state = PipelineState {
            props: incoming.as_ref().and_then(|payload| payload.props.clone()),
            coordinator_state: incoming
                .as_ref()
                .and_then(|payload| payload.coordinator_state.clone())
                .unwrap_or_default(),
            ..Default::default()
        };

        Self {
            incoming,
            transport,
            request_context,
            locales,
            root_isolator: Isolator::root(isolated_config),
            cache_hit,
            cache_writer: None,
            state: Mutex::new(state),
            decision: OnceLock::new(),
            emissions: EmissionTracker::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn with_cache_writer(mut self, writer: Arc<dyn CacheWriter>) -> Self {
        self.cache_writer = Some(writer);
        self
    }

    pub fn incoming_context(&self) -> Option<&HydrationPayload> {
        self.incoming.as_ref()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn request_context(&self) -> Option<&Value> {
        self.request_context.as_ref()
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn root_isolator(&self) -> &Arc<Isolator> {
        &self.root_isolator
    }

    // ========================================================================
    // Props and hydration state
    // ========================================================================

    pub fn props(&self) -> Option<Props> {
        mutex_lock(&self.state, SOURCE, "props").props.clone()
    }

    pub fn set_props(&self, props: Props) {
        mutex_lock(&self.state, SOURCE, "set_props").props = Some(props);
    }

    /// Union `props` into the current props; incoming keys win.
    pub fn merge_props(&self, props: Props) {
        let mut state = mutex_lock(&self.state, SOURCE, "merge_props");
        state.props.get_or_insert_with(Map::new).extend(props);
    }

    /// Record a value that must travel to the other side with the rendered markup.
    pub fn serialize_state(&self, key: impl Into<String>, value: Value) {
        mutex_lock(&self.state, SOURCE, "serialize_state")
            .coordinator_state
            .insert(key.into(), value);
    }

    pub fn coordinator_state(&self) -> Map<String, Value> {
        mutex_lock(&self.state, SOURCE, "coordinator_state")
            .coordinator_state
            .clone()
    }

    /// Serialize the full hydration payload: request context, props, and
    /// coordinator state.
    pub fn to_json(&self) -> Result<String, SerializationError> {
        let payload = {
            let state = mutex_lock(&self.state, SOURCE, "to_json");
            HydrationPayload {
                request_context: self.request_context.clone(),
                props: state.props.clone(),
                coordinator_state: Some(state.coordinator_state.clone()),
            }
        };

        serde_json::to_string(&payload).map_err(|err| {
            tracing::error!(error = %err, "cannot serialize pipeline context");
            SerializationError::from(err)
        })
    }

    // ========================================================================
    // Cache hand-off
    // ========================================================================

    /// Short-circuit the render with a cached result.
    pub fn cache_hit(&self, hit: CacheHit) {
        (self.cache_hit)(hit);
    }

    pub fn set_cache_key(&self, key: impl Into<String>) {
        mutex_lock(&self.state, SOURCE, "set_cache_key").cache_key = Some(key.into());
    }

    pub fn cache_key(&self) -> Option<String> {
        mutex_lock(&self.state, SOURCE, "cache_key").cache_key.clone()
    }

    pub(crate) fn pending_cache_update(
        self: &Arc<Self>,
        markup: &str,
    ) -> Option<PendingCacheUpdate> {
        let writer = self.cache_writer.as_ref()?;
        let key = self.cache_key()?;
        Some(PendingCacheUpdate::new(
            Arc::clone(writer),
            Arc::clone(self),
            key,
            markup.to_string(),
        ))
    }

    // ========================================================================
    // Render decision
    // ========================================================================

    /// Ask for a decision. Ignored once the decision has been frozen.
    pub fn request_decision(&self, decision: RenderDecision) {
        if let Some(frozen) = self.decision.get() {
            warn!(
                requested = decision.as_str(),
                frozen = frozen.as_str(),
                "render decision already taken; ignoring request"
            );
            return;
        }
        mutex_lock(&self.state, SOURCE, "request_decision").requested = Some(decision);
    }

    pub fn abort(&self) {
        self.request_decision(Self::RENDER_ABORT);
    }

    pub fn mark_unchanged(&self) {
        self.request_decision(Self::RENDER_NO_CHANGE);
    }

    /// Current decision: the frozen one if taken, otherwise the latest request.
    pub fn is_render_required(&self) -> RenderDecision {
        match self.decision.get() {
            Some(decision) => *decision,
            None => mutex_lock(&self.state, SOURCE, "is_render_required")
                .requested
                .unwrap_or(Self::RENDER_NEEDED),
        }
    }

    pub fn decision(&self) -> Option<RenderDecision> {
        self.decision.get().copied()
    }

    /// Freeze the decision. Later calls return the first result.
    pub(crate) fn decide(&self) -> RenderDecision {
        *self.decision.get_or_init(|| {
            mutex_lock(&self.state, SOURCE, "decide")
                .requested
                .unwrap_or(Self::RENDER_NEEDED)
        })
    }

    // ========================================================================
    // Emissions and flush
    // ========================================================================

    pub fn track_emission(&self) -> EmissionGuard {
        self.emissions.track()
    }

    pub fn pending_emissions(&self) -> usize {
        self.emissions.pending()
    }

    /// Yield one scheduler turn, then wait until every tracked emission settled.
    pub(crate) async fn flush(&self) {
        tokio::task::yield_now().await;
        self.emissions.settled().await;
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Register a resource to dispose when the pipeline is released.
    pub fn on_release(&self, disposer: impl FnOnce() + Send + 'static) {
        if self.is_released() {
            disposer();
            return;
        }
        mutex_lock(&self.state, SOURCE, "on_release")
            .disposers
            .push(Box::new(disposer));
    }

    /// Dispose every registered resource. Only the first call does anything.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            warn!("pipeline released more than once");
            return false;
        }

        let disposers = std::mem::take(
            &mut mutex_lock(&self.state, SOURCE, "release").disposers,
        );
        debug!(disposers = disposers.len(), "releasing pipeline");
        for dispose in disposers {
            dispose();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn pipeline_with(incoming: Option<HydrationPayload>) -> Pipeline {
        Pipeline::new(
            incoming,
            Arc::new(Transport::new()),
            Some(json!({ "theme": "dark" })),
            Some(json!({ "path": "/posts/1" })),
            vec!["en-US".to_string()],
            Box::new(|_| {}),
        )
    }

    #[test]
    fn seeds_props_and_state_from_incoming_context() {
        let incoming = HydrationPayload {
            request_context: None,
            props: Some(props(json!({ "id": 1 }))),
            coordinator_state: Some(props(json!({ "posts": [1, 2] }))),
        };
        let pipeline = pipeline_with(Some(incoming));

        assert_eq!(pipeline.props(), Some(props(json!({ "id": 1 }))));
        assert_eq!(pipeline.coordinator_state()["posts"], json!([1, 2]));
        assert_eq!(
            pipeline.root_isolator().isolated_config(),
            Some(&json!({ "theme": "dark" }))
        );
    }

    #[test]
    fn set_props_replaces_and_merge_props_unions() {
        let pipeline = pipeline_with(None);
        assert_eq!(pipeline.props(), None);

        pipeline.set_props(props(json!({ "a": 1, "b": 2 })));
        pipeline.merge_props(props(json!({ "b": 3, "c": 4 })));
        assert_eq!(pipeline.props(), Some(props(json!({ "a": 1, "b": 3, "c": 4 }))));

        pipeline.set_props(props(json!({ "z": 0 })));
        assert_eq!(pipeline.props(), Some(props(json!({ "z": 0 }))));
    }

    #[test]
    fn decision_defaults_to_needed_and_freezes_once_decided() {
        let pipeline = pipeline_with(None);
        assert_eq!(pipeline.is_render_required(), Pipeline::RENDER_NEEDED);
        assert_eq!(pipeline.decision(), None);

        pipeline.mark_unchanged();
        assert_eq!(pipeline.is_render_required(), Pipeline::RENDER_NO_CHANGE);

        assert_eq!(pipeline.decide(), Pipeline::RENDER_NO_CHANGE);
        pipeline.abort();
        assert_eq!(pipeline.decide(), Pipeline::RENDER_NO_CHANGE);
        assert_eq!(pipeline.is_render_required(), Pipeline::RENDER_NO_CHANGE);
        assert_eq!(pipeline.decision(), Some(RenderDecision::NoChange));
    }

    #[test]
    fn release_runs_disposers_exactly_once() {
        let pipeline = pipeline_with(None);
        let disposed = Arc::new(AtomicUsize::new(0));
        {
            let disposed = Arc::clone(&disposed);
            pipeline.on_release(move || {
                disposed.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(pipeline.release());
        assert!(!pipeline.release());
        assert!(pipeline.is_released());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);

        let late = Arc::clone(&disposed);
        pipeline.on_release(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn to_json_carries_full_hydration_state() {
        let pipeline = pipeline_with(None);
        pipeline.set_props(props(json!({ "id": 7 })));
        pipeline.serialize_state("post", json!({ "title": "Hello" }));

        let payload: Value =
            serde_json::from_str(&pipeline.to_json().expect("serializable")).expect("valid json");
        assert_eq!(
            payload,
            json!({
                "requestContext": { "path": "/posts/1" },
                "props": { "id": 7 },
                "coordinatorState": { "post": { "title": "Hello" } }
            })
        );
    }

    #[test]
    fn cache_hit_invokes_installed_callback() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let pipeline = {
            let hits = Arc::clone(&hits);
            Pipeline::new(
                None,
                Arc::new(Transport::new()),
                None,
                None,
                Vec::new(),
                Box::new(move |hit: CacheHit| hits.lock().unwrap().push(hit)),
            )
        };

        pipeline.cache_hit(CacheHit::new("<p>x</p>", "{}").with_head_tags(["t1"]));
        let hits = hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].head_tags, Some(vec!["t1".to_string()]));
    }

    #[tokio::test]
    async fn flush_waits_for_tracked_emissions() {
        let pipeline = Arc::new(pipeline_with(None));
        let guard = pipeline.track_emission();
        assert_eq!(pipeline.pending_emissions(), 1);

        let emitter = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                pipeline.serialize_state("late", json!(true));
                drop(guard);
            })
        };

        pipeline.flush().await;
        assert_eq!(pipeline.coordinator_state()["late"], json!(true));
        emitter.await.expect("emitter should not panic");
    }

    #[test]
    fn pending_cache_update_requires_writer_and_key() {
        let pipeline = Arc::new(pipeline_with(None));
        pipeline.set_cache_key("posts:1");
        assert!(pipeline.pending_cache_update("<p>x</p>").is_none());
    }
}
