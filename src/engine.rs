//! Engine assembly.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dgx_dom::DomBackend;
use dgx_scroll::{
    FrameScheduler, IntervalFrames, IntoViewScroller, KeyResolverFn, ScrollTelemetry,
    ScrollUntilRunner,
};
use dgx_selector::{
    MapWarning, ResolveOptions, ResolveResult, ResolverTelemetry, SelectorMap, SelectorResolver,
};
use dgx_telemetry::{HudQueue, HudSink, TelemetryLogger, TracingLogger};
use dgx_wait::{WaitTelemetry, Waiter};
use dgx_workflow::{
    run_workflow, Environment, HandlerRegistry, RecorderObserver, RunOptions, StepToolkit,
    TelemetryHub, TelemetryObserver, WorkflowDefinition, WorkflowRunOutcome,
};
use dgx_workflow::telemetry::HudObserver;

/// Builder for [`Engine`].
pub struct EngineBuilder {
    backend: Arc<dyn DomBackend>,
    map: SelectorMap,
    map_warnings: Vec<MapWarning>,
    logger: Arc<dyn TelemetryLogger>,
    hud: Option<Arc<dyn HudSink>>,
    frames: Arc<dyn FrameScheduler>,
    environment: Environment,
    observers: Vec<Arc<dyn TelemetryObserver>>,
}

impl EngineBuilder {
    pub fn new(backend: Arc<dyn DomBackend>) -> Self {
        Self {
            backend,
            map: SelectorMap::new(),
            map_warnings: Vec::new(),
            logger: Arc::new(TracingLogger),
            hud: None,
            frames: Arc::new(IntervalFrames::default()),
            environment: Environment::new(),
            observers: Vec::new(),
        }
    }

    pub fn selector_map(mut self, map: SelectorMap) -> Self {
        self.map = map;
        self
    }

    /// Load the selector map from its JSON export; warnings are kept for
    /// inspection on the built engine.
    pub fn selector_map_json(mut self, value: &Value) -> Self {
        let (map, warnings) = SelectorMap::from_json(value);
        self.map = map;
        self.map_warnings = warnings;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn TelemetryLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn hud(mut self, hud: Arc<dyn HudSink>) -> Self {
        self.hud = Some(hud);
        self
    }

    pub fn frame_scheduler(mut self, frames: Arc<dyn FrameScheduler>) -> Self {
        self.frames = frames;
        self
    }

    pub fn environment_map(mut self, map: HashMap<String, String>) -> Self {
        self.environment = Environment::with_explicit(map);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TelemetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Engine {
        let hud: Arc<dyn HudSink> = match self.hud {
            Some(hud) => hud,
            None => HudQueue::new(64),
        };
        let map = Arc::new(self.map);

        let resolver_telemetry =
            ResolverTelemetry::new(self.logger.clone()).with_hud(hud.clone());
        let resolver = Arc::new(SelectorResolver::new(
            self.backend.clone(),
            resolver_telemetry,
        ));

        // Scroll engines resolve logical keys through the same resolver.
        let key_resolver: KeyResolverFn = {
            let resolver = resolver.clone();
            let map = map.clone();
            Arc::new(move |key: &str| {
                resolver
                    .resolve(&map, key, &ResolveOptions::default())
                    .element
            })
        };

        let scroll_telemetry = Arc::new(ScrollTelemetry::new(self.logger.clone()));
        let into_view = Arc::new(IntoViewScroller::new(
            self.backend.clone(),
            self.frames,
            scroll_telemetry.clone(),
        ));
        let scroll_until = Arc::new(
            ScrollUntilRunner::new(self.backend.clone(), scroll_telemetry)
                .with_key_resolver(key_resolver),
        );

        let waiter = Arc::new(
            Waiter::new(
                resolver.clone(),
                map.clone(),
                Arc::new(WaitTelemetry::new(self.logger.clone())),
            )
            .with_scroller(into_view.clone()),
        );

        let toolkit = Arc::new(StepToolkit {
            backend: self.backend,
            resolver,
            map: map.clone(),
            waiter,
            into_view,
            scroll_until,
            environment: Arc::new(self.environment),
            logger: self.logger,
        });

        let telemetry = TelemetryHub::new();
        let recorder = RecorderObserver::new();
        telemetry.add_observer(recorder.clone());
        telemetry.add_observer(HudObserver::new(hud.clone()));
        for observer in self.observers {
            telemetry.add_observer(observer);
        }

        Engine {
            toolkit,
            map,
            map_warnings: self.map_warnings,
            handlers: Arc::new(HandlerRegistry::standard()),
            telemetry,
            recorder,
            hud,
        }
    }
}

/// The assembled DGX engine.
pub struct Engine {
    toolkit: Arc<StepToolkit>,
    map: Arc<SelectorMap>,
    map_warnings: Vec<MapWarning>,
    handlers: Arc<HandlerRegistry>,
    telemetry: Arc<TelemetryHub>,
    recorder: Arc<RecorderObserver>,
    hud: Arc<dyn HudSink>,
}

impl Engine {
    pub fn builder(backend: Arc<dyn DomBackend>) -> EngineBuilder {
        EngineBuilder::new(backend)
    }

    /// Warnings collected while loading the selector map.
    pub fn map_warnings(&self) -> &[MapWarning] {
        &self.map_warnings
    }

    pub fn recorder(&self) -> &Arc<RecorderObserver> {
        &self.recorder
    }

    pub fn hud(&self) -> &Arc<dyn HudSink> {
        &self.hud
    }

    pub fn toolkit(&self) -> &Arc<StepToolkit> {
        &self.toolkit
    }

    pub fn telemetry(&self) -> &Arc<TelemetryHub> {
        &self.telemetry
    }

    /// Validate a workflow definition without running it.
    pub fn validate(&self, definition: &WorkflowDefinition) -> Vec<dgx_workflow::ValidationIssue> {
        dgx_workflow::validate_definition(definition)
    }

    /// Resolve one logical key against the ambient document.
    pub fn resolve(&self, key: &str) -> ResolveResult {
        self.toolkit
            .resolver
            .resolve(&self.map, key, &ResolveOptions::default())
    }

    /// Default run options for this engine; customize and hand them to
    /// [`dgx_workflow::run_workflow`] for advanced control.
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(
            self.handlers.clone(),
            self.toolkit.clone(),
            self.telemetry.clone(),
        )
    }

    /// Run a workflow with default options.
    pub async fn run(&self, definition: &WorkflowDefinition) -> Result<WorkflowRunOutcome> {
        self.run_with(definition, self.run_options()).await
    }

    /// Run a workflow with caller-tuned options; a background flusher
    /// drains step telemetry while the run progresses.
    pub async fn run_with(
        &self,
        definition: &WorkflowDefinition,
        options: RunOptions,
    ) -> Result<WorkflowRunOutcome> {
        let flusher_stop = CancellationToken::new();
        let flusher = self.telemetry.spawn_flusher(flusher_stop.clone());
        let outcome = run_workflow(definition, options).await;
        flusher_stop.cancel();
        let _ = flusher.await;
        outcome.with_context(|| format!("workflow '{}' refused to start", definition.id))
    }
}
