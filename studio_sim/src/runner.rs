//! Scenario runner - drives the scene extension, diagnostics and chart
//! bridge through each scenario and checks the oracle every tick.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::oracle::{check_summary, Oracle};
use crate::scenarios::ScenarioId;
use crate::source::{MessageSource, PublishedPose};
use crate::visualizer::RerunLogger;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use studio_bridge::chart::{HIT_RADIUS, PADDING, X_AXIS_HEIGHT};
use studio_bridge::{
    CanvasNode, ChartBridge, ChartData, ChartId, ChartOptions, ChartType, DataPoint, Dataset,
    PanEvent, Point, PointerEvent, PointerKind, Scales, WheelEvent, WorkerTransport, X_AXIS,
    Y_AXIS,
};
use studio_core::registry::POSE_WITH_COVARIANCE_STAMPED_DATATYPES;
use studio_core::settings::PoseField;
use studio_core::{
    DatatypeRegistry, DiagnosticId, DiagnosticLevel, DiagnosticsAggregator,
    MessageEvent, PanelConfig, SceneExtension, SettingsAction, SettingsPath, SettingsValue, Topic,
};
use tracing::{debug, error, info, warn};

/// Seed stream extensions
const SOURCE_STREAM: u64 = 1;
const SCENARIO_STREAM: u64 = 2;
const CHART_STREAM: u64 = 3;

/// Topic multiplier for stress scenarios
const STRESS_FACTOR: usize = 4;

/// Settings edits per tick in ScaleLimit
const EDITS_PER_TICK: usize = 8;

/// Hardware ids the diagnostics storm draws from
const HARDWARE: [&str; 5] = ["imu", "lidar_front", "lidar_rear", "gps", "battery"];

/// Colors used by settings edits, including ones that do not parse
const COLORS: [&str; 5] = ["#ff0000ff", "#00ff0080", "rgba(0, 0, 255, 1)", "not-a-color", ""];

/// Topic with no registered schema, published alongside the poses
const UNSUPPORTED_TOPIC: &str = "/camera/image_raw";
const UNSUPPORTED_DATATYPE: &str = "sensor_msgs/Image";

/// Chart series and samples per series in ChartInteraction
const CHART_SERIES: usize = 3;
const CHART_SAMPLES: usize = 60;

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,

    /// Pose topics (one simulated robot each)
    pub num_topics: usize,

    pub ticks: u64,
    pub tick_rate_hz: u32,

    /// Fraction of messages damaged in MalformedFlood
    pub malformed_rate: f64,

    /// Position noise standard deviation (meters)
    pub position_noise_std: f64,

    /// Export every Nth tick
    pub record_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_topics: 9,
            ticks: 300,
            tick_rate_hz: 30,
            malformed_rate: 0.3,
            position_noise_std: 0.05,
            record_every: 10,
        }
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,

    /// Whether every invariant held
    pub passed: bool,

    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Renderables alive before teardown
    pub final_renderable_count: usize,

    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "scenario": self.scenario.name(),
            "seed": self.seed,
            "passed": self.passed,
            "ticks": self.total_ticks,
            "time_secs": self.final_time_secs,
            "renderables": self.final_renderable_count,
            "failure": self.failure_reason,
            "metrics": self.metrics,
        })
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Messages on subscribed topics
    pub messages_delivered: u64,

    /// Messages on topics the scene does not subscribe to
    pub messages_ignored: u64,

    pub messages_damaged: u64,
    pub renderables_created: u64,
    pub settings_edits: u64,
    pub settings_rejected: u64,
    pub subscription_changes: u64,

    /// Primitive allocations that were not arrows
    pub sphere_allocations: u64,

    pub peak_live_primitives: usize,
    pub diagnostics_ingested: u64,
    pub diagnostic_entities: usize,

    /// Requests that reached the chart worker
    pub chart_requests: u64,

    pub invariant_checks: u64,
}

/// State of one scenario run.
struct SceneRun<'a> {
    ctx: SimContext,
    dt: Duration,
    rng: ChaCha8Rng,
    source: MessageSource,
    scene: SceneExtension,
    oracle: Oracle,
    metrics: ScenarioMetrics,
    export: Option<&'a mut SimExport>,
    rerun: &'a RerunLogger,
    record_every: u64,

    /// Events since the last exported frame
    events: Vec<SimEvent>,

    tick: u64,
    final_renderables: usize,
}

impl<'a> SceneRun<'a> {
    fn new(
        runner: &'a ScenarioRunner,
        ctx: SimContext,
        source: MessageSource,
        export: Option<&'a mut SimExport>,
    ) -> Self {
        let config = &runner.config;
        Self {
            dt: Duration::from_secs_f64(1.0 / config.tick_rate_hz.max(1) as f64),
            rng: ctx.rng(SCENARIO_STREAM),
            ctx,
            source,
            scene: SceneExtension::default().with_settings(runner.panel.topics.clone()),
            oracle: Oracle::new(),
            metrics: ScenarioMetrics::default(),
            export,
            rerun: &runner.rerun,
            record_every: config.record_every.max(1),
            events: Vec::new(),
            tick: 0,
            final_renderables: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> SimError {
        SimError::invariant(self.tick, message)
    }

    fn subscribe(&mut self, topics: &[Topic]) {
        self.scene.set_topics(topics);
        self.metrics.subscription_changes += 1;
    }

    fn deliver(&mut self, event: MessageEvent, published: Option<PublishedPose>) {
        let created = self.scene.renderable(&event.topic).is_none();
        if !self.scene.handle_event(&event) {
            self.metrics.messages_ignored += 1;
            return;
        }
        if created {
            self.metrics.renderables_created += 1;
        }
        if published.is_none() {
            self.metrics.messages_damaged += 1;
        }
        self.oracle.record(&event.topic, published);
        self.metrics.messages_delivered += 1;
    }

    fn publish_all(&mut self) {
        let now = self.ctx.time_ns();
        for (event, published) in self.source.publish_all(now) {
            self.deliver(event, Some(published));
        }
    }

    fn edit(&mut self, topic: &str, field: PoseField, value: SettingsValue) -> bool {
        let path = [SettingsPath::TOPICS, topic, field.key()];
        let applied = self.scene.on_settings_edit(&path, &value);
        self.count_edit(applied);
        applied
    }

    fn count_edit(&mut self, applied: bool) {
        if applied {
            self.metrics.settings_edits += 1;
        } else {
            self.metrics.settings_rejected += 1;
        }
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(tick = self.tick, "{}", message);
        self.events.push(SimEvent::info(message));
    }

    /// Check the oracle, record a frame and advance time.
    fn end_tick(&mut self) -> Result<(), SimError> {
        self.oracle.check_scene(self.tick, &self.scene)?;
        self.metrics.invariant_checks += 1;
        self.rerun.log_scene(self.tick, &self.scene);

        let stats = self.scene.stats();
        self.metrics.peak_live_primitives = self.metrics.peak_live_primitives.max(stats.live_primitives);
        self.metrics.sphere_allocations = stats.allocations - self.metrics.renderables_created;

        match self.export.as_deref_mut() {
            Some(export) if self.tick % self.record_every == 0 => {
                let frame = SimFrame::capture(self.ctx.now().as_secs_f64(), &self.scene)
                    .with_events(std::mem::take(&mut self.events));
                export.add_frame(frame);
            }
            Some(_) => {}
            None => self.events.clear(),
        }

        if self.tick % 30 == 0 {
            debug!(
                "  t={:.1}s | renderables={} | primitives={}",
                self.ctx.now().as_secs_f64(),
                stats.renderables,
                stats.live_primitives
            );
        }

        self.ctx.advance_time(self.dt);
        self.source.step(self.dt.as_secs_f64());
        self.tick += 1;
        Ok(())
    }

    /// Dispose everything and check nothing leaked.
    fn finish(&mut self) -> Result<(), SimError> {
        self.final_renderables = self.scene.stats().renderables;
        let disposed = self.scene.dispose_all();
        self.oracle.forget_all();

        let stats = self.scene.stats();
        if stats.live_primitives != 0 || stats.allocations != stats.releases {
            return Err(self.fail(format!(
                "{} primitives leaked after disposing {} renderables",
                stats.live_primitives, disposed
            )));
        }
        Ok(())
    }
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Saved panel state every scenario starts from
    panel: PanelConfig,

    rerun: RerunLogger,
}

impl ScenarioRunner {
    pub fn new(seed: u64, num_topics: usize) -> Self {
        Self::from_config(SimConfig {
            seed,
            num_topics,
            ..SimConfig::default()
        })
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self {
            config,
            panel: PanelConfig::default(),
            rerun: RerunLogger::disabled(),
        }
    }

    /// Start every scenario from saved topic settings and diagnostics state.
    pub fn with_panel_config(mut self, panel: PanelConfig) -> Self {
        self.panel = panel;
        self
    }

    pub fn with_rerun(mut self, rerun: RerunLogger) -> Self {
        self.rerun = rerun;
        self
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz.max(1);
        self
    }

    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.config.ticks = ticks;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario, None)
    }

    /// Runs a scenario, adding frames to `export` when given.
    pub fn run_recorded(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);
        if scenario.is_stress() {
            warn!("Stress scenario: {}x topics", STRESS_FACTOR);
        }

        let ctx = SimContext::new(self.config.seed);
        let source = self.source_for(scenario, &ctx);
        let mut run = SceneRun::new(self, ctx.clone(), source, export);

        let outcome = match scenario {
            ScenarioId::SteadyStream => self.run_steady_stream(&mut run),
            ScenarioId::CovarianceChurn => self.run_covariance_churn(&mut run),
            ScenarioId::TopicChurn => self.run_topic_churn(&mut run),
            ScenarioId::DiagnosticsStorm => self.run_diagnostics_storm(&mut run),
            ScenarioId::ChartInteraction => self.run_chart_interaction(&mut run),
            ScenarioId::MalformedFlood => self.run_malformed_flood(&mut run),
            ScenarioId::ScaleLimit => self.run_scale_limit(&mut run),
        };

        let failure_reason = outcome.err().map(|e| e.to_string());
        let result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: failure_reason.is_none(),
            total_ticks: run.tick,
            final_time_secs: ctx.now().as_secs_f64(),
            final_renderable_count: run.final_renderables,
            failure_reason,
            metrics: run.metrics.clone(),
        };

        if let Some(export) = run.export.as_deref_mut() {
            export.finalize(result.passed, result.failure_reason.clone());
        }

        match &result.failure_reason {
            None => info!(
                "✓ {} passed: {} ticks, {} messages, {} checks",
                scenario.name(),
                result.total_ticks,
                result.metrics.messages_delivered,
                result.metrics.invariant_checks
            ),
            Some(reason) => error!("✗ {} failed: {}", scenario.name(), reason),
        }
        result
    }

    fn source_for(&self, scenario: ScenarioId, ctx: &SimContext) -> MessageSource {
        let seed = ctx.derive_seed(SOURCE_STREAM);
        let count = self.config.num_topics;

        let mut source = match scenario {
            ScenarioId::CovarianceChurn => {
                let mut source = MessageSource::new(seed);
                for i in 0..count {
                    let datatype = POSE_WITH_COVARIANCE_STAMPED_DATATYPES
                        [i % POSE_WITH_COVARIANCE_STAMPED_DATATYPES.len()];
                    source.spawn_robot(&format!("/robot_{}/pose_cov", i), datatype);
                }
                source
            }
            ScenarioId::ScaleLimit => {
                let mut source = MessageSource::with_robots(seed, count * STRESS_FACTOR);
                source.set_frame_switch_prob(0.1);
                source
            }
            _ => MessageSource::with_robots(seed, count),
        };
        source.set_position_noise(self.config.position_noise_std);
        source
    }

    /// SIM-001: every topic publishes every tick.
    fn run_steady_stream(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-001: SteadyStream");
        let topics = run.source.topics();
        run.subscribe(&topics);

        for _ in 0..self.config.ticks {
            run.publish_all();
            run.end_tick()?;
        }

        let stats = run.scene.stats();
        if self.config.ticks > 0 && stats.renderables != topics.len() {
            return Err(run.fail(format!(
                "{} renderables for {} topics",
                stats.renderables,
                topics.len()
            )));
        }
        let covariance_topics = run
            .source
            .robots()
            .iter()
            .filter(|r| r.has_covariance() && run.scene.effective_settings(&r.topic).show_covariance)
            .count();
        if self.config.ticks > 0 && stats.spheres != covariance_topics {
            return Err(run.fail(format!(
                "{} spheres for {} covariance topics",
                stats.spheres, covariance_topics
            )));
        }
        run.finish()
    }

    /// SIM-002: showCovariance flips constantly; spheres are allocated at
    /// most once per topic and only their visibility changes.
    fn run_covariance_churn(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-002: CovarianceChurn");
        let topics = run.source.topics();
        run.subscribe(&topics);
        let names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();

        // Half the topics start hidden, before their first message
        for name in names.iter().step_by(2) {
            run.edit(name, PoseField::ShowCovariance, SettingsValue::Bool(false));
        }

        for _ in 0..self.config.ticks {
            run.publish_all();

            for name in &names {
                if run.rng.gen_bool(0.5) {
                    let show = run.rng.gen_bool(0.5);
                    run.edit(name, PoseField::ShowCovariance, SettingsValue::Bool(show));
                }
            }
            if let Some(name) = names.choose(&mut run.rng) {
                if run.rng.gen_bool(0.1) {
                    let visible = run.rng.gen_bool(0.7);
                    run.edit(name, PoseField::Visible, SettingsValue::Bool(visible));
                }
                if run.rng.gen_bool(0.05) {
                    let color = COLORS.choose(&mut run.rng).copied().unwrap_or_default();
                    run.edit(name, PoseField::CovarianceColor, SettingsValue::String(color.to_string()));
                }
            }
            run.end_tick()?;
        }

        if run.metrics.sphere_allocations > names.len() as u64 {
            return Err(run.fail(format!(
                "{} sphere allocations for {} topics",
                run.metrics.sphere_allocations,
                names.len()
            )));
        }
        run.finish()
    }

    /// SIM-003: random subscription changes, including datatype switches.
    fn run_topic_churn(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-003: TopicChurn");
        let registry = DatatypeRegistry::with_defaults();
        let datatypes: Vec<String> = registry.datatypes().into_iter().map(String::from).collect();
        let unsupported = Topic::new(UNSUPPORTED_TOPIC, UNSUPPORTED_DATATYPE);

        let mut subscribed = run.source.topics();
        let mut topics = subscribed.clone();
        topics.push(unsupported.clone());
        run.subscribe(&topics);

        for tick in 0..self.config.ticks {
            if tick > 0 && run.rng.gen_bool(0.2) {
                let previous = std::mem::take(&mut subscribed);

                if run.rng.gen_bool(0.3) {
                    let index = run.rng.gen_range(0..run.source.robots().len().max(1));
                    if let Some(datatype) = datatypes.choose(&mut run.rng).cloned() {
                        if let Some(topic) = run.source.retype(index, &datatype) {
                            run.log(format!("retyped {} to {}", topic.name, topic.datatype));
                        }
                    }
                }
                subscribed = run
                    .source
                    .topics()
                    .into_iter()
                    .filter(|_| run.rng.gen_bool(0.7))
                    .collect();

                // Removed topics and schema changes lose their renderable
                for old in &previous {
                    let disposed = match subscribed.iter().find(|t| t.name == old.name) {
                        None => true,
                        Some(new) => registry.resolve(&new.datatype) != registry.resolve(&old.datatype),
                    };
                    if disposed {
                        run.oracle.forget(&old.name);
                    }
                }

                let mut topics = subscribed.clone();
                topics.push(unsupported.clone());
                run.subscribe(&topics);
                run.log(format!("subscribed to {} of {} topics", subscribed.len(), run.source.robots().len()));
            }

            if tick == self.config.ticks / 2 {
                // Seek: the scene is rebuilt from the next messages
                let disposed = run.scene.dispose_all();
                run.oracle.forget_all();
                run.log(format!("seek disposed {} renderables", disposed));
            }

            run.publish_all();
            let now = run.ctx.time_ns();
            run.deliver(
                MessageEvent {
                    topic: UNSUPPORTED_TOPIC.to_string(),
                    receive_time_ns: now,
                    message: json!({ "width": 640, "height": 480 }),
                },
                None,
            );
            run.end_tick()?;
        }

        if run.scene.is_subscribed(UNSUPPORTED_TOPIC) || run.scene.renderable(UNSUPPORTED_TOPIC).is_some() {
            return Err(run.fail("unsupported datatype was subscribed"));
        }
        for robot in run.source.robots() {
            if !run.scene.is_subscribed(&robot.topic) && run.scene.renderable(&robot.topic).is_some() {
                return Err(run.fail(format!("{} rendered while unsubscribed", robot.topic)));
            }
        }
        run.finish()
    }

    /// SIM-004: random diagnostics with pins and filters changing under them.
    fn run_diagnostics_storm(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-004: DiagnosticsStorm");
        let topics = run.source.topics();
        run.subscribe(&topics);

        let mut aggregator = DiagnosticsAggregator::new();
        let mut config = self.panel.diagnostics.clone();

        for tick in 0..self.config.ticks {
            run.publish_all();

            let count = run.rng.gen_range(1..12);
            let now = run.ctx.time_ns();
            let array = run.source.diagnostic_array(now, &HARDWARE, count);
            aggregator.ingest_value(&array);
            run.metrics.diagnostics_ingested += count as u64;

            match run.rng.gen_range(0..10) {
                0 => {
                    let hardware = HARDWARE.choose(&mut run.rng).copied().unwrap_or_default();
                    let name = format!("check_{}", run.rng.gen_range(0..6));
                    config.pin(DiagnosticId::new(hardware, name));
                }
                1 => {
                    if let Some(id) = config.pinned_ids.choose(&mut run.rng).cloned() {
                        config.unpin(&id);
                    }
                }
                2 => {
                    config.min_level = DiagnosticLevel::ALL
                        .choose(&mut run.rng)
                        .copied()
                        .unwrap_or(DiagnosticLevel::Stale);
                }
                3 => {
                    let filter = ["", "lidar", "GPS", "x"].choose(&mut run.rng).copied().unwrap_or_default();
                    config.hardware_id_filter = filter.to_string();
                }
                4 => config.sort_by_level = !config.sort_by_level,
                _ => {}
            }

            if tick == self.config.ticks / 2 {
                aggregator.clear();
                run.log("seek cleared diagnostics");
            }

            run.rerun.log_diagnostics(run.tick, &aggregator, &config);
            let summary = aggregator.summary(&config);
            check_summary(run.tick, &summary, &config)?;
            let unfiltered = config.min_level == DiagnosticLevel::Stale && config.hardware_id_filter.is_empty();
            if unfiltered && summary.len() != aggregator.len() {
                return Err(run.fail(format!(
                    "unfiltered summary shows {} of {} entities",
                    summary.len(),
                    aggregator.len()
                )));
            }
            run.end_tick()?;
        }
        run.metrics.diagnostic_entities = aggregator.len();

        // Panel state survives a save/load cycle
        let panel = PanelConfig::new(run.scene.settings_store().clone(), config);
        let restored = PanelConfig::from_json(&panel.to_json()?)?;
        if restored != panel {
            return Err(run.fail("panel config changed across a JSON round trip"));
        }
        run.finish()
    }

    /// SIM-005: a chart owned by a worker task, driven through the bridge.
    fn run_chart_interaction(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-005: ChartInteraction");

        // Robot trajectories become the chart's series
        let mut datasets: Vec<Dataset> = run
            .source
            .robots()
            .iter()
            .take(CHART_SERIES)
            .map(|r| Dataset::new(r.topic.clone(), Vec::new()))
            .collect();
        for _ in 0..CHART_SAMPLES {
            let t = run.ctx.now().as_secs_f64();
            for (dataset, robot) in datasets.iter_mut().zip(run.source.robots()) {
                dataset.data.push(DataPoint::new(t, robot.position.x));
            }
            run.ctx.advance_time(run.dt);
            run.source.step(run.dt.as_secs_f64());
        }
        for dataset in &mut datasets {
            let label = dataset.label.clone();
            if let Some(last) = dataset.data.last_mut() {
                last.label = Some(label);
            }
        }

        let data = ChartData { datasets };
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let chart_id = ChartId::from_seed(run.ctx.derive_seed(CHART_STREAM));
        runtime.block_on(self.drive_chart(run, chart_id, data))?;
        run.finish()
    }

    async fn drive_chart(&self, run: &mut SceneRun<'_>, chart_id: ChartId, data: ChartData) -> Result<(), SimError> {
        let (transport, worker) = WorkerTransport::spawn_with_handle(16);
        let transport = Arc::new(transport.with_timeout(Duration::from_secs(5)));
        let mut bridge = ChartBridge::with_id(transport, chart_id);
        let node = CanvasNode {
            width: 640.0,
            height: 360.0,
        };
        let options = ChartOptions {
            datalabels: true,
            ..ChartOptions::default()
        };

        // Nothing reaches the worker before construct
        let early = bridge
            .wheel(WheelEvent {
                x: 100.0,
                y: 100.0,
                delta_y: -1.0,
            })
            .await;
        if !early.is_empty() {
            return Err(run.fail("wheel answered before construct"));
        }

        bridge
            .construct(node, ChartType::Line, data.clone(), options.clone(), 2.0)
            .await?;
        let full = bridge.update(data.clone(), options, node.width, node.height).await;
        let mut sent = 2u64;
        let full_range = x_range(&full).ok_or_else(|| run.fail("chart has no x range"))?;
        let mut current = full;

        for _ in 0..self.config.ticks {
            let before = x_range(&current).ok_or_else(|| run.fail("x range lost"))?;
            let x = run.rng.gen_range(0.0..node.width);
            let y = run.rng.gen_range(0.0..node.height);

            match run.rng.gen_range(0..6) {
                0 => {
                    let delta_y = if run.rng.gen_bool(0.5) { -1.0 } else { 1.0 };
                    current = bridge.wheel(WheelEvent { x, y, delta_y }).await;
                    sent += 1;
                    let after = x_range(&current).ok_or_else(|| run.fail("wheel lost x range"))?;
                    let (span, next) = (before.1 - before.0, after.1 - after.0);
                    let slack = 1e-9 * span.abs().max(1.0);
                    let ok = if delta_y < 0.0 {
                        next <= span + slack
                    } else {
                        (next - span * 1.1).abs() <= slack
                    };
                    if !ok {
                        return Err(run.fail(format!("wheel {} took span {} to {}", delta_y, span, next)));
                    }
                }
                1 => {
                    let delta_x = run.rng.gen_range(-200.0..200.0);
                    current = bridge.pan(PanEvent { delta_x, delta_y: 0.0 }).await;
                    sent += 1;
                    check_span_kept(run, before, &current)?;
                }
                2 => {
                    let delta_x = run.rng.gen_range(-100.0..100.0);
                    bridge.pointer(PointerEvent::new(PointerKind::Down, x, y)).await;
                    current = bridge
                        .pointer(PointerEvent::new(PointerKind::Move, x + delta_x, y))
                        .await;
                    bridge.pointer(PointerEvent::new(PointerKind::Up, x + delta_x, y)).await;
                    sent += 3;
                    check_span_kept(run, before, &current)?;
                }
                3 => {
                    // Aim at a sample so the hit test has something to find
                    if let Some((target, point)) = pick_sample(run, &data, &current, node) {
                        let elements = bridge.elements_at_event(target).await;
                        sent += 1;
                        if !elements.iter().any(|e| e.data == point) {
                            return Err(run.fail(format!("no element at ({:.1}, {:.1})", target.x, target.y)));
                        }
                        let distances: Vec<f64> =
                            elements.iter().map(|e| e.view_position.distance(&target)).collect();
                        let nearest_first = distances.windows(2).all(|w| w[0] <= w[1]);
                        if !nearest_first || distances.iter().any(|d| *d > HIT_RADIUS + 1e-9) {
                            return Err(run.fail("hit test returned distant or unordered elements"));
                        }
                    }
                }
                4 => {
                    let label = bridge.datalabel_at_event(PointerEvent::new(PointerKind::Move, x, y)).await;
                    sent += 1;
                    if label.is_some_and(|d| d.label.is_none()) {
                        return Err(run.fail("datalabel hit on an unlabeled point"));
                    }
                }
                _ => {
                    current = bridge.reset_zoom().await;
                    sent += 1;
                    if x_range(&current) != Some(full_range) {
                        return Err(run.fail("reset zoom did not restore the full range"));
                    }
                }
            }
            run.metrics.chart_requests = sent;
            run.end_tick()?;
        }

        bridge.destroy().await;
        sent += 1;
        run.log(format!("chart {} destroyed", bridge.id()));

        // Nothing reaches the worker after destroy
        if !bridge.reset_zoom().await.is_empty() || !bridge.elements_at_event(Point::new(0.0, 0.0)).await.is_empty() {
            return Err(run.fail("chart answered after destroy"));
        }
        drop(bridge);

        let handled = worker
            .await
            .map_err(|e| run.fail(format!("chart worker failed: {}", e)))?;
        if handled != sent {
            return Err(run.fail(format!("worker handled {} requests, {} sent", handled, sent)));
        }
        run.metrics.chart_requests = sent;
        Ok(())
    }

    /// SIM-006: damaged messages mixed into the stream.
    fn run_malformed_flood(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-006: MalformedFlood");
        let topics = run.source.topics();
        run.subscribe(&topics);
        let rate = self.config.malformed_rate.clamp(0.0, 1.0);

        for _ in 0..self.config.ticks {
            let now = run.ctx.time_ns();
            for (mut event, published) in run.source.publish_all(now) {
                if run.rng.gen_bool(rate) {
                    let raw = std::mem::take(&mut event.message);
                    event.message = run.source.corrupt(raw);
                    run.deliver(event, None);
                } else {
                    run.deliver(event, Some(published));
                }
            }
            run.end_tick()?;
        }

        if rate > 0.0 && run.metrics.messages_damaged == 0 && self.config.ticks > 10 {
            warn!("no damaged messages were generated");
        }
        run.finish()
    }

    /// SIM-007: many topics, frame switches and a settings edit storm.
    fn run_scale_limit(&self, run: &mut SceneRun<'_>) -> Result<(), SimError> {
        info!("SIM-007: ScaleLimit");
        let topics = run.source.topics();
        run.subscribe(&topics);
        let names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();

        for tick in 0..self.config.ticks {
            run.publish_all();

            for _ in 0..EDITS_PER_TICK {
                let Some(name) = names.choose(&mut run.rng).cloned() else {
                    break;
                };
                let (field, value) = random_edit(&mut run.rng);
                if run.rng.gen_bool(0.5) {
                    run.edit(&name, field, value);
                } else {
                    // Through the settings tree, as the UI sends it
                    let path = SettingsPath::Topic { topic: name, field };
                    let applied = run.scene.handle_action(&SettingsAction::new(&path, value));
                    run.count_edit(applied);
                }
            }

            if tick % 50 == 0 {
                let tree = run.scene.settings_tree();
                if tree.topics.len() != names.len() {
                    return Err(run.fail(format!(
                        "settings tree has {} topics, {} subscribed",
                        tree.topics.len(),
                        names.len()
                    )));
                }
                for (topic, node) in &tree.topics {
                    if node.visible != run.scene.effective_settings(topic).visible {
                        return Err(run.fail(format!("settings tree out of date for {}", topic)));
                    }
                }
            }
            run.end_tick()?;
        }
        run.finish()
    }
}

fn x_range(scales: &Scales) -> Option<(f64, f64)> {
    let bounds = scales.get(X_AXIS)?;
    Some((bounds.min?, bounds.max?))
}

fn check_span_kept(run: &SceneRun<'_>, before: (f64, f64), scales: &Scales) -> Result<(), SimError> {
    let after = x_range(scales).ok_or_else(|| run.fail("pan lost x range"))?;
    let (span, next) = (before.1 - before.0, after.1 - after.0);
    if (span - next).abs() > 1e-9 * span.abs().max(1.0) {
        return Err(run.fail(format!("pan changed span {} to {}", span, next)));
    }
    Ok(())
}

/// A random sample and its pixel position under `scales`.
fn pick_sample(
    run: &mut SceneRun<'_>,
    data: &ChartData,
    scales: &Scales,
    node: CanvasNode,
) -> Option<(Point, DataPoint)> {
    let dataset = data.datasets.choose(&mut run.rng)?;
    let point = dataset.data.choose(&mut run.rng)?;

    let x = scales.get(X_AXIS)?;
    let y = scales.get(Y_AXIS)?;
    let (x_lo, x_hi, left, right) = (x.min?, x.max?, x.left?, x.right?);
    let (y_lo, y_hi) = (y.min?, y.max?);
    let (top, bottom) = (PADDING, node.height - PADDING - X_AXIS_HEIGHT);

    let px = left + (point.x - x_lo) / (x_hi - x_lo) * (right - left);
    let py = bottom - (point.y - y_lo) / (y_hi - y_lo) * (bottom - top);
    Some((Point::new(px, py), point.clone()))
}

/// A settings edit; about one in ten has a value that does not fit.
fn random_edit(rng: &mut ChaCha8Rng) -> (PoseField, SettingsValue) {
    let field = PoseField::ALL.choose(rng).copied().unwrap_or(PoseField::Visible);
    if rng.gen_bool(0.1) {
        let mistyped = match field {
            PoseField::Scale => SettingsValue::Bool(true),
            _ => SettingsValue::Vec3([1.0, 1.0, 1.0]),
        };
        return (field, mistyped);
    }

    let value = match field {
        PoseField::Visible | PoseField::ShowCovariance => SettingsValue::Bool(rng.gen_bool(0.5)),
        PoseField::Scale => SettingsValue::Vec3([
            rng.gen_range(0.1..3.0),
            rng.gen_range(0.05..1.0),
            rng.gen_range(0.05..1.0),
        ]),
        PoseField::Color | PoseField::CovarianceColor => {
            SettingsValue::String(COLORS.choose(rng).copied().unwrap_or_default().to_string())
        }
    };
    (field, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(ticks: u64) -> ScenarioRunner {
        ScenarioRunner::new(42, 9).with_ticks(ticks)
    }

    #[test]
    fn test_all_scenarios_pass() {
        for scenario in ScenarioId::all() {
            let result = runner(120).run(scenario);
            assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
            assert_eq!(result.total_ticks, 120);
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        for scenario in [ScenarioId::TopicChurn, ScenarioId::MalformedFlood] {
            let a = runner(90).run(scenario);
            let b = runner(90).run(scenario);
            assert_eq!(a.metrics, b.metrics);
        }
    }

    #[test]
    fn test_steady_stream_metrics() {
        let result = runner(30).run(ScenarioId::SteadyStream);
        assert!(result.passed);
        assert_eq!(result.final_renderable_count, 9);
        assert_eq!(result.metrics.messages_delivered, 9 * 30);
        assert_eq!(result.metrics.renderables_created, 9);
        // Three of the nine datatypes carry covariance
        assert_eq!(result.metrics.sphere_allocations, 3);
        assert_eq!(result.metrics.invariant_checks, 30);
    }

    #[test]
    fn test_covariance_churn_never_reallocates() {
        let result = runner(200).run(ScenarioId::CovarianceChurn);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.sphere_allocations <= 9);
        assert!(result.metrics.settings_edits > 200);
    }

    #[test]
    fn test_topic_churn_ignores_unsupported() {
        let result = runner(60).run(ScenarioId::TopicChurn);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.messages_ignored >= 60);
    }

    #[test]
    fn test_malformed_flood_damages_messages() {
        let result = runner(60).run(ScenarioId::MalformedFlood);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.messages_damaged > 0);
        assert_eq!(result.metrics.messages_ignored, 0);
    }

    #[test]
    fn test_scale_limit_rejects_mistyped_edits() {
        let result = runner(60).run(ScenarioId::ScaleLimit);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_renderable_count, 9 * STRESS_FACTOR);
        assert!(result.metrics.settings_rejected > 0);
        assert_eq!(
            result.metrics.settings_edits + result.metrics.settings_rejected,
            60 * EDITS_PER_TICK as u64
        );
    }

    #[test]
    fn test_chart_interaction_counts_requests() {
        let result = runner(60).run(ScenarioId::ChartInteraction);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.chart_requests >= 63);
    }

    #[test]
    fn test_export_records_frames() {
        let mut export = SimExport::new("steady_stream", 42);
        let result = runner(25).run_recorded(ScenarioId::SteadyStream, Some(&mut export));
        assert!(result.passed);
        assert!(export.passed);
        // Ticks 0, 10 and 20
        assert_eq!(export.frames.len(), 3);
        assert_eq!(export.frames[2].renderables.len(), 9);
    }

    #[test]
    fn test_panel_config_seeds_settings() {
        let mut panel = PanelConfig::default();
        let mut hidden = studio_core::PartialPoseSettings::default();
        hidden.visible = Some(false);
        panel.topics.set("/robot_0/pose", hidden);
        panel.diagnostics.pin(DiagnosticId::new("imu", "check_0"));

        let result = runner(20).with_panel_config(panel).run(ScenarioId::DiagnosticsStorm);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_result_json() {
        let result = runner(5).run(ScenarioId::SteadyStream);
        let value = result.to_json();
        assert_eq!(value["scenario"], "steady_stream");
        assert_eq!(value["passed"], true);
        assert_eq!(value["metrics"]["messages_delivered"], 45);
    }
}
