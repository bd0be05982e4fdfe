//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: every topic publishes every tick
    SteadyStream,

    /// SIM-002: covariance toggled on and off while messages keep arriving
    CovarianceChurn,

    /// SIM-003: subscriptions added, removed and re-typed at random
    TopicChurn,

    /// SIM-004: diagnostic arrays with random levels, pins and filters
    DiagnosticsStorm,

    /// SIM-005: chart driven across the worker boundary
    ChartInteraction,

    /// SIM-006: damaged messages mixed into the stream
    MalformedFlood,

    /// SIM-007: many topics, frame switches and settings edits every tick
    ScaleLimit,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        let mut all = Self::standard();
        all.extend(Self::stress());
        all
    }

    pub fn standard() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyStream,
            ScenarioId::CovarianceChurn,
            ScenarioId::TopicChurn,
            ScenarioId::DiagnosticsStorm,
            ScenarioId::ChartInteraction,
            ScenarioId::MalformedFlood,
        ]
    }

    pub fn stress() -> Vec<ScenarioId> {
        vec![ScenarioId::ScaleLimit]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "steady_stream",
            ScenarioId::CovarianceChurn => "covariance_churn",
            ScenarioId::TopicChurn => "topic_churn",
            ScenarioId::DiagnosticsStorm => "diagnostics_storm",
            ScenarioId::ChartInteraction => "chart_interaction",
            ScenarioId::MalformedFlood => "malformed_flood",
            ScenarioId::ScaleLimit => "scale_limit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "All pose datatypes publish each tick, one renderable per topic",
            ScenarioId::CovarianceChurn => "Toggle showCovariance each tick, spheres are never reallocated",
            ScenarioId::TopicChurn => "Random subscribe/unsubscribe, primitives released with their topic",
            ScenarioId::DiagnosticsStorm => "Random levels and pins, pinned first and filters respected",
            ScenarioId::ChartInteraction => "Wheel, pan and hit-test a chart through the worker transport",
            ScenarioId::MalformedFlood => "30% damaged messages, scene stays finite and consistent",
            ScenarioId::ScaleLimit => "4x topics, frame switches and settings edits every tick",
        }
    }

    pub fn is_stress(&self) -> bool {
        matches!(self, ScenarioId::ScaleLimit)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_stream" | "steady" | "sim-001" => Ok(ScenarioId::SteadyStream),
            "covariance_churn" | "covariance" | "sim-002" => Ok(ScenarioId::CovarianceChurn),
            "topic_churn" | "topics" | "sim-003" => Ok(ScenarioId::TopicChurn),
            "diagnostics_storm" | "diagnostics" | "sim-004" => Ok(ScenarioId::DiagnosticsStorm),
            "chart_interaction" | "chart" | "sim-005" => Ok(ScenarioId::ChartInteraction),
            "malformed_flood" | "malformed" | "sim-006" => Ok(ScenarioId::MalformedFlood),
            "scale_limit" | "scale" | "sim-007" => Ok(ScenarioId::ScaleLimit),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
