//! Scenario runner - executes a scenario and checks the recorded streams.

use crate::error::SimError;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use lamport_core::{parse_log, ClusterConfig, EventType, DEFAULT_PEER_COUNT};
use lamport_env::NetworkController;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Per-node outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub tick_rate: f64,
    pub final_clock: u64,
    pub ticks: u64,
    pub internal_events: u64,
    pub send_events: u64,
    pub messages_sent: u64,
    pub failed_sends: u64,
    pub receives: u64,
    pub max_queue_length: usize,

    /// Messages still queued when the run ended
    pub backlog: usize,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// One entry per node, in configured order
    pub nodes: Vec<NodeSummary>,

    /// Messages attempted
    pub messages_sent: u64,

    /// Attempts that failed (partition, loss, crash)
    pub failed_sends: u64,

    /// RECEIVE events across all nodes
    pub receives: u64,

    /// Largest minus smallest final clock
    pub max_clock_drift: u64,

    /// Deepest backlog any node saw
    pub max_queue_length: usize,
}

impl ScenarioMetrics {
    /// Collects counters from every node of `world`.
    pub fn collect(world: &SimWorld) -> Self {
        let nodes: Vec<NodeSummary> = world
            .nodes()
            .iter()
            .map(|handle| {
                let stats = handle.process.stats();
                NodeSummary {
                    name: handle.process.id().to_string(),
                    tick_rate: handle.process.config().tick_rate,
                    final_clock: handle.process.clock(),
                    ticks: stats.ticks,
                    internal_events: stats.internal_events,
                    send_events: stats.send_events,
                    messages_sent: stats.messages_sent,
                    failed_sends: stats.failed_sends,
                    receives: stats.receives,
                    max_queue_length: stats.max_queue_length,
                    backlog: handle.process.inbox().size(),
                }
            })
            .collect();

        let max_clock = nodes.iter().map(|n| n.final_clock).max().unwrap_or(0);
        let min_clock = nodes.iter().map(|n| n.final_clock).min().unwrap_or(0);

        Self {
            messages_sent: nodes.iter().map(|n| n.messages_sent).sum(),
            failed_sends: nodes.iter().map(|n| n.failed_sends).sum(),
            receives: nodes.iter().map(|n| n.receives).sum(),
            max_clock_drift: max_clock - min_clock,
            max_queue_length: nodes.iter().map(|n| n.max_queue_length).max().unwrap_or(0),
            nodes,
        }
    }

    /// Messages that reached an inbox.
    pub fn delivered(&self) -> u64 {
        self.messages_sent - self.failed_sends
    }

    /// Messages still queued across all nodes.
    pub fn backlog(&self) -> u64 {
        self.nodes.iter().map(|n| n.backlog as u64).sum()
    }
}

/// A finished run: the verdict plus the world it ran in.
pub struct ScenarioOutcome {
    pub result: ScenarioResult,
    pub world: SimWorld,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Virtual duration in seconds
    duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: 60.0,
        }
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        match self.execute(scenario).await {
            Ok(outcome) => outcome.result,
            Err(e) => self.failed(scenario.name(), e.to_string()),
        }
    }

    /// Runs a scenario and keeps the world for inspection or export.
    pub async fn execute(&self, scenario: ScenarioId) -> Result<ScenarioOutcome, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut world = SimWorld::new(SimConfig {
            seed: self.seed,
            cluster: scenario.cluster(),
            peer_count: scenario.peer_count(),
            ..Default::default()
        })?;

        let duration = Duration::from_secs_f64(self.duration_secs);
        match scenario {
            ScenarioId::Partition => self.run_partition(&mut world, duration).await,
            ScenarioId::LossyLinks => {
                let ids = world.ids();
                for from in &ids {
                    for to in ids.iter().filter(|to| *to != from) {
                        world.controller().set_link_loss(*from, *to, 0.3);
                    }
                }
                world.run_for(duration).await;
            }
            _ => {
                world.run_for(duration).await;
            }
        }

        let metrics = ScenarioMetrics::collect(&world);
        let verdict = check_invariants(&world, &metrics).and_then(|_| expectations(scenario, &metrics));
        Ok(self.finish(scenario.name(), world, metrics, verdict))
    }

    /// Runs an arbitrary cluster with no faults.
    pub async fn run_custom(&self, cluster: ClusterConfig) -> Result<ScenarioOutcome, SimError> {
        info!("Starting custom cluster of {} nodes (seed={})", cluster.nodes.len(), self.seed);

        let mut world = SimWorld::new(SimConfig {
            seed: self.seed,
            cluster,
            peer_count: DEFAULT_PEER_COUNT,
            ..Default::default()
        })?;
        world.run_for(Duration::from_secs_f64(self.duration_secs)).await;

        let metrics = ScenarioMetrics::collect(&world);
        let verdict = check_invariants(&world, &metrics);
        Ok(self.finish("custom", world, metrics, verdict))
    }

    /// A isolated for the middle third, healed for the rest.
    async fn run_partition(&self, world: &mut SimWorld, duration: Duration) {
        let third = duration / 3;
        let ids = world.ids();

        world.run_for(third).await;

        if let Some(&victim) = ids.first() {
            info!("Isolating {} from {:?}", victim, ids);
            world.controller().isolate(victim, &ids);
        }
        world.run_for(third).await;

        info!("Healing all partitions");
        world.controller().heal_all();
        world.run_for(duration - third * 2).await;
    }

    fn finish(&self, name: &str, world: SimWorld, metrics: ScenarioMetrics, verdict: Result<(), String>) -> ScenarioOutcome {
        if let Err(reason) = &verdict {
            warn!("Scenario {} failed: {}", name, reason);
        }

        let result = ScenarioResult {
            scenario: name.to_string(),
            seed: self.seed,
            passed: verdict.is_ok(),
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            failure_reason: verdict.err(),
            metrics,
        };

        ScenarioOutcome { result, world }
    }

    fn failed(&self, name: &str, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario: name.to_string(),
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Properties every run must satisfy, whatever the faults.
pub fn check_invariants(world: &SimWorld, metrics: &ScenarioMetrics) -> Result<(), String> {
    for handle in world.nodes() {
        let id = handle.process.id();
        let records = handle.logger.records();

        if records.len() as u64 != handle.process.stats().ticks {
            return Err(format!(
                "{}: {} records for {} ticks",
                id,
                records.len(),
                handle.process.stats().ticks
            ));
        }

        if let Some(w) = records.windows(2).find(|w| w[1].logical_clock <= w[0].logical_clock) {
            return Err(format!(
                "{}: clock went from {} to {}",
                id, w[0].logical_clock, w[1].logical_clock
            ));
        }

        if let Some(r) = records
            .iter()
            .find(|r| r.event_type() == EventType::Receive && r.queue_length() < Some(1))
        {
            return Err(format!("{}: RECEIVE with empty queue: {}", id, r));
        }

        let reparsed = parse_log(&handle.logger.render()).map_err(|e| format!("{}: {}", id, e))?;
        if reparsed != records {
            return Err(format!("{}: rendered log does not parse back", id));
        }
    }

    // Every delivered message is either processed or still queued.
    if metrics.receives + metrics.backlog() != metrics.delivered() {
        return Err(format!(
            "{} receives + {} queued != {} delivered",
            metrics.receives,
            metrics.backlog(),
            metrics.delivered()
        ));
    }

    Ok(())
}

fn expectations(scenario: ScenarioId, metrics: &ScenarioMetrics) -> Result<(), String> {
    match scenario {
        ScenarioId::Partition | ScenarioId::LossyLinks if metrics.failed_sends == 0 => {
            Err("faults injected but no send failed".to_string())
        }
        ScenarioId::SlowReceiver => {
            let slow = metrics.nodes.first().map(|n| n.max_queue_length).unwrap_or(0);
            if slow < 2 {
                Err(format!("slow node never saw a backlog (max queue {})", slow))
            } else {
                Ok(())
            }
        }
        _ if metrics.receives == 0 => Err("no message was ever received".to_string()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_core::NodeDescriptor;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_every_scenario_passes() {
        let runner = ScenarioRunner::new(42).with_duration(30.0);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).await;
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.scenario, scenario.name());
            assert!(result.total_ticks > 0);
            assert_eq!(result.final_time_secs, 30.0);
        }
    }

    #[tokio::test]
    async fn test_partition_counts_failures() {
        let runner = ScenarioRunner::new(7).with_duration(60.0);
        let outcome = runner.execute(ScenarioId::Partition).await.unwrap();

        assert!(outcome.result.passed);
        assert!(outcome.result.metrics.failed_sends > 0);
        assert_eq!(
            outcome.result.metrics.messages_sent,
            outcome.world.nodes().iter().map(|n| n.process.stats().messages_sent).sum::<u64>()
        );
    }

    #[tokio::test]
    async fn test_triangle_rates() {
        let result = ScenarioRunner::new(1).with_duration(10.0).run(ScenarioId::Triangle).await;
        let ticks: Vec<u64> = result.metrics.nodes.iter().map(|n| n.ticks).collect();
        assert_eq!(ticks[0], 20);
        assert_eq!(ticks[1], 40);
        assert!((59..=60).contains(&ticks[2]));
    }

    #[tokio::test]
    async fn test_custom_cluster_validation() {
        let runner = ScenarioRunner::new(3).with_duration(5.0);
        let bad = ClusterConfig::new(vec![NodeDescriptor::new("A", 1, -1.0)]);
        assert!(matches!(runner.run_custom(bad).await, Err(SimError::Config(_))));

        let single = ClusterConfig::new(vec![NodeDescriptor::new("A", 1, 4.0)]);
        let outcome = runner.run_custom(single).await.unwrap();
        assert!(outcome.result.passed);
        assert_eq!(outcome.result.metrics.messages_sent, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_invariants_hold_for_any_seed(seed in any::<u64>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime.block_on(ScenarioRunner::new(seed).with_duration(20.0).run(ScenarioId::WideFanout));
            prop_assert!(result.passed, "{:?}", result.failure_reason);
        }
    }
}
