//! Named cluster scenarios for the simulation runner.

use lamport_core::{ClusterConfig, NodeDescriptor, DEFAULT_PEER_COUNT};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Three nodes at 2, 4 and 6 ticks/s
    Triangle,

    /// Three nodes at the same rate
    Uniform,

    /// One slow node flooded by two fast ones
    SlowReceiver,

    /// One node cut off for the middle third of the run
    Partition,

    /// 30% loss on every link
    LossyLinks,

    /// Five nodes, each sending to four peers
    WideFanout,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Triangle,
            ScenarioId::Uniform,
            ScenarioId::SlowReceiver,
            ScenarioId::Partition,
            ScenarioId::LossyLinks,
            ScenarioId::WideFanout,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => "triangle",
            ScenarioId::Uniform => "uniform",
            ScenarioId::SlowReceiver => "slow_receiver",
            ScenarioId::Partition => "partition",
            ScenarioId::LossyLinks => "lossy_links",
            ScenarioId::WideFanout => "wide_fanout",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => "A/B/C at 2/4/6 ticks per second, no faults",
            ScenarioId::Uniform => "A/B/C all at 3 ticks per second, clocks stay close",
            ScenarioId::SlowReceiver => "A at 1 tick per second fed by B and C at 6, backlog grows",
            ScenarioId::Partition => "A isolated for the middle third, then healed",
            ScenarioId::LossyLinks => "30% of messages time out on every link",
            ScenarioId::WideFanout => "A..E at 2..6 ticks per second with four peers each",
        }
    }

    /// The cluster this scenario runs.
    pub fn cluster(&self) -> ClusterConfig {
        match self {
            ScenarioId::Triangle | ScenarioId::Partition | ScenarioId::LossyLinks => ClusterConfig::triangle(),
            ScenarioId::Uniform => ClusterConfig::new(vec![
                NodeDescriptor::new("A", 50051, 3.0),
                NodeDescriptor::new("B", 50052, 3.0),
                NodeDescriptor::new("C", 50053, 3.0),
            ]),
            ScenarioId::SlowReceiver => ClusterConfig::new(vec![
                NodeDescriptor::new("A", 50051, 1.0),
                NodeDescriptor::new("B", 50052, 6.0),
                NodeDescriptor::new("C", 50053, 6.0),
            ]),
            ScenarioId::WideFanout => ClusterConfig::new(
                ["A", "B", "C", "D", "E"]
                    .iter()
                    .enumerate()
                    .map(|(i, name)| NodeDescriptor::new(*name, 50051 + i as u16, 2.0 + i as f64))
                    .collect(),
            ),
        }
    }

    /// Peers selected per node.
    pub fn peer_count(&self) -> usize {
        match self {
            ScenarioId::WideFanout => 4,
            _ => DEFAULT_PEER_COUNT,
        }
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
            "triangle" => Ok(ScenarioId::Triangle),
            "uniform" => Ok(ScenarioId::Uniform),
            "slow_receiver" | "slowreceiver" => Ok(ScenarioId::SlowReceiver),
            "partition" => Ok(ScenarioId::Partition),
            "lossy_links" | "lossylinks" | "lossy" => Ok(ScenarioId::LossyLinks),
            "wide_fanout" | "widefanout" | "fanout" => Ok(ScenarioId::WideFanout),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("Lossy".parse::<ScenarioId>(), Ok(ScenarioId::LossyLinks));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_every_cluster_is_valid() {
        for scenario in ScenarioId::all() {
            let nodes = scenario.cluster().validate().unwrap();
            assert!(nodes.len() > scenario.peer_count());
        }
        assert_eq!(ScenarioId::WideFanout.cluster().nodes.len(), 5);
    }
}
