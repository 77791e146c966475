// src/pipeline/catalog.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SnpflowError};
use crate::pipeline::stage::Stage;
use crate::stages::default_stages;

/// Ordered, validated set of stages.
///
/// Position in the catalog is the stage's ordinal; `run_from` and resume
/// use it as the total order.
#[derive(Debug)]
pub struct StageCatalog {
    stages: Vec<Box<dyn Stage>>,
    positions: HashMap<&'static str, usize>,
}

impl StageCatalog {
    /// Validate and wrap `stages`.
    ///
    /// Rejects duplicate ids, unknown or later upstream stages, and cycles.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(stages.len());
        for (idx, stage) in stages.iter().enumerate() {
            if positions.insert(stage.id(), idx).is_some() {
                return Err(SnpflowError::CatalogError(format!(
                    "duplicate stage id '{}'",
                    stage.id()
                )));
            }
        }

        validate_upstream(&stages, &positions)?;

        Ok(Self { stages, positions })
    }

    /// The variant-calling pipeline.
    pub fn standard() -> Result<Self> {
        Self::new(default_stages())
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Stage> {
        self.position(id).map(|idx| self.stages[idx].as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.id())
    }

    /// Ordinal of `id`, or `UnknownStage`.
    pub fn require(&self, id: &str) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| SnpflowError::UnknownStage(id.to_string()))
    }

    /// Union of every stage's tools, sorted.
    pub fn required_tools(&self) -> BTreeSet<&'static str> {
        self.stages
            .iter()
            .flat_map(|s| s.required_tools().iter().copied())
            .collect()
    }
}

fn validate_upstream(
    stages: &[Box<dyn Stage>],
    positions: &HashMap<&'static str, usize>,
) -> Result<()> {
    // Edge direction: upstream -> consumer.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for stage in stages {
        graph.add_node(stage.id());
    }

    for (idx, stage) in stages.iter().enumerate() {
        for &upstream in stage.upstream() {
            let Some(&up_idx) = positions.get(upstream) else {
                return Err(SnpflowError::CatalogError(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    stage.id(),
                    upstream
                )));
            };
            if up_idx >= idx {
                return Err(SnpflowError::CatalogError(format!(
                    "stage '{}' depends on '{}', which does not run before it",
                    stage.id(),
                    upstream
                )));
            }
            graph.add_edge(upstream, stage.id(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SnpflowError::CatalogError(format!(
            "cycle detected in stage graph involving '{}'",
            cycle.node_id()
        ))),
    }
}
