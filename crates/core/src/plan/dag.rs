use crate::error::{PlanError, PlanResult};
use crate::types::{Plan, StepId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Validated dependency graph of a plan, layered into execution levels
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<StepId, ()>,
    step_indices: HashMap<StepId, NodeIndex>,
    levels: Vec<Vec<StepId>>,
}

/// Validate a plan and compute its maximal-parallelism levels
pub fn compile(plan: &Plan) -> PlanResult<ExecutionGraph> {
    ExecutionGraph::from_plan(plan)
}

impl ExecutionGraph {
    /// Build the graph, rejecting duplicate ids, unknown dependencies,
    /// invalid timeouts and cycles
    pub fn from_plan(plan: &Plan) -> PlanResult<Self> {
        let mut graph = DiGraph::new();
        let mut step_indices = HashMap::new();

        // Add all steps as nodes
        for step in &plan.steps {
            if step_indices.contains_key(&step.id) {
                return Err(PlanError::DuplicateStep(step.id.to_string()));
            }

            if let Some(secs) = step.timeout {
                if Duration::try_from_secs_f64(secs).is_err() {
                    return Err(PlanError::InvalidTimeout {
                        step: step.id.to_string(),
                        value: secs,
                    });
                }
            }

            let node = graph.add_node(step.id.clone());
            step_indices.insert(step.id.clone(), node);
        }

        // Add dependency edges (dep -> step)
        for step in &plan.steps {
            let step_idx = step_indices[&step.id];
            let mut seen = HashSet::new();

            for dep_id in &step.depends_on {
                let dep_idx = step_indices.get(dep_id).ok_or_else(|| {
                    PlanError::UnknownDependency {
                        step: step.id.to_string(),
                        dependency: dep_id.to_string(),
                    }
                })?;

                if seen.insert(dep_id) {
                    graph.add_edge(*dep_idx, step_idx, ());
                }
            }
        }

        let levels = Self::layer(&graph)?;

        tracing::debug!(
            "Compiled plan {} into {} level(s)",
            plan.plan_id,
            levels.len()
        );

        Ok(Self {
            graph,
            step_indices,
            levels,
        })
    }

    /// Kahn layering: repeatedly peel every node whose dependencies are all
    /// assigned. Anything left over sits on a cycle or behind one.
    fn layer(graph: &DiGraph<StepId, ()>) -> PlanResult<Vec<Vec<StepId>>> {
        let mut remaining_deps: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut current: Vec<NodeIndex> = remaining_deps
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&n, _)| n)
            .collect();

        let mut levels = Vec::new();
        let mut assigned = 0;

        while !current.is_empty() {
            let mut next = Vec::new();

            for &node in &current {
                for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(count) = remaining_deps.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }

            assigned += current.len();

            let mut level: Vec<StepId> = current.iter().map(|&n| graph[n].clone()).collect();
            level.sort();
            levels.push(level);

            current = next;
        }

        if assigned < graph.node_count() {
            let mut steps: Vec<String> = remaining_deps
                .iter()
                .filter(|(_, &count)| count > 0)
                .map(|(&n, _)| graph[n].to_string())
                .collect();
            steps.sort();
            return Err(PlanError::Cycle { steps });
        }

        Ok(levels)
    }

    /// Levels in execution order, each sorted by step id
    pub fn levels(&self) -> &[Vec<StepId>] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<Vec<StepId>> {
        self.levels
    }

    /// Number of steps in the graph
    pub fn step_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Level a step was placed in
    pub fn level_of(&self, step_id: &StepId) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(step_id))
    }

    /// Get dependencies for a step
    pub fn dependencies(&self, step_id: &StepId) -> Option<Vec<StepId>> {
        self.neighbors(step_id, Direction::Incoming)
    }

    /// Get steps that depend on the given step
    pub fn dependents(&self, step_id: &StepId) -> Option<Vec<StepId>> {
        self.neighbors(step_id, Direction::Outgoing)
    }

    fn neighbors(&self, step_id: &StepId, direction: Direction) -> Option<Vec<StepId>> {
        let node = self.step_indices.get(step_id)?;

        let mut ids: Vec<StepId> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();

        Some(ids)
    }
}
