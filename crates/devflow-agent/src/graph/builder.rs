use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devflow_core::error::{DevflowError, Result};
use devflow_core::traits::Step;
use devflow_core::types::{BranchKey, END, START};

use super::registry::StepRegistry;
use super::transition::{Predicate, StatusRoute, Transition};

/// A validated step graph.
#[derive(Clone)]
pub struct WorkflowGraph {
    steps: StepRegistry,
    transitions: HashMap<String, Transition>,
    entry: String,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("entry", &self.entry)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}

impl WorkflowGraph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step(&self, id: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(id)
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.get(id)
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    /// Whether `id` names a step of this graph or the terminal marker.
    pub fn has_node(&self, id: &str) -> bool {
        id == END || self.steps.contains(id)
    }

    /// Static node and edge listing, including the start and end markers.
    pub fn describe(&self) -> GraphDescription {
        let mut nodes = vec![NodeDescription {
            id: START.to_string(),
            description: String::new(),
        }];
        let mut edges = vec![EdgeDescription {
            source: START.to_string(),
            target: self.entry.clone(),
            branch: None,
            condition: None,
        }];

        for id in self.steps.ids() {
            let description = self
                .steps
                .get(id)
                .map(|s| s.description().to_string())
                .unwrap_or_default();
            nodes.push(NodeDescription {
                id: id.clone(),
                description,
            });

            match self.transitions.get(id) {
                Some(Transition::Direct(to)) => edges.push(EdgeDescription {
                    source: id.clone(),
                    target: to.clone(),
                    branch: None,
                    condition: None,
                }),
                Some(Transition::Conditional { predicate, branches }) => {
                    let label = predicate.label();
                    for (key, to) in branches {
                        edges.push(EdgeDescription {
                            source: id.clone(),
                            target: to.clone(),
                            branch: Some(*key),
                            condition: Some(label.clone()),
                        });
                    }
                }
                None => {}
            }
        }

        nodes.push(NodeDescription {
            id: END.to_string(),
            description: String::new(),
        });

        GraphDescription { nodes, edges }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDescription>,
    pub edges: Vec<EdgeDescription>,
}

impl GraphDescription {
    /// Render as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for edge in &self.edges {
            let _ = match edge.branch {
                Some(branch) => writeln!(out, "    {} -->|{}| {}", edge.source, branch, edge.target),
                None => writeln!(out, "    {} --> {}", edge.source, edge.target),
            };
        }
        out
    }
}

/// Incrementally assembles a [`WorkflowGraph`]; `build()` validates it.
#[derive(Default)]
pub struct GraphBuilder {
    steps: StepRegistry,
    transitions: Vec<(String, Transition)>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl Step) -> Self {
        self.steps.register(step);
        self
    }

    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.register_arc(step);
        self
    }

    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions
            .push((from.into(), Transition::Direct(to.into())));
        self
    }

    pub fn conditional<'a>(
        mut self,
        from: impl Into<String>,
        predicate: impl Into<Predicate>,
        branches: impl IntoIterator<Item = (BranchKey, &'a str)>,
    ) -> Self {
        let branches: BTreeMap<BranchKey, String> = branches
            .into_iter()
            .map(|(k, to)| (k, to.to_string()))
            .collect();
        self.transitions.push((
            from.into(),
            Transition::Conditional {
                predicate: predicate.into(),
                branches,
            },
        ));
        self
    }

    /// Conditional edge on a status field: `proceed` goes to `on_proceed`,
    /// anything else to `on_otherwise` under the route's fallback key.
    pub fn status_route(
        self,
        from: impl Into<String>,
        route: StatusRoute,
        on_proceed: &str,
        on_otherwise: &str,
    ) -> Self {
        let otherwise = route.otherwise;
        self.conditional(
            from,
            route,
            [(BranchKey::Proceed, on_proceed), (otherwise, on_otherwise)],
        )
    }

    pub fn build(self) -> Result<WorkflowGraph> {
        let entry = self
            .entry
            .ok_or_else(|| DevflowError::Config("graph has no entry step".into()))?;
        if !self.steps.contains(&entry) {
            return Err(DevflowError::UnknownStep(entry));
        }

        let mut transitions: HashMap<String, Transition> = HashMap::new();
        for (from, transition) in self.transitions {
            if !self.steps.contains(&from) {
                return Err(DevflowError::UnknownStep(from));
            }
            for target in transition.targets() {
                if target != END && !self.steps.contains(target) {
                    return Err(DevflowError::Config(format!(
                        "transition from '{}' targets unknown step '{}'",
                        from, target
                    )));
                }
            }
            if let Transition::Conditional { predicate, branches } = &transition {
                for key in predicate.possible_branches().unwrap_or_default() {
                    if !branches.contains_key(&key) {
                        return Err(DevflowError::Config(format!(
                            "conditional edge from '{}' does not map branch '{}'",
                            from, key
                        )));
                    }
                }
            }
            if transitions.insert(from.clone(), transition).is_some() {
                return Err(DevflowError::Config(format!(
                    "step '{}' has more than one outgoing transition",
                    from
                )));
            }
        }

        for id in self.steps.ids() {
            if !transitions.contains_key(id) {
                return Err(DevflowError::Config(format!(
                    "step '{}' has no outgoing transition",
                    id
                )));
            }
        }

        Ok(WorkflowGraph {
            steps: self.steps,
            transitions,
            entry,
        })
    }
}
