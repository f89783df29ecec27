// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step graph construction.
//!
//! A pipeline's declared steps become a finite-state execution graph with a
//! synthetic `Catch` state that every task routes its failures to.
//!
//! Construction happens in two passes over an arena:
//!
//! 1. Allocate a node id for every step: the catch node first, then the
//!    declared steps in reverse declaration order. The node list therefore
//!    reads `Catch, D, C, B, A` for steps declared `A, B, C, D`, and the start
//!    state (the first declared step) is the last node.
//! 2. Resolve every `next` and every choice branch target by name. References
//!    may point anywhere in the declaration; a name that is not a step fails.
//!
//! The linked graph is then walked from the start state to reject cycles.
//! Steps the walk never reaches are kept but logged.

use lakeforge_dsl::ChoiceBranch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// Name of the synthetic failure state.
pub const CATCH_STATE: &str = "Catch";

const LAMBDA_INVOKE: &str = "arn:aws:states:::lambda:invoke";
const GLUE_START_JOB_RUN_SYNC: &str = "arn:aws:states:::glue:startJobRun.sync";
const ALL_ERRORS: &str = "States.ALL";

// ============================================================================
// Errors
// ============================================================================

/// Structural errors in a pipeline's step list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The pipeline declares no steps.
    EmptyPipeline,

    /// Two steps share a name, or a step uses the reserved catch name.
    DuplicateStep { step_name: String },

    /// A task's `next` names a step that does not exist.
    DanglingNext {
        step_name: String,
        next_step: String,
        available_steps: Vec<String>,
    },

    /// A choice branch names a step that does not exist.
    DanglingBranch {
        step_name: String,
        branch: usize,
        next_step: String,
        available_steps: Vec<String>,
    },

    /// A choice step has no branches.
    EmptyChoice { step_name: String },

    /// Following `next` and branch edges from the start returns to a step
    /// already on the path.
    Cycle { path: Vec<String> },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::EmptyPipeline => write!(f, "[G001] Pipeline has no steps defined"),
            GraphError::DuplicateStep { step_name } if step_name == CATCH_STATE => write!(
                f,
                "[G002] Step name '{}' is reserved for the failure state",
                step_name
            ),
            GraphError::DuplicateStep { step_name } => {
                write!(f, "[G002] Step '{}' is declared more than once", step_name)
            }
            GraphError::DanglingNext {
                step_name,
                next_step,
                available_steps,
            } => {
                write!(
                    f,
                    "[G003] Step '{}' continues to '{}' but step '{}' does not exist{}",
                    step_name,
                    next_step,
                    next_step,
                    suggestion(next_step, available_steps)
                )
            }
            GraphError::DanglingBranch {
                step_name,
                branch,
                next_step,
                available_steps,
            } => {
                write!(
                    f,
                    "[G004] Choice step '{}' branch {} routes to '{}' but step '{}' does not exist{}",
                    step_name,
                    branch,
                    next_step,
                    next_step,
                    suggestion(next_step, available_steps)
                )
            }
            GraphError::EmptyChoice { step_name } => {
                write!(f, "[G005] Choice step '{}' has no branches", step_name)
            }
            GraphError::Cycle { path } => {
                write!(f, "[G006] Steps form a cycle: {}", path.join(" → "))
            }
        }
    }
}

impl std::error::Error for GraphError {}

fn suggestion(target: &str, candidates: &[String]) -> String {
    find_similar_name(target, candidates)
        .map(|s| format!(". Did you mean '{}'?", s))
        .unwrap_or_default()
}

/// Closest candidate by edit distance, if it is close enough to be a typo.
fn find_similar_name(target: &str, candidates: &[String]) -> Option<String> {
    let target_lower = target.to_lowercase();

    candidates
        .iter()
        .filter_map(|candidate| {
            let distance = levenshtein_distance(&target_lower, &candidate.to_lowercase());
            if distance <= target.len() / 2 + 2 {
                Some((candidate.clone(), distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, d)| *d)
        .map(|(name, _)| name)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    if a_chars.is_empty() {
        return n;
    }
    if n == 0 {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for j in 1..=n {
            let cost = usize::from(*a_char != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

// ============================================================================
// Input
// ============================================================================

/// What a task step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    /// A function invoked with the execution state as payload.
    Function { name: String, arn: String },
    /// A batch job run to completion. Each argument is copied from the
    /// execution state field of the same name.
    BatchJob { name: String, arguments: Vec<String> },
}

impl TaskTarget {
    /// Rendered name of the resource the task runs.
    pub fn resource_name(&self) -> &str {
        match self {
            TaskTarget::Function { name, .. } | TaskTarget::BatchJob { name, .. } => name,
        }
    }
}

/// A declared step, ready to be placed in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub step_name: String,
    pub body: StepBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepBody {
    Task {
        target: TaskTarget,
        next_step: Option<String>,
    },
    Choice {
        branches: Vec<ChoiceBranch>,
    },
}

// ============================================================================
// Graph
// ============================================================================

/// Index of a node in [`StepGraph::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved choice branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub variable: String,
    pub equals: String,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepNode {
    /// Terminal failure state invoking the catch function.
    Catch { function_name: String },
    /// A task; fails over to the catch node, then continues to `next` or ends.
    Task {
        step_name: String,
        target: TaskTarget,
        next: Option<NodeId>,
    },
    /// Branches on string equality; falls back to the catch node.
    Choice {
        step_name: String,
        branches: Vec<Branch>,
    },
}

impl StepNode {
    pub fn step_name(&self) -> &str {
        match self {
            StepNode::Catch { .. } => CATCH_STATE,
            StepNode::Task { step_name, .. } | StepNode::Choice { step_name, .. } => step_name,
        }
    }

    /// Explicit outgoing edges. Failure edges to the catch node are implicit.
    fn successors(&self) -> Vec<NodeId> {
        match self {
            StepNode::Catch { .. } => Vec::new(),
            StepNode::Task { next, .. } => next.iter().copied().collect(),
            StepNode::Choice { branches, .. } => branches.iter().map(|b| b.target).collect(),
        }
    }
}

/// Linked execution graph of one pipeline.
#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
    start: NodeId,
}

impl StepGraph {
    /// Link `steps` (in declaration order) behind a catch node that invokes
    /// `catch_function`.
    pub fn build(catch_function: &str, steps: &[StepSpec]) -> Result<Self, GraphError> {
        if steps.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }

        // Pass 1: allocate ids.
        let mut index: HashMap<&str, NodeId> = HashMap::with_capacity(steps.len() + 1);
        index.insert(CATCH_STATE, NodeId(0));
        for (i, step) in steps.iter().rev().enumerate() {
            if index.insert(step.step_name.as_str(), NodeId(i + 1)).is_some() {
                return Err(GraphError::DuplicateStep {
                    step_name: step.step_name.clone(),
                });
            }
        }
        let available_steps = || steps.iter().map(|s| s.step_name.clone()).collect::<Vec<_>>();

        // Pass 2: resolve references.
        let mut nodes = Vec::with_capacity(steps.len() + 1);
        nodes.push(StepNode::Catch {
            function_name: catch_function.to_string(),
        });

        for step in steps.iter().rev() {
            let node = match &step.body {
                StepBody::Task { target, next_step } => {
                    let next = match next_step {
                        Some(next_step) => Some(*index.get(next_step.as_str()).ok_or_else(|| {
                            GraphError::DanglingNext {
                                step_name: step.step_name.clone(),
                                next_step: next_step.clone(),
                                available_steps: available_steps(),
                            }
                        })?),
                        None => None,
                    };
                    StepNode::Task {
                        step_name: step.step_name.clone(),
                        target: target.clone(),
                        next,
                    }
                }
                StepBody::Choice { branches } => {
                    if branches.is_empty() {
                        return Err(GraphError::EmptyChoice {
                            step_name: step.step_name.clone(),
                        });
                    }
                    let branches = branches
                        .iter()
                        .enumerate()
                        .map(|(i, branch)| -> Result<Branch, GraphError> {
                            let target = index.get(branch.next_step.as_str()).ok_or_else(|| {
                                GraphError::DanglingBranch {
                                    step_name: step.step_name.clone(),
                                    branch: i,
                                    next_step: branch.next_step.clone(),
                                    available_steps: available_steps(),
                                }
                            })?;
                            Ok(Branch {
                                variable: branch.variable.clone(),
                                equals: branch.equals.clone(),
                                target: *target,
                            })
                        })
                        .collect::<Result<Vec<_>, GraphError>>()?;
                    StepNode::Choice {
                        step_name: step.step_name.clone(),
                        branches,
                    }
                }
            };
            nodes.push(node);
        }

        let graph = StepGraph {
            start: NodeId(nodes.len() - 1),
            nodes,
        };

        let reached = graph.detect_cycles()?;
        for (i, node) in graph.nodes.iter().enumerate().skip(1) {
            if !reached.contains(&NodeId(i)) {
                warn!(step = node.step_name(), "Step is unreachable from the start state");
            }
        }

        debug!(
            start = graph.start_name(),
            nodes = graph.nodes.len(),
            "Built step graph"
        );
        Ok(graph)
    }

    /// Walk from the start state; fail on the first cycle found, otherwise
    /// return every node reached.
    ///
    /// The walk keeps its own stack so that long `next` chains do not grow
    /// the call stack.
    fn detect_cycles(&self) -> Result<HashSet<NodeId>, GraphError> {
        struct Frame {
            node: NodeId,
            children: Vec<NodeId>,
            cursor: usize,
        }

        let frame = |node: NodeId| Frame {
            node,
            children: self.nodes[node.0].successors(),
            cursor: 0,
        };

        let mut visited = HashSet::new();
        let mut on_path = HashSet::from([self.start]);
        let mut stack = vec![frame(self.start)];

        while let Some(top) = stack.last_mut() {
            let Some(&child) = top.children.get(top.cursor) else {
                let done = top.node;
                stack.pop();
                on_path.remove(&done);
                visited.insert(done);
                continue;
            };
            top.cursor += 1;

            if on_path.contains(&child) {
                let pos = stack.iter().position(|f| f.node == child).unwrap_or(0);
                let mut cycle: Vec<String> = stack[pos..]
                    .iter()
                    .map(|f| self.nodes[f.node.0].step_name().to_string())
                    .collect();
                cycle.push(self.nodes[child.0].step_name().to_string());
                return Err(GraphError::Cycle { path: cycle });
            }
            if visited.contains(&child) {
                continue;
            }

            on_path.insert(child);
            stack.push(frame(child));
        }

        Ok(visited)
    }

    /// Nodes in construction order: catch first, then steps last-declared
    /// first.
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &StepNode {
        &self.nodes[id.0]
    }

    pub fn id_of(&self, step_name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.step_name() == step_name)
            .map(NodeId)
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn start_name(&self) -> &str {
        self.nodes[self.start.0].step_name()
    }

    /// Task targets in node order.
    pub fn task_targets(&self) -> Vec<&TaskTarget> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                StepNode::Task { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn catch_function(&self) -> &str {
        match &self.nodes[0] {
            StepNode::Catch { function_name } => function_name,
            _ => "",
        }
    }

    /// Render the graph into its definition document.
    pub fn definition(&self) -> StateMachineDefinition {
        let mut states = Map::new();
        for node in &self.nodes {
            states.insert(node.step_name().to_string(), self.state(node));
        }
        StateMachineDefinition {
            start_at: self.start_name().to_string(),
            states,
        }
    }

    fn state(&self, node: &StepNode) -> Value {
        match node {
            StepNode::Catch { function_name } => json!({
                "Type": "Task",
                "Resource": LAMBDA_INVOKE,
                "Parameters": {
                    "FunctionName": function_name,
                    "Payload.$": "$",
                },
                "End": true,
            }),
            StepNode::Task { target, next, .. } => {
                let mut state = match target {
                    TaskTarget::Function { arn, .. } => json!({
                        "Type": "Task",
                        "Resource": arn,
                    }),
                    TaskTarget::BatchJob { name, arguments } => {
                        let arguments: Map<String, Value> = arguments
                            .iter()
                            .map(|arg| (format!("--{}.$", arg), Value::from(format!("$.{}", arg))))
                            .collect();
                        json!({
                            "Type": "Task",
                            "Resource": GLUE_START_JOB_RUN_SYNC,
                            "Parameters": {
                                "JobName": name,
                                "Arguments": arguments,
                            },
                        })
                    }
                };
                state["Catch"] = json!([{ "ErrorEquals": [ALL_ERRORS], "Next": CATCH_STATE }]);
                if matches!(target, TaskTarget::BatchJob { .. }) {
                    state["ResultPath"] = Value::Null;
                }
                match next {
                    Some(next) => state["Next"] = json!(self.nodes[next.0].step_name()),
                    None => state["End"] = json!(true),
                }
                state
            }
            StepNode::Choice { branches, .. } => {
                let choices: Vec<Value> = branches
                    .iter()
                    .map(|b| {
                        json!({
                            "Variable": format!("$.{}", b.variable),
                            "StringEquals": b.equals,
                            "Next": self.nodes[b.target.0].step_name(),
                        })
                    })
                    .collect();
                json!({
                    "Type": "Choice",
                    "Choices": choices,
                    "Default": CATCH_STATE,
                })
            }
        }
    }
}

/// Graph definition document handed to the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineDefinition {
    pub start_at: String,
    pub states: Map<String, Value>,
}
