//! Task planning: task creation, ordering rules, cycle breaking and batching.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::plan::{Batch, ExecutionPlan, HandlerBindings, ManualEntry, ManualReason};
use crate::registry::FixRegistry;
use crate::risk::RiskAssessor;
use crate::store::IssueStore;
use crate::task::Task;

/// Selects tasks by source analyzer and/or issue type (glob patterns).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
}

impl Selector {
    pub fn analyzer(pattern: impl Into<String>) -> Self {
        Self {
            analyzer: Some(pattern.into()),
            issue_type: None,
        }
    }

    pub fn issue_type(pattern: impl Into<String>) -> Self {
        Self {
            analyzer: None,
            issue_type: Some(pattern.into()),
        }
    }

    fn compile(&self) -> CoreResult<CompiledSelector> {
        if self.analyzer.is_none() && self.issue_type.is_none() {
            return Err(CoreError::InvalidConfiguration(
                "ordering selector needs an analyzer or issue_type".to_string(),
            ));
        }
        Ok(CompiledSelector {
            analyzer: self.analyzer.as_deref().map(compile_pattern).transpose()?,
            issue_type: self.issue_type.as_deref().map(compile_pattern).transpose()?,
        })
    }
}

/// Tasks matching `before` must complete before tasks matching `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingRule {
    pub name: String,
    pub before: Selector,
    pub after: Selector,
}

impl OrderingRule {
    pub fn new(name: impl Into<String>, before: Selector, after: Selector) -> Self {
        Self {
            name: name.into(),
            before,
            after,
        }
    }

    /// Dependency fixes run before type fixes.
    pub fn dependencies_before_types() -> Self {
        Self::new(
            "dependencies-before-types",
            Selector::analyzer("dependency"),
            Selector::analyzer("types"),
        )
    }
}

/// Planner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub ordering_rules: Vec<OrderingRule>,
    /// Upper bound on tasks per batch.
    pub max_batch_size: Option<usize>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            ordering_rules: vec![OrderingRule::dependencies_before_types()],
            max_batch_size: None,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_batch_size == Some(0) {
            return Err(CoreError::InvalidConfiguration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        for rule in &self.ordering_rules {
            rule.before.compile()?;
            rule.after.compile()?;
        }
        Ok(())
    }
}

struct CompiledSelector {
    analyzer: Option<Pattern>,
    issue_type: Option<Pattern>,
}

impl CompiledSelector {
    fn matches(&self, task: &Task) -> bool {
        self.analyzer
            .as_ref()
            .map_or(true, |p| p.matches(&task.source_analyzer))
            && self
                .issue_type
                .as_ref()
                .map_or(true, |p| p.matches(&task.issue_type))
    }
}

fn compile_pattern(pattern: &str) -> CoreResult<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| CoreError::InvalidConfiguration(format!("invalid selector '{}': {}", pattern, e)))
}

/// Turns the issue store into an [`ExecutionPlan`].
pub struct TaskPlanner<'a> {
    assessor: &'a RiskAssessor,
    registry: &'a FixRegistry,
    config: &'a PlannerConfig,
}

impl<'a> TaskPlanner<'a> {
    pub fn new(assessor: &'a RiskAssessor, registry: &'a FixRegistry, config: &'a PlannerConfig) -> Self {
        Self {
            assessor,
            registry,
            config,
        }
    }

    pub fn plan(&self, store: &IssueStore) -> CoreResult<ExecutionPlan> {
        let mut plan = ExecutionPlan::default();
        let mut tasks = Vec::new();

        for issue in store.iter() {
            let fix = match (&issue.fix, issue.auto_fixable) {
                (Some(fix), true) => fix,
                _ => {
                    plan.unfixable.push(issue.id.clone());
                    continue;
                }
            };

            let score = self.assessor.score(issue);
            if !self.assessor.is_executable(score.fix_risk) {
                debug!("Issue {} needs manual fix: risk {}", issue.id, score.fix_risk);
                plan.manual.push(ManualEntry {
                    issue_id: issue.id.clone(),
                    reason: ManualReason::FixRiskTooHigh {
                        risk: score.fix_risk,
                        detail: score.reasons.join("; "),
                    },
                });
                continue;
            }

            let Some(handler) = self.registry.get(&issue.issue_type) else {
                plan.manual.push(ManualEntry {
                    issue_id: issue.id.clone(),
                    reason: ManualReason::MissingHandler {
                        issue_type: issue.issue_type.clone(),
                    },
                });
                continue;
            };
            if !handler.supports(fix) {
                plan.manual.push(ManualEntry {
                    issue_id: issue.id.clone(),
                    reason: ManualReason::UnsupportedFix {
                        handler: handler.name().to_string(),
                        kind: fix.kind().to_string(),
                    },
                });
                continue;
            }

            let task = Task::new(issue, score.priority, score.fix_risk, handler.name());
            plan.handlers.bind(task.id.clone(), handler);
            tasks.push(task);
        }

        let mut graph = self.ordering_graph(&tasks)?;
        let dropped = graph.break_cycles(&tasks);
        for (index, cycle) in &dropped {
            let task = &tasks[*index];
            warn!("Dropping {} to manual-only: ordering cycle", task.id);
            plan.handlers.remove(&task.id);
            plan.manual.push(ManualEntry {
                issue_id: task.issue_id.clone(),
                reason: ManualReason::OrderingCycle {
                    cycle: cycle.iter().map(|i| tasks[*i].id.clone()).collect(),
                },
            });
        }

        plan.batches = self.batch(tasks, &graph, dropped.iter().map(|(i, _)| *i).collect());
        info!(
            "Planned {} tasks in {} batches ({} manual-only, {} unfixable)",
            plan.task_count(),
            plan.batches.len(),
            plan.manual.len(),
            plan.unfixable.len()
        );
        Ok(plan)
    }

    fn ordering_graph(&self, tasks: &[Task]) -> CoreResult<OrderingGraph> {
        let rules = self
            .config
            .ordering_rules
            .iter()
            .map(|rule| Ok((rule.before.compile()?, rule.after.compile()?)))
            .collect::<CoreResult<Vec<_>>>()?;

        let mut graph = OrderingGraph::new(tasks.len());
        for (before, after) in &rules {
            for (i, first) in tasks.iter().enumerate() {
                if !before.matches(first) {
                    continue;
                }
                for (j, second) in tasks.iter().enumerate() {
                    if i != j && after.matches(second) {
                        graph.add_edge(i, j);
                    }
                }
            }
        }
        Ok(graph)
    }

    /// Greedy maximal independent sets over ready tasks, highest priority first.
    fn batch(&self, tasks: Vec<Task>, graph: &OrderingGraph, dropped: HashSet<usize>) -> Vec<Batch> {
        let limit = self.config.max_batch_size.unwrap_or(usize::MAX);
        let mut placed: HashSet<usize> = HashSet::new();
        let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
        let mut batches = Vec::new();

        loop {
            let mut ready: Vec<usize> = (0..slots.len())
                .filter(|i| !placed.contains(i) && !dropped.contains(i))
                .filter(|i| {
                    graph.preds[*i]
                        .iter()
                        .all(|p| placed.contains(p) || dropped.contains(p))
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort_by(|a, b| by_priority(slots[*a].as_ref(), slots[*b].as_ref()));

            let mut members: Vec<Task> = Vec::new();
            for index in ready {
                if members.len() >= limit {
                    break;
                }
                let Some(candidate) = slots[index].as_ref() else {
                    continue;
                };
                if members.iter().any(|m| m.conflicts_with(candidate)) {
                    continue;
                }
                if let Some(mut task) = slots[index].take() {
                    task.batch = Some(batches.len());
                    members.push(task);
                    placed.insert(index);
                }
            }

            batches.push(Batch {
                index: batches.len(),
                tasks: members,
            });
        }
        batches
    }
}

fn by_priority(a: Option<&Task>, b: Option<&Task>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b
            .priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id)),
        _ => Ordering::Equal,
    }
}

/// Precedence edges between tasks, by index.
struct OrderingGraph {
    preds: Vec<BTreeSet<usize>>,
    succs: Vec<BTreeSet<usize>>,
}

impl OrderingGraph {
    fn new(size: usize) -> Self {
        Self {
            preds: vec![BTreeSet::new(); size],
            succs: vec![BTreeSet::new(); size],
        }
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.succs[from].insert(to);
        self.preds[to].insert(from);
    }

    /// Remove the lowest-priority task of each cycle until the graph is acyclic.
    ///
    /// Returns the dropped task indices with the cycle each one was on.
    fn break_cycles(&mut self, tasks: &[Task]) -> Vec<(usize, Vec<usize>)> {
        let mut dropped = Vec::new();
        let mut removed: HashSet<usize> = HashSet::new();

        loop {
            let remaining = self.unsorted(&removed);
            let Some(&start) = remaining.iter().next() else {
                break;
            };
            let cycle = self.find_cycle(start, &remaining);
            let Some(&victim) = cycle.iter().min_by(|a, b| {
                tasks[**a]
                    .priority
                    .partial_cmp(&tasks[**b].priority)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| tasks[**b].id.cmp(&tasks[**a].id))
            }) else {
                break;
            };
            removed.insert(victim);
            dropped.push((victim, cycle));
        }
        dropped
    }

    /// Nodes left over after Kahn's algorithm; all of them sit on or behind a cycle.
    fn unsorted(&self, removed: &HashSet<usize>) -> BTreeSet<usize> {
        let active = |i: &usize| !removed.contains(i);
        let mut in_degree: Vec<usize> = self
            .preds
            .iter()
            .map(|preds| preds.iter().filter(|p| active(p)).count())
            .collect();
        let mut queue: Vec<usize> = (0..self.preds.len())
            .filter(|i| active(i) && in_degree[*i] == 0)
            .collect();
        let mut sorted: HashSet<usize> = HashSet::new();

        while let Some(node) = queue.pop() {
            sorted.insert(node);
            for &next in self.succs[node].iter().filter(|n| active(n)) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        (0..self.preds.len())
            .filter(|i| active(i) && !sorted.contains(i))
            .collect()
    }

    /// Walk predecessors inside `remaining` until a node repeats.
    ///
    /// Every node left by Kahn's algorithm has a predecessor in the same set,
    /// so the walk always closes a cycle.
    fn find_cycle(&self, start: usize, remaining: &BTreeSet<usize>) -> Vec<usize> {
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&pred) = self.preds[current].iter().find(|p| remaining.contains(p)) else {
                return path;
            };
            if let Some(pos) = path.iter().position(|n| *n == pred) {
                let mut cycle = path.split_off(pos);
                cycle.reverse();
                return cycle;
            }
            path.push(pred);
            current = pred;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::CoreResult;
    use crate::fix::{FixHandler, FixWorkspace};
    use crate::issue::{FixDescriptor, Issue, Severity};
    use crate::risk::{FixRisk, RiskConfig};

    struct Noop;

    #[async_trait]
    impl FixHandler for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn apply(&self, _: &Issue, _: &FixDescriptor, _: &mut FixWorkspace) -> CoreResult<()> {
            Ok(())
        }
    }

    fn fixable(issue_type: &str, analyzer: &str, file: &str, line: u32, severity: Severity) -> Issue {
        Issue::new(issue_type, severity, analyzer, "m")
            .at_file(file)
            .at_line(line)
            .with_fix(FixDescriptor::ReplaceText {
                file: PathBuf::from(file),
                line: Some(line),
                find: "a".to_string(),
                replace: "b".to_string(),
            })
    }

    fn registry(types: &[&str]) -> FixRegistry {
        let mut registry = FixRegistry::new();
        for t in types {
            registry.register(*t, Arc::new(Noop));
        }
        registry
    }

    fn plan(store: &IssueStore, registry: &FixRegistry, config: &PlannerConfig) -> ExecutionPlan {
        let assessor = RiskAssessor::new(RiskConfig::default()).unwrap();
        TaskPlanner::new(&assessor, registry, config).plan(store).unwrap()
    }

    #[test]
    fn test_same_file_goes_to_different_batches() {
        let mut store = IssueStore::new();
        store.insert(fixable("fix_a", "quality", "src/a.ts", 1, Severity::High));
        store.insert(fixable("fix_a", "quality", "src/a.ts", 9, Severity::Low));
        store.insert(fixable("fix_a", "quality", "src/b.ts", 1, Severity::Medium));

        let plan = plan(&store, &registry(&["fix_a"]), &PlannerConfig::default());
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].tasks.len(), 2);
        assert_eq!(plan.batches[0].tasks[0].issue_id.as_str(), "fix_a@src/a.ts:1");
        assert_eq!(plan.batches[1].tasks[0].issue_id.as_str(), "fix_a@src/a.ts:9");
        assert_eq!(plan.batches[1].tasks[0].batch, Some(1));
        assert!(plan.handler_for(&plan.batches[1].tasks[0].id).is_some());
    }

    #[test]
    fn test_batches_have_disjoint_footprints() {
        let mut store = IssueStore::new();
        for line in 1..=5 {
            store.insert(fixable("fix_a", "quality", "shared.ts", line, Severity::Medium));
            store.insert(fixable("fix_a", "quality", &format!("f{}.ts", line), 1, Severity::Low));
        }
        let plan = plan(&store, &registry(&["fix_a"]), &PlannerConfig::default());
        assert_eq!(plan.task_count(), 10);
        for batch in &plan.batches {
            for (i, a) in batch.tasks.iter().enumerate() {
                for b in &batch.tasks[i + 1..] {
                    assert!(!a.conflicts_with(b));
                }
            }
        }
    }

    #[test]
    fn test_non_fixable_high_risk_and_missing_handler() {
        let mut store = IssueStore::new();
        store.insert(Issue::new("hardcoded_secret", Severity::Critical, "security", "key").at_file("a.ts"));
        store.insert(fixable("unpinned_dependency", "dependency", "package.json", 3, Severity::Medium));
        store.insert(fixable("no_handler", "quality", "src/c.ts", 1, Severity::Low));
        store.insert(fixable("fix_a", "quality", "src/d.ts", 1, Severity::Low));

        let plan = plan(&store, &registry(&["fix_a", "unpinned_dependency"]), &PlannerConfig::default());
        assert_eq!(plan.task_count(), 1);
        assert_eq!(plan.unfixable.len(), 1);
        assert_eq!(plan.manual.len(), 2);

        let risky = plan.manual.iter().find(|m| m.issue_id.as_str().starts_with("unpinned")).unwrap();
        assert!(matches!(
            risky.reason,
            ManualReason::FixRiskTooHigh { risk: FixRisk::High, .. }
        ));
        let missing = plan.manual.iter().find(|m| m.issue_id.as_str().starts_with("no_handler")).unwrap();
        assert!(matches!(missing.reason, ManualReason::MissingHandler { .. }));
    }

    #[test]
    fn test_ordering_rule_sequences_batches() {
        let mut store = IssueStore::new();
        store.insert(fixable("type_error", "types", "src/t.ts", 1, Severity::Critical));
        store.insert(fixable("outdated", "dependency", "src/deps.ts", 1, Severity::Low));

        let plan = plan(&store, &registry(&["type_error", "outdated"]), &PlannerConfig::default());
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].tasks[0].source_analyzer, "dependency");
        assert_eq!(plan.batches[1].tasks[0].source_analyzer, "types");
    }

    #[test]
    fn test_cycle_drops_lowest_priority() {
        let mut store = IssueStore::new();
        store.insert(fixable("fix_a", "alpha", "a.ts", 1, Severity::High));
        store.insert(fixable("fix_b", "beta", "b.ts", 1, Severity::Low));
        store.insert(fixable("fix_c", "gamma", "c.ts", 1, Severity::Medium));

        let config = PlannerConfig {
            ordering_rules: vec![
                OrderingRule::new("a-b", Selector::analyzer("alpha"), Selector::analyzer("beta")),
                OrderingRule::new("b-a", Selector::analyzer("beta"), Selector::analyzer("alpha")),
            ],
            max_batch_size: None,
        };
        let plan = plan(&store, &registry(&["fix_a", "fix_b", "fix_c"]), &config);

        assert_eq!(plan.task_count(), 2);
        assert_eq!(plan.manual.len(), 1);
        assert_eq!(plan.manual[0].issue_id.as_str(), "fix_b@b.ts:1");
        match &plan.manual[0].reason {
            ManualReason::OrderingCycle { cycle } => assert_eq!(cycle.len(), 2),
            other => panic!("unexpected reason {:?}", other),
        }
    }

    #[test]
    fn test_max_batch_size() {
        let mut store = IssueStore::new();
        for i in 0..5 {
            store.insert(fixable("fix_a", "quality", &format!("f{}.ts", i), 1, Severity::Low));
        }
        let config = PlannerConfig {
            max_batch_size: Some(2),
            ..PlannerConfig::default()
        };
        let plan = plan(&store, &registry(&["fix_a"]), &config);
        let sizes: Vec<usize> = plan.batches.iter().map(|b| b.tasks.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_config_validation() {
        let config = PlannerConfig {
            max_batch_size: Some(0),
            ..PlannerConfig::default()
        };
        assert!(config.validate().is_err());

        let empty = PlannerConfig {
            ordering_rules: vec![OrderingRule::new("bad", Selector::default(), Selector::analyzer("x"))],
            max_batch_size: None,
        };
        assert!(empty.validate().is_err());
        assert!(PlannerConfig::default().validate().is_ok());
    }
}
