//! Plan compiler - turns step descriptors into a dependency-ordered plan

use crate::error::CompileError;
use crate::step::{StepDescriptor, StepId};
use std::collections::{BTreeMap, BTreeSet};

/// Steps in an order where every prerequisite precedes its dependents
///
/// A `Plan` can only be built by [`compile`], so holding one means the
/// identifiers are unique, every prerequisite exists and there is no cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<StepDescriptor>,
}

impl Plan {
    /// Steps in execution order
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepDescriptor> {
        self.steps.iter()
    }

    /// Step identifiers in execution order
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(StepDescriptor::id).collect()
    }

    /// Find a step by identifier
    pub fn get(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a StepDescriptor;
    type IntoIter = std::slice::Iter<'a, StepDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Compile step descriptors into a plan
///
/// Uses Kahn's algorithm with the ready set ordered by identifier, so equal
/// candidates always come out in lexical order and the result does not
/// depend on declaration order.
pub fn compile(steps: impl IntoIterator<Item = StepDescriptor>) -> Result<Plan, CompileError> {
    let mut by_id: BTreeMap<StepId, StepDescriptor> = BTreeMap::new();
    for step in steps {
        if by_id.contains_key(step.id()) {
            return Err(CompileError::DuplicateStep {
                id: step.id().to_string(),
            });
        }
        by_id.insert(step.id().to_string(), step);
    }

    // BTreeMap iteration makes the first reported problem deterministic
    for step in by_id.values() {
        let mut missing: Vec<&StepId> = step
            .prerequisites()
            .iter()
            .filter(|req| !by_id.contains_key(req.as_str()))
            .collect();
        missing.sort();
        if let Some(missing) = missing.first() {
            return Err(CompileError::MissingPrerequisite {
                step: step.id().to_string(),
                missing: (*missing).clone(),
            });
        }
    }

    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for step in by_id.values() {
        let prereqs: BTreeSet<&str> = step.prerequisites().iter().map(String::as_str).collect();
        indegree.insert(step.id(), prereqs.len());
        for prereq in prereqs {
            dependents.entry(prereq).or_default().insert(step.id());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order: Vec<StepId> = Vec::with_capacity(by_id.len());

    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for &dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < by_id.len() {
        let blocked: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        return Err(CompileError::Cycle {
            cycle: find_cycle(&by_id, &blocked),
        });
    }

    log::debug!("Compiled plan: {}", order.join(", "));

    let steps = order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();
    Ok(Plan { steps })
}

/// Extract one concrete cycle from the steps Kahn's algorithm could not order
///
/// Every blocked step has at least one blocked prerequisite, so walking
/// prerequisites from any blocked step must revisit a step. The walk starts
/// at the lexically smallest blocked step and always follows the smallest
/// blocked prerequisite; the cycle is rotated to start at its smallest member.
fn find_cycle(by_id: &BTreeMap<StepId, StepDescriptor>, blocked: &BTreeSet<&str>) -> Vec<StepId> {
    let Some(&start) = blocked.first() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut position: BTreeMap<&str, usize> = BTreeMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = position.get(current) {
            let mut cycle: Vec<StepId> = path[at..].iter().map(|s| (*s).to_string()).collect();
            // Walk followed prerequisites; reverse into dependency order
            cycle.reverse();
            if let Some(min_at) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(min_at);
            }
            return cycle;
        }

        position.insert(current, path.len());
        path.push(current);

        let next = by_id.get(current).and_then(|step| {
            step.prerequisites()
                .iter()
                .map(String::as_str)
                .filter(|req| blocked.contains(req))
                .min()
        });

        match next {
            Some(next) => current = next,
            None => return path.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}
