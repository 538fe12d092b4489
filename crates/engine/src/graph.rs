//! Formula structure checks and step-graph lookups.
//!
//! Rules enforced before a run starts:
//! 1. Step names must be unique within the formula.
//! 2. Exactly one trigger is active.
//! 3. Some step is named in the active trigger's `on_success` list.
//!
//! Edges that name unknown steps are legal: following one ends the walk.

use std::collections::{HashMap, HashSet};

use crate::{Formula, FormulaError, Step, Trigger};

/// Where a validated formula starts.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub trigger: &'a Trigger,
    pub first_step: &'a Step,
}

/// Validate the formula and return its entry point.
///
/// # Errors
/// - [`FormulaError::DuplicateStepName`] if two steps share a name.
/// - [`FormulaError::NoActiveTrigger`] / [`FormulaError::MultipleActiveTriggers`]
///   unless exactly one trigger is active.
/// - [`FormulaError::NoFirstStep`] if no step matches the trigger's list.
pub fn validate_formula(formula: &Formula) -> Result<Entry<'_>, FormulaError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for step in &formula.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(FormulaError::DuplicateStepName(step.name.clone()));
        }
    }

    let active: Vec<&Trigger> = formula.triggers.iter().filter(|t| t.active).collect();
    let trigger = match active.as_slice() {
        [] => return Err(FormulaError::NoActiveTrigger),
        [only] => *only,
        many => {
            return Err(FormulaError::MultipleActiveTriggers(
                many.iter().map(|t| t.name.clone()).collect(),
            ))
        }
    };

    // First match in step-list order, as authored.
    let first_step = formula
        .steps
        .iter()
        .find(|step| trigger.on_success.contains(&step.name))
        .ok_or(FormulaError::NoFirstStep)?;

    Ok(Entry {
        trigger,
        first_step,
    })
}

/// Name index over a formula's steps.
pub struct StepGraph<'a> {
    by_name: HashMap<&'a str, &'a Step>,
}

impl<'a> StepGraph<'a> {
    pub fn new(formula: &'a Formula) -> Self {
        Self {
            by_name: formula.steps.iter().map(|s| (s.name.as_str(), s)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'a Step> {
        self.by_name.get(name).copied()
    }

    /// Follow the success or failure edge of `step`.
    pub fn next(&self, step: &Step, succeeded: bool) -> Option<&'a Step> {
        step.next_name(succeeded).and_then(|name| self.get(name))
    }
}
