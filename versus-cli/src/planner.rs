//! Benchmark Planner
//!
//! Narrows the configured plan down to the tasks selected on the command line.
//!
//! Filtering options:
//! - Regex pattern matching on task name
//! - Scale restriction
//!
//! Ordering: tasks keep their configured order; the core plan expands them
//! into cells deterministically.

use regex::Regex;
use versus_core::{BenchmarkPlan, Scale};

/// Filtered plan plus the task names that were filtered out
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Plan containing only the selected tasks
    pub plan: BenchmarkPlan,
    /// Tasks removed by the filters, in configured order
    pub filtered_out: Vec<String>,
}

impl ExecutionPlan {
    /// Whether anything is left to run
    pub fn is_empty(&self) -> bool {
        self.plan.tasks.is_empty()
    }
}

/// Build the execution plan from a configured plan
///
/// A task survives when its name matches `filter` and at least one of its
/// scales is in `scales` (when given). Scales outside `scales` are dropped.
pub fn build_plan(
    plan: &BenchmarkPlan,
    filter: Option<&Regex>,
    scales: Option<&[Scale]>,
) -> ExecutionPlan {
    let mut selected = Vec::new();
    let mut filtered_out = Vec::new();

    for task in &plan.tasks {
        if let Some(re) = filter {
            if !re.is_match(&task.name) {
                filtered_out.push(task.name.clone());
                continue;
            }
        }

        let mut task = task.clone();
        if let Some(allowed) = scales {
            task.scales.retain(|s| allowed.contains(s));
        }
        if task.scales.is_empty() {
            filtered_out.push(task.name);
            continue;
        }
        selected.push(task);
    }

    ExecutionPlan {
        plan: BenchmarkPlan::new(plan.variants.clone(), selected, plan.repetitions),
        filtered_out,
    }
}

/// Render the plan as an indented tree, one line per cell
pub fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Versus Plan: {} vs {} ({} repetitions)\n",
        plan.plan.variants.a, plan.plan.variants.b, plan.plan.repetitions
    ));

    for task in &plan.plan.tasks {
        let params = if task.params.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = task
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!(" [{}]", pairs.join(", "))
        };
        out.push_str(&format!(
            "├── task: {} ({:?}){}\n",
            task.name, task.workload, params
        ));
        for cell in plan.plan.cells().iter().filter(|c| c.task == task.name) {
            out.push_str(&format!("│   ├── {}\n", cell));
        }
    }

    out.push_str(&format!(
        "{} cells, {} trials planned.\n",
        plan.plan.cells().len(),
        plan.plan.total_trials()
    ));
    if !plan.filtered_out.is_empty() {
        out.push_str(&format!("Filtered out: {}\n", plan.filtered_out.join(", ")));
    }
    out
}
