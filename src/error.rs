use thiserror::Error;

use crate::types::TaskId;

/// Everything that can stop a line from being balanced.
#[derive(Debug, Error)]
pub enum Error {
    /// The input record is structurally broken (unknown ids, missing durations, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("precedence relations contain a cycle: {}", format_tasks(.cycle))]
    PrecedenceCycle { cycle: Vec<TaskId> },

    #[error("co-located groups contain incompatible tasks: {}", format_violations(.0))]
    IncompatibleGroup(Vec<String>),

    #[error("co-located groups exceed the cycle time: {}", format_violations(.0))]
    GroupExceedsCycleTime(Vec<String>),

    /// An incompatible pair is forced onto one station through a co-located group.
    #[error(
        "{} but both are forced onto the station of group {} (edges: {:?})",
        format_pair(.pair), format_tasks(.group), .edges
    )]
    PrecedenceConflict {
        pair: (TaskId, TaskId),
        group: Vec<TaskId>,
        edges: Vec<(TaskId, TaskId)>,
    },

    #[error("solver engine '{0}' is not available in this build")]
    EngineUnavailable(String),

    #[error("no feasible line balance exists")]
    Infeasible,

    #[error("the model is unbounded")]
    Unbounded,

    #[error("solver failure: {0}")]
    Solver(String),

    /// Tasks assigned to one station could not be ordered. This is a formulation defect.
    #[error("internal error: tasks {} on station {station} admit no precedence order", format_tasks(.tasks))]
    SequencingCycle { station: usize, tasks: Vec<TaskId> },

    #[error("MPS line {line}: {message}")]
    Mps { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn format_tasks(tasks: &[TaskId]) -> String {
    let ids: Vec<String> = tasks.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(", "))
}

fn format_pair(pair: &(TaskId, TaskId)) -> String {
    format!("task {} is incompatible with task {}", pair.0, pair.1)
}

fn format_violations(violations: &[String]) -> String {
    format!("{} violation(s): {}", violations.len(), violations.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_tasks() {
        let err = Error::PrecedenceCycle {
            cycle: vec![1, 2, 3],
        };
        assert_eq!(
            err.to_string(),
            "precedence relations contain a cycle: [1, 2, 3]"
        );
    }

    #[test]
    fn conflict_message_names_pair_and_group() {
        let err = Error::PrecedenceConflict {
            pair: (1, 2),
            group: vec![1, 3],
            edges: vec![(1, 2), (2, 3)],
        };
        let message = err.to_string();
        assert!(message.contains("task 1 is incompatible with task 2"));
        assert!(message.contains("[1, 3]"));
    }
}
