//! Assembly line balancing with station types, solved as a mixed integer
//! linear program.
//!
//! Read a [`Problem`] from YAML, then call [`Problem::balance`] to get the
//! cheapest set of typed stations with every task placed and ordered:
//!
//! ```no_run
//! use linebalance::{Config, Problem};
//!
//! let input = std::fs::read_to_string("line.yaml")?;
//! let problem: Problem = serde_yaml::from_str(&input)?;
//! let solution = problem.balance(&Config::default())?;
//! println!("{}", serde_yaml::to_string(&solution)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod colocation;
pub mod config;
pub mod cuts;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lp;
pub mod model;
pub mod mps;
pub mod sequence;
pub mod types;

use std::path::Path;

use tracing::{info, warn};

pub use config::Config;
pub use engine::SolveStatus;
pub use error::{Error, Result};
pub use model::Formulation;
pub use types::{Problem, Solution, StationAssignment, TaskId};

use colocation::TaskGroup;
use config::{SolverSettings, ValidationSettings};
use engine::SolveResult;
use graph::PrecedenceGraph;

impl Problem {
    /// Checks the input before any model is built and returns the co-located groups.
    pub fn validate(&self, settings: &ValidationSettings) -> Result<Vec<TaskGroup>> {
        model::check_structure(self)?;
        graph::validate(&self.precedence)?;
        if !settings.check_colocation {
            return Ok(Vec::new());
        }
        let graph = PrecedenceGraph::new(self.tasks.keys().copied(), &self.precedence);
        colocation::analyze(self, &graph, settings)
    }

    pub fn formulate(&self) -> Result<Formulation> {
        model::formulate(self)
    }

    /// Writes the formulation as a free MPS file for an external solver.
    pub fn export_mps(&self, path: impl AsRef<Path>) -> Result<()> {
        let formulation = self.formulate()?;
        mps::write_file(&formulation.program, path)
    }

    /// Finds the cheapest line.
    pub fn balance(&self, config: &Config) -> Result<Solution> {
        self.validate(&config.validation)?;
        let formulation = self.formulate()?;
        let (status, values) =
            solve_formulation(&formulation, &config.solver)?.ok_or(Error::Infeasible)?;
        let solution = self.read_solution(&formulation, status, &values)?;
        info!(
            status = %solution.status,
            cost = solution.cost,
            stations = solution.stations.len(),
            "line balanced"
        );
        Ok(solution)
    }

    /// Up to `count` solutions, each with a task-to-station assignment
    /// different from all earlier ones.
    ///
    /// Stops early once no further assignment exists. Solutions that only
    /// differ in which candidate stations were used can report identically
    /// after renumbering.
    pub fn enumerate(&self, config: &Config, count: usize) -> Result<Vec<Solution>> {
        if count == 0 {
            return Err(Error::InvalidInput(
                "at least one solution must be requested".to_string(),
            ));
        }
        self.validate(&config.validation)?;
        let mut formulation = self.formulate()?;
        let mut solutions = Vec::new();

        while solutions.len() < count {
            let Some((status, values)) = solve_formulation(&formulation, &config.solver)? else {
                if solutions.is_empty() {
                    return Err(Error::Infeasible);
                }
                info!(
                    found = solutions.len(),
                    cuts = formulation.cut_count(),
                    "no further assignment exists"
                );
                break;
            };
            solutions.push(self.read_solution(&formulation, status, &values)?);
            cuts::exclude_current_solution(&mut formulation, &values);
        }
        Ok(solutions)
    }

    fn read_solution(
        &self,
        formulation: &Formulation,
        status: SolveStatus,
        values: &[f64],
    ) -> Result<Solution> {
        let stations = sequence::extract_stations(formulation, values)?;
        let stations = sequence::sequence_tasks(stations, &self.precedence)?;
        Ok(sequence::report(self, status, stations))
    }
}

/// `None` when the model is infeasible.
fn solve_formulation(
    formulation: &Formulation,
    settings: &SolverSettings,
) -> Result<Option<(SolveStatus, Vec<f64>)>> {
    usable_values(engine::solve(&formulation.program, settings)?)
}

/// The status and values of a result that carries a solution.
fn usable_values(result: SolveResult) -> Result<Option<(SolveStatus, Vec<f64>)>> {
    match (result.status, result.values) {
        (status, Some(values)) if status.has_solution() => {
            if status != SolveStatus::Optimal {
                warn!(%status, "returning a solution that may not be optimal");
            }
            Ok(Some((status, values)))
        }
        (SolveStatus::Infeasible, _) => Ok(None),
        (SolveStatus::Unbounded, _) => Err(Error::Unbounded),
        (status, None) => Err(Error::Solver(format!(
            "engine reported {status} without variable values"
        ))),
        (status, Some(_)) => Err(Error::Solver(format!(
            "engine reported {status} together with variable values"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"
cycleTime: 10
stationTypes: { manual: { cost: 10 }, robot: { cost: 4 } }
tasks:
  1: { time: 6, stationTypes: [manual] }
  2: { time: 4, stationTypes: [manual] }
  3: { time: 5 }
precedence: [[1, 2], [2, 3]]
incompatible: [[2, 3]]
"#;

    fn problem(yaml: &str) -> Problem {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn validation_rejects_precedence_cycles() {
        let mut line = problem(LINE);
        line.precedence.push((3, 1));
        match line.validate(&ValidationSettings::default()) {
            Err(Error::PrecedenceCycle { cycle }) => assert_eq!(cycle, vec![1, 2, 3]),
            other => panic!("expected a precedence cycle, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_incompatible_group() {
        let mut line = problem(LINE);
        line.colocated.push((2, 3));
        assert!(matches!(
            line.validate(&ValidationSettings::default()),
            Err(Error::IncompatibleGroup(_))
        ));
    }

    #[test]
    fn colocation_checks_can_be_switched_off() {
        let mut line = problem(LINE);
        line.colocated.push((2, 3));
        let settings = ValidationSettings {
            check_colocation: false,
            ..ValidationSettings::default()
        };
        assert_eq!(line.validate(&settings).unwrap(), Vec::<TaskGroup>::new());
    }

    #[test]
    fn exported_mps_reads_back_identically() {
        let line = problem(LINE);
        let path = std::env::temp_dir().join(format!("linebalance-{}.mps", std::process::id()));
        line.export_mps(&path).unwrap();
        let parsed = mps::read_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(parsed, line.formulate().unwrap().program);
    }

    #[test]
    fn zero_alternatives_is_rejected_before_solving() {
        // a precedence cycle would fail validation, so the count is checked first
        let mut line = problem(LINE);
        line.precedence.push((3, 1));
        assert!(matches!(
            line.enumerate(&Config::default(), 0),
            Err(Error::InvalidInput(message)) if message.contains("at least one")
        ));
    }

    fn result(status: SolveStatus, values: Option<Vec<f64>>) -> SolveResult {
        SolveResult { status, values }
    }

    #[test]
    fn only_results_with_a_solution_are_read() {
        let (status, values) = usable_values(result(SolveStatus::TimeLimit, Some(vec![1.0])))
            .unwrap()
            .unwrap();
        assert_eq!(status, SolveStatus::TimeLimit);
        assert_eq!(values, vec![1.0]);

        assert!(usable_values(result(SolveStatus::Infeasible, None)).unwrap().is_none());
        assert!(matches!(
            usable_values(result(SolveStatus::Unbounded, None)),
            Err(Error::Unbounded)
        ));
        assert!(matches!(
            usable_values(result(SolveStatus::Optimal, None)),
            Err(Error::Solver(_))
        ));
    }
}
