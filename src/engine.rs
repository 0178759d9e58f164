//! Solver adapters.
//!
//! Every engine receives the same [`LinearProgram`] and hands back one value
//! per variable, so new backends can be added without touching the model.
//! Backends are provided through `good_lp` and compiled in by cargo feature.

use std::fmt;

use good_lp::solvers::SolutionStatus;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution as LpSolution, SolverModel, Variable,
    variable, variables,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{EngineKind, Focus, SolverSettings};
use crate::error::{Error, Result};
use crate::lp::{Constraint, LinearExpr, LinearProgram, Sense, VarKind};

/// How a solve call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    /// Stopped by the time limit; values hold the best incumbent.
    TimeLimit,
    /// Stopped within the configured optimality gap.
    GapLimit,
    Infeasible,
    Unbounded,
}

impl SolveStatus {
    pub fn has_solution(self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal | SolveStatus::TimeLimit | SolveStatus::GapLimit
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::TimeLimit => "time limit reached",
            SolveStatus::GapLimit => "gap limit reached",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolveStatus,
    /// One value per program variable, present whenever the status carries a solution.
    pub values: Option<Vec<f64>>,
}

/// Something that can solve a [`LinearProgram`].
pub trait Engine {
    fn kind(&self) -> EngineKind;

    /// Names of the [`SolverSettings`] tuning fields this engine applies.
    fn supported_settings(&self) -> &'static [&'static str];

    fn solve(&self, program: &LinearProgram, settings: &SolverSettings) -> Result<SolveResult>;
}

/// Tuning fields set away from their defaults that `supported` does not cover.
pub fn ignored_settings(settings: &SolverSettings, supported: &[&str]) -> Vec<&'static str> {
    let requested = [
        ("time_limit_seconds", settings.time_limit_seconds.is_some()),
        ("mip_gap", settings.mip_gap.is_some()),
        ("heuristics", !settings.heuristics),
        ("focus", settings.focus != Focus::default()),
        ("threads", settings.threads.is_some()),
    ];
    requested
        .into_iter()
        .filter(|&(name, set)| set && !supported.contains(&name))
        .map(|(name, _)| name)
        .collect()
}

/// Picks the engine named in the settings.
pub fn engine_for(kind: EngineKind) -> Result<Box<dyn Engine>> {
    match kind {
        #[cfg(feature = "cbc")]
        EngineKind::Cbc => Ok(Box::new(cbc::CbcEngine)),
        #[cfg(feature = "highs")]
        EngineKind::Highs => Ok(Box::new(highs::HighsEngine)),
        #[cfg(feature = "scip")]
        EngineKind::Scip => Ok(Box::new(scip::ScipEngine)),
        #[cfg(feature = "microlp")]
        EngineKind::Microlp => Ok(Box::new(microlp::MicrolpEngine)),
        #[allow(unreachable_patterns)]
        other => Err(Error::EngineUnavailable(other.to_string())),
    }
}

/// Solves with the engine named in `settings`.
pub fn solve(program: &LinearProgram, settings: &SolverSettings) -> Result<SolveResult> {
    let engine = engine_for(settings.engine)?;
    for setting in ignored_settings(settings, engine.supported_settings()) {
        warn!(engine = %engine.kind(), setting, "setting is not supported by this engine, ignoring");
    }
    info!(
        engine = %engine.kind(),
        variables = program.variables().len(),
        constraints = program.constraints().len(),
        "solving"
    );
    let result = engine.solve(program, settings)?;
    info!(engine = %engine.kind(), status = %result.status, "solve finished");
    Ok(result)
}

/// The program translated into `good_lp` terms.
struct Translated {
    problem: ProblemVariables,
    variables: Vec<Variable>,
    objective: Expression,
}

fn translate(program: &LinearProgram) -> Translated {
    let mut problem = variables!();
    let variables = program
        .variables()
        .iter()
        .map(|def| {
            let definition = match def.kind {
                VarKind::Binary => variable().binary(),
                VarKind::Integer => variable().integer(),
                VarKind::Continuous => variable(),
            };
            let definition = definition.min(def.lower).name(def.name.clone());
            let definition = match (def.kind, def.upper) {
                (VarKind::Binary, _) | (_, None) => definition,
                (_, Some(upper)) => definition.max(upper),
            };
            problem.add(definition)
        })
        .collect::<Vec<_>>();
    let objective = to_expression(program.objective(), &variables);
    Translated {
        problem,
        variables,
        objective,
    }
}

fn to_expression(expr: &LinearExpr, variables: &[Variable]) -> Expression {
    expr.terms()
        .fold(Expression::from(expr.constant()), |sum, (var, coef)| {
            sum + variables[var.index()] * coef
        })
}

fn to_constraint(constraint: &Constraint, variables: &[Variable]) -> good_lp::Constraint {
    let lhs = to_expression(&constraint.lhs(), variables);
    match constraint.sense {
        Sense::Le => lhs.leq(constraint.rhs),
        Sense::Ge => lhs.geq(constraint.rhs),
        Sense::Eq => lhs.eq(constraint.rhs),
    }
}

/// Adds every constraint to an engine model, solves it, and reads the values back.
fn run<Model>(model: Model, program: &LinearProgram, variables: &[Variable]) -> Result<SolveResult>
where
    Model: SolverModel<Error = ResolutionError>,
{
    let model = program
        .constraints()
        .iter()
        .fold(model, |m, c| m.with(to_constraint(c, variables)));

    match model.solve() {
        Ok(solution) => {
            let status = match solution.status() {
                SolutionStatus::Optimal => SolveStatus::Optimal,
                SolutionStatus::TimeLimit => SolveStatus::TimeLimit,
                SolutionStatus::GapLimit => SolveStatus::GapLimit,
            };
            let values = variables.iter().map(|&v| solution.value(v)).collect();
            Ok(SolveResult {
                status,
                values: Some(values),
            })
        }
        Err(ResolutionError::Infeasible) => Ok(SolveResult {
            status: SolveStatus::Infeasible,
            values: None,
        }),
        Err(ResolutionError::Unbounded) => Ok(SolveResult {
            status: SolveStatus::Unbounded,
            values: None,
        }),
        Err(other) => Err(Error::Solver(other.to_string())),
    }
}

#[cfg(feature = "cbc")]
mod cbc {
    use good_lp::solvers::coin_cbc::coin_cbc;

    use super::*;

    /// COIN-OR branch and cut.
    pub struct CbcEngine;

    impl Engine for CbcEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Cbc
        }

        fn supported_settings(&self) -> &'static [&'static str] {
            &["time_limit_seconds", "mip_gap", "heuristics", "focus", "threads"]
        }

        fn solve(&self, program: &LinearProgram, settings: &SolverSettings) -> Result<SolveResult> {
            let Translated {
                problem,
                variables,
                objective,
            } = translate(program);
            let mut model = problem.minimise(objective).using(coin_cbc);

            if !settings.engine_log {
                model.set_parameter("loglevel", "0");
            }
            if let Some(seconds) = settings.time_limit_seconds {
                model.set_parameter("seconds", &seconds.to_string());
            }
            if let Some(gap) = settings.mip_gap {
                model.set_parameter("ratioGap", &gap.to_string());
            }
            if let Some(threads) = settings.threads {
                model.set_parameter("threads", &threads.to_string());
            }
            model.set_parameter(
                "heuristicsOnOff",
                if settings.heuristics { "on" } else { "off" },
            );
            let strategy = match settings.focus {
                Focus::Optimality => "0",
                Focus::Balanced => "1",
                Focus::Feasibility => "2",
            };
            model.set_parameter("strategy", strategy);
            tracing::debug!(?settings, "cbc parameters set");

            run(model, program, &variables)
        }
    }
}

#[cfg(feature = "highs")]
mod highs {
    use good_lp::solvers::highs::highs;
    use good_lp::solvers::{WithMipGap, WithTimeLimit};

    use super::*;

    pub struct HighsEngine;

    impl Engine for HighsEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Highs
        }

        fn supported_settings(&self) -> &'static [&'static str] {
            &["time_limit_seconds", "mip_gap"]
        }

        fn solve(&self, program: &LinearProgram, settings: &SolverSettings) -> Result<SolveResult> {
            let Translated {
                problem,
                variables,
                objective,
            } = translate(program);
            let mut model = problem.minimise(objective).using(highs);
            if let Some(seconds) = settings.time_limit_seconds {
                model = model.with_time_limit(seconds);
            }
            if let Some(gap) = settings.mip_gap {
                model = model.with_mip_gap(gap as f32).map_err(Error::Solver)?;
            }
            run(model, program, &variables)
        }
    }
}

#[cfg(feature = "scip")]
mod scip {
    use good_lp::solvers::scip::scip;
    use good_lp::solvers::{WithMipGap, WithTimeLimit};

    use super::*;

    pub struct ScipEngine;

    impl Engine for ScipEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Scip
        }

        fn supported_settings(&self) -> &'static [&'static str] {
            &["time_limit_seconds", "mip_gap"]
        }

        fn solve(&self, program: &LinearProgram, settings: &SolverSettings) -> Result<SolveResult> {
            let Translated {
                problem,
                variables,
                objective,
            } = translate(program);
            let mut model = problem.minimise(objective).using(scip);
            if let Some(seconds) = settings.time_limit_seconds {
                model = model.with_time_limit(seconds);
            }
            if let Some(gap) = settings.mip_gap {
                model = model.with_mip_gap(gap as f32).map_err(Error::Solver)?;
            }
            run(model, program, &variables)
        }
    }
}

#[cfg(feature = "microlp")]
mod microlp {
    use good_lp::solvers::microlp::microlp;

    use super::*;

    /// Pure Rust branch and bound, no tuning knobs.
    pub struct MicrolpEngine;

    impl Engine for MicrolpEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Microlp
        }

        fn supported_settings(&self) -> &'static [&'static str] {
            &[]
        }

        fn solve(&self, program: &LinearProgram, _settings: &SolverSettings) -> Result<SolveResult> {
            let Translated {
                problem,
                variables,
                objective,
            } = translate(program);
            let model = problem.minimise(objective).using(microlp);
            run(model, program, &variables)
        }
    }
}

#[cfg(all(test, feature = "cbc"))]
mod tests {
    use super::*;
    use crate::lp::VarDef;

    fn knapsack() -> LinearProgram {
        // pick items to cover weight 5 as cheaply as possible
        let mut program = LinearProgram::new("cover");
        let a = program.add_variable(VarDef::binary("a"));
        let b = program.add_variable(VarDef::binary("b"));
        let c = program.add_variable(VarDef::integer("c", 0.0, Some(3.0)));
        program
            .minimise(a * 4.0 + b * 3.0 + c * 2.0)
            .with((a * 3.0 + b * 2.0 + c).geq(5.0).named("cover"))
    }

    #[test]
    fn solves_small_integer_program() {
        let program = knapsack();
        let result = solve(&program, &SolverSettings::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        let values = result.values.unwrap();
        let cost = program.objective().evaluate(&values);
        assert!((cost - 7.0).abs() < 1e-6, "cost {cost}");
        assert!(program.violations(&values, 1e-6).is_empty());
    }

    #[test]
    fn reports_infeasibility_as_status() {
        let mut program = LinearProgram::new("empty");
        let a = program.add_variable(VarDef::binary("a"));
        let program = program.with(LinearExpr::from(a).geq(2.0).named("impossible"));
        let result = solve(&program, &SolverSettings::default()).unwrap();
        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(result.values.is_none());
    }

    #[test]
    fn status_predicates() {
        assert!(SolveStatus::TimeLimit.has_solution());
        assert!(!SolveStatus::Infeasible.has_solution());
    }
}
