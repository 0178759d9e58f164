//! No-good cuts for enumerating alternative assignments.

use tracing::debug;

use crate::lp::LinearExpr;
use crate::model::Formulation;

/// Forbids the task-to-station assignment encoded in `values`.
///
/// With `ones` the assignment variables at 1, the cut
/// `Σ_{x ∉ ones} x − Σ_{x ∈ ones} x ≥ 1 − |ones|` is violated only by that
/// exact assignment, so the next solve has to move at least one task.
pub fn exclude_current_solution(formulation: &mut Formulation, values: &[f64]) {
    let mut ones = 0usize;
    let lhs = formulation
        .assignment
        .values()
        .fold(LinearExpr::new(), |sum, &x| {
            let set = values.get(x.index()).copied().unwrap_or(0.0).round() == 1.0;
            if set {
                ones += 1;
                sum - x
            } else {
                sum + x
            }
        });

    let name = format!("nogood_{}", formulation.cuts);
    formulation
        .program
        .add_constraint(lhs.geq(1.0 - ones as f64).named(name));
    formulation.cuts += 1;
    debug!(cuts = formulation.cuts, assigned = ones, "no-good cut added");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::formulate;
    use crate::types::Problem;

    fn problem() -> Problem {
        serde_yaml::from_str(
            r#"
cycleTime: 10
stationTypes: { line: { cost: 1 } }
tasks: { 1: { time: 4 }, 2: { time: 4 } }
"#,
        )
        .unwrap()
    }

    fn plan(f: &Formulation, placement: &[(u32, usize)]) -> Vec<f64> {
        let mut values = vec![0.0; f.program.variables().len()];
        for &(task, station) in placement {
            values[f.assignment[&(task, station)].index()] = 1.0;
        }
        values
    }

    #[test]
    fn cut_rejects_only_the_excluded_assignment() {
        let mut f = formulate(&problem()).unwrap();
        let before = f.program.constraints().len();
        let excluded = plan(&f, &[(1, 1), (2, 1)]);
        exclude_current_solution(&mut f, &excluded);

        assert_eq!(f.cut_count(), 1);
        assert_eq!(f.program.constraints().len(), before + 1);
        let cut = &f.program.constraints()[before];
        assert_eq!(cut.name, "nogood_0");
        assert_eq!(cut.rhs, -1.0);

        assert!(!cut.is_satisfied(&excluded, 1e-6));
        assert!(cut.is_satisfied(&plan(&f, &[(1, 1), (2, 2)]), 1e-6));
        assert!(cut.is_satisfied(&plan(&f, &[(1, 2), (2, 1)]), 1e-6));
    }

    #[test]
    fn cuts_are_numbered() {
        let mut f = formulate(&problem()).unwrap();
        let first = plan(&f, &[(1, 1), (2, 1)]);
        let second = plan(&f, &[(1, 1), (2, 2)]);
        exclude_current_solution(&mut f, &first);
        exclude_current_solution(&mut f, &second);
        let names: Vec<&str> = f
            .program
            .constraints()
            .iter()
            .rev()
            .take(2)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["nogood_1", "nogood_0"]);
        assert_eq!(f.cut_count(), 2);
    }
}
