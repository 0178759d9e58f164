//! The station-type assembly line balancing model.
//!
//! Stations `1..=n` (one per task in the worst case) are candidates; the
//! solver decides which to open, with which type, and which tasks go where.
//!
//! | variable        | domain       | meaning                                  |
//! |-----------------|--------------|------------------------------------------|
//! | `x[task, s]`    | {0, 1}       | task is performed at station `s`         |
//! | `z[s]`          | {0, 1}       | station `s` is opened                    |
//! | `y[s, type]`    | {0, 1}       | station `s` is opened with `type`        |
//! | `order[task, s]`| 0..=n        | position of the task inside station `s`  |
//!
//! The objective is the total opening cost of the typed stations.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lp::{LinearExpr, LinearProgram, VarDef, VarId};
use crate::types::{CycleTime, Problem, TaskId, TaskTime};

/// LUT of type (task, station) → variable
pub type TaskStationToVariableMap = BTreeMap<(TaskId, usize), VarId>;

/// A built model plus the handles needed to read a solution back.
#[derive(Debug, Clone)]
pub struct Formulation {
    pub program: LinearProgram,
    pub tasks: Vec<TaskId>,
    pub station_types: Vec<String>,
    /// `x[task, station]`
    pub assignment: TaskStationToVariableMap,
    /// `z[station]`
    pub opened: BTreeMap<usize, VarId>,
    /// `y[station, type index]`
    pub typed: BTreeMap<(usize, usize), VarId>,
    /// `order[task, station]`
    pub order: TaskStationToVariableMap,
    pub(crate) cuts: usize,
}

impl Formulation {
    /// Candidate station indices.
    pub fn stations(&self) -> RangeInclusive<usize> {
        1..=self.tasks.len()
    }

    /// Number of no-good cuts added so far.
    pub fn cut_count(&self) -> usize {
        self.cuts
    }
}

struct Variables {
    program: LinearProgram,
    assignment: TaskStationToVariableMap,
    opened: BTreeMap<usize, VarId>,
    typed: BTreeMap<(usize, usize), VarId>,
    order: TaskStationToVariableMap,
}

/// Rejects input whose pieces do not fit together, listing every problem found.
pub fn check_structure(problem: &Problem) -> Result<()> {
    let mut problems = Vec::new();

    if problem.tasks.is_empty() {
        problems.push("no tasks given".to_string());
    }
    if problem.station_types.is_empty() {
        problems.push("no station types given".to_string());
    }

    let pair_lists = [
        ("precedence", &problem.precedence),
        ("incompatible", &problem.incompatible),
        ("colocated", &problem.colocated),
    ];
    for (list, pairs) in pair_lists {
        for &(a, b) in pairs.iter() {
            for task in [a, b] {
                if !problem.tasks.contains_key(&task) {
                    problems.push(format!("{list} pair ({a}, {b}) references unknown task {task}"));
                }
            }
        }
    }
    for &(a, b) in &problem.incompatible {
        if a == b {
            problems.push(format!("task {a} is declared incompatible with itself"));
        }
    }

    for (name, spec) in &problem.station_types {
        if !(spec.cost.is_finite() && spec.cost >= 0.0) {
            problems.push(format!("station type '{name}' has invalid cost {}", spec.cost));
        }
    }

    let products = problem.products();
    match &problem.cycle_time {
        CycleTime::Uniform(time) => {
            if !(time.is_finite() && *time > 0.0) {
                problems.push(format!("cycle time must be positive, got {time}"));
            }
        }
        CycleTime::PerProduct(times) => {
            for product in &products {
                match times.get(product) {
                    None => problems.push(format!("no cycle time for product '{product}'")),
                    Some(time) if !(time.is_finite() && *time > 0.0) => problems.push(format!(
                        "cycle time of product '{product}' must be positive, got {time}"
                    )),
                    Some(_) => {}
                }
            }
        }
    }

    for (task, spec) in &problem.tasks {
        if let TaskTime::PerProduct(times) = &spec.time {
            for product in &products {
                if !times.contains_key(product) {
                    problems.push(format!("task {task} has no time for product '{product}'"));
                }
            }
        }
        for product in &products {
            if let Some(time) = spec.time.for_product(product) {
                if !(time.is_finite() && time >= 0.0) {
                    problems.push(format!(
                        "task {task} has invalid time {time} for product '{product}'"
                    ));
                }
            }
        }
        if let Some(types) = &spec.station_types {
            if types.is_empty() {
                problems.push(format!("task {task} is compatible with no station type"));
            }
            for station_type in types {
                if !problem.station_types.contains_key(station_type) {
                    problems.push(format!(
                        "task {task} references unknown station type '{station_type}'"
                    ));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(problems.join("; ")))
    }
}

/// Builds the full model for `problem`.
pub fn formulate(problem: &Problem) -> Result<Formulation> {
    check_structure(problem)?;

    let tasks: Vec<TaskId> = problem.tasks.keys().copied().collect();
    let station_types: Vec<String> = problem.station_types.keys().cloned().collect();
    let products = problem.products();
    let stations = 1..=tasks.len();

    let precedence = unique_pairs(&problem.precedence, false);
    let incompatible = unique_pairs(&problem.incompatible, true);
    let colocated: Vec<(TaskId, TaskId)> = unique_pairs(&problem.colocated, true)
        .into_iter()
        .filter(|(a, b)| a != b)
        .collect();

    // Create all variables, and LUTs of type (task, station) → Variable
    let Variables {
        program,
        assignment,
        opened,
        typed,
        order,
    } = init_variables(&tasks, stations.clone(), station_types.len());

    let objective = create_objective_function(problem, &station_types, &typed);
    let model = program.minimise(objective);

    #[rustfmt::skip]
    let model = constrain_one_station_per_task(model, &tasks, stations.clone(), &assignment);
    let model = constrain_tasks_to_open_stations(model, &tasks, stations.clone(), &assignment, &opened);
    let model = constrain_cycle_times(model, problem, &products, stations.clone(), &assignment, &opened);
    let model = constrain_precedence_across_stations(model, &precedence, stations.clone(), &assignment);
    let model = constrain_one_type_per_open_station(model, stations.clone(), station_types.len(), &typed, &opened);
    let model = constrain_station_type_compatibility(model, problem, &tasks, &station_types, stations.clone(), &assignment, &typed);
    let model = constrain_incompatible_pairs(model, &incompatible, stations.clone(), &assignment);
    let model = constrain_colocated_pairs(model, &colocated, stations.clone(), &assignment);
    let model = constrain_sequence_within_stations(model, &precedence, stations.clone(), &order);
    let model = constrain_order_to_assignment(model, &tasks, stations.clone(), &assignment, &order);

    info!(
        tasks = tasks.len(),
        station_types = station_types.len(),
        products = products.len(),
        variables = model.variables().len(),
        constraints = model.constraints().len(),
        "model built"
    );

    Ok(Formulation {
        program: model,
        tasks,
        station_types,
        assignment,
        opened,
        typed,
        order,
        cuts: 0,
    })
}

/// Deduplicates pairs; symmetric relations are normalized to `(min, max)`.
fn unique_pairs(pairs: &[(TaskId, TaskId)], symmetric: bool) -> Vec<(TaskId, TaskId)> {
    let unique: BTreeSet<(TaskId, TaskId)> = pairs
        .iter()
        .map(|&(a, b)| if symmetric && b < a { (b, a) } else { (a, b) })
        .collect();
    unique.into_iter().collect()
}

fn init_variables(
    tasks: &[TaskId],
    stations: RangeInclusive<usize>,
    type_count: usize,
) -> Variables {
    let mut program = LinearProgram::new("alb_with_station_types");
    let max_stations = tasks.len() as f64;

    let mut assignment = BTreeMap::new();
    for &task in tasks {
        for station in stations.clone() {
            let x = program.add_variable(VarDef::binary(format!("x_{task}_{station}")));
            assignment.insert((task, station), x);
        }
    }

    let mut opened = BTreeMap::new();
    for station in stations.clone() {
        opened.insert(station, program.add_variable(VarDef::binary(format!("z_{station}"))));
    }

    let mut typed = BTreeMap::new();
    for station in stations.clone() {
        for kind in 0..type_count {
            let y = program.add_variable(VarDef::binary(format!("y_{station}_{kind}")));
            typed.insert((station, kind), y);
        }
    }

    // Order variables only carry meaning where the task is actually placed
    let mut order = BTreeMap::new();
    for &task in tasks {
        for station in stations.clone() {
            let o = program.add_variable(VarDef::integer(
                format!("o_{task}_{station}"),
                0.0,
                Some(max_stations),
            ));
            order.insert((task, station), o);
        }
    }

    debug!(variables = program.variables().len(), "variables created");
    Variables {
        program,
        assignment,
        opened,
        typed,
        order,
    }
}

/// Total opening cost: Σ cost(type) × y[station, type]
fn create_objective_function(
    problem: &Problem,
    station_types: &[String],
    typed: &BTreeMap<(usize, usize), VarId>,
) -> LinearExpr {
    typed
        .iter()
        .fold(LinearExpr::new(), |sum, (&(_, kind), &y)| {
            let cost = problem.station_types[&station_types[kind]].cost;
            sum + y * cost
        })
}

fn station_sum(
    task: TaskId,
    stations: RangeInclusive<usize>,
    vars: &TaskStationToVariableMap,
    weight: impl Fn(usize) -> f64,
) -> LinearExpr {
    stations.fold(LinearExpr::new(), |sum, station| {
        sum + vars[&(task, station)] * weight(station)
    })
}

/// Every task is assigned to exactly one station
fn constrain_one_station_per_task(
    model: LinearProgram,
    tasks: &[TaskId],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
) -> LinearProgram {
    tasks.iter().fold(model, |m, &task| {
        let placed = station_sum(task, stations.clone(), assignment, |_| 1.0);
        m.with(placed.eq(1.0).named(format!("assign_{task}")))
    })
}

/// Tasks may only be placed at opened stations
fn constrain_tasks_to_open_stations(
    model: LinearProgram,
    tasks: &[TaskId],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
    opened: &BTreeMap<usize, VarId>,
) -> LinearProgram {
    tasks.iter().fold(model, |m, &task| {
        stations.clone().fold(m, |m2, station| {
            let x = LinearExpr::from(assignment[&(task, station)]);
            m2.with(x.leq(opened[&station]).named(format!("open_{task}_{station}")))
        })
    })
}

/// Per product, the load of a station must fit in that product's cycle time.
/// Closed stations carry no load.
fn constrain_cycle_times(
    model: LinearProgram,
    problem: &Problem,
    products: &[String],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
    opened: &BTreeMap<usize, VarId>,
) -> LinearProgram {
    products
        .iter()
        .enumerate()
        .fold(model, |m, (index, product)| {
            let cycle_time = problem.cycle_time.for_product(product).unwrap_or(0.0);
            stations.clone().fold(m, |m2, station| {
                let load = problem.tasks.keys().fold(LinearExpr::new(), |sum, &task| {
                    let time = problem.duration(task, product).unwrap_or(0.0);
                    sum + assignment[&(task, station)] * time
                });
                let capacity = opened[&station] * cycle_time;
                m2.with(load.leq(capacity).named(format!("cycle_{index}_{station}")))
            })
        })
}

/// A predecessor's station index never exceeds its successor's
fn constrain_precedence_across_stations(
    model: LinearProgram,
    precedence: &[(TaskId, TaskId)],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
) -> LinearProgram {
    precedence.iter().fold(model, |m, &(before, after)| {
        let index = |station: usize| station as f64;
        let lhs = station_sum(before, stations.clone(), assignment, index);
        let rhs = station_sum(after, stations.clone(), assignment, index);
        m.with(lhs.leq(rhs).named(format!("prec_{before}_{after}")))
    })
}

/// An opened station has exactly one type, a closed one has none
fn constrain_one_type_per_open_station(
    model: LinearProgram,
    stations: RangeInclusive<usize>,
    type_count: usize,
    typed: &BTreeMap<(usize, usize), VarId>,
    opened: &BTreeMap<usize, VarId>,
) -> LinearProgram {
    stations.fold(model, |m, station| {
        let types = (0..type_count).fold(LinearExpr::new(), |sum, kind| {
            sum + typed[&(station, kind)]
        });
        m.with(types.eq(opened[&station]).named(format!("type_{station}")))
    })
}

/// A task needs a station whose type can perform it
fn constrain_station_type_compatibility(
    model: LinearProgram,
    problem: &Problem,
    tasks: &[TaskId],
    station_types: &[String],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
    typed: &BTreeMap<(usize, usize), VarId>,
) -> LinearProgram {
    tasks.iter().fold(model, |m, &task| {
        stations.clone().fold(m, |m2, station| {
            let capable = station_types
                .iter()
                .enumerate()
                .filter(|(_, name)| problem.is_compatible(task, name))
                .fold(LinearExpr::new(), |sum, (kind, _)| sum + typed[&(station, kind)]);
            let x = LinearExpr::from(assignment[&(task, station)]);
            m2.with(x.leq(capable).named(format!("compat_{task}_{station}")))
        })
    })
}

/// Incompatible tasks never share a station
fn constrain_incompatible_pairs(
    model: LinearProgram,
    incompatible: &[(TaskId, TaskId)],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
) -> LinearProgram {
    incompatible.iter().fold(model, |m, &(a, b)| {
        stations.clone().fold(m, |m2, station| {
            let both = LinearExpr::from(assignment[&(a, station)]) + assignment[&(b, station)];
            m2.with(both.leq(1.0).named(format!("incompat_{a}_{b}_{station}")))
        })
    })
}

/// Co-located tasks have identical assignment vectors
fn constrain_colocated_pairs(
    model: LinearProgram,
    colocated: &[(TaskId, TaskId)],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
) -> LinearProgram {
    colocated.iter().fold(model, |m, &(a, b)| {
        stations.clone().fold(m, |m2, station| {
            let x = LinearExpr::from(assignment[&(a, station)]);
            m2.with(
                x.eq(assignment[&(b, station)])
                    .named(format!("coloc_{a}_{b}_{station}")),
            )
        })
    })
}

/// Strict execution order along every precedence pair.
///
/// Σ x[g,s]·order[g,s] ≤ Σ x[h,s]·order[h,s] − 1 is bilinear, but the order
/// bound below forces order[t,s] = 0 wherever x[t,s] = 0, so each product
/// equals order[t,s] and the sums reduce to plain sums of order variables.
fn constrain_sequence_within_stations(
    model: LinearProgram,
    precedence: &[(TaskId, TaskId)],
    stations: RangeInclusive<usize>,
    order: &TaskStationToVariableMap,
) -> LinearProgram {
    precedence.iter().fold(model, |m, &(before, after)| {
        let lhs = station_sum(before, stations.clone(), order, |_| 1.0);
        let rhs = station_sum(after, stations.clone(), order, |_| 1.0) - 1.0;
        m.with(lhs.leq(rhs).named(format!("seq_{before}_{after}")))
    })
}

/// order[task, station] ≤ n × x[task, station]
fn constrain_order_to_assignment(
    model: LinearProgram,
    tasks: &[TaskId],
    stations: RangeInclusive<usize>,
    assignment: &TaskStationToVariableMap,
    order: &TaskStationToVariableMap,
) -> LinearProgram {
    let max_stations = tasks.len() as f64;
    tasks.iter().fold(model, |m, &task| {
        stations.clone().fold(m, |m2, station| {
            let o = LinearExpr::from(order[&(task, station)]);
            let bound = assignment[&(task, station)] * max_stations;
            m2.with(o.leq(bound).named(format!("order_{task}_{station}")))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"
cycleTime: { A: 10, B: 8 }
stationTypes:
  manual: { cost: 10 }
  robot: { cost: 4 }
tasks:
  1: { time: { A: 4, B: 6 } }
  2: { time: { A: 5, B: 1 }, stationTypes: [manual] }
  3: { time: 3, stationTypes: [robot] }
precedence: [[1, 2], [1, 2]]
incompatible: [[3, 2]]
colocated: [[1, 2]]
"#;

    fn problem() -> Problem {
        serde_yaml::from_str(LINE).unwrap()
    }

    /// Variable values for a hand-made plan: task → (station, type index, order).
    fn values_for(f: &Formulation, plan: &[(TaskId, usize, usize, f64)]) -> Vec<f64> {
        let mut values = vec![0.0; f.program.variables().len()];
        for &(task, station, kind, position) in plan {
            values[f.assignment[&(task, station)].index()] = 1.0;
            values[f.opened[&station].index()] = 1.0;
            values[f.typed[&(station, kind)].index()] = 1.0;
            values[f.order[&(task, station)].index()] = position;
        }
        values
    }

    #[test]
    fn variable_and_constraint_counts() {
        let f = formulate(&problem()).unwrap();
        let (n, types, products) = (3, 2, 2);
        assert_eq!(f.program.variables().len(), n * n + n + n * types + n * n);

        let precedence = 1; // duplicates collapse
        let expected = n // assign
            + n * n // open
            + products * n // cycle
            + precedence // prec
            + n // type
            + n * n // compat
            + n // incompat: one pair
            + n // coloc: one pair
            + precedence // seq
            + n * n; // order
        assert_eq!(f.program.constraints().len(), expected);
        assert_eq!(f.stations(), 1..=3);
    }

    #[test]
    fn objective_prices_typed_stations() {
        let f = formulate(&problem()).unwrap();
        let robot = f.typed[&(2, 1)];
        let manual = f.typed[&(3, 0)];
        let terms: BTreeMap<VarId, f64> = f.program.objective().terms().collect();
        assert_eq!(terms[&robot], 4.0);
        assert_eq!(terms[&manual], 10.0);
        assert_eq!(terms.len(), 3 * 2);
    }

    #[test]
    fn accepts_a_valid_plan() {
        let f = formulate(&problem()).unwrap();
        // station 1 robot: task 3; station 2 manual: tasks 1 then 2
        let values = values_for(&f, &[(3, 1, 1, 1.0), (1, 2, 0, 2.0), (2, 2, 0, 3.0)]);
        assert_eq!(f.program.violations(&values, 1e-6), Vec::<String>::new());
    }

    #[test]
    fn rejects_plans_breaking_each_rule() {
        let f = formulate(&problem()).unwrap();

        // 2 sequenced before 1 on the same station
        let values = values_for(&f, &[(3, 1, 1, 1.0), (1, 2, 0, 3.0), (2, 2, 0, 2.0)]);
        assert_eq!(f.program.violations(&values, 1e-6), vec!["seq_1_2"]);

        // 2 on an earlier station than 1, which also splits the co-located pair
        let values = values_for(&f, &[(3, 3, 1, 1.0), (2, 1, 0, 2.0), (1, 2, 0, 1.0)]);
        let violations = f.program.violations(&values, 1e-6);
        assert!(violations.contains(&"prec_1_2".to_string()));
        assert!(violations.contains(&"coloc_1_2_1".to_string()));

        // task 3 on a manual station
        let values = values_for(&f, &[(3, 1, 0, 1.0), (1, 2, 0, 2.0), (2, 2, 0, 3.0)]);
        assert_eq!(f.program.violations(&values, 1e-6), vec!["compat_3_1"]);

        // all tasks together: over cycle time for A, and 2/3 incompatible
        let values = values_for(&f, &[(1, 1, 0, 1.0), (2, 1, 0, 2.0), (3, 1, 0, 3.0)]);
        let violations = f.program.violations(&values, 1e-6);
        assert!(violations.contains(&"cycle_0_1".to_string()));
        assert!(violations.contains(&"incompat_2_3_1".to_string()));
    }

    #[test]
    fn structure_errors_are_collected() {
        let mut problem = problem();
        problem.precedence.push((1, 9));
        problem.incompatible.push((4, 4));
        problem
            .tasks
            .get_mut(&3)
            .unwrap()
            .station_types = Some(vec!["laser".to_string()]);
        let err = formulate(&problem).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown task 9"));
        assert!(message.contains("incompatible with itself"));
        assert!(message.contains("unknown station type 'laser'"));
    }

    #[test]
    fn per_product_cycle_time_must_cover_products() {
        let problem: Problem = serde_yaml::from_str(
            "cycleTime: { A: 5 }\nstationTypes: { m: { cost: 1 } }\ntasks: { 1: { time: { A: 1, B: 2 } } }\n",
        )
        .unwrap();
        let err = check_structure(&problem).unwrap_err();
        assert!(err.to_string().contains("no cycle time for product 'B'"));
    }

    #[test]
    fn missing_task_time_for_product() {
        let problem: Problem = serde_yaml::from_str(
            "cycleTime: 5\nstationTypes: { m: { cost: 1 } }\ntasks: { 1: { time: { A: 1 } }, 2: { time: { B: 1 } } }\n",
        )
        .unwrap();
        let err = check_structure(&problem).unwrap_err();
        assert!(err.to_string().contains("task 1 has no time for product 'B'"));
        assert!(err.to_string().contains("task 2 has no time for product 'A'"));
    }
}
