//! Reading a solved model back into an ordered station plan.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::{debug, error};

use crate::engine::SolveStatus;
use crate::error::{Error, Result};
use crate::graph::PrecedenceGraph;
use crate::lp::VarId;
use crate::model::Formulation;
use crate::types::{Problem, Solution, StationAssignment, TaskId};

/// An opened station at its internal (possibly sparse) index.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenStation {
    pub station_type: String,
    pub tasks: Vec<TaskId>,
}

fn is_set(values: &[f64], var: VarId) -> bool {
    values.get(var.index()).copied().unwrap_or(0.0).round() == 1.0
}

/// Opened stations with their type and tasks, keyed by internal station index.
///
/// Values are rounded, so solver noise such as `0.9999999` counts as set.
pub fn extract_stations(
    formulation: &Formulation,
    values: &[f64],
) -> Result<BTreeMap<usize, OpenStation>> {
    let mut stations = BTreeMap::new();
    for station in formulation.stations() {
        if !is_set(values, formulation.opened[&station]) {
            continue;
        }
        let station_type = formulation
            .station_types
            .iter()
            .enumerate()
            .find(|&(kind, _)| is_set(values, formulation.typed[&(station, kind)]))
            .map(|(_, name)| name.clone())
            .ok_or_else(|| {
                Error::Solver(format!("station {station} is open but has no station type"))
            })?;
        let tasks = formulation
            .tasks
            .iter()
            .copied()
            .filter(|&task| is_set(values, formulation.assignment[&(task, station)]))
            .collect();
        stations.insert(
            station,
            OpenStation {
                station_type,
                tasks,
            },
        );
    }
    debug!(opened = stations.len(), "stations extracted");
    Ok(stations)
}

/// Orders the tasks of one station consistently with precedence.
///
/// Tasks linked by precedence to another task of the same station are sorted
/// topologically (ties keep their input order) and written back into the
/// slots those tasks occupied; every other task keeps its slot.
pub fn order_station(
    station: usize,
    tasks: &[TaskId],
    graph: &PrecedenceGraph,
) -> Result<Vec<TaskId>> {
    let members: BTreeSet<TaskId> = tasks.iter().copied().collect();
    let edges = graph.edges_within(&members);
    if edges.is_empty() {
        return Ok(tasks.to_vec());
    }

    let position: BTreeMap<TaskId, usize> =
        tasks.iter().enumerate().map(|(i, &task)| (task, i)).collect();
    let linked: BTreeSet<TaskId> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();

    let mut in_degree: BTreeMap<TaskId, usize> = linked.iter().map(|&t| (t, 0)).collect();
    let mut successors: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    for &(from, to) in &edges {
        *in_degree.entry(to).or_default() += 1;
        successors.entry(from).or_default().push(to);
    }

    // Kahn's algorithm, ready tasks released in input order
    let mut ready: BinaryHeap<Reverse<(usize, TaskId)>> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&task, _)| Reverse((position[&task], task)))
        .collect();
    let mut sorted = Vec::with_capacity(linked.len());
    while let Some(Reverse((_, task))) = ready.pop() {
        sorted.push(task);
        for &next in successors.get(&task).into_iter().flatten() {
            let degree = in_degree.entry(next).or_default();
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse((position[&next], next)));
            }
        }
    }

    if sorted.len() != linked.len() {
        error!(station, ?tasks, ?edges, "station tasks admit no precedence order");
        return Err(Error::SequencingCycle {
            station,
            tasks: tasks.to_vec(),
        });
    }

    let mut sorted = sorted.into_iter();
    Ok(tasks
        .iter()
        .map(|&task| {
            if linked.contains(&task) {
                sorted.next().unwrap_or(task)
            } else {
                task
            }
        })
        .collect())
}

/// Orders the tasks of every station.
pub fn sequence_tasks(
    stations: BTreeMap<usize, OpenStation>,
    precedence: &[(TaskId, TaskId)],
) -> Result<BTreeMap<usize, OpenStation>> {
    let graph = PrecedenceGraph::from_edges(precedence);
    stations
        .into_iter()
        .map(|(index, station)| {
            let tasks = order_station(index, &station.tasks, &graph)?;
            Ok((
                index,
                OpenStation {
                    station_type: station.station_type,
                    tasks,
                },
            ))
        })
        .collect()
}

/// Renumbers the opened stations densely from 1 and adds cost and loads.
pub fn report(
    problem: &Problem,
    status: SolveStatus,
    stations: BTreeMap<usize, OpenStation>,
) -> Solution {
    let products = problem.products();
    let stations: BTreeMap<usize, StationAssignment> = stations
        .into_values()
        .enumerate()
        .map(|(i, station)| {
            let load = products
                .iter()
                .map(|product| {
                    let total = station
                        .tasks
                        .iter()
                        .filter_map(|&task| problem.duration(task, product))
                        .sum::<f64>();
                    (product.clone(), total)
                })
                .collect();
            let assignment = StationAssignment {
                station_type: station.station_type,
                tasks: station.tasks,
                load,
            };
            (i + 1, assignment)
        })
        .collect();
    let cost = stations
        .values()
        .filter_map(|s| problem.station_types.get(&s.station_type))
        .map(|spec| spec.cost)
        .sum::<f64>();
    Solution {
        status,
        cost,
        stations,
    }
}
