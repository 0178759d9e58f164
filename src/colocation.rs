//! Analysis of "must share a station" task pairs.
//!
//! Co-location pairs are closed into disjoint groups, and each group is
//! checked against incompatibilities, cycle times, and the precedence
//! relation before a model is built, so a group that can never share a
//! station is reported by name instead of as an infeasible model.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info};

use crate::config::ValidationSettings;
use crate::error::{Error, Result};
use crate::graph::PrecedenceGraph;
use crate::types::{Problem, TaskId};

pub type TaskGroup = BTreeSet<TaskId>;

/// Closes co-location pairs into connected components.
///
/// Each pair seeds a group that absorbs every remaining pair sharing a task
/// with it until nothing changes; identical groups are then merged.
pub fn group_colocated(pairs: &[(TaskId, TaskId)]) -> Vec<TaskGroup> {
    let groups: BTreeSet<TaskGroup> = pairs
        .iter()
        .map(|&seed| expand_group(seed, pairs))
        .collect();
    groups.into_iter().collect()
}

fn expand_group(seed: (TaskId, TaskId), pairs: &[(TaskId, TaskId)]) -> TaskGroup {
    let mut group = TaskGroup::from([seed.0, seed.1]);
    let mut remaining: Vec<(TaskId, TaskId)> = pairs.to_vec();

    loop {
        let (touching, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|(a, b)| group.contains(a) || group.contains(b));
        if touching.is_empty() {
            return group;
        }
        for (a, b) in touching {
            group.insert(a);
            group.insert(b);
        }
        remaining = rest;
    }
}

/// Every incompatible pair that sits entirely inside one group.
pub fn find_incompatible_in_groups(
    groups: &[TaskGroup],
    incompatible: &[(TaskId, TaskId)],
) -> Vec<String> {
    let mut violations = Vec::new();
    for group in groups {
        for &(a, b) in incompatible {
            if group.contains(&a) && group.contains(&b) {
                let violation = format!("group {group:?} contains incompatible tasks ({a}, {b})");
                error!("{violation}");
                violations.push(violation);
            }
        }
    }
    violations
}

/// Groups whose total duration exceeds `cycle_time`, with that total.
pub fn check_cycle_time(
    groups: &[TaskGroup],
    durations: &BTreeMap<TaskId, f64>,
    cycle_time: f64,
    settings: &ValidationSettings,
) -> Vec<(TaskGroup, f64)> {
    groups
        .iter()
        .filter_map(|group| {
            let total: f64 = group
                .iter()
                .map(|task| durations.get(task).copied().unwrap_or(0.0))
                .sum();
            if total > cycle_time {
                error!(?group, total, cycle_time, "tasks cannot be processed together");
                Some((group.clone(), total))
            } else {
                if settings.verbose {
                    info!(?group, total, cycle_time, "tasks can be processed together");
                }
                None
            }
        })
        .collect()
}

/// Tasks that must share the station of `group`.
///
/// Station indices never decrease along a precedence path, so any task lying
/// on a path between two group members is pinned to the group's station.
pub fn forced_tasks(graph: &PrecedenceGraph, group: &TaskGroup) -> TaskGroup {
    let below = graph.descendants(group);
    let above = graph.ancestors(group);
    let mut forced: TaskGroup = below.intersection(&above).copied().collect();
    forced.extend(group.iter().copied());
    forced
}

/// Merges groups until no two of them pin a common task.
///
/// Two groups whose forced sets overlap share that task's station, so they
/// share one station altogether. Merging grows the forced set, which is
/// recomputed until nothing changes.
pub fn merge_pinned_groups(groups: &[TaskGroup], graph: &PrecedenceGraph) -> Vec<TaskGroup> {
    let mut merged = groups.to_vec();
    'search: loop {
        let forced: Vec<TaskGroup> = merged.iter().map(|g| forced_tasks(graph, g)).collect();
        for i in 0..merged.len() {
            for j in i + 1..merged.len() {
                if !forced[i].is_disjoint(&forced[j]) {
                    let absorbed = merged.remove(j);
                    debug!(into = ?merged[i], ?absorbed, "co-located groups pin a common task");
                    merged[i].extend(absorbed);
                    continue 'search;
                }
            }
        }
        merged.sort();
        return merged;
    }
}

/// Fails on the first incompatible pair forced onto one station by a group.
///
/// The forced set uses full reachability, so contradictions that run through
/// several intermediate tasks are caught as well as direct edges.
pub fn check_precedence_consistency(
    groups: &[TaskGroup],
    graph: &PrecedenceGraph,
    incompatible: &[(TaskId, TaskId)],
) -> Result<()> {
    for group in groups {
        let forced = forced_tasks(graph, group);
        for &(a, b) in incompatible {
            if forced.contains(&a) && forced.contains(&b) {
                let edges = graph.edges_within(&forced);
                error!(
                    task = a,
                    incompatible_with = b,
                    ?group,
                    ?edges,
                    "incompatible tasks are forced onto one station by co-located tasks"
                );
                return Err(Error::PrecedenceConflict {
                    pair: (a, b),
                    group: group.iter().copied().collect(),
                    edges,
                });
            }
        }
        debug!(?group, ?forced, "co-located group is consistent with precedence");
    }
    Ok(())
}

/// Runs every co-location check and returns the groups, merged where they
/// pin a common task.
///
/// Incompatibility and cycle-time violations are all collected and logged
/// before failing; the precedence check stops at the first conflict. Cycle
/// times are checked against every task pinned to a group's station.
pub fn analyze(
    problem: &Problem,
    graph: &PrecedenceGraph,
    settings: &ValidationSettings,
) -> Result<Vec<TaskGroup>> {
    let groups = group_colocated(&problem.colocated);
    if settings.verbose {
        info!(?groups, "co-located task groups");
    }

    let incompatible = find_incompatible_in_groups(&groups, &problem.incompatible);
    if !incompatible.is_empty() {
        return Err(Error::IncompatibleGroup(incompatible));
    }

    let groups = merge_pinned_groups(&groups, graph);
    let pinned: Vec<TaskGroup> = groups.iter().map(|g| forced_tasks(graph, g)).collect();

    let mut too_long = Vec::new();
    for product in problem.products() {
        let Some(cycle_time) = problem.cycle_time.for_product(&product) else {
            continue;
        };
        let durations = problem.durations(&product);
        for (group, total) in check_cycle_time(&pinned, &durations, cycle_time, settings) {
            too_long.push(format!(
                "group {group:?} needs {total} for product {product} (cycle time {cycle_time})"
            ));
        }
    }
    if !too_long.is_empty() {
        return Err(Error::GroupExceedsCycleTime(too_long));
    }

    check_precedence_consistency(&groups, graph, &problem.incompatible)?;
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(tasks: &[TaskId]) -> TaskGroup {
        tasks.iter().copied().collect()
    }

    fn pairs_of(groups: &[TaskGroup]) -> Vec<(TaskId, TaskId)> {
        groups
            .iter()
            .flat_map(|g| {
                let first = *g.iter().next().unwrap();
                g.iter().skip(1).map(move |&t| (first, t))
            })
            .collect()
    }

    #[test]
    fn groups_transitive_pairs() {
        let groups = group_colocated(&[(1, 2), (3, 4), (2, 5), (6, 4), (7, 8)]);
        assert_eq!(
            groups,
            vec![group(&[1, 2, 5]), group(&[3, 4, 6]), group(&[7, 8])]
        );
    }

    #[test]
    fn chains_found_in_any_pair_order() {
        let groups = group_colocated(&[(4, 5), (1, 2), (3, 4), (2, 3)]);
        assert_eq!(groups, vec![group(&[1, 2, 3, 4, 5])]);
    }

    #[test]
    fn grouping_is_a_partition_and_idempotent() {
        let pairs = [(1, 2), (2, 3), (10, 11), (11, 12), (20, 21), (3, 1)];
        let groups = group_colocated(&pairs);

        let mut seen = BTreeSet::new();
        for g in &groups {
            for task in g {
                assert!(seen.insert(*task), "task {task} in two groups");
            }
        }
        let mentioned: BTreeSet<TaskId> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
        assert_eq!(seen, mentioned);

        assert_eq!(group_colocated(&pairs_of(&groups)), groups);
    }

    #[test]
    fn no_pairs_no_groups() {
        assert!(group_colocated(&[]).is_empty());
    }

    #[test]
    fn reports_every_incompatible_group() {
        let groups = vec![group(&[1, 2]), group(&[3, 4])];
        let violations = find_incompatible_in_groups(&groups, &[(2, 1), (3, 4), (1, 3)]);
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn flags_groups_over_cycle_time() {
        let durations = BTreeMap::from([(1, 1.0), (2, 1.0), (3, 1.0), (4, 6.0), (5, 8.0)]);
        let groups = vec![group(&[1, 3]), group(&[4, 5])];
        let flagged = check_cycle_time(&groups, &durations, 10.0, &ValidationSettings::default());
        assert_eq!(flagged, vec![(group(&[4, 5]), 14.0)]);
    }

    #[test]
    fn precedence_adjacent_incompatible_pair_is_accepted() {
        // 1 -> 2 -> 3 with 1 and 2 incompatible, but nothing forces them together.
        let graph = PrecedenceGraph::new(1..=5, &[(1, 2), (2, 3)]);
        let groups = group_colocated(&[(4, 5)]);
        assert!(check_precedence_consistency(&groups, &graph, &[(1, 2)]).is_ok());
        assert!(check_precedence_consistency(&[], &graph, &[(1, 2)]).is_ok());
    }

    #[test]
    fn colocating_path_ends_pins_the_middle() {
        // 1 and 3 share a station, so 2 sits there too and clashes with 1.
        let graph = PrecedenceGraph::new(1..=5, &[(1, 2), (2, 3)]);
        let groups = group_colocated(&[(1, 3)]);
        let err = check_precedence_consistency(&groups, &graph, &[(1, 2)]).unwrap_err();
        match err {
            Error::PrecedenceConflict { pair, group, edges } => {
                assert_eq!(pair, (1, 2));
                assert_eq!(group, vec![1, 3]);
                assert_eq!(edges, vec![(1, 2), (2, 3)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn conflict_through_long_paths() {
        // 1 -> 2 -> 3 -> 4 -> 5, group {1, 5}: 2 and 4 are both pinned.
        let graph = PrecedenceGraph::new(1..=6, &[(1, 2), (2, 3), (3, 4), (4, 5), (6, 5)]);
        let groups = group_colocated(&[(1, 5)]);
        assert!(check_precedence_consistency(&groups, &graph, &[(2, 4)]).is_err());
        // 6 only feeds 5, it is not pinned.
        assert!(check_precedence_consistency(&groups, &graph, &[(6, 3)]).is_ok());
        assert_eq!(forced_tasks(&graph, &groups[0]), group(&[1, 2, 3, 4, 5]));
    }

    fn line(yaml: &str) -> Problem {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn analyze_line(problem: &Problem) -> Result<Vec<TaskGroup>> {
        let graph = PrecedenceGraph::new(problem.tasks.keys().copied(), &problem.precedence);
        analyze(problem, &graph, &ValidationSettings::default())
    }

    #[test]
    fn groups_sharing_a_pinned_task_are_merged() {
        // {1, 3} pins 2, which is co-located with 5
        let graph = PrecedenceGraph::new(1..=5, &[(1, 2), (2, 3)]);
        let groups = group_colocated(&[(1, 3), (2, 5)]);
        assert_eq!(
            merge_pinned_groups(&groups, &graph),
            vec![group(&[1, 2, 3, 5])]
        );

        // 2 sits between 1 and 3 and between 4 and 6
        let graph = PrecedenceGraph::new(1..=7, &[(1, 2), (2, 3), (4, 2), (2, 6)]);
        let groups = group_colocated(&[(1, 3), (4, 6), (5, 7)]);
        assert_eq!(
            merge_pinned_groups(&groups, &graph),
            vec![group(&[1, 3, 4, 6]), group(&[5, 7])]
        );
    }

    #[test]
    fn incompatibility_with_a_merged_group_is_a_conflict() {
        let problem = line(
            r#"
cycleTime: 100
stationTypes: { m: { cost: 1 } }
tasks: { 1: { time: 1 }, 2: { time: 1 }, 3: { time: 1 }, 4: { time: 1 }, 5: { time: 1 } }
precedence: [[1, 2], [2, 3]]
colocated: [[1, 3], [2, 5]]
incompatible: [[5, 1]]
"#,
        );
        match analyze_line(&problem) {
            Err(Error::PrecedenceConflict { pair, group, edges }) => {
                assert_eq!(pair, (5, 1));
                assert_eq!(group, vec![1, 2, 3, 5]);
                assert_eq!(edges, vec![(1, 2), (2, 3)]);
            }
            other => panic!("expected a precedence conflict, got {other:?}"),
        }
    }

    #[test]
    fn pinned_tasks_count_towards_cycle_time() {
        let problem = line(
            r#"
cycleTime: 10
stationTypes: { m: { cost: 1 } }
tasks: { 1: { time: 4 }, 2: { time: 5 }, 3: { time: 4 } }
precedence: [[1, 2], [2, 3]]
colocated: [[1, 3]]
"#,
        );
        match analyze_line(&problem) {
            Err(Error::GroupExceedsCycleTime(violations)) => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("needs 13"), "{}", violations[0]);
            }
            other => panic!("expected a cycle time violation, got {other:?}"),
        }

        let mut roomy = problem.clone();
        roomy.cycle_time = crate::types::CycleTime::Uniform(13.0);
        assert_eq!(analyze_line(&roomy).unwrap(), vec![group(&[1, 3])]);
    }
}
