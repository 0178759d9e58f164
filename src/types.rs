use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::engine::SolveStatus;

pub type TaskId = u32;

/// Product name used when neither the cycle time nor any task names a product.
pub const DEFAULT_PRODUCT: &str = "default";

/// One assembly line balancing instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "cycleTime")]
    pub cycle_time: CycleTime,
    #[serde(rename = "stationTypes")]
    pub station_types: BTreeMap<String, StationTypeSpec>,
    pub tasks: BTreeMap<TaskId, TaskSpec>,
    #[serde(default)]
    pub precedence: Vec<(TaskId, TaskId)>,
    #[serde(default)]
    pub incompatible: Vec<(TaskId, TaskId)>,
    #[serde(default)]
    pub colocated: Vec<(TaskId, TaskId)>,
}

/// Either one cycle time shared by every product, or one per product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CycleTime {
    Uniform(f64),
    PerProduct(BTreeMap<String, f64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationTypeSpec {
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub time: TaskTime,
    /// Station types able to perform the task; `None` means every type.
    #[serde(rename = "stationTypes", default)]
    pub station_types: Option<Vec<String>>,
}

/// Processing time of a task, uniform or per product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskTime {
    Uniform(f64),
    PerProduct(BTreeMap<String, f64>),
}

impl TaskTime {
    pub fn for_product(&self, product: &str) -> Option<f64> {
        match self {
            TaskTime::Uniform(time) => Some(*time),
            TaskTime::PerProduct(times) => times.get(product).copied(),
        }
    }
}

impl CycleTime {
    pub fn for_product(&self, product: &str) -> Option<f64> {
        match self {
            CycleTime::Uniform(time) => Some(*time),
            CycleTime::PerProduct(times) => times.get(product).copied(),
        }
    }
}

impl Problem {
    /// Every product produced on the line, in name order.
    pub fn products(&self) -> Vec<String> {
        let mut products = BTreeSet::new();
        if let CycleTime::PerProduct(times) = &self.cycle_time {
            products.extend(times.keys().cloned());
        }
        for spec in self.tasks.values() {
            if let TaskTime::PerProduct(times) = &spec.time {
                products.extend(times.keys().cloned());
            }
        }
        if products.is_empty() {
            products.insert(DEFAULT_PRODUCT.to_string());
        }
        products.into_iter().collect()
    }

    /// Duration of `task` when producing `product`, if the task exists and names it.
    pub fn duration(&self, task: TaskId, product: &str) -> Option<f64> {
        self.tasks
            .get(&task)
            .and_then(|spec| spec.time.for_product(product))
    }

    /// Durations of every task for one product.
    pub fn durations(&self, product: &str) -> BTreeMap<TaskId, f64> {
        self.tasks
            .iter()
            .filter_map(|(&task, spec)| spec.time.for_product(product).map(|t| (task, t)))
            .collect()
    }

    pub fn is_compatible(&self, task: TaskId, station_type: &str) -> bool {
        self.tasks
            .get(&task)
            .map(|spec| match &spec.station_types {
                None => true,
                Some(types) => types.iter().any(|t| t == station_type),
            })
            .unwrap_or(false)
    }
}

/// The balanced line, stations numbered densely from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub cost: f64,
    pub stations: BTreeMap<usize, StationAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationAssignment {
    #[serde(rename = "stationType")]
    pub station_type: String,
    pub tasks: Vec<TaskId>,
    /// Total processing time per product.
    pub load: BTreeMap<String, f64>,
}

impl Solution {
    /// Display index of the station holding `task`.
    pub fn station_of(&self, task: TaskId) -> Option<usize> {
        self.stations
            .iter()
            .find(|(_, station)| station.tasks.contains(&task))
            .map(|(&index, _)| index)
    }
}
