//! Engine-agnostic mixed integer linear program.
//!
//! The formulation is kept in this plain form, rather than directly in a
//! solver's model type, so the same program can be handed to any engine,
//! written to an MPS file, and grown in place by no-good cuts between solves.

use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: Option<f64>,
}

impl VarDef {
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: Some(1.0),
        }
    }

    pub fn integer(name: impl Into<String>, lower: f64, upper: Option<f64>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Integer,
            lower,
            upper,
        }
    }

    pub fn continuous(name: impl Into<String>, lower: f64, upper: Option<f64>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Continuous,
            lower,
            upper,
        }
    }
}

/// `Σ coefficient × variable + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        let entry = self.terms.entry(var).or_insert(0.0);
        *entry += coefficient;
        if *entry == 0.0 {
            self.terms.remove(&var);
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(&var, &coef)| (var, coef))
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms()
            .map(|(var, coef)| coef * values.get(var.index()).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    pub fn leq(self, rhs: impl Into<LinearExpr>) -> Constraint {
        Constraint::new(self, Sense::Le, rhs.into())
    }

    pub fn geq(self, rhs: impl Into<LinearExpr>) -> Constraint {
        Constraint::new(self, Sense::Ge, rhs.into())
    }

    pub fn eq(self, rhs: impl Into<LinearExpr>) -> Constraint {
        Constraint::new(self, Sense::Eq, rhs.into())
    }
}

impl From<f64> for LinearExpr {
    fn from(constant: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant,
        }
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        let mut expr = Self::new();
        expr.add_term(var, 1.0);
        expr
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> AddAssign<T> for LinearExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        for (var, coef) in rhs.terms {
            self.add_term(var, coef);
        }
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        let rhs: LinearExpr = rhs.into();
        self + (-rhs)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self * -1.0
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(self, factor: f64) -> LinearExpr {
        LinearExpr {
            terms: self
                .terms
                .into_iter()
                .map(|(var, coef)| (var, coef * factor))
                .collect(),
            constant: self.constant * factor,
        }
    }
}

impl Mul<f64> for VarId {
    type Output = LinearExpr;

    fn mul(self, factor: f64) -> LinearExpr {
        LinearExpr::from(self) * factor
    }
}

impl Sum for LinearExpr {
    fn sum<I: Iterator<Item = LinearExpr>>(iter: I) -> Self {
        iter.fold(LinearExpr::new(), |sum, expr| sum + expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// A row `Σ coefficient × variable  (<=|>=|=)  rhs` with constants folded into `rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    fn new(lhs: LinearExpr, sense: Sense, rhs: LinearExpr) -> Self {
        let difference = lhs - rhs;
        Self {
            name: String::new(),
            terms: difference.terms().filter(|&(_, coef)| coef != 0.0).collect(),
            sense,
            rhs: -difference.constant,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn lhs(&self) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for &(var, coef) in &self.terms {
            expr.add_term(var, coef);
        }
        expr
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs().evaluate(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// A minimization problem.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
    name: String,
    variables: Vec<VarDef>,
    objective: LinearExpr,
    constraints: Vec<Constraint>,
}

impl LinearProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            objective: LinearExpr::new(),
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_variable(&mut self, definition: VarDef) -> VarId {
        self.variables.push(definition);
        VarId(self.variables.len() - 1)
    }

    pub fn variables(&self) -> &[VarDef] {
        &self.variables
    }

    pub fn minimise(mut self, objective: LinearExpr) -> Self {
        self.objective = objective;
        self
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    /// Adds a constraint, consuming and returning the program.
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.add_constraint(constraint);
        self
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Names of the constraints (and bounds) violated by `values`.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<String> {
        let mut violated: Vec<String> = self
            .constraints
            .iter()
            .filter(|c| !c.is_satisfied(values, tolerance))
            .map(|c| c.name.clone())
            .collect();
        for (index, def) in self.variables.iter().enumerate() {
            let value = values.get(index).copied().unwrap_or(0.0);
            let out_of_bounds = value < def.lower - tolerance
                || def.upper.is_some_and(|upper| value > upper + tolerance);
            let fractional =
                def.kind != VarKind::Continuous && (value - value.round()).abs() > tolerance;
            if out_of_bounds || fractional {
                violated.push(def.name.clone());
            }
        }
        violated
    }
}
