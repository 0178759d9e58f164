//! Free-format MPS export and import.
//!
//! Engines that read models from disk get exactly the program the in-memory
//! path would solve: [`parse`] reads back everything [`to_string`] emits
//! (variables, bounds, integrality, objective, named rows) unchanged.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::lp::{Constraint, LinearExpr, LinearProgram, Sense, VarDef, VarId, VarKind};

const OBJECTIVE_ROW: &str = "COST";
const BOUND_SET: &str = "BND";
const RHS_SET: &str = "RHS";

/// Renders `program` as a free-format MPS document.
pub fn to_string(program: &LinearProgram) -> String {
    let mut out = String::new();
    let row_names: Vec<String> = program
        .constraints()
        .iter()
        .enumerate()
        .map(|(index, c)| row_name(c, index))
        .collect();

    let _ = writeln!(out, "NAME {}", program.name());
    out.push_str("ROWS\n");
    let _ = writeln!(out, " N  {OBJECTIVE_ROW}");
    for (constraint, name) in program.constraints().iter().zip(&row_names) {
        let sense = match constraint.sense {
            Sense::Le => "L",
            Sense::Ge => "G",
            Sense::Eq => "E",
        };
        let _ = writeln!(out, " {sense}  {name}");
    }

    // Column-major coefficient lists.
    let mut columns: Vec<Vec<(&str, f64)>> = vec![Vec::new(); program.variables().len()];
    for (var, coef) in program.objective().terms() {
        columns[var.index()].push((OBJECTIVE_ROW, coef));
    }
    for (constraint, name) in program.constraints().iter().zip(&row_names) {
        for &(var, coef) in &constraint.terms {
            columns[var.index()].push((name.as_str(), coef));
        }
    }

    out.push_str("COLUMNS\n");
    let mut in_integer_block = false;
    for (index, (def, entries)) in program.variables().iter().zip(&columns).enumerate() {
        let integral = def.kind != VarKind::Continuous;
        if integral != in_integer_block {
            let marker = if integral { "INTORG" } else { "INTEND" };
            let _ = writeln!(out, "    M{index}  'MARKER'  '{marker}'");
            in_integer_block = integral;
        }
        if entries.is_empty() {
            let _ = writeln!(out, "    {}  {OBJECTIVE_ROW}  0", def.name);
        }
        for (row, coef) in entries {
            let _ = writeln!(out, "    {}  {row}  {coef}", def.name);
        }
    }
    if in_integer_block {
        out.push_str("    MEND  'MARKER'  'INTEND'\n");
    }

    out.push_str("RHS\n");
    if program.objective().constant() != 0.0 {
        let _ = writeln!(
            out,
            "    {RHS_SET}  {OBJECTIVE_ROW}  {}",
            -program.objective().constant()
        );
    }
    for (constraint, name) in program.constraints().iter().zip(&row_names) {
        if constraint.rhs != 0.0 {
            let _ = writeln!(out, "    {RHS_SET}  {name}  {}", constraint.rhs);
        }
    }

    out.push_str("BOUNDS\n");
    for def in program.variables() {
        write_bounds(&mut out, def);
    }
    out.push_str("ENDATA\n");
    out
}

fn row_name(constraint: &Constraint, index: usize) -> String {
    if constraint.name.is_empty() {
        format!("R{index}")
    } else {
        constraint.name.clone()
    }
}

fn write_bounds(out: &mut String, def: &VarDef) {
    let name = &def.name;
    if def.kind == VarKind::Binary {
        let _ = writeln!(out, " BV {BOUND_SET}  {name}");
        return;
    }
    let (lower_code, upper_code) = match def.kind {
        VarKind::Integer => ("LI", "UI"),
        _ => ("LO", "UP"),
    };
    if def.lower == f64::NEG_INFINITY {
        let _ = writeln!(out, " MI {BOUND_SET}  {name}");
    } else if def.lower != 0.0 {
        let _ = writeln!(out, " {lower_code} {BOUND_SET}  {name}  {}", def.lower);
    }
    match def.upper {
        Some(upper) => {
            let _ = writeln!(out, " {upper_code} {BOUND_SET}  {name}  {upper}");
        }
        None => {
            let _ = writeln!(out, " PL {BOUND_SET}  {name}");
        }
    }
}

pub fn write_file(program: &LinearProgram, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_string(program))?;
    debug!(
        path = %path.display(),
        variables = program.variables().len(),
        constraints = program.constraints().len(),
        "wrote MPS file"
    );
    Ok(())
}

pub fn read_file(path: impl AsRef<Path>) -> Result<LinearProgram> {
    parse(&std::fs::read_to_string(path)?)
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Header,
    Rows,
    Columns,
    Rhs,
    Bounds,
    End,
}

struct Row {
    name: String,
    sense: Sense,
    terms: Vec<(VarId, f64)>,
    rhs: f64,
}

/// Parses a free-format MPS document into a minimization program.
pub fn parse(input: &str) -> Result<LinearProgram> {
    let mut section = Section::Header;
    let mut name = String::new();
    let mut objective_row: Option<String> = None;
    let mut objective = LinearExpr::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut row_index: HashMap<String, usize> = HashMap::new();
    let mut variables: Vec<VarDef> = Vec::new();
    let mut column_index: HashMap<String, VarId> = HashMap::new();
    let mut integer_block = false;

    for (number, raw) in input.lines().enumerate() {
        let line = number + 1;
        let fail = |message: String| Error::Mps { line, message };
        if raw.trim().is_empty() || raw.starts_with('*') {
            continue;
        }
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        if !raw.starts_with(char::is_whitespace) {
            section = match tokens[0] {
                "NAME" => {
                    name = tokens.get(1).map(|s| s.to_string()).unwrap_or_default();
                    Section::Header
                }
                "ROWS" => Section::Rows,
                "COLUMNS" => Section::Columns,
                "RHS" => Section::Rhs,
                "BOUNDS" => Section::Bounds,
                "ENDATA" => Section::End,
                other => return Err(fail(format!("unsupported section '{other}'"))),
            };
            continue;
        }

        match section {
            Section::Rows => {
                let &[code, row] = tokens.as_slice() else {
                    return Err(fail("expected '<type> <row>'".into()));
                };
                let sense = match code {
                    "N" => {
                        if objective_row.is_none() {
                            objective_row = Some(row.to_string());
                        }
                        continue;
                    }
                    "L" => Sense::Le,
                    "G" => Sense::Ge,
                    "E" => Sense::Eq,
                    other => return Err(fail(format!("unknown row type '{other}'"))),
                };
                row_index.insert(row.to_string(), rows.len());
                rows.push(Row {
                    name: row.to_string(),
                    sense,
                    terms: Vec::new(),
                    rhs: 0.0,
                });
            }
            Section::Columns => {
                if tokens.get(1) == Some(&"'MARKER'") {
                    match tokens.get(2).copied() {
                        Some("'INTORG'") => integer_block = true,
                        Some("'INTEND'") => integer_block = false,
                        _ => return Err(fail("unknown marker".into())),
                    }
                    continue;
                }
                if tokens.len() < 3 || tokens.len() % 2 == 0 {
                    return Err(fail("expected '<column> <row> <value> [<row> <value>]'".into()));
                }
                let column = tokens[0];
                let var = *column_index.entry(column.to_string()).or_insert_with(|| {
                    variables.push(if integer_block {
                        VarDef::integer(column, 0.0, None)
                    } else {
                        VarDef::continuous(column, 0.0, None)
                    });
                    VarId::new(variables.len() - 1)
                });
                for pair in tokens[1..].chunks(2) {
                    let value = parse_number(pair[1]).map_err(&fail)?;
                    if value == 0.0 {
                        continue;
                    }
                    if objective_row.as_deref() == Some(pair[0]) {
                        objective.add_term(var, value);
                    } else {
                        let index = *row_index
                            .get(pair[0])
                            .ok_or_else(|| fail(format!("unknown row '{}'", pair[0])))?;
                        rows[index].terms.push((var, value));
                    }
                }
            }
            Section::Rhs => {
                if tokens.len() < 3 || tokens.len() % 2 == 0 {
                    return Err(fail("expected '<set> <row> <value> [<row> <value>]'".into()));
                }
                for pair in tokens[1..].chunks(2) {
                    let value = parse_number(pair[1]).map_err(&fail)?;
                    if objective_row.as_deref() == Some(pair[0]) {
                        objective += -value;
                    } else {
                        let index = *row_index
                            .get(pair[0])
                            .ok_or_else(|| fail(format!("unknown row '{}'", pair[0])))?;
                        rows[index].rhs = value;
                    }
                }
            }
            Section::Bounds => {
                if tokens.len() < 3 {
                    return Err(fail("expected '<type> <set> <column> [<value>]'".into()));
                }
                let var = *column_index
                    .get(tokens[2])
                    .ok_or_else(|| fail(format!("unknown column '{}'", tokens[2])))?;
                let value = match tokens.get(3) {
                    Some(token) => Some(parse_number(token).map_err(&fail)?),
                    None => None,
                };
                let def = &mut variables[var.index()];
                let need = |value: Option<f64>| {
                    value.ok_or_else(|| fail(format!("bound '{}' needs a value", tokens[0])))
                };
                match tokens[0] {
                    "BV" => *def = VarDef::binary(def.name.clone()),
                    "LO" => def.lower = need(value)?,
                    "UP" => def.upper = Some(need(value)?),
                    "LI" => {
                        def.kind = VarKind::Integer;
                        def.lower = need(value)?;
                    }
                    "UI" => {
                        def.kind = VarKind::Integer;
                        def.upper = Some(need(value)?);
                    }
                    "FX" => {
                        let fixed = need(value)?;
                        def.lower = fixed;
                        def.upper = Some(fixed);
                    }
                    "MI" => def.lower = f64::NEG_INFINITY,
                    "PL" => def.upper = None,
                    "FR" => {
                        def.lower = f64::NEG_INFINITY;
                        def.upper = None;
                    }
                    other => return Err(fail(format!("unknown bound type '{other}'"))),
                }
            }
            Section::Header | Section::End => {
                return Err(fail("data outside of a section".into()));
            }
        }
    }

    let mut program = LinearProgram::new(name);
    for def in variables {
        program.add_variable(def);
    }
    for row in rows {
        program.add_constraint(Constraint {
            name: row.name,
            terms: row.terms,
            sense: row.sense,
            rhs: row.rhs,
        });
    }
    Ok(program.minimise(objective))
}

fn parse_number(token: &str) -> std::result::Result<f64, String> {
    token
        .parse()
        .map_err(|_| format!("'{token}' is not a number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinearProgram {
        let mut program = LinearProgram::new("sample");
        let x = program.add_variable(VarDef::binary("x"));
        let n = program.add_variable(VarDef::integer("n", 0.0, Some(4.0)));
        let c = program.add_variable(VarDef::continuous("c", 1.5, None));
        let free = program.add_variable(VarDef::integer("free", -2.0, None));
        program
            .minimise(x * 10.0 + n * 2.5 + 7.0)
            .with((x * 1.0 + n).leq(3.0).named("cap"))
            .with((c * 1.0 - n).geq(-1.0).named("link"))
            .with((LinearExpr::from(free) + x).eq(0.0).named("bal"))
    }

    #[test]
    fn round_trips_exactly() {
        let program = sample();
        let text = to_string(&program);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, program);
        assert_eq!(parsed.variables().len(), 4);
        assert_eq!(parsed.constraints().len(), 3);
    }

    #[test]
    fn writes_markers_and_bounds() {
        let text = to_string(&sample());
        assert!(text.contains("'INTORG'"));
        assert!(text.contains(" BV BND  x"));
        assert!(text.contains(" UI BND  n  4"));
        assert!(text.contains(" LO BND  c  1.5"));
        assert!(text.contains(" LI BND  free  -2"));
        assert!(text.contains("    RHS  COST  -7"));
        assert!(text.ends_with("ENDATA\n"));
    }

    #[test]
    fn reports_line_of_bad_input() {
        let err = parse("NAME t\nROWS\n N  COST\n L  r\nCOLUMNS\n    x  r  abc\n").unwrap_err();
        match err {
            Error::Mps { line, message } => {
                assert_eq!(line, 6);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unknown_rows() {
        assert!(parse("NAME t\nROWS\n N  COST\nCOLUMNS\n    x  nope  1\n").is_err());
    }
}
