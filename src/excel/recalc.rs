//! Formula recalculation applied while persisting a workbook
//!
//! Only formulas downstream of the cells edited since load are evaluated;
//! they are ordered by their cell-reference dependencies and computed in
//! f64. References are rewritten to placeholder names bound to current
//! cell values, so a formula sees the results of every formula it depends
//! on. Anything the evaluator cannot handle (external workbook links,
//! unknown functions, whole-column references, cycles) keeps the value
//! cached in the file.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::excel::cell_ref::{letter_to_column_index, CellRef, MAX_ROW};
use crate::excel::formula::{evaluate_formula, EvalContext, Value};
use crate::excel::workbook::{CellValue, Workbook};

/// Ranges larger than this are not expanded; the formula keeps its cached value
const MAX_RANGE_CELLS: usize = 10_000;

/// Outcome counters of one recalculation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcReport {
    /// Formulas evaluated and stored with a fresh result
    pub evaluated: usize,
    /// Formulas that kept their cached value (unsupported or failed)
    pub kept_cached: usize,
    /// Formulas skipped because they sit on a reference cycle
    pub cyclic: usize,
    /// Formulas no edited cell feeds into, left as they were
    pub untouched: usize,
}

/// (sheet index, position) of a cell in the workbook
type CellKey = (usize, CellRef);

/// A reference found in a formula
#[derive(Debug, Clone, PartialEq)]
struct Reference {
    /// Byte span of the reference text inside the formula
    span: (usize, usize),
    /// Sheet index; `None` when the named sheet does not exist
    sheet: Option<usize>,
    external: bool,
    start: CellRef,
    end: CellRef,
}

impl Reference {
    fn cell_count(&self) -> usize {
        let rows = (self.end.row - self.start.row) as usize + 1;
        let cols = (self.end.col - self.start.col) as usize + 1;
        rows * cols
    }

    fn contains(&self, pos: CellRef) -> bool {
        pos.row >= self.start.row
            && pos.row <= self.end.row
            && pos.col >= self.start.col
            && pos.col <= self.end.col
    }

    fn positions(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| {
                (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col))
            })
    }

    fn resolvable(&self) -> bool {
        !self.external && self.sheet.is_some() && self.cell_count() <= MAX_RANGE_CELLS
    }
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                (?P<ext>\[[^\]]*\])?
                (?:'(?P<qsheet>(?:[^']|'')+)'|(?P<sheet>[A-Za-z_][A-Za-z0-9_.]*))
                !
            )?
            \$?(?P<c1>[A-Za-z]{1,3})\$?(?P<r1>[0-9]+)
            (?::\$?(?P<c2>[A-Za-z]{1,3})\$?(?P<r2>[0-9]+))?
            ",
        )
        .expect("reference pattern is valid")
    })
}

/// Byte ranges covered by double-quoted string literals
fn string_literal_spans(formula: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (idx, ch) in formula.char_indices() {
        if ch == '"' {
            match open {
                Some(start) => {
                    spans.push((start, idx + 1));
                    open = None;
                }
                None => open = Some(idx),
            }
        }
    }
    if let Some(start) = open {
        spans.push((start, formula.len()));
    }
    spans
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Extract the cell references of a formula, resolving sheet names
fn find_references(formula: &str, own_sheet: usize, workbook: &Workbook) -> Vec<Reference> {
    let literals = string_literal_spans(formula);
    let mut refs = Vec::new();

    for caps in reference_regex().captures_iter(formula) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let (start, end) = (whole.start(), whole.end());

        if literals.iter().any(|(s, e)| start >= *s && start < *e) {
            continue;
        }
        // Reject matches glued to identifiers (LOG10, ATAN2) or followed by `(`
        let before = formula[..start].chars().next_back();
        let after = formula[end..].chars().next();
        if before.is_some_and(|c| is_identifier_char(c) || c == '\'' || c == ']') {
            continue;
        }
        if after.is_some_and(|c| is_identifier_char(c) || c == '(' || c == '!') {
            continue;
        }

        if let Some(reference) = build_reference(&caps, (start, end), own_sheet, workbook) {
            refs.push(reference);
        }
    }

    refs
}

fn build_reference(
    caps: &Captures<'_>,
    span: (usize, usize),
    own_sheet: usize,
    workbook: &Workbook,
) -> Option<Reference> {
    let first = position(caps.name("c1")?.as_str(), caps.name("r1")?.as_str())?;
    let second = match (caps.name("c2"), caps.name("r2")) {
        (Some(c), Some(r)) => position(c.as_str(), r.as_str())?,
        _ => first,
    };

    let sheet_name = caps
        .name("qsheet")
        .map(|m| m.as_str().replace("''", "'"))
        .or_else(|| caps.name("sheet").map(|m| m.as_str().to_string()));
    let external = caps.name("ext").is_some()
        || sheet_name.as_deref().is_some_and(|s| s.starts_with('['));
    let sheet = match sheet_name {
        Some(name) => workbook.sheet_index(&name),
        None => Some(own_sheet),
    };

    Some(Reference {
        span,
        sheet,
        external,
        start: CellRef::new(first.row.min(second.row), first.col.min(second.col)),
        end: CellRef::new(first.row.max(second.row), first.col.max(second.col)),
    })
}

fn position(letters: &str, digits: &str) -> Option<CellRef> {
    let col = letter_to_column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row - 1 > MAX_ROW {
        return None;
    }
    Some(CellRef::new(row - 1, col))
}

/// Recomputes formula cells in place
#[derive(Debug, Clone, Copy, Default)]
pub struct Recalculator;

impl Recalculator {
    pub fn new() -> Self {
        Self
    }

    /// Re-evaluate every formula downstream of the sheets' edited cells
    ///
    /// Formulas that no edited cell feeds into keep their cached values
    /// untouched, so a persist never rewrites results it had no reason to
    /// change.
    pub fn recalculate(&self, workbook: &mut Workbook) -> RecalcReport {
        let mut report = RecalcReport::default();

        let edited: HashSet<CellKey> = workbook
            .sheets()
            .iter()
            .enumerate()
            .flat_map(|(idx, sheet)| sheet.edited_cells().map(move |pos| (idx, pos)))
            .collect();
        if edited.is_empty() {
            return report;
        }

        let mut formulas: Vec<(CellKey, String, Vec<Reference>)> = Vec::new();
        for (sheet_idx, sheet) in workbook.sheets().iter().enumerate() {
            for (pos, cell) in sheet.cells() {
                if let Some(formula) = &cell.formula {
                    let refs = find_references(formula, sheet_idx, workbook);
                    formulas.push(((sheet_idx, *pos), formula.clone(), refs));
                }
            }
        }
        if formulas.is_empty() {
            return report;
        }

        let graph = DependencyGraph::build(&formulas);
        let stale = graph.stale_nodes(&formulas, &edited);
        report.untouched = formulas.len() - stale.len();

        for node in graph.evaluation_order(&stale, &mut report) {
            let (key, formula, refs) = &formulas[graph.graph[node]];
            match evaluate(formula, refs, workbook) {
                Some(value) => {
                    if let Some(cell) = workbook
                        .sheet_by_index_mut(key.0)
                        .and_then(|sheet| sheet.get_mut(key.1))
                    {
                        cell.value = value;
                    }
                    report.evaluated += 1;
                }
                None => {
                    debug!(cell = %key.1, formula = %formula, "formula kept cached value");
                    report.kept_cached += 1;
                }
            }
        }

        report
    }
}

/// Formula cells as graph nodes, edge dependency → dependent
struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl DependencyGraph {
    fn build(formulas: &[(CellKey, String, Vec<Reference>)]) -> Self {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..formulas.len()).map(|i| graph.add_node(i)).collect();

        let mut node_of: HashMap<CellKey, NodeIndex> = HashMap::with_capacity(formulas.len());
        let mut by_sheet: HashMap<usize, Vec<(CellRef, NodeIndex)>> = HashMap::new();
        for (i, (key, _, _)) in formulas.iter().enumerate() {
            node_of.insert(*key, nodes[i]);
            by_sheet.entry(key.0).or_default().push((key.1, nodes[i]));
        }

        for (i, (_, _, refs)) in formulas.iter().enumerate() {
            for reference in refs.iter().filter(|r| r.resolvable()) {
                let Some(sheet_idx) = reference.sheet else {
                    continue;
                };
                let Some(sheet_formulas) = by_sheet.get(&sheet_idx) else {
                    continue;
                };
                // Walk whichever side is smaller: the range or the sheet's formula cells
                if reference.cell_count() <= sheet_formulas.len() {
                    for pos in reference.positions() {
                        if let Some(dep) = node_of.get(&(sheet_idx, pos)) {
                            graph.add_edge(*dep, nodes[i], ());
                        }
                    }
                } else {
                    for (pos, dep) in sheet_formulas {
                        if reference.contains(*pos) {
                            graph.add_edge(*dep, nodes[i], ());
                        }
                    }
                }
            }
        }

        Self { graph, nodes }
    }

    /// Formulas that are edited themselves, read an edited cell, or depend on such a formula
    fn stale_nodes(
        &self,
        formulas: &[(CellKey, String, Vec<Reference>)],
        edited: &HashSet<CellKey>,
    ) -> HashSet<NodeIndex> {
        let mut edited_by_sheet: HashMap<usize, Vec<CellRef>> = HashMap::new();
        for (sheet, pos) in edited {
            edited_by_sheet.entry(*sheet).or_default().push(*pos);
        }

        let mut stale = HashSet::new();
        let mut dfs = Dfs::empty(&self.graph);
        for (i, (key, _, refs)) in formulas.iter().enumerate() {
            let reads_edited = refs.iter().any(|reference| {
                reference
                    .sheet
                    .and_then(|sheet| edited_by_sheet.get(&sheet))
                    .is_some_and(|cells| cells.iter().any(|pos| reference.contains(*pos)))
            });
            if !edited.contains(key) && !reads_edited {
                continue;
            }
            dfs.move_to(self.nodes[i]);
            while let Some(node) = dfs.next(&self.graph) {
                stale.insert(node);
            }
        }
        stale
    }

    /// Stale nodes in dependency order; nodes on a cycle are left out and counted
    fn evaluation_order(
        &self,
        stale: &HashSet<NodeIndex>,
        report: &mut RecalcReport,
    ) -> Vec<NodeIndex> {
        let order = match toposort(&self.graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                warn!(
                    node = cycle.node_id().index(),
                    "reference cycle in workbook formulas; cyclic cells keep cached values"
                );
                // SCCs come out in reverse topological order
                let mut order = Vec::new();
                for scc in tarjan_scc(&self.graph).into_iter().rev() {
                    let self_loop = scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]);
                    if scc.len() > 1 || self_loop {
                        report.cyclic += scc.iter().filter(|n| stale.contains(*n)).count();
                        continue;
                    }
                    order.push(scc[0]);
                }
                order
            }
        };
        order.into_iter().filter(|n| stale.contains(n)).collect()
    }
}

fn cell_to_value(value: CellValue) -> Value {
    match value {
        CellValue::Number(n) => Value::Number(n),
        CellValue::Text(s) if s.is_empty() => Value::Null,
        CellValue::Text(s) => Value::Text(s),
        CellValue::Bool(b) => Value::Boolean(b),
        CellValue::Empty => Value::Null,
    }
}

/// Evaluate one formula against the current workbook state
fn evaluate(formula: &str, refs: &[Reference], workbook: &Workbook) -> Option<CellValue> {
    let mut rewritten = String::with_capacity(formula.len());
    let mut ctx = EvalContext::new();
    let mut cursor = 0;

    for (n, reference) in refs.iter().enumerate() {
        if !reference.resolvable() {
            return None;
        }
        let sheet = workbook.sheet_by_index(reference.sheet?)?;

        let name = format!("xref{}", n);
        let value = if reference.cell_count() == 1 {
            cell_to_value(sheet.value_at(reference.start))
        } else {
            Value::Array(
                reference
                    .positions()
                    .map(|pos| cell_to_value(sheet.value_at(pos)))
                    .collect(),
            )
        };
        ctx.bind(name.clone(), value);

        rewritten.push_str(&formula[cursor..reference.span.0]);
        rewritten.push_str(&name);
        cursor = reference.span.1;
    }
    rewritten.push_str(&formula[cursor..]);

    match evaluate_formula(&rewritten, &ctx) {
        Ok(Value::Number(n)) if n.is_finite() => Some(CellValue::Number(n)),
        Ok(Value::Text(s)) => Some(CellValue::Text(s)),
        Ok(Value::Boolean(b)) => Some(CellValue::Bool(b)),
        Ok(Value::Null) => Some(CellValue::Number(0.0)),
        Ok(_) => None,
        Err(e) => {
            debug!(formula = %formula, error = %e, "formula not evaluated");
            None
        }
    }
}
