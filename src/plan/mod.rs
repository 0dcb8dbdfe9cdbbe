//! Query planning: table discovery, symbol resolution, aggregation
//! extraction, semantic validation, early-filter analysis, and the
//! read-only `Plan` the code emitter consumes.

mod agg;
mod early_filter;
mod expr_info;
mod format;
mod sema;
mod symbol;
mod table;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::{Code, ColIdx, Expr, MatchKind, NodeId, Select};
use crate::error::Error;

pub use format::{Color, FormatInstruction, FormatPlan};

pub const DEF_MAX_COLUMN_SIZE: usize = 600;
pub const DEF_MAX_TABLE_SIZE: usize = 100;

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_column_size: usize,
    pub max_table_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_column_size: DEF_MAX_COLUMN_SIZE,
            max_table_size: DEF_MAX_TABLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Min,
    Max,
    Avg,
    Sum,
    Count,
    Percentile,
    Histogram,
}

impl AggKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Avg => "avg",
            AggKind::Sum => "sum",
            AggKind::Count => "count",
            AggKind::Percentile => "percentile",
            AggKind::Histogram => "histogram",
        }
    }

    pub fn from_name(n: &str) -> Option<AggKind> {
        Some(match n {
            "min" => AggKind::Min,
            "max" => AggKind::Max,
            "avg" => AggKind::Avg,
            "sum" => AggKind::Sum,
            "count" => AggKind::Count,
            "percentile" => AggKind::Percentile,
            "histogram" => AggKind::Histogram,
            _ => return None,
        })
    }
}

/// Supported table loader types named in the FROM clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Whitespace-separated text, or an explicit separator parameter.
    Tab,
    /// Comma-separated text.
    Csv,
    /// Text split on a caller-provided separator.
    Xsv,
}

impl TableKind {
    pub fn from_name(n: &str) -> Option<TableKind> {
        Some(match n {
            "tab" | "tabular" => TableKind::Tab,
            "csv" => TableKind::Csv,
            "xsv" => TableKind::Xsv,
            _ => return None,
        })
    }
}

/// A `.ROWS(re)` / `.COLUMNS(re)` pattern bound to a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMatcher {
    pub kind: MatchKind,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteSetPlan {
    /// Target column; 0 addresses the whole line.
    pub column: usize,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteActionPlan {
    /// Drop the matching row during the scan.
    Next,
    Set(Vec<RewriteSetPlan>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteStmtPlan {
    pub cond: Expr,
    pub action: RewriteActionPlan,
}

/// Ordered field-mutation clauses applied while scanning a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRewrite {
    pub stmts: Vec<RewriteStmtPlan>,
}

/// One per FROM entry, mutated as column references are discovered.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub index: usize,
    pub path: String,
    pub kind: TableKind,
    pub alias: Option<String>,
    /// Constant parameters after the path (separator, start, end).
    pub params: Vec<crate::ast::ConstVal>,
    /// Symbol name used by code generation (`tbl_N`).
    pub symbol: String,
    /// Highest column index referenced; `None` while the table is dangling.
    pub max_column: Option<usize>,
    /// Concrete columns referenced.
    pub columns: BTreeSet<usize>,
    /// Whether the scanner must store every column.
    pub full_column: bool,
    pub rewrite: Option<TableRewrite>,
    pub row_matcher: Option<TableMatcher>,
    pub col_matcher: Option<TableMatcher>,
}

impl TableDescriptor {
    pub fn is_dangling(&self) -> bool {
        self.max_column.is_none()
    }

    pub fn update_column_index(&mut self, cidx: ColIdx) {
        if let ColIdx::Col(n) = cidx {
            self.columns.insert(n);
            if self.max_column.map_or(true, |m| m < n) {
                self.max_column = Some(n);
            }
        }
    }

    pub fn set_full_column(&mut self, max: usize) {
        self.max_column = Some(max);
        self.full_column = true;
    }

    /// Separator parameter: explicit for tab/xsv, fixed for csv.
    pub fn field_sep(&self) -> Option<String> {
        use crate::ast::ConstVal;
        match self.kind {
            TableKind::Csv => Some(",".to_string()),
            TableKind::Tab | TableKind::Xsv => match self.params.first() {
                Some(ConstVal::Str(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            },
        }
    }

    fn int_param(&self, idx: usize) -> Option<i64> {
        match self.params.get(idx) {
            Some(crate::ast::ConstVal::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Number of leading lines to skip.
    pub fn scan_start(&self) -> Option<i64> {
        let idx = match self.kind {
            TableKind::Csv => 0,
            TableKind::Tab | TableKind::Xsv => 1,
        };
        self.int_param(idx).filter(|v| *v > 0)
    }

    /// Last line (1-based) to read.
    pub fn scan_end(&self) -> Option<i64> {
        let idx = match self.kind {
            TableKind::Csv => 1,
            TableKind::Tab | TableKind::Xsv => 2,
        };
        self.int_param(idx).filter(|v| *v > 0)
    }
}

/// A table scan plus the predicate pushed down into it.
#[derive(Debug, Clone)]
pub struct TableScan {
    pub table: TableDescriptor,
    pub filter: Option<Expr>,
}

/// The join strategy; nested-loop is the only one for now.
#[derive(Debug, Clone)]
pub enum Join {
    NestedLoop { filter: Option<Expr> },
}

impl Join {
    pub fn name(&self) -> &'static str {
        match self {
            Join::NestedLoop { .. } => "nested-loop",
        }
    }

    pub fn filter(&self) -> Option<&Expr> {
        match self {
            Join::NestedLoop { filter } => filter.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupByPlan {
    pub keys: Vec<Expr>,
}

/// One extracted aggregation call.
#[derive(Debug, Clone)]
pub struct AggVar {
    pub kind: AggKind,
    /// The call arguments; `args[0]` is the aggregation target.
    pub args: Vec<Expr>,
}

impl AggVar {
    pub fn target(&self) -> &Expr {
        &self.args[0]
    }

    pub fn param_int(&self, idx: usize) -> Option<i64> {
        match self.args.get(idx)?.as_const()?.value {
            crate::ast::ConstVal::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric parameter rendered as AWK literal text.
    pub fn param_num(&self, idx: usize) -> Option<String> {
        match &self.args.get(idx)?.as_const()?.value {
            crate::ast::ConstVal::Int(v) => Some(format!("{}", v)),
            crate::ast::ConstVal::Real(v) => Some(format!("{:.6}", v)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggPlan {
    pub vars: Vec<AggVar>,
}

#[derive(Debug, Clone)]
pub struct HavingPlan {
    pub filter: Expr,
}

/// Ordering keys; the emitted code sorts via the runtime's `asorti`.
#[derive(Debug, Clone)]
pub struct SortPlan {
    pub asc: bool,
    pub keys: Vec<Expr>,
}

/// One projected output column.
#[derive(Debug, Clone)]
pub enum OutputVar {
    Value {
        value: Expr,
        alias: Option<String>,
    },
    /// `t.*` or the expansion of a bare `*`.
    TableWildcard {
        table: usize,
        alias: Option<String>,
    },
    /// `t.ROWS(re)`: rows already filtered at scan time, printed whole.
    RowMatch {
        table: usize,
        pattern: String,
        alias: Option<String>,
    },
    /// `t.COLUMNS(re)`: only matching column values are printed.
    ColMatch {
        table: usize,
        pattern: String,
        alias: Option<String>,
    },
}

impl OutputVar {
    pub fn is_value(&self) -> bool {
        matches!(self, OutputVar::Value { .. })
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            OutputVar::Value { alias, .. }
            | OutputVar::TableWildcard { alias, .. }
            | OutputVar::RowMatch { alias, .. }
            | OutputVar::ColMatch { alias, .. } => alias.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputPlan {
    pub vars: Vec<OutputVar>,
    /// Column count of the output, counting wildcards by table width.
    pub var_size: usize,
    /// Whether a bare `*` appeared in the projection.
    pub wildcard: bool,
    /// `None` means unlimited.
    pub limit: Option<i64>,
    pub distinct: bool,
}

impl OutputPlan {
    pub fn has_table_wildcard(&self) -> bool {
        self.vars.iter().any(|v| !v.is_value())
    }
}

/// The canonical intermediate form: read-only to the emitter.
#[derive(Debug, Clone)]
pub struct Plan {
    pub config: Config,
    pub table_scans: Vec<TableScan>,
    pub join: Join,
    pub group_by: Option<GroupByPlan>,
    pub agg: Option<AggPlan>,
    pub having: Option<HavingPlan>,
    pub sort: Option<SortPlan>,
    pub output: OutputPlan,
    pub format: FormatPlan,
    /// Post-resolution projection expressions, indexed by projection
    /// position; alias CanNames point into this list.
    pub proj_values: Vec<Option<Expr>>,
}

impl Plan {
    pub fn has_group_by(&self) -> bool {
        self.group_by.is_some()
    }

    pub fn has_agg(&self) -> bool {
        self.agg.is_some()
    }

    pub fn has_having(&self) -> bool {
        self.having.is_some()
    }

    pub fn has_sort(&self) -> bool {
        self.sort.is_some()
    }

    pub fn ts_size(&self) -> usize {
        self.table_scans.len()
    }

    pub fn total_table_column_size(&self) -> usize {
        self.table_scans
            .iter()
            .map(|t| t.table.max_column.unwrap_or(0))
            .sum()
    }
}

/// Internal working state threaded through the planning passes.
pub(crate) struct Planner {
    pub(crate) config: Config,
    pub(crate) tables: Vec<TableDescriptor>,
    /// Projection alias -> projection index.
    pub(crate) alias: HashMap<String, usize>,
    /// Alias name -> collapsed chain terminus.
    pub(crate) alias_terminus:
        HashMap<String, (usize, Option<crate::ast::TableId>, Option<ColIdx>)>,
    /// Expression nodes already extracted as early filters.
    pub(crate) prune: HashSet<NodeId>,
    pub(crate) agg_vars: Vec<AggVar>,
}

impl Planner {
    fn new(config: Config) -> Self {
        Planner {
            config,
            tables: Vec::new(),
            alias: HashMap::new(),
            alias_terminus: HashMap::new(),
            prune: HashSet::new(),
            agg_vars: Vec::new(),
        }
    }

    pub(crate) fn err(&self, stage: &'static str, msg: impl Into<String>) -> Error {
        Error::plan(stage, msg)
    }

    pub(crate) fn is_global_variable(&self, _name: &str) -> bool {
        false
    }

    fn plan(mut self, mut select: Select) -> Result<Plan, Error> {
        // analysis over the mutable AST
        self.scan_table(&mut select)?;
        self.canonicalize(&mut select)?;
        self.resolve_alias(&mut select)?;
        self.ana_agg(&mut select)?;
        self.sema_check(&select)?;

        // snapshot of the (now fully resolved) projection expressions
        let proj_values: Vec<Option<Expr>> = select
            .projection
            .vars
            .iter()
            .map(|v| match v {
                crate::ast::SelectVar::Col(c) => Some(c.value.clone()),
                crate::ast::SelectVar::Star(_) => None,
            })
            .collect();

        let table_scans = self.plan_table_scan(&select, &proj_values);
        let join = self.plan_join(&select);

        let group_by = select.group_by.as_ref().map(|g| GroupByPlan {
            keys: g.keys.clone(),
        });

        let agg = if self.agg_vars.is_empty() {
            None
        } else {
            Some(AggPlan {
                vars: std::mem::take(&mut self.agg_vars),
            })
        };

        let having = select.having.as_ref().map(|h| HavingPlan {
            filter: h.cond.clone(),
        });

        let sort = select.order_by.as_ref().map(|o| SortPlan {
            asc: o.asc,
            keys: o.keys.clone(),
        });

        let output = self.plan_output(&select, &table_scans);
        let format = self.plan_format(&select)?;

        log::debug!(
            "planned query: {} scans, group_by={}, agg={}, having={}, sort={}",
            table_scans.len(),
            group_by.is_some(),
            agg.is_some(),
            having.is_some(),
            sort.is_some(),
        );

        Ok(Plan {
            config: self.config,
            table_scans,
            join,
            group_by,
            agg,
            having,
            sort,
            output,
            format,
            proj_values,
        })
    }

    fn plan_output(&self, select: &Select, scans: &[TableScan]) -> OutputPlan {
        use crate::ast::{SelectVar, TableId};

        let mut vars = Vec::new();
        let mut wildcard = false;

        for v in &select.projection.vars {
            match v {
                SelectVar::Star(_) => {
                    wildcard = true;
                    for t in &self.tables {
                        vars.push(OutputVar::TableWildcard {
                            table: t.index,
                            alias: None,
                        });
                    }
                }
                SelectVar::Col(col) => {
                    let alias = col.alias.clone();
                    match col.value.can_name() {
                        Some(crate::ast::CanName::TableColumn {
                            table: TableId::Scan(t),
                            column: ColIdx::Wildcard,
                        }) => {
                            vars.push(OutputVar::TableWildcard { table: *t, alias });
                        }
                        Some(crate::ast::CanName::Matcher {
                            table,
                            kind,
                            pattern,
                        }) => {
                            let targets: Vec<usize> = match table {
                                Some(t) => vec![*t],
                                None => self.tables.iter().map(|t| t.index).collect(),
                            };
                            for t in targets {
                                match kind {
                                    MatchKind::Rows => vars.push(OutputVar::RowMatch {
                                        table: t,
                                        pattern: pattern.clone(),
                                        alias: alias.clone(),
                                    }),
                                    MatchKind::Columns => vars.push(OutputVar::ColMatch {
                                        table: t,
                                        pattern: pattern.clone(),
                                        alias: alias.clone(),
                                    }),
                                }
                            }
                        }
                        _ => vars.push(OutputVar::Value {
                            value: col.value.clone(),
                            alias,
                        }),
                    }
                }
            }
        }

        let var_size = if vars.iter().all(|v| v.is_value()) {
            vars.len()
        } else {
            scans
                .iter()
                .map(|t| t.table.max_column.unwrap_or(0))
                .sum::<usize>()
                .max(vars.len())
        };

        OutputPlan {
            vars,
            var_size,
            wildcard,
            limit: select.limit.as_ref().map(|l| l.count),
            distinct: select.distinct,
        }
    }
}

/// Plan a parsed statement with the default configuration.
pub fn plan_code(code: Code) -> Result<Plan, Error> {
    plan_code_with(code, Config::default())
}

pub fn plan_code_with(code: Code, config: Config) -> Result<Plan, Error> {
    Planner::new(config).plan(code.select)
}
