use std::fmt::Write as _;

/// Half-open character-offset range of a node in the query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

/// Stable identity of an expression node, assigned by the parser. Used by
/// the early-filter analysis to track extracted subtrees without relying
/// on addresses.
pub type NodeId = u32;

/// Which table a resolved column lives in. The aggregation results are
/// addressed through a virtual table so the expression emitter can treat
/// `min(x)+1` exactly like a raw column read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TableId {
    Agg,
    Scan(usize),
}

/// Column addressing inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColIdx {
    /// All columns (`t.*`).
    Wildcard,
    /// The per-row field count.
    Nf,
    /// The per-row ordinal.
    RowNum,
    /// A concrete 0-based column; 0 is the whole input line.
    Col(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Rows,
    Columns,
}

/// The resolved meaning of a name occurrence. Attached to `Ref` and
/// `Primary` nodes and settled during symbol resolution; the only later
/// transition is the early-filter rewrite of `TableColumn` into `Name`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CanName {
    #[default]
    Free,
    /// A runtime/user variable, emitted verbatim.
    Global,
    /// Column `column` of table `table`.
    TableColumn { table: TableId, column: ColIdx },
    /// Alias of the `proj`-th projection column. `table`/`column` record
    /// the terminus of the alias chain when it ends in a table column.
    Expr {
        proj: usize,
        table: Option<TableId>,
        column: Option<ColIdx>,
    },
    /// A plain emission target, e.g. AWK field syntax inside a scan block.
    Name(String),
    /// A `.ROWS(re)` / `.COLUMNS(re)` pattern; `table` of `None` applies
    /// to every table.
    Matcher {
        table: Option<usize>,
        kind: MatchKind,
        pattern: String,
    },
}

impl CanName {
    pub fn is_free(&self) -> bool {
        matches!(self, CanName::Free)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_free()
    }

    pub fn is_table_column(&self) -> bool {
        matches!(self, CanName::TableColumn { .. })
    }

    /// Settle to a table column. A settled CanName never re-settles.
    pub fn set(&mut self, table: TableId, column: ColIdx) {
        assert!(self.is_free(), "this CanName has been settled");
        *self = CanName::TableColumn { table, column };
    }

    pub fn set_expr(&mut self, proj: usize, table: Option<TableId>, column: Option<ColIdx>) {
        assert!(self.is_free(), "this CanName has been settled");
        *self = CanName::Expr {
            proj,
            table,
            column,
        };
    }

    pub fn set_global(&mut self) {
        *self = CanName::Global;
    }

    /// Rewrite into a plain name. Used by the early-filter pushdown, which
    /// is the one sanctioned transition out of `TableColumn`.
    pub fn set_name(&mut self, name: impl Into<String>) {
        *self = CanName::Name(name.into());
    }

    pub fn table_column(&self) -> Option<(TableId, ColIdx)> {
        match self {
            CanName::TableColumn { table, column } => Some((*table, *column)),
            _ => None,
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConstVal {
    Bool(bool),
    Str(String),
    Int(i64),
    Real(f64),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub value: ConstVal,
    pub id: NodeId,
    pub span: Span,
}

/// Projection-level marker a bare name can carry (`COLUMNS(..)`, `ROWS(..)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Symbol {
    #[default]
    None,
    Star,
    Columns,
    Rows,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub name: String,
    pub symbol: Symbol,
    pub can_name: CanName,
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuffixKind {
    Call(Call),
    Dot { name: String, symbol: Symbol },
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suffix {
    pub kind: SuffixKind,
    pub span: Span,
}

impl Suffix {
    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            SuffixKind::Call(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primary {
    pub leading: Box<Expr>,
    pub suffix: Vec<Suffix>,
    pub can_name: CanName,
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub ops: Vec<UnaryOp>,
    pub operand: Box<Expr>,
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    /// Regex match; only produced by desugaring `LIKE` with a literal RHS.
    Match,
    NotMatch,
    /// `LIKE` with a non-literal RHS, lowered through the runtime helper.
    Like,
    NotLike,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ternary {
    pub cond: Box<Expr>,
    pub then: Box<Expr>,
    pub alt: Box<Expr>,
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Const),
    Ref(Ref),
    Primary(Primary),
    Unary(Unary),
    Binary(Binary),
    Ternary(Ternary),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Const(x) => x.span,
            Expr::Ref(x) => x.span,
            Expr::Primary(x) => x.span,
            Expr::Unary(x) => x.span,
            Expr::Binary(x) => x.span,
            Expr::Ternary(x) => x.span,
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self {
            Expr::Const(x) => x.id,
            Expr::Ref(x) => x.id,
            Expr::Primary(x) => x.id,
            Expr::Unary(x) => x.id,
            Expr::Binary(x) => x.id,
            Expr::Ternary(x) => x.id,
        }
    }

    pub fn can_name(&self) -> Option<&CanName> {
        match self {
            Expr::Ref(x) => Some(&x.can_name),
            Expr::Primary(x) => Some(&x.can_name),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }
}

// ── Statements ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Col {
    /// Position within the projection, 0-based.
    pub index: usize,
    pub alias: Option<String>,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectVar {
    Col(Col),
    Star(Span),
}

impl SelectVar {
    pub fn alias(&self) -> Option<&str> {
        match self {
            SelectVar::Col(c) => c.alias.as_deref(),
            SelectVar::Star(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub vars: Vec<SelectVar>,
    pub span: Span,
}

impl Projection {
    pub fn has_star(&self) -> bool {
        self.vars.iter().any(|v| matches!(v, SelectVar::Star(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteSet {
    /// Raw column literal text (`$1`, `line`, ...), resolved by the planner.
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteAction {
    /// Drop the matching row.
    Next,
    Set(Vec<RewriteSet>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteClause {
    pub cond: Expr,
    pub action: RewriteAction,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub clauses: Vec<RewriteClause>,
    pub span: Span,
}

/// One `FROM` entry: `name(const, ...) [AS alias] [REWRITE ... END]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FromVar {
    pub name: String,
    pub args: Vec<Const>,
    pub alias: Option<String>,
    pub rewrite: Option<Rewrite>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct From {
    pub vars: Vec<FromVar>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    pub cond: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub keys: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub asc: bool,
    pub keys: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub count: i64,
    pub span: Span,
}

/// The raw `FORMAT` option list; interpreted by the planner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatOpts {
    pub title: Option<Const>,
    pub border: Option<Const>,
    pub base: Option<Const>,
    pub padding: Option<Const>,
    pub number: Option<Const>,
    pub string: Option<Const>,
    pub rest: Option<Const>,
    pub columns: Vec<(i64, Const)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub projection: Projection,
    pub from: From,
    pub where_: Option<Where>,
    pub group_by: Option<GroupBy>,
    pub having: Option<Where>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
    pub format: Option<FormatOpts>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub select: Select,
    pub span: Span,
}

// ── Printing ─────────────────────────────────────────────────────
//
// Renders an expression back to parseable text: binary nodes are fully
// parenthesized and dot components quoted, so the printed form doubles as
// a canonical key for deterministic ordering.

fn print_const(c: &Const, buf: &mut String) {
    match &c.value {
        ConstVal::Bool(b) => {
            let _ = write!(buf, "{}", b);
        }
        ConstVal::Str(s) => {
            let _ = write!(buf, "{:?}", s);
        }
        ConstVal::Int(i) => {
            let _ = write!(buf, "{}", i);
        }
        ConstVal::Real(r) => {
            let _ = write!(buf, "{:.6}", r);
        }
        ConstVal::Null => buf.push_str("null"),
    }
}

fn print_suffix(s: &Suffix, buf: &mut String) {
    match &s.kind {
        SuffixKind::Call(call) => {
            buf.push('(');
            for (idx, a) in call.args.iter().enumerate() {
                if idx > 0 {
                    buf.push(',');
                }
                print_expr_into(a, buf);
            }
            buf.push(')');
        }
        SuffixKind::Dot { name, symbol } => match symbol {
            Symbol::Star => buf.push_str(".*"),
            Symbol::Columns => buf.push_str(".columns"),
            Symbol::Rows => buf.push_str(".rows"),
            Symbol::None => {
                let _ = write!(buf, ".{:?}", name);
            }
        },
        SuffixKind::Index(e) => {
            buf.push('[');
            print_expr_into(e, buf);
            buf.push(']');
        }
    }
}

fn print_binop(op: BinOp, buf: &mut String) {
    buf.push_str(match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Match => "=~",
        BinOp::NotMatch => "!~",
        BinOp::Like => " like ",
        BinOp::NotLike => " not like ",
    });
}

fn print_expr_into(e: &Expr, buf: &mut String) {
    match e {
        Expr::Const(c) => print_const(c, buf),
        Expr::Ref(r) => match r.symbol {
            Symbol::None => buf.push_str(&r.name),
            Symbol::Star => buf.push('*'),
            Symbol::Columns => buf.push_str("columns"),
            Symbol::Rows => buf.push_str("rows"),
        },
        Expr::Primary(p) => {
            print_expr_into(&p.leading, buf);
            for s in &p.suffix {
                print_suffix(s, buf);
            }
        }
        Expr::Unary(u) => {
            for op in &u.ops {
                buf.push(match op {
                    UnaryOp::Plus => '+',
                    UnaryOp::Minus => '-',
                    UnaryOp::Not => '!',
                });
            }
            print_expr_into(&u.operand, buf);
        }
        Expr::Binary(b) => {
            buf.push('(');
            print_expr_into(&b.lhs, buf);
            print_binop(b.op, buf);
            print_expr_into(&b.rhs, buf);
            buf.push(')');
        }
        Expr::Ternary(t) => {
            print_expr_into(&t.cond, buf);
            buf.push_str(" ? ");
            print_expr_into(&t.then, buf);
            buf.push_str(" : ");
            print_expr_into(&t.alt, buf);
        }
    }
}

pub fn print_expr(e: &Expr) -> String {
    let mut buf = String::new();
    print_expr_into(e, &mut buf);
    buf
}

pub fn print_select(s: &Select) -> String {
    let mut buf = String::new();
    if s.distinct {
        buf.push_str("select distinct\n");
    } else {
        buf.push_str("select\n");
    }

    for (idx, v) in s.projection.vars.iter().enumerate() {
        if idx > 0 {
            buf.push_str(", ");
        }
        match v {
            SelectVar::Star(_) => buf.push('*'),
            SelectVar::Col(col) => {
                print_expr_into(&col.value, &mut buf);
                if let Some(a) = &col.alias {
                    let _ = write!(buf, " as {}", a);
                }
            }
        }
    }

    buf.push_str("\nfrom ");
    for (idx, fv) in s.from.vars.iter().enumerate() {
        if idx > 0 {
            buf.push_str(", ");
        }
        let _ = write!(buf, "{}(", fv.name);
        for (aidx, a) in fv.args.iter().enumerate() {
            if aidx > 0 {
                buf.push_str(", ");
            }
            print_const(a, &mut buf);
        }
        buf.push(')');
        if let Some(a) = &fv.alias {
            let _ = write!(buf, " as {}", a);
        }
    }

    if let Some(w) = &s.where_ {
        buf.push_str("\nwhere ");
        print_expr_into(&w.cond, &mut buf);
    }
    if let Some(g) = &s.group_by {
        buf.push_str("\ngroup by ");
        for (idx, k) in g.keys.iter().enumerate() {
            if idx > 0 {
                buf.push_str(", ");
            }
            print_expr_into(k, &mut buf);
        }
    }
    if let Some(h) = &s.having {
        buf.push_str("\nhaving ");
        print_expr_into(&h.cond, &mut buf);
    }
    if let Some(o) = &s.order_by {
        buf.push_str("\norder by ");
        for (idx, k) in o.keys.iter().enumerate() {
            if idx > 0 {
                buf.push_str(", ");
            }
            print_expr_into(k, &mut buf);
        }
        buf.push_str(if o.asc { " asc" } else { " desc" });
    }
    if let Some(l) = &s.limit {
        let _ = write!(buf, "\nlimit {}", l.count);
    }
    buf
}
