//! Early-filter pushdown.
//!
//! For each table the WHERE condition is split into a predicate that can
//! run inside that table's scan loop and a residual evaluated at join
//! time. A node is classified relative to the target table as *static*
//! (no table access at all), *known* (only the target table) or *unknown*
//! (anything else); AND chains are descended so partially pushable
//! conditions still contribute their pushable halves.

use crate::ast::{Binary, BinOp, CanName, Expr, NodeId, Select, SuffixKind};

use super::expr_info::{proj_access_sets, ExprTableAccessInfo, TableAccessSet};
use super::table::field_syntax;
use super::{Join, Planner, TableScan};

/// NodeId for synthesized AND nodes; never collides with anything the
/// prune set tracks since the parser counts up from zero.
const SYNTH_ID: NodeId = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Static,
    Known,
    Unknown,
}

struct EarlyFilterAnalyzer<'a> {
    tidx: usize,
    info: &'a ExprTableAccessInfo,
    /// Extracted subtrees: printed form (for deterministic ordering),
    /// node identity, and a clone to be stitched into the scan filter.
    output: Vec<(String, NodeId, Expr)>,
}

impl<'a> EarlyFilterAnalyzer<'a> {
    fn status(&self, e: &Expr) -> Status {
        match self.info.set_of(e) {
            None => Status::Static,
            Some(set) => {
                if set.is_static() {
                    Status::Static
                } else if set.single() && set.has(self.tidx) {
                    Status::Known
                } else {
                    Status::Unknown
                }
            }
        }
    }

    fn ana_expr(&mut self, e: &Expr) {
        match self.status(e) {
            Status::Known | Status::Static => {
                self.output
                    .push((crate::ast::print_expr(e), e.node_id(), e.clone()));
            }
            Status::Unknown => {
                // only an AND chain can be partially pushed
                if let Expr::Binary(b) = e {
                    if b.op == BinOp::And {
                        self.ana_expr(&b.lhs);
                        self.ana_expr(&b.rhs);
                    }
                }
            }
        }
    }
}

pub(crate) fn and_join(parts: Vec<Expr>) -> Option<Expr> {
    let mut out: Option<Expr> = None;
    for p in parts {
        out = Some(match out {
            None => p,
            Some(prev) => Expr::Binary(Binary {
                op: BinOp::And,
                lhs: Box::new(prev),
                rhs: Box::new(p),
                id: SYNTH_ID,
                span: Default::default(),
            }),
        });
    }
    out
}

impl Planner {
    /// Extract the pushable predicate of `input` for table `tidx`, or
    /// `None` when nothing can be pushed. Extracted subtrees land in the
    /// shared prune set consumed by the residual-filter builder.
    pub(crate) fn ana_early_filter(
        &mut self,
        tidx: usize,
        info: &ExprTableAccessInfo,
        input: &Expr,
        proj_values: &[Option<Expr>],
    ) -> Option<Expr> {
        let mut a = EarlyFilterAnalyzer {
            tidx,
            info,
            output: Vec::new(),
        };
        a.ana_expr(input);

        if a.output.is_empty() {
            return None;
        }

        // deterministic ordering of the extracted conjuncts
        a.output.sort_by(|x, y| x.0.cmp(&y.0));

        let mut parts = Vec::new();
        for (_, id, expr) in a.output {
            self.prune.insert(id);
            parts.push(expr);
        }

        let joined = and_join(parts)?;
        Some(rewrite_for_scan(joined, proj_values))
    }

    /// The residual filter: the WHERE condition with every pruned subtree
    /// dropped from its top-level AND chain.
    fn unknown_filter(&self, e: &Expr) -> Vec<Expr> {
        if self.prune.contains(&e.node_id()) {
            return Vec::new();
        }
        if let Expr::Binary(b) = e {
            if b.op == BinOp::And {
                let mut out = self.unknown_filter(&b.lhs);
                out.extend(self.unknown_filter(&b.rhs));
                return out;
            }
        }
        vec![e.clone()]
    }

    fn plan_join_filter(&self, s: &Select) -> Option<Expr> {
        let w = s.where_.as_ref()?;
        if self.prune.is_empty() {
            return Some(w.cond.clone());
        }
        and_join(self.unknown_filter(&w.cond))
    }

    pub(crate) fn plan_join(&self, s: &Select) -> Join {
        Join::NestedLoop {
            filter: self.plan_join_filter(s),
        }
    }

    pub(crate) fn plan_table_scan(
        &mut self,
        s: &Select,
        proj_values: &[Option<Expr>],
    ) -> Vec<TableScan> {
        let proj_sets: Vec<TableAccessSet> = proj_access_sets(proj_values);
        let info = s
            .where_
            .as_ref()
            .map(|w| ExprTableAccessInfo::new(&w.cond, &proj_sets));

        let tables = self.tables.clone();
        tables
            .into_iter()
            .map(|td| {
                let filter = match (&info, &s.where_) {
                    (Some(info), Some(w)) => {
                        let f = self.ana_early_filter(td.index, info, &w.cond, proj_values);
                        if let Some(f) = &f {
                            log::debug!(
                                "early filter for table {}: {}",
                                td.index,
                                crate::ast::print_expr(f)
                            );
                        }
                        f
                    }
                    _ => None,
                };
                TableScan { table: td, filter }
            })
            .collect()
    }
}

/// Rewrite a pushed predicate for emission inside the per-file scan
/// block: table columns become plain AWK field names, and alias
/// references are inlined (their expressions are re-rewritten in turn).
pub(crate) fn rewrite_for_scan(e: Expr, proj_values: &[Option<Expr>]) -> Expr {
    match e {
        Expr::Const(_) => e,
        Expr::Ref(mut r) => {
            match &r.can_name {
                CanName::TableColumn { column, .. } => {
                    r.name = field_syntax(*column);
                    r.can_name = CanName::Name(r.name.clone());
                    Expr::Ref(r)
                }
                CanName::Expr {
                    column: Some(c), ..
                } => {
                    r.name = field_syntax(*c);
                    r.can_name = CanName::Name(r.name.clone());
                    Expr::Ref(r)
                }
                CanName::Expr { proj, column: None, .. } => {
                    // static alias: inline the aliased expression
                    match proj_values.get(*proj) {
                        Some(Some(inner)) => rewrite_for_scan(inner.clone(), proj_values),
                        _ => Expr::Ref(r),
                    }
                }
                _ => Expr::Ref(r),
            }
        }
        Expr::Primary(mut p) => {
            match &p.can_name {
                CanName::TableColumn { column, .. } => {
                    p.can_name = CanName::Name(field_syntax(*column));
                    Expr::Primary(p)
                }
                _ => {
                    p.leading = Box::new(rewrite_for_scan(*p.leading, proj_values));
                    for s in &mut p.suffix {
                        match &mut s.kind {
                            SuffixKind::Call(call) => {
                                let args = std::mem::take(&mut call.args);
                                call.args = args
                                    .into_iter()
                                    .map(|a| rewrite_for_scan(a, proj_values))
                                    .collect();
                            }
                            SuffixKind::Index(i) => {
                                let inner = std::mem::replace(
                                    i.as_mut(),
                                    Expr::Const(crate::ast::Const {
                                        value: crate::ast::ConstVal::Null,
                                        id: SYNTH_ID,
                                        span: Default::default(),
                                    }),
                                );
                                **i = rewrite_for_scan(inner, proj_values);
                            }
                            SuffixKind::Dot { .. } => {}
                        }
                    }
                    Expr::Primary(p)
                }
            }
        }
        Expr::Unary(mut u) => {
            u.operand = Box::new(rewrite_for_scan(*u.operand, proj_values));
            Expr::Unary(u)
        }
        Expr::Binary(mut b) => {
            b.lhs = Box::new(rewrite_for_scan(*b.lhs, proj_values));
            b.rhs = Box::new(rewrite_for_scan(*b.rhs, proj_values));
            Expr::Binary(b)
        }
        Expr::Ternary(mut t) => {
            t.cond = Box::new(rewrite_for_scan(*t.cond, proj_values));
            t.then = Box::new(rewrite_for_scan(*t.then, proj_values));
            t.alt = Box::new(rewrite_for_scan(*t.alt, proj_values));
            Expr::Ternary(t)
        }
    }
}
