//! Aggregation extraction.
//!
//! Every aggregation call found in the projection, having, or order-by
//! trees is appended to the plan's aggregation list and the originating
//! node is re-pointed at the virtual aggregation table, so parental
//! expressions (`min(x)+1`) transparently read the aggregated result.

use crate::ast::{ColIdx, Expr, Primary, Select, SelectVar, SuffixKind, TableId};
use crate::error::Error;
use crate::visit::{walk_pre_order, ExprVisitor};

use super::{AggKind, AggVar, Planner};

impl Planner {
    /// Check whether a primary matches the aggregation shape. A matching
    /// name with the wrong suffix shape is an error rather than a plain
    /// function call.
    pub(crate) fn is_agg_func(
        &self,
        p: &Primary,
    ) -> Result<Option<(AggKind, Vec<Expr>)>, Error> {
        let name = match p.leading.as_ref() {
            Expr::Ref(r) if r.can_name.is_free() => &r.name,
            _ => return Ok(None),
        };
        let kind = match AggKind::from_name(name) {
            Some(k) => k,
            None => return Ok(None),
        };

        if p.suffix.len() != 1 {
            return Err(self.err("agg", "invalid arity for aggregation function"));
        }
        let call = match &p.suffix[0].kind {
            SuffixKind::Call(c) => c,
            _ => return Err(self.err("agg", "aggregation must be a function call")),
        };
        if call.args.is_empty() {
            return Err(self.err(
                "agg",
                "aggregation function must have at least one parameter",
            ));
        }

        // only count() can take the * placeholder
        if kind != AggKind::Count {
            if let Expr::Ref(r) = &call.args[0] {
                if r.name == "*" {
                    return Err(self.err(
                        "agg",
                        format!("{} cannot aggregate over the * wildcard", kind.name()),
                    ));
                }
            }
        }

        self.validate_agg_params(kind, call.args.len())?;
        Ok(Some((kind, call.args.clone())))
    }

    fn validate_agg_params(&self, kind: AggKind, arity: usize) -> Result<(), Error> {
        let ok = match kind {
            AggKind::Percentile => arity == 2,
            AggKind::Histogram => arity == 4,
            _ => arity == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(self.err(
                "agg",
                format!("invalid arity for aggregation function {}", kind.name()),
            ))
        }
    }

    pub(crate) fn ana_agg(&mut self, s: &mut Select) -> Result<(), Error> {
        let mut roots: Vec<&mut Expr> = Vec::new();
        for v in &mut s.projection.vars {
            if let SelectVar::Col(c) = v {
                roots.push(&mut c.value);
            }
        }
        if let Some(h) = &mut s.having {
            roots.push(&mut h.cond);
        }
        if let Some(o) = &mut s.order_by {
            for k in &mut o.keys {
                roots.push(k);
            }
        }

        struct TransAgg<'a> {
            p: &'a mut Planner,
        }
        impl ExprVisitor for TransAgg<'_> {
            fn accept_primary(&mut self, primary: &mut Primary) -> Result<bool, Error> {
                match self.p.is_agg_func(primary)? {
                    None => Ok(true),
                    Some((kind, args)) => {
                        let idx = self.p.agg_vars.len();
                        self.p.agg_vars.push(AggVar { kind, args });
                        primary.can_name.set(TableId::Agg, ColIdx::Col(idx));
                        Ok(false)
                    }
                }
            }
        }

        let mut v = TransAgg { p: self };
        for e in roots {
            walk_pre_order(&mut v, e)?;
        }
        Ok(())
    }
}

/// Shape check only: does the expression contain an aggregation call (or
/// an already-extracted one)?
pub(crate) fn expr_has_agg(e: &Expr) -> bool {
    match e {
        Expr::Const(_) | Expr::Ref(_) => false,
        Expr::Primary(p) => {
            if matches!(
                p.can_name,
                crate::ast::CanName::TableColumn {
                    table: TableId::Agg,
                    ..
                }
            ) {
                return true;
            }
            if let Expr::Ref(r) = p.leading.as_ref() {
                if AggKind::from_name(&r.name).is_some()
                    && matches!(p.suffix.first().map(|s| &s.kind), Some(SuffixKind::Call(_)))
                {
                    return true;
                }
            }
            expr_has_agg(&p.leading)
                || p.suffix.iter().any(|s| match &s.kind {
                    SuffixKind::Call(c) => c.args.iter().any(expr_has_agg),
                    SuffixKind::Index(i) => expr_has_agg(i),
                    SuffixKind::Dot { .. } => false,
                })
        }
        Expr::Unary(u) => expr_has_agg(&u.operand),
        Expr::Binary(b) => expr_has_agg(&b.lhs) || expr_has_agg(&b.rhs),
        Expr::Ternary(t) => {
            expr_has_agg(&t.cond) || expr_has_agg(&t.then) || expr_has_agg(&t.alt)
        }
    }
}
