//! Semantic validation after aggregation extraction.
//!
//! Three rules: group-by keys must be aggregation free and must cover
//! every non-aggregated projection column; without group-by the
//! projection may not mix aggregated and non-aggregated expressions
//! (HAVING without GROUP BY aggregates over one implicit group); a
//! wildcard projection may not pair with an aggregating HAVING unless
//! the projection itself aggregates.

use std::collections::BTreeSet;

use crate::ast::{CanName, ColIdx, Expr, Select, SelectVar, SuffixKind, TableId};
use crate::error::Error;

use super::agg::expr_has_agg;
use super::Planner;

type ColSet = BTreeSet<(usize, ColIdx)>;

impl Planner {
    pub(crate) fn sema_check(&self, s: &Select) -> Result<(), Error> {
        self.check_group_by(s)?;
        self.check_wildcard_having(s)
    }

    /// Concrete `(table, column)` pairs an expression reads, looking
    /// through alias references.
    fn collect_cols(&self, e: &Expr, s: &Select, out: &mut ColSet) {
        match e {
            Expr::Const(_) => {}
            Expr::Ref(r) => self.collect_can_name(&r.can_name, s, out),
            Expr::Primary(p) => {
                if p.can_name.is_settled() {
                    self.collect_can_name(&p.can_name, s, out);
                } else {
                    self.collect_cols(&p.leading, s, out);
                    for sfx in &p.suffix {
                        match &sfx.kind {
                            SuffixKind::Call(c) => {
                                for a in &c.args {
                                    self.collect_cols(a, s, out);
                                }
                            }
                            SuffixKind::Index(i) => self.collect_cols(i, s, out),
                            SuffixKind::Dot { .. } => {}
                        }
                    }
                }
            }
            Expr::Unary(u) => self.collect_cols(&u.operand, s, out),
            Expr::Binary(b) => {
                self.collect_cols(&b.lhs, s, out);
                self.collect_cols(&b.rhs, s, out);
            }
            Expr::Ternary(t) => {
                self.collect_cols(&t.cond, s, out);
                self.collect_cols(&t.then, s, out);
                self.collect_cols(&t.alt, s, out);
            }
        }
    }

    fn collect_can_name(&self, cn: &CanName, s: &Select, out: &mut ColSet) {
        match cn {
            CanName::TableColumn {
                table: TableId::Scan(t),
                column,
            } => {
                out.insert((*t, *column));
            }
            CanName::Expr { proj, .. } => {
                if let Some(SelectVar::Col(c)) = s.projection.vars.get(*proj) {
                    self.collect_cols(&c.value, s, out);
                }
            }
            _ => {}
        }
    }

    fn check_group_by(&self, s: &Select) -> Result<(), Error> {
        match &s.group_by {
            Some(group_by) => {
                let mut group_info = ColSet::new();
                for (idx, key) in group_by.keys.iter().enumerate() {
                    if expr_has_agg(key) {
                        return Err(self.err(
                            "sema",
                            format!("[group_by]: {}'th expression has aggregation", idx),
                        ));
                    }
                    self.collect_cols(key, s, &mut group_info);
                }

                // every un-aggregated projected column must be grouped on
                if !s.projection.has_star() {
                    let mut project_info = ColSet::new();
                    for v in &s.projection.vars {
                        if let SelectVar::Col(c) = v {
                            if !expr_has_agg(&c.value) {
                                self.collect_cols(&c.value, s, &mut project_info);
                            }
                        }
                    }
                    if !project_info.is_subset(&group_info) {
                        return Err(self.err(
                            "sema",
                            "[group_by]: projected variable that is not in aggregation \
                             must be in group by",
                        ));
                    }
                }
                Ok(())
            }
            None => {
                let mut has_agg = false;
                let mut has_none_agg = false;
                for v in &s.projection.vars {
                    if let SelectVar::Col(c) = v {
                        if expr_has_agg(&c.value) {
                            has_agg = true;
                        } else {
                            has_none_agg = true;
                        }
                    }
                }
                if has_agg && has_none_agg {
                    return Err(self.err(
                        "sema",
                        "[group_by]: group by is not specified, so all the projection \
                         must be in aggregation",
                    ));
                }
                Ok(())
            }
        }
    }

    fn check_wildcard_having(&self, s: &Select) -> Result<(), Error> {
        let having = match &s.having {
            Some(h) => h,
            None => return Ok(()),
        };
        if !s.projection.has_star() {
            return Ok(());
        }

        let projection_has_agg = s.projection.vars.iter().any(|v| match v {
            SelectVar::Col(c) => expr_has_agg(&c.value),
            SelectVar::Star(_) => false,
        });

        if expr_has_agg(&having.cond) && !projection_has_agg {
            return Err(self.err(
                "sema",
                "[having]: wildcard projection cannot pair with an aggregating having",
            ));
        }
        Ok(())
    }
}
