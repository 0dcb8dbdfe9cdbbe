//! FROM-clause analysis: table descriptors, column-literal parsing, and
//! translation of REWRITE clauses into their plan form.

use std::collections::BTreeSet;

use crate::ast::{
    CanName, ColIdx, ConstVal, Expr, FromVar, Rewrite, RewriteAction, Select,
};
use crate::error::Error;
use crate::visit::{walk_pre_order, ExprVisitor};

use super::{
    Planner, RewriteActionPlan, RewriteSetPlan, RewriteStmtPlan, TableDescriptor, TableKind,
    TableRewrite,
};

/// AWK field syntax for a resolved column index, used for expressions that
/// are emitted inside the per-file scan block.
pub(crate) fn field_syntax(cidx: ColIdx) -> String {
    match cidx {
        ColIdx::Col(0) => "$0".to_string(),
        ColIdx::Col(n) => format!("${}", n),
        ColIdx::Nf => "NF".to_string(),
        ColIdx::RowNum => "FNR".to_string(),
        ColIdx::Wildcard => "$0".to_string(),
    }
}

impl Planner {
    fn wellknown_codx(name: &str) -> Option<ColIdx> {
        match name {
            "line" => Some(ColIdx::Col(0)),
            "nf" | "fn" => Some(ColIdx::Nf),
            "rownum" => Some(ColIdx::RowNum),
            _ => None,
        }
    }

    /// Parse a column literal into its column index: `$N`, or the
    /// well-known names `line`, `nf`/`fn`, `rownum` (with or without the
    /// `$` prefix). Returns `None` for anything else.
    pub(crate) fn codx(&self, c: &str) -> Option<ColIdx> {
        if c.is_empty() {
            return None;
        }
        if let Some(x) = Self::wellknown_codx(c) {
            return Some(x);
        }

        let rest = c.strip_prefix('$')?;
        if let Some(x) = Self::wellknown_codx(rest) {
            return Some(x);
        }
        match rest.parse::<usize>() {
            Ok(v) if v < self.config.max_column_size => Some(ColIdx::Col(v)),
            _ => None,
        }
    }

    fn gen_table_descriptor(
        &self,
        idx: usize,
        from_var: &FromVar,
    ) -> Result<TableDescriptor, Error> {
        let kind = match TableKind::from_name(&from_var.name) {
            Some(k) => k,
            None => {
                return Err(self.err(
                    "scan-table",
                    format!("unknown table type: {}", from_var.name),
                ))
            }
        };

        let path = match from_var.args.first().map(|c| &c.value) {
            Some(ConstVal::Str(p)) => p.clone(),
            _ => return Err(self.err("scan-table", "table path must be specified")),
        };

        let params: Vec<ConstVal> = from_var
            .args
            .iter()
            .skip(1)
            .map(|c| c.value.clone())
            .collect();

        if kind == TableKind::Xsv && !matches!(params.first(), Some(ConstVal::Str(s)) if !s.is_empty())
        {
            return Err(self.err("scan-table", "xsv table requires a separator parameter"));
        }

        let rewrite = match &from_var.rewrite {
            Some(r) => Some(self.translate_rewrite(r)?),
            None => None,
        };

        Ok(TableDescriptor {
            index: idx,
            path,
            kind,
            alias: from_var.alias.clone(),
            params,
            symbol: format!("tbl_{}", idx),
            max_column: None,
            columns: BTreeSet::new(),
            full_column: false,
            rewrite,
            row_matcher: None,
            col_matcher: None,
        })
    }

    pub(crate) fn find_table_by_alias(&self, alias: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|t| t.alias.as_deref() == Some(alias))
            .map(|t| t.index)
    }

    /// Pass 1: iterate FROM entries in order, assigning stable indices.
    pub(crate) fn scan_table(&mut self, s: &mut Select) -> Result<(), Error> {
        if s.from.vars.is_empty() {
            return Err(self.err("scan-table", "no table specified?"));
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, fv) in s.from.vars.iter().enumerate() {
            let td = self.gen_table_descriptor(idx, fv)?;
            if let Some(a) = &td.alias {
                if !seen.insert(a.clone()) {
                    return Err(self.err(
                        "scan-table",
                        format!("table alias: {} already existed", a),
                    ));
                }
            }
            self.tables.push(td);
        }

        if self.tables.len() > self.config.max_table_size {
            return Err(self.err("scan-table", "too many tables"));
        }
        Ok(())
    }

    fn translate_rewrite(&self, r: &Rewrite) -> Result<TableRewrite, Error> {
        let mut out = TableRewrite::default();

        for clause in &r.clauses {
            let mut cond = clause.cond.clone();
            self.resolve_rewrite_expr(&mut cond)?;

            let action = match &clause.action {
                RewriteAction::Next => RewriteActionPlan::Next,
                RewriteAction::Set(sets) => {
                    let mut plan_sets = Vec::new();
                    for set in sets {
                        let column = match self.codx(&set.column) {
                            Some(ColIdx::Col(n)) => n,
                            Some(_) => {
                                return Err(self.err(
                                    "scan-table",
                                    format!(
                                        "rewrite target {} is not an assignable column",
                                        set.column
                                    ),
                                ))
                            }
                            None => {
                                return Err(self.err(
                                    "scan-table",
                                    format!(
                                        "rewrite target must be a column index, got {}",
                                        set.column
                                    ),
                                ))
                            }
                        };
                        let mut value = set.value.clone();
                        self.resolve_rewrite_expr(&mut value)?;
                        plan_sets.push(RewriteSetPlan { column, value });
                    }
                    RewriteActionPlan::Set(plan_sets)
                }
            };

            out.stmts.push(RewriteStmtPlan { cond, action });
        }

        Ok(out)
    }

    /// Rewrite expressions run inside the scan block, so their column
    /// references settle straight to AWK field syntax.
    fn resolve_rewrite_expr(&self, e: &mut Expr) -> Result<(), Error> {
        struct V<'a> {
            p: &'a Planner,
        }
        impl ExprVisitor for V<'_> {
            fn accept_ref(&mut self, r: &mut crate::ast::Ref) -> Result<bool, Error> {
                if r.can_name.is_free() {
                    if let Some(cidx) = self.p.codx(&r.name) {
                        r.can_name = CanName::Name(field_syntax(cidx));
                    }
                }
                Ok(true)
            }
        }
        walk_pre_order(&mut V { p: self }, e)
    }
}
