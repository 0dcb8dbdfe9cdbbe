//! Symbol resolution over the clause expression trees.
//!
//! Two passes after table discovery: canonicalization settles every
//! qualified or bare column reference into a `TableColumn` CanName, then
//! alias binding resolves the remaining free names against projection
//! aliases (collapsing alias chains eagerly so the terminal table/column
//! is known without chasing at emission time).

use std::collections::HashSet;

use crate::ast::{
    CanName, ColIdx, Expr, MatchKind, Primary, Ref, Select, SelectVar, Suffix, SuffixKind,
    Symbol, TableId,
};
use crate::error::Error;

use super::{Planner, TableMatcher};

impl Planner {
    // ── Pass 2: canonicalization ─────────────────────────────────

    pub(crate) fn canonicalize(&mut self, s: &mut Select) -> Result<(), Error> {
        // a bare `select *` marks every table full-column
        let max = self.config.max_column_size;
        if s.projection.has_star() {
            for t in &mut self.tables {
                t.set_full_column(max);
            }
        }

        let mut cols: Vec<&mut Expr> = Vec::new();
        for v in &mut s.projection.vars {
            if let SelectVar::Col(c) = v {
                cols.push(&mut c.value);
            }
        }
        for e in cols {
            self.resolve_symbol_expr(e)?;
        }

        if let Some(w) = &mut s.where_ {
            self.resolve_symbol_expr(&mut w.cond)?;
        }
        if let Some(g) = &mut s.group_by {
            for k in &mut g.keys {
                self.resolve_symbol_expr(k)?;
            }
        }
        if let Some(h) = &mut s.having {
            self.resolve_symbol_expr(&mut h.cond)?;
        }
        if let Some(o) = &mut s.order_by {
            for k in &mut o.keys {
                self.resolve_symbol_expr(k)?;
            }
        }
        Ok(())
    }

    fn resolve_symbol_expr(&mut self, expr: &mut Expr) -> Result<(), Error> {
        match expr {
            Expr::Const(_) => Ok(()),
            Expr::Ref(r) => self.resolve_symbol_ref(r),
            Expr::Primary(p) => self.resolve_symbol_primary(p),
            Expr::Unary(u) => self.resolve_symbol_expr(&mut u.operand),
            Expr::Binary(b) => {
                self.resolve_symbol_expr(&mut b.lhs)?;
                self.resolve_symbol_expr(&mut b.rhs)
            }
            Expr::Ternary(t) => {
                self.resolve_symbol_expr(&mut t.cond)?;
                self.resolve_symbol_expr(&mut t.then)?;
                self.resolve_symbol_expr(&mut t.alt)
            }
        }
    }

    /// A bare `$N` resolves against the first table.
    fn resolve_symbol_ref(&mut self, r: &mut Ref) -> Result<(), Error> {
        if r.can_name.is_settled() || r.symbol != Symbol::None {
            return Ok(());
        }
        if let Some(cidx) = self.codx(&r.name) {
            self.tables[0].update_column_index(cidx);
            r.can_name.set(TableId::Scan(0), cidx);
        }
        // otherwise leave it free: alias binding still has to run
        Ok(())
    }

    fn resolve_symbol_primary(&mut self, p: &mut Primary) -> Result<(), Error> {
        if p.can_name.is_settled() {
            return Ok(());
        }

        enum First {
            DotPlain(String),
            DotStar,
            DotMatch(MatchKind),
            Index,
            Call,
            Nothing,
        }
        let first = match p.suffix.first().map(|s| &s.kind) {
            Some(SuffixKind::Dot { name, symbol }) => match symbol {
                Symbol::None => First::DotPlain(name.clone()),
                Symbol::Star => First::DotStar,
                Symbol::Columns => First::DotMatch(MatchKind::Columns),
                Symbol::Rows => First::DotMatch(MatchKind::Rows),
            },
            Some(SuffixKind::Index(_)) => First::Index,
            Some(SuffixKind::Call(_)) => First::Call,
            None => First::Nothing,
        };

        match first {
            First::DotPlain(name) => {
                if p.suffix.len() != 1 {
                    return Err(self.err("resolve-symbol", "invalid suffix expression nesting"));
                }
                self.resolve_qualified_column(p, &name)
            }
            First::DotStar => {
                if p.suffix.len() != 1 {
                    return Err(self.err("resolve-symbol", "invalid suffix expression nesting"));
                }
                let t = self.leading_table(p)?;
                let max = self.config.max_column_size;
                self.tables[t].set_full_column(max);
                p.can_name.set(TableId::Scan(t), ColIdx::Wildcard);
                Ok(())
            }
            First::DotMatch(kind) => {
                let pattern = self.matcher_pattern(&p.suffix)?;
                let t = self.leading_table(p)?;
                let max = self.config.max_column_size;
                self.tables[t].set_full_column(max);
                self.attach_matcher(t, kind, &pattern);
                p.can_name = CanName::Matcher {
                    table: Some(t),
                    kind,
                    pattern,
                };
                Ok(())
            }
            First::Index => {
                Err(self.err("resolve-symbol", "cannot use []/index operator here"))
            }
            First::Call => {
                // an unqualified COLUMNS(re)/ROWS(re) applies to every table
                let bare_matcher = match p.leading.as_ref() {
                    Expr::Ref(r) if r.symbol == Symbol::Columns => Some(MatchKind::Columns),
                    Expr::Ref(r) if r.symbol == Symbol::Rows => Some(MatchKind::Rows),
                    _ => None,
                };
                if let Some(kind) = bare_matcher {
                    let pattern = self.matcher_pattern_at(&p.suffix, 0)?;
                    let max = self.config.max_column_size;
                    for t in 0..self.tables.len() {
                        self.tables[t].set_full_column(max);
                        self.attach_matcher(t, kind, &pattern);
                    }
                    p.can_name = CanName::Matcher {
                        table: None,
                        kind,
                        pattern,
                    };
                    return Ok(());
                }
                // a plain call: only the arguments resolve, the leading
                // name stays free so the emitter can map it to a function
                for s in &mut p.suffix {
                    if let SuffixKind::Call(call) = &mut s.kind {
                        for a in &mut call.args {
                            self.resolve_symbol_expr(a)?;
                        }
                    }
                }
                Ok(())
            }
            First::Nothing => self.resolve_symbol_expr(&mut p.leading),
        }
    }

    fn leading_table(&self, p: &Primary) -> Result<usize, Error> {
        let name = match p.leading.as_ref() {
            Expr::Ref(r) => &r.name,
            _ => {
                return Err(self.err(
                    "resolve-symbol",
                    "unknown full table qualified column name",
                ))
            }
        };
        self.find_table_by_alias(name)
            .ok_or_else(|| self.err("resolve-symbol", format!("unknown table: {}", name)))
    }

    /// `tbl.field` with `field` resolved through the column literal parser.
    fn resolve_qualified_column(&mut self, p: &mut Primary, field: &str) -> Result<(), Error> {
        let t = self.leading_table(p)?;
        let cidx = match self.codx(field) {
            Some(c) => c,
            None => {
                return Err(self.err(
                    "resolve-symbol",
                    format!("invalid field name, must be $XX, got {}", field),
                ))
            }
        };
        self.tables[t].update_column_index(cidx);
        p.can_name.set(TableId::Scan(t), cidx);
        Ok(())
    }

    /// The matcher pattern is the single string argument of the call
    /// suffix that follows the `.COLUMNS`/`.ROWS` dot.
    fn matcher_pattern(&self, suffix: &[Suffix]) -> Result<String, Error> {
        if suffix.len() != 2 {
            return Err(self.err(
                "resolve-symbol",
                "ROWS/COLUMNS matcher requires a single pattern argument",
            ));
        }
        self.matcher_pattern_at(suffix, 1)
    }

    fn matcher_pattern_at(&self, suffix: &[Suffix], idx: usize) -> Result<String, Error> {
        let call = match suffix.get(idx).and_then(|s| s.as_call()) {
            Some(c) => c,
            None => {
                return Err(self.err(
                    "resolve-symbol",
                    "ROWS/COLUMNS matcher requires a pattern argument",
                ))
            }
        };
        if suffix.len() != idx + 1 {
            return Err(self.err("resolve-symbol", "invalid suffix expression nesting"));
        }
        let pattern = match call.args.first() {
            Some(Expr::Const(c)) => match &c.value {
                crate::ast::ConstVal::Str(s) if call.args.len() == 1 => s.clone(),
                _ => {
                    return Err(self.err(
                        "resolve-symbol",
                        "ROWS/COLUMNS matcher pattern must be a single string literal",
                    ))
                }
            },
            _ => {
                return Err(self.err(
                    "resolve-symbol",
                    "ROWS/COLUMNS matcher pattern must be a single string literal",
                ))
            }
        };

        if let Err(e) = regex::Regex::new(&pattern) {
            return Err(self.err(
                "resolve-symbol",
                format!("invalid matcher pattern /{}/: {}", pattern, e),
            ));
        }
        Ok(pattern)
    }

    fn attach_matcher(&mut self, t: usize, kind: MatchKind, pattern: &str) {
        let m = TableMatcher {
            kind,
            pattern: pattern.to_string(),
        };
        match kind {
            MatchKind::Rows => self.tables[t].row_matcher = Some(m),
            MatchKind::Columns => self.tables[t].col_matcher = Some(m),
        }
    }

    // ── Pass 3: alias binding ────────────────────────────────────

    pub(crate) fn resolve_alias(&mut self, s: &mut Select) -> Result<(), Error> {
        self.setup_alias(s)?;

        let mut cols: Vec<&mut Expr> = Vec::new();
        for v in &mut s.projection.vars {
            if let SelectVar::Col(c) = v {
                cols.push(&mut c.value);
            }
        }
        for e in cols {
            self.resolve_alias_expr(e)?;
        }

        if let Some(w) = &mut s.where_ {
            self.resolve_alias_expr(&mut w.cond)?;
        }
        if let Some(g) = &mut s.group_by {
            for k in &mut g.keys {
                self.resolve_alias_expr(k)?;
            }
        }
        if let Some(h) = &mut s.having {
            self.resolve_alias_expr(&mut h.cond)?;
        }
        if let Some(o) = &mut s.order_by {
            for k in &mut o.keys {
                self.resolve_alias_expr(k)?;
            }
        }

        self.check_alias_cycles(s)
    }

    /// Collect alias -> projection index and collapse each alias chain to
    /// its terminal table column up front.
    fn setup_alias(&mut self, s: &Select) -> Result<(), Error> {
        for (idx, v) in s.projection.vars.iter().enumerate() {
            if let Some(a) = v.alias() {
                match self.alias.get(a) {
                    Some(&prev) if prev != idx => {
                        return Err(self.err(
                            "resolve-symbol",
                            format!("alias: {} already existed", a),
                        ));
                    }
                    _ => {
                        self.alias.insert(a.to_string(), idx);
                    }
                }
            }
        }

        let names: Vec<String> = self.alias.keys().cloned().collect();
        for name in names {
            let (proj, terminus) = self.chase_alias(&name, s)?;
            self.alias_terminus.insert(
                name,
                (proj, terminus.map(|t| t.0), terminus.map(|t| t.1)),
            );
        }
        Ok(())
    }

    /// Follow an alias chain down to a table column, if it ends in one.
    fn chase_alias(
        &self,
        name: &str,
        s: &Select,
    ) -> Result<(usize, Option<(TableId, ColIdx)>), Error> {
        let first = self.alias[name];
        let mut visited: HashSet<usize> = HashSet::new();
        let mut cur = first;

        loop {
            if !visited.insert(cur) {
                return Err(self.err(
                    "resolve-symbol",
                    format!("alias: {} forms a reference cycle", name),
                ));
            }
            let value = match &s.projection.vars[cur] {
                SelectVar::Col(c) => &c.value,
                SelectVar::Star(_) => return Ok((first, None)),
            };
            match value {
                Expr::Ref(r) => match &r.can_name {
                    CanName::TableColumn { table, column } => {
                        return Ok((first, Some((*table, *column))))
                    }
                    CanName::Expr { table, column, .. } => {
                        return Ok((first, (*table).zip(*column)))
                    }
                    CanName::Free => match self.alias.get(&r.name) {
                        Some(&next) => cur = next,
                        None => return Ok((first, None)),
                    },
                    _ => return Ok((first, None)),
                },
                Expr::Primary(p) => match &p.can_name {
                    CanName::TableColumn { table, column } => {
                        return Ok((first, Some((*table, *column))))
                    }
                    _ => return Ok((first, None)),
                },
                _ => return Ok((first, None)),
            }
        }
    }

    fn resolve_alias_id(&self, name: &str, cn: &mut CanName) -> Result<(), Error> {
        if cn.is_settled() {
            return Ok(());
        }

        // the * placeholder only appears as an aggregation argument
        if name == "*" {
            cn.set_global();
            return Ok(());
        }

        if let Some((proj, table, column)) = self.alias_terminus.get(name) {
            cn.set_expr(*proj, *table, *column);
        } else if self.is_global_variable(name) {
            cn.set_global();
        } else {
            return Err(self.err("resolve-symbol", format!("id: {} is unknown", name)));
        }
        Ok(())
    }

    /// Only still-free refs and call arguments need visiting; the dot and
    /// index suffixes were settled during canonicalization.
    fn resolve_alias_expr(&self, expr: &mut Expr) -> Result<(), Error> {
        match expr {
            Expr::Const(_) => Ok(()),
            Expr::Ref(r) => {
                let name = r.name.clone();
                self.resolve_alias_id(&name, &mut r.can_name)
            }
            Expr::Primary(p) => {
                if p.can_name.is_settled() {
                    return Ok(());
                }
                for s in &mut p.suffix {
                    if let SuffixKind::Call(call) = &mut s.kind {
                        for a in &mut call.args {
                            self.resolve_alias_expr(a)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::Unary(u) => self.resolve_alias_expr(&mut u.operand),
            Expr::Binary(b) => {
                self.resolve_alias_expr(&mut b.lhs)?;
                self.resolve_alias_expr(&mut b.rhs)
            }
            Expr::Ternary(t) => {
                self.resolve_alias_expr(&mut t.cond)?;
                self.resolve_alias_expr(&mut t.then)?;
                self.resolve_alias_expr(&mut t.alt)
            }
        }
    }

    /// Reject projection graphs where an alias expression can reach its
    /// own projection slot (the emitter would recurse forever).
    fn check_alias_cycles(&self, s: &Select) -> Result<(), Error> {
        fn reach(e: &Expr, out: &mut HashSet<usize>) {
            match e {
                Expr::Const(_) => {}
                Expr::Ref(r) => {
                    if let CanName::Expr { proj, .. } = &r.can_name {
                        out.insert(*proj);
                    }
                }
                Expr::Primary(p) => {
                    reach(&p.leading, out);
                    for sfx in &p.suffix {
                        match &sfx.kind {
                            SuffixKind::Call(c) => {
                                for a in &c.args {
                                    reach(a, out);
                                }
                            }
                            SuffixKind::Index(i) => reach(i, out),
                            SuffixKind::Dot { .. } => {}
                        }
                    }
                }
                Expr::Unary(u) => reach(&u.operand, out),
                Expr::Binary(b) => {
                    reach(&b.lhs, out);
                    reach(&b.rhs, out);
                }
                Expr::Ternary(t) => {
                    reach(&t.cond, out);
                    reach(&t.then, out);
                    reach(&t.alt, out);
                }
            }
        }

        let direct: Vec<HashSet<usize>> = s
            .projection
            .vars
            .iter()
            .map(|v| {
                let mut set = HashSet::new();
                if let SelectVar::Col(c) = v {
                    reach(&c.value, &mut set);
                }
                set
            })
            .collect();

        for start in 0..direct.len() {
            let mut seen = HashSet::new();
            let mut stack: Vec<usize> = direct[start].iter().copied().collect();
            while let Some(p) = stack.pop() {
                if p == start {
                    return Err(self.err(
                        "resolve-symbol",
                        "projection alias forms a reference cycle",
                    ));
                }
                if seen.insert(p) {
                    if let Some(next) = direct.get(p) {
                        stack.extend(next.iter().copied());
                    }
                }
            }
        }
        Ok(())
    }
}
