//! Expression synthesis: post-order rendering of a resolved expression
//! tree into an AWK expression string.

use crate::ast::{
    BinOp, Binary, CanName, ColIdx, Const, ConstVal, Expr, Primary, Ref, Suffix, SuffixKind,
    TableId, Ternary, Unary, UnaryOp,
};
use crate::plan::Plan;

pub(crate) struct ExprCodeGen<'a> {
    plan: &'a Plan,
    out: String,
}

/// Quote a string for inclusion in AWK source.
pub(crate) fn awk_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(crate) fn gen_expr(plan: &Plan, e: &Expr) -> String {
    let mut g = ExprCodeGen {
        plan,
        out: String::new(),
    };
    g.expr(e);
    g.out
}

/// The expression coerced to a string (`((e)"")`), for hash keys.
pub(crate) fn gen_expr_as_str(plan: &Plan, e: &Expr) -> String {
    format!("(({})\"\")", gen_expr(plan, e))
}

impl<'a> ExprCodeGen<'a> {
    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn expr(&mut self, e: &Expr) {
        match e {
            Expr::Const(c) => self.constant(c),
            Expr::Ref(r) => self.reference(r),
            Expr::Primary(p) => self.primary(p),
            Expr::Unary(u) => self.unary(u),
            Expr::Binary(b) => self.binary(b),
            Expr::Ternary(t) => self.ternary(t),
        }
    }

    fn sub_expr(&mut self, e: &Expr) {
        self.push("(");
        self.expr(e);
        self.push(")");
    }

    fn constant(&mut self, c: &Const) {
        match &c.value {
            ConstVal::Int(v) => self.push(&v.to_string()),
            ConstVal::Real(v) => self.push(&format!("{:.6}", v)),
            ConstVal::Bool(b) => self.push(if *b { "1" } else { "0" }),
            ConstVal::Str(s) => self.push(&awk_quote(s)),
            ConstVal::Null => self.push("\"\""),
        }
    }

    fn can_name(&mut self, cn: &CanName) {
        match cn {
            CanName::Name(n) => self.push(n),
            CanName::TableColumn { table, column } => match table {
                TableId::Scan(t) => {
                    let cidx = match column {
                        ColIdx::Nf => "\"NF\"".to_string(),
                        ColIdx::RowNum => "\"rownum\"".to_string(),
                        ColIdx::Col(n) => n.to_string(),
                        ColIdx::Wildcard => {
                            unreachable!("wildcard columns are handled by the output stage")
                        }
                    };
                    self.push(&format!("tbl_{}[rid_{}, {}]", t, t, cidx));
                }
                TableId::Agg => {
                    let k = match column {
                        ColIdx::Col(n) => *n,
                        _ => unreachable!("aggregation results are indexed by position"),
                    };
                    self.push(&format!("agg[{}]", k));
                }
            },
            CanName::Expr { proj, .. } => {
                let inner = self
                    .plan
                    .proj_values
                    .get(*proj)
                    .and_then(|v| v.as_ref())
                    .expect("alias points at a projection value");
                self.sub_expr(inner);
            }
            CanName::Global | CanName::Free | CanName::Matcher { .. } => {
                unreachable!("not an emittable CanName")
            }
        }
    }

    fn reference(&mut self, r: &Ref) {
        match &r.can_name {
            // a free or global name is a runtime variable, emitted verbatim
            CanName::Free | CanName::Global => self.push(&r.name),
            cn => self.can_name(cn),
        }
    }

    /// Map SQL-level function names onto AWK builtins; everything else is
    /// assumed to be a user function with the `sql2awk_` prefix.
    fn function_name(p: &Primary) -> Option<String> {
        let r = match p.leading.as_ref() {
            Expr::Ref(r) => r,
            _ => return None,
        };
        if !matches!(r.can_name, CanName::Free | CanName::Name(_)) {
            return None;
        }
        if !matches!(p.suffix.first().map(|s| &s.kind), Some(SuffixKind::Call(_))) {
            return None;
        }
        Some(match r.name.as_str() {
            "string_format" => "sprintf".to_string(),
            "bit_and" => "and".to_string(),
            "bit_or" => "or".to_string(),
            "bit_xor" => "xor".to_string(),
            "bit_not" => "compl".to_string(),
            "bit_lshift" => "lshift".to_string(),
            "bit_rshift" => "rshift".to_string(),
            // provided by the embedded prelude
            "cast" | "is_number" | "is_string" | "is_integer" | "is_decimal" | "is_null" => {
                r.name.clone()
            }
            other => format!("sql2awk_{}", other),
        })
    }

    fn primary(&mut self, p: &Primary) {
        if p.can_name.is_settled() {
            self.can_name(&p.can_name);
            return;
        }

        if let Some(name) = Self::function_name(p) {
            self.push(&name);
        } else {
            self.expr(&p.leading);
        }
        for s in &p.suffix {
            self.suffix(s);
        }
    }

    fn suffix(&mut self, s: &Suffix) {
        match &s.kind {
            SuffixKind::Call(call) => {
                self.push("(");
                for (idx, a) in call.args.iter().enumerate() {
                    if idx > 0 {
                        self.push(", ");
                    }
                    self.expr(a);
                }
                self.push(")");
            }
            SuffixKind::Index(i) => {
                self.push("[");
                self.expr(i);
                self.push("]");
            }
            SuffixKind::Dot { name, .. } => {
                self.push(".");
                self.push(name);
            }
        }
    }

    fn unary(&mut self, u: &Unary) {
        for op in &u.ops {
            self.push(match op {
                UnaryOp::Plus => "+",
                UnaryOp::Minus => "-",
                UnaryOp::Not => "!",
            });
        }
        self.sub_expr(&u.operand);
    }

    fn binary(&mut self, b: &Binary) {
        // LIKE with a runtime operand goes through the prelude translator
        if matches!(b.op, BinOp::Like | BinOp::NotLike) {
            self.push("(");
            self.expr(&b.lhs);
            self.push(if b.op == BinOp::Like {
                " ~ like2r("
            } else {
                " !~ like2r("
            });
            self.expr(&b.rhs);
            self.push("))");
            return;
        }

        self.push("(");
        self.expr(&b.lhs);
        self.push(match b.op {
            BinOp::Add => " + ",
            BinOp::Sub => " - ",
            BinOp::Mul => " * ",
            BinOp::Div => " / ",
            BinOp::Mod => " % ",
            BinOp::Lt => " < ",
            BinOp::Le => " <= ",
            BinOp::Gt => " > ",
            BinOp::Ge => " >= ",
            BinOp::Eq => " == ",
            BinOp::Ne => " != ",
            BinOp::And => " && ",
            BinOp::Or => " || ",
            BinOp::Match => " ~ ",
            BinOp::NotMatch => " !~ ",
            BinOp::Like | BinOp::NotLike => unreachable!(),
        });
        self.expr(&b.rhs);
        self.push(")");
    }

    fn ternary(&mut self, t: &Ternary) {
        self.push("(");
        self.sub_expr(&t.cond);
        self.push(" ? ");
        self.sub_expr(&t.then);
        self.push(" : ");
        self.sub_expr(&t.alt);
        self.push(")");
    }
}
