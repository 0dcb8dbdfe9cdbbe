use crate::ast::*;
use crate::error::Error;
use crate::lexer::{Lexer, Token};
use crate::like::like_to_regex;

const MAX_OP_PREC: i32 = 7;

#[derive(PartialEq, Clone, Copy)]
enum Stage {
    Na,
    InProjection,
}

pub struct Parser {
    lex: Lexer,
    stage: Stage,
    next_id: NodeId,
}

/// Parse one SELECT statement into a `Code` tree.
pub fn parse(src: &str) -> Result<Code, Error> {
    Parser::new(src).parse()
}

impl Parser {
    pub fn new(src: &str) -> Self {
        Parser {
            lex: Lexer::new(src),
            stage: Stage::Na,
            next_id: 0,
        }
    }

    fn id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn cur(&self) -> &Token {
        &self.lex.token
    }

    fn advance(&mut self) -> Result<(), Error> {
        self.lex.next()
    }

    fn err(&self, msg: &str) -> Error {
        Error::Parse(format!("{}: {}", self.lex.pos(), msg))
    }

    fn check(&self, t: &Token) -> bool {
        std::mem::discriminant(self.cur()) == std::mem::discriminant(t)
    }

    fn expect(&mut self, t: &Token, what: &str) -> Result<(), Error> {
        if self.check(t) {
            self.advance()
        } else {
            Err(self.err(what))
        }
    }

    fn pos_start(&self) -> usize {
        self.lex.token_start
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.lex.token_start)
    }

    pub fn parse(&mut self) -> Result<Code, Error> {
        let start = 0;
        self.advance()?;

        let select = match self.cur() {
            Token::Select => self.parse_select()?,
            _ => return Err(self.err("unknown statement, expect *select*")),
        };

        if self.check(&Token::Semicolon) {
            self.advance()?;
        }
        if !self.check(&Token::Eof) {
            return Err(self.err("dangling code after the statement is finished"));
        }

        Ok(Code {
            select,
            span: self.span_from(start),
        })
    }

    fn parse_select(&mut self) -> Result<Select, Error> {
        self.advance()?; // eat *select*
        let start = self.pos_start();

        let mut distinct = false;
        if self.check(&Token::Distinct) {
            distinct = true;
            self.advance()?;
        }

        let projection = self.parse_projection()?;

        let mut from = None;
        let mut where_ = None;
        let mut group_by = None;
        let mut having = None;
        let mut order_by = None;
        let mut limit = None;
        let mut format = None;

        loop {
            match self.cur() {
                Token::From => {
                    if from.is_some() {
                        return Err(self.err("from clause has already been specified"));
                    }
                    from = Some(self.parse_from()?);
                }
                Token::Where => {
                    if where_.is_some() {
                        return Err(self.err("where clause has already been specified"));
                    }
                    where_ = Some(self.parse_where()?);
                }
                Token::GroupBy => {
                    if group_by.is_some() {
                        return Err(self.err("group by clause has already been specified"));
                    }
                    group_by = Some(self.parse_group_by()?);
                }
                Token::Having => {
                    if having.is_some() {
                        return Err(self.err("having clause has already been specified"));
                    }
                    having = Some(self.parse_having()?);
                }
                Token::OrderBy => {
                    if order_by.is_some() {
                        return Err(self.err("order by clause has already been specified"));
                    }
                    order_by = Some(self.parse_order_by()?);
                }
                Token::Limit => {
                    if limit.is_some() {
                        return Err(self.err("limit clause has already been specified"));
                    }
                    limit = Some(self.parse_limit()?);
                }
                Token::Format => {
                    if format.is_some() {
                        return Err(self.err("format clause has already been specified"));
                    }
                    format = Some(self.parse_format()?);
                }
                _ => break,
            }
        }

        let from = match from {
            Some(f) => f,
            None => return Err(self.err("from clause is not specified")),
        };

        Ok(Select {
            distinct,
            projection,
            from,
            where_,
            group_by,
            having,
            order_by,
            limit,
            format,
            span: self.span_from(start),
        })
    }

    // element (',' element)*; the list is never empty
    fn parse_sql_list<T>(
        &mut self,
        mut visitor: impl FnMut(&mut Self, usize) -> Result<T, Error>,
    ) -> Result<Vec<T>, Error> {
        let mut out = vec![visitor(self, 0)?];
        while self.check(&Token::Comma) {
            self.advance()?;
            let idx = out.len();
            out.push(visitor(self, idx)?);
        }
        Ok(out)
    }

    fn parse_projection(&mut self) -> Result<Projection, Error> {
        let start = self.pos_start();
        let vars = self.parse_sql_list(|p, idx| p.parse_projection_var(idx))?;

        let stars = vars
            .iter()
            .filter(|v| matches!(v, SelectVar::Star(_)))
            .count();
        if stars > 1 {
            return Err(self.err("duplicated */wildcard specified"));
        }

        Ok(Projection {
            vars,
            span: self.span_from(start),
        })
    }

    fn parse_projection_var(&mut self, idx: usize) -> Result<SelectVar, Error> {
        let start = self.pos_start();

        if self.check(&Token::Mul) {
            self.advance()?;
            return Ok(SelectVar::Star(self.span_from(start)));
        }

        self.stage = Stage::InProjection;
        let value = self.parse_expr();
        self.stage = Stage::Na;
        let value = value?;

        let mut alias = None;
        if self.check(&Token::As) {
            self.advance()?;
            match self.cur().clone() {
                Token::Id(name) => {
                    alias = Some(name);
                    self.advance()?;
                }
                _ => return Err(self.err("expect an alias identifier after *as*")),
            }
        }

        Ok(SelectVar::Col(Col {
            index: idx,
            alias,
            value,
            span: self.span_from(start),
        }))
    }

    fn parse_from(&mut self) -> Result<From, Error> {
        let start = self.pos_start();
        self.advance()?; // eat *from*
        let vars = self.parse_sql_list(|p, _| p.parse_from_var())?;
        Ok(From {
            vars,
            span: self.span_from(start),
        })
    }

    fn parse_from_var(&mut self) -> Result<FromVar, Error> {
        let start = self.pos_start();

        let name = match self.cur().clone() {
            Token::Id(n) => n,
            _ => return Err(self.err("expect a valid identifier to represent how to load table")),
        };
        self.advance()?;

        self.expect(&Token::LPar, "expect a '(' here for table locator")?;

        let mut args = Vec::new();
        while !self.check(&Token::RPar) {
            match self.parse_const_expr()? {
                Some(c) => args.push(c),
                None => {
                    return Err(self.err(
                        "expect a valid constant to be part of the table locator parameters",
                    ))
                }
            }
            if self.check(&Token::Comma) {
                self.advance()?;
            }
        }
        self.advance()?; // eat ')'

        let mut alias = None;
        if self.check(&Token::As) {
            self.advance()?;
            match self.cur().clone() {
                Token::Id(n) => {
                    alias = Some(n);
                    self.advance()?;
                }
                _ => return Err(self.err("expect an identifier after *as*")),
            }
        }

        let mut rewrite = None;
        if self.check(&Token::Rewrite) {
            rewrite = Some(self.parse_rewrite()?);
        }

        Ok(FromVar {
            name,
            args,
            alias,
            rewrite,
            span: self.span_from(start),
        })
    }

    fn parse_rewrite(&mut self) -> Result<Rewrite, Error> {
        let start = self.pos_start();
        self.advance()?; // eat *rewrite*

        let mut clauses = Vec::new();
        while !self.check(&Token::End) {
            if !self.check(&Token::When) {
                return Err(self.err("expect a *when* for rewrite list"));
            }
            let clause_start = self.pos_start();
            self.advance()?;

            let cond = self.parse_expr()?;

            self.expect(
                &Token::Then,
                "expect a *then* for yielding the rewritten expression",
            )?;

            let action = match self.cur() {
                Token::Next => {
                    self.advance()?;
                    RewriteAction::Next
                }
                Token::Set => {
                    self.advance()?;
                    let mut sets = Vec::new();
                    loop {
                        let column = match self.cur().clone() {
                            Token::Id(n) => n,
                            _ => {
                                return Err(
                                    self.err("expect a column index, example as $1,$2,...")
                                )
                            }
                        };
                        self.advance()?;
                        self.expect(
                            &Token::Assign,
                            "expect = here to indicate rewrite expression",
                        )?;
                        let value = self.parse_expr()?;
                        sets.push(RewriteSet { column, value });

                        if self.check(&Token::Comma) {
                            self.advance()?;
                        } else {
                            break;
                        }
                    }
                    RewriteAction::Set(sets)
                }
                _ => return Err(self.err("expect a set/next after then")),
            };

            if self.check(&Token::Semicolon) {
                self.advance()?;
            }

            clauses.push(RewriteClause {
                cond,
                action,
                span: self.span_from(clause_start),
            });
        }
        self.advance()?; // eat *end*

        Ok(Rewrite {
            clauses,
            span: self.span_from(start),
        })
    }

    fn parse_where(&mut self) -> Result<Where, Error> {
        let start = self.pos_start();
        self.advance()?;
        let cond = self.parse_expr()?;
        Ok(Where {
            cond,
            span: self.span_from(start),
        })
    }

    fn parse_having(&mut self) -> Result<Where, Error> {
        self.parse_where()
    }

    fn parse_group_by(&mut self) -> Result<GroupBy, Error> {
        let start = self.pos_start();
        self.advance()?; // eat *group by*
        let keys = self.parse_sql_list(|p, _| p.parse_expr())?;
        Ok(GroupBy {
            keys,
            span: self.span_from(start),
        })
    }

    fn parse_order_by(&mut self) -> Result<OrderBy, Error> {
        let start = self.pos_start();
        self.advance()?; // eat *order by*
        let keys = self.parse_sql_list(|p, _| p.parse_expr())?;

        let mut asc = true;
        if let Token::Id(dir) = self.cur() {
            match dir.as_str() {
                "asc" => {
                    self.advance()?;
                }
                "desc" => {
                    asc = false;
                    self.advance()?;
                }
                _ => {}
            }
        }

        Ok(OrderBy {
            asc,
            keys,
            span: self.span_from(start),
        })
    }

    fn parse_limit(&mut self) -> Result<Limit, Error> {
        let start = self.pos_start();
        self.advance()?;
        match *self.cur() {
            Token::Int(v) => {
                self.advance()?;
                Ok(Limit {
                    count: v,
                    span: self.span_from(start),
                })
            }
            _ => Err(self.err("expect an integer after limit")),
        }
    }

    fn parse_format(&mut self) -> Result<FormatOpts, Error> {
        self.advance()?; // eat *format*
        let mut opts = FormatOpts::default();

        loop {
            let key = match self.cur().clone() {
                Token::Id(k) => k,
                _ => return Err(self.err("expect an *identifier* to be format option")),
            };
            self.advance()?;

            let mut col_idx = -1;
            match key.as_str() {
                "title" | "border" | "base" | "number" | "string" | "rest" | "padding" => {}
                "column" => {
                    self.expect(&Token::LPar, "expect a '(index)' after column format option")?;
                    match *self.cur() {
                        Token::Int(v) if v >= 0 => {
                            col_idx = v;
                            self.advance()?;
                        }
                        _ => {
                            return Err(
                                self.err("expect a positive integer to specify column index")
                            )
                        }
                    }
                    self.expect(
                        &Token::RPar,
                        "expect a ')' to close index expression for column format option",
                    )?;
                }
                _ => return Err(self.err("unknown format option")),
            }

            self.expect(
                &Token::Assign,
                "expect a '=' to assign a value to format option",
            )?;

            let val = match self.parse_const_expr()? {
                Some(c) => c,
                None => {
                    return Err(
                        self.err("expect a const/literal expression to be format option value")
                    )
                }
            };

            match key.as_str() {
                "title" => opts.title = Some(val),
                "border" => opts.border = Some(val),
                "base" => opts.base = Some(val),
                "padding" => opts.padding = Some(val),
                "number" => opts.number = Some(val),
                "string" => opts.string = Some(val),
                "rest" => opts.rest = Some(val),
                _ => opts.columns.push((col_idx, val)),
            }

            if self.check(&Token::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }

        Ok(opts)
    }

    // ── Expression parsing ───────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, Error> {
        let start = self.pos_start();
        let cond = self.parse_binary()?;

        if !self.check(&Token::Question) {
            return Ok(cond);
        }
        self.advance()?;

        let then = self.parse_binary()?;
        self.expect(&Token::Colon, "expect ':' inside ternary expression")?;
        let alt = self.parse_binary()?;

        Ok(Expr::Ternary(Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            alt: Box::new(alt),
            id: self.id(),
            span: self.span_from(start),
        }))
    }

    fn bin_prec(t: &Token) -> i32 {
        match t {
            Token::Or => 0,
            Token::And => 1,
            Token::In | Token::Between | Token::Like | Token::Not => 2,
            Token::Eq | Token::Ne | Token::MatchOp | Token::NotMatchOp => 3,
            Token::Lt | Token::Le | Token::Gt | Token::Ge => 4,
            Token::Add | Token::Sub => 5,
            Token::Mul | Token::Div | Token::Mod => 6,
            _ => -1,
        }
    }

    fn bin_op(t: &Token) -> BinOp {
        match t {
            Token::Or => BinOp::Or,
            Token::And => BinOp::And,
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::MatchOp => BinOp::Match,
            Token::NotMatchOp => BinOp::NotMatch,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::Add => BinOp::Add,
            Token::Sub => BinOp::Sub,
            Token::Mul => BinOp::Mul,
            Token::Div => BinOp::Div,
            Token::Mod => BinOp::Mod,
            _ => unreachable!("not a binary operator token"),
        }
    }

    fn parse_binary(&mut self) -> Result<Expr, Error> {
        self.do_parse_bin(0)
    }

    // precedence climbing
    fn do_parse_bin(&mut self, prec: i32) -> Result<Expr, Error> {
        if prec == MAX_OP_PREC {
            return self.parse_unary();
        }
        let start = self.pos_start();
        let lhs = self.parse_unary()?;
        self.do_parse_bin_rest(lhs, prec, start)
    }

    fn do_parse_bin_rest(&mut self, mut lhs: Expr, prec: i32, start: usize) -> Result<Expr, Error> {
        loop {
            let mut tk = self.cur().clone();
            let next_prec = Self::bin_prec(&tk);
            if next_prec < 0 || next_prec < prec {
                break;
            }
            self.advance()?; // eat the operator token

            // NOT is only a binary-operator *prefix*: NOT IN / NOT BETWEEN /
            // NOT LIKE
            let mut negated = false;
            if tk == Token::Not {
                match self.cur() {
                    Token::In => {
                        negated = true;
                        tk = Token::In;
                        self.advance()?;
                    }
                    Token::Between => {
                        negated = true;
                        tk = Token::Between;
                        self.advance()?;
                    }
                    Token::Like => {
                        negated = true;
                        tk = Token::Like;
                        self.advance()?;
                    }
                    _ => {
                        return Err(self.err(
                            "NOT operator shows up, but expect a suffix operator, \
                             example like NOT IN, NOT BETWEEN, NOT LIKE",
                        ))
                    }
                }
            }

            lhs = match tk {
                Token::Between => {
                    let (lower, upper) = self.parse_between_rhs(next_prec + 1)?;
                    let span = self.span_from(start);
                    let between = self.desugar_between(lhs, lower, upper, span);
                    if negated {
                        self.negate(between, span)
                    } else {
                        between
                    }
                }
                Token::In => {
                    let set = self.parse_in_rhs()?;
                    let span = self.span_from(start);
                    let choice = self.desugar_in(lhs, set, span);
                    if negated {
                        self.negate(choice, span)
                    } else {
                        choice
                    }
                }
                Token::Like => {
                    let rhs = self.do_parse_bin(next_prec + 1)?;
                    let span = self.span_from(start);
                    self.desugar_like(lhs, rhs, negated, span)
                }
                _ => {
                    let rhs = self.do_parse_bin(next_prec + 1)?;
                    Expr::Binary(Binary {
                        op: Self::bin_op(&tk),
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        id: self.id(),
                        span: self.span_from(start),
                    })
                }
            };
        }
        Ok(lhs)
    }

    fn parse_between_rhs(&mut self, prec: i32) -> Result<(Expr, Expr), Error> {
        let lower = self.do_parse_bin(prec)?;
        if !self.check(&Token::And) {
            return Err(self.err("expect AND for BETWEEN operator"));
        }
        self.advance()?;
        let upper = self.do_parse_bin(prec)?;
        Ok((lower, upper))
    }

    fn parse_in_rhs(&mut self) -> Result<Vec<Expr>, Error> {
        self.expect(&Token::LPar, "expect '(' for IN operator's set")?;

        let mut out = Vec::new();
        while !self.check(&Token::RPar) {
            out.push(self.parse_expr()?);
            if self.check(&Token::Comma) {
                self.advance()?;
            } else if !self.check(&Token::RPar) {
                return Err(self.err("expect a ',' or ')' after element in IN's set"));
            }
        }
        self.advance()?;

        if out.is_empty() {
            return Err(self.err("IN operator's RHS is an empty set, which is not allowed"));
        }
        Ok(out)
    }

    // x BETWEEN a AND b  =>  (x >= a) AND (x <= b)
    fn desugar_between(&mut self, lhs: Expr, lower: Expr, upper: Expr, span: Span) -> Expr {
        let ge = Expr::Binary(Binary {
            op: BinOp::Ge,
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(lower),
            id: self.id(),
            span,
        });
        let le = Expr::Binary(Binary {
            op: BinOp::Le,
            lhs: Box::new(lhs),
            rhs: Box::new(upper),
            id: self.id(),
            span,
        });
        Expr::Binary(Binary {
            op: BinOp::And,
            lhs: Box::new(ge),
            rhs: Box::new(le),
            id: self.id(),
            span,
        })
    }

    // x IN (a, b)  =>  (x == a) OR (x == b)
    fn desugar_in(&mut self, lhs: Expr, set: Vec<Expr>, span: Span) -> Expr {
        let mut out: Option<Expr> = None;
        for v in set {
            let eq = Expr::Binary(Binary {
                op: BinOp::Eq,
                lhs: Box::new(lhs.clone()),
                rhs: Box::new(v),
                id: self.id(),
                span,
            });
            out = Some(match out {
                None => eq,
                Some(prev) => Expr::Binary(Binary {
                    op: BinOp::Or,
                    lhs: Box::new(prev),
                    rhs: Box::new(eq),
                    id: self.id(),
                    span,
                }),
            });
        }
        out.expect("IN set is never empty")
    }

    // x LIKE "lit"  =>  x =~ "<regex>"; non-literal RHS keeps the LIKE
    // operator for the runtime helper
    fn desugar_like(&mut self, lhs: Expr, rhs: Expr, negated: bool, span: Span) -> Expr {
        if let Expr::Const(c) = &rhs {
            if let ConstVal::Str(pat) = &c.value {
                let re = Expr::Const(Const {
                    value: ConstVal::Str(like_to_regex(pat)),
                    id: self.id(),
                    span: c.span,
                });
                return Expr::Binary(Binary {
                    op: if negated {
                        BinOp::NotMatch
                    } else {
                        BinOp::Match
                    },
                    lhs: Box::new(lhs),
                    rhs: Box::new(re),
                    id: self.id(),
                    span,
                });
            }
        }
        Expr::Binary(Binary {
            op: if negated { BinOp::NotLike } else { BinOp::Like },
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            id: self.id(),
            span,
        })
    }

    fn negate(&mut self, operand: Expr, span: Span) -> Expr {
        Expr::Unary(Unary {
            ops: vec![UnaryOp::Not],
            operand: Box::new(operand),
            id: self.id(),
            span,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let start = self.pos_start();
        let mut ops = Vec::new();

        loop {
            match self.cur() {
                Token::Add => ops.push(UnaryOp::Plus),
                Token::Sub => ops.push(UnaryOp::Minus),
                Token::Not => ops.push(UnaryOp::Not),
                _ => break,
            }
            self.advance()?;
        }

        let operand = self.parse_primary()?;

        if ops.is_empty() {
            Ok(operand)
        } else {
            Ok(Expr::Unary(Unary {
                ops,
                operand: Box::new(operand),
                id: self.id(),
                span: self.span_from(start),
            }))
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let start = self.pos_start();
        let atomic = self.parse_atomic()?;

        let mut suffix = Vec::new();
        loop {
            match self.cur() {
                Token::Dot => suffix.push(self.parse_suffix_dot()?),
                Token::LSqr => suffix.push(self.parse_suffix_index()?),
                Token::LPar => suffix.push(self.parse_suffix_call(&atomic)?),
                _ => break,
            }
        }

        if suffix.is_empty() {
            Ok(atomic)
        } else {
            Ok(Expr::Primary(Primary {
                leading: Box::new(atomic),
                suffix,
                can_name: CanName::Free,
                id: self.id(),
                span: self.span_from(start),
            }))
        }
    }

    fn parse_suffix_dot(&mut self) -> Result<Suffix, Error> {
        let start = self.pos_start();
        self.advance()?; // eat '.'

        let (name, symbol) = match self.cur().clone() {
            Token::Id(n) => {
                self.advance()?;
                (n, Symbol::None)
            }
            Token::Str(n) => {
                self.advance()?;
                (n, Symbol::None)
            }
            t @ (Token::Mul | Token::Columns | Token::Rows) => {
                if self.stage != Stage::InProjection {
                    return Err(
                        self.err("invalid */COLUMNS/ROWS keyword here, must be in projection")
                    );
                }
                let sym = match t {
                    Token::Mul => Symbol::Star,
                    Token::Columns => Symbol::Columns,
                    _ => Symbol::Rows,
                };
                self.advance()?;
                (String::new(), sym)
            }
            _ => return Err(self.err("expect an identifier after '.' operator")),
        };

        Ok(Suffix {
            kind: SuffixKind::Dot { name, symbol },
            span: self.span_from(start),
        })
    }

    fn parse_suffix_index(&mut self) -> Result<Suffix, Error> {
        let start = self.pos_start();
        self.advance()?; // eat '['
        let idx = self.parse_expr()?;
        self.expect(&Token::RSqr, "expect ']' to close the index operator")?;
        Ok(Suffix {
            kind: SuffixKind::Index(Box::new(idx)),
            span: self.span_from(start),
        })
    }

    fn is_agg_func(leading: &Expr) -> bool {
        match leading {
            Expr::Ref(r) => matches!(
                r.name.as_str(),
                "min" | "max" | "avg" | "sum" | "count" | "percentile" | "histogram"
            ),
            _ => false,
        }
    }

    fn parse_suffix_call(&mut self, leading: &Expr) -> Result<Suffix, Error> {
        let start = self.pos_start();
        self.advance()?; // eat '('

        let mut args = Vec::new();
        while !self.check(&Token::RPar) {
            if self.check(&Token::Mul) {
                // an aggregation call may take * as its sole argument; the
                // aggregation analysis settles it later
                if !Self::is_agg_func(leading) {
                    return Err(
                        self.err("wildcard argument is only allowed in aggregation calls")
                    );
                }
                let sp_start = self.pos_start();
                self.advance()?;
                args.push(Expr::Ref(Ref {
                    name: "*".to_string(),
                    symbol: Symbol::None,
                    can_name: CanName::Free,
                    id: self.id(),
                    span: self.span_from(sp_start),
                }));
            } else {
                args.push(self.parse_expr()?);
            }
            if self.check(&Token::Comma) {
                self.advance()?;
            }
        }
        self.advance()?; // eat ')'

        let span = self.span_from(start);
        Ok(Suffix {
            kind: SuffixKind::Call(Call { args, span }),
            span,
        })
    }

    /// Parse a constant expression, folding unary operators so that FROM
    /// parameters and FORMAT values stay literal constants. Returns
    /// `Ok(None)` when the current token cannot begin a constant.
    fn parse_const_expr(&mut self) -> Result<Option<Const>, Error> {
        let start = self.pos_start();

        let mut c = match self.cur().clone() {
            Token::True => {
                self.advance()?;
                ConstVal::Bool(true)
            }
            Token::False => {
                self.advance()?;
                ConstVal::Bool(false)
            }
            Token::Null => {
                self.advance()?;
                ConstVal::Null
            }
            Token::Str(s) => {
                self.advance()?;
                ConstVal::Str(s)
            }
            Token::Int(v) => {
                self.advance()?;
                ConstVal::Int(v)
            }
            Token::Real(v) => {
                self.advance()?;
                ConstVal::Real(v)
            }
            Token::Not | Token::Add | Token::Sub => {
                // collect the unary run, then fold right-to-left
                let mut ops = Vec::new();
                loop {
                    match self.cur() {
                        Token::Not => ops.push(UnaryOp::Not),
                        Token::Sub => ops.push(UnaryOp::Minus),
                        Token::Add => {} // plus is the identity
                        _ => break,
                    }
                    self.advance()?;
                }
                let inner = match self.parse_const_expr()? {
                    Some(c) => c,
                    None => return Ok(None),
                };
                let mut val = inner.value;
                for op in ops.iter().rev() {
                    val = match op {
                        UnaryOp::Not => ConstVal::Bool(!Self::const_truthy(&val)),
                        UnaryOp::Minus => match val {
                            ConstVal::Bool(b) => ConstVal::Int(if b { -1 } else { 0 }),
                            ConstVal::Int(i) => ConstVal::Int(-i),
                            ConstVal::Real(r) => ConstVal::Real(-r),
                            _ => return Ok(None),
                        },
                        UnaryOp::Plus => val,
                    };
                }
                val
            }
            _ => return Ok(None),
        };

        // normalize -0.0
        if let ConstVal::Real(r) = c {
            if r == 0.0 {
                c = ConstVal::Real(0.0);
            }
        }

        Ok(Some(Const {
            value: c,
            id: self.id(),
            span: self.span_from(start),
        }))
    }

    fn const_truthy(v: &ConstVal) -> bool {
        match v {
            ConstVal::Null => false,
            ConstVal::Bool(b) => *b,
            ConstVal::Int(i) => *i != 0,
            ConstVal::Real(r) => *r != 0.0,
            ConstVal::Str(s) => !s.is_empty(),
        }
    }

    fn parse_atomic(&mut self) -> Result<Expr, Error> {
        let start = self.pos_start();

        match self.cur().clone() {
            Token::True | Token::False | Token::Null | Token::Str(_) | Token::Int(_)
            | Token::Real(_) => {
                let c = self
                    .parse_const_expr()?
                    .expect("constant token starts a constant");
                Ok(Expr::Const(c))
            }
            Token::Id(name) => {
                self.advance()?;
                Ok(Expr::Ref(Ref {
                    name,
                    symbol: Symbol::None,
                    can_name: CanName::Free,
                    id: self.id(),
                    span: self.span_from(start),
                }))
            }
            // CAST is reserved but behaves like an ordinary function name
            Token::Cast => {
                self.advance()?;
                Ok(Expr::Ref(Ref {
                    name: "cast".to_string(),
                    symbol: Symbol::None,
                    can_name: CanName::Free,
                    id: self.id(),
                    span: self.span_from(start),
                }))
            }
            t @ (Token::Columns | Token::Rows) => {
                if self.stage != Stage::InProjection {
                    return Err(self.err("COLUMNS/ROWS can only be used in projection"));
                }
                self.advance()?;
                Ok(Expr::Ref(Ref {
                    name: String::new(),
                    symbol: if t == Token::Columns {
                        Symbol::Columns
                    } else {
                        Symbol::Rows
                    },
                    can_name: CanName::Free,
                    id: self.id(),
                    span: self.span_from(start),
                }))
            }
            Token::LPar => {
                self.advance()?;
                let e = self.parse_expr()?;
                self.expect(&Token::RPar, "expect ')' to close the expression")?;
                Ok(e)
            }
            _ => Err(self.err("unexpected token for expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::print_expr;

    fn parse_one_expr(src: &str) -> Expr {
        let full = format!("select {} from tab(\"f\")", src);
        let code = parse(&full).unwrap();
        match &code.select.projection.vars[0] {
            SelectVar::Col(c) => c.value.clone(),
            _ => panic!("expected a column"),
        }
    }

    fn printed(src: &str) -> String {
        print_expr(&parse_one_expr(src))
    }

    #[test]
    fn precedence_mul_over_sub() {
        assert_eq!(printed("a-b*c"), "(a-(b*c))");
        assert_eq!(printed("a-b*c+d"), "((a-(b*c))+d)");
    }

    #[test]
    fn precedence_and_over_or() {
        assert_eq!(printed("a or b and c"), "(a||(b&&c))");
    }

    #[test]
    fn parser_round_trip() {
        for src in [
            "a-b*c+d",
            "(a+b)*c",
            "a or b and c",
            "f(x,y)+1",
            "x ? y : z",
            "-x",
            "!a",
            "t.\"$1\"",
            "a%b",
        ] {
            let one = printed(src);
            let two = print_expr(&parse_one_expr(&one));
            assert_eq!(one, two, "round trip failed for {}", src);
        }
    }

    #[test]
    fn desugar_between() {
        assert_eq!(printed("x between 1 and 2"), "((x>=1)&&(x<=2))");
        assert_eq!(printed("x not between 1 and 2"), "!((x>=1)&&(x<=2))");
        // equal to the hand-written equivalent
        assert_eq!(printed("x between 1 and 2"), printed("x >= 1 and x <= 2"));
    }

    #[test]
    fn desugar_in() {
        assert_eq!(printed("x in (1, 2)"), "((x==1)||(x==2))");
        assert_eq!(printed("x not in (1)"), "!(x==1)");
        assert_eq!(printed("x in (1, 2)"), printed("x == 1 or x == 2"));
    }

    #[test]
    fn empty_in_is_an_error() {
        assert!(parse("select $1 from tab(\"f\") where $1 in ()").is_err());
    }

    #[test]
    fn desugar_like_literal() {
        assert_eq!(printed("x like \"a%\""), "(x=~\"^[a].*$\")");
        assert_eq!(printed("x not like \"a\""), "(x!~\"^[a]$\")");
    }

    #[test]
    fn like_dynamic_stays_like() {
        assert_eq!(printed("x like y"), "(x like y)");
    }

    #[test]
    fn between_binds_tighter_than_and() {
        assert_eq!(
            printed("a between 1 and 2 and b"),
            "(((a>=1)&&(a<=2))&&b)"
        );
    }

    #[test]
    fn clause_repetition_rejected() {
        assert!(parse("select $1 from tab(\"a\") where 1 where 2").is_err());
        assert!(parse("select $1 from tab(\"a\") limit 1 limit 2").is_err());
    }

    #[test]
    fn from_is_required() {
        assert!(parse("select $1").is_err());
    }

    #[test]
    fn trailing_semicolon_ok() {
        assert!(parse("select $1 from tab(\"a\");").is_ok());
        assert!(parse("select $1 from tab(\"a\") ; x").is_err());
    }

    #[test]
    fn double_star_rejected() {
        assert!(parse("select *, * from tab(\"a\")").is_err());
    }

    #[test]
    fn from_args_fold_constants() {
        let code = parse("select $1 from tab(\"f\", - -5)").unwrap();
        let args = &code.select.from.vars[0].args;
        assert_eq!(args[1].value, ConstVal::Int(5));
    }

    #[test]
    fn from_alias_and_rewrite() {
        let code = parse(
            "select $1 from tab(\"f\") as t rewrite \
             when $1 > 10 then set $2 = 0; \
             when $2 == 0 then next; \
             end",
        )
        .unwrap();
        let fv = &code.select.from.vars[0];
        assert_eq!(fv.alias.as_deref(), Some("t"));
        let rw = fv.rewrite.as_ref().unwrap();
        assert_eq!(rw.clauses.len(), 2);
        assert!(matches!(rw.clauses[0].action, RewriteAction::Set(_)));
        assert!(matches!(rw.clauses[1].action, RewriteAction::Next));
    }

    #[test]
    fn format_clause() {
        let code = parse(
            "select $1 from tab(\"f\") format base = \"color\", padding = 8, column(1) = \"bold\"",
        )
        .unwrap();
        let f = code.select.format.unwrap();
        assert!(f.base.is_some());
        assert!(f.padding.is_some());
        assert_eq!(f.columns.len(), 1);
    }

    #[test]
    fn agg_star_argument() {
        let code = parse("select count(*) from tab(\"f\")").unwrap();
        match &code.select.projection.vars[0] {
            SelectVar::Col(c) => match &c.value {
                Expr::Primary(p) => {
                    let call = p.suffix[0].as_call().unwrap();
                    assert!(matches!(&call.args[0], Expr::Ref(r) if r.name == "*"));
                }
                _ => panic!("expected a call primary"),
            },
            _ => panic!("expected a column"),
        }
    }

    #[test]
    fn star_argument_outside_agg_rejected() {
        assert!(parse("select foo(*) from tab(\"f\")").is_err());
    }

    #[test]
    fn columns_rows_only_in_projection() {
        assert!(parse("select t.rows(\"x\") from tab(\"f\") as t").is_ok());
        assert!(parse("select $1 from tab(\"f\") as t where t.rows(\"x\")").is_err());
    }

    #[test]
    fn order_by_direction() {
        let code = parse("select $1 from tab(\"f\") order by $1 desc").unwrap();
        assert!(!code.select.order_by.unwrap().asc);
        let code = parse("select $1 from tab(\"f\") order by $1").unwrap();
        assert!(code.select.order_by.unwrap().asc);
    }
}
