use crate::error::{Error, Pos};

/// Token types for the query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Real(f64),
    Str(String),
    True,
    False,
    Null,

    // Identifiers (lowercased before storage)
    Id(String),

    // Keywords
    Select,
    From,
    As,
    Cast,
    Where,
    GroupBy,
    OrderBy,
    Limit,
    Having,
    Distinct,
    In,
    Between,
    Like,
    Default,
    Case,
    If,
    Else,
    Then,
    End,
    When,
    Set,
    Next,
    Format,
    Rewrite,
    Output,
    Columns,
    Rows,
    And,
    Or,
    Not,

    // Punctuation
    Comma,
    Semicolon,
    Colon,
    DColon,
    Question,
    Assign,
    LSqr,
    RSqr,
    LBra,
    RBra,
    LPar,
    RPar,
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
    MatchOp,
    NotMatchOp,
    Dot,

    Eof,
}

/// Single-pass pull lexer with one-rune lookahead. `next()` produces one
/// token per call and yields `Eof` permanently once the input is consumed.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    pub token: Token,
    pub token_start: usize,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Lexer {
            chars: src.chars().collect(),
            pos: 0,
            token: Token::Eof,
            token_start: 0,
        }
    }

    /// Line/column of an arbitrary character offset.
    pub fn pos_of(&self, offset: usize) -> Pos {
        let mut line = 1;
        let mut col = 1;
        for &c in self.chars.iter().take(offset) {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Pos::new(line, col)
    }

    /// Position of the token currently being lexed (or just lexed).
    pub fn pos(&self) -> Pos {
        self.pos_of(self.token_start)
    }

    fn err(&self, msg: &str) -> Error {
        Error::Lex(format!("{}: {}", self.pos_of(self.pos), msg))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn yield_tok(&mut self, t: Token, sz: usize) -> Result<(), Error> {
        self.pos += sz;
        self.token = t;
        Ok(())
    }

    /// Advance to the next token. The result is stored in `self.token`.
    pub fn next(&mut self) -> Result<(), Error> {
        loop {
            self.token_start = self.pos;

            let c = match self.peek() {
                None => {
                    self.token = Token::Eof;
                    return Ok(());
                }
                Some(c) => c,
            };

            match c {
                ' ' | '\r' | '\t' | '\n' | '\x08' | '\x0b' => {
                    self.pos += 1;
                }
                ',' => return self.yield_tok(Token::Comma, 1),
                ';' => return self.yield_tok(Token::Semicolon, 1),
                ':' => {
                    if self.peek2() == Some(':') {
                        return self.yield_tok(Token::DColon, 2);
                    }
                    return self.yield_tok(Token::Colon, 1);
                }
                '.' => return self.yield_tok(Token::Dot, 1),
                '?' => return self.yield_tok(Token::Question, 1),
                '[' => return self.yield_tok(Token::LSqr, 1),
                ']' => return self.yield_tok(Token::RSqr, 1),
                '{' => return self.yield_tok(Token::LBra, 1),
                '}' => return self.yield_tok(Token::RBra, 1),
                '(' => return self.yield_tok(Token::LPar, 1),
                ')' => return self.yield_tok(Token::RPar, 1),
                '+' => return self.yield_tok(Token::Add, 1),
                '-' => return self.yield_tok(Token::Sub, 1),
                '*' => return self.yield_tok(Token::Mul, 1),
                '%' => return self.yield_tok(Token::Mod, 1),
                '/' => match self.peek2() {
                    Some('/') => {
                        self.pos += 2;
                        self.skip_line_comment();
                    }
                    Some('*') => {
                        self.pos += 2;
                        self.skip_block_comment()?;
                    }
                    _ => return self.yield_tok(Token::Div, 1),
                },
                '#' => {
                    self.pos += 1;
                    self.skip_line_comment();
                }
                '&' => {
                    if self.peek2() == Some('&') {
                        return self.yield_tok(Token::And, 2);
                    }
                    return Err(self.err("are you missing '&' for the and operator?"));
                }
                '|' => {
                    if self.peek2() == Some('|') {
                        return self.yield_tok(Token::Or, 2);
                    }
                    return Err(self.err("are you missing '|' for the or operator?"));
                }
                '=' => match self.peek2() {
                    Some('=') => return self.yield_tok(Token::Eq, 2),
                    Some('~') => return self.yield_tok(Token::MatchOp, 2),
                    _ => return self.yield_tok(Token::Assign, 1),
                },
                '>' => {
                    if self.peek2() == Some('=') {
                        return self.yield_tok(Token::Ge, 2);
                    }
                    return self.yield_tok(Token::Gt, 1);
                }
                '<' => match self.peek2() {
                    Some('=') => return self.yield_tok(Token::Le, 2),
                    Some('>') => return self.yield_tok(Token::Ne, 2),
                    _ => return self.yield_tok(Token::Lt, 1),
                },
                '!' => match self.peek2() {
                    Some('=') => return self.yield_tok(Token::Ne, 2),
                    Some('~') => return self.yield_tok(Token::NotMatchOp, 2),
                    _ => return self.yield_tok(Token::Not, 1),
                },
                '\'' | '"' => return self.lex_str(c),
                '0'..='9' => return self.lex_num(),
                _ => return self.lex_keyword_or_id(c),
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                None => return Err(self.err("block comment is not closed properly")),
                Some('*') if self.peek2() == Some('/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    // 1) an exponent sign or a dot indicates a real number
    // 2) 0x prefix switches to hex, which allows neither dot nor exponent
    // 3) otherwise a 64 bit integer
    fn lex_num(&mut self) -> Result<(), Error> {
        let first = self.chars[self.pos];
        self.pos += 1;

        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.pos += 1;
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == start {
                return Err(self.err("hex literal without digits"));
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            return match i64::from_str_radix(&text, 16) {
                Ok(v) => {
                    self.token = Token::Int(v);
                    Ok(())
                }
                Err(e) => Err(self.err(&format!("invalid hex literal: {}", e))),
            };
        }

        let mut buf = String::new();
        buf.push(first);
        let mut has_dot = false;
        let mut has_e = false;

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {
                    buf.push(c);
                    self.pos += 1;
                }
                '.' if !has_dot && !has_e => {
                    has_dot = true;
                    buf.push('.');
                    self.pos += 1;
                }
                'e' | 'E' if !has_e => {
                    has_e = true;
                    buf.push(c);
                    self.pos += 1;
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        buf.push(self.chars[self.pos]);
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }

        if has_dot || has_e {
            match buf.parse::<f64>() {
                Ok(v) => {
                    self.token = Token::Real(v);
                    Ok(())
                }
                Err(e) => Err(self.err(&format!("invalid number: {}", e))),
            }
        } else {
            match buf.parse::<i64>() {
                Ok(v) => {
                    self.token = Token::Int(v);
                    Ok(())
                }
                Err(e) => Err(self.err(&format!("invalid number: {}", e))),
            }
        }
    }

    fn lex_str(&mut self, quote: char) -> Result<(), Error> {
        self.pos += 1;
        let mut buf = String::new();

        loop {
            let c = match self.peek() {
                None => return Err(self.err("string literal is not closed by quote properly")),
                Some(c) => c,
            };

            if c == quote {
                self.pos += 1;
                self.token = Token::Str(buf);
                return Ok(());
            }

            if c == '\\' {
                let esc = match self.peek2() {
                    None => {
                        return Err(self.err("string literal is not closed by quote properly"))
                    }
                    Some(e) => e,
                };
                match esc {
                    't' => buf.push('\t'),
                    'n' => buf.push('\n'),
                    'b' => buf.push('\x08'),
                    'v' => buf.push('\x0b'),
                    'r' => buf.push('\r'),
                    '\'' => buf.push('\''),
                    '"' => buf.push('"'),
                    '\\' => buf.push('\\'),
                    _ => {
                        return Err(
                            self.err("unknown escape sequence inside of string literal")
                        )
                    }
                }
                self.pos += 2;
            } else {
                buf.push(c);
                self.pos += 1;
            }
        }
    }

    fn is_id_char(c: char) -> bool {
        c == '_' || c.is_alphanumeric()
    }

    fn is_id_leading_char(c: char) -> bool {
        c == '_' || c == '$' || c.is_alphabetic()
    }

    /// Read an identifier word, lowercased. The leading `$` is preserved.
    fn read_word(&mut self) -> String {
        let mut buf = String::new();
        let lead = self.chars[self.pos];
        if lead == '$' {
            buf.push('$');
        } else {
            buf.extend(lead.to_lowercase());
        }
        self.pos += 1;

        while let Some(c) = self.peek() {
            if !Self::is_id_char(c) {
                break;
            }
            buf.extend(c.to_lowercase());
            self.pos += 1;
        }
        buf
    }

    fn keyword(word: &str) -> Option<Token> {
        Some(match word {
            "select" => Token::Select,
            "from" => Token::From,
            "as" => Token::As,
            "cast" => Token::Cast,
            "where" => Token::Where,
            "limit" => Token::Limit,
            "having" => Token::Having,
            "distinct" => Token::Distinct,
            "in" => Token::In,
            "between" => Token::Between,
            "like" => Token::Like,
            "default" => Token::Default,
            "case" => Token::Case,
            "if" => Token::If,
            "else" => Token::Else,
            "then" => Token::Then,
            "end" => Token::End,
            "when" => Token::When,
            "set" => Token::Set,
            "next" => Token::Next,
            "format" => Token::Format,
            "rewrite" => Token::Rewrite,
            "output" => Token::Output,
            "columns" => Token::Columns,
            "rows" => Token::Rows,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            "null" | "nil" => Token::Null,
            _ => return None,
        })
    }

    fn lex_keyword_or_id(&mut self, c: char) -> Result<(), Error> {
        if !Self::is_id_leading_char(c) {
            return Err(self.err(&format!("unexpected character '{}'", c)));
        }

        let word = self.read_word();

        // two-word keywords: the second word must follow, otherwise the
        // first word stays a plain identifier
        if word == "group" || word == "order" {
            let save = self.pos;
            if self.match_second_word("by") {
                self.token = if word == "group" {
                    Token::GroupBy
                } else {
                    Token::OrderBy
                };
                return Ok(());
            }
            self.pos = save;
        }

        self.token = match Self::keyword(&word) {
            Some(t) => t,
            None => Token::Id(word),
        };
        Ok(())
    }

    fn match_second_word(&mut self, expect: &str) -> bool {
        while matches!(
            self.peek(),
            Some(' ') | Some('\r') | Some('\t') | Some('\n') | Some('\x08') | Some('\x0b')
        ) {
            self.pos += 1;
        }
        match self.peek() {
            Some(c) if c.is_alphabetic() => {
                let w = self.read_word();
                w == expect
            }
            _ => false,
        }
    }
}
