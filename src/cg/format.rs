//! Format stage and its helper functions.
//!
//! Renders rows with the plan's styling model: per-column instructions
//! first, then per-type (number/string/rest) fallbacks, then the plain
//! padded base. ANSI escape sequences are synthesized at compile time
//! from the format instructions. Title bars for wildcard projections are
//! printed by helpers because their width is only known at END time.

use crate::error::Error;
use crate::plan::{Color, FormatInstruction, Plan};

use super::writer::AwkWriter;
use super::{QueryCodeGen, SubGen};

pub(crate) struct FormatCodeGen<'a> {
    plan: &'a Plan,
    sep: String,
    padding: i64,
}

/// Escape literal text for use inside an AWK printf format string: `%`
/// must not read as a conversion. Styled fragments keep their `%`
/// conversions and ANSI escapes and only need `lit_escape`.
fn fmt_escape(s: &str) -> String {
    s.replace('"', "\\\"").replace('%', "%%")
}

/// Escape text for embedding in an AWK string literal.
fn lit_escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

impl<'a> FormatCodeGen<'a> {
    pub fn new(plan: &'a Plan, sep: String, padding: i64) -> Self {
        FormatCodeGen { plan, sep, padding }
    }

    fn pad_fmt(&self) -> String {
        format!("%-{}s", self.padding)
    }

    /// ANSI prefix for an instruction, empty when unstyled.
    fn ansi_prefix(ins: &FormatInstruction) -> String {
        if !ins.has_style() {
            return String::new();
        }
        let mut codes: Vec<String> = Vec::new();
        if ins.bold {
            codes.push("1".to_string());
        }
        if ins.italic {
            codes.push("3".to_string());
        }
        if ins.underline {
            codes.push("4".to_string());
        }
        let color = match ins.color {
            Color::Black => Some(30),
            Color::Red => Some(31),
            Color::Green => Some(32),
            Color::Yellow => Some(33),
            Color::Blue => Some(34),
            Color::Magenta => Some(35),
            Color::Cyan => Some(36),
            Color::White => Some(37),
            Color::None => None,
        };
        if let Some(c) = color {
            codes.push(c.to_string());
        }
        format!("\\033[{}m", codes.join(";"))
    }

    /// Wrap a printf format fragment in the instruction's styling.
    fn stylish(ins: &FormatInstruction, text: &str) -> String {
        let prefix = Self::ansi_prefix(ins);
        if prefix.is_empty() {
            text.to_string()
        } else {
            format!("{}{}\\033[0m", prefix, text)
        }
    }

    fn title_name(&self, idx: usize) -> String {
        match self.plan.output.vars.get(idx).and_then(|v| v.alias()) {
            Some(a) => a.to_string(),
            None => format!("${}", idx + 1),
        }
    }

    /// The static title bar and its rule line, for pure-value outputs.
    fn title_bar(&self) -> (String, String) {
        let mut bar = String::new();
        for idx in 0..self.plan.output.vars.len() {
            bar.push_str(&self.sep);
            bar.push_str(&format!(
                "{:<width$}",
                self.title_name(idx),
                width = self.padding.max(0) as usize
            ));
        }
        bar.push_str(&self.sep);
        let rule = "-".repeat(bar.chars().count());
        (bar, rule)
    }

    // ── helper functions emitted once per program ────────────────

    /// `format_fallback_format(v)`: the per-type printf format string.
    fn gen_fallback_format(&self, w: &mut AwkWriter) {
        let f = &self.plan.format;
        let pad = self.pad_fmt();

        if let Some(num) = &f.number {
            w.chunk(
                r#"
if (is_number(rid_0)) {
  return "%[fmt]";
}
"#,
                &[("fmt", lit_escape(&Self::stylish(num, &pad)))],
            );
        }
        if let Some(st) = &f.string {
            w.chunk(
                r#"
if (is_string(rid_0)) {
  return "%[fmt]";
}
"#,
                &[("fmt", lit_escape(&Self::stylish(st, &pad)))],
            );
        }
        match &f.rest {
            Some(rest) => w.line(
                "return \"%[fmt]\";",
                &[("fmt", lit_escape(&Self::stylish(rest, &pad)))],
            ),
            None => w.line("return \"%[fmt]\";", &[("fmt", lit_escape(&pad))]),
        }
    }

    /// `format_wildcard_fallback_print(v)`: print one value with the
    /// per-type styling.
    fn gen_wildcard_fallback_print(&self, w: &mut AwkWriter) {
        let f = &self.plan.format;
        let pad = self.pad_fmt();
        let sep = fmt_escape(&self.sep);

        if let Some(num) = &f.number {
            w.chunk(
                r#"
if (is_number(rid_0)) {
  printf("%[sep]%[fmt]", rid_0);
  return;
}
"#,
                &[
                    ("sep", sep.clone()),
                    ("fmt", lit_escape(&Self::stylish(num, &pad))),
                ],
            );
        }
        if let Some(st) = &f.string {
            w.chunk(
                r#"
if (is_string(rid_0)) {
  printf("%[sep]%[fmt]", rid_0);
  return;
}
"#,
                &[
                    ("sep", sep.clone()),
                    ("fmt", lit_escape(&Self::stylish(st, &pad))),
                ],
            );
        }
        let rest = match &f.rest {
            Some(rest) => lit_escape(&Self::stylish(rest, &pad)),
            None => lit_escape(&pad),
        };
        w.line(
            "printf(\"%[sep]%[fmt]\", rid_0);",
            &[("sep", sep), ("fmt", rest)],
        );
    }

    /// `format_col_print(c, v)`: print one value with the column's
    /// instruction, falling back to the type helpers.
    fn gen_col_print(&self, w: &mut AwkWriter) {
        let f = &self.plan.format;
        let pad = self.pad_fmt();
        let sep = fmt_escape(&self.sep);

        for col in &f.columns {
            if col.ignore {
                w.chunk(
                    r#"
if (rid_0 == %[idx]) {
  return;
}
"#,
                    &[("idx", col.index.to_string())],
                );
                continue;
            }
            w.chunk(
                r#"
if (rid_0 == %[idx]) {
  printf("%[sep]%[fmt]", rid_1);
  return;
}
"#,
                &[
                    ("idx", col.index.to_string()),
                    ("sep", sep.clone()),
                    ("fmt", lit_escape(&Self::stylish(col, &pad))),
                ],
            );
        }

        if f.has_type_format() {
            w.line("format_wildcard_fallback_print(rid_1);", &[]);
        } else {
            w.line(
                "printf(\"%[sep]%[fmt]\", rid_1);",
                &[("sep", sep), ("fmt", lit_escape(&pad))],
            );
        }
    }

    fn gen_prologue(&self, w: &mut AwkWriter) {
        let title = &self.plan.format.title;
        if title.ignore {
            return;
        }

        if self.plan.output.has_table_wildcard() {
            w.chunk(
                r#"
wildcard_title_foot();
wildcard_title();
wildcard_title_foot();
"#,
                &[],
            );
            return;
        }

        let (bar, rule) = self.title_bar();
        w.line("print \"%[rule]\";", &[("rule", lit_escape(&rule))]);
        w.line(
            "printf(\"%s\\n\", \"%[title]\");",
            &[("title", lit_escape(&Self::stylish(title, &bar)))],
        );
        w.line("print \"%[rule]\";", &[("rule", lit_escape(&rule))]);
    }

    fn gen_epilogue(&self, w: &mut AwkWriter) {
        let title = &self.plan.format.title;
        if title.ignore {
            return;
        }
        if self.plan.output.has_table_wildcard() {
            w.line("wildcard_title_foot();", &[]);
            return;
        }
        let (_, rule) = self.title_bar();
        w.line("print \"%[rule]\";", &[("rule", lit_escape(&rule))]);
    }

    /// `wildcard_title()`: per-table `$N` headers, width known at END.
    fn gen_wildcard_title(&self, w: &mut AwkWriter) {
        let sep = fmt_escape(&self.sep);
        let pad = lit_escape(&self.pad_fmt());
        let cnt = w.local("cnt");
        let i = w.local("i");

        w.assign(&cnt, "1", &[]);
        for ts in &self.plan.table_scans {
            w.chunk(
                &format!(
                    r#"
for ({i} = 1; {i} <= tblfnum_{t}; {i}++) {{
  printf("{sep}{pad}", ("$" {cnt}));
  {cnt}++;
}}
"#,
                    i = i,
                    t = ts.table.index,
                    sep = sep,
                    pad = pad,
                    cnt = cnt
                ),
                &[],
            );
        }
        w.line(
            &format!("print {};", super::expr::awk_quote(&self.sep)),
            &[],
        );
    }

    /// `wildcard_title_foot()`: a dash rule sized to the live width.
    fn gen_wildcard_title_foot(&self, w: &mut AwkWriter) {
        let total = w.local("total");
        let width = w.local("width");
        let i = w.local("i");
        let line = w.local("line");

        w.assign(&total, "0", &[]);
        for ts in &self.plan.table_scans {
            w.line(
                &format!("{} += tblfnum_{};", total, ts.table.index),
                &[],
            );
        }
        w.assign(
            &width,
            &format!(
                "{} * ({} + {}) + {}",
                total,
                self.padding,
                self.sep.chars().count(),
                self.sep.chars().count()
            ),
            &[],
        );
        w.chunk(
            &format!(
                r#"
{line} = "";
for ({i} = 0; {i} < {width}; {i}++) {{
  {line} = {line} "-";
}}
print {line};
"#,
                line = line,
                i = i,
                width = width
            ),
            &[],
        );
    }

    /// Emit all format helper functions, collecting their globals.
    pub fn gen_helpers(&mut self, cg: &mut QueryCodeGen) -> Result<String, Error> {
        let mut out = String::new();

        let mut w = AwkWriter::func(1, "format_fallback_format");
        self.gen_fallback_format(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(1, "format_wildcard_fallback_print");
        self.gen_wildcard_fallback_print(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(2, "format_col_print");
        self.gen_col_print(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(0, "format_prologue");
        self.gen_prologue(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(0, "format_epilogue");
        self.gen_epilogue(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(0, "wildcard_title");
        self.gen_wildcard_title(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        let mut w = AwkWriter::func(0, "wildcard_title_foot");
        self.gen_wildcard_title_foot(&mut w);
        out.push_str(&w.flush());
        cg.collect_from(&mut w);

        Ok(out)
    }
}

impl SubGen for FormatCodeGen<'_> {
    /// `format_next(v0, ..., vn)`: one styled output row. Only the
    /// pure-value output path calls it; its parameters are the computed
    /// projection values.
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        if self.plan.output.has_table_wildcard() {
            return Ok(());
        }

        let f = &self.plan.format;
        let sep = fmt_escape(&self.sep);
        let pad = self.pad_fmt();

        for idx in 0..self.plan.output.vars.len() {
            let val = format!("rid_{}", idx);
            // per-column instruction wins, then per-type, then plain
            match f.get_column(idx + 1) {
                Some(ins) if ins.ignore => continue,
                Some(ins) => {
                    w.line(
                        "printf(\"%[sep]%[fmt]\", %[val]);",
                        &[
                            ("sep", sep.clone()),
                            ("fmt", lit_escape(&Self::stylish(ins, &pad))),
                            ("val", val),
                        ],
                    );
                }
                None if f.has_type_format() => {
                    w.line(
                        "printf(\"%[sep]\" format_fallback_format(%[val]), %[val]);",
                        &[("sep", sep.clone()), ("val", val)],
                    );
                }
                None => {
                    w.line(
                        "printf(\"%[sep]%[fmt]\", %[val]);",
                        &[
                            ("sep", sep.clone()),
                            ("fmt", lit_escape(&pad)),
                            ("val", val),
                        ],
                    );
                }
            }
        }
        w.line(
            &format!("print {};", super::expr::awk_quote(&self.sep)),
            &[],
        );
        Ok(())
    }

    fn gen_flush(&mut self, _w: &mut AwkWriter) -> Result<(), Error> {
        Ok(())
    }

    fn gen_done(&mut self, _w: &mut AwkWriter) -> Result<(), Error> {
        Ok(())
    }
}
