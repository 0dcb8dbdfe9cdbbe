//! Code generation: plan → AWK program text.
//!
//! The emitted program is a pull pipeline with a fixed skeleton: a BEGIN
//! block declaring globals, a per-line table-scan dispatch, an END block
//! driving `join()`, and one `next/flush/done` function triple per stage
//! (group-by, aggregation, having, sort, output, format). Stages absent
//! from the plan still emit pass-through triples so the chain stays
//! uniform.

mod agg;
mod expr;
mod format;
mod group_by;
mod having;
mod join;
mod output;
mod prelude;
mod sort;
mod table_scan;
mod writer;

#[cfg(test)]
mod tests;

use crate::error::Error;
use crate::plan::Plan;

use writer::{AwkWriter, GlobalVar};

/// Which AWK implementation the program is generated for. The capability
/// flags gate prelude selection and sort support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwkType {
    #[default]
    Gnu,
    GoAwk,
    Nawk,
    Mawk,
    Frawk,
    Awk,
}

impl AwkType {
    pub fn from_name(n: &str) -> Option<AwkType> {
        Some(match n {
            "gnu" | "gawk" => AwkType::Gnu,
            "goawk" => AwkType::GoAwk,
            "nawk" => AwkType::Nawk,
            "mawk" => AwkType::Mawk,
            "frawk" => AwkType::Frawk,
            "awk" => AwkType::Awk,
            _ => return None,
        })
    }

    /// A supplementary prelude for runtimes missing gawk builtins.
    fn compat_prelude(&self) -> Option<&'static str> {
        match self {
            AwkType::GoAwk => Some(prelude::GOAWK_PRELUDE),
            _ => None,
        }
    }

    /// goawk has no working `asort`/`asorti`, so ORDER BY cannot be
    /// compiled for it.
    fn supports_sort(&self) -> bool {
        !matches!(self, AwkType::GoAwk)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Text inserted between output columns when the query does not
    /// specify a border.
    pub output_separator: String,
    pub awk_type: AwkType,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_separator: " ".to_string(),
            awk_type: AwkType::default(),
        }
    }
}

/// Generate the complete AWK program for a plan.
pub fn generate(plan: &Plan, config: &Config) -> Result<String, Error> {
    if plan.has_sort() && !config.awk_type.supports_sort() {
        return Err(Error::CodeGen(
            "ORDER BY requires asort/asorti, which the goawk runtime does not provide; \
             drop the ORDER BY clause or target a different awk"
                .to_string(),
        ));
    }
    QueryCodeGen::new(plan, config).gen()
}

pub(crate) struct QueryCodeGen<'a> {
    plan: &'a Plan,
    config: &'a Config,
    globals: Vec<GlobalVar>,
}

/// Per-stage generator protocol: one writer per `next`/`flush`/`done`.
pub(crate) trait SubGen {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error>;
    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error>;
    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error>;
}

impl<'a> QueryCodeGen<'a> {
    fn new(plan: &'a Plan, config: &'a Config) -> Self {
        QueryCodeGen {
            plan,
            config,
            globals: Vec::new(),
        }
    }

    pub(crate) fn plan(&self) -> &'a Plan {
        self.plan
    }

    pub(crate) fn ts_size(&self) -> usize {
        self.plan.ts_size()
    }

    /// The column separator: an explicit FORMAT border wins over the
    /// configured output separator.
    pub(crate) fn format_sep(&self) -> String {
        if self.plan.format.border_set {
            self.plan.format.border_string().to_string()
        } else {
            self.config.output_separator.clone()
        }
    }

    pub(crate) fn padding(&self) -> i64 {
        self.plan.format.padding()
    }

    pub(crate) fn collect_from(&mut self, w: &mut AwkWriter) {
        for g in w.take_globals() {
            if !self.globals.iter().any(|x| x.name == g.name) {
                self.globals.push(g);
            }
        }
    }

    fn gen_stage(
        &mut self,
        gen: &mut dyn SubGen,
        stage: &str,
        n_next: usize,
        n_flush: usize,
        n_done: usize,
    ) -> Result<String, Error> {
        let mut buf = String::new();

        let mut w = AwkWriter::func(n_next, &format!("{}_next", stage));
        gen.gen_next(&mut w)?;
        buf.push_str(&w.flush());
        self.collect_from(&mut w);

        let mut w = AwkWriter::func(n_flush, &format!("{}_flush", stage));
        gen.gen_flush(&mut w)?;
        buf.push_str(&w.flush());
        self.collect_from(&mut w);

        let mut w = AwkWriter::func(n_done, &format!("{}_done", stage));
        gen.gen_done(&mut w)?;
        buf.push_str(&w.flush());
        self.collect_from(&mut w);

        Ok(buf)
    }

    /// Fixed globals derived from the plan shape, followed by the globals
    /// the stage writers registered on the way.
    fn gen_begin(&self) -> String {
        let mut lines = Vec::new();

        for ts in &self.plan.table_scans {
            let i = ts.table.index;
            lines.push(format!("  tbl_{}[\"\"] = 0;", i));
            lines.push(format!("  tblsize_{} = 0;", i));
            lines.push(format!("  tblfnum_{} = 0;", i));
        }
        lines.push("  agg[\"\"] = 0;".to_string());
        lines.push("  agg_count = 0;".to_string());
        if self.plan.has_group_by() {
            lines.push("  group_by[\"\"] = 0;".to_string());
            lines.push("  group_by_index[\"\"] = 0;".to_string());
        }
        if self.plan.output.distinct {
            lines.push("  distinct[\"\"] = 0;".to_string());
        }
        lines.push("  output_count = 0;".to_string());

        for g in &self.globals {
            if g.array {
                lines.push(format!("  {}[\"\"] = 0;", g.name));
            } else {
                lines.push(format!("  {} = 0;", g.name));
            }
        }

        lines.join("\n")
    }

    fn gen(mut self) -> Result<String, Error> {
        let table_scan = {
            let mut w = AwkWriter::block();
            table_scan::gen(&mut self, &mut w)?;
            let out = w.flush();
            self.collect_from(&mut w);
            out
        };

        let join = {
            let mut w = AwkWriter::new(self.ts_size(), Some("join".to_string()));
            join::gen(&mut self, &mut w)?;
            let out = w.flush();
            self.collect_from(&mut w);
            out
        };

        let n = self.ts_size();
        let group_by = {
            let mut g = group_by::GroupByCodeGen::new(self.plan);
            self.gen_stage(&mut g, "group_by", n, 0, 0)?
        };
        let agg = {
            let mut g = agg::AggCodeGen::new(self.plan);
            self.gen_stage(&mut g, "agg", n, 0, 0)?
        };
        let having = {
            let mut g = having::HavingCodeGen::new(self.plan);
            self.gen_stage(&mut g, "having", n, 0, 0)?
        };
        let sort = {
            let mut g = sort::SortCodeGen::new(self.plan);
            self.gen_stage(&mut g, "sort", n, 0, 0)?
        };
        let output = {
            let sep = self.format_sep();
            let mut g = output::OutputCodeGen::new(self.plan, sep);
            self.gen_stage(&mut g, "output", n, 0, 0)?
        };
        let format = {
            let sep = self.format_sep();
            let padding = self.padding();
            let mut g = format::FormatCodeGen::new(self.plan, sep, padding);
            let out_size = self.plan.output.vars.len();
            self.gen_stage(&mut g, "format", out_size, 0, 0)?
        };
        let format_builtin = {
            let sep = self.format_sep();
            let padding = self.padding();
            let mut fb = format::FormatCodeGen::new(self.plan, sep, padding);
            fb.gen_helpers(&mut self)?
        };

        let compat = self.config.awk_type.compat_prelude().unwrap_or("");

        log::debug!(
            "generated pipeline for {} table(s), backend {:?}",
            self.ts_size(),
            self.config.awk_type
        );

        Ok(format!(
            r#"# -----------------------------------------------------------------
# Globals
# -----------------------------------------------------------------
BEGIN {{
{begin}
}}

# -----------------------------------------------------------------
# Table Scan
# -----------------------------------------------------------------
{{
{table_scan}}}

END {{
  format_prologue();
  join();
  format_epilogue();
}}

# -----------------------------------------------------------------
# join
# -----------------------------------------------------------------
{join}
# -----------------------------------------------------------------
# group by
# -----------------------------------------------------------------
{group_by}
# -----------------------------------------------------------------
# agg
# -----------------------------------------------------------------
{agg}
# -----------------------------------------------------------------
# having
# -----------------------------------------------------------------
{having}
# -----------------------------------------------------------------
# sort
# -----------------------------------------------------------------
{sort}
# -----------------------------------------------------------------
# output
# -----------------------------------------------------------------
{output}
# -----------------------------------------------------------------
# format
# -----------------------------------------------------------------
{format}
{format_builtin}
# -----------------------------------------------------------------
# builtins
# -----------------------------------------------------------------
{builtin}
{compat}
"#,
            begin = self.gen_begin(),
            table_scan = table_scan,
            join = join,
            group_by = group_by,
            agg = agg,
            having = having,
            sort = sort,
            output = output,
            format = format,
            format_builtin = format_builtin,
            builtin = prelude::AWK_PRELUDE,
            compat = compat,
        ))
    }
}
