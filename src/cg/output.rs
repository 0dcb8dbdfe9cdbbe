//! Output stage.
//!
//! Applies LIMIT and DISTINCT, computes the projection values, and routes
//! them into the format stage. Three shapes: pure-value projections call
//! `format_next` with the computed locals; projections containing any
//! wildcard or matcher iterate the stored table columns through
//! `format_col_print`.

use crate::error::Error;
use crate::plan::{OutputVar, Plan};

use super::expr::{awk_quote, gen_expr};
use super::writer::AwkWriter;
use super::SubGen;

pub(crate) struct OutputCodeGen<'a> {
    plan: &'a Plan,
    sep: String,
}

impl<'a> OutputCodeGen<'a> {
    pub fn new(plan: &'a Plan, sep: String) -> Self {
        OutputCodeGen { plan, sep }
    }

    fn gen_limit(&self, w: &mut AwkWriter) {
        if let Some(limit) = self.plan.output.limit {
            w.chunk(
                r#"
if (output_count >= %[limit]) {
  return;
}
"#,
                &[("limit", limit.to_string())],
            );
        }
    }

    /// Compute every value projection into a string local.
    fn gen_calc(&self, w: &mut AwkWriter) {
        for (idx, var) in self.plan.output.vars.iter().enumerate() {
            if let OutputVar::Value { value, .. } = var {
                let local = w.local_n("val", idx);
                w.assign(
                    &local,
                    &format!("({}\"\")", gen_expr(self.plan, value)),
                    &[],
                );
            }
        }
    }

    fn gen_distinct(&self, w: &mut AwkWriter) {
        if !self.plan.output.distinct {
            return;
        }

        let key = w.local("dkey");
        w.assign(&key, "\"\"", &[]);
        for (idx, var) in self.plan.output.vars.iter().enumerate() {
            match var {
                OutputVar::Value { .. } => {
                    w.assign(
                        &key,
                        &format!("{} SUBSEP local_val_{}", key, idx),
                        &[],
                    );
                }
                OutputVar::TableWildcard { table, .. }
                | OutputVar::RowMatch { table, .. }
                | OutputVar::ColMatch { table, .. } => {
                    let c = w.local("dcol");
                    w.chunk(
                        &format!(
                            r#"
for ({c} = 1; {c} <= tblfnum_{t}; {c}++) {{
  {key} = {key} SUBSEP tbl_{t}[rid_{t}, {c}];
}}
"#,
                            c = c,
                            t = table,
                            key = key
                        ),
                        &[],
                    );
                }
            }
        }

        w.chunk(
            r#"
if (distinct[%[key]] == "") {
  distinct[%[key]] = "Y";
} else {
  return;
}
"#,
            &[("key", key)],
        );
    }

    fn gen_emit(&self, w: &mut AwkWriter) {
        let all_values = self.plan.output.vars.iter().all(|v| v.is_value());

        if all_values {
            let args: Vec<String> = (0..self.plan.output.vars.len())
                .map(|i| format!("local_val_{}", i))
                .collect();
            w.call("format_next", &args);
            return;
        }

        for (idx, var) in self.plan.output.vars.iter().enumerate() {
            match var {
                OutputVar::Value { .. } => {
                    w.call(
                        "format_col_print",
                        &[(idx + 1).to_string(), format!("local_val_{}", idx)],
                    );
                }
                OutputVar::TableWildcard { table, .. } | OutputVar::RowMatch { table, .. } => {
                    let c = w.local("col");
                    w.chunk(
                        &format!(
                            r#"
for ({c} = 1; {c} <= tblfnum_{t}; {c}++) {{
  format_col_print({c}, tbl_{t}[rid_{t}, {c}]);
}}
"#,
                            c = c,
                            t = table
                        ),
                        &[],
                    );
                }
                OutputVar::ColMatch { table, pattern, .. } => {
                    let c = w.local("col");
                    w.chunk(
                        &format!(
                            r#"
for ({c} = 1; {c} <= tblfnum_{t}; {c}++) {{
  if (tbl_{t}[rid_{t}, {c}] ~ /{re}/) {{
    format_col_print({c}, tbl_{t}[rid_{t}, {c}]);
  }}
}}
"#,
                            c = c,
                            t = table,
                            re = pattern.replace('/', "\\/")
                        ),
                        &[],
                    );
                }
            }
        }
        w.line(&format!("print {};", awk_quote(&self.sep)), &[]);
    }
}

impl SubGen for OutputCodeGen<'_> {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        self.gen_limit(w);
        self.gen_calc(w);
        self.gen_distinct(w);
        w.line("output_count++;", &[]);
        self.gen_emit(w);
        Ok(())
    }

    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_flush("format");
        Ok(())
    }

    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_done("format");
        Ok(())
    }
}
