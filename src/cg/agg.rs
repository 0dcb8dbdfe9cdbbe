//! Aggregation stage.
//!
//! One accumulator per extracted aggregation variable. `next` evaluates
//! the target into a local and combines it; `flush` finalizes the
//! accumulators into the `agg` result array, resets them, and forwards
//! the row-id tuple captured from the last `next` call so downstream
//! stages can still address the originating rows.

use crate::error::Error;
use crate::plan::{AggKind, AggVar, Plan};

use super::expr::gen_expr;
use super::writer::AwkWriter;
use super::SubGen;

pub(crate) struct AggCodeGen<'a> {
    plan: &'a Plan,
}

impl<'a> AggCodeGen<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        AggCodeGen { plan }
    }

    fn vars(&self) -> &[AggVar] {
        self.plan.agg.as_ref().map(|a| &a.vars[..]).unwrap_or(&[])
    }

    fn gen_min(&self, idx: usize, w: &mut AwkWriter) {
        let var = w.global_n("agg_val", idx);
        w.chunk(
            r#"
if (%[var] == "") {
  %[var] = %[tmp];
} else if (%[var] > %[tmp]) {
  %[var] = %[tmp];
}
"#,
            &[("var", var), ("tmp", format!("local_agg_tmp_{}", idx))],
        );
    }

    fn gen_max(&self, idx: usize, w: &mut AwkWriter) {
        let var = w.global_n("agg_val", idx);
        w.chunk(
            r#"
if (%[var] == "") {
  %[var] = %[tmp];
} else if (%[var] < %[tmp]) {
  %[var] = %[tmp];
}
"#,
            &[("var", var), ("tmp", format!("local_agg_tmp_{}", idx))],
        );
    }

    fn gen_sum(&self, idx: usize, w: &mut AwkWriter) {
        let var = w.global_n("agg_val", idx);
        w.chunk(
            r#"
if (%[var] == "") {
  %[var] = (%[tmp]+0.0);
} else {
  %[var] += (%[tmp]+0.0);
}
"#,
            &[("var", var), ("tmp", format!("local_agg_tmp_{}", idx))],
        );
    }

    fn gen_percentile(&self, idx: usize, w: &mut AwkWriter) {
        let arr = w.global_array_n("agg_pct", idx);
        w.line(
            "%[arr][agg_count] = kv_make(order_key(%[tmp]), %[tmp]);",
            &[("arr", arr), ("tmp", format!("local_agg_tmp_{}", idx))],
        );
    }

    fn gen_histogram(&self, idx: usize, w: &mut AwkWriter) {
        let arr = w.global_array_n("agg_hist", idx);
        w.line(
            "%[arr][agg_count] = (%[tmp]+0.0);",
            &[("arr", arr), ("tmp", format!("local_agg_tmp_{}", idx))],
        );
    }

    fn finalize(&self, idx: usize, v: &AggVar, w: &mut AwkWriter) -> Result<(), Error> {
        match v.kind {
            AggKind::Min | AggKind::Max | AggKind::Sum => {
                let var = w.global_n("agg_val", idx);
                w.assign(&format!("agg[{}]", idx), &var, &[]);
                w.assign(&var, "\"\"", &[]);
            }
            AggKind::Avg => {
                let var = w.global_n("agg_val", idx);
                w.assign(
                    &format!("agg[{}]", idx),
                    &format!("({}+0.0)/agg_count", var),
                    &[],
                );
                w.assign(&var, "\"\"", &[]);
            }
            AggKind::Count => {
                w.assign(&format!("agg[{}]", idx), "agg_count", &[]);
            }
            AggKind::Percentile => {
                let rank = v.param_int(1).ok_or_else(|| {
                    Error::CodeGen(
                        "percentile requires a constant integer rank parameter".to_string(),
                    )
                })?;
                let arr = w.global_array_n("agg_pct", idx);
                w.assign(
                    &format!("agg[{}]", idx),
                    &format!("agg_percentile({}, {})", arr, rank),
                    &[],
                );
                w.line(&format!("clear_array({});", arr), &[]);
            }
            AggKind::Histogram => {
                let minv = v.param_num(1).ok_or_else(|| {
                    Error::CodeGen("histogram requires a constant min parameter".to_string())
                })?;
                let maxv = v.param_num(2).ok_or_else(|| {
                    Error::CodeGen("histogram requires a constant max parameter".to_string())
                })?;
                let bins = v.param_int(3).ok_or_else(|| {
                    Error::CodeGen(
                        "histogram requires a constant bin-count parameter".to_string(),
                    )
                })?;
                let arr = w.global_array_n("agg_hist", idx);
                w.assign(
                    &format!("agg[{}]", idx),
                    &format!(
                        "agg_histogram({}, 1, agg_count, {}, {}, {}, \":\")",
                        arr, minv, maxv, bins
                    ),
                    &[],
                );
                w.line(&format!("clear_array({});", arr), &[]);
            }
        }
        Ok(())
    }
}

impl SubGen for AggCodeGen<'_> {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.line("agg_count++;", &[]);

        // capture the representative row-id tuple for the flush forward
        for i in 0..self.plan.ts_size() {
            let g = w.global_n("agg_rid", i);
            let rid = w.rid(i);
            w.assign(&g, &rid, &[]);
        }

        let vars: Vec<AggVar> = self.vars().to_vec();
        for (idx, v) in vars.iter().enumerate() {
            // count() never reads its argument
            if v.kind == AggKind::Count {
                continue;
            }
            let tmp = w.local_n("agg_tmp", idx);
            w.assign(&tmp, &gen_expr(self.plan, v.target()), &[]);
        }
        for (idx, v) in vars.iter().enumerate() {
            match v.kind {
                AggKind::Min => self.gen_min(idx, w),
                AggKind::Max => self.gen_max(idx, w),
                AggKind::Sum | AggKind::Avg => self.gen_sum(idx, w),
                AggKind::Count => {}
                AggKind::Percentile => self.gen_percentile(idx, w),
                AggKind::Histogram => self.gen_histogram(idx, w),
            }
        }
        Ok(())
    }

    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        let vars: Vec<AggVar> = self.vars().to_vec();
        for (idx, v) in vars.iter().enumerate() {
            self.finalize(idx, v, w)?;
        }

        let args: Vec<String> = (0..self.plan.ts_size())
            .map(|i| w.global_n("agg_rid", i))
            .collect();
        w.line("agg_count = 0;", &[]);
        w.call("having_next", &args);
        Ok(())
    }

    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_flush("having");
        w.call_pipeline_done("having");
        Ok(())
    }
}
