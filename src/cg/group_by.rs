//! Group-by stage.
//!
//! A hash stage: the key tuple is evaluated per row, stringified, and
//! joined with SUBSEP; `group_by[key]` holds the group multiplicity and
//! `group_by_index[key ":" i]` the comma-joined row-id tuple of the i-th
//! member. `flush` walks the groups and replays each member into the
//! aggregation stage, flushing once per group.
//!
//! Without grouping keys the stage is transparent; if the plan also has
//! no aggregation, every row is its own group and is flushed eagerly.

use crate::error::Error;
use crate::plan::Plan;

use super::expr::gen_expr_as_str;
use super::writer::AwkWriter;
use super::SubGen;

pub(crate) struct GroupByCodeGen<'a> {
    plan: &'a Plan,
}

impl<'a> GroupByCodeGen<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        GroupByCodeGen { plan }
    }

    fn per_item_group(&self) -> bool {
        !self.plan.has_group_by() && !self.plan.has_agg()
    }
}

impl SubGen for GroupByCodeGen<'_> {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        let group_by = match &self.plan.group_by {
            None => {
                w.call_pipeline_next("agg");
                if self.per_item_group() {
                    w.call_pipeline_flush("agg");
                }
                return Ok(());
            }
            Some(g) => g,
        };

        for (idx, key) in group_by.keys.iter().enumerate() {
            let v = w.local_n("gb_expr", idx);
            w.assign(&v, &gen_expr_as_str(self.plan, key), &[]);
        }

        let parts: Vec<String> = (0..group_by.keys.len())
            .map(|i| format!("local_gb_expr_{}", i))
            .collect();
        let key = w.local("gb_key");
        w.assign(&key, &parts.join(" SUBSEP "), &[]);

        w.local("gb_idx");
        w.chunk(
            r#"
if (group_by[local_gb_key] == "") {
  group_by[local_gb_key] = 1;
  local_gb_idx = 0;
} else {
  local_gb_idx = group_by[local_gb_key];
  group_by[local_gb_key]++;
}
"#,
            &[],
        );

        let tuple = w.rid_comma_list(self.plan.ts_size());
        w.line(
            "group_by_index[sprintf(\"%s:%d\", local_gb_key, local_gb_idx)] = %[tuple];",
            &[("tuple", tuple)],
        );
        Ok(())
    }

    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        if self.plan.group_by.is_none() {
            if !self.per_item_group() {
                w.call_pipeline_flush("agg");
            }
            return Ok(());
        }

        let n = self.plan.ts_size();
        w.local("gb_key");
        w.local("gb_cnt");
        w.local("gb_i");
        w.local("gb_val");
        w.local("gb_sep");

        w.chunk(
            r#"
for (local_gb_key in group_by) {
  local_gb_cnt = group_by[local_gb_key];
  for (local_gb_i = 0; local_gb_i < local_gb_cnt; local_gb_i++) {
    local_gb_val = group_by_index[sprintf("%s:%d", local_gb_key, local_gb_i)];
    split(local_gb_val, local_gb_sep, ",");
"#,
            &[],
        );

        let args: Vec<String> = (1..=n)
            .map(|i| format!("local_gb_sep[{}]", i))
            .collect();
        w.line(&format!("    agg_next({});", args.join(", ")), &[]);

        w.chunk(
            r#"
  }
  agg_flush();
}
"#,
            &[],
        );
        Ok(())
    }

    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_done("agg");
        Ok(())
    }
}
