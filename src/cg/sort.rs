//! Sort stage.
//!
//! Rows are bucketed under a composite key built from `order_key`, which
//! renders numerics as fixed-width strings so lexicographic order equals
//! numeric order. `flush` sorts the key set with `asorti` and replays the
//! buffered row-id tuples into the output stage; DESC walks the sorted
//! index backwards.

use crate::error::Error;
use crate::plan::Plan;

use super::expr::gen_expr;
use super::writer::AwkWriter;
use super::SubGen;

pub(crate) struct SortCodeGen<'a> {
    plan: &'a Plan,
}

impl<'a> SortCodeGen<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        SortCodeGen { plan }
    }
}

impl SubGen for SortCodeGen<'_> {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        let sort = match &self.plan.sort {
            None => {
                w.call_pipeline_next("output");
                return Ok(());
            }
            Some(s) => s,
        };

        w.line("$[l, sort_key] = \"\";", &[]);
        for key in &sort.keys {
            w.chunk(
                r#"
$[l, expr] = %[expr];
$[l, sort_key] = sprintf("%s%s", $[l, sort_key], order_key($[l, expr]));
"#,
                &[("expr", gen_expr(self.plan, key))],
            );
        }

        let tuple = w.rid_comma_list(self.plan.ts_size());
        w.chunk(
            r#"
$[l, sort_key_idx] = 0;
if (length($[ga, sort_index][$[l, sort_key]]) == 0) {
  $[ga, sort_index][$[l, sort_key]] = 1;
  $[l, sort_key_idx] = 0;
} else {
  $[l, sort_key_idx] = $[ga, sort_index][$[l, sort_key]];
  $[ga, sort_index][$[l, sort_key]]++;
}
$[ga, sort_value][$[l, sort_key] SUBSEP $[l, sort_key_idx]] = %[tuple];
"#,
            &[("tuple", tuple)],
        );
        Ok(())
    }

    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        let sort = match &self.plan.sort {
            None => {
                w.call_pipeline_flush("output");
                return Ok(());
            }
            Some(s) => s,
        };

        w.line(
            "$[l, sort_n] = asorti($[ga, sort_index], $[ga, sort_output]);",
            &[],
        );

        let header = if sort.asc {
            "$[l, i] = 1; $[l, i] <= $[l, sort_n]; $[l, i]++"
        } else {
            "$[l, i] = $[l, sort_n]; $[l, i] >= 1; $[l, i]--"
        };
        w.for_loop(header, &[]);

        w.chunk(
            r#"
$[l, key] = $[ga, sort_output][$[l, i]];
$[l, bucket_n] = $[ga, sort_index][$[l, key]] + 0;
for ($[l, j] = 0; $[l, j] < $[l, bucket_n]; $[l, j]++) {
  $[l, tuple] = $[ga, sort_value][$[l, key] SUBSEP $[l, j]];
  split($[l, tuple], $[l, rid_list], ",");
"#,
            &[],
        );

        let n = self.plan.ts_size();
        let args = w.spread_arr("local_rid_list", 1, 1 + n);
        w.line(&format!("  output_next({});", args), &[]);
        w.line("}", &[]);

        w.end_block();
        w.call_pipeline_flush("output");
        Ok(())
    }

    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_done("output");
        Ok(())
    }
}
