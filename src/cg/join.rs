//! Nested-loop join.
//!
//! One `for` loop per table over its row indices; the innermost body
//! evaluates the residual filter and hands the row-id tuple to the
//! group-by stage. The downstream flush/done run only when at least one
//! joined row existed.
//!
//! The row ids are the function's own (unpassed) parameters, so `join()`
//! is invoked with no arguments and AWK zero-initializes them.

use crate::error::Error;

use super::expr::gen_expr;
use super::writer::AwkWriter;
use super::QueryCodeGen;

pub(crate) fn gen(cg: &mut QueryCodeGen, w: &mut AwkWriter) -> Result<(), Error> {
    let n = cg.ts_size();
    let found = w.local("found");

    for i in 0..n {
        w.for_loop(
            &format!("rid_{i} = 0; rid_{i} < tblsize_{i}; rid_{i}++", i = i),
            &[],
        );
    }

    if let Some(filter) = cg.plan().join.filter() {
        w.line(
            "if (!(%[filter])) continue;",
            &[("filter", gen_expr(cg.plan(), filter))],
        );
    }
    w.assign(&found, "1", &[]);
    w.line("@[pipeline_next, group_by];", &[]);

    for _ in 0..n {
        w.end_block();
    }

    w.if_block(&format!("{}", found), &[]);
    w.line("@[pipeline_flush, group_by];", &[]);
    w.line("@[pipeline_done, group_by];", &[]);
    w.end_block();

    Ok(())
}
