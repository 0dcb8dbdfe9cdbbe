//! Having stage: a filter over aggregated rows, pass-through otherwise.

use crate::error::Error;
use crate::plan::Plan;

use super::expr::gen_expr;
use super::writer::AwkWriter;
use super::SubGen;

pub(crate) struct HavingCodeGen<'a> {
    plan: &'a Plan,
}

impl<'a> HavingCodeGen<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        HavingCodeGen { plan }
    }
}

impl SubGen for HavingCodeGen<'_> {
    fn gen_next(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        if let Some(h) = &self.plan.having {
            w.line(
                "if (!(%[filter])) return;",
                &[("filter", gen_expr(self.plan, &h.filter))],
            );
        }
        w.call_pipeline_next("sort");
        Ok(())
    }

    fn gen_flush(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_flush("sort");
        Ok(())
    }

    fn gen_done(&mut self, w: &mut AwkWriter) -> Result<(), Error> {
        w.call_pipeline_done("sort");
        Ok(())
    }
}
