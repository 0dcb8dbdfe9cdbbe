//! Per-file table scan blocks.
//!
//! One `if (FILENAME == path)` block per table. Each block applies the
//! separator setup, the row window, REWRITE clauses, the row matcher and
//! the pushed-down filter, then materializes the surviving row into the
//! in-memory table arrays and `next`s past the remaining blocks.

use crate::error::Error;
use crate::plan::TableScan;

use super::expr::{awk_quote, gen_expr};
use super::writer::AwkWriter;
use super::QueryCodeGen;

pub(crate) fn gen(cg: &mut QueryCodeGen, w: &mut AwkWriter) -> Result<(), Error> {
    let scans: &[TableScan] = &cg.plan().table_scans;
    for ts in scans {
        gen_one(cg, ts, w)?;
    }
    Ok(())
}

fn gen_one(cg: &QueryCodeGen, ts: &TableScan, w: &mut AwkWriter) -> Result<(), Error> {
    let t = &ts.table;
    let idx = t.index;

    w.if_block("FILENAME == %[path]", &[("path", awk_quote(&t.path))]);

    if let Some(fs) = t.field_sep() {
        // Workaround for AWK's dynamic-FS quirk: assigning FS only takes
        // effect from the *next* record, so the first record of the file
        // is re-split by hand with the same separator.
        w.chunk(
            r#"
if (FNR <= 1) {
  __sep_n = split($0, __sep_parts, /%[fs_re]/);
  NF = __sep_n;
  for (__sep_i = 1; __sep_i <= NF; __sep_i++) {
    $__sep_i = __sep_parts[__sep_i];
  }
}
FS = %[fs];
"#,
            &[
                ("fs_re", fs.replace('/', "\\/")),
                ("fs", awk_quote(&fs)),
            ],
        );
    }

    if let Some(start) = t.scan_start() {
        w.chunk(
            r#"
if (FNR <= %[start]) {
  next;
}
"#,
            &[("start", start.to_string())],
        );
    }
    if let Some(end) = t.scan_end() {
        w.chunk(
            r#"
if (FNR > %[end]) {
  nextfile;
}
"#,
            &[("end", end.to_string())],
        );
    }

    // REWRITE clauses run before any filtering so filters observe the
    // rewritten fields
    if let Some(rw) = &t.rewrite {
        for stmt in &rw.stmts {
            let cond = gen_expr(cg.plan(), &stmt.cond);
            match &stmt.action {
                crate::plan::RewriteActionPlan::Next => {
                    w.chunk(
                        r#"
if (%[cond]) {
  next;
}
"#,
                        &[("cond", cond)],
                    );
                }
                crate::plan::RewriteActionPlan::Set(sets) => {
                    w.if_block("%[cond]", &[("cond", cond)]);
                    // two phases: every new value is computed before any
                    // column is assigned, so later SETs observe the
                    // pre-rewrite row
                    for (k, set) in sets.iter().enumerate() {
                        let val = gen_expr(cg.plan(), &set.value);
                        w.line(
                            &format!("__rw_{} = {};", k, val),
                            &[],
                        );
                    }
                    for (k, set) in sets.iter().enumerate() {
                        w.line(&format!("${} = __rw_{};", set.column, k), &[]);
                    }
                    w.end_block();
                }
            }
        }
    }

    if let Some(m) = &t.row_matcher {
        w.chunk(
            r#"
if ($0 !~ /%[pattern]/) {
  next;
}
"#,
            &[("pattern", m.pattern.replace('/', "\\/"))],
        );
    }

    if let Some(filter) = &ts.filter {
        w.line(
            "if (!(%[filter])) next;",
            &[("filter", gen_expr(cg.plan(), filter))],
        );
    }

    // materialize the row
    w.line(&format!("row_idx = tblsize_{};", idx), &[]);
    w.line(&format!("tblsize_{}++;", idx), &[]);

    if t.full_column {
        w.line("field_cnt = NF;", &[]);
    } else {
        let max = t.max_column.unwrap_or(0);
        w.line(
            &format!("field_cnt = {} < NF ? {} : NF;", max, max),
            &[],
        );
    }
    w.chunk(
        &format!(
            r#"
if (tblfnum_{idx} < field_cnt) {{
  tblfnum_{idx} = field_cnt;
}}
for (i = 1; i <= field_cnt; i++) {{
  tbl_{idx}[row_idx, i] = $i;
}}
tbl_{idx}[row_idx, 0] = $0;
tbl_{idx}[row_idx, "NF"] = NF;
tbl_{idx}[row_idx, "rownum"] = FNR;
next;
"#,
            idx = idx
        ),
        &[],
    );

    w.end_block();
    Ok(())
}
