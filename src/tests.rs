//! End-to-end compilation tests: query text in, AWK program text out.
//! Execution of the generated programs belongs to the external harness;
//! these tests pin down the program structure each query family produces.

use crate::cg::{AwkType, Config};
use crate::compile;

fn gen(src: &str) -> String {
    compile(src, &Config::default()).expect("compile error")
}

fn gen_err(src: &str) -> String {
    compile(src, &Config::default())
        .expect_err("expected a compile error")
        .to_string()
}

// ── single-table scans ───────────────────────────────────────────

#[test]
fn filtered_single_column_scan() {
    // select $1 from tab("f") where $1 > 10: the filter is pushed into
    // the scan so non-matching rows are never materialized
    let out = gen(r#"select $1 from tab("f") where $1 > 10"#);
    assert!(out.contains("if (FILENAME == \"f\") {"));
    assert!(out.contains("if (!(($1 > 10))) next;"));
    assert!(out.contains("format_next(local_val_0);"));
    // pipeline handoff order survives into the emitted text
    let join = out.find("function join(").unwrap();
    let scan = out.find("if (FILENAME == \"f\") {").unwrap();
    assert!(scan < join);
}

#[test]
fn count_rows() {
    let out = gen(r#"select count(*) from tab("f")"#);
    assert!(out.contains("agg_count++;"));
    assert!(out.contains("agg[0] = agg_count;"));
    assert!(out.contains("having_next(global_agg_rid_0);"));
}

#[test]
fn group_by_with_sum() {
    let out = gen(r#"select $1, sum($2) from tab("f") group by $1"#);
    // the group key is stringified and bucketed
    assert!(out.contains("local_gb_expr_0 = ((tbl_0[rid_0, 1])\"\");"));
    assert!(out.contains("group_by_index[sprintf(\"%s:%d\", local_gb_key, local_gb_idx)]"));
    // the accumulator is a float sum
    assert!(out.contains("global_agg_val_0 += (local_agg_tmp_0+0.0);"));
}

// ── joins ────────────────────────────────────────────────────────

#[test]
fn two_table_inner_join() {
    let out = gen(
        r#"select t1.$1, t2.$1 from tab("f1") as t1, tab("f2") as t2
           where t1.$1 == t2.$1"#,
    );
    assert!(out.contains("if (FILENAME == \"f1\") {"));
    assert!(out.contains("if (FILENAME == \"f2\") {"));
    assert!(out.contains("for (rid_0 = 0; rid_0 < tblsize_0; rid_0++) {"));
    assert!(out.contains("for (rid_1 = 0; rid_1 < tblsize_1; rid_1++) {"));
    assert!(out.contains("if (!((tbl_0[rid_0, 1] == tbl_1[rid_1, 1]))) continue;"));
    assert!(out.contains("group_by_next(rid_0, rid_1);"));
}

#[test]
fn join_filter_splits_between_scan_and_join() {
    let out = gen(
        r#"select t1.$1, t2.$1 from tab("f1") as t1, tab("f2") as t2
           where t1.$2 == 100 and t1.$1 == t2.$1"#,
    );
    // the single-table half runs in the scan
    assert!(out.contains("if (!(($2 == 100))) next;"));
    // the cross-table half stays in the join
    assert!(out.contains("if (!((tbl_0[rid_0, 1] == tbl_1[rid_1, 1]))) continue;"));
}

// ── ordering and limits ──────────────────────────────────────────

#[test]
fn order_by_desc_with_limit() {
    let out = gen(r#"select $1 from tab("f") order by $1 desc limit 2"#);
    assert!(out.contains("asorti(global_sort_index, global_sort_output);"));
    assert!(out.contains("for (local_i = local_sort_n; local_i >= 1; local_i--) {"));
    assert!(out.contains("if (output_count >= 2) {"));
}

#[test]
fn limit_guard_precedes_output() {
    let out = gen(r#"select $1 from tab("f") limit 10"#);
    let guard = out.find("if (output_count >= 10)").unwrap();
    let bump = out.find("output_count++;").unwrap();
    assert!(guard < bump);
}

#[test]
fn distinct_dedups_before_printing() {
    let out = gen(r#"select distinct $1, $2 from tab("f")"#);
    let dedup = out.find("distinct[local_dkey] = \"Y\";").unwrap();
    let emit = out.find("format_next(").unwrap();
    assert!(dedup < emit);
}

// ── wildcards ────────────────────────────────────────────────────

#[test]
fn select_star_prints_every_stored_column() {
    let out = gen(r#"select * from tab("f")"#);
    assert!(out.contains("field_cnt = NF;"));
    assert!(out.contains("for (local_col = 1; local_col <= tblfnum_0; local_col++) {"));
}

#[test]
fn select_star_from_two_tables() {
    let out = gen(r#"select * from tab("a"), tab("b")"#);
    assert!(out.contains("tblfnum_0"));
    assert!(out.contains("tblfnum_1"));
}

// ── error surface ────────────────────────────────────────────────

#[test]
fn lex_error_carries_position() {
    let e = gen_err("select \"unterminated");
    assert!(e.contains("1:"), "{}", e);
}

#[test]
fn parse_error_carries_position() {
    let e = gen_err("select $1 from");
    assert!(e.contains(":"), "{}", e);
}

#[test]
fn plan_error_names_the_stage() {
    let e = gen_err(r#"select nosuch from tab("f")"#);
    assert!(e.starts_with("stage(resolve-symbol)"), "{}", e);
}

#[test]
fn sema_error_for_uncovered_projection() {
    let e = gen_err(r#"select $1, $3, avg($2) from tab("f") group by $1"#);
    assert!(e.starts_with("stage(sema)"), "{}", e);
}

#[test]
fn goawk_with_order_by_is_rejected() {
    let config = Config {
        awk_type: AwkType::GoAwk,
        ..Default::default()
    };
    let err = compile(r#"select $1 from tab("f") order by $1"#, &config)
        .expect_err("goawk must reject ORDER BY");
    assert!(err.to_string().contains("asort"));
}

// ── whole-program sanity ─────────────────────────────────────────

#[test]
fn braces_balance_in_generated_programs() {
    for src in [
        r#"select $1 from tab("f") where $1 > 10"#,
        r#"select count(*) from tab("f")"#,
        r#"select $1, sum($2) from tab("f") group by $1 having sum($2) > 3"#,
        r#"select t1.$1, t2.$1 from tab("a") as t1, tab("b") as t2 where t1.$1 == t2.$1"#,
        r#"select $1 from tab("f") order by $1 desc limit 2"#,
        r#"select distinct * from tab("f") format base = "color", title = true"#,
        r#"select $1 from csv("x.csv") rewrite when $1 == "" then next; end"#,
        r#"select percentile($1, 95), histogram($2, 0, 10, 5) from tab("f")"#,
    ] {
        let out = gen(src);
        let mut depth: i64 = 0;
        let mut in_str = false;
        let mut prev = '\0';
        for c in out.chars() {
            match c {
                '"' if prev != '\\' => in_str = !in_str,
                '{' if !in_str => depth += 1,
                '}' if !in_str => depth -= 1,
                _ => {}
            }
            assert!(depth >= 0, "unbalanced braces for {}", src);
            prev = if prev == '\\' && c == '\\' { '\0' } else { c };
        }
        assert_eq!(depth, 0, "unbalanced braces for {}", src);
        assert!(!in_str, "unbalanced quotes for {}", src);
    }
}

#[test]
fn every_pipeline_call_has_a_definition() {
    let out = gen(r#"select $1, count(*) from tab("f") group by $1 order by $1"#);
    for stage in ["group_by", "agg", "having", "sort", "output", "format"] {
        for part in ["next", "flush", "done"] {
            let name = format!("{}_{}", stage, part);
            assert!(
                out.contains(&format!("function {}(", name)),
                "missing definition of {}",
                name
            );
        }
    }
    // helpers referenced by the emitted code are all defined
    for helper in [
        "format_prologue",
        "format_epilogue",
        "format_col_print",
        "order_key",
    ] {
        assert!(
            out.contains(&format!("function {}(", helper)),
            "missing helper {}",
            helper
        );
    }
}
