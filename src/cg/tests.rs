use super::*;
use crate::parser;
use crate::plan::plan_code;

fn gen(src: &str) -> String {
    gen_with(src, &Config::default())
}

fn gen_with(src: &str, config: &Config) -> String {
    let plan = plan_code(parser::parse(src).expect("parse error")).expect("plan error");
    generate(&plan, config).expect("codegen error")
}

#[test]
fn skeleton_has_every_stage() {
    let out = gen(r#"select $1 from tab("/f")"#);
    assert!(out.contains("BEGIN {"));
    assert!(out.contains("END {"));
    assert!(out.contains("function join("));
    for stage in ["group_by", "agg", "having", "sort", "output", "format"] {
        for part in ["next", "flush", "done"] {
            assert!(
                out.contains(&format!("function {}_{}(", stage, part)),
                "missing {}_{}",
                stage,
                part
            );
        }
    }
    assert!(out.contains("format_prologue();"));
    assert!(out.contains("format_epilogue();"));
}

#[test]
fn table_scan_dispatches_on_filename() {
    let out = gen(r#"select $1 from tab("/data/x") "#);
    assert!(out.contains("if (FILENAME == \"/data/x\") {"));
    assert!(out.contains("tbl_0[row_idx, i] = $i;"));
    assert!(out.contains("tbl_0[row_idx, \"NF\"] = NF;"));
    assert!(out.contains("tbl_0[row_idx, \"rownum\"] = FNR;"));
}

#[test]
fn pushed_filter_lands_in_the_scan_block() {
    let out = gen(r#"select $1 from tab("/f") where $1 > 10"#);
    assert!(out.contains("if (!(($1 > 10))) next;"), "{}", out);
    // the whole condition was pushed, so the join has no residual
    assert!(!out.contains("continue;"), "{}", out);
}

#[test]
fn residual_filter_guards_the_join() {
    let out = gen(
        r#"select t1.$1, t2.$1 from tab("/a") as t1, tab("/b") as t2
           where t1.$1 == t2.$1"#,
    );
    assert!(out.contains(
        "if (!((tbl_0[rid_0, 1] == tbl_1[rid_1, 1]))) continue;"
    ));
    assert!(out.contains("group_by_next(rid_0, rid_1);"));
}

#[test]
fn join_nests_one_loop_per_table() {
    let out = gen(r#"select t1.$1, t2.$2 from tab("/a") as t1, tab("/b") as t2"#);
    assert!(out.contains("for (rid_0 = 0; rid_0 < tblsize_0; rid_0++) {"));
    assert!(out.contains("for (rid_1 = 0; rid_1 < tblsize_1; rid_1++) {"));
    assert!(out.contains("group_by_flush();"));
    assert!(out.contains("group_by_done();"));
}

#[test]
fn group_by_keys_use_subsep() {
    let out = gen(r#"select $1, count(*) from tab("/f") group by $1"#);
    assert!(out.contains("local_gb_expr_0 = ((tbl_0[rid_0, 1])\"\");"));
    assert!(out.contains("group_by[local_gb_key]"));
    assert!(out.contains("agg_next(local_gb_sep[1]);"));
    assert!(out.contains("agg_flush();"));
}

#[test]
fn count_reads_the_row_counter() {
    let out = gen(r#"select count(*) from tab("/f")"#);
    assert!(out.contains("agg_count++;"));
    assert!(out.contains("agg[0] = agg_count;"));
}

#[test]
fn min_max_track_extremes_with_first_observation_guard() {
    let out = gen(r#"select min($1), max($2) from tab("/f")"#);
    assert!(out.contains("if (global_agg_val_0 == \"\") {"));
    assert!(out.contains("} else if (global_agg_val_0 > local_agg_tmp_0) {"));
    assert!(out.contains("} else if (global_agg_val_1 < local_agg_tmp_1) {"));
}

#[test]
fn avg_divides_by_count_at_flush() {
    let out = gen(r#"select avg($1) from tab("/f")"#);
    assert!(out.contains("agg[0] = (global_agg_val_0+0.0)/agg_count;"));
}

#[test]
fn percentile_buckets_through_kv_order_keys() {
    let out = gen(r#"select percentile($1, 90) from tab("/f")"#);
    assert!(out
        .contains("global_agg_pct_0[agg_count] = kv_make(order_key(local_agg_tmp_0), local_agg_tmp_0);"));
    assert!(out.contains("agg[0] = agg_percentile(global_agg_pct_0, 90);"));
    assert!(out.contains("clear_array(global_agg_pct_0);"));
}

#[test]
fn histogram_passes_constant_bins() {
    let out = gen(r#"select histogram($1, 0, 100, 10) from tab("/f")"#);
    assert!(out.contains("agg[0] = agg_histogram(global_agg_hist_0, 1, agg_count, 0, 100, 10, \":\");"));
}

#[test]
fn agg_forwards_saved_row_ids() {
    let out = gen(r#"select count(*) from tab("/f")"#);
    assert!(out.contains("global_agg_rid_0 = rid_0;"));
    assert!(out.contains("having_next(global_agg_rid_0);"));
}

#[test]
fn having_filters_before_forwarding() {
    // the projection count() is agg slot 0, the having count() slot 1
    let out = gen(r#"select count(*) from tab("/f") having count(*) > 2"#);
    assert!(out.contains("if (!((agg[1] > 2))) return;"));
    assert!(out.contains("sort_next(rid_0);"));
}

#[test]
fn limit_short_circuits_output() {
    let out = gen(r#"select $1 from tab("/f") limit 2"#);
    assert!(out.contains("if (output_count >= 2) {"));
    assert!(out.contains("output_count++;"));
}

#[test]
fn distinct_uses_an_associative_set() {
    let out = gen(r#"select distinct $1 from tab("/f")"#);
    assert!(out.contains("if (distinct[local_dkey] == \"\") {"));
    assert!(out.contains("distinct[local_dkey] = \"Y\";"));
}

#[test]
fn sort_orders_through_asorti() {
    let out = gen(r#"select $1 from tab("/f") order by $1"#);
    assert!(out.contains("order_key(local_expr)"));
    assert!(out.contains("asorti(global_sort_index, global_sort_output);"));
    assert!(out.contains("for (local_i = 1; local_i <= local_sort_n; local_i++) {"));
    assert!(out.contains("output_next(local_rid_list[1]);"));
}

#[test]
fn sort_desc_walks_backwards() {
    let out = gen(r#"select $1 from tab("/f") order by $1 desc limit 2"#);
    assert!(out.contains("for (local_i = local_sort_n; local_i >= 1; local_i--) {"));
}

#[test]
fn goawk_rejects_order_by() {
    let plan = plan_code(
        parser::parse(r#"select $1 from tab("/f") order by $1"#).unwrap(),
    )
    .unwrap();
    let config = Config {
        awk_type: AwkType::GoAwk,
        ..Default::default()
    };
    let err = generate(&plan, &config).expect_err("goawk must reject ORDER BY");
    assert!(err.to_string().contains("asort"), "{}", err);
}

#[test]
fn goawk_gets_the_compat_prelude() {
    let out = gen_with(
        r#"select $1 from tab("/f")"#,
        &Config {
            awk_type: AwkType::GoAwk,
            ..Default::default()
        },
    );
    assert!(out.contains("function typeof(obj,"));
    assert!(out.contains("function asorti(a, b, c)"));

    let plain = gen(r#"select $1 from tab("/f")"#);
    assert!(!plain.contains("function typeof(obj,"));
}

#[test]
fn prelude_is_always_embedded() {
    let out = gen(r#"select $1 from tab("/f")"#);
    for f in [
        "function agg_percentile(",
        "function agg_histogram(",
        "function order_key(",
        "function array_join(",
        "function is_number(",
        "function is_null(",
        "function like2r(",
        "function kv_make(",
    ] {
        assert!(out.contains(f), "prelude misses {}", f);
    }
}

#[test]
fn wildcard_iterates_stored_columns() {
    let out = gen(r#"select * from tab("/f")"#);
    assert!(out.contains("field_cnt = NF;"));
    assert!(out.contains("for (local_col = 1; local_col <= tblfnum_0; local_col++) {"));
    assert!(out.contains("format_col_print(local_col, tbl_0[rid_0, local_col]);"));
}

#[test]
fn narrow_scan_stores_only_referenced_columns() {
    let out = gen(r#"select $2 from tab("/f")"#);
    assert!(out.contains("field_cnt = 2 < NF ? 2 : NF;"));
}

#[test]
fn fs_workaround_resplits_the_first_record() {
    let out = gen(r#"select $1 from csv("/f.csv")"#);
    assert!(out.contains("FS = \",\";"));
    assert!(out.contains("split($0, __sep_parts, /,/);"));
}

#[test]
fn scan_window_limits_rows() {
    let out = gen(r#"select $1 from tab("/f", "", 1, 100)"#);
    assert!(out.contains("if (FNR <= 1) {"));
    assert!(out.contains("if (FNR > 100) {"));
    assert!(out.contains("nextfile;"));
}

#[test]
fn rewrite_computes_before_assigning() {
    let out = gen(
        r#"select $1 from tab("/f") rewrite
           when $1 > 10 then set $1 = $2, $2 = $1;
           when $2 == 0 then next;
           end"#,
    );
    let set_pos = out.find("__rw_0 = $2;").expect("first phase");
    assert!(out.contains("__rw_1 = $1;"));
    let assign_pos = out.find("$1 = __rw_0;").expect("second phase");
    assert!(set_pos < assign_pos);
    assert!(out.contains("if (($2 == 0)) {"));
}

#[test]
fn row_matcher_filters_in_the_scan() {
    let out = gen(r#"select t.rows("^err") from tab("/f") as t"#);
    assert!(out.contains("if ($0 !~ /^err/) {"));
}

#[test]
fn col_matcher_filters_at_output() {
    let out = gen(r#"select t.columns("^x") from tab("/f") as t"#);
    assert!(out.contains("if (tbl_0[rid_0, local_col] ~ /^x/) {"));
}

#[test]
fn like_with_dynamic_operand_uses_the_runtime_helper() {
    let out = gen(r#"select $1 from tab("/f") where $1 like $2"#);
    assert!(out.contains("like2r("));
}

#[test]
fn like_with_literal_is_a_static_regex() {
    let out = gen(r#"select $1 from tab("/f") where $1 like "a%""#);
    assert!(out.contains("($1 ~ \"^[a].*$\")"), "{}", out);
}

#[test]
fn alias_emission_inlines_the_projection() {
    let out = gen(r#"select $1 + 1 as v from tab("/f") order by v"#);
    // the sort key reads the aliased expression, parenthesized
    assert!(out.contains("local_expr = ((tbl_0[rid_0, 1] + 1));"));
}

#[test]
fn builtin_function_mapping() {
    let out = gen(r#"select string_format("%d", $1), bit_and($1, 7) from tab("/f")"#);
    assert!(out.contains("sprintf(\"%d\", tbl_0[rid_0, 1])"));
    assert!(out.contains("and(tbl_0[rid_0, 1], 7)"));
}

#[test]
fn unknown_function_gets_the_user_prefix() {
    let out = gen(r#"select trim($1) from tab("/f")"#);
    assert!(out.contains("sql2awk_trim(tbl_0[rid_0, 1])"));
}

#[test]
fn prelude_functions_keep_their_names() {
    let out = gen(r#"select cast($1, "int") from tab("/f") where is_null($2)"#);
    assert!(out.contains("cast(tbl_0[rid_0, 1], \"int\")"));
    assert!(out.contains("is_null($2)"));
}

#[test]
fn color_format_emits_ansi_escapes() {
    let out = gen(r#"select $1 from tab("/f") format base = "color""#);
    assert!(out.contains("\\033["));
    assert!(out.contains("\\033[0m"));
    // title enabled by the color base
    assert!(out.contains("function format_prologue() {\n  print"));
}

#[test]
fn plain_format_suppresses_the_title() {
    let out = gen(r#"select $1 from tab("/f")"#);
    assert!(out.contains("function format_prologue() {\n}"));
}

#[test]
fn format_next_prints_padded_columns() {
    let out = gen(r#"select $1, $2 from tab("/f")"#);
    assert!(out.contains("printf(\" %-16s\", rid_0);"));
    assert!(out.contains("printf(\" %-16s\", rid_1);"));
    assert!(out.contains("format_next(local_val_0, local_val_1);"));
}

#[test]
fn wildcard_title_helpers_are_emitted() {
    let out = gen(r#"select * from tab("/f") format title = true"#);
    assert!(out.contains("function wildcard_title("));
    assert!(out.contains("wildcard_title_foot();"));
}

#[test]
fn begin_declares_table_and_writer_globals() {
    let out = gen(r#"select $1 from tab("/f") order by $1"#);
    assert!(out.contains("tbl_0[\"\"] = 0;"));
    assert!(out.contains("tblsize_0 = 0;"));
    assert!(out.contains("output_count = 0;"));
    assert!(out.contains("global_sort_index[\"\"] = 0;"));
    assert!(out.contains("global_sort_value[\"\"] = 0;"));
}

#[test]
fn separator_config_is_honored() {
    let out = gen_with(
        r#"select $1 from tab("/f")"#,
        &Config {
            output_separator: "|".to_string(),
            ..Default::default()
        },
    );
    assert!(out.contains("printf(\"|%-16s\", rid_0);"));
}

#[test]
fn format_border_wins_over_separator_config() {
    let out = gen_with(
        r#"select $1 from tab("/f") format border = ";""#,
        &Config {
            output_separator: "|".to_string(),
            ..Default::default()
        },
    );
    assert!(out.contains("printf(\";%-16s\", rid_0);"));
    assert!(!out.contains("printf(\"|%-16s\", rid_0);"));
}
