use crate::ast::*;
use crate::error::Error;
use crate::parser;

use super::expr_info::{proj_access_sets, ExprTableAccessInfo};
use super::*;

fn comp_ast(src: &str) -> Select {
    parser::parse(src).expect("parse error").select
}

/// Run table discovery and symbol resolution, leaving the planner open
/// for inspection.
fn prep(src: &str) -> (Planner, Select) {
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).expect("scan-table");
    p.canonicalize(&mut s).expect("canonicalize");
    p.resolve_alias(&mut s).expect("resolve-alias");
    (p, s)
}

fn prep_err(src: &str) -> Error {
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    let r = p
        .scan_table(&mut s)
        .and_then(|_| p.canonicalize(&mut s))
        .and_then(|_| p.resolve_alias(&mut s))
        .and_then(|_| p.ana_agg(&mut s))
        .and_then(|_| p.sema_check(&s));
    r.expect_err("expected a plan error")
}

fn proj_expr(s: &Select, idx: usize) -> &Expr {
    match &s.projection.vars[idx] {
        SelectVar::Col(c) => &c.value,
        SelectVar::Star(_) => panic!("projection {} is a star", idx),
    }
}

fn full_plan(src: &str) -> Plan {
    plan_code(parser::parse(src).unwrap()).expect("plan error")
}

// ── symbol resolution ────────────────────────────────────────────

#[test]
fn bare_column_resolves_against_first_table() {
    let (p, s) = prep(r#"select $1, $3 from tab("/a/b")"#);
    assert_eq!(
        proj_expr(&s, 0).can_name(),
        Some(&CanName::TableColumn {
            table: TableId::Scan(0),
            column: ColIdx::Col(1),
        })
    );
    assert_eq!(p.tables[0].max_column, Some(3));
    assert!(p.tables[0].columns.contains(&1));
    assert!(p.tables[0].columns.contains(&3));
}

#[test]
fn qualified_column_resolves_by_alias() {
    let (p, s) = prep(
        r#"select t1.$1, t2.$2 from tab("/a/1") as t1, tab("/a/2") as t2"#,
    );
    assert_eq!(
        proj_expr(&s, 0).can_name(),
        Some(&CanName::TableColumn {
            table: TableId::Scan(0),
            column: ColIdx::Col(1),
        })
    );
    assert_eq!(
        proj_expr(&s, 1).can_name(),
        Some(&CanName::TableColumn {
            table: TableId::Scan(1),
            column: ColIdx::Col(2),
        })
    );
    assert_eq!(p.tables[1].max_column, Some(2));
}

#[test]
fn wellknown_column_literals() {
    let (_, s) = prep(r#"select $nf, rownum, line from tab("/a/b")"#);
    assert_eq!(
        proj_expr(&s, 0).can_name().unwrap(),
        &CanName::TableColumn {
            table: TableId::Scan(0),
            column: ColIdx::Nf,
        }
    );
    assert_eq!(
        proj_expr(&s, 1).can_name().unwrap(),
        &CanName::TableColumn {
            table: TableId::Scan(0),
            column: ColIdx::RowNum,
        }
    );
    assert_eq!(
        proj_expr(&s, 2).can_name().unwrap(),
        &CanName::TableColumn {
            table: TableId::Scan(0),
            column: ColIdx::Col(0),
        }
    );
}

#[test]
fn unknown_table_alias_fails() {
    let e = prep_err(r#"select tx.$1 from tab("/a/b") as t1"#);
    assert!(e.to_string().contains("unknown table"), "{}", e);
}

#[test]
fn unknown_identifier_fails() {
    let e = prep_err(r#"select nosuch from tab("/a/b")"#);
    assert!(e.to_string().contains("is unknown"), "{}", e);
}

#[test]
fn duplicate_table_alias_fails() {
    let e = prep_err(r#"select $1 from tab("/a") as t, tab("/b") as t"#);
    assert!(e.to_string().contains("already existed"), "{}", e);
}

#[test]
fn duplicate_projection_alias_fails() {
    let e = prep_err(r#"select $1 as a, $2 as a from tab("/f")"#);
    assert!(e.to_string().contains("already existed"), "{}", e);
}

#[test]
fn unknown_table_type_fails() {
    let e = prep_err(r#"select $1 from spreadsheet("/f")"#);
    assert!(e.to_string().contains("unknown table type"), "{}", e);
}

#[test]
fn missing_table_path_fails() {
    let e = prep_err(r#"select $1 from tab(1)"#);
    assert!(e.to_string().contains("path must be specified"), "{}", e);
}

#[test]
fn xsv_requires_separator() {
    let e = prep_err(r#"select $1 from xsv("/f")"#);
    assert!(e.to_string().contains("separator"), "{}", e);
}

#[test]
fn too_many_tables_fails() {
    let mut from = Vec::new();
    for i in 0..=DEF_MAX_TABLE_SIZE {
        from.push(format!("tab(\"/f{}\") as t{}", i, i));
    }
    let src = format!("select $1 from {}", from.join(", "));
    let e = prep_err(&src);
    assert!(e.to_string().contains("too many tables"), "{}", e);
}

#[test]
fn alias_resolves_to_expr_with_terminus() {
    let (_, s) = prep(r#"select t1.$1 as f1 from tab("/a") as t1 where f1 > 10"#);
    let cond = &s.where_.as_ref().unwrap().cond;
    match cond {
        Expr::Binary(b) => match b.lhs.as_ref() {
            Expr::Ref(r) => {
                assert_eq!(
                    r.can_name,
                    CanName::Expr {
                        proj: 0,
                        table: Some(TableId::Scan(0)),
                        column: Some(ColIdx::Col(1)),
                    }
                );
            }
            other => panic!("expected a ref, got {:?}", other),
        },
        other => panic!("expected a binary, got {:?}", other),
    }
}

#[test]
fn alias_chain_collapses_to_terminal_column() {
    let (_, s) = prep(r#"select t1.$2 as a, a as b from tab("/a") as t1 where b > 0"#);
    let cond = &s.where_.as_ref().unwrap().cond;
    match cond {
        Expr::Binary(b) => match b.lhs.as_ref() {
            Expr::Ref(r) => match &r.can_name {
                CanName::Expr { table, column, .. } => {
                    assert_eq!(*table, Some(TableId::Scan(0)));
                    assert_eq!(*column, Some(ColIdx::Col(2)));
                }
                other => panic!("expected an alias canname, got {:?}", other),
            },
            other => panic!("expected a ref, got {:?}", other),
        },
        other => panic!("expected a binary, got {:?}", other),
    }
}

#[test]
fn alias_cycle_is_rejected() {
    let e = prep_err(r#"select a + 1 as a from tab("/f")"#);
    assert!(e.to_string().contains("cycle"), "{}", e);
}

#[test]
fn resolver_is_idempotent() {
    let src = r#"select t1.$1 as f1, $2 from tab("/a") as t1 where f1 > 10 and $2 < 5"#;
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    let snapshot = s.clone();

    // a second resolver run must not change (or panic on) settled names
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    assert_eq!(s, snapshot);
}

#[test]
fn index_suffix_is_rejected() {
    let e = prep_err(r#"select t1[0] from tab("/a") as t1"#);
    assert!(e.to_string().contains("index"), "{}", e);
}

#[test]
fn select_star_marks_all_tables_full_column() {
    let (p, _) = prep(r#"select * from tab("/a"), tab("/b")"#);
    assert!(p.tables[0].full_column);
    assert!(p.tables[1].full_column);
}

#[test]
fn table_dot_star_marks_one_table() {
    let (p, _) = prep(r#"select t2.*, t1.$1 from tab("/a") as t1, tab("/b") as t2"#);
    assert!(!p.tables[0].full_column);
    assert!(p.tables[1].full_column);
}

#[test]
fn rows_matcher_attaches_to_table() {
    let (p, s) = prep(r#"select t.rows("^a") from tab("/f") as t"#);
    let m = p.tables[0].row_matcher.as_ref().unwrap();
    assert_eq!(m.pattern, "^a");
    assert_eq!(m.kind, MatchKind::Rows);
    assert!(matches!(
        proj_expr(&s, 0).can_name().unwrap(),
        CanName::Matcher { table: Some(0), .. }
    ));
}

#[test]
fn bare_columns_matcher_applies_to_every_table() {
    let (p, _) = prep(r#"select columns("x") from tab("/a"), tab("/b")"#);
    assert!(p.tables[0].col_matcher.is_some());
    assert!(p.tables[1].col_matcher.is_some());
}

#[test]
fn invalid_matcher_pattern_fails() {
    let e = prep_err(r#"select t.rows("[") from tab("/f") as t"#);
    assert!(e.to_string().contains("invalid matcher pattern"), "{}", e);
}

// ── rewrite translation ──────────────────────────────────────────

#[test]
fn rewrite_set_targets_resolve() {
    let (p, _) = prep(
        r#"select $1 from tab("/f") rewrite when $1 > 10 then set $2 = $1, line = "x"; end"#,
    );
    let rw = p.tables[0].rewrite.as_ref().unwrap();
    assert_eq!(rw.stmts.len(), 1);
    match &rw.stmts[0].action {
        RewriteActionPlan::Set(sets) => {
            assert_eq!(sets[0].column, 2);
            assert_eq!(sets[1].column, 0);
        }
        other => panic!("expected a set action, got {:?}", other),
    }
}

#[test]
fn rewrite_nf_target_is_rejected() {
    let e = prep_err(r#"select $1 from tab("/f") rewrite when 1 then set nf = 3; end"#);
    assert!(e.to_string().contains("not an assignable column"), "{}", e);
}

// ── aggregation extraction ───────────────────────────────────────

#[test]
fn agg_extraction_rewrites_the_projection() {
    let mut s = comp_ast(r#"select min(t1.$1) from tab("/a") as t1"#);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    p.ana_agg(&mut s).unwrap();

    assert_eq!(p.agg_vars.len(), 1);
    assert_eq!(p.agg_vars[0].kind, AggKind::Min);
    assert_eq!(
        proj_expr(&s, 0).can_name().unwrap(),
        &CanName::TableColumn {
            table: TableId::Agg,
            column: ColIdx::Col(0),
        }
    );
}

#[test]
fn agg_inside_arithmetic_reads_the_agg_table() {
    // min(x)+100: the binary's left child points into the agg table
    let mut s = comp_ast(r#"select min(t1.$1) + 100 from tab("/a") as t1"#);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    p.ana_agg(&mut s).unwrap();

    assert_eq!(p.agg_vars.len(), 1);
    assert_eq!(p.agg_vars[0].kind, AggKind::Min);
    assert_eq!(print_expr(p.agg_vars[0].target()), "t1.\"$1\"");

    match proj_expr(&s, 0) {
        Expr::Binary(b) => {
            assert_eq!(
                b.lhs.can_name().unwrap(),
                &CanName::TableColumn {
                    table: TableId::Agg,
                    column: ColIdx::Col(0),
                }
            );
        }
        other => panic!("expected a binary, got {:?}", other),
    }
}

#[test]
fn agg_in_having_and_order_by_is_extracted() {
    let mut s = comp_ast(
        r#"select $1, count(*) from tab("/a") group by $1 having sum($2) > 5 order by avg($3)"#,
    );
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    p.ana_agg(&mut s).unwrap();

    let kinds: Vec<AggKind> = p.agg_vars.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![AggKind::Count, AggKind::Sum, AggKind::Avg]);
}

#[test]
fn agg_wrong_arity_fails() {
    let e = prep_err(r#"select percentile($1) from tab("/f")"#);
    assert!(e.to_string().contains("arity"), "{}", e);
    let e = prep_err(r#"select min($1, $2) from tab("/f")"#);
    assert!(e.to_string().contains("arity"), "{}", e);
}

#[test]
fn non_count_wildcard_fails() {
    let e = prep_err(r#"select min(*) from tab("/f")"#);
    assert!(e.to_string().contains("wildcard"), "{}", e);
}

// ── semantic checks ──────────────────────────────────────────────

#[test]
fn group_by_must_cover_projection() {
    let e = prep_err(r#"select $1, $3, avg($2) from tab("/f") group by $1"#);
    assert!(e.to_string().contains("must be in group by"), "{}", e);
}

#[test]
fn group_by_coverage_accepts_covered_projection() {
    let _ = full_plan(r#"select $1, avg($2) from tab("/f") group by $1"#);
}

#[test]
fn projection_must_not_mix_agg_without_group_by() {
    let e = prep_err(r#"select $1, $3, avg($2) from tab("/f")"#);
    assert!(e.to_string().contains("must be in aggregation"), "{}", e);
}

#[test]
fn wildcard_with_aggregating_having_fails() {
    let e = prep_err(r#"select * from tab("/f") group by $2 having min($3)"#);
    assert!(e.to_string().contains("wildcard"), "{}", e);
}

#[test]
fn group_by_key_with_agg_fails() {
    let e = prep_err(r#"select $1 from tab("/f") group by min($1)"#);
    assert!(e.to_string().contains("aggregation"), "{}", e);
}

#[test]
fn having_without_group_by_is_single_group() {
    let p = full_plan(r#"select count(*) from tab("/f") having count(*) > 1"#);
    assert!(p.has_agg());
    assert!(p.has_having());
    assert!(!p.has_group_by());
}

// ── early filter ─────────────────────────────────────────────────

fn early_filters(src: &str) -> (Planner, Vec<Option<String>>) {
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();

    let proj_values: Vec<Option<Expr>> = s
        .projection
        .vars
        .iter()
        .map(|v| match v {
            SelectVar::Col(c) => Some(c.value.clone()),
            SelectVar::Star(_) => None,
        })
        .collect();

    let scans = p.plan_table_scan(&s, &proj_values);
    let filters = scans
        .iter()
        .map(|t| t.filter.as_ref().map(print_expr))
        .collect();
    (p, filters)
}

#[test]
fn early_filter_unknown_function_pushes_nothing() {
    let (_, f) = early_filters(
        r#"select t1.$1 as f1, t2.$2 as f2
           from tab("/a/1") as t1, tab("/a/2") as t2
           where foo(f1, f2)"#,
    );
    assert_eq!(f, vec![None, None]);
}

#[test]
fn early_filter_static_pushes_to_every_table() {
    let (_, f) = early_filters(
        r#"select t1.$1 as f1, t2.$2 as f2
           from tab("/a/1") as t1, tab("/a/2") as t2
           where 100 != 200"#,
    );
    assert_eq!(f[0].as_deref(), Some("(100!=200)"));
    assert_eq!(f[1].as_deref(), Some("(100!=200)"));
}

#[test]
fn early_filter_and_splits_per_table() {
    let (p, f) = early_filters(
        r#"select t1.$1 as f1, t2.$2 as f2
           from tab("/a/1") as t1, tab("/a/2") as t2
           where f1 == 100 and f2 == 200"#,
    );
    assert_eq!(f[0].as_deref(), Some("($1==100)"));
    assert_eq!(f[1].as_deref(), Some("($2==200)"));
    assert_eq!(p.prune.len(), 2);
}

#[test]
fn early_filter_or_pushes_nothing() {
    let (p, f) = early_filters(
        r#"select t1.$1 as f1, t2.$2 as f2
           from tab("/a/1") as t1, tab("/a/2") as t2
           where f1 == 100 or f2 == f1"#,
    );
    assert_eq!(f, vec![None, None]);
    assert!(p.prune.is_empty());
}

#[test]
fn early_filter_mixed_and_pushes_single_side() {
    let (_, f) = early_filters(
        r#"select t1.$1 as f1, t2.$2 as f2
           from tab("/a/1") as t1, tab("/a/2") as t2
           where f1 == 100 and f2 == f1"#,
    );
    assert_eq!(f[0].as_deref(), Some("($1==100)"));
    assert_eq!(f[1], None);
}

#[test]
fn residual_drops_pushed_conjuncts() {
    let src = r#"select t1.$1 as f1, t2.$2 as f2
                 from tab("/a/1") as t1, tab("/a/2") as t2
                 where f1 == 100 and f2 == f1"#;
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    let proj_values: Vec<Option<Expr>> = s
        .projection
        .vars
        .iter()
        .map(|v| match v {
            SelectVar::Col(c) => Some(c.value.clone()),
            SelectVar::Star(_) => None,
        })
        .collect();
    let _ = p.plan_table_scan(&s, &proj_values);

    let join = p.plan_join(&s);
    let residual = join.filter().map(print_expr);
    assert_eq!(residual.as_deref(), Some("(f2==f1)"));
}

#[test]
fn residual_is_empty_when_everything_pushed() {
    let src = r#"select $1 from tab("/f") where $1 > 10"#;
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();
    let _ = p.plan_table_scan(&s, &[]);
    let join = p.plan_join(&s);
    assert!(join.filter().is_none());
}

#[test]
fn table_access_info_sees_through_aliases() {
    let src = r#"select t1.$1 + t1.$2 as s, t2.$1 as o
                 from tab("/a") as t1, tab("/b") as t2
                 where s > 5 and o < 3"#;
    let mut s = comp_ast(src);
    let mut p = Planner::new(Config::default());
    p.scan_table(&mut s).unwrap();
    p.canonicalize(&mut s).unwrap();
    p.resolve_alias(&mut s).unwrap();

    let proj_values: Vec<Option<Expr>> = s
        .projection
        .vars
        .iter()
        .map(|v| match v {
            SelectVar::Col(c) => Some(c.value.clone()),
            SelectVar::Star(_) => None,
        })
        .collect();
    let sets = proj_access_sets(&proj_values);
    assert!(sets[0].has(0) && !sets[0].has(1));
    assert!(sets[1].has(1) && !sets[1].has(0));

    let info = ExprTableAccessInfo::new(&s.where_.as_ref().unwrap().cond, &sets);
    let cond = &s.where_.as_ref().unwrap().cond;
    let set = info.set_of(cond).unwrap();
    assert!(set.has(0) && set.has(1));
}

// ── output & format planning ─────────────────────────────────────

#[test]
fn output_copies_limit_and_distinct() {
    let p = full_plan(r#"select distinct $1 from tab("/f") limit 7"#);
    assert!(p.output.distinct);
    assert_eq!(p.output.limit, Some(7));

    let p = full_plan(r#"select $1 from tab("/f")"#);
    assert!(!p.output.distinct);
    assert_eq!(p.output.limit, None);
}

#[test]
fn select_star_expands_to_table_wildcards() {
    let p = full_plan(r#"select * from tab("/a"), tab("/b")"#);
    assert!(p.output.wildcard);
    assert_eq!(p.output.vars.len(), 2);
    assert!(p.output.vars.iter().all(|v| !v.is_value()));
}

#[test]
fn default_format_is_plain() {
    let p = full_plan(r#"select $1 from tab("/f")"#);
    assert!(p.format.title.ignore);
    assert_eq!(p.format.border_string(), " ");
    assert_eq!(p.format.padding(), 16);
    assert!(!p.format.has_type_format());
}

#[test]
fn color_base_fills_type_formats() {
    let p = full_plan(r#"select $1 from tab("/f") format base = "color""#);
    assert!(!p.format.title.ignore);
    assert_eq!(p.format.title.color, Color::Blue);
    assert!(p.format.title.bold);
    assert!(p.format.number.is_some());
    assert!(p.format.string.is_some());
}

#[test]
fn format_padding_option_wins() {
    let p = full_plan(r#"select $1 from tab("/f") format padding = 8"#);
    assert_eq!(p.format.padding(), 8);
}

#[test]
fn format_column_instruction_is_indexed() {
    let p = full_plan(r#"select $1, $2 from tab("/f") format column(2) = "bold;red""#);
    let col = p.format.get_column(2).unwrap();
    assert!(col.bold);
    assert_eq!(col.color, Color::Red);
    assert!(p.format.get_column(1).is_none());
}

#[test]
fn sort_plan_records_direction() {
    let p = full_plan(r#"select $1 from tab("/f") order by $1 desc"#);
    assert!(!p.sort.as_ref().unwrap().asc);
}

#[test]
fn csv_table_uses_comma_separator() {
    let p = full_plan(r#"select $1 from csv("/f.csv")"#);
    assert_eq!(p.table_scans[0].table.field_sep().as_deref(), Some(","));
}

#[test]
fn tab_table_window_params() {
    let p = full_plan(r#"select $1 from tab("/f", "", 2, 10)"#);
    let t = &p.table_scans[0].table;
    assert_eq!(t.field_sep(), None);
    assert_eq!(t.scan_start(), Some(2));
    assert_eq!(t.scan_end(), Some(10));
}
