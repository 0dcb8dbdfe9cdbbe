use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sql2awk::cg::Config;
use sql2awk::{parser, plan};

const SIMPLE_SCAN: &str = r#"select $1 from tab("access.log") where $1 > 10"#;

const GROUPED: &str = r#"
select $1, count(*), avg($3)
from tab("access.log")
group by $1
having count(*) > 5
order by $1 desc
limit 100
"#;

const JOINED: &str = r#"
select t1.$1, t2.$2, sum(t1.$3)
from tab("orders.tsv") as t1, tab("users.tsv") as t2
where t1.$2 == t2.$1 and t1.$3 > 0
group by t1.$1, t2.$2
"#;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_simple", |b| {
        b.iter(|| parser::parse(black_box(SIMPLE_SCAN)).unwrap())
    });
    c.bench_function("parse_grouped", |b| {
        b.iter(|| parser::parse(black_box(GROUPED)).unwrap())
    });
}

fn bench_plan(c: &mut Criterion) {
    c.bench_function("plan_joined", |b| {
        b.iter(|| {
            let code = parser::parse(black_box(JOINED)).unwrap();
            plan::plan_code(code).unwrap()
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    let config = Config::default();
    c.bench_function("compile_simple", |b| {
        b.iter(|| sql2awk::compile(black_box(SIMPLE_SCAN), &config).unwrap())
    });
    c.bench_function("compile_grouped", |b| {
        b.iter(|| sql2awk::compile(black_box(GROUPED), &config).unwrap())
    });
    c.bench_function("compile_joined", |b| {
        b.iter(|| sql2awk::compile(black_box(JOINED), &config).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_plan, bench_compile);
criterion_main!(benches);
