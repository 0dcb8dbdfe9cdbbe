mod ast;
mod cg;
mod cli;
mod error;
mod lexer;
mod like;
mod parser;
mod plan;
mod visit;

use std::fs;
use std::io::Read;
use std::process;

fn oops(stage: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("sql2awk: [{}] {}", stage, err);
    process::exit(1);
}

fn read_query(args: &cli::Args) -> String {
    if let Some(q) = &args.query {
        return q.clone();
    }
    if let Some(path) = &args.query_file {
        match fs::read_to_string(path) {
            Ok(s) => return s,
            Err(e) => oops("read query", e),
        }
    }
    let mut buf = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
        oops("read query", e);
    }
    buf
}

fn main() {
    env_logger::init();
    let args = cli::parse_args();
    let query = read_query(&args);

    let code = match parser::parse(&query) {
        Ok(c) => c,
        Err(e) => oops("parse", e),
    };

    let plan = match plan::plan_code(code) {
        Ok(p) => p,
        Err(e) => oops("plan", e),
    };

    let config = cg::Config {
        output_separator: args.output_separator.clone(),
        awk_type: args.awk_type,
    };
    let program = match cg::generate(&plan, &config) {
        Ok(p) => p,
        Err(e) => oops("code-gen", e),
    };

    match &args.output {
        None => print!("{}", program),
        Some(path) => {
            if let Err(e) = fs::write(path, &program) {
                oops("save", e);
            }
        }
    }
}
