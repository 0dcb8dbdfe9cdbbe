use std::env;
use std::process;

use crate::cg::AwkType;

#[derive(Debug)]
pub struct Args {
    /// Query text from the command line, if given.
    pub query: Option<String>,
    /// Read the query from this file instead.
    pub query_file: Option<String>,
    /// Write the generated program here; stdout when absent.
    pub output: Option<String>,
    pub awk_type: AwkType,
    pub output_separator: String,
}

pub fn parse_args() -> Args {
    let argv: Vec<String> = env::args().skip(1).collect();

    let mut query: Option<String> = None;
    let mut query_file: Option<String> = None;
    let mut output: Option<String> = None;
    let mut awk_type = AwkType::Gnu;
    let mut output_separator = " ".to_string();

    let mut i = 0;
    while i < argv.len() {
        let arg = &argv[i];

        if arg == "-o" || arg == "--output" {
            i += 1;
            if i >= argv.len() {
                eprintln!("sql2awk: {} requires an argument", arg);
                process::exit(1);
            }
            output = Some(argv[i].clone());
        } else if arg == "-f" || arg == "--file" {
            i += 1;
            if i >= argv.len() {
                eprintln!("sql2awk: {} requires an argument", arg);
                process::exit(1);
            }
            query_file = Some(argv[i].clone());
        } else if arg == "--awk" {
            i += 1;
            if i >= argv.len() {
                eprintln!("sql2awk: --awk requires an argument");
                process::exit(1);
            }
            awk_type = parse_awk_type(&argv[i]);
        } else if let Some(rest) = arg.strip_prefix("--awk=") {
            awk_type = parse_awk_type(rest);
        } else if arg == "-s" || arg == "--separator" {
            i += 1;
            if i >= argv.len() {
                eprintln!("sql2awk: {} requires an argument", arg);
                process::exit(1);
            }
            output_separator = argv[i].clone();
        } else if arg == "-h" || arg == "--help" {
            print_usage();
            process::exit(0);
        } else if arg == "--version" {
            println!("sql2awk {}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        } else if arg.starts_with('-') && arg.len() > 1 {
            eprintln!("sql2awk: unknown option: {}", arg);
            print_usage();
            process::exit(1);
        } else if query.is_none() {
            query = Some(arg.clone());
        } else {
            eprintln!("sql2awk: unexpected argument: {}", arg);
            process::exit(1);
        }
        i += 1;
    }

    Args {
        query,
        query_file,
        output,
        awk_type,
        output_separator,
    }
}

fn parse_awk_type(name: &str) -> AwkType {
    match AwkType::from_name(name) {
        Some(t) => t,
        None => {
            eprintln!(
                "sql2awk: unknown awk type: {} (expect gnu, goawk, nawk, mawk, frawk, awk)",
                name
            );
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"usage: sql2awk [options] [query]

Compile a SQL-like query into an AWK program. The query is taken from the
command line, from --file, or from stdin.

options:
  -o, --output FILE     write the generated program to FILE (default stdout)
  -f, --file FILE       read the query from FILE
      --awk TYPE        target awk: gnu, goawk, nawk, mawk, frawk, awk
  -s, --separator SEP   output column separator (default single space)
  -h, --help            show this help
      --version         show version

example:
  sql2awk 'select $1, count(*) from tab("access.log") group by $1' | gawk -f - access.log
"#
    );
}
