pub mod ast;
pub mod cg;
pub mod cli;
pub mod error;
pub mod lexer;
pub mod like;
pub mod parser;
pub mod plan;
pub mod visit;

#[cfg(test)]
mod tests;

use error::Error;

/// Compile one SELECT statement into a complete AWK program.
pub fn compile(src: &str, config: &cg::Config) -> Result<String, Error> {
    let code = parser::parse(src)?;
    let plan = plan::plan_code(code)?;
    cg::generate(&plan, config)
}
