//! The AWK function writer.
//!
//! Tracks indentation, the uniform row-id parameter tuple, deduplicated
//! locals (AWK's calling convention puts locals at the tail of the
//! parameter list) and globals (hoisted into the program's BEGIN block),
//! and implements the small template language every stage generator
//! writes through:
//!
//! | prefix | meaning |
//! |--------|---------|
//! | `%[name, arg…]`  | context substitution; `%(text)` args are literal |
//! | `@[instr, arg…]` | writer instruction (`pipeline_next/flush/done`)  |
//! | `#[known, arg…]` | well-known name (`rid` with an index)            |
//! | `$[kind, name [, idx]]` | declare a `g`/`ga`/`l` variable          |
//!
//! Substitution is single pass; a missing `%` context variable is a
//! programming bug in the stage generator and panics with a diagnostic.

use std::collections::HashSet;

/// Context for `%[...]` substitution.
pub(crate) type Ctx<'a> = [(&'a str, String)];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GlobalVar {
    pub name: String,
    pub array: bool,
}

pub(crate) struct AwkWriter {
    func_name: Option<String>,
    param: usize,
    indent: usize,
    buf: String,
    local: Vec<String>,
    local_index: HashSet<String>,
    global: Vec<GlobalVar>,
    global_index: HashSet<String>,
}

impl AwkWriter {
    pub fn new(param: usize, func_name: impl Into<Option<String>>) -> Self {
        AwkWriter {
            func_name: func_name.into(),
            param,
            indent: 1,
            buf: String::new(),
            local: Vec::new(),
            local_index: HashSet::new(),
            global: Vec::new(),
            global_index: HashSet::new(),
        }
    }

    pub fn func(param: usize, name: &str) -> Self {
        Self::new(param, Some(name.to_string()))
    }

    /// A writer for top-level blocks (no function wrapper).
    pub fn block() -> Self {
        Self::new(0, None)
    }

    // ── variable bookkeeping ─────────────────────────────────────

    fn local_var_name(name: &str, idx: Option<usize>) -> String {
        match idx {
            None => format!("local_{}", name),
            Some(i) => format!("local_{}_{}", name, i),
        }
    }

    fn global_var_name(name: &str) -> String {
        format!("global_{}", name)
    }

    pub fn local(&mut self, name: &str) -> String {
        self.local_at(name, None)
    }

    pub fn local_n(&mut self, name: &str, idx: usize) -> String {
        self.local_at(name, Some(idx))
    }

    fn local_at(&mut self, name: &str, idx: Option<usize>) -> String {
        let n = Self::local_var_name(name, idx);
        if self.local_index.insert(n.clone()) {
            self.local.push(n.clone());
        }
        n
    }

    pub fn global(&mut self, name: &str) -> String {
        self.global_at(name, false)
    }

    pub fn global_n(&mut self, name: &str, idx: usize) -> String {
        self.global_at(&format!("{}_{}", name, idx), false)
    }

    pub fn global_array(&mut self, name: &str) -> String {
        self.global_at(name, true)
    }

    pub fn global_array_n(&mut self, name: &str, idx: usize) -> String {
        self.global_at(&format!("{}_{}", name, idx), true)
    }

    fn global_at(&mut self, name: &str, array: bool) -> String {
        let n = Self::global_var_name(name);
        if self.global_index.insert(n.clone()) {
            self.global.push(GlobalVar {
                name: n.clone(),
                array,
            });
        }
        n
    }

    pub fn take_globals(&mut self) -> Vec<GlobalVar> {
        std::mem::take(&mut self.global)
    }

    pub fn rid(&self, i: usize) -> String {
        assert!(i < self.param, "invalid rid index {}", i);
        format!("rid_{}", i)
    }

    fn pipeline_call_params(&self) -> Vec<String> {
        (0..self.param).map(|i| format!("rid_{}", i)).collect()
    }

    /// `rid_0 "," rid_1 ...`: the row-id tuple as an AWK string
    /// expression with comma separators, splittable on the other side.
    pub fn rid_comma_list(&self, n: usize) -> String {
        let mut parts = Vec::new();
        for i in 0..n {
            parts.push(format!("rid_{}", i));
        }
        parts.join(" \",\" ")
    }

    /// `name[from], name[from+1], ..., name[to-1]`
    pub fn spread_arr(&self, name: &str, from: usize, to: usize) -> String {
        let mut parts = Vec::new();
        for i in from..to {
            parts.push(format!("{}[{}]", name, i));
        }
        parts.join(", ")
    }

    // ── template substitution ────────────────────────────────────

    fn lookup<'a>(ctx: &'a Ctx, key: &str) -> Option<&'a str> {
        ctx.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn process_sub_cmd(&self, parts: &[&str], ctx: &Ctx) -> String {
        let mut out: Vec<String> = Vec::new();
        for (idx, raw) in parts.iter().enumerate() {
            if idx > 0 && raw.starts_with("%(") && raw.ends_with(')') {
                out.push(raw[2..raw.len() - 1].to_string());
                continue;
            }
            match Self::lookup(ctx, raw) {
                Some(v) => out.push(v.to_string()),
                None => panic!("template variable({}) is not found", raw),
            }
        }
        out.join("_")
    }

    fn process_ins_cmd(&self, parts: &[&str]) -> String {
        match parts[0] {
            "pipeline_next" => {
                assert!(parts.len() == 2, "pipeline_next: invalid argument");
                format!(
                    "{}_next({})",
                    parts[1],
                    self.pipeline_call_params().join(", ")
                )
            }
            "pipeline_flush" => {
                assert!(parts.len() == 2, "pipeline_flush: invalid argument");
                format!("{}_flush()", parts[1])
            }
            "pipeline_done" => {
                assert!(parts.len() == 2, "pipeline_done: invalid argument");
                format!("{}_done()", parts[1])
            }
            other => panic!("unknown writer instruction {}", other),
        }
    }

    fn process_svar_cmd(&self, parts: &[&str]) -> String {
        match parts[0] {
            "rid" => {
                assert!(parts.len() == 2, "rid: invalid argument");
                let idx: usize = parts[1]
                    .parse()
                    .expect("rid argument must be an index/integer");
                format!("rid_{}", idx)
            }
            other => panic!("unknown well-known name {}", other),
        }
    }

    fn process_var_cmd(&mut self, parts: &[&str]) -> String {
        match parts[0] {
            "g" | "global" => {
                assert!(parts.len() == 2, "global declaration takes one name");
                self.global(parts[1])
            }
            "ga" => {
                assert!(parts.len() == 2, "global array declaration takes one name");
                self.global_array(parts[1])
            }
            "l" | "local" => match parts.len() {
                2 => self.local(parts[1]),
                3 => {
                    let idx: usize = parts[2]
                        .parse()
                        .expect("local index must be a non-negative integer");
                    self.local_n(parts[1], idx)
                }
                _ => panic!("local declaration takes a name and an optional index"),
            },
            other => panic!("unknown variable kind {} in $ expression", other),
        }
    }

    fn sub_line(&mut self, line: &str, ctx: &Ctx) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if !matches!(c, '%' | '@' | '#' | '$') || chars.get(i + 1) != Some(&'[') {
                out.push(c);
                i += 1;
                continue;
            }

            let close = chars[i + 2..]
                .iter()
                .position(|&x| x == ']')
                .unwrap_or_else(|| panic!("expect ']' to finish the {} template command", c));
            let inner: String = chars[i + 2..i + 2 + close].iter().collect();
            let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
            assert!(!parts.is_empty(), "template command needs a name");

            match c {
                '%' => out.push_str(&self.process_sub_cmd(&parts, ctx)),
                '@' => out.push_str(&self.process_ins_cmd(&parts)),
                '#' => out.push_str(&self.process_svar_cmd(&parts)),
                '$' => out.push_str(&self.process_var_cmd(&parts)),
                _ => unreachable!(),
            }
            i += 2 + close + 1;
        }
        out
    }

    // ── emission ─────────────────────────────────────────────────

    pub fn line(&mut self, line: &str, ctx: &Ctx) {
        let sub = self.sub_line(line, ctx);
        self.buf.push_str(&"  ".repeat(self.indent));
        self.buf.push_str(&sub);
        self.buf.push('\n');
    }

    /// Emit a multi-line template; relative indentation inside the chunk
    /// is preserved under the writer's current indent.
    pub fn chunk(&mut self, chunk: &str, ctx: &Ctx) {
        for l in chunk.trim_matches('\n').split('\n') {
            self.line(l, ctx);
        }
    }

    pub fn call(&mut self, name: &str, args: &[String]) {
        let line = format!("{}({});", name, args.join(", "));
        self.line(&line, &[]);
    }

    pub fn call_pipeline_next(&mut self, name: &str) {
        let params = self.pipeline_call_params();
        self.call(&format!("{}_next", name), &params);
    }

    pub fn call_pipeline_flush(&mut self, name: &str) {
        self.call(&format!("{}_flush", name), &[]);
    }

    pub fn call_pipeline_done(&mut self, name: &str) {
        self.call(&format!("{}_done", name), &[]);
    }

    pub fn assign(&mut self, var: &str, val: &str, ctx: &Ctx) {
        let line = format!("{} = {};", var, val);
        self.line(&line, ctx);
    }

    pub fn for_loop(&mut self, header: &str, ctx: &Ctx) {
        let line = format!("for ({}) {{", header);
        self.line(&line, ctx);
        self.indent += 1;
    }

    pub fn if_block(&mut self, cond: &str, ctx: &Ctx) {
        let line = format!("if ({}) {{", cond);
        self.line(&line, ctx);
        self.indent += 1;
    }

    pub fn end_block(&mut self) {
        self.indent -= 1;
        self.line("}", &[]);
    }

    /// Materialize the function. AWK's parameter list cannot span lines,
    /// so parameters and locals all sit on the signature line.
    pub fn flush(&self) -> String {
        let name = match &self.func_name {
            None => return self.buf.clone(),
            Some(n) => n,
        };

        let mut sig: Vec<String> = (0..self.param).map(|i| format!("rid_{}", i)).collect();
        sig.extend(self.local.iter().cloned());

        format!("function {}({}) {{\n{}}}\n", name, sig.join(", "), self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_signature_has_params_then_locals() {
        let mut w = AwkWriter::func(2, "having_next");
        let v = w.local("val");
        w.assign(&v, "1", &[]);
        let out = w.flush();
        assert!(out.starts_with("function having_next(rid_0, rid_1, local_val) {"));
        assert!(out.contains("  local_val = 1;\n"));
    }

    #[test]
    fn block_writer_has_no_wrapper() {
        let mut w = AwkWriter::block();
        w.line("x = 1;", &[]);
        assert_eq!(w.flush(), "  x = 1;\n");
    }

    #[test]
    fn percent_substitution() {
        let mut w = AwkWriter::func(0, "f");
        w.line("if (!(%[filter])) return;", &[("filter", "a == b".to_string())]);
        assert!(w.flush().contains("if (!(a == b)) return;"));
    }

    #[test]
    fn percent_literal_args_bypass_lookup() {
        let mut w = AwkWriter::func(0, "f");
        w.line("x = %[v, %(suffix)];", &[("v", "name".to_string())]);
        assert!(w.flush().contains("x = name_suffix;"));
    }

    #[test]
    #[should_panic(expected = "is not found")]
    fn percent_missing_variable_is_fatal() {
        let mut w = AwkWriter::func(0, "f");
        w.line("%[nope]", &[]);
    }

    #[test]
    fn pipeline_instructions() {
        let mut w = AwkWriter::func(2, "f");
        w.line("@[pipeline_next, group_by];", &[]);
        w.line("@[pipeline_flush, agg];", &[]);
        w.line("@[pipeline_done, agg];", &[]);
        let out = w.flush();
        assert!(out.contains("group_by_next(rid_0, rid_1);"));
        assert!(out.contains("agg_flush();"));
        assert!(out.contains("agg_done();"));
    }

    #[test]
    fn well_known_rid() {
        let mut w = AwkWriter::func(3, "f");
        w.line("x = #[rid, 2];", &[]);
        assert!(w.flush().contains("x = rid_2;"));
    }

    #[test]
    fn dollar_declarations_register() {
        let mut w = AwkWriter::func(0, "f");
        w.line("$[l, key] = $[g, counter] $[ga, buckets][1];", &[]);
        let out = w.flush();
        assert!(out.contains("local_key = global_counter global_buckets[1];"));
        assert!(out.starts_with("function f(local_key)"));
        let globals = w.take_globals();
        assert_eq!(
            globals,
            vec![
                GlobalVar {
                    name: "global_counter".to_string(),
                    array: false
                },
                GlobalVar {
                    name: "global_buckets".to_string(),
                    array: true
                },
            ]
        );
    }

    #[test]
    fn locals_are_deduplicated() {
        let mut w = AwkWriter::func(0, "f");
        w.local("x");
        w.local("x");
        w.local_n("v", 0);
        w.local_n("v", 0);
        assert!(w.flush().starts_with("function f(local_x, local_v_0)"));
    }

    #[test]
    fn rid_comma_list_builds_tuple_expr() {
        let w = AwkWriter::func(2, "f");
        assert_eq!(w.rid_comma_list(2), "rid_0 \",\" rid_1");
        assert_eq!(w.rid_comma_list(1), "rid_0");
    }
}
