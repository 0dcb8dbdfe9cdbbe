//! Visitor protocol over the expression tree.
//!
//! Both walks hand out `&mut` nodes because the planner carries resolution
//! state inside the tree (CanName slots). In the pre-order walk an
//! `accept_*` hook returning `Ok(false)` prunes the subtree; the post-order
//! walk ignores the flag since children have already been visited.

use crate::ast::*;
use crate::error::Error;

#[allow(unused_variables)]
pub trait ExprVisitor {
    fn accept_const(&mut self, node: &mut Const) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_ref(&mut self, node: &mut Ref) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_primary(&mut self, node: &mut Primary) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_suffix(&mut self, node: &mut Suffix) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_unary(&mut self, node: &mut Unary) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_binary(&mut self, node: &mut Binary) -> Result<bool, Error> {
        Ok(true)
    }
    fn accept_ternary(&mut self, node: &mut Ternary) -> Result<bool, Error> {
        Ok(true)
    }
}

pub fn walk_pre_order<V: ExprVisitor>(v: &mut V, expr: &mut Expr) -> Result<(), Error> {
    match expr {
        Expr::Const(c) => {
            v.accept_const(c)?;
        }
        Expr::Ref(r) => {
            v.accept_ref(r)?;
        }
        Expr::Primary(p) => {
            if v.accept_primary(p)? {
                walk_pre_order(v, &mut p.leading)?;
                for s in &mut p.suffix {
                    walk_suffix_pre_order(v, s)?;
                }
            }
        }
        Expr::Unary(u) => {
            if v.accept_unary(u)? {
                walk_pre_order(v, &mut u.operand)?;
            }
        }
        Expr::Binary(b) => {
            if v.accept_binary(b)? {
                walk_pre_order(v, &mut b.lhs)?;
                walk_pre_order(v, &mut b.rhs)?;
            }
        }
        Expr::Ternary(t) => {
            if v.accept_ternary(t)? {
                walk_pre_order(v, &mut t.cond)?;
                walk_pre_order(v, &mut t.then)?;
                walk_pre_order(v, &mut t.alt)?;
            }
        }
    }
    Ok(())
}

fn walk_suffix_pre_order<V: ExprVisitor>(v: &mut V, suffix: &mut Suffix) -> Result<(), Error> {
    if !v.accept_suffix(suffix)? {
        return Ok(());
    }
    match &mut suffix.kind {
        SuffixKind::Call(call) => {
            for a in &mut call.args {
                walk_pre_order(v, a)?;
            }
        }
        SuffixKind::Index(e) => walk_pre_order(v, e)?,
        SuffixKind::Dot { .. } => {}
    }
    Ok(())
}

pub fn walk_post_order<V: ExprVisitor>(v: &mut V, expr: &mut Expr) -> Result<(), Error> {
    match expr {
        Expr::Const(c) => {
            v.accept_const(c)?;
        }
        Expr::Ref(r) => {
            v.accept_ref(r)?;
        }
        Expr::Primary(p) => {
            walk_post_order(v, &mut p.leading)?;
            for s in &mut p.suffix {
                walk_suffix_post_order(v, s)?;
            }
            v.accept_primary(p)?;
        }
        Expr::Unary(u) => {
            walk_post_order(v, &mut u.operand)?;
            v.accept_unary(u)?;
        }
        Expr::Binary(b) => {
            walk_post_order(v, &mut b.lhs)?;
            walk_post_order(v, &mut b.rhs)?;
            v.accept_binary(b)?;
        }
        Expr::Ternary(t) => {
            walk_post_order(v, &mut t.cond)?;
            walk_post_order(v, &mut t.then)?;
            walk_post_order(v, &mut t.alt)?;
            v.accept_ternary(t)?;
        }
    }
    Ok(())
}

fn walk_suffix_post_order<V: ExprVisitor>(v: &mut V, suffix: &mut Suffix) -> Result<(), Error> {
    match &mut suffix.kind {
        SuffixKind::Call(call) => {
            for a in &mut call.args {
                walk_post_order(v, a)?;
            }
        }
        SuffixKind::Index(e) => walk_post_order(v, e)?,
        SuffixKind::Dot { .. } => {}
    }
    v.accept_suffix(suffix)?;
    Ok(())
}
