//! Table-access analysis: a post-order walk assigning every expression
//! node the set of table indices its subtree reads. Alias references
//! contribute the access set of the projection expression they stand for.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{CanName, Expr, NodeId, Suffix, SuffixKind, TableId};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TableAccessSet(pub BTreeSet<usize>);

impl TableAccessSet {
    pub fn has(&self, tidx: usize) -> bool {
        self.0.contains(&tidx)
    }

    /// Empty set: evaluates the same regardless of any table.
    pub fn is_static(&self) -> bool {
        self.0.is_empty()
    }

    pub fn single(&self) -> bool {
        self.0.len() == 1
    }

    pub fn union(&mut self, other: &TableAccessSet) {
        self.0.extend(other.0.iter().copied());
    }
}

/// Access sets of the projection expressions, indexed by projection
/// position. Computed first so alias references can be looked through.
pub(crate) fn proj_access_sets(proj_values: &[Option<Expr>]) -> Vec<TableAccessSet> {
    fn collect(e: &Expr, proj_values: &[Option<Expr>], out: &mut TableAccessSet) {
        match e {
            Expr::Const(_) => {}
            Expr::Ref(r) => collect_can_name(&r.can_name, proj_values, out),
            Expr::Primary(p) => {
                if let CanName::TableColumn {
                    table: TableId::Scan(t),
                    ..
                } = &p.can_name
                {
                    out.0.insert(*t);
                } else {
                    collect(&p.leading, proj_values, out);
                    for s in &p.suffix {
                        collect_suffix(s, proj_values, out);
                    }
                }
            }
            Expr::Unary(u) => collect(&u.operand, proj_values, out),
            Expr::Binary(b) => {
                collect(&b.lhs, proj_values, out);
                collect(&b.rhs, proj_values, out);
            }
            Expr::Ternary(t) => {
                collect(&t.cond, proj_values, out);
                collect(&t.then, proj_values, out);
                collect(&t.alt, proj_values, out);
            }
        }
    }

    fn collect_suffix(s: &Suffix, proj_values: &[Option<Expr>], out: &mut TableAccessSet) {
        match &s.kind {
            SuffixKind::Call(c) => {
                for a in &c.args {
                    collect(a, proj_values, out);
                }
            }
            SuffixKind::Index(i) => collect(i, proj_values, out),
            SuffixKind::Dot { .. } => {}
        }
    }

    fn collect_can_name(cn: &CanName, proj_values: &[Option<Expr>], out: &mut TableAccessSet) {
        match cn {
            CanName::TableColumn {
                table: TableId::Scan(t),
                ..
            } => {
                out.0.insert(*t);
            }
            CanName::Expr { proj, .. } => {
                // alias cycles were rejected during resolution, so this
                // recursion terminates
                if let Some(Some(e)) = proj_values.get(*proj) {
                    collect(e, proj_values, out);
                }
            }
            _ => {}
        }
    }

    proj_values
        .iter()
        .map(|v| {
            let mut set = TableAccessSet::default();
            if let Some(e) = v {
                collect(e, proj_values, &mut set);
            }
            set
        })
        .collect()
}

/// Per-node table access sets for one expression tree.
pub(crate) struct ExprTableAccessInfo {
    info: HashMap<NodeId, TableAccessSet>,
}

impl ExprTableAccessInfo {
    pub fn new(root: &Expr, proj_sets: &[TableAccessSet]) -> Self {
        let mut me = ExprTableAccessInfo {
            info: HashMap::new(),
        };
        me.mark(root, proj_sets);
        me
    }

    pub fn set_of(&self, e: &Expr) -> Option<&TableAccessSet> {
        self.info.get(&e.node_id())
    }

    fn mark(&mut self, e: &Expr, proj_sets: &[TableAccessSet]) -> TableAccessSet {
        let set = match e {
            Expr::Const(_) => TableAccessSet::default(),
            Expr::Ref(r) => self.can_name_set(&r.can_name, proj_sets),
            Expr::Primary(p) => {
                if p.can_name.is_settled() {
                    self.can_name_set(&p.can_name, proj_sets)
                } else {
                    let mut set = self.mark(&p.leading, proj_sets);
                    for s in &p.suffix {
                        match &s.kind {
                            SuffixKind::Call(c) => {
                                for a in &c.args {
                                    let sub = self.mark(a, proj_sets);
                                    set.union(&sub);
                                }
                            }
                            SuffixKind::Index(i) => {
                                let sub = self.mark(i, proj_sets);
                                set.union(&sub);
                            }
                            SuffixKind::Dot { .. } => {}
                        }
                    }
                    set
                }
            }
            Expr::Unary(u) => self.mark(&u.operand, proj_sets),
            Expr::Binary(b) => {
                let mut set = self.mark(&b.lhs, proj_sets);
                let rhs = self.mark(&b.rhs, proj_sets);
                set.union(&rhs);
                set
            }
            Expr::Ternary(t) => {
                let mut set = self.mark(&t.cond, proj_sets);
                let s1 = self.mark(&t.then, proj_sets);
                let s2 = self.mark(&t.alt, proj_sets);
                set.union(&s1);
                set.union(&s2);
                set
            }
        };
        self.info.insert(e.node_id(), set.clone());
        set
    }

    fn can_name_set(&self, cn: &CanName, proj_sets: &[TableAccessSet]) -> TableAccessSet {
        match cn {
            CanName::TableColumn {
                table: TableId::Scan(t),
                ..
            } => TableAccessSet(BTreeSet::from([*t])),
            CanName::Expr { proj, .. } => {
                proj_sets.get(*proj).cloned().unwrap_or_default()
            }
            _ => TableAccessSet::default(),
        }
    }
}
