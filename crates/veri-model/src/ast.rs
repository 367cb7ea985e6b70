// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Resolved expressions and statements.
//!
//! Expressions are immutable and shared via `Rc`; every node carries its resolved type and
//! location. Rewriting produces new trees (see the substitution engine of the backend).

use crate::model::{CtorRef, FieldId, FunId, Loc, MethodId, QualifiedId, FuelAnnotation};
use crate::ty::Type;
use num::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

pub type Exp = Rc<ExpData>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpData {
    pub kind: ExpKind,
    pub ty: Type,
    #[serde(default)]
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(BigInt),
    /// Decimal literal, kept in its textual form.
    Real(String),
    Char(char),
    BitVector { value: BigInt, width: u32 },
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    /// `|e|` of a set, multiset, sequence or map.
    Cardinality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Iff,
    Imp,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Membership in a collection (or key membership for maps).
    In,
    NotIn,
    Disjoint,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Iff | BinaryOp::Imp | BinaryOp::And | BinaryOp::Or)
    }

    /// Whether the operator yields a boolean.
    pub fn is_predicate(self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantKind {
    Forall,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InductionHint {
    /// Induct on every bound variable of inductive type.
    All,
    /// Induct on the named bound variables.
    Vars(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundVar {
    pub name: String,
    pub ty: Type,
}

impl BoundVar {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub ctor: CtorRef,
    /// One variable per constructor formal.
    pub vars: Vec<BoundVar>,
    pub body: Exp,
}

/// A frame expression: an object, a set or sequence of objects, optionally restricted to one
/// field (`o`f`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameExp {
    pub exp: Exp,
    #[serde(default)]
    pub field: Option<QualifiedId<FieldId>>,
}

impl FrameExp {
    pub fn new(exp: Exp) -> Self {
        Self { exp, field: None }
    }
}

/// A pre/postcondition or invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecExp {
    pub exp: Exp,
    /// Free clauses are assumed and never checked.
    #[serde(default)]
    pub free: bool,
    /// The clause was inherited from an overridden declaration and verified there.
    #[serde(default)]
    pub inherited: bool,
}

impl SpecExp {
    pub fn checked(exp: Exp) -> Self {
        Self {
            exp,
            free: false,
            inherited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpKind {
    Value(Value),
    LocalVar(String),
    This,
    FieldSelect {
        obj: Exp,
        field: QualifiedId<FieldId>,
    },
    Destructor {
        obj: Exp,
        ctor: CtorRef,
        index: usize,
    },
    ArrayLength {
        array: Exp,
        dim: usize,
    },
    /// `s[i]` on sequences, maps, multisets and one-dimensional arrays.
    Select {
        collection: Exp,
        index: Exp,
    },
    /// `a[i, j, ..]` on multi-dimensional arrays.
    ArraySelect {
        array: Exp,
        indices: Vec<Exp>,
    },
    SeqSlice {
        seq: Exp,
        lo: Option<Exp>,
        hi: Option<Exp>,
    },
    /// `s[i := v]` on sequences, maps and multisets.
    Update {
        collection: Exp,
        index: Exp,
        value: Exp,
    },
    SetDisplay(Vec<Exp>),
    MultiSetDisplay(Vec<Exp>),
    SeqDisplay(Vec<Exp>),
    MapDisplay(Vec<(Exp, Exp)>),
    FunctionCall {
        fun: QualifiedId<FunId>,
        receiver: Option<Exp>,
        type_args: Vec<Type>,
        args: Vec<Exp>,
    },
    /// Application of a first-class function value.
    Apply {
        fun: Exp,
        args: Vec<Exp>,
    },
    DatatypeValue {
        ctor: CtorRef,
        type_args: Vec<Type>,
        args: Vec<Exp>,
    },
    DatatypeTest {
        obj: Exp,
        ctor: CtorRef,
    },
    Old(Exp),
    Fresh(Exp),
    Allocated(Exp),
    Unary {
        op: UnaryOp,
        operand: Exp,
    },
    /// Numeric conversion to the type of the node.
    Conversion(Exp),
    Binary {
        op: BinaryOp,
        lhs: Exp,
        rhs: Exp,
    },
    Ite {
        cond: Exp,
        then: Exp,
        els: Exp,
    },
    Let {
        vars: Vec<BoundVar>,
        rhss: Vec<Exp>,
        body: Exp,
    },
    Quantifier {
        kind: QuantKind,
        vars: Vec<BoundVar>,
        range: Option<Exp>,
        body: Exp,
        #[serde(default)]
        triggers: Vec<Vec<Exp>>,
        #[serde(default)]
        induction: Option<InductionHint>,
    },
    /// `set x | range :: term`; the term defaults to the single bound variable.
    SetComprehension {
        finite: bool,
        vars: Vec<BoundVar>,
        range: Exp,
        term: Option<Exp>,
    },
    MapComprehension {
        finite: bool,
        var: BoundVar,
        range: Exp,
        term: Exp,
    },
    Lambda {
        vars: Vec<BoundVar>,
        requires: Option<Exp>,
        reads: Vec<FrameExp>,
        body: Exp,
    },
    Match {
        source: Exp,
        cases: Vec<MatchCase>,
    },
}

// ================================================================================================
// Constructors

impl ExpData {
    pub fn new(kind: ExpKind, ty: Type, loc: Loc) -> Exp {
        Rc::new(ExpData { kind, ty, loc })
    }

    pub fn bool_const(b: bool) -> Exp {
        Self::new(ExpKind::Value(Value::Bool(b)), Type::Bool, Loc::default())
    }

    pub fn int_const(n: i64) -> Exp {
        Self::new(
            ExpKind::Value(Value::Int(BigInt::from(n))),
            Type::Int,
            Loc::default(),
        )
    }

    pub fn null(ty: Type) -> Exp {
        Self::new(ExpKind::Value(Value::Null), ty, Loc::default())
    }

    pub fn local(name: &str, ty: Type) -> Exp {
        Self::new(ExpKind::LocalVar(name.to_string()), ty, Loc::default())
    }

    pub fn this(ty: Type) -> Exp {
        Self::new(ExpKind::This, ty, Loc::default())
    }

    pub fn field_select(obj: Exp, field: QualifiedId<FieldId>, ty: Type) -> Exp {
        Self::new(ExpKind::FieldSelect { obj, field }, ty, Loc::default())
    }

    pub fn call(fun: QualifiedId<FunId>, args: Vec<Exp>, ty: Type) -> Exp {
        Self::new(
            ExpKind::FunctionCall {
                fun,
                receiver: None,
                type_args: vec![],
                args,
            },
            ty,
            Loc::default(),
        )
    }

    pub fn unary(op: UnaryOp, operand: Exp) -> Exp {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg => operand.ty.clone(),
            UnaryOp::Cardinality => Type::Int,
        };
        Self::new(ExpKind::Unary { op, operand }, ty, Loc::default())
    }

    pub fn not(operand: Exp) -> Exp {
        Self::unary(UnaryOp::Not, operand)
    }

    pub fn binary(op: BinaryOp, lhs: Exp, rhs: Exp) -> Exp {
        let ty = if op.is_predicate() {
            Type::Bool
        } else {
            lhs.ty.clone()
        };
        let loc = lhs.loc;
        Self::new(ExpKind::Binary { op, lhs, rhs }, ty, loc)
    }

    pub fn and(lhs: Exp, rhs: Exp) -> Exp {
        Self::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(lhs: Exp, rhs: Exp) -> Exp {
        Self::binary(BinaryOp::Or, lhs, rhs)
    }

    pub fn implies(lhs: Exp, rhs: Exp) -> Exp {
        Self::binary(BinaryOp::Imp, lhs, rhs)
    }

    pub fn eq(lhs: Exp, rhs: Exp) -> Exp {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn ite(cond: Exp, then: Exp, els: Exp) -> Exp {
        let ty = then.ty.clone();
        Self::new(ExpKind::Ite { cond, then, els }, ty, Loc::default())
    }

    pub fn forall(vars: Vec<BoundVar>, range: Option<Exp>, body: Exp) -> Exp {
        Self::new(
            ExpKind::Quantifier {
                kind: QuantKind::Forall,
                vars,
                range,
                body,
                triggers: vec![],
                induction: None,
            },
            Type::Bool,
            Loc::default(),
        )
    }

    /// Conjunction of all expressions, `true` if empty.
    pub fn and_all(exps: impl IntoIterator<Item = Exp>) -> Exp {
        exps.into_iter()
            .reduce(Self::and)
            .unwrap_or_else(|| Self::bool_const(true))
    }

    /// Returns a copy of this node at the given location.
    pub fn at(&self, loc: Loc) -> Exp {
        Rc::new(ExpData {
            kind: self.kind.clone(),
            ty: self.ty.clone(),
            loc,
        })
    }
}

// ================================================================================================
// Queries

impl ExpData {
    pub fn as_bool_const(&self) -> Option<bool> {
        match &self.kind {
            ExpKind::Value(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExpKind::Value(_))
    }

    /// Immediate sub-expressions, excluding frame and trigger expressions.
    pub fn children(&self) -> Vec<&Exp> {
        use ExpKind::*;
        match &self.kind {
            Value(_) | LocalVar(_) | This => vec![],
            FieldSelect { obj, .. } | Destructor { obj, .. } | DatatypeTest { obj, .. } => {
                vec![obj]
            }
            ArrayLength { array, .. } => vec![array],
            Select { collection, index } => vec![collection, index],
            ArraySelect { array, indices } => std::iter::once(array).chain(indices).collect(),
            SeqSlice { seq, lo, hi } => std::iter::once(seq)
                .chain(lo.iter())
                .chain(hi.iter())
                .collect(),
            Update {
                collection,
                index,
                value,
            } => vec![collection, index, value],
            SetDisplay(es) | MultiSetDisplay(es) | SeqDisplay(es) => es.iter().collect(),
            MapDisplay(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),
            FunctionCall { receiver, args, .. } => receiver.iter().chain(args).collect(),
            Apply { fun, args } => std::iter::once(fun).chain(args).collect(),
            DatatypeValue { args, .. } => args.iter().collect(),
            Old(e) | Fresh(e) | Allocated(e) | Conversion(e) => vec![e],
            Unary { operand, .. } => vec![operand],
            Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Ite { cond, then, els } => vec![cond, then, els],
            Let { rhss, body, .. } => rhss.iter().chain(std::iter::once(body)).collect(),
            Quantifier { range, body, .. } => range.iter().chain(std::iter::once(body)).collect(),
            SetComprehension { range, term, .. } => {
                std::iter::once(range).chain(term.iter()).collect()
            }
            MapComprehension { range, term, .. } => vec![range, term],
            Lambda { requires, body, .. } => {
                requires.iter().chain(std::iter::once(body)).collect()
            }
            Match { source, cases } => std::iter::once(source)
                .chain(cases.iter().map(|c| &c.body))
                .collect(),
        }
    }

    /// Visits this expression and all sub-expressions in pre-order.
    pub fn visit_pre_order(&self, visitor: &mut dyn FnMut(&ExpData)) {
        visitor(self);
        for child in self.children() {
            child.visit_pre_order(visitor);
        }
    }

    /// Names of the variables bound by this node for its sub-expressions.
    pub fn binders(&self) -> Vec<&BoundVar> {
        match &self.kind {
            ExpKind::Let { vars, .. }
            | ExpKind::Quantifier { vars, .. }
            | ExpKind::SetComprehension { vars, .. }
            | ExpKind::Lambda { vars, .. } => vars.iter().collect(),
            ExpKind::MapComprehension { var, .. } => vec![var],
            _ => vec![],
        }
    }

    /// Free local variables of this expression.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        self.collect_free_vars(&mut BTreeSet::new(), &mut result);
        result
    }

    fn collect_free_vars(&self, bound: &mut BTreeSet<String>, result: &mut BTreeSet<String>) {
        match &self.kind {
            ExpKind::LocalVar(name) => {
                if !bound.contains(name) {
                    result.insert(name.clone());
                }
            }
            ExpKind::Let { vars, rhss, body } => {
                for rhs in rhss {
                    rhs.collect_free_vars(bound, result);
                }
                Self::with_bound(bound, vars.iter(), |bound| {
                    body.collect_free_vars(bound, result)
                });
            }
            ExpKind::Match { source, cases } => {
                source.collect_free_vars(bound, result);
                for case in cases {
                    Self::with_bound(bound, case.vars.iter(), |bound| {
                        case.body.collect_free_vars(bound, result)
                    });
                }
            }
            ExpKind::Lambda { vars, reads, .. } => {
                Self::with_bound(bound, vars.iter(), |bound| {
                    for child in self.children() {
                        child.collect_free_vars(bound, result);
                    }
                    for frame in reads {
                        frame.exp.collect_free_vars(bound, result);
                    }
                });
            }
            _ => {
                let binders = self.binders();
                Self::with_bound(bound, binders.into_iter(), |bound| {
                    for child in self.children() {
                        child.collect_free_vars(bound, result);
                    }
                });
            }
        }
    }

    fn with_bound<'a>(
        bound: &mut BTreeSet<String>,
        vars: impl Iterator<Item = &'a BoundVar>,
        f: impl FnOnce(&mut BTreeSet<String>),
    ) {
        let added = vars
            .filter(|v| bound.insert(v.name.clone()))
            .map(|v| v.name.clone())
            .collect::<Vec<_>>();
        f(bound);
        for name in added {
            bound.remove(&name);
        }
    }

    /// Whether the expression refers to the implicit receiver.
    pub fn mentions_this(&self) -> bool {
        let mut found = false;
        self.visit_pre_order(&mut |e| found |= matches!(e.kind, ExpKind::This));
        found
    }

    /// Functions called anywhere in this expression.
    pub fn called_functions(&self) -> BTreeSet<QualifiedId<FunId>> {
        let mut result = BTreeSet::new();
        self.visit_pre_order(&mut |e| {
            if let ExpKind::FunctionCall { fun, .. } = &e.kind {
                result.insert(*fun);
            }
        });
        result
    }
}

// ================================================================================================
// Statements

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub loc: Loc,
    /// Label for `break` targets.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub ghost: bool,
}

/// Right-hand side of an assignment. The left-hand sides of assignments are expressions
/// restricted to local variables, field selections and array element selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rhs {
    Exp(Exp),
    /// `*`
    Havoc,
    /// `new C` or `new C.Init(args)`.
    New {
        ty: Type,
        init: Option<(QualifiedId<MethodId>, Vec<Exp>)>,
    },
    /// `new T[d1, .., dn]`
    NewArray { elem: Type, dims: Vec<Exp> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalcOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Imp,
    Iff,
}

impl CalcOp {
    pub fn to_binary(self) -> BinaryOp {
        match self {
            CalcOp::Eq => BinaryOp::Eq,
            CalcOp::Neq => BinaryOp::Neq,
            CalcOp::Lt => BinaryOp::Lt,
            CalcOp::Le => BinaryOp::Le,
            CalcOp::Gt => BinaryOp::Gt,
            CalcOp::Ge => BinaryOp::Ge,
            CalcOp::Imp => BinaryOp::Imp,
            CalcOp::Iff => BinaryOp::Iff,
        }
    }

    /// The relation established by chaining `self` and `next`, if the chain is transitive.
    pub fn compose(self, next: CalcOp) -> Option<CalcOp> {
        use CalcOp::*;
        match (self, next) {
            (Eq, op) | (op, Eq) => Some(op),
            (Iff, Iff) => Some(Iff),
            (Iff, Imp) | (Imp, Iff) | (Imp, Imp) => Some(Imp),
            (Lt, Lt) | (Lt, Le) | (Le, Lt) => Some(Lt),
            (Le, Le) => Some(Le),
            (Gt, Gt) | (Gt, Ge) | (Ge, Gt) => Some(Gt),
            (Ge, Ge) => Some(Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCaseStmt {
    pub ctor: CtorRef,
    pub vars: Vec<BoundVar>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Assert {
        exp: Exp,
        /// Fuel annotations scoped to this assertion.
        #[serde(default)]
        fuel: Vec<FuelAnnotation>,
        /// Optional proof block establishing the assertion.
        #[serde(default)]
        proof: Option<Box<Stmt>>,
    },
    Assume(Exp),
    Print(Vec<Exp>),
    VarDecl {
        locals: Vec<LocalDecl>,
        /// Initializing update, with the declared locals as left-hand sides.
        init: Option<Box<Stmt>>,
    },
    Assign {
        lhss: Vec<Exp>,
        rhss: Vec<Rhs>,
    },
    AssignSuchThat {
        lhss: Vec<Exp>,
        constraint: Exp,
    },
    Call {
        lhss: Vec<Exp>,
        method: QualifiedId<MethodId>,
        receiver: Option<Exp>,
        #[serde(default)]
        type_args: Vec<Type>,
        args: Vec<Exp>,
    },
    Return(Vec<Rhs>),
    /// `yield` in an iterator body, optionally assigning the yield parameters first.
    Yield(Vec<Rhs>),
    Break(Option<String>),
    Block(Vec<Stmt>),
    If {
        /// `None` is the nondeterministic guard `*`.
        guard: Option<Exp>,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        guard: Option<Exp>,
        invariants: Vec<SpecExp>,
        decreases: Vec<Exp>,
        /// Loop frame; `None` inherits the enclosing frame.
        #[serde(default)]
        modifies: Option<Vec<FrameExp>>,
        body: Option<Box<Stmt>>,
    },
    Forall {
        vars: Vec<BoundVar>,
        range: Option<Exp>,
        ensures: Vec<SpecExp>,
        body: Option<Box<Stmt>>,
    },
    Calc {
        op: CalcOp,
        lines: Vec<Exp>,
        /// One step operator per consecutive pair of lines.
        steps: Vec<CalcOp>,
        /// One hint block per step.
        hints: Vec<Stmt>,
    },
    Match {
        source: Exp,
        cases: Vec<MatchCaseStmt>,
        /// Constructors not covered by any case.
        #[serde(default)]
        missing: Vec<CtorRef>,
    },
    Modify {
        frame: Vec<FrameExp>,
        body: Option<Box<Stmt>>,
    },
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Loc) -> Self {
        Self {
            kind,
            loc,
            label: None,
        }
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(stmts), Loc::default())
    }

    pub fn assign(lhs: Exp, rhs: Exp) -> Self {
        let loc = lhs.loc;
        Self::new(
            StmtKind::Assign {
                lhss: vec![lhs],
                rhss: vec![Rhs::Exp(rhs)],
            },
            loc,
        )
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Immediate sub-statements.
    pub fn sub_stmts(&self) -> Vec<&Stmt> {
        match &self.kind {
            StmtKind::Block(stmts) => stmts.iter().collect(),
            StmtKind::Assert { proof, .. } => proof.iter().map(|s| s.as_ref()).collect(),
            StmtKind::VarDecl { init, .. } => init.iter().map(|s| s.as_ref()).collect(),
            StmtKind::If { then, els, .. } => std::iter::once(then.as_ref())
                .chain(els.iter().map(|s| s.as_ref()))
                .collect(),
            StmtKind::While { body, .. }
            | StmtKind::Forall { body, .. }
            | StmtKind::Modify { body, .. } => body.iter().map(|s| s.as_ref()).collect(),
            StmtKind::Calc { hints, .. } => hints.iter().collect(),
            StmtKind::Match { cases, .. } => cases.iter().flat_map(|c| c.body.iter()).collect(),
            StmtKind::Assume(_)
            | StmtKind::Print(_)
            | StmtKind::Assign { .. }
            | StmtKind::AssignSuchThat { .. }
            | StmtKind::Call { .. }
            | StmtKind::Return(_)
            | StmtKind::Yield(_)
            | StmtKind::Break(_) => vec![],
        }
    }

    /// Whether this statement or one nested in it yields.
    pub fn contains_yield(&self) -> bool {
        matches!(self.kind, StmtKind::Yield(_))
            || self.sub_stmts().iter().any(|s| s.contains_yield())
    }

    /// Immediate expressions of this statement (not of sub-statements).
    pub fn exps(&self) -> Vec<&Exp> {
        fn rhs_exps(rhss: &[Rhs]) -> Vec<&Exp> {
            rhss.iter()
                .flat_map(|rhs| match rhs {
                    Rhs::Exp(e) => vec![e],
                    Rhs::Havoc => vec![],
                    Rhs::New { init, .. } => init
                        .iter()
                        .flat_map(|(_, args)| args.iter())
                        .collect(),
                    Rhs::NewArray { dims, .. } => dims.iter().collect(),
                })
                .collect()
        }
        match &self.kind {
            StmtKind::Assert { exp, .. } | StmtKind::Assume(exp) => vec![exp],
            StmtKind::Print(es) => es.iter().collect(),
            StmtKind::VarDecl { .. } | StmtKind::Block(_) | StmtKind::Break(_) => vec![],
            StmtKind::Assign { lhss, rhss } => {
                lhss.iter().chain(rhs_exps(rhss)).collect()
            }
            StmtKind::AssignSuchThat { lhss, constraint } => {
                lhss.iter().chain(std::iter::once(constraint)).collect()
            }
            StmtKind::Call {
                lhss,
                receiver,
                args,
                ..
            } => lhss.iter().chain(receiver.iter()).chain(args).collect(),
            StmtKind::Return(rhss) | StmtKind::Yield(rhss) => rhs_exps(rhss),
            StmtKind::If { guard, .. } => guard.iter().collect(),
            StmtKind::While {
                guard,
                invariants,
                decreases,
                modifies,
                ..
            } => guard
                .iter()
                .chain(invariants.iter().map(|i| &i.exp))
                .chain(decreases)
                .chain(modifies.iter().flat_map(|m| m.iter().map(|f| &f.exp)))
                .collect(),
            StmtKind::Forall {
                range, ensures, ..
            } => range
                .iter()
                .chain(ensures.iter().map(|e| &e.exp))
                .collect(),
            StmtKind::Calc { lines, .. } => lines.iter().collect(),
            StmtKind::Match { source, .. } => vec![source],
            StmtKind::Modify { frame, .. } => frame.iter().map(|f| &f.exp).collect(),
        }
    }

    /// Visits this statement and all sub-statements in pre-order.
    pub fn visit_pre_order(&self, visitor: &mut dyn FnMut(&Stmt)) {
        visitor(self);
        for s in self.sub_stmts() {
            s.visit_pre_order(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_vars_respect_binders() {
        let x = ExpData::local("x", Type::Int);
        let y = ExpData::local("y", Type::Int);
        let body = ExpData::binary(BinaryOp::Lt, x.clone(), y.clone());
        let q = ExpData::forall(vec![BoundVar::new("x", Type::Int)], None, body);
        let fv = q.free_vars();
        assert!(fv.contains("y"));
        assert!(!fv.contains("x"));
        let both = ExpData::and(q, ExpData::binary(BinaryOp::Le, x, ExpData::int_const(0)));
        assert!(both.free_vars().contains("x"));
    }

    #[test]
    fn calc_composition() {
        assert_eq!(CalcOp::Eq.compose(CalcOp::Lt), Some(CalcOp::Lt));
        assert_eq!(CalcOp::Le.compose(CalcOp::Lt), Some(CalcOp::Lt));
        assert_eq!(CalcOp::Imp.compose(CalcOp::Iff), Some(CalcOp::Imp));
        assert_eq!(CalcOp::Lt.compose(CalcOp::Gt), None);
    }
}
