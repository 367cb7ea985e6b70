// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The resolved program model.
//!
//! A `GlobalEnv` holds every module of the program together with the source files their
//! locations point into. The model is produced by the upstream resolver: names are resolved,
//! every expression carries its type, every call its target and type instantiation, and the
//! call graph strongly connected components and heights are filled in (see
//! [`crate::call_graph`] for a helper computing them).
//!
//! Local variable, parameter and bound variable names are unique within a callable.

use crate::ast::{Exp, FrameExp, SpecExp, Stmt};
use crate::ty::Type;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label, Severity},
    files::{Files, SimpleFiles},
    term::{emit, termcolor::WriteColor, Config},
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

// ================================================================================================
// Identifiers

macro_rules! index_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_id!(
    /// Index of a module in the environment.
    ModuleId
);
index_id!(
    /// Index of a class or trait within its module.
    ClassId
);
index_id!(
    /// Index of a datatype within its module.
    DatatypeId
);
index_id!(
    /// Index of a field within its module.
    FieldId
);
index_id!(
    /// Index of a function or predicate within its module.
    FunId
);
index_id!(
    /// Index of a method or lemma within its module.
    MethodId
);
index_id!(
    /// Index of an iterator within its module.
    IteratorId
);

/// An id qualified by the module it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedId<Id> {
    pub module_id: ModuleId,
    pub id: Id,
}

impl ModuleId {
    pub fn qualified<Id>(self, id: Id) -> QualifiedId<Id> {
        QualifiedId {
            module_id: self,
            id,
        }
    }
}

/// Reference to a datatype constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CtorRef {
    pub datatype: QualifiedId<DatatypeId>,
    pub index: usize,
}

/// A function, a method or an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CallableId {
    Function(QualifiedId<FunId>),
    Method(QualifiedId<MethodId>),
    Iterator(QualifiedId<IteratorId>),
}

impl CallableId {
    pub fn module_id(&self) -> ModuleId {
        match self {
            CallableId::Function(qid) => qid.module_id,
            CallableId::Method(qid) => qid.module_id,
            CallableId::Iterator(qid) => qid.module_id,
        }
    }
}

// ================================================================================================
// Locations

/// A byte range in one of the source files of the environment. The default location points
/// to the internal pseudo file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Loc {
    pub file_id: usize,
    pub start: u32,
    pub end: u32,
}

impl Loc {
    pub fn new(file_id: usize, start: u32, end: u32) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }
}

/// Line and column of a location, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

// ================================================================================================
// Declarations

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formal {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub ghost: bool,
}

impl Formal {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            ghost: false,
        }
    }
}

/// A `{:fuel f, low, high}` annotation. When `high` is omitted it is `low + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelAnnotation {
    pub fun: QualifiedId<FunId>,
    pub low: u32,
    #[serde(default)]
    pub high: Option<u32>,
    #[serde(default)]
    pub loc: Loc,
}

impl FuelAnnotation {
    pub fn high(&self) -> u32 {
        self.high.unwrap_or(self.low + 1)
    }
}

/// Call graph information of a callable, as computed by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallGraphInfo {
    /// Representative of the strongly connected component within the module.
    pub scc: usize,
    /// Height of the component: callees have strictly smaller heights unless they share the
    /// component.
    pub height: usize,
    /// Whether the callable is part of a cycle (including a self loop).
    pub is_recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub is_trait: bool,
    #[serde(default)]
    pub parents: Vec<QualifiedId<ClassId>>,
    #[serde(default)]
    pub fuel: Vec<FuelAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtorData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    pub formals: Vec<Formal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatatypeData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub ctors: Vec<CtorData>,
    #[serde(default)]
    pub is_codatatype: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    pub owner: ClassId,
    pub ty: Type,
    /// `var` fields live in the heap; `const` fields are read through a function.
    pub mutable: bool,
    #[serde(default)]
    pub ghost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    /// Enclosing class, or `None` for module level functions.
    #[serde(default)]
    pub owner: Option<ClassId>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub formals: Vec<Formal>,
    pub result_type: Type,
    #[serde(default)]
    pub reads: Vec<FrameExp>,
    #[serde(default)]
    pub requires: Vec<Exp>,
    #[serde(default)]
    pub ensures: Vec<Exp>,
    #[serde(default)]
    pub decreases: Vec<Exp>,
    #[serde(default)]
    pub body: Option<Exp>,
    /// The body is not visible outside of the enclosing module.
    #[serde(default)]
    pub is_opaque: bool,
    #[serde(default)]
    pub fuel: Vec<FuelAnnotation>,
    #[serde(default)]
    pub call_info: CallGraphInfo,
}

impl FunctionData {
    /// A static module level function without specification.
    pub fn new(name: &str, formals: Vec<Formal>, result_type: Type) -> Self {
        Self {
            name: name.to_string(),
            loc: Loc::default(),
            owner: None,
            is_static: true,
            type_params: vec![],
            formals,
            result_type,
            reads: vec![],
            requires: vec![],
            ensures: vec![],
            decreases: vec![],
            body: None,
            is_opaque: false,
            fuel: vec![],
            call_info: CallGraphInfo::default(),
        }
    }

    /// Whether the function takes a receiver.
    pub fn has_receiver(&self) -> bool {
        !self.is_static && self.owner.is_some()
    }

    /// Whether the function depends on the heap.
    pub fn reads_heap(&self) -> bool {
        !self.reads.is_empty()
    }

    /// Whether calls carry a layer argument bounding the unfolding of the definition.
    pub fn is_fuel_aware(&self) -> bool {
        self.call_info.is_recursive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Method,
    Lemma,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    #[serde(default)]
    pub owner: Option<ClassId>,
    #[serde(default)]
    pub is_static: bool,
    pub kind: MethodKind,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub ins: Vec<Formal>,
    #[serde(default)]
    pub outs: Vec<Formal>,
    #[serde(default)]
    pub requires: Vec<SpecExp>,
    #[serde(default)]
    pub modifies: Vec<FrameExp>,
    #[serde(default)]
    pub ensures: Vec<SpecExp>,
    #[serde(default)]
    pub decreases: Vec<Exp>,
    #[serde(default)]
    pub body: Option<Stmt>,
    /// The trait method this method implements, if any.
    #[serde(default)]
    pub overrides: Option<QualifiedId<MethodId>>,
    #[serde(default)]
    pub fuel: Vec<FuelAnnotation>,
    #[serde(default)]
    pub call_info: CallGraphInfo,
}

impl MethodData {
    /// A static module level method without specification.
    pub fn new(name: &str, kind: MethodKind, ins: Vec<Formal>, outs: Vec<Formal>) -> Self {
        Self {
            name: name.to_string(),
            loc: Loc::default(),
            owner: None,
            is_static: true,
            kind,
            type_params: vec![],
            ins,
            outs,
            requires: vec![],
            modifies: vec![],
            ensures: vec![],
            decreases: vec![],
            body: None,
            overrides: None,
            fuel: vec![],
            call_info: CallGraphInfo::default(),
        }
    }

    pub fn has_receiver(&self) -> bool {
        !self.is_static && self.owner.is_some()
    }
}

/// An iterator. The resolver supplies its implicit class, with the constructor and
/// `MoveNext` members, as ordinary declarations; this is the body and its specification.
///
/// Specifications and the body refer to in-parameters and yield parameters as locals. Each
/// yield parameter `y` has a history `ys`, the sequence of values yielded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorData {
    pub name: String,
    #[serde(default)]
    pub loc: Loc,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub ins: Vec<Formal>,
    /// Yield parameters.
    #[serde(default)]
    pub outs: Vec<Formal>,
    #[serde(default)]
    pub requires: Vec<SpecExp>,
    #[serde(default)]
    pub reads: Vec<FrameExp>,
    #[serde(default)]
    pub modifies: Vec<FrameExp>,
    #[serde(default)]
    pub yield_requires: Vec<SpecExp>,
    #[serde(default)]
    pub yield_ensures: Vec<SpecExp>,
    #[serde(default)]
    pub ensures: Vec<SpecExp>,
    #[serde(default)]
    pub decreases: Vec<Exp>,
    #[serde(default)]
    pub body: Option<Stmt>,
    #[serde(default)]
    pub fuel: Vec<FuelAnnotation>,
    #[serde(default)]
    pub call_info: CallGraphInfo,
}

impl IteratorData {
    pub fn new(name: &str, ins: Vec<Formal>, outs: Vec<Formal>) -> Self {
        Self {
            name: name.to_string(),
            loc: Loc::default(),
            type_params: vec![],
            ins,
            outs,
            requires: vec![],
            reads: vec![],
            modifies: vec![],
            yield_requires: vec![],
            yield_ensures: vec![],
            ensures: vec![],
            decreases: vec![],
            body: None,
            fuel: vec![],
            call_info: CallGraphInfo::default(),
        }
    }

    /// The history variable of each yield parameter.
    pub fn histories(&self) -> Vec<Formal> {
        self.outs
            .iter()
            .map(|y| Formal {
                name: format!("{}s", y.name),
                ty: Type::seq(y.ty.clone()),
                ghost: true,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    pub name: String,
    /// Position in the module import order; imported modules have smaller heights.
    pub height: usize,
    #[serde(default)]
    pub classes: Vec<ClassData>,
    #[serde(default)]
    pub datatypes: Vec<DatatypeData>,
    #[serde(default)]
    pub fields: Vec<FieldData>,
    #[serde(default)]
    pub functions: Vec<FunctionData>,
    #[serde(default)]
    pub methods: Vec<MethodData>,
    #[serde(default)]
    pub iterators: Vec<IteratorData>,
    #[serde(default)]
    pub fuel: Vec<FuelAnnotation>,
}

impl ModuleData {
    pub fn new(name: &str, height: usize) -> Self {
        Self {
            name: name.to_string(),
            height,
            ..Default::default()
        }
    }
}

/// A source file referenced by locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Serialized form of a resolved program, as handed over by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramData {
    #[serde(default)]
    pub files: Vec<SourceFile>,
    pub modules: Vec<ModuleData>,
}

// ================================================================================================
// Global Environment

/// Name of the pseudo file the default location points into.
pub const INTERNAL_FILE_NAME: &str = "<internal>";

#[derive(Debug)]
pub struct GlobalEnv {
    source_files: SimpleFiles<String, String>,
    modules: Vec<ModuleData>,
    diags: RefCell<Vec<Diagnostic<usize>>>,
}

impl Default for GlobalEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalEnv {
    pub fn new() -> Self {
        let mut source_files = SimpleFiles::new();
        source_files.add(INTERNAL_FILE_NAME.to_string(), String::new());
        Self {
            source_files,
            modules: vec![],
            diags: RefCell::new(vec![]),
        }
    }

    /// Builds an environment from a serialized program. File ids of locations refer to the
    /// position in `data.files`, offset by one for the internal file.
    pub fn from_program(data: ProgramData) -> Self {
        let mut env = Self::new();
        for file in data.files {
            env.add_source(&file.name, &file.text);
        }
        for module in data.modules {
            env.add_module(module);
        }
        env
    }

    /// Adds a source file and returns its id for use in locations.
    pub fn add_source(&mut self, name: &str, text: &str) -> usize {
        self.source_files.add(name.to_string(), text.to_string())
    }

    pub fn add_module(&mut self, module: ModuleData) -> ModuleId {
        self.modules.push(module);
        ModuleId(self.modules.len() - 1)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleData {
        &mut self.modules[id.0]
    }

    pub fn get_module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn get_modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleData)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId(i), m))
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        self.modules
            .get(id.0)
            .unwrap_or_else(|| panic!("BUG: unknown module {}", id))
    }

    pub fn class(&self, qid: QualifiedId<ClassId>) -> &ClassData {
        &self.module(qid.module_id).classes[qid.id.0]
    }

    pub fn datatype(&self, qid: QualifiedId<DatatypeId>) -> &DatatypeData {
        &self.module(qid.module_id).datatypes[qid.id.0]
    }

    pub fn ctor(&self, ctor: CtorRef) -> &CtorData {
        &self.datatype(ctor.datatype).ctors[ctor.index]
    }

    pub fn field(&self, qid: QualifiedId<FieldId>) -> &FieldData {
        &self.module(qid.module_id).fields[qid.id.0]
    }

    pub fn function(&self, qid: QualifiedId<FunId>) -> &FunctionData {
        &self.module(qid.module_id).functions[qid.id.0]
    }

    pub fn method(&self, qid: QualifiedId<MethodId>) -> &MethodData {
        &self.module(qid.module_id).methods[qid.id.0]
    }

    pub fn iterator(&self, qid: QualifiedId<IteratorId>) -> &IteratorData {
        &self.module(qid.module_id).iterators[qid.id.0]
    }

    pub fn call_info(&self, callable: CallableId) -> CallGraphInfo {
        match callable {
            CallableId::Function(qid) => self.function(qid).call_info,
            CallableId::Method(qid) => self.method(qid).call_info,
            CallableId::Iterator(qid) => self.iterator(qid).call_info,
        }
    }

    /// Whether two callables live in the same strongly connected component of the call graph.
    pub fn in_same_scc(&self, a: CallableId, b: CallableId) -> bool {
        a.module_id() == b.module_id() && self.call_info(a).scc == self.call_info(b).scc
    }

    /// Iterates over all functions of the program.
    pub fn get_functions(&self) -> impl Iterator<Item = (QualifiedId<FunId>, &FunctionData)> {
        self.get_modules().flat_map(|(mid, m)| {
            m.functions
                .iter()
                .enumerate()
                .map(move |(i, f)| (mid.qualified(FunId(i)), f))
        })
    }

    /// Returns line and column of the start of `loc`.
    pub fn position(&self, loc: &Loc) -> SourcePosition {
        let file = self
            .source_files
            .name(loc.file_id)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| INTERNAL_FILE_NAME.to_string());
        match self.source_files.location(loc.file_id, loc.start as usize) {
            Ok(location) => SourcePosition {
                file,
                line: location.line_number,
                column: location.column_number,
            },
            Err(_) => SourcePosition {
                file,
                line: 0,
                column: 0,
            },
        }
    }

    // Diagnostics
    // -----------

    pub fn diag(&self, severity: Severity, loc: &Loc, msg: &str) {
        let diag = Diagnostic::new(severity)
            .with_message(msg)
            .with_labels(vec![Label::primary(
                loc.file_id,
                loc.start as usize..loc.end as usize,
            )]);
        self.diags.borrow_mut().push(diag);
    }

    pub fn error(&self, loc: &Loc, msg: &str) {
        self.diag(Severity::Error, loc, msg)
    }

    pub fn warning(&self, loc: &Loc, msg: &str) {
        self.diag(Severity::Warning, loc, msg)
    }

    pub fn has_errors(&self) -> bool {
        self.diags
            .borrow()
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }

    pub fn diag_count(&self, min_severity: Severity) -> usize {
        self.diags
            .borrow()
            .iter()
            .filter(|d| d.severity >= min_severity)
            .count()
    }

    /// Messages of all diagnostics at or above the given severity.
    pub fn diag_messages(&self, min_severity: Severity) -> Vec<String> {
        self.diags
            .borrow()
            .iter()
            .filter(|d| d.severity >= min_severity)
            .map(|d| d.message.clone())
            .collect()
    }

    /// Writes all diagnostics at or above the given severity.
    pub fn report_diag<W: WriteColor>(&self, writer: &mut W, severity: Severity) {
        let config = Config::default();
        for diag in self.diags.borrow().iter() {
            if diag.severity >= severity {
                // A diagnostic pointing outside its file is still reported, without source.
                if emit(writer, &config, &self.source_files, diag).is_err() {
                    let _ = writeln!(writer, "{:?}: {}", diag.severity, diag.message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codespan_reporting::term::termcolor::Buffer;

    #[test]
    fn positions_are_one_based() {
        let mut env = GlobalEnv::new();
        let file = env.add_source("a.src", "method m()\n{\n  x := 1;\n}\n");
        let pos = env.position(&Loc::new(file, 15, 16));
        assert_eq!(pos.file, "a.src");
        assert_eq!(pos.line, 3);
        assert_eq!(pos.column, 3);
        assert_eq!(env.position(&Loc::default()).file, INTERNAL_FILE_NAME);
    }

    #[test]
    fn diagnostics_are_collected_and_reported() {
        let mut env = GlobalEnv::new();
        let file = env.add_source("b.src", "function f(): int\n");
        env.warning(&Loc::new(file, 0, 8), "just a warning");
        assert!(!env.has_errors());
        env.error(&Loc::new(file, 9, 10), "an error");
        assert!(env.has_errors());
        assert_eq!(env.diag_count(Severity::Warning), 2);
        let mut buffer = Buffer::no_color();
        env.report_diag(&mut buffer, Severity::Error);
        let text = String::from_utf8_lossy(&buffer.into_inner()).to_string();
        assert!(text.contains("an error"));
        assert!(!text.contains("just a warning"));
    }
}
