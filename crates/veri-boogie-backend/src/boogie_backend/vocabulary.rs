// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The predefined vocabulary: symbols declared by the Boogie preamble the generated program
//! is appended to.
//!
//! The preamble is opaque text. It is scanned once for its top-level declarations, and
//! translation refuses to start unless every symbol the translator emits references to is
//! declared.

use crate::boogie_backend::options::BoogieOptions;
use anyhow::{anyhow, bail, Context};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// The built-in preamble.
pub const PRELUDE: &str = include_str!("prelude/prelude.bpl");

const REQUIRED_TYPES: &[&str] = &[
    "Ty",
    "TyTag",
    "ref",
    "Box",
    "Field",
    "Heap",
    "LayerType",
    "DatatypeType",
    "DtCtorId",
    "HandleType",
    "char",
    "Set",
    "ISet",
    "MultiSet",
    "Seq",
    "Map",
    "IMap",
];

const REQUIRED_CONSTANTS: &[&str] = &[
    "null",
    "alloc",
    "$LZ",
    "$ModuleContextHeight",
    "$FunctionContextHeight",
    "TBool",
    "TChar",
    "TInt",
    "TReal",
    "Tclass._System.object?",
    "Tclass._System.object",
];

const REQUIRED_FUNCTIONS: &[&str] = &[
    "$LS",
    "AsFuelBottom",
    "$Box",
    "$Unbox",
    "$Is",
    "$IsAlloc",
    "$IsBox",
    "$IsAllocBox",
    "$IsGoodHeap",
    "$HeapSucc",
    "read",
    "update",
    "Tag",
    "FDim",
    "dtype",
    "DatatypeCtorId",
    "DtRank",
    "BoxRank",
    "TBitvector",
    "TSet",
    "TISet",
    "TMultiSet",
    "TSeq",
    "TMap",
    "TIMap",
    "TArray?",
    "TArray",
    "IndexField",
    "MultiIndexField",
    "$ArrayLength",
    "char#FromInt",
    "char#ToInt",
    "Set#Card",
    "Set#Empty",
    "Set#UnionOne",
    "Set#Union",
    "Set#Intersection",
    "Set#Difference",
    "Set#Subset",
    "Set#Equal",
    "Set#Disjoint",
    "Set#FromBoogieMap",
    "ISet#Empty",
    "ISet#UnionOne",
    "ISet#Union",
    "ISet#Intersection",
    "ISet#Difference",
    "ISet#Subset",
    "ISet#Equal",
    "ISet#Disjoint",
    "MultiSet#Card",
    "MultiSet#Empty",
    "MultiSet#UnionOne",
    "MultiSet#Union",
    "MultiSet#Intersection",
    "MultiSet#Difference",
    "MultiSet#Subset",
    "MultiSet#Equal",
    "MultiSet#Disjoint",
    "Seq#Length",
    "Seq#Empty",
    "Seq#Build",
    "Seq#Append",
    "Seq#Index",
    "Seq#Update",
    "Seq#Contains",
    "Seq#Equal",
    "Seq#SameUntil",
    "Seq#Take",
    "Seq#Drop",
    "Seq#FromArray",
    "Map#Domain",
    "Map#Elements",
    "Map#Card",
    "Map#Empty",
    "Map#Build",
    "Map#Glue",
    "Map#Merge",
    "Map#Subtract",
    "Map#Equal",
    "Map#Disjoint",
    "IMap#Domain",
    "IMap#Elements",
    "IMap#Empty",
    "IMap#Build",
    "IMap#Glue",
    "IMap#Merge",
    "IMap#Subtract",
    "IMap#Equal",
];

const REQUIRED_VARIABLES: &[&str] = &["$Heap"];

const IDENT: &str = r"([A-Za-z_$#.?'\\~^][A-Za-z0-9_$#.?'\\~^]*)";

static TYPE_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?m)^\s*type\s+(?:\{{[^}}]*\}}\s*)*{}", IDENT)).unwrap());
static CONST_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^\s*const\s+(?:\{{[^}}]*\}}\s*)*(?:unique\s+)?{}\s*:",
        IDENT
    ))
    .unwrap()
});
static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^\s*function\s+(?:\{{[^}}]*\}}\s*)*{}", IDENT)).unwrap()
});
static VAR_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?m)^\s*var\s+{}\s*:", IDENT)).unwrap());

/// Symbols declared by the preamble.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    text: String,
    types: BTreeSet<String>,
    constants: BTreeSet<String>,
    functions: BTreeSet<String>,
    variables: BTreeSet<String>,
}

impl Vocabulary {
    /// Scans the preamble text. Fails if the text is malformed or lacks required symbols;
    /// the error lists every missing symbol.
    pub fn new(text: &str) -> anyhow::Result<Self> {
        let code = strip_comments(text);
        check_balanced(&code)?;
        let scan = |re: &Regex| -> BTreeSet<String> {
            re.captures_iter(&code)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        };
        let vocab = Self {
            text: text.to_string(),
            types: scan(&TYPE_DECL),
            constants: scan(&CONST_DECL),
            functions: scan(&FUNCTION_DECL),
            variables: scan(&VAR_DECL),
        };
        let missing = REQUIRED_TYPES
            .iter()
            .filter(|n| !vocab.types.contains(**n))
            .map(|n| format!("type {}", n))
            .chain(
                REQUIRED_CONSTANTS
                    .iter()
                    .filter(|n| !vocab.constants.contains(**n))
                    .map(|n| format!("const {}", n)),
            )
            .chain(
                REQUIRED_FUNCTIONS
                    .iter()
                    .filter(|n| !vocab.functions.contains(**n))
                    .map(|n| format!("function {}", n)),
            )
            .chain(
                REQUIRED_VARIABLES
                    .iter()
                    .filter(|n| !vocab.variables.contains(**n))
                    .map(|n| format!("var {}", n)),
            )
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!(
                "preamble is missing required symbols: {}",
                missing.iter().join(", ")
            )
        }
        Ok(vocab)
    }

    /// The vocabulary of the built-in preamble.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::new(PRELUDE).context("built-in preamble")
    }

    /// The vocabulary selected by the options: the override file if one is given, the
    /// built-in preamble otherwise.
    pub fn from_options(options: &BoogieOptions) -> anyhow::Result<Self> {
        match &options.prelude_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading preamble `{}`", path.display()))?;
                Self::new(&text).with_context(|| format!("preamble `{}`", path.display()))
            }
            None => Self::builtin(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the preamble declares a symbol of the given name, of any kind.
    pub fn declares(&self, name: &str) -> bool {
        self.types.contains(name)
            || self.constants.contains(name)
            || self.functions.contains(name)
            || self.variables.contains(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn symbol_count(&self) -> usize {
        self.types.len() + self.constants.len() + self.functions.len() + self.variables.len()
    }
}

/// Removes `//` line comments and `/* */` block comments, keeping line structure.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_block = false;
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                out.push('\n');
            }
            continue;
        }
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
            }
            _ => out.push(c),
        }
    }
    out
}

fn check_balanced(code: &str) -> anyhow::Result<()> {
    let mut stack = vec![];
    for (line_no, line) in code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' | '(' | '[' => stack.push((c, line_no + 1)),
                '}' | ')' | ']' => {
                    let expected = match c {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err(anyhow!("unbalanced `{}` in preamble at line {}", c, line_no + 1)),
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((open, line)) = stack.pop() {
        bail!("unclosed `{}` in preamble at line {}", open, line)
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_prelude_declares_everything() {
        let vocab = Vocabulary::builtin().unwrap();
        assert!(vocab.declares("Heap"));
        assert!(vocab.declares("$Heap"));
        assert!(vocab.has_function("Lit"));
        assert!(vocab.has_function("Map#Glue"));
        assert!(vocab.has_function("Set#FromBoogieMap"));
        assert!(vocab.declares("Tclass._System.object?"));
    }

    #[test]
    fn missing_symbols_are_all_reported() {
        let err = Vocabulary::new("type Ty;\nconst null: ref;\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("type Box"));
        assert!(err.contains("function $LS"));
        assert!(err.contains("var $Heap"));
        assert!(!err.contains("type Ty,"));
        assert!(!err.contains("const null"));
    }

    #[test]
    fn comments_are_ignored_and_braces_checked() {
        let text = format!("{}\n// function Fake(int): int;\n", PRELUDE);
        let vocab = Vocabulary::new(&text).unwrap();
        assert!(!vocab.declares("Fake"));
        let broken = format!("{}\naxiom (forall x: int :: x == x;\n", PRELUDE);
        assert!(Vocabulary::new(&broken)
            .unwrap_err()
            .to_string()
            .contains("unclosed"));
    }
}
