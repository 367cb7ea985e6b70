// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Resolved source types.

use crate::model::{ClassId, DatatypeId, QualifiedId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A fully resolved source type. Every expression of the model carries one of these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Char,
    Int,
    Real,
    BitVector(u32),
    /// Finite set.
    Set(Box<Type>),
    /// Possibly infinite set.
    ISet(Box<Type>),
    MultiSet(Box<Type>),
    Seq(Box<Type>),
    /// Finite map.
    Map(Box<Type>, Box<Type>),
    /// Possibly infinite map.
    IMap(Box<Type>, Box<Type>),
    /// Inductive or co-inductive datatype instance.
    Datatype(QualifiedId<DatatypeId>, Vec<Type>),
    /// Class or trait reference.
    Class {
        id: QualifiedId<ClassId>,
        args: Vec<Type>,
        nullable: bool,
    },
    /// The root of all reference types.
    Object { nullable: bool },
    /// Array reference with the given number of dimensions.
    Array {
        elem: Box<Type>,
        dims: usize,
        nullable: bool,
    },
    /// First-class function type.
    Arrow(Vec<Type>, Box<Type>),
    /// Type parameter, named as declared.
    TypeParameter(String),
    /// Placeholder left behind by an incomplete resolution. Must never reach translation.
    Unresolved,
}

impl Type {
    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    pub fn seq(elem: Type) -> Type {
        Type::Seq(Box::new(elem))
    }

    pub fn multiset(elem: Type) -> Type {
        Type::MultiSet(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn arrow(args: Vec<Type>, result: Type) -> Type {
        Type::Arrow(args, Box::new(result))
    }

    pub fn class(id: QualifiedId<ClassId>, args: Vec<Type>) -> Type {
        Type::Class {
            id,
            args,
            nullable: true,
        }
    }

    pub fn array(elem: Type) -> Type {
        Type::Array {
            elem: Box::new(elem),
            dims: 1,
            nullable: true,
        }
    }

    pub fn type_param(name: &str) -> Type {
        Type::TypeParameter(name.to_string())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Real | Type::BitVector(_) | Type::Char)
    }

    /// Whether values of this type live in the heap and are compared by identity.
    pub fn is_ref_type(&self) -> bool {
        matches!(
            self,
            Type::Class { .. } | Type::Object { .. } | Type::Array { .. }
        )
    }

    /// Whether `null` is a value of this type.
    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Class { nullable, .. }
            | Type::Object { nullable }
            | Type::Array { nullable, .. } => *nullable,
            _ => false,
        }
    }

    pub fn is_type_parameter(&self) -> bool {
        matches!(self, Type::TypeParameter(_))
    }

    pub fn is_datatype(&self) -> bool {
        matches!(self, Type::Datatype(..))
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Type::Set(_)
                | Type::ISet(_)
                | Type::MultiSet(_)
                | Type::Seq(_)
                | Type::Map(..)
                | Type::IMap(..)
        )
    }

    /// Element type of a set, multiset, sequence or array; domain type of a map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Set(e) | Type::ISet(e) | Type::MultiSet(e) | Type::Seq(e) => Some(e),
            Type::Map(k, _) | Type::IMap(k, _) => Some(k),
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Range type of a map.
    pub fn map_range_type(&self) -> Option<&Type> {
        match self {
            Type::Map(_, v) | Type::IMap(_, v) => Some(v),
            _ => None,
        }
    }

    /// Instantiates type parameters according to `inst`. Parameters without a binding stay.
    pub fn instantiate(&self, inst: &BTreeMap<String, Type>) -> Type {
        if inst.is_empty() {
            return self.clone();
        }
        self.map_params(&|name| inst.get(name).cloned())
    }

    fn map_params(&self, f: &impl Fn(&str) -> Option<Type>) -> Type {
        let go = |t: &Type| Box::new(t.map_params(f));
        let go_vec = |ts: &[Type]| ts.iter().map(|t| t.map_params(f)).collect::<Vec<_>>();
        match self {
            Type::TypeParameter(name) => f(name).unwrap_or_else(|| self.clone()),
            Type::Set(e) => Type::Set(go(e)),
            Type::ISet(e) => Type::ISet(go(e)),
            Type::MultiSet(e) => Type::MultiSet(go(e)),
            Type::Seq(e) => Type::Seq(go(e)),
            Type::Map(k, v) => Type::Map(go(k), go(v)),
            Type::IMap(k, v) => Type::IMap(go(k), go(v)),
            Type::Datatype(id, args) => Type::Datatype(*id, go_vec(args)),
            Type::Class { id, args, nullable } => Type::Class {
                id: *id,
                args: go_vec(args),
                nullable: *nullable,
            },
            Type::Array {
                elem,
                dims,
                nullable,
            } => Type::Array {
                elem: go(elem),
                dims: *dims,
                nullable: *nullable,
            },
            Type::Arrow(args, res) => Type::Arrow(go_vec(args), go(res)),
            Type::Bool
            | Type::Char
            | Type::Int
            | Type::Real
            | Type::BitVector(_)
            | Type::Object { .. }
            | Type::Unresolved => self.clone(),
        }
    }

    /// Whether any type parameter occurs in this type.
    pub fn contains_type_parameter(&self) -> bool {
        match self {
            Type::TypeParameter(_) => true,
            Type::Set(e) | Type::ISet(e) | Type::MultiSet(e) | Type::Seq(e) => {
                e.contains_type_parameter()
            }
            Type::Map(k, v) | Type::IMap(k, v) => {
                k.contains_type_parameter() || v.contains_type_parameter()
            }
            Type::Datatype(_, args) | Type::Class { args, .. } => {
                args.iter().any(Type::contains_type_parameter)
            }
            Type::Array { elem, .. } => elem.contains_type_parameter(),
            Type::Arrow(args, res) => {
                args.iter().any(Type::contains_type_parameter) || res.contains_type_parameter()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |ts: &[Type]| {
            ts.iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Real => write!(f, "real"),
            Type::BitVector(n) => write!(f, "bv{}", n),
            Type::Set(e) => write!(f, "set<{}>", e),
            Type::ISet(e) => write!(f, "iset<{}>", e),
            Type::MultiSet(e) => write!(f, "multiset<{}>", e),
            Type::Seq(e) => write!(f, "seq<{}>", e),
            Type::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Type::IMap(k, v) => write!(f, "imap<{}, {}>", k, v),
            Type::Datatype(id, args) => {
                write!(f, "datatype#{}.{}", id.module_id.0, id.id.0)?;
                if !args.is_empty() {
                    write!(f, "<{}>", list(args))?;
                }
                Ok(())
            }
            Type::Class { id, args, nullable } => {
                write!(f, "class#{}.{}", id.module_id.0, id.id.0)?;
                if !args.is_empty() {
                    write!(f, "<{}>", list(args))?;
                }
                if *nullable {
                    write!(f, "?")?;
                }
                Ok(())
            }
            Type::Object { nullable } => write!(f, "object{}", if *nullable { "?" } else { "" }),
            Type::Array {
                elem,
                dims,
                nullable,
            } => {
                if *dims == 1 {
                    write!(f, "array<{}>", elem)?;
                } else {
                    write!(f, "array{}<{}>", dims, elem)?;
                }
                if *nullable {
                    write!(f, "?")?;
                }
                Ok(())
            }
            Type::Arrow(args, res) => write!(f, "({}) -> {}", list(args), res),
            Type::TypeParameter(name) => write!(f, "{}", name),
            Type::Unresolved => write!(f, "?unresolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_replaces_bound_parameters_only() {
        let ty = Type::map(Type::type_param("K"), Type::seq(Type::type_param("V")));
        let mut inst = BTreeMap::new();
        inst.insert("V".to_string(), Type::Int);
        assert_eq!(
            ty.instantiate(&inst),
            Type::map(Type::type_param("K"), Type::seq(Type::Int))
        );
        assert!(ty.instantiate(&inst).contains_type_parameter());
    }

    #[test]
    fn nullability() {
        let arr = Type::array(Type::Int);
        assert!(arr.is_ref_type());
        assert!(arr.is_nullable());
        assert!(!Type::Object { nullable: false }.is_nullable());
        assert_eq!(arr.element_type(), Some(&Type::Int));
    }
}
