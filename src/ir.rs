//! Representación intermedia.
//!
//! El parser produce una lista plana y ordenada de [`Declaration`], una
//! por cada definición de nivel superior. Los nodos son inmutables una vez
//! construidos. Las referencias entre declaraciones son por nombre; su
//! resolución se difiere hasta generación de código.

use serde::{Serialize, Serializer};
use std::fmt::{self, Display};

use crate::lex::Identifier;

/// Una definición de nivel superior.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    Const(Const),
    Enum(Enum),
    Struct(Struct),
    Union(Union),
    Typedef(Typedef),
    Program(Program),
}

impl Declaration {
    /// Nombre declarado.
    pub fn name(&self) -> &Identifier {
        match self {
            Declaration::Const(decl) => &decl.name,
            Declaration::Enum(decl) => &decl.name,
            Declaration::Struct(decl) => &decl.name,
            Declaration::Union(decl) => &decl.name,
            Declaration::Typedef(decl) => &decl.name,
            Declaration::Program(decl) => &decl.name,
        }
    }
}

/// Un valor entero tal como aparece en la fuente.
///
/// Los literales preservan su ortografía original (`010`, `0x1F`, `-4`).
/// Los nombres se refieren a constantes, miembros de enum o `TRUE`/`FALSE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Literal(String),
    Name(Identifier),
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => fmt.write_str(literal),
            Value::Name(name) => name.fmt(fmt),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Tipos admisibles para campos, alias, discriminantes y procedimientos.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Int,
    UnsignedInt,
    Hyper,
    UnsignedHyper,
    Float,
    Double,
    Bool,
    String,
    Opaque,
    Netobj,
    Void,

    /// Tipo declarado (o por declarar), incluyendo `struct NAME`.
    Named(Identifier),
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spelling = match self {
            Type::Int => "int",
            Type::UnsignedInt => "unsigned int",
            Type::Hyper => "hyper",
            Type::UnsignedHyper => "unsigned hyper",
            Type::Float => "float",
            Type::Double => "double",
            Type::Bool => "bool",
            Type::String => "string",
            Type::Opaque => "opaque",
            Type::Netobj => "netobj",
            Type::Void => "void",
            Type::Named(name) => return name.fmt(fmt),
        };

        fmt.write_str(spelling)
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Forma de una declaración: dato simple, arreglo o puntero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "note", rename_all = "lowercase")]
pub enum Note {
    Raw,

    /// `[N]` y `[]` son fijos; `<N>` y `<>` son variables.
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        length: Option<Value>,
        fixed: bool,
    },

    Pointer,
}

/// Campo de una estructura o brazo de una unión.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: Identifier,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(flatten)]
    pub note: Note,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Const {
    pub name: Identifier,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enum {
    pub name: Identifier,
    pub values: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMember {
    pub name: Identifier,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub name: Identifier,
    pub entries: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Union {
    pub name: Identifier,
    pub discriminant: Discriminant,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discriminant {
    #[serde(rename = "type")]
    pub ty: Type,
    pub name: Identifier,
}

/// Un caso de unión.
///
/// Sin tipo ni nombre el brazo es vacío. Con solo un tipo (típicamente
/// `void`) tampoco lleva carga útil. Con tipo y nombre, el brazo es un
/// campo con la forma indicada por `note`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub label: Label,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    #[serde(flatten)]
    pub note: Note,
}

impl Case {
    /// Campo transportado por este brazo, si lo hay.
    pub fn field(&self) -> Option<Field> {
        match (&self.ty, &self.name) {
            (Some(ty), Some(name)) => Some(Field {
                name: name.clone(),
                ty: ty.clone(),
                note: self.note.clone(),
            }),

            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Value(Value),
    Default,
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Value(value) => value.fmt(fmt),
            Label::Default => fmt.write_str("default"),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Typedef {
    pub name: Identifier,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(flatten)]
    pub note: Note,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub name: Identifier,
    pub num: Value,
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version {
    pub name: Identifier,
    pub num: Value,
    pub procs: Vec<Procedure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub id: Value,
    pub name: Identifier,
    pub arg: Type,
    pub res: Type,
}
