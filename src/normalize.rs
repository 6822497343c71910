//! Normalización de IR.
//!
//! Agrupa la lista plana de declaraciones por tipo de declaración y
//! construye las tablas auxiliares que la generación de código consulta:
//!
//! - `id2val`: nombre que puede aparecer como valor → expresión de Rust.
//! - `basetype`: tipo primitivo del IDL → etiqueta de cable ([`Primitive`]).
//! - `typemap`: etiqueta de cable → tipo de Rust.
//!
//! Esta fase es una función pura: no consulta ni modifica la tabla de
//! símbolos del lexer.

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::Serialize;

use crate::{
    ir::*,
    lex::{self, Identifier},
    symbol::{Define, DefineValue},
};

/// Profundidad máxima al evaluar cadenas de constantes.
const MAX_DEPTH: usize = 32;

/// Etiqueta de cable de un tipo primitivo.
///
/// Cada etiqueta corresponde a exactamente un par de rutinas
/// `pack_*`/`unpack_*` del runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Int,
    Uint,
    Bool,
    Hyper,
    Uhyper,
    Float,
    Double,
    String,
    Opaque,
}

impl Primitive {
    pub const ALL: [Primitive; 9] = [
        Primitive::Int,
        Primitive::Uint,
        Primitive::Bool,
        Primitive::Hyper,
        Primitive::Uhyper,
        Primitive::Float,
        Primitive::Double,
        Primitive::String,
        Primitive::Opaque,
    ];

    /// Sufijo de las rutinas del runtime, como en `pack_uhyper`.
    pub fn routine(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Uint => "uint",
            Primitive::Bool => "bool",
            Primitive::Hyper => "hyper",
            Primitive::Uhyper => "uhyper",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::String => "string",
            Primitive::Opaque => "opaque",
        }
    }

    /// Tipo de Rust que representa valores de esta etiqueta.
    pub fn host(self) -> &'static str {
        match self {
            Primitive::Int => "i32",
            Primitive::Uint => "u32",
            Primitive::Bool => "bool",
            Primitive::Hyper => "i64",
            Primitive::Uhyper => "u64",
            Primitive::Float => "f32",
            Primitive::Double => "f64",
            Primitive::String => "String",
            Primitive::Opaque => "Vec<u8>",
        }
    }

    /// `string` y `opaque` son blobs de bytes y no implementan `Copy`.
    pub fn is_blob(self) -> bool {
        matches!(self, Primitive::String | Primitive::Opaque)
    }
}

bitflags! {
    /// Grupos de declaraciones presentes en un [`Bundle`].
    pub struct Groups: u32 {
        const CONSTS   = 0x01;
        const ENUMS    = 0x02;
        const STRUCTS  = 0x04;
        const UNIONS   = 0x08;
        const TYPEDEFS = 0x10;
        const PROGRAMS = 0x20;
    }
}

/// Clase de un tipo declarado, según [`Bundle::resolve()`].
#[derive(Copy, Clone, Debug)]
pub enum Kind<'a> {
    Enum(&'a Enum),
    Struct(&'a Struct),
    Union(&'a Union),
    Typedef(&'a Typedef),
}

/// IR normalizada, lista para generación.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    #[serde(rename = "const")]
    pub consts: Vec<Const>,
    #[serde(rename = "enum")]
    pub enums: Vec<Enum>,
    #[serde(rename = "struct")]
    pub structs: Vec<Struct>,
    #[serde(rename = "union")]
    pub unions: Vec<Union>,
    #[serde(rename = "typedef")]
    pub typedefs: Vec<Typedef>,
    #[serde(rename = "program")]
    pub programs: Vec<Program>,

    pub id2val: BTreeMap<String, String>,
    pub basetype: BTreeMap<Type, Primitive>,
    pub typemap: BTreeMap<Primitive, &'static str>,
}

/// Construye un [`Bundle`] a partir de declaraciones y definiciones externas.
///
/// Las definiciones enteras que la fuente no declara se agregan al
/// inicio del grupo de constantes.
pub fn normalize(declarations: Vec<Declaration>, defines: &[Define]) -> Bundle {
    let mut bundle = Bundle {
        consts: Vec::new(),
        enums: Vec::new(),
        structs: Vec::new(),
        unions: Vec::new(),
        typedefs: Vec::new(),
        programs: Vec::new(),
        id2val: BTreeMap::new(),
        basetype: basetype(),
        typemap: Primitive::ALL
            .iter()
            .map(|&primitive| (primitive, primitive.host()))
            .collect(),
    };

    for define in defines {
        let name = lex::escape(define.name.clone());
        let declared = declarations.iter().any(|decl| decl.name().as_str() == name);

        if let (DefineValue::Int(value), false) = (&define.value, declared) {
            bundle.consts.push(Const {
                name: Identifier::from(name),
                value: Value::Literal(value.clone()),
            });
        }
    }

    for declaration in declarations {
        match declaration {
            Declaration::Const(decl) => bundle.consts.push(decl),
            Declaration::Enum(decl) => bundle.enums.push(decl),
            Declaration::Struct(decl) => bundle.structs.push(decl),
            Declaration::Union(decl) => bundle.unions.push(decl),
            Declaration::Typedef(decl) => bundle.typedefs.push(decl),
            Declaration::Program(decl) => bundle.programs.push(decl),
        }
    }

    bundle.normalize_literals();

    bundle.id2val.insert("TRUE".to_owned(), "true".to_owned());
    bundle.id2val.insert("FALSE".to_owned(), "false".to_owned());

    for decl in &bundle.consts {
        bundle
            .id2val
            .insert(decl.name.to_string(), format!("constant::{}", decl.name));
    }

    for decl in &bundle.enums {
        for member in &decl.values {
            bundle
                .id2val
                .insert(member.name.to_string(), format!("{}::{}", decl.name, member.name));
        }
    }

    tracing::debug!(
        consts = bundle.consts.len(),
        enums = bundle.enums.len(),
        structs = bundle.structs.len(),
        unions = bundle.unions.len(),
        typedefs = bundle.typedefs.len(),
        programs = bundle.programs.len(),
        "normalized"
    );

    bundle
}

impl Bundle {
    /// Grupos no vacíos.
    pub fn groups(&self) -> Groups {
        let mut groups = Groups::empty();
        groups.set(Groups::CONSTS, !self.consts.is_empty());
        groups.set(Groups::ENUMS, !self.enums.is_empty());
        groups.set(Groups::STRUCTS, !self.structs.is_empty());
        groups.set(Groups::UNIONS, !self.unions.is_empty());
        groups.set(Groups::TYPEDEFS, !self.typedefs.is_empty());
        groups.set(Groups::PROGRAMS, !self.programs.is_empty());

        groups
    }

    /// Busca un tipo declarado por nombre.
    pub fn resolve(&self, name: &str) -> Option<Kind<'_>> {
        let enums = self.enums.iter().map(Kind::Enum);
        let structs = self.structs.iter().map(Kind::Struct);
        let unions = self.unions.iter().map(Kind::Union);
        let typedefs = self.typedefs.iter().map(Kind::Typedef);

        enums
            .chain(structs)
            .chain(unions)
            .chain(typedefs)
            .find(|kind| kind.name().as_str() == name)
    }

    /// Evalúa un valor a entero, si es posible.
    ///
    /// Los nombres se resuelven a través de constantes, miembros de
    /// enum y `TRUE`/`FALSE`. Retorna `None` para nombres desconocidos
    /// o cadenas circulares.
    pub fn evaluate(&self, value: &Value) -> Option<i64> {
        self.evaluate_at(value, 0)
    }

    fn evaluate_at(&self, value: &Value, depth: usize) -> Option<i64> {
        let name = match value {
            Value::Literal(literal) => return parse_literal(literal),
            Value::Name(_) if depth >= MAX_DEPTH => return None,
            Value::Name(name) => name.as_str(),
        };

        match name {
            "TRUE" => return Some(1),
            "FALSE" => return Some(0),
            _ => (),
        }

        let constant = self
            .consts
            .iter()
            .find(|decl| decl.name.as_str() == name)
            .map(|decl| &decl.value);

        let member = || {
            self.enums
                .iter()
                .flat_map(|decl| decl.values.iter())
                .find(|member| member.name.as_str() == name)
                .map(|member| &member.value)
        };

        let next = constant.or_else(member)?;
        self.evaluate_at(next, depth + 1)
    }

    fn normalize_literals(&mut self) {
        let values = self
            .consts
            .iter_mut()
            .map(|decl| &mut decl.value)
            .chain(
                self.enums
                    .iter_mut()
                    .flat_map(|decl| decl.values.iter_mut())
                    .map(|member| &mut member.value),
            )
            .chain(
                self.structs
                    .iter_mut()
                    .flat_map(|decl| decl.entries.iter_mut())
                    .filter_map(|field| note_length(&mut field.note)),
            )
            .chain(
                self.typedefs
                    .iter_mut()
                    .filter_map(|decl| note_length(&mut decl.note)),
            );

        values.for_each(normalize_value);

        for union in &mut self.unions {
            for case in &mut union.cases {
                if let Label::Value(value) = &mut case.label {
                    normalize_value(value);
                }

                if let Some(length) = note_length(&mut case.note) {
                    normalize_value(length);
                }
            }
        }

        for program in &mut self.programs {
            normalize_value(&mut program.num);
            for version in &mut program.versions {
                normalize_value(&mut version.num);
                for procedure in &mut version.procs {
                    normalize_value(&mut procedure.id);
                }
            }
        }
    }
}

impl<'a> Kind<'a> {
    pub fn name(&self) -> &'a Identifier {
        match *self {
            Kind::Enum(decl) => &decl.name,
            Kind::Struct(decl) => &decl.name,
            Kind::Union(decl) => &decl.name,
            Kind::Typedef(decl) => &decl.name,
        }
    }
}

/// Reescribe un literal a la ortografía de Rust.
///
/// Se descarta un `+` inicial, un decimal con cero inicial se interpreta
/// como octal (`010` → `0o10`) y `0X` pasa a `0x`.
pub fn literal(text: &str) -> String {
    let text = text.strip_prefix('+').unwrap_or(text);
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text),
    };

    if let Some(hex) = digits.strip_prefix("0X") {
        return format!("{}0x{}", sign, hex);
    }

    let octal = digits.len() > 1
        && digits.starts_with('0')
        && digits.bytes().all(|digit| (b'0'..=b'7').contains(&digit));

    if !octal {
        return format!("{}{}", sign, digits);
    }

    match digits.trim_start_matches('0') {
        "" => "0".to_owned(),
        rest => format!("{}0o{}", sign, rest),
    }
}

/// Interpreta un literal ya normalizado.
fn parse_literal(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };

    let magnitude = if let Some(hex) = digits.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(octal) = digits.strip_prefix("0o") {
        i128::from_str_radix(octal, 8).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };

    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

fn normalize_value(value: &mut Value) {
    if let Value::Literal(text) = value {
        *text = literal(text);
    }
}

fn note_length(note: &mut Note) -> Option<&mut Value> {
    match note {
        Note::Array {
            length: Some(length),
            ..
        } => Some(length),

        _ => None,
    }
}

fn basetype() -> BTreeMap<Type, Primitive> {
    [
        (Type::Int, Primitive::Int),
        (Type::UnsignedInt, Primitive::Uint),
        (Type::Bool, Primitive::Bool),
        (Type::Hyper, Primitive::Hyper),
        (Type::UnsignedHyper, Primitive::Uhyper),
        (Type::Float, Primitive::Float),
        (Type::Double, Primitive::Double),
        (Type::String, Primitive::String),
        (Type::Opaque, Primitive::Opaque),
        (Type::Netobj, Primitive::Opaque),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(name: &str) -> Identifier {
        Identifier::from(name)
    }

    fn literal_value(text: &str) -> Value {
        Value::Literal(text.to_owned())
    }

    fn sample() -> Vec<Declaration> {
        vec![
            Declaration::Const(Const {
                name: name("MAX"),
                value: literal_value("010"),
            }),
            Declaration::Enum(Enum {
                name: name("Color"),
                values: vec![
                    EnumMember {
                        name: name("RED"),
                        value: literal_value("+1"),
                    },
                    EnumMember {
                        name: name("BLUE"),
                        value: Value::Name(name("MAX")),
                    },
                ],
            }),
            Declaration::Struct(Struct {
                name: name("Point"),
                entries: vec![],
            }),
        ]
    }

    #[test]
    fn literals_take_rust_spelling() {
        assert_eq!(literal("010"), "0o10");
        assert_eq!(literal("-010"), "-0o10");
        assert_eq!(literal("+7"), "7");
        assert_eq!(literal("0"), "0");
        assert_eq!(literal("00"), "0");
        assert_eq!(literal("0X1f"), "0x1f");
        assert_eq!(literal("09"), "09");
    }

    #[test]
    fn groups_and_tables() {
        let bundle = normalize(sample(), &[]);

        assert_eq!(bundle.groups(), Groups::CONSTS | Groups::ENUMS | Groups::STRUCTS);
        assert_eq!(bundle.consts[0].value, literal_value("0o10"));
        assert_eq!(bundle.enums[0].values[0].value, literal_value("1"));

        assert_eq!(bundle.id2val["MAX"], "constant::MAX");
        assert_eq!(bundle.id2val["BLUE"], "Color::BLUE");
        assert_eq!(bundle.id2val["TRUE"], "true");

        assert_eq!(bundle.basetype[&Type::Netobj], Primitive::Opaque);
        assert_eq!(bundle.typemap[&Primitive::Uhyper], "u64");
    }

    #[test]
    fn values_evaluate_through_names() {
        let bundle = normalize(sample(), &[]);

        assert_eq!(bundle.evaluate(&Value::Name(name("BLUE"))), Some(8));
        assert_eq!(bundle.evaluate(&Value::Name(name("FALSE"))), Some(0));
        assert_eq!(bundle.evaluate(&literal_value("-0x10")), Some(-16));
        assert_eq!(bundle.evaluate(&Value::Name(name("NOPE"))), None);
    }

    #[test]
    fn circular_constants_do_not_evaluate() {
        let decls = vec![
            Declaration::Const(Const {
                name: name("A"),
                value: Value::Name(name("B")),
            }),
            Declaration::Const(Const {
                name: name("B"),
                value: Value::Name(name("A")),
            }),
        ];

        assert_eq!(normalize(decls, &[]).evaluate(&Value::Name(name("A"))), None);
    }

    #[test]
    fn integer_defines_become_constants() {
        let defines: Vec<Define> = ["SIZE=16", "MAX=99", "LABEL=text"]
            .iter()
            .map(|text| text.parse().unwrap())
            .collect();

        let bundle = normalize(sample(), &defines);
        let names: Vec<_> = bundle.consts.iter().map(|decl| decl.name.to_string()).collect();

        assert_eq!(names, vec!["SIZE", "MAX"]);
        assert_eq!(bundle.id2val["SIZE"], "constant::SIZE");
    }

    #[test]
    fn declared_types_resolve() {
        let bundle = normalize(sample(), &[]);

        assert!(matches!(bundle.resolve("Point"), Some(Kind::Struct(_))));
        assert!(matches!(bundle.resolve("Color"), Some(Kind::Enum(_))));
        assert!(bundle.resolve("MAX").is_none());
    }
}
