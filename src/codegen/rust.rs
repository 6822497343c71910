//! Plantilla de Rust.
//!
//! Cada declaración produce un tipo que implementa `Xdr` y, si se pide,
//! `Structural`. Las primitivas se codifican llamando directamente a la
//! rutina `pack_*`/`unpack_*` que corresponde a su [`Primitive`]; los
//! tipos compuestos delegan en su propia implementación, lo cual resuelve
//! de forma perezosa las referencias recursivas.

use std::{
    collections::HashSet,
    fmt,
    io::{self, Write},
};

use super::{EmitOptions, GenerateError, Result, Template};
use crate::{
    ir::*,
    lex::Identifier,
    normalize::{Bundle, Groups, Kind, Primitive},
};

// Cadenas de alias más largas que esto se consideran circulares
const MAX_ALIASES: usize = 32;

const ALLOWS: &str = "non_camel_case_types, non_snake_case, non_upper_case_globals, \
                      dead_code, unused_imports, clippy::all";

/// Plantilla por defecto: un módulo de Rust sobre `xdr_runtime`.
#[derive(Copy, Clone, Debug, Default)]
pub struct RustTemplate {
    options: EmitOptions,
}

impl RustTemplate {
    pub fn new(options: EmitOptions) -> Self {
        RustTemplate { options }
    }
}

impl Template for RustTemplate {
    fn render(&self, bundle: &Bundle, output: &mut dyn Write) -> Result<()> {
        let mut emitter = Emitter {
            bundle,
            options: self.options,
            output,
            depth: 0,
        };

        emitter.module()
    }
}

/// Tipo de un dato sin considerar su forma (arreglo, puntero).
#[derive(Copy, Clone)]
enum Shape<'a> {
    Primitive(Primitive, &'a str),
    Composite(&'a Identifier),
}

enum Length {
    Fixed(String),
    Bounded(Option<String>),
}

/// Forma completa de un campo, brazo o alias.
enum Layout<'a> {
    Raw(Shape<'a>),
    Blob(Primitive, Length),
    Array(Shape<'a>, Length),
    Optional(Shape<'a>),
}

/// Acceso a un dato desde el código emitido.
enum Access<'s> {
    /// Una expresión de lugar de tipo `T`, como `self.x`.
    Place(&'s str),

    /// Una expresión de tipo `&T`, como una variable ligada por `if let`.
    Ref(&'s str),
}

impl Access<'_> {
    fn copied(&self) -> String {
        match self {
            Access::Place(place) => place.to_string(),
            Access::Ref(reference) => format!("*{}", reference),
        }
    }

    fn borrowed(&self) -> String {
        match self {
            Access::Place(place) => format!("&{}", place),
            Access::Ref(reference) => reference.to_string(),
        }
    }

    fn target(&self) -> &str {
        match self {
            Access::Place(expr) | Access::Ref(expr) => expr,
        }
    }
}

impl Length {
    fn bound(&self) -> String {
        match self {
            Length::Fixed(length) | Length::Bounded(Some(length)) => format!("Some({})", length),
            Length::Bounded(None) => "None".to_owned(),
        }
    }
}

impl Shape<'_> {
    fn rust_type(&self) -> String {
        match self {
            Shape::Primitive(_, host) => host.to_string(),
            Shape::Composite(name) => name.to_string(),
        }
    }

    fn pack_item(&self) -> String {
        match self {
            Shape::Primitive(primitive, _) if primitive.is_blob() => {
                format!("|packer, item| packer.pack_{}(item, None)", primitive.routine())
            }

            Shape::Primitive(primitive, _) => {
                format!("|packer, item| packer.pack_{}(*item)", primitive.routine())
            }

            Shape::Composite(_) => "|packer, item| item.pack(packer)".to_owned(),
        }
    }

    fn unpack_item(&self) -> String {
        match self {
            Shape::Primitive(primitive, _) if primitive.is_blob() => {
                format!("|unpacker| unpacker.unpack_{}(None)", primitive.routine())
            }

            Shape::Primitive(primitive, _) => {
                format!("|unpacker| unpacker.unpack_{}()", primitive.routine())
            }

            Shape::Composite(name) => format!("|unpacker| {}::unpack(unpacker)", name),
        }
    }
}

impl Layout<'_> {
    fn rust_type(&self) -> String {
        match self {
            Layout::Raw(shape) => shape.rust_type(),
            Layout::Blob(Primitive::String, _) => "String".to_owned(),
            Layout::Blob(_, _) => "Vec<u8>".to_owned(),
            Layout::Array(shape, _) => format!("Vec<{}>", shape.rust_type()),
            Layout::Optional(shape @ Shape::Primitive(..)) => format!("Option<{}>", shape.rust_type()),
            Layout::Optional(shape) => format!("Option<Box<{}>>", shape.rust_type()),
        }
    }

    /// Expresión de tipo `Result<()>` que codifica el dato.
    fn pack(&self, access: &Access<'_>) -> String {
        match self {
            Layout::Raw(Shape::Primitive(primitive, _)) => {
                format!("packer.pack_{}({})", primitive.routine(), access.copied())
            }

            Layout::Raw(Shape::Composite(_)) => format!("{}.pack(packer)", access.target()),

            Layout::Blob(primitive, Length::Fixed(length)) => format!(
                "packer.pack_f{}({}, {})",
                primitive.routine(),
                access.borrowed(),
                length
            ),

            Layout::Blob(primitive, length) => format!(
                "packer.pack_{}({}, {})",
                primitive.routine(),
                access.borrowed(),
                length.bound()
            ),

            Layout::Array(shape, Length::Fixed(length)) => format!(
                "packer.pack_farray({}, {}, {})",
                access.borrowed(),
                length,
                shape.pack_item()
            ),

            Layout::Array(shape, length) => format!(
                "packer.pack_array({}, {}, {})",
                access.borrowed(),
                length.bound(),
                shape.pack_item()
            ),

            Layout::Optional(shape @ Shape::Primitive(..)) => format!(
                "packer.pack_optional({}.as_ref(), {})",
                access.target(),
                shape.pack_item()
            ),

            Layout::Optional(shape) => format!(
                "packer.pack_optional({}.as_deref(), {})",
                access.target(),
                shape.pack_item()
            ),
        }
    }

    /// Expresión de tipo `Result<T>` que decodifica el dato.
    fn unpack(&self) -> String {
        match self {
            Layout::Raw(Shape::Primitive(primitive, _)) => {
                format!("unpacker.unpack_{}()", primitive.routine())
            }

            Layout::Raw(Shape::Composite(name)) => format!("{}::unpack(unpacker)", name),

            Layout::Blob(primitive, Length::Fixed(length)) => {
                format!("unpacker.unpack_f{}({})", primitive.routine(), length)
            }

            Layout::Blob(primitive, length) => {
                format!("unpacker.unpack_{}({})", primitive.routine(), length.bound())
            }

            Layout::Array(shape, Length::Fixed(length)) => {
                format!("unpacker.unpack_farray({}, {})", length, shape.unpack_item())
            }

            Layout::Array(shape, length) => format!(
                "unpacker.unpack_array({}, {})",
                length.bound(),
                shape.unpack_item()
            ),

            Layout::Optional(Shape::Composite(name)) => format!(
                "unpacker.unpack_optional(|unpacker| {}::unpack(unpacker).map(Box::new))",
                name
            ),

            Layout::Optional(shape) => format!("unpacker.unpack_optional({})", shape.unpack_item()),
        }
    }
}

/// Brazo con carga útil de una unión, ya deduplicado.
struct Arm<'a> {
    name: &'a Identifier,
    ty: &'a Type,
    note: &'a Note,
    layout: Layout<'a>,
}

impl Arm<'_> {
    /// Los brazos compuestos van en `Box`, ya que una unión puede ser
    /// recursiva a través de sus propios brazos.
    fn boxed(&self) -> bool {
        matches!(self.layout, Layout::Raw(Shape::Composite(_)))
    }

    fn rust_type(&self) -> String {
        match self.boxed() {
            true => format!("Box<{}>", self.layout.rust_type()),
            false => self.layout.rust_type(),
        }
    }

    /// Expresión de tipo `T` o `Box<T>` a partir de un `Result<T>`.
    fn unpack(&self) -> String {
        match self.boxed() {
            true => format!("Box::new({}?)", self.layout.unpack()),
            false => format!("{}?", self.layout.unpack()),
        }
    }
}

struct Emitter<'a, 'w> {
    bundle: &'a Bundle,
    options: EmitOptions,
    output: &'w mut dyn Write,
    depth: usize,
}

impl<'a, 'w> Emitter<'a, 'w> {
    fn output(&mut self) -> &mut (dyn Write + 'w) {
        &mut *self.output
    }

    fn indent(&mut self) -> io::Result<()> {
        let width = self.depth * 4;
        write!(self.output, "{:width$}", "", width = width)
    }

    fn open(&mut self, header: fmt::Arguments<'_>) -> Result<()> {
        emit!(self, "{} {{", header)?;
        self.depth += 1;

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.depth -= 1;
        emit!(self, "}}")?;

        Ok(())
    }

    fn structural(&self) -> bool {
        self.options.contains(EmitOptions::STRUCTURAL)
    }

    fn module(&mut self) -> Result<()> {
        emit!(self, "// @generated by xdrgen")?;
        if self.options.contains(EmitOptions::INNER_ATTRIBUTES) {
            emit!(self, "#![allow({})]", ALLOWS)?;
        }

        emit!(self)?;
        self.prelude()?;

        let bundle = self.bundle;
        if !bundle.consts.is_empty() {
            self.constants()?;
        }

        for decl in &bundle.enums {
            self.enumeration(decl)?;
        }

        for decl in &bundle.structs {
            self.structure(decl)?;
        }

        for decl in &bundle.unions {
            self.union(decl)?;
        }

        for decl in &bundle.typedefs {
            self.typedef(decl)?;
        }

        for decl in &bundle.programs {
            self.program(decl)?;
        }

        Ok(())
    }

    fn prelude(&mut self) -> Result<()> {
        let groups = self.bundle.groups();
        let types = groups.intersects(Groups::ENUMS | Groups::STRUCTS | Groups::UNIONS | Groups::TYPEDEFS);
        let objects = groups.intersects(Groups::STRUCTS | Groups::UNIONS);

        let mut items = Vec::new();
        if types {
            items.extend(["Packer", "Unpacker", "Xdr"]);
        }

        if groups.intersects(Groups::ENUMS | Groups::UNIONS) {
            items.push("XdrError");
        }

        if types && self.structural() {
            items.extend(["Structural", "Value"]);
            if objects {
                items.extend(["Map", "structural"]);
            }
        }

        if groups.contains(Groups::PROGRAMS) {
            items.push("Procedure");
        }

        items.sort_unstable();
        match items.as_slice() {
            [] => return Ok(()),
            [item] => emit!(self, "use ::xdr_runtime::{};", item)?,
            items => emit!(self, "use ::xdr_runtime::{{{}}};", items.join(", "))?,
        }

        emit!(self)?;
        Ok(())
    }

    fn constants(&mut self) -> Result<()> {
        let bundle = self.bundle;
        let mut lines = Vec::with_capacity(bundle.consts.len());

        for decl in &bundle.consts {
            let value = self.value(&decl.value, "i64", decl.name.as_str())?;
            lines.push(format!("pub const {}: i64 = {};", decl.name, value));
        }

        let by_name = bundle
            .consts
            .iter()
            .any(|decl| matches!(decl.value, Value::Name(_)));

        self.open(format_args!("pub mod constant"))?;
        if by_name {
            emit!(self, "use super::*;")?;
            emit!(self)?;
        }

        for line in &lines {
            emit!(self, "{}", line)?;
        }

        self.close()?;
        emit!(self)?;

        Ok(())
    }

    fn enumeration(&mut self, decl: &'a Enum) -> Result<()> {
        let name = &decl.name;

        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(decl.values.len());

        for member in &decl.values {
            // Se emite el valor ya evaluado, lo cual evita ciclos cuando un
            // miembro se define en términos de otro del mismo enum
            let number = self.bundle.evaluate(&member.value);
            let discriminant = match (&member.value, number) {
                (Value::Literal(literal), _) => literal.clone(),
                (Value::Name(_), Some(number)) => number.to_string(),
                (Value::Name(unknown), None) => {
                    return Err(GenerateError::UnknownValue {
                        name: unknown.to_string(),
                        context: format!("{}.{}", name, member.name),
                    })
                }
            };

            if let Some(number) = number {
                if i32::try_from(number).is_err() {
                    return Err(GenerateError::OutOfRange {
                        context: format!("{}.{}", name, member.name),
                        value: number,
                        ty: "i32",
                    });
                }

                if !seen.insert(number) {
                    return Err(GenerateError::DuplicateLabel {
                        within: name.to_string(),
                        label: member.value.to_string(),
                    });
                }
            }

            members.push((&member.name, discriminant));
        }

        emit!(self, "#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]")?;
        emit!(self, "#[repr(i32)]")?;
        self.open(format_args!("pub enum {}", name))?;
        for (index, (member, discriminant)) in members.iter().enumerate() {
            if index == 0 {
                emit!(self, "#[default]")?;
            }

            emit!(self, "{} = {},", member, discriminant)?;
        }

        self.close()?;
        emit!(self)?;

        self.open(format_args!("impl {}", name))?;
        emit!(self, "pub const MEMBERS: &'static [{}] = &[", name)?;
        self.depth += 1;
        for (member, _) in &members {
            emit!(self, "{}::{},", name, member)?;
        }

        self.depth -= 1;
        emit!(self, "];")?;
        emit!(self)?;

        self.open(format_args!("pub const fn value(self) -> i32"))?;
        emit!(self, "self as i32")?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("pub fn from_value(value: i32) -> Option<Self>"))?;
        emit!(self, "Self::MEMBERS.iter().copied().find(|member| member.value() == value)")?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("pub fn name(self) -> &'static str"))?;
        self.open(format_args!("match self"))?;
        for (member, _) in &members {
            emit!(self, "{0}::{1} => \"{1}\",", name, member)?;
        }

        self.close()?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("pub fn from_name(name: &str) -> Option<Self>"))?;
        emit!(self, "Self::MEMBERS.iter().copied().find(|member| member.name() == name)")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("impl From<{}> for i64", name))?;
        self.open(format_args!("fn from(member: {}) -> i64", name))?;
        emit!(self, "member as i64")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("impl Xdr for {}", name))?;
        self.pack_header()?;
        emit!(self, "packer.pack_int(self.value())")?;
        self.close()?;
        emit!(self)?;

        self.unpack_header()?;
        emit!(self, "let value = unpacker.unpack_int()?;")?;
        self.open(format_args!(
            "Self::from_value(value).ok_or(XdrError::UnknownDiscriminant"
        ))?;
        emit!(self, "name: \"{}\",", name)?;
        emit!(self, "value: value.into(),")?;
        self.depth -= 1;
        emit!(self, "}})")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        if !self.structural() {
            return Ok(());
        }

        self.open(format_args!("impl Structural for {}", name))?;
        self.open(format_args!("fn to_structural(&self) -> Value"))?;
        emit!(self, "Value::from(self.name())")?;
        self.close()?;
        emit!(self)?;

        self.from_structural_header()?;
        self.open(format_args!("if let Some(member) = value.as_str()"))?;
        self.open(format_args!(
            "return Self::from_name(member).ok_or_else(|| XdrError::UnknownMember"
        ))?;
        emit!(self, "name: \"{}\",", name)?;
        emit!(self, "member: member.to_owned(),")?;
        self.depth -= 1;
        emit!(self, "}});")?;
        self.close()?;
        emit!(self)?;

        emit!(self, "let value = i32::from_structural(value)?;")?;
        self.open(format_args!(
            "Self::from_value(value).ok_or(XdrError::UnknownDiscriminant"
        ))?;
        emit!(self, "name: \"{}\",", name)?;
        emit!(self, "value: value.into(),")?;
        self.depth -= 1;
        emit!(self, "}})")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        Ok(())
    }

    fn structure(&mut self, decl: &'a Struct) -> Result<()> {
        let name = &decl.name;

        let mut fields = Vec::with_capacity(decl.entries.len());
        for field in &decl.entries {
            let context = format!("{}.{}", name, field.name);
            let layout = self.layout(&field.ty, &field.note, &context)?;
            fields.push((&field.name, layout));
        }

        emit!(self, "#[derive(Debug, Clone, PartialEq, Default)]")?;
        self.open(format_args!("pub struct {}", name))?;
        for (field, layout) in &fields {
            let ty = layout.rust_type();
            emit!(self, "pub {}: {},", field, ty)?;
        }

        self.close()?;
        emit!(self)?;

        self.open(format_args!("impl Xdr for {}", name))?;
        self.pack_header()?;
        for (field, layout) in &fields {
            let place = format!("self.{}", field);
            let pack = layout.pack(&Access::Place(&place));
            emit!(self, "{}?;", pack)?;
        }

        emit!(self, "Ok(())")?;
        self.close()?;
        emit!(self)?;

        self.unpack_header()?;
        self.open(format_args!("Ok({}", name))?;
        for (field, layout) in &fields {
            let unpack = layout.unpack();
            emit!(self, "{}: {}?,", field, unpack)?;
        }

        self.depth -= 1;
        emit!(self, "}})")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        if !self.structural() {
            return Ok(());
        }

        self.open(format_args!("impl Structural for {}", name))?;
        self.open(format_args!("fn to_structural(&self) -> Value"))?;
        emit!(self, "let mut map = Map::new();")?;
        for (field, _) in &fields {
            emit!(self, "map.insert(\"{0}\".to_owned(), self.{0}.to_structural());", field)?;
        }

        emit!(self, "Value::Object(map)")?;
        self.close()?;
        emit!(self)?;

        self.from_structural_header()?;
        emit!(self, "let map = structural::object(value, \"{}\")?;", name)?;
        self.open(format_args!("Ok({}", name))?;
        for (field, _) in &fields {
            emit!(self, "{0}: structural::field(map, \"{0}\")?,", field)?;
        }

        self.depth -= 1;
        emit!(self, "}})")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        Ok(())
    }

    fn union(&mut self, decl: &'a Union) -> Result<()> {
        let name = &decl.name;
        let discriminant = &decl.discriminant;

        let context = format!("{}.{}", name, discriminant.name);
        let tag = self.layout(&discriminant.ty, &Note::Raw, &context)?;
        let key = self.key(&discriminant.ty, format!("self.{}", discriminant.name), name)?;

        let mut arms: Vec<Arm<'a>> = Vec::new();
        let mut branches = Vec::new();
        let mut default = None;
        let mut seen = HashSet::new();

        for case in &decl.cases {
            let target = match (&case.ty, &case.name) {
                (Some(ty), Some(arm)) => {
                    self.arm(decl, &mut arms, ty, arm, &case.note)?;
                    Some(arm)
                }

                _ => None,
            };

            match &case.label {
                Label::Default if default.is_some() => {
                    return Err(GenerateError::DuplicateLabel {
                        within: name.to_string(),
                        label: case.label.to_string(),
                    })
                }

                Label::Default => default = Some(target),

                Label::Value(value) => {
                    let condition = self.value(value, "i64", name.as_str())?;
                    if let Some(number) = self.bundle.evaluate(value) {
                        if !seen.insert(number) {
                            return Err(GenerateError::DuplicateLabel {
                                within: name.to_string(),
                                label: value.to_string(),
                            });
                        }
                    }

                    branches.push((condition, target));
                }
            }
        }

        emit!(self, "#[derive(Debug, Clone, PartialEq, Default)]")?;
        self.open(format_args!("pub struct {}", name))?;
        let tag_type = tag.rust_type();
        emit!(self, "pub {}: {},", discriminant.name, tag_type)?;
        for arm in &arms {
            let ty = arm.rust_type();
            emit!(self, "pub {}: Option<{}>,", arm.name, ty)?;
        }

        self.close()?;
        emit!(self)?;

        // Selección de brazo según el discriminante
        self.open(format_args!("impl {}", name))?;
        self.open(format_args!("pub fn arm(&self) -> Option<&'static str>"))?;

        // Sin `default`, un discriminante desconocido no selecciona brazo
        let unmatched = selected(default.flatten());

        if branches.is_empty() {
            emit!(self, "{}", unmatched)?;
        } else {
            emit!(self, "let key = {};", key)?;
            for (index, (condition, target)) in branches.iter().enumerate() {
                let keyword = if index == 0 { "if" } else { "} else if" };
                let target = selected(*target);

                emit!(self, "{} key == {} {{", keyword, condition)?;
                emit!(self, "    {}", target)?;
            }

            emit!(self, "}} else {{")?;
            emit!(self, "    {}", unmatched)?;
            emit!(self, "}}")?;
        }

        self.close()?;
        self.close()?;
        emit!(self)?;

        let tag_place = format!("self.{}", discriminant.name);

        self.open(format_args!("impl Xdr for {}", name))?;
        self.pack_header()?;
        let pack = tag.pack(&Access::Place(&tag_place));
        emit!(self, "{}?;", pack)?;

        if !arms.is_empty() {
            self.open(format_args!("match self.arm()"))?;
            for arm in &arms {
                let pack = arm.layout.pack(&Access::Ref("arm"));
                self.open(format_args!("Some(\"{0}\") => match &self.{0}", arm.name))?;
                emit!(self, "Some(arm) => {}?,", pack)?;
                self.open(format_args!("None => return Err(XdrError::MissingArm"))?;
                emit!(self, "union: \"{}\",", name)?;
                emit!(self, "arm: \"{}\",", arm.name)?;
                self.depth -= 1;
                emit!(self, "}}),")?;
                self.depth -= 1;
                emit!(self, "}},")?;
            }

            emit!(self, "_ => (),")?;
            self.close()?;
        }

        emit!(self)?;
        emit!(self, "Ok(())")?;
        self.close()?;
        emit!(self)?;

        self.unpack_header()?;
        emit!(self, "let mut result = {}::default();", name)?;
        let unpack = tag.unpack();
        emit!(self, "result.{} = {}?;", discriminant.name, unpack)?;
        emit!(self)?;

        if !arms.is_empty() {
            self.open(format_args!("match result.arm()"))?;
            for arm in &arms {
                let unpack = arm.unpack();
                emit!(self, "Some(\"{}\") => result.{} = Some({}),", arm.name, arm.name, unpack)?;
            }

            emit!(self, "_ => (),")?;
            self.close()?;
        }

        emit!(self)?;
        emit!(self, "Ok(result)")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        if !self.structural() {
            return Ok(());
        }

        self.open(format_args!("impl Structural for {}", name))?;
        self.open(format_args!("fn to_structural(&self) -> Value"))?;
        emit!(self, "let mut map = Map::new();")?;
        emit!(
            self,
            "map.insert(\"{0}\".to_owned(), self.{0}.to_structural());",
            discriminant.name
        )?;

        if !arms.is_empty() {
            emit!(self)?;
            self.open(format_args!("match self.arm()"))?;
            for arm in &arms {
                self.open(format_args!("Some(\"{}\") =>", arm.name))?;
                self.open(format_args!("if let Some(arm) = &self.{}", arm.name))?;
                emit!(self, "map.insert(\"{}\".to_owned(), arm.to_structural());", arm.name)?;
                self.close()?;
                self.close()?;
            }

            emit!(self, "_ => (),")?;
            self.close()?;
        }

        emit!(self)?;
        emit!(self, "Value::Object(map)")?;
        self.close()?;
        emit!(self)?;

        self.from_structural_header()?;
        emit!(self, "let map = structural::object(value, \"{}\")?;", name)?;
        emit!(self, "let mut result = {}::default();", name)?;
        emit!(
            self,
            "result.{0} = structural::field(map, \"{0}\")?;",
            discriminant.name
        )?;
        emit!(self)?;

        if !arms.is_empty() {
            self.open(format_args!("match result.arm()"))?;
            for arm in &arms {
                emit!(
                    self,
                    "Some(\"{0}\") => result.{0} = structural::arm(map, \"{0}\")?,",
                    arm.name
                )?;
            }

            emit!(self, "_ => (),")?;
            self.close()?;
        }

        emit!(self)?;
        emit!(self, "Ok(result)")?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        Ok(())
    }

    /// Registra un brazo con carga útil, verificando que un mismo nombre
    /// no se use con tipos distintos.
    fn arm(
        &self,
        decl: &'a Union,
        arms: &mut Vec<Arm<'a>>,
        ty: &'a Type,
        name: &'a Identifier,
        note: &'a Note,
    ) -> Result<()> {
        let conflict = || GenerateError::ConflictingArm {
            union: decl.name.to_string(),
            arm: name.to_string(),
        };

        if *name == decl.discriminant.name {
            return Err(conflict());
        }

        match arms.iter().find(|arm| arm.name == name) {
            Some(arm) if arm.ty != ty || arm.note != note => Err(conflict()),
            Some(_) => Ok(()),
            None => {
                let context = format!("{}.{}", decl.name, name);
                let layout = self.layout(ty, note, &context)?;
                arms.push(Arm {
                    name,
                    ty,
                    note,
                    layout,
                });

                Ok(())
            }
        }
    }

    fn typedef(&mut self, decl: &'a Typedef) -> Result<()> {
        let name = &decl.name;
        let layout = self.layout(&decl.ty, &decl.note, name.as_str())?;
        let inner = layout.rust_type();

        emit!(self, "#[derive(Debug, Clone, PartialEq, Default)]")?;
        emit!(self, "pub struct {}(pub {});", name, inner)?;
        emit!(self)?;

        self.open(format_args!("impl From<{}> for {}", inner, name))?;
        self.open(format_args!("fn from(value: {}) -> Self", inner))?;
        emit!(self, "{}(value)", name)?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        self.open(format_args!("impl Xdr for {}", name))?;
        self.pack_header()?;
        let pack = layout.pack(&Access::Place("self.0"));
        emit!(self, "{}", pack)?;
        self.close()?;
        emit!(self)?;

        self.unpack_header()?;
        let unpack = layout.unpack();
        emit!(self, "Ok({}({}?))", name, unpack)?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        if !self.structural() {
            return Ok(());
        }

        self.open(format_args!("impl Structural for {}", name))?;
        self.open(format_args!("fn to_structural(&self) -> Value"))?;
        emit!(self, "self.0.to_structural()")?;
        self.close()?;
        emit!(self)?;

        self.from_structural_header()?;
        emit!(self, "<{} as Structural>::from_structural(value).map({})", inner, name)?;
        self.close()?;
        self.close()?;
        emit!(self)?;

        Ok(())
    }

    fn program(&mut self, decl: &'a Program) -> Result<()> {
        let id = self.unsigned(&decl.num, decl.name.as_str())?;

        self.open(format_args!("pub mod {}", decl.name))?;
        emit!(self, "use super::*;")?;
        emit!(self)?;
        emit!(self, "pub const ID: u32 = {};", id)?;

        for version in &decl.versions {
            emit!(self)?;
            self.version(decl, version)?;
        }

        self.close()?;
        emit!(self)?;

        Ok(())
    }

    fn version(&mut self, program: &'a Program, version: &'a Version) -> Result<()> {
        let service = format!("{}.{}", program.name, version.name);
        let id = self.unsigned(&version.num, &service)?;

        let mut procs = Vec::with_capacity(version.procs.len());
        for procedure in &version.procs {
            let context = format!("{}.{}", service, procedure.name);
            let id = self.unsigned(&procedure.id, &context)?;
            let arg = self.signature_type(&procedure.arg, &context)?;
            let res = self.signature_type(&procedure.res, &context)?;

            procs.push((procedure, id, arg, res, context));
        }

        self.open(format_args!("pub mod {}", version.name))?;
        emit!(self, "use super::*;")?;
        emit!(self)?;
        emit!(self, "pub const ID: u32 = {};", id)?;
        emit!(self)?;

        if procs.is_empty() {
            emit!(self, "pub const PROCEDURES: &[Procedure] = &[];")?;
        } else {
            emit!(self, "pub const PROCEDURES: &[Procedure] = &[")?;
            self.depth += 1;
            for (procedure, ..) in &procs {
                emit!(
                    self,
                    "Procedure {{ program: super::ID, version: ID, id: {0}::ID, name: {0}::NAME }},",
                    procedure.name
                )?;
            }

            self.depth -= 1;
            emit!(self, "];")?;
        }

        emit!(self)?;
        self.open(format_args!("pub trait Service"))?;
        for (procedure, ..) in &procs {
            let arg = match procedure.arg {
                Type::Void => String::new(),
                _ => format!(", arg: {}::Arg", procedure.name),
            };

            let res = match procedure.res {
                Type::Void => String::new(),
                _ => format!(" -> {}::Res", procedure.name),
            };

            emit!(self, "fn {}(&mut self{}){};", procedure.name, arg, res)?;
        }

        self.close()?;

        for (procedure, id, arg, res, context) in &procs {
            let named = [&procedure.arg, &procedure.res]
                .iter()
                .any(|ty| matches!(ty, Type::Named(_)));

            emit!(self)?;
            self.open(format_args!("pub mod {}", procedure.name))?;
            if named {
                emit!(self, "use super::*;")?;
                emit!(self)?;
            }

            emit!(self, "pub const ID: u32 = {};", id)?;
            emit!(self, "pub const NAME: &str = \"{}\";", context)?;
            emit!(self, "pub type Arg = {};", arg)?;
            emit!(self, "pub type Res = {};", res)?;
            self.close()?;
        }

        self.close()?;
        Ok(())
    }

    fn pack_header(&mut self) -> Result<()> {
        self.open(format_args!(
            "fn pack(&self, packer: &mut Packer) -> ::xdr_runtime::Result<()>"
        ))
    }

    fn unpack_header(&mut self) -> Result<()> {
        self.open(format_args!(
            "fn unpack(unpacker: &mut Unpacker<'_>) -> ::xdr_runtime::Result<Self>"
        ))
    }

    fn from_structural_header(&mut self) -> Result<()> {
        self.open(format_args!(
            "fn from_structural(value: &Value) -> ::xdr_runtime::Result<Self>"
        ))
    }

    fn shape(&self, ty: &'a Type, context: &str) -> Result<Shape<'a>> {
        if let Some(&primitive) = self.bundle.basetype.get(ty) {
            let host = self
                .bundle
                .typemap
                .get(&primitive)
                .copied()
                .unwrap_or_else(|| primitive.host());

            return Ok(Shape::Primitive(primitive, host));
        }

        match ty {
            Type::Named(name) if self.bundle.resolve(name.as_str()).is_some() => {
                Ok(Shape::Composite(name))
            }

            Type::Named(name) => Err(GenerateError::UnknownType {
                name: name.to_string(),
                context: context.to_owned(),
            }),

            _ => Err(GenerateError::VoidField {
                context: context.to_owned(),
            }),
        }
    }

    fn layout(&self, ty: &'a Type, note: &Note, context: &str) -> Result<Layout<'a>> {
        let shape = self.shape(ty, context)?;
        let blob = match shape {
            Shape::Primitive(primitive, _) if primitive.is_blob() => Some(primitive),
            _ => None,
        };

        let layout = match (note, blob) {
            (Note::Raw, Some(primitive)) => Layout::Blob(primitive, Length::Bounded(None)),
            (Note::Raw, None) => Layout::Raw(shape),
            (Note::Pointer, _) => Layout::Optional(shape),

            (Note::Array { length, fixed }, blob) => {
                let length = self.length(length.as_ref(), *fixed, context)?;
                match blob {
                    Some(primitive) => Layout::Blob(primitive, length),
                    None => Layout::Array(shape, length),
                }
            }
        };

        Ok(layout)
    }

    fn length(&self, length: Option<&Value>, fixed: bool, context: &str) -> Result<Length> {
        let length = match (length, fixed) {
            (Some(length), _) => self.unsigned(length, context)?,
            (None, false) => return Ok(Length::Bounded(None)),
            (None, true) => {
                return Err(GenerateError::UnboundedFixedArray {
                    context: context.to_owned(),
                })
            }
        };

        Ok(if fixed {
            Length::Fixed(length)
        } else {
            Length::Bounded(Some(length))
        })
    }

    /// Tipo de argumento o resultado de un procedimiento.
    fn signature_type(&self, ty: &'a Type, context: &str) -> Result<String> {
        match ty {
            Type::Void => Ok("()".to_owned()),
            _ => self.layout(ty, &Note::Raw, context).map(|layout| layout.rust_type()),
        }
    }

    /// Expresión `u32` para longitudes e identificadores numéricos.
    fn unsigned(&self, value: &Value, context: &str) -> Result<String> {
        match self.bundle.evaluate(value) {
            Some(length) if length < 0 => Err(GenerateError::NegativeBound {
                context: context.to_owned(),
                length,
            }),

            Some(value) if value > i64::from(u32::MAX) => Err(GenerateError::OutOfRange {
                context: context.to_owned(),
                value,
                ty: "u32",
            }),

            _ => self.value(value, "u32", context),
        }
    }

    /// Expresión de Rust para un valor. Los nombres se resuelven mediante `id2val`.
    fn value(&self, value: &Value, cast: &str, context: &str) -> Result<String> {
        match value {
            Value::Literal(literal) => Ok(literal.clone()),
            Value::Name(name) => match self.bundle.id2val.get(name.as_str()) {
                Some(expr) => Ok(format!("{} as {}", expr, cast)),
                None => Err(GenerateError::UnknownValue {
                    name: name.to_string(),
                    context: context.to_owned(),
                }),
            },
        }
    }

    /// Expresión `i64` del discriminante de una unión.
    ///
    /// Los alias simples se atraviesan con `.0` hasta llegar a un entero,
    /// un booleano o un enum.
    fn key(&self, ty: &'a Type, mut place: String, union: &Identifier) -> Result<String> {
        let invalid = |ty: &Type| GenerateError::InvalidDiscriminant {
            union: union.to_string(),
            ty: ty.to_string(),
        };

        let mut current = ty;
        for _ in 0..MAX_ALIASES {
            if let Some(primitive) = self.bundle.basetype.get(current) {
                return match primitive {
                    Primitive::Int
                    | Primitive::Uint
                    | Primitive::Hyper
                    | Primitive::Uhyper
                    | Primitive::Bool => Ok(format!("{} as i64", place)),

                    _ => Err(invalid(ty)),
                };
            }

            let name = match current {
                Type::Named(name) => name,
                _ => return Err(invalid(ty)),
            };

            match self.bundle.resolve(name.as_str()) {
                Some(Kind::Enum(_)) => return Ok(format!("{} as i64", place)),

                Some(Kind::Typedef(alias)) if alias.note == Note::Raw => {
                    current = &alias.ty;
                    place.push_str(".0");
                }

                Some(_) => return Err(invalid(ty)),
                None => {
                    return Err(GenerateError::UnknownType {
                        name: name.to_string(),
                        context: union.to_string(),
                    })
                }
            }
        }

        Err(invalid(ty))
    }
}

fn selected(target: Option<&Identifier>) -> String {
    match target {
        Some(arm) => format!("Some(\"{}\")", arm),
        None => "None".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codegen::generate,
        lex::Lexer,
        normalize::normalize,
        parse::parse,
        source::consume,
        symbol::SymbolTable,
    };

    fn bundle(text: &str) -> Bundle {
        let (start, stream) = consume(text.as_bytes(), "test.x");
        let parsed = parse(Lexer::new(start, stream, SymbolTable::new())).unwrap();

        normalize(parsed.declarations, &[])
    }

    fn render_with(text: &str, options: EmitOptions) -> Result<String> {
        let mut output = Vec::new();
        RustTemplate::new(options).render(&bundle(text), &mut output)?;

        Ok(String::from_utf8(output).unwrap())
    }

    fn render(text: &str) -> Result<String> {
        render_with(text, EmitOptions::default())
    }

    #[test]
    fn prelude_lists_only_needed_items() {
        let code = render("const MAX = 10;").unwrap();
        assert!(!code.contains("use ::xdr_runtime"));
        assert!(code.contains("pub mod constant {"));
        assert!(code.contains("    pub const MAX: i64 = 10;"));

        let code = render("struct Point { int x; int y; };").unwrap();
        assert!(code.contains(
            "use ::xdr_runtime::{Map, Packer, Structural, Unpacker, Value, Xdr, structural};"
        ));

        let code = render_with("typedef int id;", EmitOptions::empty()).unwrap();
        assert!(code.contains("use ::xdr_runtime::{Packer, Unpacker, Xdr};"));
        assert!(!code.contains("impl Structural"));
    }

    #[test]
    fn inner_attributes_are_optional() {
        let code = render("const A = 1;").unwrap();
        assert!(!code.contains("#![allow"));

        let code = render_with("const A = 1;", EmitOptions::all()).unwrap();
        assert!(code.contains("#![allow(non_camel_case_types"));
    }

    #[test]
    fn constants_resolve_through_names() {
        let code = render("const A = 010; const B = A; enum e { X = B };").unwrap();
        assert!(code.contains("pub const A: i64 = 0o10;"));
        assert!(code.contains("pub const B: i64 = constant::A as i64;"));
        assert!(code.contains("use super::*;"));
        assert!(code.contains("    X = 8,"));
    }

    #[test]
    fn enums_get_member_tables() {
        let code = render("enum color { RED = 0, GREEN = 1, BLUE = 2 };").unwrap();

        assert!(code.contains("#[repr(i32)]\npub enum color {\n    #[default]\n    RED = 0,"));
        assert!(code.contains("        color::BLUE,\n    ];"));
        assert!(code.contains("color::GREEN => \"GREEN\","));
        assert!(code.contains("impl From<color> for i64"));
        assert!(code.contains("XdrError::UnknownDiscriminant"));
    }

    #[test]
    fn fields_map_to_runtime_routines() {
        let code = render(
            "const N = 4;
             struct s {
                 unsigned hyper big;
                 string name<N>;
                 opaque hash[32];
                 int values<>;
                 int fixed[N];
                 s *next;
                 int *maybe;
             };",
        )
        .unwrap();

        assert!(code.contains("pub big: u64,"));
        assert!(code.contains("packer.pack_uhyper(self.big)?;"));
        assert!(code.contains("packer.pack_string(&self.name, Some(constant::N as u32))?;"));
        assert!(code.contains("packer.pack_fopaque(&self.hash, 32)?;"));
        assert!(code.contains("pub values: Vec<i32>,"));
        assert!(code.contains(
            "packer.pack_array(&self.values, None, |packer, item| packer.pack_int(*item))?;"
        ));
        assert!(code.contains("unpacker.unpack_farray(constant::N as u32, |unpacker| unpacker.unpack_int())?"));
        assert!(code.contains("pub next: Option<Box<s>>,"));
        assert!(code.contains("packer.pack_optional(self.next.as_deref(), |packer, item| item.pack(packer))?;"));
        assert!(code.contains("next: unpacker.unpack_optional(|unpacker| s::unpack(unpacker).map(Box::new))?,"));
        assert!(code.contains("pub maybe: Option<i32>,"));
    }

    #[test]
    fn unions_select_arms_by_discriminant() {
        let code = render(
            "enum kind { A = 0, B = 1, C = 2 };
             union u switch (kind k) {
                 case A: int x;
                 case B: case C: void;
                 default: string text<>;
             };",
        )
        .unwrap();

        assert!(code.contains("pub k: kind,"));
        assert!(code.contains("pub x: Option<i32>,"));
        assert!(code.contains("pub text: Option<String>,"));
        assert!(code.contains("let key = self.k as i64;"));
        assert!(code.contains("if key == kind::A as i64 {\n            Some(\"x\")"));
        assert!(code.contains("} else if key == kind::C as i64 {\n            None"));
        assert!(code.contains("} else {\n            Some(\"text\")"));
        assert!(code.contains("Some(arm) => packer.pack_int(*arm)?,"));
        assert!(code.contains("Some(arm) => packer.pack_string(arm, None)?,"));
        assert!(code.contains("XdrError::MissingArm"));
    }

    #[test]
    fn unions_without_default_select_nothing() {
        let code = render("union u switch (int k) { case 1: int x; };").unwrap();

        assert!(code.contains("pub fn arm(&self) -> Option<&'static str> {"));
        assert!(code.contains("} else {\n            None\n        }"));
        assert!(!code.contains("UnknownDiscriminant"));
    }

    #[test]
    fn composite_arms_are_boxed() {
        let code = render(
            "union chain switch (bool more) { case TRUE: node n; case FALSE: void; };
             struct node { int v; chain next; };",
        )
        .unwrap();

        assert!(code.contains("pub n: Option<Box<node>>,"));
        assert!(code.contains("pub next: chain,"));
        assert!(code.contains("if key == true as i64 {"));
        assert!(code.contains("Some(arm) => arm.pack(packer)?,"));
        assert!(code.contains("Some(\"n\") => result.n = Some(Box::new(node::unpack(unpacker)?)),"));
    }

    #[test]
    fn typedef_discriminants_unwrap_aliases() {
        let code = render(
            "typedef int tag;
             typedef tag outer;
             union u switch (outer k) { case 1: int x; default: void; };",
        )
        .unwrap();

        assert!(code.contains("let key = self.k.0.0 as i64;"));
    }

    #[test]
    fn typedefs_wrap_their_target() {
        let code = render("typedef opaque hash[16];").unwrap();

        assert!(code.contains("pub struct hash(pub Vec<u8>);"));
        assert!(code.contains("impl From<Vec<u8>> for hash"));
        assert!(code.contains("packer.pack_fopaque(&self.0, 16)"));
        assert!(code.contains("Ok(hash(unpacker.unpack_fopaque(16)?))"));
    }

    #[test]
    fn programs_emit_descriptors() {
        let code = render(
            "struct pair { int a; int b; };
             program CALC {
                 version V1 {
                     int add(pair) = 1;
                     void ping(void) = 2;
                 } = 1;
             } = 0x20000001;",
        )
        .unwrap();

        assert!(code.contains("use ::xdr_runtime::{Map, Packer, Procedure,"));
        assert!(code.contains("pub mod CALC {"));
        assert!(code.contains("    pub const ID: u32 = 0x20000001;"));
        assert!(code.contains("fn add(&mut self, arg: add::Arg) -> add::Res;"));
        assert!(code.contains("fn ping(&mut self);"));
        assert!(code.contains("pub const NAME: &str = \"CALC.V1.add\";"));
        assert!(code.contains("pub type Arg = pair;"));
        assert!(code.contains("pub type Res = ();"));
        assert!(code.contains(
            "Procedure { program: super::ID, version: ID, id: ping::ID, name: ping::NAME },"
        ));
    }

    #[test]
    fn unknown_references_fail() {
        assert!(matches!(
            render("struct s { missing m; };"),
            Err(GenerateError::UnknownType { .. })
        ));

        assert!(matches!(
            render("struct s { int v<LIMIT>; };"),
            Err(GenerateError::UnknownValue { .. })
        ));
    }

    #[test]
    fn malformed_unions_fail() {
        assert!(matches!(
            render("union u switch (int k) { case 1: int a; case 1: int b; };"),
            Err(GenerateError::DuplicateLabel { .. })
        ));

        assert!(matches!(
            render("union u switch (int k) { default: void; default: int a; };"),
            Err(GenerateError::DuplicateLabel { .. })
        ));

        assert!(matches!(
            render("union u switch (int k) { case 1: int a; case 2: hyper a; };"),
            Err(GenerateError::ConflictingArm { .. })
        ));

        assert!(matches!(
            render("union u switch (string k) { case 1: int a; };"),
            Err(GenerateError::InvalidDiscriminant { .. })
        ));
    }

    #[test]
    fn bad_lengths_fail() {
        assert!(matches!(
            render("const N = -2; struct s { int v<N>; };"),
            Err(GenerateError::NegativeBound { length: -2, .. })
        ));

        assert!(matches!(
            render("typedef int v[];"),
            Err(GenerateError::UnboundedFixedArray { .. })
        ));
    }

    #[test]
    fn numbers_must_fit_their_rust_type() {
        match render("enum big { SMALL = 1, HUGE = 0x80000000 };") {
            Err(GenerateError::OutOfRange { context, value, ty }) => {
                assert_eq!(context, "big.HUGE");
                assert_eq!(value, 0x8000_0000);
                assert_eq!(ty, "i32");
            }

            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        assert!(render("enum low { LOW = -2147483648 };").is_ok());

        assert!(matches!(
            render("program P { version V { void f(void) = 1; } = 1; } = 0x1FFFFFFFF;"),
            Err(GenerateError::OutOfRange { value: 0x1_FFFF_FFFF, ty: "u32", .. })
        ));

        assert!(matches!(
            render("const N = 4294967296; typedef opaque block<N>;"),
            Err(GenerateError::OutOfRange { ty: "u32", .. })
        ));

        assert!(render("program P { version V { void f(void) = 1; } = 1; } = 0xFFFFFFFF;").is_ok());
    }

    #[test]
    fn failed_renders_write_nothing() {
        let mut output = Vec::new();
        let result = generate(&bundle("struct s { missing m; };"), None, &mut output);

        assert!(result.is_err());
        assert!(output.is_empty());
    }
}
