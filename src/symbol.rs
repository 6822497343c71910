//! Tabla de símbolos.
//!
//! La tabla asocia cada identificador declarado a la clase de token con
//! la que el lexer debe emitirlo a partir de ese momento. Las palabras
//! clave no se almacenan aquí: [`crate::lex::Keyword`] las reconoce
//! antes de consultar la tabla, de modo que ninguna declaración puede
//! ocultarlas.
//!
//! Además de las clases, se mantiene un mapa separado de nombre de
//! constante a texto de su valor. Este mapa crece con cada `const` y
//! con las definiciones externas (`-D`) dadas antes de compilar.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Display},
    str::FromStr,
};

use thiserror::Error;

use crate::lex::escape;

/// Clase léxica de un identificador declarado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    /// Nombre de tipo: `enum`, `struct`, `union` o `typedef`.
    Type,

    /// Constante entera, incluyendo `TRUE` y `FALSE`.
    Constant,
}

impl Display for Class {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Class::Type => fmt.write_str("type"),
            Class::Constant => fmt.write_str("constant"),
        }
    }
}

/// Estado mutable compartido entre lexer y parser durante una compilación.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    classes: HashMap<String, Class>,
    constants: BTreeMap<String, String>,
}

impl SymbolTable {
    /// Crea una tabla con solamente `TRUE` y `FALSE`.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            classes: HashMap::new(),
            constants: BTreeMap::new(),
        };

        for (name, value) in [("TRUE", "1"), ("FALSE", "0")] {
            table.classes.insert(name.to_owned(), Class::Constant);
            table.constants.insert(name.to_owned(), value.to_owned());
        }

        table
    }

    /// Crea una tabla con definiciones externas ya aplicadas.
    ///
    /// Una definición entera promueve su nombre a constante. Una de texto
    /// solo se registra en el mapa de valores.
    pub fn with_defines(defines: &[Define]) -> Self {
        let mut table = SymbolTable::new();
        for define in defines {
            let name = escape(define.name.clone());
            if let DefineValue::Int(_) = define.value {
                table.classes.insert(name.clone(), Class::Constant);
            }

            table.constants.insert(name, define.value.text().to_owned());
        }

        table
    }

    /// Clase actual de un identificador, si fue declarado.
    pub fn class_of(&self, name: &str) -> Option<Class> {
        self.classes.get(name).copied()
    }

    /// Registra una declaración.
    ///
    /// En caso de redeclaración no se altera la tabla y se retorna la
    /// clase que el nombre ya tenía.
    pub fn declare(&mut self, name: &str, class: Class) -> Result<(), Class> {
        match self.classes.get(name) {
            Some(&previous) => Err(previous),
            None => {
                tracing::trace!(name, %class, "declared");
                self.classes.insert(name.to_owned(), class);
                Ok(())
            }
        }
    }

    /// Registra una constante en ambas tablas.
    pub fn define_constant(&mut self, name: &str, value: &str) -> Result<(), Class> {
        self.declare(name, Class::Constant)?;
        self.constants.insert(name.to_owned(), value.to_owned());

        Ok(())
    }

    /// Mapa nombre de constante → texto de valor.
    pub fn constants(&self) -> &BTreeMap<String, String> {
        &self.constants
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

/// Definición externa, de la forma `NAME[=VALUE]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: DefineValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineValue {
    /// Valor entero, con su ortografía original.
    Int(String),

    /// Valor arbitrario.
    Text(String),
}

impl DefineValue {
    pub fn text(&self) -> &str {
        match self {
            DefineValue::Int(text) | DefineValue::Text(text) => text,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DefineError {
    #[error("Define has an empty name")]
    EmptyName,

    #[error("Bad define name {0:?}")]
    BadName(String),
}

impl FromStr for Define {
    type Err = DefineError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (name, value) = match string.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (string.trim(), "1"),
        };

        if name.is_empty() {
            return Err(DefineError::EmptyName);
        }

        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');

        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DefineError::BadName(name.to_owned()));
        }

        let value = if is_integer(value) {
            DefineValue::Int(value.to_owned())
        } else {
            DefineValue::Text(value.to_owned())
        };

        Ok(Define {
            name: name.to_owned(),
            value,
        })
    }
}

/// Determina si un texto tiene la forma de un literal entero del IDL.
fn is_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn booleans_are_seeded() {
        let table = SymbolTable::new();
        assert_eq!(table.class_of("TRUE"), Some(Class::Constant));
        assert_eq!(table.class_of("true"), None);
        assert_eq!(table.constants().get("FALSE").map(String::as_str), Some("0"));
    }

    #[test]
    fn redeclaration_reports_previous_class() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare("Point", Class::Type), Ok(()));
        assert_eq!(table.declare("Point", Class::Constant), Err(Class::Type));
        assert_eq!(table.define_constant("TRUE", "1"), Err(Class::Constant));
    }

    #[test]
    fn defines_parse_and_promote() {
        let defines: Vec<Define> = ["MAX=0x10", "DEBUG", "NAME=hello"]
            .iter()
            .map(|text| text.parse().unwrap())
            .collect();

        assert_eq!(defines[1].value, DefineValue::Int("1".to_owned()));
        assert_eq!(defines[2].value, DefineValue::Text("hello".to_owned()));

        let table = SymbolTable::with_defines(&defines);
        assert_eq!(table.class_of("MAX"), Some(Class::Constant));
        assert_eq!(table.class_of("NAME"), None);
        assert_eq!(table.constants()["NAME"], "hello");
    }

    #[test]
    fn bad_define_names_are_rejected() {
        assert_eq!("=3".parse::<Define>(), Err(DefineError::EmptyName));
        assert_eq!(
            "9x=3".parse::<Define>(),
            Err(DefineError::BadName("9x".to_owned()))
        );
    }
}
