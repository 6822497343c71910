//! Generación de código.
//!
//! Un [`Template`] recibe el [`Bundle`] normalizado y escribe un módulo
//! de código fuente. La plantilla por defecto es [`RustTemplate`], que
//! produce tipos de Rust sobre el runtime `xdr_runtime`.
//!
//! [`generate()`] renderiza primero a un búfer en memoria, por lo que
//! un error de generación nunca deja salida parcial.

use std::io::{self, Write};

use bitflags::bitflags;
use thiserror::Error;

use crate::normalize::Bundle;

mod rust;

pub use rust::RustTemplate;

/// Error de generación.
///
/// Todos estos errores corresponden a referencias o formas que el parser
/// acepta pero que no tienen traducción posible.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Unknown type `{name}` in `{context}`")]
    UnknownType { name: String, context: String },

    #[error("Unknown value `{name}` in `{context}`")]
    UnknownValue { name: String, context: String },

    #[error("Value `{label}` appears more than once in `{within}`")]
    DuplicateLabel { within: String, label: String },

    #[error("Arm `{arm}` of union `{union}` is declared with conflicting types")]
    ConflictingArm { union: String, arm: String },

    #[error("Type `{ty}` cannot discriminate union `{union}`")]
    InvalidDiscriminant { union: String, ty: String },

    #[error("`void` cannot be used as the type of `{context}`")]
    VoidField { context: String },

    #[error("Length {length} of `{context}` is negative")]
    NegativeBound { context: String, length: i64 },

    #[error("Value {value} of `{context}` does not fit in `{ty}`")]
    OutOfRange {
        context: String,
        value: i64,
        ty: &'static str,
    },

    #[error("Fixed array `{context}` has no length")]
    UnboundedFixedArray { context: String },

    #[error("I/O error")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GenerateError>;

bitflags! {
    /// Opciones de emisión.
    pub struct EmitOptions: u32 {
        /// Emitir `#![allow(...)]` al inicio. Solo válido cuando la salida
        /// es un archivo de módulo propio, no cuando se usa `include!()`.
        const INNER_ATTRIBUTES = 0x01;

        /// Emitir implementaciones de `Structural` (forma llave-valor y JSON).
        const STRUCTURAL = 0x02;
    }
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions::STRUCTURAL
    }
}

/// Plantilla de salida.
pub trait Template {
    fn render(&self, bundle: &Bundle, output: &mut dyn Write) -> Result<()>;
}

/// Renderiza un bundle con una plantilla, o con [`RustTemplate`] si no
/// se indica ninguna.
pub fn generate(bundle: &Bundle, template: Option<&dyn Template>, output: &mut dyn Write) -> Result<()> {
    let default = RustTemplate::default();
    let template = template.unwrap_or(&default);

    let mut buffer = Vec::new();
    template.render(bundle, &mut buffer)?;

    tracing::debug!(bytes = buffer.len(), "rendered");
    output.write_all(&buffer)?;
    output.flush()?;

    Ok(())
}
