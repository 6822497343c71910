//! Compilador de especificaciones XDR/ONC-RPC a Rust.
//!
//! # Front end
//! Cada compilación deriva de un único texto IDL, opcionalmente filtrado
//! antes por un preprocesador externo ([`preprocess`]). El texto se somete
//! a análisis léxico en [`lex`], de lo cual se obtiene un flujo de tokens.
//! A diferencia de un lexer convencional, la clase de un identificador
//! depende de las declaraciones previas: la tabla de símbolos ([`symbol`])
//! pertenece al lexer y el parser ([`parse`]) la actualiza conforme
//! reconoce cada declaración. El resultado es la lista plana de
//! declaraciones descrita en [`ir`].
//!
//! # Back end
//! [`normalize`] agrupa las declaraciones por tipo y construye las tablas
//! de resolución de valores y tipos primitivos. Finalmente [`codegen`]
//! emite un módulo de Rust que se apoya en el crate `xdr-runtime` para la
//! codificación en cable y la forma estructural (JSON).
//!
//! Toda falla en las fases delanteras se presenta mediante
//! [`error::Diagnostics`], con ubicación y extracto del código fuente.

use std::{
    borrow::Cow,
    io::{self, Write},
};

use thiserror::Error;

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod normalize;
pub mod parse;
pub mod preprocess;
pub mod source;
pub mod symbol;

use crate::{
    codegen::{EmitOptions, GenerateError, RustTemplate, Template},
    error::Diagnostics,
    lex::{Lexer, Token},
    normalize::Bundle,
    parse::Parsed,
    preprocess::{PreprocessError, Preprocessor},
    source::Located,
    symbol::{Define, SymbolTable},
};

/// Falla de alguna fase de compilación.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Errores léxicos o sintácticos, ya formateados.
    #[error("{report}")]
    Rejected { stage: &'static str, report: String },

    #[error("Code generation failed")]
    Generate(#[from] GenerateError),

    #[error("Preprocessing failed")]
    Preprocess(#[from] PreprocessError),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Parámetros de una compilación.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Definiciones externas, aplicadas antes de iniciar el análisis.
    pub defines: Vec<Define>,

    /// Preprocesador a aplicar sobre la fuente, si alguno.
    pub preprocessor: Option<Preprocessor>,

    pub emit: EmitOptions,
}

/// Obtiene el flujo completo de tokens.
pub fn lex_source(
    text: &str,
    name: &str,
    options: &CompileOptions,
) -> Result<Vec<Located<Token>>, CompileError> {
    let text = prepare(text, options)?;
    let (start, stream) = source::consume(text.as_bytes(), name);

    let symbols = SymbolTable::with_defines(&options.defines);
    Lexer::new(start, stream, symbols)
        .try_exhaustive()
        .map_err(|errors| rejected("lexical analysis", errors.into()))
}

/// Construye la lista de declaraciones y la tabla de constantes.
pub fn parse_source(text: &str, name: &str, options: &CompileOptions) -> Result<Parsed, CompileError> {
    let text = prepare(text, options)?;
    let (start, stream) = source::consume(text.as_bytes(), name);

    let symbols = SymbolTable::with_defines(&options.defines);
    parse::parse(Lexer::new(start, stream, symbols)).map_err(|failure| {
        let stage = match &failure {
            parse::ParseFailure::Lexical(_) => "lexical analysis",
            parse::ParseFailure::Syntax(_) => "parsing",
        };

        rejected(stage, failure.into())
    })
}

/// Analiza y normaliza.
pub fn bundle_source(text: &str, name: &str, options: &CompileOptions) -> Result<Bundle, CompileError> {
    let parsed = parse_source(text, name, options)?;
    Ok(normalize::normalize(parsed.declarations, &options.defines))
}

/// Compilación completa con la plantilla por defecto.
pub fn compile(
    text: &str,
    name: &str,
    options: &CompileOptions,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    let template = RustTemplate::new(options.emit);
    compile_with(text, name, options, &template, output)
}

/// Compilación completa con una plantilla arbitraria.
pub fn compile_with(
    text: &str,
    name: &str,
    options: &CompileOptions,
    template: &dyn Template,
    output: &mut dyn Write,
) -> Result<(), CompileError> {
    let bundle = bundle_source(text, name, options)?;
    codegen::generate(&bundle, Some(template), output)?;

    tracing::info!(source = name, "compiled");
    Ok(())
}

fn prepare<'t>(text: &'t str, options: &CompileOptions) -> Result<Cow<'t, str>, CompileError> {
    match &options.preprocessor {
        None => Ok(Cow::Borrowed(text)),
        Some(preprocessor) => {
            let preprocessor = options
                .defines
                .iter()
                .fold(preprocessor.clone(), |preprocessor, define| preprocessor.define(define));

            Ok(Cow::Owned(preprocessor.run(text)?))
        }
    }
}

fn rejected(stage: &'static str, diagnostics: Diagnostics) -> CompileError {
    tracing::debug!(stage, errors = diagnostics.len(), "rejected");

    let kind = match stage {
        "lexical analysis" => "lexical error",
        _ => "syntax error",
    };

    let diagnostics = diagnostics.kind(kind);

    CompileError::Rejected {
        stage,
        report: diagnostics.to_string(),
    }
}
