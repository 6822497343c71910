//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios (`//` y `/* */`) se descartan durante esta
//! operación. Cada token emitido está asociado a una ubicación en el código
//! fuente original, lo cual permite rastrear errores tanto en los mismos como
//! en constructos más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de lo
//! que son y no incluyen lexemas. Los identificadores y las constantes enteras
//! sí incluyen su lexema original, ya que este se preserva hasta la
//! generación de código (`010` y `0x1F` no se evalúan aquí).
//!
//! # Clasificación dependiente de contexto
//! Un término que no es palabra clave se clasifica según la
//! [`SymbolTable`] en el momento exacto en que se escanea: nombre de tipo
//! ya declarado ([`Token::TypeId`]), constante ([`Token::Int`]) o
//! identificador común ([`Token::Id`]). El parser modifica la tabla entre
//! tokens, por lo cual la clasificación es de una sola pasada y sensible
//! al orden de declaración.
//!
//! # Reglas importantes del lenguaje
//! - Las palabras clave son case-insensitive, por lo cual tanto `struct`
//!   como `STRUCT` y `Struct` resultan en [`Keyword::Struct`].
//! - Un identificador que coincide con una palabra reservada de Rust
//!   recibe un `_` al final, repetidamente hasta que deja de coincidir.
//! - `#` y `%` al inicio de un token descartan el resto de la línea
//!   (marcadores de `cpp` y directivas de rpcgen).
//!
//! # Errores
//! El lexer se recupera de caracteres inválidos descartándolos, lo cual
//! permite reportar más de un error por ejecución. Sin embargo, cualquier
//! error impide el avance a las demás fases de la compilación.

use crate::{
    ir::Value,
    source::{InputStream, Located, Location},
    symbol::{Class, SymbolTable},
};

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use serde::{Serialize, Serializer};
use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Palabras que no pueden emitirse como identificadores en Rust, así como
/// nombres de los que depende el código generado.
const RESERVED: &[&str] = &[
    // Palabras clave estrictas, reservadas y débiles
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield", "union",
    "macro_rules", "raw",
    // Primitivas
    "i8", "i16", "i32", "i64", "i128", "u8", "u16", "u32", "u64", "u128", "f32", "f64", "bool",
    "char", "usize", "isize", "str",
    // Preludio
    "Option", "Some", "None", "Result", "Ok", "Err", "Vec", "String", "Box", "Default", "Clone",
    "Copy", "Debug", "PartialEq", "Eq", "Hash", "From", "Into", "Sized", "Send", "Sync", "Drop",
    "Fn", "FnMut", "FnOnce", "Iterator", "ToString", "ToOwned",
    // Runtime y módulos emitidos
    "std", "core", "alloc", "xdr_runtime", "constant", "Packer", "Unpacker", "Xdr", "Structural",
    "Value", "Map", "XdrError", "Procedure", "structural",
    // Locales del código emitido
    "packer", "unpacker", "item", "map", "value", "key", "result", "arm",
];

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Un comentario `/*` llegó al final de la entrada.
    #[error("Unterminated block comment")]
    UnterminatedComment,

    /// Un literal entero está mal formado.
    #[error("Malformed integer literal `{0}`")]
    BadLiteral(String),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal `{0}` overflows, valid range is [{min}, {max}]", min = i64::MIN, max = i64::MAX)]
    IntOverflow(String),
}

/// Un identificador.
///
/// Los identificadores son baratos de clonar y se comparan por contenido.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(string: &str) -> Self {
        Identifier(Rc::from(string))
    }
}

impl From<String> for Identifier {
    fn from(string: String) -> Self {
        Identifier(Rc::from(string))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador sin declaración previa.
    Id(Identifier),

    /// Nombre de un tipo ya declarado.
    TypeId(Identifier),

    /// Literal entero o nombre de una constante ya declarada.
    Int(Value),

    /// Palabra clave.
    Keyword(Keyword),

    /// `=`
    Assign,

    /// `<`
    Less,

    /// `>`
    Greater,

    /// `-`
    Minus,

    /// `+`
    Plus,

    /// `*`
    Times,

    /// `;`
    Semicolon,

    /// `:`
    Colon,

    /// `,`
    Comma,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            TypeId(id) => write!(fmt, "type name `{}`", id),
            Int(Value::Literal(literal)) => write!(fmt, "literal `{}`", literal),
            Int(Value::Name(name)) => write!(fmt, "constant `{}`", name),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Assign => fmt.write_str("`=`"),
            Less => fmt.write_str("`<`"),
            Greater => fmt.write_str("`>`"),
            Minus => fmt.write_str("`-`"),
            Plus => fmt.write_str("`+`"),
            Times => fmt.write_str("`*`"),
            Semicolon => fmt.write_str("`;`"),
            Colon => fmt.write_str("`:`"),
            Comma => fmt.write_str("`,`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Const,
    Enum,
    Struct,
    Union,
    Typedef,
    Switch,
    Case,
    Default,
    Program,
    Version,
    Opaque,
    Unsigned,
    String,
    Bool,
    Hyper,
    Long,
    Int,
    Float,
    Double,
    Netobj,
    Void,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Const    => "const",
            Enum     => "enum",
            Struct   => "struct",
            Union    => "union",
            Typedef  => "typedef",
            Switch   => "switch",
            Case     => "case",
            Default  => "default",
            Program  => "program",
            Version  => "version",
            Opaque   => "opaque",
            Unsigned => "unsigned",
            String   => "string",
            Bool     => "bool",
            Hyper    => "hyper",
            Long     => "long",
            Int      => "int",
            Float    => "float",
            Double   => "double",
            Netobj   => "netobj",
            Void     => "void",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
            (NoCase::new("const"),    Const),
            (NoCase::new("enum"),     Enum),
            (NoCase::new("struct"),   Struct),
            (NoCase::new("union"),    Union),
            (NoCase::new("typedef"),  Typedef),
            (NoCase::new("switch"),   Switch),
            (NoCase::new("case"),     Case),
            (NoCase::new("default"),  Default),
            (NoCase::new("program"),  Program),
            (NoCase::new("version"),  Version),
            (NoCase::new("opaque"),   Opaque),
            (NoCase::new("unsigned"), Unsigned),
            (NoCase::new("string"),   String),
            (NoCase::new("bool"),     Bool),
            (NoCase::new("hyper"),    Hyper),
            (NoCase::new("long"),     Long),
            (NoCase::new("int"),      Int),
            (NoCase::new("float"),    Float),
            (NoCase::new("double"),   Double),
            (NoCase::new("netobj"),   Netobj),
            (NoCase::new("void"),     Void),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
///
/// El lexer es dueño de la [`SymbolTable`] de la compilación.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    start: Location,
    next: Location,
    symbols: SymbolTable,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Ocurrió un error de E/S; no hay más tokens.
    Halted,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`.
    ///
    /// Debería seguir `/` o `*` para entrar en un comentario.
    Slash,

    /// Comentario de línea, o directiva `#`/`%`.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Dentro de `/* */`.
    BlockComment,

    /// Dentro de `/* */`, justo después de un `*`.
    BlockStar,

    /// Se encontró `-` o `+`, que puede iniciar un literal.
    Sign(char),

    /// Literal entero, acumulado carácter por carácter.
    Number(String),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S, symbols: SymbolTable) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
            symbols,
        }
    }

    /// Ubicación en la que inicia el token en curso.
    pub fn location(&self) -> &Location {
        &self.start
    }

    /// Acceso mutable a la tabla, para registrar declaraciones.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Descarta el lexer y conserva la tabla.
    pub fn into_symbols(self) -> SymbolTable {
        self.symbols
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        if let Halted = self.state {
            return Ok(None);
        }

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => {
                        self.state = Halted;
                        break Err(error.into());
                    }

                    _ => continue,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Halted, _) => return Ok(None),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some('=')) => self.state = Complete(Assign),
                (Start, Some('<')) => self.state = Complete(Less),
                (Start, Some('>')) => self.state = Complete(Greater),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('#' | '%')) => self.state = LineComment,
                (Start, Some(sign @ ('-' | '+'))) => self.state = Sign(sign),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el dígito, ya que esta lógica ya está implementada
                // en el respectivo caso del estado de constante
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Number(String::new());
                    continue;
                }

                // Espacios en blanco y caracteres inesperados. El carácter
                // inválido se descarta para poder continuar
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => {
                    last_accepted = self.bump();
                    break Err(LexerError::BadChar(c));
                }

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                // `/` siempre debería iniciar un comentario
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => self.state = BlockComment,
                (Slash, _) => {
                    self.state = Start;
                    break Err(LexerError::BadChar('/'));
                }

                // Los comentarios de línea descartan la línea donde ocurren
                (LineComment, Some('\n')) => self.state = Start,
                (LineComment, Some(_)) => (),
                (LineComment, None) => self.state = Start,

                (BlockComment, Some('*')) => self.state = BlockStar,
                (BlockComment, Some(_)) => (),
                (BlockStar, Some('/')) => self.state = Start,
                (BlockStar, Some('*')) => (),
                (BlockStar, Some(_)) => self.state = BlockComment,
                (BlockComment | BlockStar, None) => {
                    self.state = Start;
                    break Err(LexerError::UnterminatedComment);
                }

                // Un signo solo forma parte de un literal si le sigue un dígito
                (Sign(sign), Some(c)) if c.is_ascii_digit() => {
                    self.state = Number(sign.to_string());
                    continue;
                }

                (Sign('-'), _) => break Ok(Minus),
                (Sign(_), _) => break Ok(Plus),

                // Acumulación de literales decimales y hexadecimales
                (Number(literal), Some(c)) if accepts_digit(literal, c) => literal.push(c),
                (Number(literal), _) => break integer(std::mem::take(literal)),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_ascii_alphanumeric() || c == '_' => word.push(c),

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => break Ok(self::classify(std::mem::take(word), &self.symbols)),
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            last_accepted = self.bump();
        };

        token.map(|token| Some((token, last_accepted)))
    }

    /// Consume el carácter observado y retorna su ubicación.
    fn bump(&mut self) -> Location {
        match self.source.next() {
            Some(Ok((_, next_position))) => std::mem::replace(&mut self.next, next_position),
            _ => self.next.clone(),
        }
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                tracing::trace!(%location, %token, "token");

                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                if !matches!(self.state, State::Halted) {
                    self.state = State::Start;
                }

                let location = self.start.clone();
                tracing::debug!(%location, %error, "lexical error");

                Some(Err(Located::at(error, location)))
            }
        }
    }
}

/// Agrega sufijos `_` hasta que un nombre no colisione con Rust.
pub fn escape(mut name: String) -> String {
    while RESERVED.contains(&name.as_str()) {
        name.push('_');
    }

    name
}

/// Clasifica un término ya completo.
fn classify(word: String, symbols: &SymbolTable) -> Token {
    if let Ok(keyword) = Keyword::from_str(&word) {
        return Token::Keyword(keyword);
    }

    let name = escape(word);
    match symbols.class_of(&name) {
        Some(Class::Type) => Token::TypeId(Identifier::from(name)),
        Some(Class::Constant) => Token::Int(Value::Name(Identifier::from(name))),
        None => Token::Id(Identifier::from(name)),
    }
}

/// Determina si un carácter extiende un literal en construcción.
fn accepts_digit(literal: &str, c: char) -> bool {
    let digits = literal.trim_start_matches(['-', '+']);
    if digits.starts_with("0x") || digits.starts_with("0X") {
        c.is_ascii_hexdigit()
    } else {
        c.is_ascii_digit() || (digits == "0" && matches!(c, 'x' | 'X'))
    }
}

/// Valida un literal completo, preservando su ortografía.
fn integer(literal: String) -> Result<Token, LexerError> {
    let (negative, digits) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, &literal[..]),
    };

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some("") => return Err(LexerError::BadLiteral(literal)),
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    };

    let value = match magnitude {
        Ok(magnitude) if negative => -magnitude,
        Ok(magnitude) => magnitude,
        Err(_) => return Err(LexerError::IntOverflow(literal)),
    };

    if i64::try_from(value).is_err() {
        return Err(LexerError::IntOverflow(literal));
    }

    Ok(Token::Int(Value::Literal(literal)))
}
