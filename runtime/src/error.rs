//! Errores de codificación y decodificación.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XdrError>;

/// Error de codificación, decodificación o conversión estructural.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum XdrError {
    /// Se acabó la entrada antes de completar un valor.
    #[error("Unexpected end of input, {needed} more bytes were expected")]
    Eof { needed: usize },

    /// Un booleano en el cable solo puede ser 0 o 1.
    #[error("Invalid boolean value {0} in input")]
    InvalidBool(u32),

    /// Un discriminante o valor de enum sin miembro declarado.
    #[error("Value {value} does not name a member of `{name}`")]
    UnknownDiscriminant { name: &'static str, value: i64 },

    /// Un nombre de miembro desconocido en forma estructural.
    #[error("`{member}` is not a member of `{name}`")]
    UnknownMember { name: &'static str, member: String },

    /// Un arreglo fijo con una cantidad distinta de elementos.
    #[error("Expected exactly {expected} elements, found {found}")]
    LengthMismatch { expected: u32, found: usize },

    /// Un arreglo o blob variable que excede su cota.
    #[error("Length {found} exceeds the bound of {bound}")]
    TooLong { bound: u32, found: usize },

    /// El discriminante selecciona un brazo que no está presente.
    #[error("Arm `{arm}` of union `{union}` is selected by the discriminant but absent")]
    MissingArm {
        union: &'static str,
        arm: &'static str,
    },

    /// Un `string` que no es UTF-8 válido.
    #[error("Invalid UTF-8 in string")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Un valor estructural con una forma inesperada.
    #[error("Expected {expected}, found `{found}`")]
    Structural { expected: &'static str, found: String },

    /// Error de sintaxis JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}
