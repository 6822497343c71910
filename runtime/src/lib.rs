//! Biblioteca de soporte para código emitido por `xdrgen`.
//!
//! # Propósito
//! Los tipos generados a partir de una especificación XDR no implementan
//! por sí mismos la codificación de primitivas, sino que delegan en
//! [`Packer`] y [`Unpacker`]. Esta biblioteca implementa esas rutinas,
//! así como los traits [`Xdr`] y [`Structural`] que todo tipo generado
//! implementa.
//!
//! # Formato de cable
//! Se sigue RFC 4506: todo valor ocupa un múltiplo de 4 bytes en orden
//! big-endian, rellenando con ceros cuando hace falta. Los arreglos y
//! blobs de longitud variable llevan un prefijo de longitud de 4 bytes;
//! los de longitud fija no lo llevan.
//!
//! # Forma estructural
//! Además del formato binario, cada valor puede convertirse a un mapeo
//! ordenado llave-valor ([`Value`]), a partir del cual se construye la
//! serialización textual en JSON. El orden de campos se preserva.
//!
//! # Uso
//! El compilador emite `use ::xdr_runtime::{...}` con solo los ítems que
//! necesita el módulo generado. Es posible implementar los traits a mano
//! para tipos que no provienen del compilador.

pub mod error;
pub mod pack;
pub mod structural;
pub mod unpack;

pub use error::{Result, XdrError};
pub use pack::Packer;
pub use structural::{Map, Structural, Value};
pub use unpack::Unpacker;

/// Un tipo que se sabe codificar y decodificar en formato XDR.
pub trait Xdr: Sized {
    /// Codifica el valor al final del búfer.
    fn pack(&self, packer: &mut Packer) -> Result<()>;

    /// Decodifica un valor a partir de la posición actual.
    ///
    /// En caso de error no se construye ningún valor parcial.
    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self>;

    /// Serializa a un búfer nuevo.
    fn to_binary(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        self.pack(&mut packer)?;

        Ok(packer.into_bytes())
    }

    /// Deserializa desde un búfer, retornando además los bytes que
    /// no fueron consumidos.
    fn from_binary(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut unpacker = Unpacker::new(data);
        let value = Self::unpack(&mut unpacker)?;

        Ok((value, unpacker.remaining()))
    }
}

/// Implementa [`Xdr`] para una primitiva a partir de sus rutinas.
macro_rules! primitive {
    ($type:ty, $pack:ident, $unpack:ident) => {
        impl Xdr for $type {
            fn pack(&self, packer: &mut Packer) -> Result<()> {
                packer.$pack(*self)
            }

            fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self> {
                unpacker.$unpack()
            }
        }
    };
}

primitive!(i32, pack_int, unpack_int);
primitive!(u32, pack_uint, unpack_uint);
primitive!(bool, pack_bool, unpack_bool);
primitive!(i64, pack_hyper, unpack_hyper);
primitive!(u64, pack_uhyper, unpack_uhyper);
primitive!(f32, pack_float, unpack_float);
primitive!(f64, pack_double, unpack_double);

impl Xdr for String {
    fn pack(&self, packer: &mut Packer) -> Result<()> {
        packer.pack_string(self, None)
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self> {
        unpacker.unpack_string(None)
    }
}

// `void`: no ocupa espacio en el cable
impl Xdr for () {
    fn pack(&self, _packer: &mut Packer) -> Result<()> {
        Ok(())
    }

    fn unpack(_unpacker: &mut Unpacker<'_>) -> Result<Self> {
        Ok(())
    }
}

/// Descriptor de un procedimiento remoto.
///
/// Esta es la única información que un adaptador de transporte necesita
/// para despachar una llamada: los identificadores numéricos y un nombre
/// estable de la forma `PROGRAMA.VERSION.metodo`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Procedure {
    pub program: u32,
    pub version: u32,
    pub id: u32,
    pub name: &'static str,
}

impl Procedure {
    /// Nombre del servicio, es decir `PROGRAMA.VERSION`.
    pub fn service(&self) -> &'static str {
        self.name
            .rsplit_once('.')
            .map_or("", |(service, _)| service)
    }

    /// Nombre del método dentro del servicio.
    pub fn method(&self) -> &'static str {
        self.name
            .rsplit_once('.')
            .map_or(self.name, |(_, method)| method)
    }
}
