//! Codificación.

use crate::error::{Result, XdrError};

/// Unidad de alineamiento de todo ítem en el cable.
pub(crate) const ALIGNMENT: usize = 4;

/// Búfer de salida en formato XDR.
///
/// Cada rutina `pack_*` corresponde a una etiqueta primitiva del
/// compilador. Las rutinas son falibles de manera uniforme para que
/// puedan pasarse como elementos de [`Packer::pack_array()`] y similares.
#[derive(Debug, Default, Clone)]
pub struct Packer {
    buffer: Vec<u8>,
}

impl Packer {
    /// Crea un búfer vacío.
    pub fn new() -> Self {
        Packer::default()
    }

    /// Bytes codificados hasta el momento.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Toma ownership de los bytes codificados.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn pack_int(&mut self, value: i32) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn pack_uint(&mut self, value: u32) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn pack_bool(&mut self, value: bool) -> Result<()> {
        self.pack_uint(value as u32)
    }

    pub fn pack_hyper(&mut self, value: i64) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn pack_uhyper(&mut self, value: u64) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn pack_float(&mut self, value: f32) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn pack_double(&mut self, value: f64) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Blob de longitud fija: sin prefijo, exactamente `length` bytes.
    pub fn pack_fopaque(&mut self, data: &[u8], length: u32) -> Result<()> {
        check_exact(length, data.len())?;
        self.padded(data);

        Ok(())
    }

    /// Blob de longitud variable, opcionalmente acotado.
    pub fn pack_opaque(&mut self, data: &[u8], bound: Option<u32>) -> Result<()> {
        let length = check_bound(bound, data.len())?;
        self.pack_uint(length)?;
        self.padded(data);

        Ok(())
    }

    pub fn pack_fstring(&mut self, string: &str, length: u32) -> Result<()> {
        self.pack_fopaque(string.as_bytes(), length)
    }

    pub fn pack_string(&mut self, string: &str, bound: Option<u32>) -> Result<()> {
        self.pack_opaque(string.as_bytes(), bound)
    }

    /// Arreglo de longitud variable: prefijo de cantidad y luego cada elemento.
    pub fn pack_array<T, F>(&mut self, items: &[T], bound: Option<u32>, mut pack: F) -> Result<()>
    where
        F: FnMut(&mut Packer, &T) -> Result<()>,
    {
        let length = check_bound(bound, items.len())?;
        self.pack_uint(length)?;

        for item in items {
            pack(self, item)?;
        }

        Ok(())
    }

    /// Arreglo de longitud fija. Nunca se trunca ni se rellena.
    pub fn pack_farray<T, F>(&mut self, items: &[T], length: u32, mut pack: F) -> Result<()>
    where
        F: FnMut(&mut Packer, &T) -> Result<()>,
    {
        check_exact(length, items.len())?;
        for item in items {
            pack(self, item)?;
        }

        Ok(())
    }

    /// Dato opcional (`type *name`): booleano de presencia y luego el valor.
    pub fn pack_optional<T, F>(&mut self, value: Option<&T>, pack: F) -> Result<()>
    where
        T: ?Sized,
        F: FnOnce(&mut Packer, &T) -> Result<()>,
    {
        match value {
            None => self.pack_bool(false),
            Some(value) => {
                self.pack_bool(true)?;
                pack(self, value)
            }
        }
    }

    fn padded(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        let padding = (ALIGNMENT - data.len() % ALIGNMENT) % ALIGNMENT;
        self.buffer.extend(std::iter::repeat(0).take(padding));
    }
}

fn check_exact(expected: u32, found: usize) -> Result<()> {
    if found == expected as usize {
        Ok(())
    } else {
        Err(XdrError::LengthMismatch { expected, found })
    }
}

fn check_bound(bound: Option<u32>, found: usize) -> Result<u32> {
    let bound = bound.unwrap_or(u32::MAX);
    match u32::try_from(found) {
        Ok(length) if length <= bound => Ok(length),
        _ => Err(XdrError::TooLong { bound, found }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn packed<F: FnOnce(&mut Packer) -> Result<()>>(pack: F) -> Vec<u8> {
        let mut packer = Packer::new();
        pack(&mut packer).unwrap();
        packer.into_bytes()
    }

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(packed(|p| p.pack_int(-2)), vec![0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(packed(|p| p.pack_uint(0x0102_0304)), vec![1, 2, 3, 4]);
        assert_eq!(
            packed(|p| p.pack_hyper(1)),
            vec![0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(packed(|p| p.pack_bool(true)), vec![0, 0, 0, 1]);
    }

    #[test]
    fn strings_carry_length_and_padding() {
        assert_eq!(
            packed(|p| p.pack_string("hello", None)),
            vec![0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o', 0, 0, 0]
        );

        assert_eq!(packed(|p| p.pack_fopaque(&[1, 2, 3, 4], 4)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn fixed_arrays_reject_wrong_counts() {
        let mut packer = Packer::new();
        let result = packer.pack_farray(&[1, 2], 3, |p, v| p.pack_int(*v));

        assert!(matches!(
            result,
            Err(XdrError::LengthMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn bounds_are_enforced_on_encode() {
        let mut packer = Packer::new();
        let result = packer.pack_string("toolong", Some(3));

        assert!(matches!(result, Err(XdrError::TooLong { bound: 3, found: 7 })));
    }

    #[test]
    fn optional_data_is_prefixed_by_presence() {
        assert_eq!(
            packed(|p| p.pack_optional(Some(&9), |p, v| p.pack_int(*v))),
            vec![0, 0, 0, 1, 0, 0, 0, 9]
        );

        assert_eq!(
            packed(|p| p.pack_optional(None::<&i32>, |p, v| p.pack_int(*v))),
            vec![0, 0, 0, 0]
        );
    }
}
