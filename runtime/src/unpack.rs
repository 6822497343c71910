//! Decodificación.

use crate::{
    error::{Result, XdrError},
    pack::ALIGNMENT,
};

/// Cursor de lectura sobre un búfer XDR.
///
/// Es el espejo de [`crate::Packer`]: para cada `pack_*` existe un
/// `unpack_*` que consume exactamente los mismos bytes.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Unpacker<'a> {
    /// Inicia la lectura al principio de `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Unpacker { data, position: 0 }
    }

    /// Cantidad de bytes consumidos.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes que aún no se han consumido.
    pub fn remaining(&self) -> &'a [u8] {
        let data = self.data;
        &data[self.position..]
    }

    /// Determina si se consumió la entrada completa.
    pub fn is_done(&self) -> bool {
        self.position == self.data.len()
    }

    pub fn unpack_int(&mut self) -> Result<i32> {
        self.fixed().map(i32::from_be_bytes)
    }

    pub fn unpack_uint(&mut self) -> Result<u32> {
        self.fixed().map(u32::from_be_bytes)
    }

    pub fn unpack_bool(&mut self) -> Result<bool> {
        match self.unpack_uint()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(XdrError::InvalidBool(other)),
        }
    }

    pub fn unpack_hyper(&mut self) -> Result<i64> {
        self.fixed().map(i64::from_be_bytes)
    }

    pub fn unpack_uhyper(&mut self) -> Result<u64> {
        self.fixed().map(u64::from_be_bytes)
    }

    pub fn unpack_float(&mut self) -> Result<f32> {
        self.fixed().map(f32::from_be_bytes)
    }

    pub fn unpack_double(&mut self) -> Result<f64> {
        self.fixed().map(f64::from_be_bytes)
    }

    pub fn unpack_fopaque(&mut self, length: u32) -> Result<Vec<u8>> {
        let length = length as usize;
        let padding = (ALIGNMENT - length % ALIGNMENT) % ALIGNMENT;

        let data = self.take(length + padding)?;
        Ok(data[..length].to_vec())
    }

    pub fn unpack_opaque(&mut self, bound: Option<u32>) -> Result<Vec<u8>> {
        let length = self.length(bound)?;
        self.unpack_fopaque(length)
    }

    pub fn unpack_fstring(&mut self, length: u32) -> Result<String> {
        Ok(String::from_utf8(self.unpack_fopaque(length)?)?)
    }

    pub fn unpack_string(&mut self, bound: Option<u32>) -> Result<String> {
        Ok(String::from_utf8(self.unpack_opaque(bound)?)?)
    }

    pub fn unpack_array<T, F>(&mut self, bound: Option<u32>, unpack: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Unpacker<'a>) -> Result<T>,
    {
        let length = self.length(bound)?;
        self.unpack_farray(length, unpack)
    }

    pub fn unpack_farray<T, F>(&mut self, length: u32, mut unpack: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Unpacker<'a>) -> Result<T>,
    {
        // Una longitud maliciosa no debería provocar una reserva enorme
        let hint = (length as usize).min(self.remaining().len() / ALIGNMENT);

        let mut items = Vec::with_capacity(hint);
        for _ in 0..length {
            items.push(unpack(self)?);
        }

        Ok(items)
    }

    pub fn unpack_optional<T, F>(&mut self, unpack: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Unpacker<'a>) -> Result<T>,
    {
        if self.unpack_bool()? {
            unpack(self).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Lee un prefijo de longitud y verifica la cota.
    fn length(&mut self, bound: Option<u32>) -> Result<u32> {
        let length = self.unpack_uint()?;
        match bound {
            Some(bound) if length > bound => Err(XdrError::TooLong {
                bound,
                found: length as usize,
            }),

            _ => Ok(length),
        }
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.take(N)?);

        Ok(bytes)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.position;
        if count > available {
            return Err(XdrError::Eof {
                needed: count - available,
            });
        }

        let (data, start) = (self.data, self.position);
        self.position += count;

        Ok(&data[start..self.position])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_what_packer_writes() {
        let mut packer = crate::Packer::new();
        packer.pack_int(-5).unwrap();
        packer.pack_string("abc", Some(8)).unwrap();
        packer.pack_double(2.5).unwrap();
        packer
            .pack_array(&[1u32, 2, 3], None, |p, v| p.pack_uint(*v))
            .unwrap();

        let bytes = packer.into_bytes();
        let mut unpacker = Unpacker::new(&bytes);

        assert_eq!(unpacker.unpack_int().unwrap(), -5);
        assert_eq!(unpacker.unpack_string(Some(8)).unwrap(), "abc");
        assert_eq!(unpacker.unpack_double().unwrap(), 2.5);
        assert_eq!(
            unpacker.unpack_array(None, |u| u.unpack_uint()).unwrap(),
            vec![1, 2, 3]
        );
        assert!(unpacker.is_done());
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut unpacker = Unpacker::new(&[0, 0, 1]);
        assert!(matches!(
            unpacker.unpack_int(),
            Err(XdrError::Eof { needed: 1 })
        ));
    }

    #[test]
    fn booleans_must_be_zero_or_one() {
        let mut unpacker = Unpacker::new(&[0, 0, 0, 2]);
        assert!(matches!(unpacker.unpack_bool(), Err(XdrError::InvalidBool(2))));
    }

    #[test]
    fn bounds_are_enforced_on_decode() {
        let mut unpacker = Unpacker::new(&[0, 0, 0, 9, 1, 2, 3, 4]);
        assert!(matches!(
            unpacker.unpack_opaque(Some(4)),
            Err(XdrError::TooLong { bound: 4, found: 9 })
        ));
    }

    #[test]
    fn padding_is_skipped() {
        let mut unpacker = Unpacker::new(&[0, 0, 0, 1, 7, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(unpacker.unpack_opaque(None).unwrap(), vec![7]);
        assert_eq!(unpacker.unpack_int().unwrap(), 3);
    }
}
