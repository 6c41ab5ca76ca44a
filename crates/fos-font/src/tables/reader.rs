//! Binary reader for font data

use super::ParseError;

/// Binary reader with bounds checking
#[derive(Clone)]
pub struct FontReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FontReader<'a> {
    /// Create a new reader
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader positioned at `offset`, failing if it lies past the end
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, ParseError> {
        if offset > data.len() {
            return Err(ParseError::BadOffset(offset));
        }
        Ok(Self { data, pos: offset })
    }

    /// Get current position
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Skip bytes
    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        if self.pos + n > self.data.len() {
            return Err(ParseError::InvalidData);
        }
        self.pos += n;
        Ok(())
    }

    /// Read u8
    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        let v = *self.data.get(self.pos).ok_or(ParseError::InvalidData)?;
        self.pos += 1;
        Ok(v)
    }

    /// Read i8
    pub fn read_i8(&mut self) -> Result<i8, ParseError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read big-endian u16
    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Read big-endian i16
    pub fn read_i16(&mut self) -> Result<i16, ParseError> {
        Ok(self.read_u16()? as i16)
    }

    /// Read big-endian u32
    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let bytes = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read 4-byte tag
    pub fn read_tag(&mut self) -> Result<[u8; 4], ParseError> {
        self.read_array::<4>()
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let end = self.pos.checked_add(N).ok_or(ParseError::InvalidData)?;
        let slice = self.data.get(self.pos..end).ok_or(ParseError::InvalidData)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    /// Remaining bytes
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

/// Slice of `data` starting at `offset`
pub fn slice_from(data: &[u8], offset: usize) -> Result<&[u8], ParseError> {
    data.get(offset..).ok_or(ParseError::BadOffset(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut reader = FontReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u16().unwrap(), 0x5678);
        assert_eq!(reader.read_u16(), Err(ParseError::InvalidData));
    }

    #[test]
    fn test_read_tag() {
        let data = b"headtest";
        let mut reader = FontReader::new(data);
        assert_eq!(reader.read_tag().unwrap(), *b"head");
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_reader_at_bounds() {
        let data = [0u8; 4];
        assert!(FontReader::at(&data, 4).is_ok());
        assert_eq!(FontReader::at(&data, 5).err(), Some(ParseError::BadOffset(5)));
        assert!(slice_from(&data, 9).is_err());
    }
}
