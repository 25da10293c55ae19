use std::io::{self, Read, Write};

/// Fixed-width integer writes for header encoding.
pub trait WriteWireExt: Write {
    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    fn write_u32_be(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    fn write_u32_le(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn write_u64_le(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Writes `s` into a `len`-byte field, NUL padded. The last byte is always NUL.
    fn write_padded_str(&mut self, s: &str, len: usize) -> io::Result<()> {
        let mut field = vec![0u8; len];
        let n = s.len().min(len.saturating_sub(1));
        field[..n].copy_from_slice(&s.as_bytes()[..n]);
        self.write_all(&field)
    }
}

impl<T: Write + ?Sized> WriteWireExt for T {}

pub trait ReadWireExt: Read {
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32_be(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a `len`-byte NUL padded field and returns the bytes before the first NUL.
    fn read_padded(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut field = vec![0u8; len];
        self.read_exact(&mut field)?;
        let end = field.iter().position(|b| *b == 0).unwrap_or(len);
        field.truncate(end);
        Ok(field)
    }
}

impl<T: Read + ?Sized> ReadWireExt for T {}
