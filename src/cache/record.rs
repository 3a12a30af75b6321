//! Binary record format for persisted cache entries.
//!
//! Layout (little-endian):
//! `[magic: u32][key: str][etag: str][server_date: i64][last_modified: i64]`
//! `[ttl: i64][soft_ttl: i64][header_count: u32]([name: str][value: str])*[body]`
//! where `str` is `[len: u64][utf-8 bytes]` and an empty etag means none.
//! The body runs to the end of the file.

use std::io::{self, Read, Write};

use super::error::CacheError;
use super::{CacheEntry, Headers};

/// Magic number for the current record format.
pub const CACHE_MAGIC: u32 = 0x2015_0306;

/// Metadata projection of a cache entry, kept in the in-memory index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader {
    pub key: String,
    /// Body size in bytes.
    pub size: u64,
    pub etag: Option<String>,
    pub server_date: i64,
    pub last_modified: i64,
    pub ttl: i64,
    pub soft_ttl: i64,
    pub response_headers: Headers,
}

impl CacheHeader {
    pub fn from_entry(key: &str, entry: &CacheEntry) -> Self {
        Self {
            key: key.to_string(),
            size: entry.data.len() as u64,
            etag: entry.etag.clone(),
            server_date: entry.server_date,
            last_modified: entry.last_modified,
            ttl: entry.ttl,
            soft_ttl: entry.soft_ttl,
            response_headers: entry.response_headers.clone(),
        }
    }

    pub fn to_entry(&self, data: Vec<u8>) -> CacheEntry {
        CacheEntry {
            data,
            etag: self.etag.clone(),
            server_date: self.server_date,
            last_modified: self.last_modified,
            ttl: self.ttl,
            soft_ttl: self.soft_ttl,
            response_headers: self.response_headers.clone(),
        }
    }

    /// Write everything but the body.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&CACHE_MAGIC.to_le_bytes())?;
        write_string(out, &self.key)?;
        write_string(out, self.etag.as_deref().unwrap_or(""))?;
        out.write_all(&self.server_date.to_le_bytes())?;
        out.write_all(&self.last_modified.to_le_bytes())?;
        out.write_all(&self.ttl.to_le_bytes())?;
        out.write_all(&self.soft_ttl.to_le_bytes())?;
        out.write_all(&(self.response_headers.len() as u32).to_le_bytes())?;
        for (name, value) in &self.response_headers {
            write_string(out, name)?;
            write_string(out, value)?;
        }
        Ok(())
    }

    /// Read a header from a record of `record_len` bytes.
    ///
    /// Returns the header with `size` set to the body length that follows it.
    pub fn read_from<R: Read>(input: R, record_len: u64) -> Result<(Self, u64), CacheError> {
        let mut reader = RecordReader { inner: input, consumed: 0, limit: record_len };
        let magic = reader.read_u32()?;
        if magic != CACHE_MAGIC {
            return Err(CacheError::BadMagic(magic));
        }
        let key = reader.read_string()?;
        let etag = Some(reader.read_string()?).filter(|e| !e.is_empty());
        let server_date = reader.read_i64()?;
        let last_modified = reader.read_i64()?;
        let ttl = reader.read_i64()?;
        let soft_ttl = reader.read_i64()?;
        let count = reader.read_u32()?;
        let mut response_headers = Headers::new();
        for _ in 0..count {
            let name = reader.read_string()?;
            let value = reader.read_string()?;
            response_headers.insert(name, value);
        }
        let consumed = reader.consumed;
        let header = Self {
            key,
            size: record_len - consumed,
            etag,
            server_date,
            last_modified,
            ttl,
            soft_ttl,
            response_headers,
        };
        Ok((header, consumed))
    }
}

fn write_string<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    out.write_all(&(value.len() as u64).to_le_bytes())?;
    out.write_all(value.as_bytes())
}

/// Reader that tracks consumed bytes and refuses to read past the record.
struct RecordReader<R> {
    inner: R,
    consumed: u64,
    limit: u64,
}

impl<R: Read> RecordReader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CacheError> {
        let len = buf.len() as u64;
        if self.consumed + len > self.limit {
            return Err(CacheError::Corrupt(format!(
                "field of {len} bytes at offset {} overruns record of {} bytes",
                self.consumed, self.limit
            )));
        }
        self.inner
            .read_exact(buf)
            .map_err(|e| CacheError::Corrupt(format!("truncated record: {e}")))?;
        self.consumed += len;
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32, CacheError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, CacheError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_string(&mut self) -> Result<String, CacheError> {
        let mut len_buf = [0u8; 8];
        self.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf);
        if len > self.limit - self.consumed {
            return Err(CacheError::Corrupt(format!("string length {len} exceeds record")));
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}
