//! S3 binary container codec.
//!
//! Layout: an ASCII header of whitespace-separated `key value` tokens
//! terminated by the literal `endhdr`, a 4-byte magic word `0x11223344` in
//! the writer's native byte order, the body, and (when the header declares
//! `chksum0 yes`) a trailing 4-byte checksum. All reads are sequential;
//! nothing seeks.

use byteorder::{NativeEndian, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::ModelError;

pub const MAGIC: u32 = 0x1122_3344;
const END_OF_HEADER: &str = "endhdr";

/// Running checksum over 32-bit body words. The magic word is excluded.
#[inline]
fn checksum_step(chk: u32, word: u32) -> u32 {
    chk.rotate_left(20).wrapping_add(word)
}

/// Sequential reader for one S3 binary file. Carries the byte-order flag
/// detected from the magic word and a running checksum over the body.
pub struct S3Reader {
    path: PathBuf,
    inner: BufReader<File>,
    props: HashMap<String, String>,
    swap: bool,
    checksum: u32,
    checksummed: bool,
}

impl S3Reader {
    /// Opens the file, parses the header and detects the byte order from the
    /// magic word.
    pub fn open(path: impl AsRef<Path>) -> Result<S3Reader, ModelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ModelError::io(&path, e))?;
        let mut inner = BufReader::new(file);

        let mut props = HashMap::new();
        loop {
            let key = match read_word(&mut inner).map_err(|e| ModelError::io(&path, e))? {
                Some(w) => w,
                None => return Err(ModelError::corrupt(&path, "end of file inside header")),
            };
            if key == END_OF_HEADER {
                break;
            }
            let value = match read_word(&mut inner).map_err(|e| ModelError::io(&path, e))? {
                Some(w) => w,
                None => {
                    return Err(ModelError::corrupt(
                        &path,
                        format!("header property {:?} has no value", key),
                    ))
                }
            };
            props.insert(key, value);
        }

        let mut magic = [0u8; 4];
        inner
            .read_exact(&mut magic)
            .map_err(|e| ModelError::io(&path, e))?;
        let word = u32::from_ne_bytes(magic);
        let swap = if word == MAGIC {
            false
        } else if word.swap_bytes() == MAGIC {
            true
        } else {
            return Err(ModelError::corrupt(
                &path,
                format!("bad magic word {:#010x}", word),
            ));
        };

        let checksummed = props.get("chksum0").map(String::as_str) == Some("yes");
        tracing::debug!(
            path = %path.display(),
            swap,
            checksummed,
            "opened s3 container"
        );

        Ok(S3Reader {
            path,
            inner,
            props,
            swap,
            checksum: 0,
            checksummed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// Fails with `UnsupportedVersion` unless the header's `version`
    /// property equals `expected`.
    pub fn expect_version(&self, expected: &str) -> Result<(), ModelError> {
        let found = self.property("version").unwrap_or("");
        if found != expected {
            return Err(ModelError::UnsupportedVersion {
                path: self.path.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Reads one 32-bit body word: byte-swapped if needed, checksummed.
    fn read_word32(&mut self) -> Result<u32, ModelError> {
        let word = self.read_raw32()?;
        self.checksum = checksum_step(self.checksum, word);
        Ok(word)
    }

    /// Reads one 32-bit word outside the checksum.
    fn read_raw32(&mut self) -> Result<u32, ModelError> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| ModelError::io(&self.path, e))?;
        let word = u32::from_ne_bytes(buf);
        Ok(if self.swap { word.swap_bytes() } else { word })
    }

    pub fn read_i32(&mut self) -> Result<i32, ModelError> {
        Ok(self.read_word32()? as i32)
    }

    /// Reads an i32 and rejects negative values; sizes and counts only.
    pub fn read_count(&mut self, what: &str) -> Result<usize, ModelError> {
        let v = self.read_i32()?;
        if v < 0 {
            return Err(ModelError::corrupt(
                &self.path,
                format!("negative {}: {}", what, v),
            ));
        }
        Ok(v as usize)
    }

    pub fn read_f32(&mut self) -> Result<f32, ModelError> {
        Ok(f32::from_bits(self.read_word32()?))
    }

    pub fn read_f32_vec(&mut self, n: usize) -> Result<Vec<f32>, ModelError> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.read_f32()?);
        }
        Ok(v)
    }

    /// When the header declared `chksum0 yes`, reads the trailing checksum
    /// word and compares it with the running value.
    pub fn validate_checksum(&mut self) -> Result<(), ModelError> {
        if !self.checksummed {
            return Ok(());
        }
        let computed = self.checksum;
        let stored = self.read_raw32()?;
        if stored != computed {
            return Err(ModelError::ChecksumMismatch {
                path: self.path.clone(),
                computed,
                stored,
            });
        }
        Ok(())
    }
}

/// Mirror writer: same framing, host byte order, running checksum.
pub struct S3Writer {
    path: PathBuf,
    inner: BufWriter<File>,
    checksum: u32,
    checksummed: bool,
}

impl S3Writer {
    pub fn create(
        path: impl AsRef<Path>,
        props: &[(&str, &str)],
    ) -> Result<S3Writer, ModelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| ModelError::io(&path, e))?;
        let mut inner = BufWriter::new(file);

        let mut checksummed = false;
        for (key, value) in props {
            if *key == "chksum0" && *value == "yes" {
                checksummed = true;
            }
            writeln!(inner, "{} {}", key, value).map_err(|e| ModelError::io(&path, e))?;
        }
        writeln!(inner, "{}", END_OF_HEADER).map_err(|e| ModelError::io(&path, e))?;
        inner
            .write_all(&MAGIC.to_ne_bytes())
            .map_err(|e| ModelError::io(&path, e))?;

        Ok(S3Writer {
            path,
            inner,
            checksum: 0,
            checksummed,
        })
    }

    fn write_word32(&mut self, word: u32) -> Result<(), ModelError> {
        self.checksum = checksum_step(self.checksum, word);
        self.inner
            .write_u32::<NativeEndian>(word)
            .map_err(|e| ModelError::io(&self.path, e))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), ModelError> {
        self.write_word32(value as u32)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), ModelError> {
        self.write_word32(value.to_bits())
    }

    pub fn write_f32_vec(&mut self, values: &[f32]) -> Result<(), ModelError> {
        for &v in values {
            self.write_f32(v)?;
        }
        Ok(())
    }

    /// Writes the trailing checksum (when declared) and flushes.
    pub fn finish(mut self) -> Result<(), ModelError> {
        if self.checksummed {
            let chk = self.checksum;
            self.inner
                .write_u32::<NativeEndian>(chk)
                .map_err(|e| ModelError::io(&self.path, e))?;
        }
        self.inner.flush().map_err(|e| ModelError::io(&self.path, e))
    }
}

/// Reads one whitespace-delimited ASCII token; `None` at end of stream.
fn read_word(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut byte = [0u8; 1];
    // Skip leading whitespace
    loop {
        match reader.read(&mut byte)? {
            0 => return Ok(None),
            _ if byte[0].is_ascii_whitespace() => continue,
            _ => break,
        }
    }
    let mut word = vec![byte[0]];
    loop {
        match reader.read(&mut byte)? {
            0 => break,
            _ if byte[0].is_ascii_whitespace() => break,
            _ => word.push(byte[0]),
        }
    }
    Ok(Some(String::from_utf8_lossy(&word).into_owned()))
}

/// Whitespace tokenizer over a text model file. `#` starts a comment that
/// runs to end of line.
pub struct Tokenizer {
    path: PathBuf,
    inner: BufReader<File>,
}

impl Tokenizer {
    pub fn open(path: impl AsRef<Path>) -> Result<Tokenizer, ModelError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ModelError::io(&path, e))?;
        Ok(Tokenizer {
            path,
            inner: BufReader::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_word(&mut self) -> Result<Option<String>, ModelError> {
        let mut byte = [0u8; 1];
        loop {
            match self
                .inner
                .read(&mut byte)
                .map_err(|e| ModelError::io(&self.path, e))?
            {
                0 => return Ok(None),
                _ if byte[0] == b'#' => {
                    // Comment runs to end of line
                    loop {
                        match self
                            .inner
                            .read(&mut byte)
                            .map_err(|e| ModelError::io(&self.path, e))?
                        {
                            0 => return Ok(None),
                            _ if byte[0] == b'\n' => break,
                            _ => continue,
                        }
                    }
                }
                _ if byte[0].is_ascii_whitespace() => continue,
                _ => break,
            }
        }
        let mut word = vec![byte[0]];
        loop {
            match self
                .inner
                .read(&mut byte)
                .map_err(|e| ModelError::io(&self.path, e))?
            {
                0 => break,
                _ if byte[0].is_ascii_whitespace() => break,
                _ => word.push(byte[0]),
            }
        }
        Ok(Some(String::from_utf8_lossy(&word).into_owned()))
    }

    /// Next token, or `CorruptFile` at end of stream.
    pub fn expect_word(&mut self) -> Result<String, ModelError> {
        self.next_word()?.ok_or_else(|| {
            ModelError::corrupt(&self.path, "unexpected end of file")
        })
    }

    pub fn expect_int(&mut self) -> Result<i64, ModelError> {
        let word = self.expect_word()?;
        word.parse().map_err(|_| {
            ModelError::corrupt(&self.path, format!("expected integer, found {:?}", word))
        })
    }

    pub fn expect_literal(&mut self, literal: &str) -> Result<(), ModelError> {
        let word = self.expect_word()?;
        if word != literal {
            return Err(ModelError::corrupt(
                &self.path,
                format!("expected {:?}, found {:?}", literal, word),
            ));
        }
        Ok(())
    }
}

/// Reads a `key value` property file (one pair per line).
pub fn read_props(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ModelError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ModelError::io(path, e))?;
    let mut props = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ModelError::io(path, e))?;
        let mut words = line.split_whitespace();
        if let Some(key) = words.next() {
            let value = words.collect::<Vec<_>>().join(" ");
            props.insert(key.to_string(), value);
        }
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_step() {
        // rotl(0, 20) + 7 = 7; rotl(7, 20) + 1 = 7 << 20 + 1
        assert_eq!(checksum_step(0, 7), 7);
        assert_eq!(checksum_step(7, 1), (7u32 << 20) + 1);
    }

    #[test]
    fn test_write_read_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pool");

        let mut w = S3Writer::create(&path, &[("version", "1.0"), ("chksum0", "yes")])?;
        w.write_i32(3)?;
        w.write_f32_vec(&[1.5, -2.25, 0.0])?;
        w.finish()?;

        let mut r = S3Reader::open(&path)?;
        r.expect_version("1.0")?;
        assert_eq!(r.read_i32()?, 3);
        assert_eq!(r.read_f32_vec(3)?, vec![1.5, -2.25, 0.0]);
        r.validate_checksum()?;
        Ok(())
    }

    #[test]
    fn test_bad_magic() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad");
        std::fs::write(&path, b"version 1.0\nendhdr\n\xde\xad\xbe\xef")?;
        match S3Reader::open(&path) {
            Err(ModelError::CorruptFile { .. }) => Ok(()),
            other => anyhow::bail!("expected CorruptFile, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tokenizer_comments() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mdef");
        std::fs::write(&path, "# header comment\n0.3 2 n_base # trailing\nSIL -\n")?;
        let mut tok = Tokenizer::open(&path)?;
        assert_eq!(tok.expect_word()?, "0.3");
        assert_eq!(tok.expect_int()?, 2);
        tok.expect_literal("n_base")?;
        assert_eq!(tok.expect_word()?, "SIL");
        assert_eq!(tok.expect_word()?, "-");
        assert_eq!(tok.next_word()?, None);
        Ok(())
    }
}
