//! Streaming `application/x-www-form-urlencoded` decoder.
//!
//! The body is scanned in fixed-size chunks rather than buffered whole, so
//! the 10 MB cap holds without double-buffering. Pairs are split on `&` and
//! `;`, each pair on its first `=`, and both halves are percent-decoded with
//! `+` mapping to space. Decoded pairs land in a [`FormMap`] multi-map, which
//! can also bind into a user-supplied struct through serde using the coercion
//! rules from [`crate::coerce`].

use std::collections::HashMap;
use std::io::Read;

use serde::de::value::MapDeserializer;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::coerce::ValueDeserializer;
use crate::error::Error;

/// Upper bound on the total form body size. 10 MB is a lot of text.
pub const MAX_FORM_SIZE: usize = 10 << 20;

const FORM_BUF_SIZE: usize = 512;
const FORM_KEY_BUF_SIZE: usize = 32;
const FORM_VALUE_BUF_SIZE: usize = 64;

/// Form decoding failures.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("form body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("invalid escape sequence '{0}'")]
    BadEscape(String),
    #[error("form read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FormError> for Error {
    fn from(err: FormError) -> Self {
        Error::BadRequest(err.to_string())
    }
}

/// Decoded form fields, in a key → values multi-map.
#[derive(Debug, Clone, Default)]
pub struct FormMap {
    entries: HashMap<String, Vec<String>>,
}

impl FormMap {
    /// First value for `name`, or `""` when the field is absent.
    pub fn get(&self, name: &str) -> &str {
        self.entries
            .get(name)
            .and_then(|vs| vs.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All values recorded for `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, key: String, value: String) {
        self.entries.entry(key).or_default().push(value);
    }

    /// Bind the form fields into `T` by field name, coercing each value
    /// through the rules in [`crate::coerce`].
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let pairs = self
            .entries
            .iter()
            .map(|(k, vs)| (k.as_str(), ValueDeserializer::new(vs)));
        T::deserialize(MapDeserializer::new(pairs))
            .map_err(|e| Error::BadRequest(format!("form bind failed: {e}")))
    }
}

/// Decode a form body from `r` into a [`FormMap`].
pub fn parse_form<R: Read>(r: R) -> Result<FormMap, FormError> {
    let mut map = FormMap::default();
    scan_pairs(r, |key, value| {
        if key.is_empty() && value.is_empty() {
            return Ok(());
        }
        map.append(unescape(key)?, unescape(value)?);
        Ok(())
    })?;
    Ok(map)
}

/// Scan `&`/`;`-separated pairs out of the stream, invoking `emit` with the
/// raw (still escaped) key and value spans of each pair.
fn scan_pairs<R, F>(mut r: R, mut emit: F) -> Result<(), FormError>
where
    R: Read,
    F: FnMut(&[u8], &[u8]) -> Result<(), FormError>,
{
    let mut buf = [0u8; FORM_BUF_SIZE];
    let mut key: Vec<u8> = Vec::with_capacity(FORM_KEY_BUF_SIZE);
    let mut val: Vec<u8> = Vec::with_capacity(FORM_VALUE_BUF_SIZE);
    let mut in_key = true;
    let mut total = 0usize;

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        total += n;
        if total > MAX_FORM_SIZE {
            return Err(FormError::TooLarge(MAX_FORM_SIZE));
        }

        let mut prev = 0;
        for i in 0..n {
            match buf[i] {
                b'&' | b';' => {
                    if i > prev {
                        let span = &buf[prev..i];
                        if in_key {
                            key.extend_from_slice(span);
                        } else {
                            val.extend_from_slice(span);
                        }
                    }
                    emit(&key, &val)?;
                    key.clear();
                    val.clear();
                    prev = i + 1;
                    in_key = true;
                }
                b'=' if in_key => {
                    if i > prev {
                        key.extend_from_slice(&buf[prev..i]);
                    }
                    prev = i + 1;
                    in_key = false;
                }
                _ => {}
            }
        }

        if prev < n {
            let span = &buf[prev..n];
            if in_key {
                key.extend_from_slice(span);
            } else {
                val.extend_from_slice(span);
            }
        }
    }

    if !key.is_empty() || !val.is_empty() {
        emit(&key, &val)?;
    }

    Ok(())
}

/// Percent-decode one span; `+` becomes a space.
fn unescape(s: &[u8]) -> Result<String, FormError> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'%' => {
                if i + 2 >= s.len() || !s[i + 1].is_ascii_hexdigit() || !s[i + 2].is_ascii_hexdigit()
                {
                    let bad = &s[i..s.len().min(i + 3)];
                    return Err(FormError::BadEscape(String::from_utf8_lossy(bad).into_owned()));
                }
                out.push(unhex(s[i + 1]) << 4 | unhex(s[i + 2]));
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn unhex(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}
