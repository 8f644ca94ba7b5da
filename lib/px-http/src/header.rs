/*
 * SPDX-License-Identifier: Apache-2.0
 */

/// One header field as received from the wire, name casing and value bytes
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeaderEntry {
    name: String,
    value: Vec<u8>,
}

impl HttpHeaderEntry {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Flat ordered header storage. Duplicates and arrival order are preserved
/// so the block can be re-serialized byte-identical; name lookup is always
/// case-insensitive and never changes the stored representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaderList {
    entries: Vec<HttpHeaderEntry>,
}

impl HttpHeaderList {
    pub fn new() -> Self {
        HttpHeaderList::default()
    }

    pub fn append(&mut self, name: &str, value: &[u8]) {
        self.entries.push(HttpHeaderEntry {
            name: name.to_string(),
            value: value.to_vec(),
        });
    }

    /// Get the value of the first header named `name`, matched
    /// case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_slice())
    }

    /// Like [`get`](Self::get), but only when the value is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HttpHeaderEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
