//! Interned data tables for compiled components

use serde::{Deserialize, Serialize};

use crate::operand::{DataIndex, FloatDataIndex, IntDataIndex, StringIndex, UrlIndex};

/// Interned tables referenced by instructions
///
/// Strings, urls and byte arrays are deduplicated by value. Numeric runs are
/// deduplicated by searching for an identical run already in the table, so the
/// index of a run is its start offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPool {
    strings: Vec<String>,
    urls: Vec<String>,
    datas: Vec<Vec<u8>>,
    int_data: Vec<i32>,
    float_data: Vec<f32>,
}

impl DataPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string
    pub fn add_string(&mut self, value: &str) -> StringIndex {
        if let Some(idx) = self.strings.iter().position(|s| s == value) {
            return StringIndex(idx as u32);
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_string());
        StringIndex(idx)
    }

    /// Intern a resolved url
    pub fn add_url(&mut self, value: &str) -> UrlIndex {
        if let Some(idx) = self.urls.iter().position(|s| s == value) {
            return UrlIndex(idx as u32);
        }
        let idx = self.urls.len() as u32;
        self.urls.push(value.to_string());
        UrlIndex(idx)
    }

    /// Intern a byte array
    pub fn add_data(&mut self, value: &[u8]) -> DataIndex {
        if let Some(idx) = self.datas.iter().position(|d| d.as_slice() == value) {
            return DataIndex(idx as u32);
        }
        let idx = self.datas.len() as u32;
        self.datas.push(value.to_vec());
        DataIndex(idx)
    }

    /// Intern a run of integers
    pub fn add_int_data(&mut self, values: &[i32]) -> IntDataIndex {
        if let Some(start) = find_run(&self.int_data, values, |a, b| a == b) {
            return IntDataIndex(start as u32);
        }
        let start = self.int_data.len() as u32;
        self.int_data.extend_from_slice(values);
        IntDataIndex(start)
    }

    /// Intern a run of floats (compared bitwise)
    pub fn add_float_data(&mut self, values: &[f32]) -> FloatDataIndex {
        if let Some(start) = find_run(&self.float_data, values, |a, b| a.to_bits() == b.to_bits()) {
            return FloatDataIndex(start as u32);
        }
        let start = self.float_data.len() as u32;
        self.float_data.extend_from_slice(values);
        FloatDataIndex(start)
    }

    /// Get a string by index
    pub fn string(&self, index: StringIndex) -> Option<&str> {
        self.strings.get(index.0 as usize).map(String::as_str)
    }

    /// Get a url by index
    pub fn url(&self, index: UrlIndex) -> Option<&str> {
        self.urls.get(index.0 as usize).map(String::as_str)
    }

    /// Get a byte array by index
    pub fn data(&self, index: DataIndex) -> Option<&[u8]> {
        self.datas.get(index.0 as usize).map(Vec::as_slice)
    }

    /// Get `len` integers starting at `index`
    pub fn int_data(&self, index: IntDataIndex, len: usize) -> Option<&[i32]> {
        let start = index.0 as usize;
        self.int_data.get(start..start + len)
    }

    /// Get `len` floats starting at `index`
    pub fn float_data(&self, index: FloatDataIndex, len: usize) -> Option<&[f32]> {
        let start = index.0 as usize;
        self.float_data.get(start..start + len)
    }

    /// All interned strings
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// All interned byte arrays
    pub fn datas(&self) -> &[Vec<u8>] {
        &self.datas
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.strings.clear();
        self.urls.clear();
        self.datas.clear();
        self.int_data.clear();
        self.float_data.clear();
    }
}

fn find_run<T: Copy>(haystack: &[T], needle: &[T], eq: impl Fn(T, T) -> bool) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.iter().zip(needle).all(|(a, b)| eq(*a, *b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_deduplication() {
        let mut pool = DataPool::new();
        let a = pool.add_string("width");
        let b = pool.add_string("height");
        let c = pool.add_string("width");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.string(b), Some("height"));
        assert_eq!(pool.strings().len(), 2);
    }

    #[test]
    fn test_int_runs_reuse_existing_subsequence() {
        let mut pool = DataPool::new();
        let first = pool.add_int_data(&[1, 2, 3, 4]);
        let inner = pool.add_int_data(&[2, 3]);
        assert_eq!(first, IntDataIndex(0));
        assert_eq!(inner, IntDataIndex(1));
        assert_eq!(pool.int_data(inner, 2), Some(&[2, 3][..]));

        let fresh = pool.add_int_data(&[9]);
        assert_eq!(fresh, IntDataIndex(4));
    }

    #[test]
    fn test_float_runs_compare_bitwise() {
        let mut pool = DataPool::new();
        let a = pool.add_float_data(&[0.0, 1.5]);
        let b = pool.add_float_data(&[-0.0, 1.5]);
        assert_ne!(a, b);
        assert_eq!(pool.float_data(b, 2), Some(&[-0.0, 1.5][..]));
    }

    #[test]
    fn test_data_and_url_tables() {
        let mut pool = DataPool::new();
        let d = pool.add_data(&[1, 2, 3]);
        assert_eq!(pool.add_data(&[1, 2, 3]), d);
        assert_eq!(pool.data(d), Some(&[1u8, 2, 3][..]));

        let u = pool.add_url("file:///a.qml");
        assert_eq!(pool.url(u), Some("file:///a.qml"));
        assert_eq!(pool.url(UrlIndex(5)), None);

        pool.clear();
        assert!(pool.strings().is_empty());
        assert!(pool.datas().is_empty());
    }
}
