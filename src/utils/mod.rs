pub mod validation;

/// Decodes latin-1 bytes. Every byte maps to the code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Integer mean of `count` samples summing to `total`, `None` before the first sample.
pub fn mean(total: u64, count: u64) -> Option<u64> {
    (count > 0).then(|| total / count)
}
