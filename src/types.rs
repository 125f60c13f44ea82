/// Index of a reference sequence in a SAM/BAM header.
pub type RefId = usize;
/// Order stamp of a record batch within the input stream.
pub type BatchId = usize;

// Fast hash maps using AHash instead of the default SipHash.
// Import with `use crate::types::{HashMap, HashMapExt}` when you need `::new()`.
pub(crate) type HashMap<K, V> = ahash::HashMap<K, V>;
pub(crate) use ahash::HashMapExt;
