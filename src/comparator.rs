//! Custom key comparator support
//!
//! This module provides support for custom key ordering in databases.
//! By default, keys are compared lexicographically, but custom comparators
//! allow for different ordering schemes like case-insensitive, numeric, etc.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

/// Trait for custom key comparators
pub trait Comparator: Send + Sync + 'static {
    /// Compare two keys and return their ordering
    fn compare(a: &[u8], b: &[u8]) -> Ordering;
    
    /// Optional: Return a name for this comparator (for debugging)
    fn name() -> &'static str {
        "CustomComparator"
    }
}

/// Default lexicographic comparator (byte-wise comparison)
pub struct LexicographicComparator;

impl Comparator for LexicographicComparator {
    #[inline(always)]
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name() -> &'static str {
        "LexicographicComparator"
    }
}

/// Case-insensitive string comparator (UTF-8)
pub struct CaseInsensitiveComparator;

impl Comparator for CaseInsensitiveComparator {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        // Try to convert to UTF-8 strings
        match (std::str::from_utf8(a), std::str::from_utf8(b)) {
            (Ok(str_a), Ok(str_b)) => {
                // Compare case-insensitively
                str_a.to_lowercase().cmp(&str_b.to_lowercase())
            }
            _ => {
                // Fall back to byte comparison if not valid UTF-8
                a.cmp(b)
            }
        }
    }
    
    fn name() -> &'static str {
        "CaseInsensitiveComparator"
    }
}

/// Numeric comparator for big-endian encoded integers
pub struct NumericComparator;

impl Comparator for NumericComparator {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        // Compare by length first (longer numbers are bigger)
        match a.len().cmp(&b.len()) {
            Ordering::Equal => {
                // Same length, compare bytes
                a.cmp(b)
            }
            other => other,
        }
    }
    
    fn name() -> &'static str {
        "NumericComparator"
    }
}

/// Reverse comparator - reverses the ordering of another comparator
pub struct ReverseComparator<C: Comparator> {
    _phantom: PhantomData<C>,
}

impl<C: Comparator> Comparator for ReverseComparator<C> {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        C::compare(a, b).reverse()
    }
    
    fn name() -> &'static str {
        "ReverseComparator"
    }
}

/// Fixed-size comparator for types that can be compared directly
/// This enables optimizations for fixed-size keys
pub struct FixedSizeComparator<const N: usize>;

impl<const N: usize> Comparator for FixedSizeComparator<N> {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        // Ensure both slices are exactly N bytes
        if a.len() != N || b.len() != N {
            // Fall back to lexicographic comparison for safety
            return a.cmp(b);
        }
        
        // Direct byte comparison for fixed-size data
        a.cmp(b)
    }
    
    fn name() -> &'static str {
        "FixedSizeComparator"
    }
}

/// Runtime-selectable key ordering, stored per-database in `DbInfo`.
///
/// The `Comparator` trait above is resolved at compile time through the
/// `Database<K, V, C>` type parameter; that's the right fit when the caller
/// knows the ordering up front. Operations that only learn a database's
/// ordering by opening it at runtime (the catalog, `mdb_cmp`-style APIs)
/// need a value they can match on instead, so `KeyComparator` mirrors the
/// same four orderings behind a closed enum.
#[derive(Clone, Copy)]
pub enum KeyComparator {
    /// Plain byte-wise comparison (the default)
    Bytes,
    /// Byte-wise comparison, reversed
    BytesReverse,
    /// Native-endian integer comparison (fixed-width keys only)
    NativeInt,
    /// A user-supplied comparison function
    Custom(fn(&[u8], &[u8]) -> Ordering),
}

impl fmt::Debug for KeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyComparator::Bytes => write!(f, "Bytes"),
            KeyComparator::BytesReverse => write!(f, "BytesReverse"),
            KeyComparator::NativeInt => write!(f, "NativeInt"),
            KeyComparator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Default for KeyComparator {
    fn default() -> Self {
        KeyComparator::Bytes
    }
}

impl KeyComparator {
    /// Compare two keys according to this ordering.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyComparator::Bytes => a.cmp(b),
            KeyComparator::BytesReverse => b.cmp(a),
            KeyComparator::NativeInt => compare_native_int(a, b),
            KeyComparator::Custom(f) => f(a, b),
        }
    }
}

/// Compares keys as native-endian integers of equal width (1, 2, 4 or 8
/// bytes). Mismatched or unsupported widths fall back to byte comparison,
/// matching how LMDB's `mdb_cmp_cint` degrades on bad input rather than
/// panicking.
fn compare_native_int(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() != b.len() {
        return a.len().cmp(&b.len());
    }
    match a.len() {
        4 => {
            let x = u32::from_ne_bytes(a.try_into().unwrap());
            let y = u32::from_ne_bytes(b.try_into().unwrap());
            x.cmp(&y)
        }
        8 => {
            let x = u64::from_ne_bytes(a.try_into().unwrap());
            let y = u64::from_ne_bytes(b.try_into().unwrap());
            x.cmp(&y)
        }
        2 => {
            let x = u16::from_ne_bytes(a.try_into().unwrap());
            let y = u16::from_ne_bytes(b.try_into().unwrap());
            x.cmp(&y)
        }
        1 => a[0].cmp(&b[0]),
        _ => a.cmp(b),
    }
}
