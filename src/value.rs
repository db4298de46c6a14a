//! The closed set of values that cross the channel.
//!
//! Every variant has an exact wire representation in [`crate::codec`]; there
//! is no reflective or extensible serialization path. Structured data travels
//! as JSON text, typed numeric arrays travel as raw little-endian bytes.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Arbitrary-precision integer, sign-magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigIntValue {
    pub negative: bool,
    /// Little-endian magnitude bytes; empty means zero.
    pub magnitude: Vec<u8>,
}

impl BigIntValue {
    pub fn from_i128(v: i128) -> Self {
        let negative = v < 0;
        let mut mag = v.unsigned_abs();
        let mut magnitude = Vec::new();
        while mag != 0 {
            magnitude.push((mag & 0xff) as u8);
            mag >>= 8;
        }
        Self { negative, magnitude }
    }
}

/// A name/message pair representing a thrown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
}

/// Process-wide interned symbol.
///
/// Only symbols minted through [`Symbol::for_key`] round-trip across the
/// channel: both sides resolve the id against the same global registry.
/// Symbols from [`Symbol::unique`] are identity-only and are rejected at
/// encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

/// High bit marks symbols outside the registry.
const SYMBOL_UNREGISTERED: u32 = 1 << 31;

struct SymbolRegistry {
    by_key: HashMap<String, u32>,
    keys: Vec<String>,
    next_unique: u32,
}

fn registry() -> &'static Mutex<SymbolRegistry> {
    static REGISTRY: OnceLock<Mutex<SymbolRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(SymbolRegistry {
            by_key: HashMap::new(),
            keys: Vec::new(),
            next_unique: SYMBOL_UNREGISTERED,
        })
    })
}

impl Symbol {
    /// Intern `key` in the global registry. Two calls with the same key
    /// return the same symbol, on any thread.
    pub fn for_key(key: &str) -> Symbol {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = reg.by_key.get(key) {
            return Symbol(id);
        }
        let id = reg.keys.len() as u32;
        reg.keys.push(key.to_owned());
        reg.by_key.insert(key.to_owned(), id);
        Symbol(id)
    }

    /// Mint a fresh symbol outside the registry. Usable locally, but any
    /// attempt to send it across the channel is rejected.
    pub fn unique() -> Symbol {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        let id = reg.next_unique;
        reg.next_unique = reg.next_unique.wrapping_add(1) | SYMBOL_UNREGISTERED;
        Symbol(id)
    }

    /// The registry key, or `None` for unregistered symbols.
    pub fn key(&self) -> Option<String> {
        if !self.is_registered() {
            return None;
        }
        let reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        reg.keys.get(self.0 as usize).cloned()
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.0 & SYMBOL_UNREGISTERED == 0
    }
}

/// A value crossing the channel, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    /// 64-bit integer, packed inline into the two immediate words.
    Int(i64),
    /// Full-width float, including NaN and the infinities.
    Float(f64),
    BigInt(BigIntValue),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    Str(String),
    /// Structured data, carried as JSON.
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    /// View-tagged bytes: same wire shape as [`Value::Bytes`] under its own
    /// tag. The decoder hands back an owned copy, so the contents never
    /// alias the slot arena.
    ByteView(Vec<u8>),
    I32Array(Vec<i32>),
    F64Array(Vec<f64>),
    I64Array(Vec<i64>),
    U64Array(Vec<u64>),
    Error(ErrorValue),
    Symbol(Symbol),
    /// A function reference by name. Never encodable; kept in the model so
    /// rejection happens in the codec with a stable reason string.
    Function(String),
}

impl Value {
    /// True for values that encode into the header words alone, needing no
    /// payload bytes at all.
    pub fn is_header_only(&self) -> bool {
        matches!(
            self,
            Value::Undefined
                | Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Date(_)
        )
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_symbols_are_interned() {
        let a = Symbol::for_key("alpha");
        let b = Symbol::for_key("alpha");
        let c = Symbol::for_key("beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key().as_deref(), Some("alpha"));
        assert!(a.is_registered());
    }

    #[test]
    fn unique_symbols_are_unregistered() {
        let a = Symbol::unique();
        let b = Symbol::unique();
        assert_ne!(a, b);
        assert!(!a.is_registered());
        assert_eq!(a.key(), None);
    }

    #[test]
    fn bigint_magnitude_is_little_endian() {
        let v = BigIntValue::from_i128(-0x0102);
        assert!(v.negative);
        assert_eq!(v.magnitude, vec![0x02, 0x01]);

        let zero = BigIntValue::from_i128(0);
        assert!(!zero.negative);
        assert!(zero.magnitude.is_empty());
    }

    #[test]
    fn header_only_classification() {
        assert!(Value::Int(5).is_header_only());
        assert!(Value::Float(f64::NAN).is_header_only());
        assert!(Value::Date(0.0).is_header_only());
        assert!(!Value::Str("x".into()).is_header_only());
        assert!(!Value::Bytes(vec![]).is_header_only());
    }
}
