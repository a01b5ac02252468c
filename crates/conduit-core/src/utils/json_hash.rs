//! Deterministic JSON hashing for cache-key derivation.
//!
//! Hashes a `serde_json::Value` structurally instead of serializing it to a string. A
//! fixed-seed `ahash` state keeps the digest stable for the lifetime of the process, which
//! is all the in-memory cache needs.

use ahash::RandomState;
use serde_json::Value;
use std::hash::{BuildHasher, Hash, Hasher};

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hash a `serde_json::Value` directly without serialization.
///
/// Each JSON type is prefixed with a discriminant byte so that e.g. the string `"1"` and
/// the number `1` never collide:
/// - Null: 0u8
/// - Bool: 1u8 + bool value
/// - Number: 2u8 + number representation
/// - String: 3u8 + bytes
/// - Array: 4u8 + length + each element
/// - Object: 5u8 + length + sorted (key, value) pairs
pub fn hash_json_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => {
            0u8.hash(hasher);
        }
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            if let Some(u) = n.as_u64() {
                0u8.hash(hasher);
                u.hash(hasher);
            } else if let Some(i) = n.as_i64() {
                1u8.hash(hasher);
                i.hash(hasher);
            } else if let Some(f) = n.as_f64() {
                2u8.hash(hasher);
                let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                bits.hash(hasher);
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(arr) => {
            4u8.hash(hasher);
            arr.len().hash(hasher);
            for element in arr {
                hash_json_value(element, hasher);
            }
        }
        Value::Object(obj) => {
            5u8.hash(hasher);
            obj.len().hash(hasher);

            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort_unstable();

            for key in sorted_keys {
                key.hash(hasher);
                if let Some(value) = obj.get(key) {
                    hash_json_value(value, hasher);
                }
            }
        }
    }
}

/// 64-bit digest of call arguments.
#[must_use]
pub fn hash_args(args: &Value) -> u64 {
    let mut hasher = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]).build_hasher();
    hash_json_value(args, &mut hasher);
    hasher.finish()
}

/// Digest of call arguments rendered as 16 lowercase hex digits.
#[must_use]
pub fn hash_args_hex(args: &Value) -> String {
    format!("{:016x}", hash_args(args))
}
