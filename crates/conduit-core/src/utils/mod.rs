//! Small deterministic helpers shared across modules.
//!
//! ## JSON Hashing (`json_hash`)
//! - Structural hashing of call arguments for cache-key derivation
//! - Canonical key ordering so `{"a":1,"b":2}` and `{"b":2,"a":1}` share a key
//!
//! ## Hex Parsing (`hex`)
//! - Quantity parsing for JSON-RPC results such as `eth_blockNumber`

pub mod hex;
pub mod json_hash;

pub use hex::parse_hex_u64;
pub use json_hash::{hash_args, hash_args_hex, hash_json_value};
