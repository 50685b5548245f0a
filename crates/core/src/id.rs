// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark identifiers.
//!
//! Every benchmark invocation gets one [`BenchmarkId`]. It is embedded in the
//! artifact directory and in every compose project name, so two benchmarks
//! started within the same second never collide.

use rand::RngCore;
use serde::{Serialize, Serializer};
use std::fmt;

/// Lowercase RFC 4648 base-32 alphabet.
const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Length of the textual form of an id: 32 bits in 5-bit groups.
pub const ID_LEN: usize = 7;

/// A 4-byte random token, displayed as 7 lowercase base-32 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkId([u8; 4]);

impl BenchmarkId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Build an id from raw bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl Default for BenchmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BenchmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer: u64 = 0;
        let mut bits = 0u32;
        for &byte in &self.0 {
            buffer = (buffer << 8) | u64::from(byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                let index = ((buffer >> bits) & 0x1f) as usize;
                write!(f, "{}", ALPHABET[index] as char)?;
            }
        }
        if bits > 0 {
            let index = ((buffer << (5 - bits)) & 0x1f) as usize;
            write!(f, "{}", ALPHABET[index] as char)?;
        }
        Ok(())
    }
}

impl Serialize for BenchmarkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
