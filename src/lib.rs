#![doc = include_str!("RUSTDOC.md")]

pub mod blocking;
pub mod firestore;
pub mod logger;

#[cfg(test)]
pub mod test_support;
