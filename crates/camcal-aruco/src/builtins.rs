//! Code tables compiled into the crate from `data/*_CODES.json`.

#![allow(clippy::unreadable_literal)]

pub(crate) struct BuiltinTable {
    pub name: &'static str,
    pub marker_size: usize,
    pub max_correction_bits: u8,
    pub codes: &'static [u64],
}

include!(concat!(env!("OUT_DIR"), "/builtins.rs"));

pub(crate) fn builtin_table(name: &str) -> Option<&'static BuiltinTable> {
    BUILTIN_TABLES.iter().find(|t| t.name == name)
}
