#![no_std]
extern crate alloc;

pub mod arena;
pub mod ledger;

pub use arena::{InflightArena, Token};
pub use ledger::{BufferLedger, IoBuffer};
