#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod convention;
pub mod func;
pub mod hook;
pub mod probe;
pub mod raw;

pub use self::func::{cfunc, Function, Method};
pub use self::hook::swap::{Originals, SwapError, VfptrSwap};
pub use self::hook::HookGuard;
