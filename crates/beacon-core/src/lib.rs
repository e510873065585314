//! beacon-core — wire constants, the frame codec, the crypto adapter, the
//! encryption session state machine, and the config layer.
//!
//! Depended on by every other beacon crate. Contains no I/O beyond config
//! file reads and `/etc/machine-id`/`/etc/hostname` lookups.

pub mod config;
pub mod crypto;
pub mod frame;
pub mod session;
pub mod wire;
