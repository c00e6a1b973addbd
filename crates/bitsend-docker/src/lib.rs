//! Docker access for bitsend.
//!
//! The regtest backend drives `bitcoin-cli` and `lncli` inside already
//! running node containers; this crate owns the Docker connection and the
//! `exec` plumbing.

mod container;

pub use container::{ContainerManager, ExecOutput};
