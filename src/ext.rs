//! Extension contracts for signing requests built by other HTTP stacks.

pub mod request_signer;

pub use request_signer::*;
