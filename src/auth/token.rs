//! Token records and the secrets they carry.

pub mod record;
pub mod secret;
