//! gridshare_model - Cell model, reference grammar and wire protocol.

pub mod model;
pub mod protocol;
