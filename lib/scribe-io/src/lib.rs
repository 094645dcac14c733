//! Network I/O for shipping metrics to remote endpoints.

pub mod net;
