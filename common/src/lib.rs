//! Core of the `ccp` file copier: the writable-filesystem abstraction, the
//! local and SFTP backends, and the concurrent copy engine. The terminal
//! front end lives in the `ccp` binary crate and talks to the engine only
//! through [`progress::Progress`].

pub mod copy;
pub mod local;
pub mod path;
pub mod progress;
pub mod sftp;
pub mod wfs;

#[cfg(test)]
mod testutils;
