//! The Archon facade: a `Project` handle with an explicit
//! `open`/`close` lifecycle that wires every component crate together.
//! Nothing here is ambient or global — a caller always holds the `Project`
//! it operates on and passes it by reference.

mod logging;
mod project;
mod recovery;
mod repo_access;

pub use logging::init_tracing;
pub use project::{OpenOutcome, Project};
pub use repo_access::ProjectRepoAccess;
