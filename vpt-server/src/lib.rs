// vpt-server/src/lib.rs
// ============================================================================
// Module: vpt-server
// Description: The stateless API server: authorization/team scoping, direct
//              CRUD on trees/testcases/folders/tags, and a proxy to whichever
//              Host owns a targeted device (§2, §4.5, §6.1).
// Purpose: Library crate `vpt-cli`'s `vpt server` subcommand wraps; also the
//          crate integration tests exercise directly.
// Dependencies: vpt-core, vpt-config, vpt-client, vpt-store-sqlite, axum,
//               tokio
// ============================================================================

//! ## Overview
//! The Server never executes device work itself (§4.5 Proxying rules): every
//! route here either reads/writes its own persistence directly (trees,
//! testcases, folders, tags, the AI plan cache's maintenance hook) or proxies
//! to a Host resolved from [`hosts::HostRegistry`] through [`vpt_client`].
//! [`locks::ExecutionLocks`] implements the per-device and per-team
//! backpressure §5 requires.

pub mod error;
pub mod hosts;
pub mod locks;
pub mod routes;
pub mod server;
pub mod state;
pub mod tasks;

pub use error::ApiError;
pub use error::Envelope;
pub use hosts::HostRegistry;
pub use locks::ExecutionLocks;
pub use server::run;
pub use server::ServerError;
pub use state::ServerState;
pub use tasks::TaskRegistry;
