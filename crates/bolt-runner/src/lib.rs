#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! The Bolt runner: drives two-party workflow jobs through a declared stage
//! flow, coordinating a Publisher and a Partner peer client per job.

mod config;
mod peer_client;
mod runner;

pub use config::RunnerConfig;
pub use peer_client::PeerClient;
pub use runner::Runner;

pub use bolt_core::{
    BoltError, BoltState, ErrorSummary, Event, Hook, HookContext, HookKey, HookRegistry, Job,
    JobSummary, Role, Stage, StageFlow, StagePhase, Timing,
};
