//! Running assembled state machines.
//!
//! Execution is synchronous and single threaded per instance: each call to
//! [`StateMachineInstance::update`] evaluates transitions and runs update
//! behavior to completion before returning.

mod engine;
mod instance;

pub use instance::StateMachineInstance;
