//! Statewright: a hierarchical state machine runtime
//!
//! Machine classes arrive as flat lists of node records (states, conduits,
//! nested state machines, references to other classes and the transitions
//! between them). Statewright assembles them into instance graphs, gives
//! every node a stable path GUID and runs the result.
//!
//! # Core Concepts
//!
//! - **Blueprints**: [`blueprint::MachineClass`] records and the
//!   [`blueprint::ClassRegistry`] that resolves classes, node classes and
//!   templates
//! - **Assembly**: [`assembly::Assembler`] turns a class into instance graphs,
//!   resolving references and detecting circular ones
//! - **Runtime**: [`runtime::StateMachineInstance`] starts, updates and stops
//!   an assembled machine and records its transition history
//! - **Checkpoints**: snapshots of active states that can be restored into a
//!   fresh instance
//!
//! # Example
//!
//! ```rust
//! use serde_json::Value;
//! use statewright::blueprint::{ClassBuilder, ClassRegistry, TransitionSpec};
//! use statewright::config::InstanceConfig;
//! use statewright::core::{Guard, NodeClass};
//! use statewright::runtime::StateMachineInstance;
//!
//! let mut registry = ClassRegistry::new();
//! registry.register_node_class(NodeClass::transition("Always", Guard::always()));
//! registry.register_node_class(NodeClass::transition(
//!     "Approved",
//!     Guard::new(|ctx| ctx.variable("approved") == Some(&Value::Bool(true))),
//! ));
//! registry.register(
//!     ClassBuilder::new("Workflow")
//!         .variable("approved", false)
//!         .graph(|g| {
//!             g.initial_state("Initial")
//!                 .state("Processing")
//!                 .state("Complete")
//!                 .transition(TransitionSpec::new().from("Initial").to("Processing").class("Always"))
//!                 .transition(TransitionSpec::new().from("Processing").to("Complete").class("Approved"))
//!         })
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut workflow = StateMachineInstance::new("Workflow", InstanceConfig::default());
//! workflow.initialize(&registry).unwrap();
//! workflow.start();
//! workflow.update(0.5);
//! workflow.update(0.5);
//! assert!(!workflow.is_in_end_state());
//!
//! if let Some(variables) = workflow.variables_mut() {
//!     variables.insert("approved".to_string(), Value::Bool(true));
//! }
//! workflow.update(0.5);
//!
//! assert!(workflow.is_in_end_state());
//! assert_eq!(workflow.history().transitions().len(), 2);
//! ```

pub mod assembly;
pub mod blueprint;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod runtime;
pub mod validation;

// Re-export commonly used types
pub use blueprint::{ClassBuilder, ClassId, ClassRegistry, MachineClass};
pub use config::InstanceConfig;
pub use core::{Guard, NodeClass, NodeGuid, StateHistory};
pub use runtime::StateMachineInstance;
