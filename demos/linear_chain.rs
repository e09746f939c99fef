//! Linear Chain State Machine
//!
//! This example builds a five state chain, collapses the middle two states
//! into a nested state machine and runs it to completion.
//!
//! Key concepts:
//! - Authoring a class with the builder
//! - Collapsing states into a nested machine
//! - Transition history by path GUID
//! - Checkpointing a running instance
//!
//! Run with: RUST_LOG=debug cargo run --example linear_chain

use statewright::blueprint::{collapse_states, ClassBuilder, ClassRegistry, TransitionSpec};
use statewright::config::InstanceConfig;
use statewright::core::{Guard, NodeClass};
use statewright::runtime::StateMachineInstance;
use statewright::validation::validate_class;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Linear Chain State Machine ===\n");

    let mut class = ClassBuilder::new("Chain")
        .graph(|mut g| {
            g = g.initial_state("S1");
            for n in 2..=5 {
                g = g.state(format!("S{n}")).transition(
                    TransitionSpec::new()
                        .from(format!("S{}", n - 1))
                        .to(format!("S{n}"))
                        .class("Always"),
                );
            }
            g
        })
        .build()
        .unwrap();

    let middle: Vec<_> = class
        .records()
        .iter()
        .filter(|record| record.name == "S3" || record.name == "S4")
        .map(|record| record.guid)
        .collect();
    collapse_states(&mut class, &middle, "Middle").unwrap();
    println!("Collapsed S3 and S4 into a nested state machine 'Middle'");

    let mut registry = ClassRegistry::new();
    registry.register_node_class(NodeClass::transition("Always", Guard::always()));
    registry.register(class);

    let checked = validate_class(&registry, &"Chain".into());
    println!("Structural validation passed: {}\n", checked.is_success());

    let mut chain = StateMachineInstance::new("Chain", InstanceConfig::default());
    chain.initialize(&registry).unwrap();
    chain.start();

    let mut tick = 0;
    while !chain.is_in_end_state() {
        tick += 1;
        chain.update(0.1);
        let active: Vec<_> = chain.active_states().iter().map(|s| s.name().to_string()).collect();
        println!("Tick {tick}: active {active:?}");
    }

    println!("\nTransition history:");
    for event in chain.history().transitions() {
        println!("  {} -> {} ({})", event.from, event.to_name, event.transition);
    }

    let checkpoint = chain.checkpoint();
    println!("\nCheckpoint {} with {} active states", checkpoint.id, checkpoint.active_states.len());
    match checkpoint.to_json() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Could not serialize checkpoint: {err}"),
    }

    chain.stop();
}
