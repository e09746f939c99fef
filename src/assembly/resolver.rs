//! Reference resolution bookkeeping for one top-level assembly.
//!
//! A [`Generation`] is created by the outermost assembly call and threaded
//! through every nested call it makes. It is never shared between top-level
//! assemblies, so independent assemblies (on any thread) cannot observe each
//! other's progress.

use super::error::AssemblyError;
use crate::blueprint::ClassId;
use crate::core::{InstanceId, NodeRef};
use std::collections::HashMap;
use tracing::{error, trace, warn};

/// What a reference node should do with its target class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Point at an instance that already exists.
    Shared(InstanceId),
    /// The shared instance is still being built; the site has been queued
    /// and will be patched once it completes.
    Pending,
    /// Build a new instance.
    Instantiate,
}

/// Transient resolver state of one top-level assembly.
#[derive(Debug, Default)]
pub struct Generation {
    in_progress: HashMap<ClassId, usize>,
    shared: HashMap<ClassId, Option<InstanceId>>,
    waiting: HashMap<ClassId, Vec<NodeRef>>,
    dry_run: bool,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookkeeping for an assembly that never instantiates references.
    ///
    /// Shared references are neither reserved nor queued, since no site
    /// would ever complete them.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Mark `class` as being instantiated.
    pub fn begin(&mut self, class: &ClassId) {
        *self.in_progress.entry(class.clone()).or_insert(0) += 1;
        trace!(class = %class, depth = self.in_progress(class), "instantiating class");
    }

    /// Mark one instantiation of `class` as finished.
    pub fn end(&mut self, class: &ClassId) {
        match self.in_progress.get_mut(class) {
            Some(count) if *count > 0 => *count -= 1,
            _ => {
                error!(class = %class, "finished instantiating a class that was never started");
                debug_assert!(false, "unbalanced instantiation of {class}");
            }
        }
    }

    /// Number of unfinished instantiations of `class`.
    pub fn in_progress(&self, class: &ClassId) -> usize {
        self.in_progress.get(class).copied().unwrap_or(0)
    }

    /// Decide how the reference node at `site` resolves to `class`.
    ///
    /// Shared references reuse (or wait for) the first instance of the class.
    /// Other references always get a fresh instance, unless the class is
    /// already being instantiated further up, which would recurse forever.
    pub fn resolve(
        &mut self,
        class: &ClassId,
        reuse: bool,
        site: NodeRef,
        site_name: &str,
    ) -> Result<Resolution, AssemblyError> {
        if reuse && self.dry_run {
            return Ok(Resolution::Instantiate);
        }
        if reuse {
            return Ok(match self.shared.get(class) {
                Some(Some(instance)) => Resolution::Shared(*instance),
                Some(None) => {
                    self.waiting.entry(class.clone()).or_default().push(site);
                    Resolution::Pending
                }
                None => {
                    self.shared.insert(class.clone(), None);
                    Resolution::Instantiate
                }
            });
        }

        // Any instantiation in progress counts, the top-level class included,
        // so a self-reference fails before a single nested copy is built.
        if self.in_progress(class) > 0 {
            error!(
                class = %class,
                node = site_name,
                "attempted to generate a state machine with circular referencing"
            );
            return Err(AssemblyError::CircularReference {
                class: class.clone(),
                node: site_name.to_string(),
            });
        }
        Ok(Resolution::Instantiate)
    }

    /// Record the shared instance of `class`, returning the queued sites that
    /// must now point at it.
    pub fn complete_shared(&mut self, class: &ClassId, instance: InstanceId) -> Vec<NodeRef> {
        self.shared.insert(class.clone(), Some(instance));
        self.waiting.remove(class).unwrap_or_default()
    }

    /// Forget a shared reservation whose instantiation failed.
    pub fn abandon_shared(&mut self, class: &ClassId) {
        if let Some(None) = self.shared.get(class) {
            self.shared.remove(class);
        }
    }

    pub fn shared_instance(&self, class: &ClassId) -> Option<InstanceId> {
        self.shared.get(class).copied().flatten()
    }

    /// Number of reference sites still waiting for a shared instance.
    pub fn pending(&self) -> usize {
        self.waiting.values().map(Vec::len).sum()
    }

    /// Drop everything that refers to instances at or after `first`.
    ///
    /// Called when those instances are discarded after a failed
    /// instantiation; shared entries pointing into them must not be handed
    /// out again.
    pub fn discard_from(&mut self, first: InstanceId) {
        self.shared
            .retain(|_, instance| !matches!(instance, Some(id) if id.0 >= first.0));
        for sites in self.waiting.values_mut() {
            sites.retain(|site| site.instance.0 < first.0);
        }
        self.waiting.retain(|_, sites| !sites.is_empty());
    }

    /// Tear down the bookkeeping, checking every instantiation finished.
    pub fn finish(self) -> Result<(), AssemblyError> {
        let unfinished: Vec<String> = self
            .in_progress
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(class, count)| format!("{class} ({count})"))
            .collect();
        for (class, sites) in &self.waiting {
            warn!(class = %class, sites = sites.len(), "shared reference was never resolved");
        }
        if unfinished.is_empty() {
            return Ok(());
        }

        error!(classes = ?unfinished, "instantiation counters did not return to zero");
        debug_assert!(unfinished.is_empty(), "unfinished instantiations: {unfinished:?}");
        Err(AssemblyError::InvariantViolation(format!(
            "unfinished instantiations: {}",
            unfinished.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;

    fn site(n: usize) -> NodeRef {
        NodeRef::new(InstanceId(0), NodeId(n))
    }

    #[test]
    fn first_shared_reference_instantiates() {
        let mut generation = Generation::new();
        let class = ClassId::from("Ref");

        assert_eq!(
            generation.resolve(&class, true, site(1), "A").unwrap(),
            Resolution::Instantiate
        );
        assert_eq!(
            generation.resolve(&class, true, site(2), "B").unwrap(),
            Resolution::Pending
        );

        let waiters = generation.complete_shared(&class, InstanceId(1));
        assert_eq!(waiters, vec![site(2)]);
        assert_eq!(
            generation.resolve(&class, true, site(3), "C").unwrap(),
            Resolution::Shared(InstanceId(1))
        );
        assert!(generation.finish().is_ok());
    }

    #[test]
    fn unshared_reference_to_class_in_progress_is_circular() {
        let mut generation = Generation::new();
        let class = ClassId::from("Loop");
        generation.begin(&class);

        let result = generation.resolve(&class, false, site(1), "Self");

        assert!(matches!(result, Err(AssemblyError::CircularReference { .. })));
        generation.end(&class);
        assert!(generation.finish().is_ok());
    }

    #[test]
    fn unshared_references_always_instantiate() {
        let mut generation = Generation::new();
        let class = ClassId::from("Ref");

        for n in 0..3 {
            assert_eq!(
                generation.resolve(&class, false, site(n), "R").unwrap(),
                Resolution::Instantiate
            );
        }
    }

    #[test]
    fn abandoned_reservation_can_be_retried() {
        let mut generation = Generation::new();
        let class = ClassId::from("Ref");

        generation.resolve(&class, true, site(1), "A").unwrap();
        generation.abandon_shared(&class);

        assert_eq!(
            generation.resolve(&class, true, site(2), "B").unwrap(),
            Resolution::Instantiate
        );
    }

    #[test]
    fn dry_run_never_queues_shared_references() {
        let mut generation = Generation::dry_run();
        let class = ClassId::from("Ref");

        for n in 0..3 {
            assert_eq!(
                generation.resolve(&class, true, site(n), "R").unwrap(),
                Resolution::Instantiate
            );
        }

        assert_eq!(generation.pending(), 0);
        assert_eq!(generation.shared_instance(&class), None);
        assert!(generation.finish().is_ok());
    }

    #[test]
    fn dry_run_still_rejects_circular_references() {
        let mut generation = Generation::dry_run();
        let class = ClassId::from("Loop");
        generation.begin(&class);

        let result = generation.resolve(&class, false, site(1), "Self");

        assert!(matches!(result, Err(AssemblyError::CircularReference { .. })));
        generation.end(&class);
    }

    #[test]
    fn discarded_instances_are_not_shared_again() {
        let mut generation = Generation::new();
        let kept = ClassId::from("Kept");
        let dropped = ClassId::from("Dropped");

        generation.resolve(&kept, true, site(1), "K").unwrap();
        generation.complete_shared(&kept, InstanceId(1));
        generation.resolve(&dropped, true, site(2), "D").unwrap();
        generation.complete_shared(&dropped, InstanceId(3));
        generation
            .resolve(&ClassId::from("Waiting"), true, NodeRef::new(InstanceId(3), NodeId(1)), "W")
            .unwrap();
        generation
            .resolve(&ClassId::from("Waiting"), true, NodeRef::new(InstanceId(4), NodeId(1)), "W")
            .unwrap();
        assert_eq!(generation.pending(), 1);

        generation.discard_from(InstanceId(2));

        assert_eq!(generation.shared_instance(&kept), Some(InstanceId(1)));
        assert_eq!(
            generation.resolve(&dropped, true, site(5), "D").unwrap(),
            Resolution::Instantiate
        );
        assert_eq!(generation.pending(), 0);
    }

    #[test]
    fn counters_track_nesting() {
        let mut generation = Generation::new();
        let class = ClassId::from("Ref");
        generation.begin(&class);
        generation.begin(&class);
        assert_eq!(generation.in_progress(&class), 2);

        generation.end(&class);
        generation.end(&class);
        assert_eq!(generation.in_progress(&class), 0);
        assert!(generation.finish().is_ok());
    }
}
