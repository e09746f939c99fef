//! Flattened state machine descriptions and the class registry.
//!
//! An external authoring tool compiles every state machine type into a
//! [`MachineClass`]: an ordered list of [`NodeRecord`]s tagged with their
//! structural GUID, the GUID of the state machine that owns them and their
//! kind. The [`ClassRegistry`] holds those classes together with the node
//! classes and named prototypes they refer to, and is the only thing the
//! assembler consults to instantiate a class.

pub mod builder;
pub mod collapse;

pub use builder::{BuildError, ClassBuilder, ReferenceSpec, ScopeBuilder, StateSpec, TransitionSpec};
pub use collapse::collapse_states;

use crate::core::{NodeClass, NodeGuid, NodeInstance, NodeKind, TemplateLookup};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identifier of a state machine type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClassId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn default_true() -> bool {
    true
}

/// Target of a reference node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub class: ClassId,
    /// Name of an instance template to copy variables from.
    #[serde(default)]
    pub template: Option<String>,
    /// Share one instance between every reference to `class`.
    #[serde(default)]
    pub reuse: bool,
}

/// Kind-specific fields of a node record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    State {
        #[serde(default)]
        initial: bool,
        #[serde(default)]
        eval_transitions_on_start: bool,
    },
    Conduit {
        #[serde(default)]
        initial: bool,
    },
    StateMachine {
        #[serde(default)]
        initial: bool,
        #[serde(default)]
        reference: Option<ReferenceRecord>,
        #[serde(default)]
        wait_for_end_state: bool,
    },
    Transition {
        from: NodeGuid,
        to: NodeGuid,
        #[serde(default)]
        priority: i32,
        #[serde(default = "default_true")]
        can_evaluate: bool,
        #[serde(default)]
        always_false: bool,
    },
}

/// One flattened node as produced by the authoring side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub guid: NodeGuid,
    /// Structural GUID of the owning state machine node.
    pub owner_guid: NodeGuid,
    pub name: String,
    pub kind: RecordKind,
    #[serde(default)]
    pub node_class: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

impl NodeRecord {
    fn with_kind(name: impl Into<String>, guid: NodeGuid, owner: NodeGuid, kind: RecordKind) -> Self {
        Self {
            guid,
            owner_guid: owner,
            name: name.into(),
            kind,
            node_class: None,
            template: None,
        }
    }

    pub fn state(name: impl Into<String>, guid: NodeGuid, owner: NodeGuid) -> Self {
        Self::with_kind(
            name,
            guid,
            owner,
            RecordKind::State {
                initial: false,
                eval_transitions_on_start: false,
            },
        )
    }

    pub fn conduit(name: impl Into<String>, guid: NodeGuid, owner: NodeGuid) -> Self {
        Self::with_kind(name, guid, owner, RecordKind::Conduit { initial: false })
    }

    pub fn state_machine(name: impl Into<String>, guid: NodeGuid, owner: NodeGuid) -> Self {
        Self::with_kind(
            name,
            guid,
            owner,
            RecordKind::StateMachine {
                initial: false,
                reference: None,
                wait_for_end_state: false,
            },
        )
    }

    pub fn reference(
        name: impl Into<String>,
        guid: NodeGuid,
        owner: NodeGuid,
        reference: ReferenceRecord,
    ) -> Self {
        Self::with_kind(
            name,
            guid,
            owner,
            RecordKind::StateMachine {
                initial: false,
                reference: Some(reference),
                wait_for_end_state: false,
            },
        )
    }

    pub fn transition(
        name: impl Into<String>,
        guid: NodeGuid,
        owner: NodeGuid,
        from: NodeGuid,
        to: NodeGuid,
    ) -> Self {
        Self::with_kind(
            name,
            guid,
            owner,
            RecordKind::Transition {
                from,
                to,
                priority: 0,
                can_evaluate: true,
                always_false: false,
            },
        )
    }

    /// Flag a state record as an initial state of its owner.
    pub fn initial(mut self) -> Self {
        self.set_initial(true);
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.node_class = Some(class.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set the priority of a transition record; ignored for states.
    pub fn with_priority(mut self, value: i32) -> Self {
        if let RecordKind::Transition { priority, .. } = &mut self.kind {
            *priority = value;
        }
        self
    }

    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            RecordKind::State { .. } => NodeKind::State,
            RecordKind::Conduit { .. } => NodeKind::Conduit,
            RecordKind::StateMachine { .. } => NodeKind::StateMachine,
            RecordKind::Transition { .. } => NodeKind::Transition,
        }
    }

    pub fn is_state(&self) -> bool {
        self.node_kind().is_state()
    }

    pub fn is_initial(&self) -> bool {
        match &self.kind {
            RecordKind::State { initial, .. }
            | RecordKind::Conduit { initial }
            | RecordKind::StateMachine { initial, .. } => *initial,
            RecordKind::Transition { .. } => false,
        }
    }

    pub fn set_initial(&mut self, value: bool) {
        match &mut self.kind {
            RecordKind::State { initial, .. }
            | RecordKind::Conduit { initial }
            | RecordKind::StateMachine { initial, .. } => *initial = value,
            RecordKind::Transition { .. } => {}
        }
    }

    /// Endpoints of a transition record.
    pub fn endpoints(&self) -> Option<(NodeGuid, NodeGuid)> {
        match &self.kind {
            RecordKind::Transition { from, to, .. } => Some((*from, *to)),
            _ => None,
        }
    }

    pub fn reference_target(&self) -> Option<&ReferenceRecord> {
        match &self.kind {
            RecordKind::StateMachine { reference, .. } => reference.as_ref(),
            _ => None,
        }
    }
}

/// Prototype for a referenced instance: its class and variable overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    pub class: ClassId,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl InstanceTemplate {
    pub fn new(class: impl Into<ClassId>) -> Self {
        Self {
            class: class.into(),
            variables: Map::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// The compiled description of one state machine type.
#[derive(Serialize, Deserialize)]
pub struct MachineClass {
    id: ClassId,
    #[serde(default)]
    parent: Option<ClassId>,
    root_guid: NodeGuid,
    #[serde(default)]
    root_node_class: Option<String>,
    #[serde(default)]
    records: Vec<NodeRecord>,
    #[serde(default)]
    variables: Map<String, Value>,
    #[serde(default)]
    instance_templates: HashMap<String, InstanceTemplate>,
    #[serde(skip)]
    node_templates: HashMap<String, Box<dyn NodeInstance>>,
}

impl MachineClass {
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            root_guid: NodeGuid::new(),
            root_node_class: None,
            records: Vec::new(),
            variables: Map::new(),
            instance_templates: HashMap::new(),
            node_templates: HashMap::new(),
        }
    }

    /// Parse a class from the JSON produced by the authoring side.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_parent(mut self, parent: impl Into<ClassId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_root_guid(mut self, guid: NodeGuid) -> Self {
        self.root_guid = guid;
        self
    }

    pub fn with_root_node_class(mut self, class: impl Into<String>) -> Self {
        self.root_node_class = Some(class.into());
        self
    }

    pub fn with_records(mut self, records: Vec<NodeRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_node_template<T>(mut self, name: impl Into<String>, template: T) -> Self
    where
        T: NodeInstance + 'static,
    {
        self.node_templates.insert(name.into(), Box::new(template));
        self
    }

    pub fn with_instance_template(mut self, name: impl Into<String>, template: InstanceTemplate) -> Self {
        self.instance_templates.insert(name.into(), template);
        self
    }

    pub fn id(&self) -> &ClassId {
        &self.id
    }

    pub fn parent(&self) -> Option<&ClassId> {
        self.parent.as_ref()
    }

    pub fn root_guid(&self) -> NodeGuid {
        self.root_guid
    }

    pub fn root_node_class(&self) -> Option<&str> {
        self.root_node_class.as_deref()
    }

    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<NodeRecord> {
        &mut self.records
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn node_template(&self, name: &str) -> Option<&dyn NodeInstance> {
        self.node_templates.get(name).map(|template| template.as_ref())
    }

    pub fn instance_template(&self, name: &str) -> Option<&InstanceTemplate> {
        self.instance_templates.get(name)
    }
}

impl fmt::Debug for MachineClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineClass")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("root_guid", &self.root_guid)
            .field("records", &self.records.len())
            .field("node_templates", &self.node_templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Catalog of machine classes and node classes.
///
/// Template lookups walk a class's parent chain nearest first, which is how
/// a child class can override a prototype defined by its parent.
#[derive(Debug)]
pub struct ClassRegistry {
    classes: HashMap<ClassId, MachineClass>,
    node_classes: HashMap<String, NodeClass>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Create a registry holding the built-in default node classes.
    pub fn new() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
            node_classes: HashMap::new(),
        };
        for kind in [
            NodeKind::State,
            NodeKind::Conduit,
            NodeKind::StateMachine,
            NodeKind::Transition,
        ] {
            registry.register_node_class(NodeClass::default_for(kind));
        }
        registry
    }

    /// Register a machine class, returning the class it replaced.
    pub fn register(&mut self, class: MachineClass) -> Option<MachineClass> {
        self.classes.insert(class.id.clone(), class)
    }

    pub fn register_node_class(&mut self, class: NodeClass) -> Option<NodeClass> {
        self.node_classes.insert(class.name().to_string(), class)
    }

    pub fn class(&self, id: &ClassId) -> Option<&MachineClass> {
        self.classes.get(id)
    }

    pub fn class_mut(&mut self, id: &ClassId) -> Option<&mut MachineClass> {
        self.classes.get_mut(id)
    }

    pub fn contains(&self, id: &ClassId) -> bool {
        self.classes.contains_key(id)
    }

    pub fn node_class(&self, name: &str) -> Option<&NodeClass> {
        self.node_classes.get(name)
    }

    /// The class followed by its ancestors, nearest first.
    ///
    /// Stops at the first unknown parent or at a parent cycle.
    pub fn lineage(&self, id: &ClassId) -> Vec<&MachineClass> {
        let mut lineage = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.classes.get(id);
        while let Some(class) = current {
            if !seen.insert(&class.id) {
                break;
            }
            lineage.push(class);
            current = class.parent.as_ref().and_then(|parent| self.classes.get(parent));
        }
        lineage
    }

    /// Root GUID and node records an instance of `id` is built from.
    ///
    /// A class without records of its own uses those of its nearest ancestor
    /// that has some.
    pub fn runtime_records(&self, id: &ClassId) -> Option<(NodeGuid, &[NodeRecord])> {
        let lineage = self.lineage(id);
        let own = lineage.first()?;
        Some(
            lineage
                .iter()
                .find(|class| !class.records.is_empty())
                .map(|class| (class.root_guid, class.records.as_slice()))
                .unwrap_or((own.root_guid, own.records.as_slice())),
        )
    }

    pub fn find_node_template(&self, id: &ClassId, name: &str) -> Option<&dyn NodeInstance> {
        self.lineage(id)
            .into_iter()
            .find_map(|class| class.node_template(name))
    }

    pub fn find_instance_template(&self, id: &ClassId, name: &str) -> Option<&InstanceTemplate> {
        self.lineage(id)
            .into_iter()
            .find_map(|class| class.instance_template(name))
    }

    /// Template lookup scoped to one class lineage.
    pub fn template_scope<'a>(&'a self, id: &'a ClassId) -> TemplateScope<'a> {
        TemplateScope { registry: self, class: id }
    }
}

/// Node template lookup for nodes of one class.
pub struct TemplateScope<'a> {
    registry: &'a ClassRegistry,
    class: &'a ClassId,
}

impl TemplateLookup for TemplateScope<'_> {
    fn find_node_template(&self, name: &str) -> Option<&dyn NodeInstance> {
        self.registry.find_node_template(self.class, name)
    }
}
