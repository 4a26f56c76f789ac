//! Evaluation Engine
//!
//! Owns the live node instances of one compiled graph and evaluates them in
//! dependency order. A pass starts from a set of dirty nodes; a node whose
//! outputs changed marks its downstream nodes dirty, and the pass walks ranks
//! in ascending order so every node sees its upstream values of this pass.
//! Values on feedback edges are re-queued as a separate request and
//! delivered on a later iteration of the loop.
//!
//! The engine is driven from a single task (see [`driver`](super::driver)),
//! so no two evaluations of a node ever overlap.

use crate::{
    buffer::BufferStore,
    graph::{CompiledGraph, Graph},
    node::{
        EvalContext, InstanceId, Inputs, Node, NodeCatalog, RestoreContext, SocketValues,
        UpcomingEvent,
    },
    runtime::{
        actuation::{ActuationGate, ActuationOutcome},
        driver::EngineRequest,
        executor::NodeExecutor,
        scheduler::{TimerService, TimerTag},
    },
};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedSender, time::Instant};

/// One live node instance and what it has produced so far
struct Slot {
    instance: InstanceId,
    node: Box<dyn Node>,
    outputs: SocketValues,
    /// Timers fired since the last evaluation
    fired: Vec<TimerTag>,
    /// Actuations completed since the last evaluation
    outcomes: Vec<ActuationOutcome>,
    /// Restore failed; the node is never evaluated
    disabled: bool,
}

/// Collaborators handed to nodes during evaluation
pub struct EngineServices {
    pub buffer: Arc<BufferStore>,
    pub gate: ActuationGate,
    pub timers: TimerService,
    pub requests: UnboundedSender<EngineRequest>,
}

pub struct EvaluationEngine {
    catalog: Arc<NodeCatalog>,
    graph: Arc<CompiledGraph>,
    slots: HashMap<String, Slot>,
    instances: HashMap<InstanceId, String>,
    next_instance: u64,
    buffer: Arc<BufferStore>,
    gate: ActuationGate,
    timers: TimerService,
    requests: UnboundedSender<EngineRequest>,
    executor: NodeExecutor,
    settling_window: Duration,
    debounce: Duration,
}

impl EvaluationEngine {
    pub fn new(
        catalog: Arc<NodeCatalog>,
        services: EngineServices,
        settling_window: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            catalog,
            graph: Arc::new(CompiledGraph::empty("")),
            slots: HashMap::new(),
            instances: HashMap::new(),
            next_instance: 1,
            buffer: services.buffer,
            gate: services.gate,
            timers: services.timers,
            requests: services.requests,
            executor: NodeExecutor::new(),
            settling_window,
            debounce,
        }
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    /// Replace every node instance with fresh ones built from `graph`
    ///
    /// Old instances are destroyed first, which cancels their timers.
    pub fn load(&mut self, graph: Arc<CompiledGraph>) {
        self.unload();

        let now = Instant::now();
        for definition in &graph.graph.nodes {
            let Some(mut node) = self.catalog.build(&definition.node_type) else {
                tracing::error!(
                    "❌ Node '{}' has unknown type '{}', skipping",
                    definition.id,
                    definition.node_type
                );
                continue;
            };

            let ctx = RestoreContext {
                node_id: &definition.id,
                now,
                settling_window: self.settling_window,
                debounce: self.debounce,
            };
            let disabled = match node.restore(&definition.properties, &ctx) {
                Ok(()) => false,
                Err(e) => {
                    tracing::error!("❌ Failed to restore node '{}': {}", definition.id, e);
                    true
                }
            };

            let instance = InstanceId(self.next_instance);
            self.next_instance += 1;
            self.instances.insert(instance, definition.id.clone());
            self.slots.insert(
                definition.id.clone(),
                Slot {
                    instance,
                    node,
                    outputs: SocketValues::new(),
                    fired: Vec::new(),
                    outcomes: Vec::new(),
                    disabled,
                },
            );
        }

        tracing::info!(
            "📊 Loaded graph '{}' v{} into engine ({} nodes, {} edges)",
            graph.graph.id,
            graph.graph.version,
            graph.graph.nodes.len(),
            graph.graph.edges.len()
        );
        self.graph = graph;
    }

    /// Destroy every node instance
    pub fn unload(&mut self) {
        for (node_id, mut slot) in self.slots.drain() {
            tracing::debug!("🗑️ Destroying node '{}' ({:?})", node_id, slot.instance);
            slot.node.on_destroy();
        }
        self.instances.clear();
    }

    /// Evaluate every node once, in order
    pub fn evaluate_all(&mut self) {
        let dirty: BTreeSet<usize> = (0..self.graph.order.len()).collect();
        self.run(dirty);
    }

    /// Evaluate `seeds` and whatever their changes reach
    pub fn evaluate_from<I, S>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dirty: BTreeSet<usize> = seeds
            .into_iter()
            .filter_map(|id| self.graph.rank(id.as_ref()))
            .collect();
        self.run(dirty);
    }

    /// Process one request from the loop
    pub fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Load(graph) => {
                self.load(graph);
                self.evaluate_all();
            }
            EngineRequest::EvaluateAll => self.evaluate_all(),
            EngineRequest::Reevaluate { node_id } => self.evaluate_from([node_id]),
            EngineRequest::TimerFired { instance, tag } => self.on_timer(instance, tag),
            EngineRequest::ActuationCompleted { instance, outcome } => {
                self.on_actuation(instance, outcome)
            }
            EngineRequest::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            EngineRequest::UpcomingEvents(reply) => {
                let _ = reply.send(self.upcoming_events());
            }
            EngineRequest::Outputs { node_id, reply } => {
                let _ = reply.send(self.outputs(&node_id));
            }
            EngineRequest::Shutdown => self.unload(),
        }
    }

    pub fn on_timer(&mut self, instance: InstanceId, tag: TimerTag) {
        let Some(node_id) = self.instances.get(&instance).cloned() else {
            tracing::debug!("💤 Timer '{}' fired for destroyed instance {:?}", tag, instance);
            return;
        };
        if let Some(slot) = self.slots.get_mut(&node_id) {
            if !slot.fired.contains(&tag) {
                slot.fired.push(tag);
            }
        }
        self.evaluate_from([node_id]);
    }

    pub fn on_actuation(&mut self, instance: InstanceId, outcome: ActuationOutcome) {
        let Some(node_id) = self.instances.get(&instance).cloned() else {
            tracing::debug!(
                "💤 Actuation result for '{}' arrived after instance {:?} was destroyed",
                outcome.device_id,
                instance
            );
            return;
        };
        if let Some(slot) = self.slots.get_mut(&node_id) {
            slot.outcomes.push(outcome);
        }
        self.evaluate_from([node_id]);
    }

    /// The loaded graph with each node's current serialized properties
    pub fn snapshot(&self) -> Graph {
        let mut graph = self.graph.graph.clone();
        for node in &mut graph.nodes {
            if let Some(slot) = self.slots.get(&node.id) {
                if !slot.disabled {
                    node.properties = slot.node.serialize();
                }
            }
        }
        graph
    }

    /// Pending timed actions of every node, soonest first
    pub fn upcoming_events(&self) -> Vec<UpcomingEvent> {
        let now = Instant::now();
        let wall = chrono::Utc::now();
        let mut events: Vec<UpcomingEvent> = self
            .slots
            .iter()
            .flat_map(|(node_id, slot)| {
                slot.node.upcoming().into_iter().map(move |(at, label)| {
                    let ahead = chrono::Duration::from_std(at.saturating_duration_since(now))
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    UpcomingEvent {
                        node_id: node_id.clone(),
                        time: wall + ahead,
                        label,
                    }
                })
            })
            .collect();
        events.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.node_id.cmp(&b.node_id)));
        events
    }

    pub fn outputs(&self, node_id: &str) -> Option<SocketValues> {
        self.slots.get(node_id).map(|slot| slot.outputs.clone())
    }

    pub fn instance_of(&self, node_id: &str) -> Option<InstanceId> {
        self.slots.get(node_id).map(|slot| slot.instance)
    }

    fn run(&mut self, mut dirty: BTreeSet<usize>) {
        let graph = Arc::clone(&self.graph);
        let now = Instant::now();

        while let Some(rank) = dirty.pop_first() {
            let Some(node_id) = graph.order.get(rank) else {
                continue;
            };
            let changed = self.evaluate_node(&graph, node_id, now);
            if changed.is_empty() {
                continue;
            }

            for edge in graph.outgoing(node_id) {
                if !changed.contains(&edge.from_socket) {
                    continue;
                }
                match graph.rank(&edge.to) {
                    Some(next) if next > rank && !graph.is_feedback(edge) => {
                        dirty.insert(next);
                    }
                    Some(_) => {
                        // Delivered on a later loop iteration
                        let _ = self.requests.send(EngineRequest::Reevaluate {
                            node_id: edge.to.clone(),
                        });
                    }
                    None => {}
                }
            }
        }
    }

    /// Evaluate one node; returns the output sockets whose value changed
    fn evaluate_node(&mut self, graph: &CompiledGraph, node_id: &str, now: Instant) -> Vec<String> {
        let inputs = self.gather_inputs(graph, node_id);

        let Some(slot) = self.slots.get_mut(node_id) else {
            return Vec::new();
        };
        if slot.disabled {
            return Vec::new();
        }

        let fired = std::mem::take(&mut slot.fired);
        let outcomes = std::mem::take(&mut slot.outcomes);
        let mut ctx = EvalContext::new(
            node_id,
            now,
            slot.instance,
            &self.buffer,
            &self.gate,
            &self.timers,
            &fired,
            &outcomes,
        );

        match self.executor.evaluate(slot.node.as_mut(), &inputs, &mut ctx) {
            Ok(outputs) => {
                let mut changed: Vec<String> = outputs
                    .iter()
                    .filter(|(key, value)| slot.outputs.get(*key) != Some(*value))
                    .map(|(key, _)| key.clone())
                    .collect();
                changed.extend(
                    slot.outputs
                        .keys()
                        .filter(|key| !outputs.contains_key(*key))
                        .cloned(),
                );
                slot.outputs = outputs;
                changed
            }
            Err(fault) => {
                tracing::error!("❌ {}; holding previous outputs", fault);
                Vec::new()
            }
        }
    }

    fn gather_inputs(&self, graph: &CompiledGraph, node_id: &str) -> Inputs {
        let mut values = SocketValues::new();
        for edge in graph.incoming(node_id) {
            if let Some(value) = self
                .slots
                .get(&edge.from)
                .and_then(|slot| slot.outputs.get(&edge.from_socket))
            {
                values.insert(edge.to_socket.clone(), value.clone());
            }
        }
        Inputs::new(values)
    }
}

impl Drop for EvaluationEngine {
    fn drop(&mut self) {
        self.unload();
    }
}
