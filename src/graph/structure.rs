//! Pipeline structure and stage management.
//!
//! The [`Pipeline`] is an arena holding every stage node, its output
//! containers and the connections between them. Stages never hold references
//! to each other; consumers read producer outputs through the arena.
//!
//! Every structural or parameter change advances the pipeline clock and stamps
//! the affected stage, which is what the executor compares against to decide
//! what is stale.

use crate::core::container::DataContainer;
use crate::core::error::{ConnectionId, GraphError, GraphResult, NodeId};
use crate::core::stage::ProcessingStage;
use crate::graph::connection::{Connection, Endpoint};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A stage instance in the pipeline, with its outputs and timestamps.
pub struct StageNode {
    /// Unique identifier
    pub id: NodeId,
    /// The stage implementation
    pub stage: Box<dyn ProcessingStage>,
    /// Output containers, owned by this node
    pub(crate) outputs: Vec<DataContainer>,
    /// Optional display name override
    pub label: Option<String>,
    /// Clock value of the last parameter or connection change
    pub(crate) modified_time: u64,
    /// Clock value of the last information pass
    pub(crate) information_time: u64,
    /// Clock value of the last successful data generation
    pub(crate) data_time: u64,
    /// Newest modification time upstream of and including this node
    pub(crate) pipeline_time: u64,
    /// Number of times `generate_data` has run
    pub(crate) execution_count: usize,
}

impl std::fmt::Debug for StageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageNode")
            .field("id", &self.id)
            .field("stage", &self.stage.metadata().name)
            .field("label", &self.label)
            .field("outputs", &self.outputs.len())
            .field("modified_time", &self.modified_time)
            .field("data_time", &self.data_time)
            .field("execution_count", &self.execution_count)
            .finish()
    }
}

impl StageNode {
    fn new(stage: Box<dyn ProcessingStage>, time: u64) -> Self {
        let outputs = placeholders(stage.as_ref());
        Self {
            id: NodeId::new(),
            stage,
            outputs,
            label: None,
            modified_time: time,
            information_time: 0,
            data_time: 0,
            pipeline_time: time,
            execution_count: 0,
        }
    }

    /// Get the display name (label or stage name).
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.stage.metadata().name)
    }

    /// Output containers.
    pub fn outputs(&self) -> &[DataContainer] {
        &self.outputs
    }

    /// Number of times the stage generated data.
    pub fn execution_count(&self) -> usize {
        self.execution_count
    }

    /// Clock value of the last modification.
    pub fn modified_time(&self) -> u64 {
        self.modified_time
    }

    /// Release the data of every output.
    pub fn release_data(&mut self) {
        for output in &mut self.outputs {
            output.release_data();
        }
    }
}

fn placeholders(stage: &dyn ProcessingStage) -> Vec<DataContainer> {
    let pixel_type = stage.metadata().output_pixel_type;
    (0..stage.number_of_outputs())
        .map(|_| DataContainer::placeholder(pixel_type))
        .collect()
}

/// The stage graph.
///
/// Uses IndexMap to maintain insertion order for consistent iteration.
#[derive(Debug, Default)]
pub struct Pipeline {
    /// All stages, indexed by ID.
    nodes: IndexMap<NodeId, StageNode>,
    /// All connections.
    connections: Vec<Connection>,
    /// Monotonic modification clock.
    clock: u64,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock and return the new time.
    pub(crate) fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Current clock value.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    // ========================================================================
    // Stage Management
    // ========================================================================

    /// Add a stage and return its ID.
    pub fn add_stage(&mut self, stage: Box<dyn ProcessingStage>) -> NodeId {
        let time = self.tick();
        let node = StageNode::new(stage, time);
        let id = node.id;
        log::debug!("Added stage {} ({})", node.display_name(), id);
        self.nodes.insert(id, node);
        id
    }

    /// Add a stage with a display label.
    pub fn add_labeled_stage(
        &mut self,
        stage: Box<dyn ProcessingStage>,
        label: impl Into<String>,
    ) -> NodeId {
        let id = self.add_stage(stage);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.label = Some(label.into());
        }
        id
    }

    /// Remove a stage and every connection touching it.
    pub fn remove_stage(&mut self, id: NodeId) -> GraphResult<StageNode> {
        let consumers: Vec<NodeId> = self.connections_from(id).map(|c| c.to.node_id).collect();
        self.connections
            .retain(|conn| conn.from.node_id != id && conn.to.node_id != id);
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::StageNotFound(id))?;
        for consumer in consumers {
            self.mark_modified(consumer);
        }
        Ok(node)
    }

    /// Get a reference to a stage node.
    pub fn get_node(&self, id: NodeId) -> GraphResult<&StageNode> {
        self.nodes.get(&id).ok_or(GraphError::StageNotFound(id))
    }

    /// Get a mutable reference to a stage node.
    pub(crate) fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut StageNode> {
        self.nodes.get_mut(&id).ok_or(GraphError::StageNotFound(id))
    }

    /// Check if a stage exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get all stage nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &StageNode> {
        self.nodes.values()
    }

    /// Get all stage IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of stages.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Change a stage's parameters.
    ///
    /// Bumps the stage's modification time and releases its data and the data
    /// of everything downstream. Output placeholders are re-created when the
    /// number of outputs changes.
    pub fn modify_stage<F>(&mut self, id: NodeId, change: F) -> GraphResult<()>
    where
        F: FnOnce(&mut dyn ProcessingStage),
    {
        let node = self.get_node_mut(id)?;
        change(node.stage.as_mut());
        let count = node.stage.number_of_outputs();
        let resized = node.outputs.len() != count;
        if resized {
            node.outputs = placeholders(node.stage.as_ref());
        }
        self.mark_modified(id);

        if resized {
            let dropped: Vec<ConnectionId> = self
                .connections_from(id)
                .filter(|c| c.from.port >= count)
                .map(|c| c.id)
                .collect();
            for conn in dropped {
                log::warn!("Output removed from stage {}; dropping connection {}", id, conn);
                self.disconnect(conn)?;
            }
        }
        Ok(())
    }

    /// Change the parameters of a stage of concrete type `T`.
    pub fn modify_stage_as<T, F>(&mut self, id: NodeId, change: F) -> GraphResult<()>
    where
        T: ProcessingStage + 'static,
        F: FnOnce(&mut T),
    {
        {
            let node = self.get_node(id)?;
            if !node.stage.as_any().is::<T>() {
                return Err(GraphError::StageTypeMismatch {
                    node_id: id,
                    expected: std::any::type_name::<T>().to_string(),
                });
            }
        }
        self.modify_stage(id, |stage| {
            if let Some(stage) = stage.as_any_mut().downcast_mut::<T>() {
                change(stage);
            }
        })
    }

    /// Borrow a stage as concrete type `T`.
    pub fn stage_as<T: ProcessingStage + 'static>(&self, id: NodeId) -> GraphResult<&T> {
        self.get_node(id)?
            .stage
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| GraphError::StageTypeMismatch {
                node_id: id,
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Stamp a stage as modified and release its data and everything downstream.
    fn mark_modified(&mut self, id: NodeId) {
        let time = self.tick();
        let mut affected = vec![id];
        affected.extend(self.get_downstream(id));
        for node_id in affected {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                if node_id == id {
                    node.modified_time = time;
                }
                node.release_data();
            }
        }
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Connect output `from_port` of `from_node` to input `to_port` of `to_node`.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: usize,
        to_node: NodeId,
        to_port: usize,
    ) -> GraphResult<ConnectionId> {
        let producer = self.get_node(from_node)?;
        let consumer = self.get_node(to_node)?;

        let output_count = producer.stage.number_of_outputs();
        if from_port >= output_count {
            return Err(GraphError::OutputOutOfRange {
                node_id: from_node,
                index: from_port,
                count: output_count,
            });
        }

        let input_count = consumer.stage.metadata().inputs;
        if to_port >= input_count {
            return Err(GraphError::InputOutOfRange {
                node_id: to_node,
                index: to_port,
                count: input_count,
            });
        }

        if self.is_input_connected(to_node, to_port) {
            return Err(GraphError::InputAlreadyConnected {
                node_id: to_node,
                index: to_port,
            });
        }

        // If from_node is reachable from to_node, this edge closes a cycle
        if self.is_reachable(to_node, from_node) {
            return Err(GraphError::CycleDetected {
                nodes: vec![from_node, to_node],
            });
        }

        let connection = Connection::new(
            Endpoint::new(from_node, from_port),
            Endpoint::new(to_node, to_port),
        );
        let id = connection.id;
        self.connections.push(connection);
        self.mark_modified(to_node);
        Ok(id)
    }

    /// Remove a connection by ID.
    pub fn disconnect(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;

        let connection = self.connections.remove(pos);
        self.mark_modified(connection.to.node_id);
        Ok(connection)
    }

    /// Get all connections.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Get all connections from a stage.
    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from.node_id == node_id)
    }

    /// Get all connections to a stage.
    pub fn connections_to(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to.node_id == node_id)
    }

    /// Check if an input is already connected.
    pub fn is_input_connected(&self, node_id: NodeId, port: usize) -> bool {
        self.connections
            .iter()
            .any(|c| c.to.node_id == node_id && c.to.port == port)
    }

    /// Get the number of connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Producer endpoint of every declared input, in input order.
    pub fn input_links(&self, node_id: NodeId) -> GraphResult<Vec<Endpoint>> {
        let node = self.get_node(node_id)?;
        (0..node.stage.metadata().inputs)
            .map(|index| {
                self.connections_to(node_id)
                    .find(|c| c.to.port == index)
                    .map(|c| c.from)
                    .ok_or(GraphError::MissingInput { node_id, index })
            })
            .collect()
    }

    // ========================================================================
    // Output Access
    // ========================================================================

    /// Read one output container.
    pub fn output(&self, node_id: NodeId, index: usize) -> GraphResult<&DataContainer> {
        let node = self.get_node(node_id)?;
        node.outputs.get(index).ok_or(GraphError::OutputOutOfRange {
            node_id,
            index,
            count: node.outputs.len(),
        })
    }

    /// Read the outputs named by a list of endpoints.
    pub(crate) fn outputs_at(&self, links: &[Endpoint]) -> GraphResult<Vec<&DataContainer>> {
        links
            .iter()
            .map(|link| self.output(link.node_id, link.port))
            .collect()
    }

    /// Move a stage's outputs out of the arena for the duration of a stage call.
    pub(crate) fn take_outputs(&mut self, node_id: NodeId) -> GraphResult<Vec<DataContainer>> {
        Ok(std::mem::take(&mut self.get_node_mut(node_id)?.outputs))
    }

    /// Put outputs back after [`Pipeline::take_outputs`].
    pub(crate) fn restore_outputs(
        &mut self,
        node_id: NodeId,
        outputs: Vec<DataContainer>,
    ) -> GraphResult<()> {
        self.get_node_mut(node_id)?.outputs = outputs;
        Ok(())
    }

    /// Number of times a stage has generated data.
    pub fn execution_count(&self, node_id: NodeId) -> GraphResult<usize> {
        Ok(self.get_node(node_id)?.execution_count)
    }

    /// Release the data of one stage.
    pub fn release_data(&mut self, node_id: NodeId) -> GraphResult<()> {
        self.get_node_mut(node_id)?.release_data();
        Ok(())
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if `target` is reachable from `start` following connections.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }

            if visited.insert(current) {
                for conn in self.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
            }
        }

        false
    }

    /// Get all stages that depend on the given stage (downstream).
    pub fn get_downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.closure(node_id, |conn| (conn.from.node_id, conn.to.node_id))
    }

    /// Get all stages the given stage depends on (upstream).
    pub fn get_upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.closure(node_id, |conn| (conn.to.node_id, conn.from.node_id))
    }

    fn closure<F>(&self, node_id: NodeId, edge: F) -> Vec<NodeId>
    where
        F: Fn(&Connection) -> (NodeId, NodeId),
    {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node_id]);

        while let Some(current) = queue.pop_front() {
            for conn in &self.connections {
                let (from, to) = edge(conn);
                if from == current && visited.insert(to) {
                    result.push(to);
                    queue.push_back(to);
                }
            }
        }

        result
    }

    /// Get stages with no incoming connections.
    pub fn source_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&id| !self.connections.iter().any(|c| c.to.node_id == *id))
            .copied()
            .collect()
    }

    /// Get stages with no outgoing connections.
    pub fn sink_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&id| !self.connections.iter().any(|c| c.from.node_id == *id))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::PassthroughStage;

    fn stage() -> Box<dyn ProcessingStage> {
        Box::new(PassthroughStage)
    }

    #[test]
    fn test_add_remove_stage() {
        let mut pipeline = Pipeline::new();

        let id = pipeline.add_stage(stage());
        assert_eq!(pipeline.node_count(), 1);
        assert_eq!(pipeline.get_node(id).unwrap().outputs().len(), 1);

        pipeline.remove_stage(id).unwrap();
        assert!(pipeline.is_empty());
        assert!(matches!(
            pipeline.get_node(id),
            Err(GraphError::StageNotFound(_))
        ));
    }

    #[test]
    fn test_connect_checks_ports() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());

        assert!(matches!(
            pipeline.connect(a, 1, b, 0),
            Err(GraphError::OutputOutOfRange { index: 1, .. })
        ));
        assert!(matches!(
            pipeline.connect(a, 0, b, 3),
            Err(GraphError::InputOutOfRange { index: 3, .. })
        ));

        let conn = pipeline.connect(a, 0, b, 0).unwrap();
        assert!(matches!(
            pipeline.connect(a, 0, b, 0),
            Err(GraphError::InputAlreadyConnected { .. })
        ));

        pipeline.disconnect(conn).unwrap();
        assert_eq!(pipeline.connection_count(), 0);
    }

    #[test]
    fn test_cycle_detection() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());
        let c = pipeline.add_stage(stage());

        pipeline.connect(a, 0, b, 0).unwrap();
        pipeline.connect(b, 0, c, 0).unwrap();

        let result = pipeline.connect(c, 0, a, 0);
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
        assert!(matches!(
            pipeline.connect(a, 0, a, 0),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_input_links_report_missing_inputs() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());

        assert!(matches!(
            pipeline.input_links(b),
            Err(GraphError::MissingInput { index: 0, .. })
        ));

        pipeline.connect(a, 0, b, 0).unwrap();
        assert_eq!(pipeline.input_links(b).unwrap(), vec![Endpoint::new(a, 0)]);
    }

    #[test]
    fn test_upstream_downstream() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let b = pipeline.add_stage(stage());
        let c = pipeline.add_stage(stage());

        pipeline.connect(a, 0, b, 0).unwrap();
        pipeline.connect(b, 0, c, 0).unwrap();

        let downstream = pipeline.get_downstream(a);
        assert_eq!(downstream, vec![b, c]);

        let upstream = pipeline.get_upstream(c);
        assert_eq!(upstream, vec![b, a]);

        assert_eq!(pipeline.source_nodes(), vec![a]);
        assert_eq!(pipeline.sink_nodes(), vec![c]);
    }

    #[test]
    fn test_modify_bumps_time() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage());
        let before = pipeline.get_node(a).unwrap().modified_time();

        pipeline.modify_stage(a, |_| {}).unwrap();
        assert!(pipeline.get_node(a).unwrap().modified_time() > before);

        let wrong = pipeline.modify_stage_as::<crate::filters::builtin::ShiftScale, _>(a, |_| {});
        assert!(matches!(wrong, Err(GraphError::StageTypeMismatch { .. })));
    }
}
