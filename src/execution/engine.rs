//! Demand-driven pipeline executor.
//!
//! A client asks for a region of one stage output. The executor then:
//!
//! 1. refreshes output information upstream-first, for stages whose
//!    information is older than their pipeline modification time;
//! 2. checks the request against the output's largest possible region;
//! 3. propagates requested regions upstream in reverse topological order,
//!    merging the requests of several consumers by bounding union;
//! 4. recursively updates data, running only stages whose content is stale or
//!    whose buffered regions do not cover their requested regions.

use crate::core::container::DataContainer;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::core::region::Region;
use crate::execution::progress::{ObserverId, ObserverList, ProgressEvent};
use crate::graph::connection::Endpoint;
use crate::graph::structure::Pipeline;
use crate::graph::topology::TopologyAnalyzer;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Maximum number of worker threads for per-pixel work (0 = rayon default).
    pub max_threads: usize,
    /// Whether to check region invariants after every stage.
    pub verify_invariants: bool,
    /// Whether stage progress fractions are forwarded to observers.
    pub report_progress: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_threads: 0,
            verify_invariants: true,
            report_progress: true,
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Enable/disable invariant checks after each stage.
    pub fn with_invariant_checks(mut self, verify: bool) -> Self {
        self.verify_invariants = verify;
        self
    }

    /// Enable/disable forwarding of stage progress fractions.
    pub fn with_progress_reports(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }
}

/// Statistics for one client request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    /// Total time spent in the request.
    pub total_duration: Duration,
    /// Number of stages that generated data.
    pub stages_executed: usize,
    /// Number of visited stages whose caches already satisfied the request.
    pub stages_skipped: usize,
    /// Stages that generated data, in execution order.
    pub executed: Vec<NodeId>,
}

/// Runs the update protocol over a [`Pipeline`].
pub struct PipelineExecutor {
    options: ExecutionOptions,
    observers: ObserverList,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("options", &self.options)
            .field("observers", &self.observers)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor {
    /// Create an executor with default options.
    pub fn new() -> Self {
        Self::with_options(ExecutionOptions::default())
    }

    /// Create an executor with the given options.
    ///
    /// A non-zero `max_threads` gives the executor its own rayon pool.
    pub fn with_options(options: ExecutionOptions) -> Self {
        let pool = if options.max_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_threads)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    log::warn!("Cannot build a {}-thread pool: {}", options.max_threads, e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            options,
            observers: ObserverList::new(),
            pool,
        }
    }

    /// Current options.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Subscribe a progress observer.
    pub fn add_observer<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.observers.add(callback)
    }

    /// Unsubscribe a progress observer.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    // ========================================================================
    // Client entry points
    // ========================================================================

    /// Bring `region` of output `output_index` of `node_id` up to date.
    ///
    /// On success the output's buffered region contains `region`.
    pub fn request_output(
        &self,
        pipeline: &mut Pipeline,
        node_id: NodeId,
        output_index: usize,
        region: &Region,
    ) -> ExecutionResult<ExecutionStats> {
        let start = Instant::now();
        self.observers.notify(&ProgressEvent::RequestStarted {
            node_id,
            output: output_index,
            region: region.clone(),
        });

        match self.run_request(pipeline, node_id, output_index, region) {
            Ok(mut stats) => {
                stats.total_duration = start.elapsed();
                log::debug!(
                    "Request {} on stage {} done: {} executed, {} skipped in {:?}",
                    region,
                    node_id,
                    stats.stages_executed,
                    stats.stages_skipped,
                    stats.total_duration
                );
                self.observers.notify(&ProgressEvent::RequestCompleted {
                    node_id,
                    stages_executed: stats.stages_executed,
                    duration_ms: stats.total_duration.as_millis() as u64,
                });
                Ok(stats)
            }
            Err(e) => {
                self.observers.notify(&ProgressEvent::RequestFailed {
                    node_id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run_request(
        &self,
        pipeline: &mut Pipeline,
        node_id: NodeId,
        output_index: usize,
        region: &Region,
    ) -> ExecutionResult<ExecutionStats> {
        let order = TopologyAnalyzer::new(pipeline).upstream_order(node_id)?;
        self.update_output_information(pipeline, &order)?;

        let mut stats = ExecutionStats::default();
        if region.is_empty() {
            log::debug!("Empty request on stage {}; nothing to do", node_id);
            return Ok(stats);
        }

        let largest = pipeline
            .output(node_id, output_index)?
            .largest_possible_region()
            .clone();
        if !largest.intersects(region) {
            return Err(ExecutionError::InsufficientInput {
                node_id,
                input: output_index,
                requested: region.clone(),
                largest,
            });
        }
        if !largest.contains(region) {
            return Err(ExecutionError::RequestedRegionOutOfBounds {
                node_id,
                output: output_index,
                requested: region.clone(),
                largest,
            });
        }

        self.propagate_requests(pipeline, &order, node_id, output_index, region)?;

        let mut visited = HashSet::new();
        self.update_output_data(pipeline, node_id, &mut visited, &mut stats)?;
        Ok(stats)
    }

    /// Bring the whole largest possible region of an output up to date.
    pub fn update_largest_possible_region(
        &self,
        pipeline: &mut Pipeline,
        node_id: NodeId,
        output_index: usize,
    ) -> ExecutionResult<ExecutionStats> {
        self.update_information(pipeline, node_id)?;
        let largest = pipeline
            .output(node_id, output_index)?
            .largest_possible_region()
            .clone();
        self.request_output(pipeline, node_id, output_index, &largest)
    }

    /// Run only the information pass for a stage and its upstream closure.
    pub fn update_information(&self, pipeline: &mut Pipeline, node_id: NodeId) -> ExecutionResult<()> {
        let order = TopologyAnalyzer::new(pipeline).upstream_order(node_id)?;
        self.update_output_information(pipeline, &order)
    }

    // ========================================================================
    // Information pass
    // ========================================================================

    fn update_output_information(&self, pipeline: &mut Pipeline, order: &[NodeId]) -> ExecutionResult<()> {
        for &id in order {
            let links = pipeline.input_links(id)?;
            let upstream_time = links
                .iter()
                .map(|link| pipeline.get_node(link.node_id).map(|n| n.pipeline_time))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .max()
                .unwrap_or(0);

            let node = pipeline.get_node_mut(id)?;
            let pipeline_time = node.modified_time.max(upstream_time);
            node.pipeline_time = pipeline_time;
            if node.information_time >= pipeline_time {
                continue;
            }

            log::debug!("Regenerating output information of stage {}", id);
            let mut outputs = pipeline.take_outputs(id)?;
            let result = generate_information(pipeline, id, &links, &mut outputs);
            for output in &mut outputs {
                if !output
                    .largest_possible_region()
                    .contains(output.buffered_region())
                {
                    output.release_data();
                }
            }
            pipeline.restore_outputs(id, outputs)?;
            result?;

            let time = pipeline.tick();
            pipeline.get_node_mut(id)?.information_time = time;
        }
        Ok(())
    }

    // ========================================================================
    // Request propagation
    // ========================================================================

    fn propagate_requests(
        &self,
        pipeline: &mut Pipeline,
        order: &[NodeId],
        node_id: NodeId,
        output_index: usize,
        region: &Region,
    ) -> ExecutionResult<()> {
        let mut pending: HashMap<Endpoint, Region> = HashMap::new();
        pending.insert(Endpoint::new(node_id, output_index), region.clone());

        for &id in order.iter().rev() {
            let links = pipeline.input_links(id)?;
            let mut outputs = pipeline.take_outputs(id)?;
            let result = propagate_stage(pipeline, id, &links, &mut outputs, &mut pending);
            pipeline.restore_outputs(id, outputs)?;
            result?;
        }
        Ok(())
    }

    // ========================================================================
    // Data pass
    // ========================================================================

    fn update_output_data(
        &self,
        pipeline: &mut Pipeline,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        stats: &mut ExecutionStats,
    ) -> ExecutionResult<()> {
        if !visited.insert(node_id) {
            return Ok(());
        }

        let node = pipeline.get_node(node_id)?;
        let requested = node
            .outputs
            .iter()
            .any(|o| !o.requested_region().is_empty());
        let stale = node.data_time < node.pipeline_time;
        let unsatisfied = node.outputs.iter().any(|o| !o.is_request_satisfied());
        if !requested || !(stale || unsatisfied) {
            log::debug!("Stage {} is up to date", node.display_name());
            stats.stages_skipped += 1;
            return Ok(());
        }

        let links = pipeline.input_links(node_id)?;
        for link in &links {
            self.update_output_data(pipeline, link.node_id, visited, stats)?;
        }
        self.execute_stage(pipeline, node_id, &links, stats)
    }

    fn execute_stage(
        &self,
        pipeline: &mut Pipeline,
        node_id: NodeId,
        links: &[Endpoint],
        stats: &mut ExecutionStats,
    ) -> ExecutionResult<()> {
        let name = pipeline.get_node(node_id)?.display_name();
        log::debug!("Executing stage {} ({})", name, node_id);
        self.observers.notify(&ProgressEvent::StageStarted {
            node_id,
            name: name.clone(),
        });
        let started = Instant::now();

        let mut outputs = pipeline.take_outputs(node_id)?;
        for output in &mut outputs {
            output.allocate();
        }
        let result = self
            .run_stage(pipeline, node_id, links, &mut outputs)
            .and_then(|()| self.verify_outputs(node_id, &outputs));

        if let Err(error) = result {
            for output in &mut outputs {
                output.release_data();
            }
            pipeline.restore_outputs(node_id, outputs)?;
            log::warn!("Stage {} failed: {}", name, error);
            self.observers.notify(&ProgressEvent::StageFailed {
                node_id,
                message: error.to_string(),
            });
            return Err(error);
        }

        pipeline.restore_outputs(node_id, outputs)?;
        let time = pipeline.tick();
        let node = pipeline.get_node_mut(node_id)?;
        node.data_time = time;
        node.execution_count += 1;

        stats.stages_executed += 1;
        stats.executed.push(node_id);
        self.observers.notify(&ProgressEvent::StageCompleted {
            node_id,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    fn run_stage(
        &self,
        pipeline: &Pipeline,
        node_id: NodeId,
        links: &[Endpoint],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        let node = pipeline.get_node(node_id)?;
        let inputs = pipeline.outputs_at(links)?;
        for (index, input) in inputs.iter().enumerate() {
            if !input.is_request_satisfied() {
                return Err(ExecutionError::StaleCacheInconsistency {
                    node_id,
                    detail: format!(
                        "input {} buffers {} but {} is requested",
                        index,
                        input.buffered_region(),
                        input.requested_region()
                    ),
                });
            }
        }

        let progress = |fraction: f32| {
            if self.options.report_progress {
                self.observers
                    .notify(&ProgressEvent::StageProgress { node_id, fraction });
            }
        };
        let mut ctx = ExecutionContext::new(node_id, inputs, outputs, &progress);
        match &self.pool {
            Some(pool) => pool.install(|| node.stage.generate_data(&mut ctx)),
            None => node.stage.generate_data(&mut ctx),
        }
    }

    fn verify_outputs(&self, node_id: NodeId, outputs: &[DataContainer]) -> ExecutionResult<()> {
        if !self.options.verify_invariants {
            return Ok(());
        }
        for (index, output) in outputs.iter().enumerate() {
            output
                .check_invariants()
                .map_err(|detail| ExecutionError::StaleCacheInconsistency {
                    node_id,
                    detail: format!("output {}: {}", index, detail),
                })?;
            if !output.verify_requested_region() {
                return Err(ExecutionError::StaleCacheInconsistency {
                    node_id,
                    detail: format!(
                        "output {}: requested region {} exceeds {}",
                        index,
                        output.requested_region(),
                        output.largest_possible_region()
                    ),
                });
            }
        }
        Ok(())
    }
}

fn generate_information(
    pipeline: &Pipeline,
    node_id: NodeId,
    links: &[Endpoint],
    outputs: &mut [DataContainer],
) -> ExecutionResult<()> {
    let node = pipeline.get_node(node_id)?;
    node.stage.validate(node_id)?;
    let inputs = pipeline.outputs_at(links)?;
    node.stage
        .generate_output_information(node_id, &inputs, outputs)
}

/// Settle the requests of one stage's outputs and derive its input requests.
fn propagate_stage(
    pipeline: &Pipeline,
    node_id: NodeId,
    links: &[Endpoint],
    outputs: &mut [DataContainer],
    pending: &mut HashMap<Endpoint, Region>,
) -> ExecutionResult<()> {
    let node = pipeline.get_node(node_id)?;

    let mut explicit: Vec<Option<Region>> = Vec::with_capacity(outputs.len());
    for (index, output) in outputs.iter_mut().enumerate() {
        let request = pending
            .remove(&Endpoint::new(node_id, index))
            .and_then(|r| r.crop_to(output.largest_possible_region()));
        output.set_requested_region(
            request
                .clone()
                .unwrap_or_else(|| Region::empty(output.dimension())),
        );
        explicit.push(request);
    }

    let Some(reference) = explicit.iter().position(Option::is_some) else {
        log::debug!("Nothing requested from stage {}", node_id);
        return Ok(());
    };

    node.stage.generate_output_requested_region(reference, outputs);
    for (output, request) in outputs.iter_mut().zip(&explicit) {
        if let Some(request) = request {
            let merged = output.requested_region().bounding_union(request);
            output.set_requested_region(merged);
        }
    }
    node.stage.enlarge_output_requested_region(outputs);
    for output in outputs.iter_mut() {
        let cropped = output
            .requested_region()
            .crop_to(output.largest_possible_region())
            .unwrap_or_else(|| Region::empty(output.dimension()));
        output.set_requested_region(cropped);
    }

    let inputs = pipeline.outputs_at(links)?;
    let wanted = node.stage.generate_input_requested_region(outputs, &inputs);
    for (index, (link, input)) in links.iter().zip(&inputs).enumerate() {
        let Some(region) = wanted.get(index).filter(|r| !r.is_empty()) else {
            continue;
        };
        let largest = input.largest_possible_region();
        match region.crop_to(largest) {
            Some(cropped) => {
                log::debug!(
                    "Stage {} needs {} from input {}",
                    node_id,
                    cropped,
                    index
                );
                pending
                    .entry(*link)
                    .and_modify(|r| *r = r.bounding_union(&cropped))
                    .or_insert(cropped);
            }
            None => {
                return Err(ExecutionError::InsufficientInput {
                    node_id,
                    input: index,
                    requested: region.clone(),
                    largest: largest.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::{ShiftScale, SyntheticSource};
    use std::sync::Arc;

    fn chain() -> (Pipeline, NodeId, NodeId) {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[8, 8])));
        let shift = pipeline.add_stage(Box::new(ShiftScale::new(1.0, 2.0)));
        pipeline.connect(source, 0, shift, 0).unwrap();
        (pipeline, source, shift)
    }

    #[test]
    fn test_execution_options_builder() {
        let options = ExecutionOptions::new()
            .with_max_threads(4)
            .with_invariant_checks(false)
            .with_progress_reports(false);

        assert_eq!(options.max_threads, 4);
        assert!(!options.verify_invariants);
        assert!(!options.report_progress);
    }

    #[test]
    fn test_request_computes_only_requested_region() {
        let (mut pipeline, source, shift) = chain();
        let executor = PipelineExecutor::new();
        let region = Region::new(vec![2, 3], vec![2, 2]).unwrap();

        let stats = executor
            .request_output(&mut pipeline, shift, 0, &region)
            .unwrap();
        assert_eq!(stats.executed, vec![source, shift]);

        let out = pipeline.output(shift, 0).unwrap();
        assert_eq!(out.buffered_region(), &region);
        // ramp value at (2, 3) is 2 + 3 * 8 = 26
        assert_eq!(out.scalar(&[2, 3]), Some((26.0 + 1.0) * 2.0));
        assert_eq!(pipeline.output(source, 0).unwrap().buffered_region(), &region);
    }

    #[test]
    fn test_second_request_is_idle() {
        let (mut pipeline, _, shift) = chain();
        let executor = PipelineExecutor::new();
        let region = Region::new(vec![0, 0], vec![4, 4]).unwrap();

        executor.request_output(&mut pipeline, shift, 0, &region).unwrap();
        let stats = executor.request_output(&mut pipeline, shift, 0, &region).unwrap();
        assert_eq!(stats.stages_executed, 0);
        assert_eq!(stats.stages_skipped, 1);
    }

    #[test]
    fn test_out_of_bounds_requests() {
        let (mut pipeline, _, shift) = chain();
        let executor = PipelineExecutor::new();

        let outside = Region::new(vec![20, 20], vec![2, 2]).unwrap();
        assert!(matches!(
            executor.request_output(&mut pipeline, shift, 0, &outside),
            Err(ExecutionError::InsufficientInput { .. })
        ));

        let partial = Region::new(vec![6, 6], vec![4, 4]).unwrap();
        assert!(matches!(
            executor.request_output(&mut pipeline, shift, 0, &partial),
            Err(ExecutionError::RequestedRegionOutOfBounds { .. })
        ));
        assert!(!pipeline.output(shift, 0).unwrap().has_data());
    }

    #[test]
    fn test_observers_see_stage_events() {
        let (mut pipeline, _, shift) = chain();
        let executor = PipelineExecutor::new();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        executor.add_observer(move |event| sink.lock().push(event.clone()));

        executor
            .update_largest_possible_region(&mut pipeline, shift, 0)
            .unwrap();

        let events = events.lock();
        assert!(matches!(events.first(), Some(ProgressEvent::RequestStarted { .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::RequestCompleted { stages_executed: 2, .. })));
        let completed = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::StageCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
    }

    #[test]
    fn test_rejected_request_ends_with_failure_event() {
        let (mut pipeline, _, shift) = chain();
        let executor = PipelineExecutor::new();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        executor.add_observer(move |event| sink.lock().push(event.clone()));

        let partial = Region::new(vec![6, 6], vec![4, 4]).unwrap();
        assert!(executor.request_output(&mut pipeline, shift, 0, &partial).is_err());
        {
            let events = events.lock();
            assert_eq!(events.len(), 2);
            assert!(matches!(events[0], ProgressEvent::RequestStarted { .. }));
            assert!(matches!(&events[1], ProgressEvent::RequestFailed { node_id, .. } if *node_id == shift));
        }

        events.lock().clear();
        executor
            .request_output(&mut pipeline, shift, 0, &Region::empty(2))
            .unwrap();
        assert!(matches!(
            events.lock().last(),
            Some(ProgressEvent::RequestCompleted { stages_executed: 0, .. })
        ));
    }

    #[test]
    fn test_dedicated_pool() {
        let (mut pipeline, _, shift) = chain();
        let executor = PipelineExecutor::with_options(ExecutionOptions::new().with_max_threads(2));
        executor
            .update_largest_possible_region(&mut pipeline, shift, 0)
            .unwrap();
        assert_eq!(pipeline.execution_count(shift).unwrap(), 1);
    }
}
