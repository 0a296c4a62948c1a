//! Texture features computed from a grey-level co-occurrence histogram.
//!
//! The input is a 2-D scalar container holding co-occurrence frequencies,
//! axis 0 indexing the first grey level and axis 1 the second. The output is a
//! 1-D container with one value per [`TextureFeature`].

use crate::core::container::DataContainer;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Register texture stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(TextureFeatures));
}

/// Features produced by [`TextureFeatures`], in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFeature {
    Energy,
    Entropy,
    Correlation,
    InverseDifferenceMoment,
    Inertia,
    ClusterShade,
    ClusterProminence,
    HaralickCorrelation,
}

impl TextureFeature {
    /// Every feature, in output order.
    pub const ALL: [TextureFeature; 8] = [
        TextureFeature::Energy,
        TextureFeature::Entropy,
        TextureFeature::Correlation,
        TextureFeature::InverseDifferenceMoment,
        TextureFeature::Inertia,
        TextureFeature::ClusterShade,
        TextureFeature::ClusterProminence,
        TextureFeature::HaralickCorrelation,
    ];

    /// Position in the output container.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TextureFeature::Energy => "energy",
            TextureFeature::Entropy => "entropy",
            TextureFeature::Correlation => "correlation",
            TextureFeature::InverseDifferenceMoment => "inverse_difference_moment",
            TextureFeature::Inertia => "inertia",
            TextureFeature::ClusterShade => "cluster_shade",
            TextureFeature::ClusterProminence => "cluster_prominence",
            TextureFeature::HaralickCorrelation => "haralick_correlation",
        }
    }
}

/// Feature values indexed by [`TextureFeature`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextureFeatureValues {
    values: [f64; 8],
}

impl TextureFeatureValues {
    pub fn get(&self, feature: TextureFeature) -> f64 {
        self.values[feature.index()]
    }

    pub fn as_array(&self) -> &[f64; 8] {
        &self.values
    }
}

/// Compute the features of a co-occurrence histogram with `bins` bins per axis.
///
/// Frequencies are normalized to sum to one first. Returns `None` when the
/// histogram is empty or its length does not match `bins`. Correlations over a
/// zero variance are reported as zero.
pub fn compute_texture_features(frequencies: &[f32], bins: [usize; 2]) -> Option<TextureFeatureValues> {
    let [rows, cols] = bins;
    if rows == 0 || cols == 0 || frequencies.len() != rows * cols {
        return None;
    }
    let total: f64 = frequencies.iter().map(|&f| f as f64).sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }

    let cells = || {
        frequencies.iter().enumerate().filter_map(move |(offset, &f)| {
            let g = f as f64 / total;
            (g > 0.0).then(|| ((offset % rows) as f64, (offset / rows) as f64, g))
        })
    };

    // Marginal sums over the second axis, indexed by the first.
    let mut marginal = vec![0.0f64; rows];
    let mut mean = 0.0;
    for (i, _, g) in cells() {
        marginal[i as usize] += g;
        mean += i * g;
    }
    let variance: f64 = cells().map(|(i, _, g)| (i - mean).powi(2) * g).sum();

    let marginal_mean = marginal.iter().sum::<f64>() / rows as f64;
    let marginal_variance = marginal
        .iter()
        .map(|m| (m - marginal_mean).powi(2))
        .sum::<f64>()
        / rows as f64;

    let mut values = [0.0f64; 8];
    let mut product_moment = 0.0;
    let mut covariance = 0.0;
    for (i, j, g) in cells() {
        let shade = (i - mean) + (j - mean);
        values[TextureFeature::Energy.index()] += g * g;
        values[TextureFeature::Entropy.index()] -= g * g.log2();
        covariance += (i - mean) * (j - mean) * g;
        values[TextureFeature::InverseDifferenceMoment.index()] += g / (1.0 + (i - j).powi(2));
        values[TextureFeature::Inertia.index()] += (i - j).powi(2) * g;
        values[TextureFeature::ClusterShade.index()] += shade.powi(3) * g;
        values[TextureFeature::ClusterProminence.index()] += shade.powi(4) * g;
        product_moment += i * j * g;
    }

    if variance > 0.0 {
        values[TextureFeature::Correlation.index()] = covariance / variance;
    }
    if marginal_variance > 0.0 {
        values[TextureFeature::HaralickCorrelation.index()] =
            (product_moment - marginal_mean * marginal_mean) / marginal_variance;
    }

    Some(TextureFeatureValues { values })
}

/// Aggregates a co-occurrence histogram into texture features.
///
/// Needs the whole histogram regardless of which features are requested, and
/// always computes every feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureFeatures;

impl TextureFeatures {
    fn output_region() -> Region {
        Region::from_size(&[TextureFeature::ALL.len()])
    }
}

impl ProcessingStage for TextureFeatures {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("texture_features", "Texture Features")
            .description("Computes Haralick texture features of a co-occurrence histogram")
            .category(Category::Statistics)
            .build()
    }

    fn generate_output_information(
        &self,
        node_id: NodeId,
        inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        let input = inputs.first().ok_or_else(|| ExecutionError::StageFailed {
            node_id,
            error: "texture features need a co-occurrence histogram".to_string(),
        })?;
        if input.dimension() != 2 {
            return Err(ExecutionError::StageFailed {
                node_id,
                error: format!(
                    "co-occurrence histogram must be 2-D, got {} axes",
                    input.dimension()
                ),
            });
        }
        for output in outputs.iter_mut() {
            output.set_largest_possible_region(Self::output_region());
            output.set_geometry(PhysicalGeometry::identity(1));
        }
        Ok(())
    }

    fn enlarge_output_requested_region(&self, outputs: &mut [DataContainer]) {
        for output in outputs.iter_mut() {
            output.set_requested_region_to_largest_possible();
        }
    }

    fn generate_input_requested_region(
        &self,
        _outputs: &[DataContainer],
        inputs: &[&DataContainer],
    ) -> Vec<Region> {
        inputs
            .iter()
            .map(|input| input.largest_possible_region().clone())
            .collect()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let histogram = input.buffered_region();
        if histogram != input.largest_possible_region() {
            return Err(ctx.failure("co-occurrence histogram is not fully buffered"));
        }
        let bins = [histogram.size()[0], histogram.size()[1]];
        let frequencies = input.scalars().unwrap_or_default();
        let features = compute_texture_features(frequencies, bins)
            .ok_or_else(|| ctx.failure("co-occurrence histogram is empty"))?;

        let out = ctx.scalar_output_mut(0)?;
        for (slot, value) in out.iter_mut().zip(features.as_array()) {
            *slot = *value as f32;
        }
        ctx.report_progress(1.0);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessingStage> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
