//! Colormap stage and per-pixel colormap functors.
//!
//! A functor maps a scalar rescaled to `[0, 1]` onto RGB components in
//! `[0, 1]`; [`ColormapFunctor::map`] handles the input rescaling and the
//! conversion to 8-bit channels.

use crate::core::container::PixelType;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId, ValidationError};
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use rayon::prelude::*;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Register colormap stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(Colormap::default()));
}

/// Stateless mapping from a scalar to a color.
pub trait ColormapFunctor: Send + Sync + fmt::Debug {
    /// Short identifier, e.g. `"hot"`.
    fn name(&self) -> &'static str;

    /// RGB components in `[0, 1]` for a value in `[0, 1]`.
    fn components(&self, value: f64) -> [f64; 3];

    /// Map `value` from `[minimum, maximum]` to an 8-bit color.
    ///
    /// Values outside the range saturate. A degenerate range maps every value
    /// to the start of the colormap.
    fn map(&self, value: f32, minimum: f32, maximum: f32) -> [u8; 3] {
        let rgb = self.components(rescale(value, minimum, maximum));
        rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8)
    }
}

fn rescale(value: f32, minimum: f32, maximum: f32) -> f64 {
    let range = maximum as f64 - minimum as f64;
    if range.is_nan() || range <= 0.0 {
        return 0.0;
    }
    ((value as f64 - minimum as f64) / range).clamp(0.0, 1.0)
}

/// Intensity in the red channel only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Red;

impl ColormapFunctor for Red {
    fn name(&self) -> &'static str {
        "red"
    }

    fn components(&self, value: f64) -> [f64; 3] {
        [value, 0.0, 0.0]
    }
}

/// Intensity in the green channel only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Green;

impl ColormapFunctor for Green {
    fn name(&self) -> &'static str {
        "green"
    }

    fn components(&self, value: f64) -> [f64; 3] {
        [0.0, value, 0.0]
    }
}

/// Intensity in the blue channel only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blue;

impl ColormapFunctor for Blue {
    fn name(&self) -> &'static str {
        "blue"
    }

    fn components(&self, value: f64) -> [f64; 3] {
        [0.0, 0.0, value]
    }
}

/// Equal intensity in all channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grey;

impl ColormapFunctor for Grey {
    fn name(&self) -> &'static str {
        "grey"
    }

    fn components(&self, value: f64) -> [f64; 3] {
        [value; 3]
    }
}

/// Black through red and yellow to white.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hot;

impl ColormapFunctor for Hot {
    fn name(&self) -> &'static str {
        "hot"
    }

    fn components(&self, value: f64) -> [f64; 3] {
        let red = 63.0 / 26.0 * value - 1.0 / 13.0;
        let green = 63.0 / 26.0 * value - 11.0 / 13.0;
        let blue = 4.5 * value - 3.5;
        [red, green, blue].map(|c| c.clamp(0.0, 1.0))
    }
}

/// Names accepted by [`colormap_by_name`].
pub const COLORMAP_NAMES: [&str; 5] = ["red", "green", "blue", "grey", "hot"];

/// Look up a built-in functor. `"gray"` is accepted as an alias.
pub fn colormap_by_name(name: &str) -> Option<Arc<dyn ColormapFunctor>> {
    let functor: Arc<dyn ColormapFunctor> = match name.to_lowercase().as_str() {
        "red" => Arc::new(Red),
        "green" => Arc::new(Green),
        "blue" => Arc::new(Blue),
        "grey" | "gray" => Arc::new(Grey),
        "hot" => Arc::new(Hot),
        _ => return None,
    };
    Some(functor)
}

/// Applies a colormap to a scalar input, producing RGB pixels.
#[derive(Debug, Clone)]
pub struct Colormap {
    functor: Arc<dyn ColormapFunctor>,
    minimum: f32,
    maximum: f32,
}

impl Colormap {
    /// Create a colormap stage over the input range `[minimum, maximum]`.
    pub fn new(functor: Arc<dyn ColormapFunctor>, minimum: f32, maximum: f32) -> Self {
        Self {
            functor,
            minimum,
            maximum,
        }
    }

    pub fn functor(&self) -> &dyn ColormapFunctor {
        self.functor.as_ref()
    }

    pub fn set_functor(&mut self, functor: Arc<dyn ColormapFunctor>) {
        self.functor = functor;
    }

    /// Input range mapped onto the colormap.
    pub fn range(&self) -> (f32, f32) {
        (self.minimum, self.maximum)
    }

    pub fn set_range(&mut self, minimum: f32, maximum: f32) {
        self.minimum = minimum;
        self.maximum = maximum;
    }
}

impl Default for Colormap {
    fn default() -> Self {
        Self::new(Arc::new(Grey), 0.0, 255.0)
    }
}

impl ProcessingStage for Colormap {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("colormap", "Colormap")
            .description("Maps scalar pixels to colors")
            .category(Category::Color)
            .output_pixel_type(PixelType::Rgb)
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        if !(self.minimum.is_finite() && self.maximum.is_finite()) {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "range".to_string(),
                error: format!("[{}, {}] is not finite", self.minimum, self.maximum),
            });
        }
        if self.minimum > self.maximum {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "range".to_string(),
                error: format!("minimum {} exceeds maximum {}", self.minimum, self.maximum),
            });
        }
        Ok(())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let region = ctx.output(0)?.buffered_region().clone();
        let node_id = ctx.node_id;
        let out = ctx
            .output_mut(0)?
            .rgb_pixels_mut()
            .ok_or(ExecutionError::PixelTypeMismatch {
                node_id,
                port: 0,
                expected: PixelType::Rgb.to_string(),
            })?;

        let functor = self.functor.as_ref();
        out.par_iter_mut().enumerate().for_each(|(offset, pixel)| {
            let value = input.scalar(&region.index_at(offset)).unwrap_or_default();
            *pixel = functor.map(value, self.minimum, self.maximum);
        });

        ctx.report_progress(1.0);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessingStage> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
