//! Built-in stage implementations.
//!
//! This module contains the standard stages that ship with Lazyflow.

mod colormap;
mod io;
mod neighborhood;
mod pointwise;
mod sources;
mod texture;

use crate::filters::registry::StageRegistry;
use crate::multires::MultiResolutionPyramid;

/// Register all built-in stages.
pub fn register_all(registry: &mut StageRegistry) {
    sources::register(registry);
    io::register(registry);
    pointwise::register(registry);
    neighborhood::register(registry);
    colormap::register(registry);
    texture::register(registry);
    register_pyramid(registry);
}

fn register_pyramid(registry: &mut StageRegistry) {
    match MultiResolutionPyramid::new(2) {
        Ok(prototype) => registry.register(move || Box::new(prototype.clone())),
        Err(e) => log::warn!("Cannot register the pyramid stage: {}", e),
    }
}

// Re-export for direct access
pub use colormap::{
    colormap_by_name, Blue, Colormap, ColormapFunctor, Green, Grey, Hot, Red, COLORMAP_NAMES,
};
pub use io::FileSource;
pub use neighborhood::BoxMean;
pub use pointwise::ShiftScale;
pub use sources::{ContainerSource, Generator, SyntheticSource};
pub use texture::{compute_texture_features, TextureFeature, TextureFeatureValues, TextureFeatures};
