//! Brightness classification of frames.
//!
//! Every frame of a clip is rendered once through a [`PlaneStats`] wrapper and
//! sorted into a dark pool, a light pool, or neither, by its normalised mean
//! luma.

use crate::adapters::PlaneStats;
use crate::clip::{FrameSource, PROP_PLANE_STATS_AVERAGE};
use crate::configuration::{RenderOptions, SelectionOptions, Threshold};
use crate::error::{CompshotError, PoolKind};
use crate::progress::OperationType;
use crate::render::Renderer;

/// Frame numbers grouped by brightness, each pool ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pools {
    /// Frames inside the dark range.
    pub dark: Vec<u64>,
    /// Frames inside the light range.
    pub light: Vec<u64>,
}

impl Pools {
    /// The pool of the given kind.
    pub fn get(&self, kind: PoolKind) -> &[u64] {
        match kind {
            PoolKind::Dark => &self.dark,
            PoolKind::Light => &self.light,
        }
    }
}

/// Sorts frames into dark and light pools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    dark: Threshold,
    light: Threshold,
}

impl Classifier {
    /// Build a classifier from two brightness ranges.
    pub const fn new(dark: Threshold, light: Threshold) -> Self {
        Self { dark, light }
    }

    /// Which pool a brightness value belongs to. The dark range wins when the
    /// ranges overlap.
    pub fn bucket(&self, average: f64) -> Option<PoolKind> {
        if self.dark.contains(average) {
            Some(PoolKind::Dark)
        } else if self.light.contains(average) {
            Some(PoolKind::Light)
        } else {
            None
        }
    }

    /// Render every frame of `source` and classify it.
    ///
    /// Progress is reported as [`OperationType::Classification`].
    ///
    /// # Errors
    ///
    /// Any error of the render session, including
    /// [`CompshotError::Cancelled`].
    pub fn classify<S: FrameSource + ?Sized>(
        &self,
        source: &S,
        options: &RenderOptions,
    ) -> Result<Pools, CompshotError> {
        let stats = PlaneStats::new(source);
        let mut pools = Pools::default();

        log::debug!(
            "Classifying {} frames (dark {:?}, light {:?})",
            stats.info().frame_count,
            self.dark,
            self.light,
        );

        Renderer::new(&stats)
            .with_options(
                options
                    .clone()
                    .with_operation(OperationType::Classification),
            )
            .with_callback(|index, frame| {
                let average = frame
                    .props
                    .get_float(PROP_PLANE_STATS_AVERAGE)
                    .unwrap_or_default();
                match self.bucket(average) {
                    Some(PoolKind::Dark) => pools.dark.push(index),
                    Some(PoolKind::Light) => pools.light.push(index),
                    None => {}
                }
                Ok(())
            })
            .run()?;

        pools.dark.sort_unstable();
        pools.light.sort_unstable();

        log::info!(
            "Found {} dark and {} light frames",
            pools.dark.len(),
            pools.light.len()
        );
        Ok(pools)
    }
}

impl From<&SelectionOptions> for Classifier {
    fn from(options: &SelectionOptions) -> Self {
        Self::new(options.dark, options.light)
    }
}
