//! Choosing which frames to compare.
//!
//! [`lazylist`] picks a spread of dark and light frames from a reference
//! clip. [`FrameList`] wraps the three ways a caller can name frames: an
//! explicit list, a text file, or automatic selection.

use std::fs;
use std::path::PathBuf;

use crate::classify::{Classifier, Pools};
use crate::clip::FrameSource;
use crate::configuration::{RenderOptions, SelectionOptions};
use crate::dedupe::{dedupe, subsample};
use crate::error::{CompshotError, PoolKind};

/// The frames picked by [`select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen dark frames, in sampling order.
    pub dark: Vec<u64>,
    /// Chosen light frames, in sampling order.
    pub light: Vec<u64>,
    /// Minimum gap that was applied, in frames.
    pub min_gap_frames: u64,
}

impl Selection {
    /// Dark frames followed by light frames.
    pub fn into_frames(self) -> Vec<u64> {
        let mut frames = self.dark;
        frames.extend(self.light);
        frames
    }
}

/// Classify every frame of `source`, thin both pools, and subsample them.
///
/// # Errors
///
/// - [`CompshotError::InvalidThreshold`] for unusable options.
/// - [`CompshotError::EmptyPool`] when no frame falls in the dark or light
///   range.
/// - Any error of the classification render.
pub fn select<S: FrameSource + ?Sized>(
    source: &S,
    options: &SelectionOptions,
    render: &RenderOptions,
) -> Result<Selection, CompshotError> {
    options.validate()?;

    let pools = Classifier::from(options).classify(source, render)?;
    pick(pools, source.info().frame_rate.as_f64(), options)
}

/// [`select`], flattened to `dark ++ light`.
///
/// # Errors
///
/// Same as [`select`].
pub fn lazylist<S: FrameSource + ?Sized>(
    source: &S,
    options: &SelectionOptions,
    render: &RenderOptions,
) -> Result<Vec<u64>, CompshotError> {
    select(source, options, render).map(Selection::into_frames)
}

/// Frame count equivalent of `seconds` at `fps`, rounded to nearest with
/// ties going to the even frame count.
pub fn gap_in_frames(fps: f64, seconds: f64) -> u64 {
    (fps * seconds).round_ties_even().max(0.0) as u64
}

fn pick(pools: Pools, fps: f64, options: &SelectionOptions) -> Result<Selection, CompshotError> {
    for kind in [PoolKind::Dark, PoolKind::Light] {
        if pools.get(kind).is_empty() {
            return Err(CompshotError::EmptyPool(kind));
        }
    }

    let min_gap_frames = gap_in_frames(fps, options.min_gap_seconds);
    let dark = subsample(
        dedupe(&pools.dark, min_gap_frames),
        options.dark_frames,
        options.seed,
    );
    let light = subsample(
        dedupe(&pools.light, min_gap_frames),
        options.light_frames,
        options.seed,
    );

    log::debug!(
        "Selected {} dark and {} light frames ({min_gap_frames} frame gap)",
        dark.len(),
        light.len()
    );

    Ok(Selection {
        dark,
        light,
        min_gap_frames,
    })
}

/// Where the compared frame numbers come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameList {
    /// These exact frames, in this order.
    Explicit(Vec<u64>),
    /// A text file with one frame per line. Only the text before the first
    /// `delimiter` counts, so scene-detection zone files work unchanged.
    File {
        /// Path of the list.
        path: PathBuf,
        /// Field separator, usually a space.
        delimiter: String,
    },
    /// Automatic dark/light selection on the reference clip.
    Auto(SelectionOptions),
}

impl Default for FrameList {
    fn default() -> Self {
        FrameList::Auto(SelectionOptions::default())
    }
}

impl FrameList {
    /// A file list split on spaces.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        FrameList::File {
            path: path.into(),
            delimiter: " ".to_string(),
        }
    }

    /// Turn the list into frame numbers. `reference` is only rendered for
    /// [`FrameList::Auto`].
    ///
    /// # Errors
    ///
    /// I/O errors reading the file, [`CompshotError::InvalidFrameList`] for
    /// unparsable lines, and the errors of [`lazylist`].
    pub fn resolve<S: FrameSource + ?Sized>(
        &self,
        reference: &S,
        render: &RenderOptions,
    ) -> Result<Vec<u64>, CompshotError> {
        match self {
            FrameList::Explicit(frames) => Ok(frames.clone()),
            FrameList::File { path, delimiter } => {
                let text = fs::read_to_string(path)?;
                parse_frame_list(&text, delimiter)
            }
            FrameList::Auto(options) => lazylist(reference, options, render),
        }
    }
}

/// Parse a frame list: one frame per line, first field only. Blank lines are
/// skipped.
///
/// # Errors
///
/// [`CompshotError::InvalidFrameList`] with the 1-based line number when a
/// first field is not a non-negative integer.
///
/// ```
/// use compshot::parse_frame_list;
///
/// let frames = parse_frame_list("120 0.5 scene\n360\n\n720 1.0\n", " ")?;
/// assert_eq!(frames, vec![120, 360, 720]);
/// # Ok::<(), compshot::CompshotError>(())
/// ```
pub fn parse_frame_list(text: &str, delimiter: &str) -> Result<Vec<u64>, CompshotError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            let line = line.trim();
            let field = if delimiter.is_empty() {
                line
            } else {
                line.split(delimiter).next().unwrap_or(line)
            };
            field
                .trim()
                .parse::<u64>()
                .map_err(|error| CompshotError::InvalidFrameList {
                    line: number + 1,
                    reason: format!("{:?}: {error}", field.trim()),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools(dark: &[u64], light: &[u64]) -> Pools {
        Pools {
            dark: dark.to_vec(),
            light: light.to_vec(),
        }
    }

    #[test]
    fn gap_rounds_to_nearest_frame() {
        assert_eq!(gap_in_frames(24000.0 / 1001.0, 15.0), 360);
        assert_eq!(gap_in_frames(0.0, 15.0), 0);
        assert_eq!(gap_in_frames(10.0, 0.56), 6);
    }

    #[test]
    fn gap_ties_round_to_even() {
        assert_eq!(gap_in_frames(25.0, 0.5), 12);
        assert_eq!(gap_in_frames(5.0, 0.5), 2);
        assert_eq!(gap_in_frames(3.0, 0.5), 2);
        assert_eq!(gap_in_frames(1.0, 0.5), 0);
    }

    #[test]
    fn pick_concatenates_dark_then_light() {
        let options = SelectionOptions::default().with_min_gap_seconds(1.0);
        let selection = pick(pools(&[0, 10, 30], &[5, 50]), 10.0, &options).unwrap();
        assert_eq!(selection.min_gap_frames, 10);
        assert_eq!(selection.dark, vec![0, 10, 30]);
        assert_eq!(selection.light, vec![5, 50]);
        assert_eq!(selection.into_frames(), vec![0, 10, 30, 5, 50]);
    }

    #[test]
    fn pick_subsamples_each_pool() {
        let options = SelectionOptions::default()
            .with_min_gap_seconds(0.0)
            .with_dark_frames(2)
            .with_light_frames(1);
        let selection = pick(pools(&[1, 2, 3, 4, 5, 6], &[7, 8]), 24.0, &options).unwrap();
        assert_eq!(selection.dark.len(), 2);
        assert_eq!(selection.light.len(), 1);
        let again = pick(pools(&[1, 2, 3, 4, 5, 6], &[7, 8]), 24.0, &options).unwrap();
        assert_eq!(selection, again);
    }

    #[test]
    fn empty_pools_are_errors() {
        let options = SelectionOptions::default();
        assert!(matches!(
            pick(pools(&[], &[1]), 24.0, &options),
            Err(CompshotError::EmptyPool(PoolKind::Dark))
        ));
        assert!(matches!(
            pick(pools(&[1], &[]), 24.0, &options),
            Err(CompshotError::EmptyPool(PoolKind::Light))
        ));
    }

    #[test]
    fn parses_zone_files() {
        let frames = parse_frame_list("100 200 x264 --crf 20\n  300\t\n", " ").unwrap();
        assert_eq!(frames, vec![100, 300]);
        let frames = parse_frame_list("5,a\n6,b\n", ",").unwrap();
        assert_eq!(frames, vec![5, 6]);
    }

    #[test]
    fn reports_bad_line_number() {
        let error = parse_frame_list("1\n2\nthree\n", " ").unwrap_err();
        assert!(matches!(error, CompshotError::InvalidFrameList { line: 3, .. }));
    }
}
