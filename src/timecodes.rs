//! Timecode tracking and v2 timecode files.
//!
//! Timecodes are cumulative presentation times built from each frame's
//! `DurationNum`/`DurationDen` properties. They are all-or-nothing for a
//! render session: the first frame without duration metadata discards every
//! timestamp gathered so far, truncates the timecode file, and turns
//! tracking off until the session ends.

use std::fs::File;
use std::io::{BufWriter, Cursor, Result as IoResult, Seek, SeekFrom, Write};

use crate::clip::FrameProps;

/// First line of a v2 timecode file.
pub const TIMECODE_V2_HEADER: &str = "# timestamp format v2\n";

/// A writable destination for v2 timecodes that can be emptied in place.
pub trait TimecodeSink: Write {
    /// Drop everything written so far.
    fn discard(&mut self) -> IoResult<()>;
}

impl TimecodeSink for File {
    fn discard(&mut self) -> IoResult<()> {
        self.seek(SeekFrom::Start(0))?;
        self.set_len(0)
    }
}

impl TimecodeSink for BufWriter<File> {
    fn discard(&mut self) -> IoResult<()> {
        self.flush()?;
        self.get_mut().discard()
    }
}

impl TimecodeSink for Vec<u8> {
    fn discard(&mut self) -> IoResult<()> {
        self.clear();
        Ok(())
    }
}

impl TimecodeSink for Cursor<Vec<u8>> {
    fn discard(&mut self) -> IoResult<()> {
        self.get_mut().clear();
        self.set_position(0);
        Ok(())
    }
}

impl<T: TimecodeSink + ?Sized> TimecodeSink for &mut T {
    fn discard(&mut self) -> IoResult<()> {
        (**self).discard()
    }
}

/// Outcome of feeding one frame to [`Timecodes::record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Recorded {
    /// The frame starts at this many seconds.
    Start(f64),
    /// This frame had no duration; tracking just switched off.
    JustDisabled,
    /// Tracking was already off.
    Disabled,
}

/// Session timecode state. Never goes back from `Disabled` to `Enabled`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Timecodes {
    /// Cumulative times in seconds. Entry `i` is the start of frame `i`; the
    /// last entry is the end of the most recent frame.
    Enabled(Vec<f64>),
    Disabled,
}

impl Timecodes {
    pub(crate) fn new() -> Self {
        Timecodes::Enabled(vec![0.0])
    }

    /// Account for the next delivered frame.
    pub(crate) fn record(&mut self, props: &FrameProps) -> Recorded {
        let Timecodes::Enabled(times) = self else {
            return Recorded::Disabled;
        };

        match props.duration_seconds() {
            Some(duration) => {
                let start = times.last().copied().unwrap_or(0.0);
                times.push(start + duration);
                Recorded::Start(start)
            }
            None => {
                *self = Timecodes::Disabled;
                Recorded::JustDisabled
            }
        }
    }

    pub(crate) fn into_vec(self) -> Vec<f64> {
        match self {
            Timecodes::Enabled(times) => times,
            Timecodes::Disabled => Vec::new(),
        }
    }
}

/// Format a start time as a v2 timecode line (integer milliseconds).
pub(crate) fn format_line(seconds: f64) -> String {
    format!("{}\n", (seconds * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{PROP_DURATION_DEN, PROP_DURATION_NUM, PropValue};

    fn props(duration: Option<(i64, i64)>) -> FrameProps {
        let mut props = FrameProps::new();
        if let Some((num, den)) = duration {
            props.set(PROP_DURATION_NUM, PropValue::Int(num));
            props.set(PROP_DURATION_DEN, PropValue::Int(den));
        }
        props
    }

    #[test]
    fn buffered_file_discard_empties_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("timecodes.txt");
        let mut sink = BufWriter::new(File::create(&path).unwrap());

        sink.write_all(TIMECODE_V2_HEADER.as_bytes()).unwrap();
        sink.write_all(b"0\n40\n").unwrap();
        sink.discard().unwrap();
        sink.write_all(b"late").unwrap();
        sink.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "late");
    }

    #[test]
    fn accumulates_durations() {
        let mut timecodes = Timecodes::new();
        assert_eq!(timecodes.record(&props(Some((1, 4)))), Recorded::Start(0.0));
        assert_eq!(timecodes.record(&props(Some((1, 4)))), Recorded::Start(0.25));
        assert_eq!(timecodes.into_vec(), vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn missing_duration_disables_for_good() {
        let mut timecodes = Timecodes::new();
        timecodes.record(&props(Some((1, 2))));
        assert_eq!(timecodes.record(&props(None)), Recorded::JustDisabled);
        assert_eq!(timecodes.record(&props(Some((1, 2)))), Recorded::Disabled);
        assert!(timecodes.into_vec().is_empty());
    }

    #[test]
    fn line_is_rounded_milliseconds() {
        assert_eq!(format_line(1001.0 / 24000.0), "42\n");
        assert_eq!(format_line(0.0), "0\n");
    }

    #[test]
    fn cursor_discard_rewinds() {
        let mut sink = Cursor::new(Vec::new());
        sink.write_all(b"# timestamp format v2\n0\n").unwrap();
        sink.discard().unwrap();
        assert!(sink.get_ref().is_empty());
        assert_eq!(sink.position(), 0);
    }
}
