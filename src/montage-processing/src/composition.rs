//! Editable composition of source tracks
//!
//! A composition holds at most one video and one audio track. Each track
//! carries a single inserted range of a source track, placed at time zero.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::MuxError;
use crate::probe::{AssetTrack, DisplayTransform, MediaKind};
use crate::time::{MediaTime, TimeRange};

/// Identifier of a track inside a [`Composition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u32);

/// Source material placed on a composition track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    /// File the material is read from
    pub source_path: PathBuf,
    /// Stream index of the source track inside that file
    pub source_index: usize,
    /// Requested range of the source timeline
    pub source_range: TimeRange,
    /// Where the range starts on the composition timeline
    pub target_start: MediaTime,
    /// Orientation the source track already carries
    pub source_transform: DisplayTransform,
}

impl TrackSegment {
    /// Range the segment occupies on the composition timeline
    pub fn target_range(&self) -> TimeRange {
        TimeRange::new(self.target_start, self.source_range.duration)
    }
}

/// One timeline of a composition
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionTrack {
    id: TrackId,
    kind: MediaKind,
    segment: Option<TrackSegment>,
    preferred_transform: DisplayTransform,
}

impl CompositionTrack {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn segment(&self) -> Option<&TrackSegment> {
        self.segment.as_ref()
    }

    pub fn preferred_transform(&self) -> DisplayTransform {
        self.preferred_transform
    }

    /// Range covered on the composition timeline; empty for a track with no material
    pub fn time_range(&self) -> TimeRange {
        self.segment
            .as_ref()
            .map(TrackSegment::target_range)
            .unwrap_or_default()
    }
}

/// A set of tracks to be exported into one container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    tracks: Vec<CompositionTrack>,
    next_id: u32,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty track of `kind`
    ///
    /// Returns `None` when the composition already has a track of that kind.
    pub fn add_mutable_track(&mut self, kind: MediaKind) -> Option<TrackId> {
        if self.tracks.iter().any(|t| t.kind == kind) {
            return None;
        }

        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.push(CompositionTrack {
            id,
            kind,
            segment: None,
            preferred_transform: DisplayTransform::IDENTITY,
        });

        debug!("composition: added {} track {:?}", kind, id);
        Some(id)
    }

    pub fn track(&self, id: TrackId) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut CompositionTrack, MuxError> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| MuxError::InvalidInsert(format!("unknown track {:?}", id)))
    }

    pub fn tracks(&self) -> &[CompositionTrack] {
        &self.tracks
    }

    pub fn track_with_kind(&self, kind: MediaKind) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Place `range` of `source` (read from `source_path`) on track `id` at `at`
    ///
    /// The range is taken literally: it may extend past the end of the
    /// source material.
    pub fn insert_time_range(
        &mut self,
        id: TrackId,
        range: TimeRange,
        source_path: &Path,
        source: &AssetTrack,
        at: MediaTime,
    ) -> Result<(), MuxError> {
        if !at.is_zero() {
            return Err(MuxError::InvalidInsert(format!("inserts must start at time zero, got {}", at)));
        }
        if range.duration < MediaTime::zero() || range.start < MediaTime::zero() {
            return Err(MuxError::InvalidInsert(format!(
                "negative range {} + {}",
                range.start, range.duration
            )));
        }

        let track = self.track_mut(id)?;
        if track.kind != source.kind {
            return Err(MuxError::InvalidInsert(format!(
                "cannot insert {} material into a {} track",
                source.kind, track.kind
            )));
        }
        if track.segment.is_some() {
            return Err(MuxError::InvalidInsert(format!("{} track already holds a range", track.kind)));
        }

        debug!(
            "composition: inserting {} of {:?} stream {} into {} track",
            range.duration, source_path, source.index, track.kind
        );

        track.segment = Some(TrackSegment {
            source_path: source_path.to_path_buf(),
            source_index: source.index,
            source_range: range,
            target_start: at,
            source_transform: source.preferred_transform,
        });
        Ok(())
    }

    /// Set the display orientation of a track
    pub fn set_preferred_transform(&mut self, id: TrackId, transform: DisplayTransform) -> Result<(), MuxError> {
        let track = self.track_mut(id)?;
        track.preferred_transform = transform;
        Ok(())
    }

    /// End of the latest track
    pub fn duration(&self) -> MediaTime {
        self.tracks
            .iter()
            .map(|t| t.time_range().end())
            .max()
            .unwrap_or_default()
    }

    /// Whether any track carries material
    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.segment.is_none())
    }
}
