//! Image import tickets.
//!
//! Decoding may run on a worker while the host keeps handling input. A ticket
//! records which mount and which import request it belongs to, so a late
//! completion can be recognised and dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use tee_canvas_core::{ObjectId, RasterHandle};
use tee_canvas_renderer::{decode_source, ImageSource, RenderResult};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// A fresh mount epoch, unique within the process.
pub(crate) fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// A pending image import.
#[derive(Debug, Clone)]
pub struct ImportTicket {
    pub(crate) epoch: u64,
    pub(crate) generation: u64,
    source: ImageSource,
    limit: (u32, u32),
}

impl ImportTicket {
    pub(crate) const fn new(
        epoch: u64,
        generation: u64,
        source: ImageSource,
        limit: (u32, u32),
    ) -> Self {
        Self {
            epoch,
            generation,
            source,
            limit,
        }
    }

    /// The import request number within its mount.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The image being imported.
    #[must_use]
    pub const fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Decode the source, downsampled to the export resolution.
    ///
    /// Touches no host state, so it may run on any thread.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error for unreadable or unsupported sources.
    pub fn decode(&self) -> RenderResult<RasterHandle> {
        decode_source(&self.source, Some(self.limit))
    }
}

/// What happened to a completed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ImportOutcome {
    /// The image is on the canvas.
    Applied(ObjectId),
    /// The latch was held; the image will be placed by a later poll.
    Parked,
    /// A newer import was started; this one was dropped.
    Superseded,
    /// The host was unmounted, or the ticket belongs to another mount.
    Discarded,
    /// Decoding failed; the scene is unchanged.
    Failed,
}

impl ImportOutcome {
    /// The placed image, if any.
    #[must_use]
    pub const fn object(self) -> Option<ObjectId> {
        match self {
            Self::Applied(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epochs_are_unique() {
        let a = next_epoch();
        let b = next_epoch();
        assert!(b > a);
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let ticket = ImportTicket::new(1, 1, ImageSource::Bytes(vec![1, 2, 3, 4]), (600, 600));
        assert!(ticket.decode().is_err());
        assert_eq!(ticket.generation(), 1);
    }

    #[test]
    fn test_outcome_object() {
        assert_eq!(ImportOutcome::Parked.object(), None);
        assert_eq!(ImportOutcome::Failed.object(), None);
    }
}
