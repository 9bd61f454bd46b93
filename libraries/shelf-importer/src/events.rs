//! Import notifications
//!
//! Observers are told about each step of an import. An observer that
//! returns an error stops the import: the session treats it as an abort.

use shelf_core::types::{Album, Item};
use std::path::PathBuf;
use std::sync::Arc;

use crate::copy::FileOperation;
use crate::duplicates::Resolution;
use crate::{ImportError, Result};

#[derive(Debug, Clone)]
pub enum ImportEvent {
    /// A choice was made for a task
    TaskChoice {
        paths: Vec<PathBuf>,
        action: &'static str,
    },
    /// A task collided with catalog entries
    DuplicateResolved {
        paths: Vec<PathBuf>,
        resolution: Resolution,
    },
    /// A file was placed in the library
    FileTransferred {
        operation: FileOperation,
        source: PathBuf,
        dest: PathBuf,
    },
    AlbumImported {
        album: Album,
        items: Vec<Item>,
    },
    ItemImported {
        item: Item,
    },
}

impl ImportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ImportEvent::TaskChoice { .. } => "task_choice",
            ImportEvent::DuplicateResolved { .. } => "duplicate_resolved",
            ImportEvent::FileTransferred { .. } => "file_transferred",
            ImportEvent::AlbumImported { .. } => "album_imported",
            ImportEvent::ItemImported { .. } => "item_imported",
        }
    }
}

/// Receives import events
pub trait ImportObserver: Send + Sync {
    /// Handle an event
    ///
    /// # Errors
    /// Any error aborts the running import
    fn on_event(&self, event: &ImportEvent) -> shelf_core::Result<()>;
}

/// Registered observers, notified in registration order
#[derive(Clone, Default)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ImportObserver>>,
}

impl Observers {
    pub(crate) fn push(&mut self, observer: Arc<dyn ImportObserver>) {
        self.observers.push(observer);
    }

    /// Deliver `event` to every observer, stopping at the first error
    pub(crate) fn notify(&self, event: &ImportEvent) -> Result<()> {
        for observer in &self.observers {
            if let Err(e) = observer.on_event(event) {
                tracing::warn!(event = event.name(), "Observer aborted the import: {}", e);
                return Err(ImportError::Aborted(e.to_string()));
            }
        }
        Ok(())
    }
}
