//! Rowset event listeners

/// Snapshot of the rowset position when an event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSetEvent {
    /// 1-based page number
    pub page: usize,
    /// Cursor position within the page, 0 meaning before the first row
    pub position: usize,
}

/// Observer of rowset activity
///
/// Every method has an empty default so implementors only override what they need.
pub trait RowSetListener: Send {
    /// The cursor moved to another row
    fn cursor_moved(&mut self, _event: &RowSetEvent) {}

    /// A row was updated or inserted locally
    fn row_changed(&mut self, _event: &RowSetEvent) {}

    /// The whole rowset changed: a page was loaded or changes were synced
    fn rowset_changed(&mut self, _event: &RowSetEvent) {}
}

/// Listener writing every event to the log
#[derive(Debug, Default)]
pub struct LoggingListener;

impl RowSetListener for LoggingListener {
    fn cursor_moved(&mut self, event: &RowSetEvent) {
        tracing::trace!(page = event.page, position = event.position, "Cursor moved");
    }

    fn row_changed(&mut self, event: &RowSetEvent) {
        tracing::debug!(page = event.page, position = event.position, "Row changed");
    }

    fn rowset_changed(&mut self, event: &RowSetEvent) {
        tracing::debug!(page = event.page, "Rowset changed");
    }
}
