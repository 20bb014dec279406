use crate::error::StorageError;

/// An ordered, appendable sequence of log lines.
///
/// Transports know nothing about strategies: they move text. Sequence numbers inside the lines are
/// checked by the event source, and only when [`LogTransport::checks_sequence`] says the transport is
/// the single authority over its ordering.
pub trait LogTransport: Send {
    /// Source type name, as configured in `Source.type`.
    fn name(&self) -> &str;

    /// Stable identifier of the underlying log, e.g. derived from its location.
    fn id(&self) -> String;

    /// Every stored line, oldest first.
    fn read_lines(&mut self) -> Result<Vec<String>, StorageError>;

    fn append(&mut self, line: &str) -> Result<(), StorageError>;

    /// Replaces the whole log with `lines`, keeping a backup of the previous content. Returns where
    /// the backup went.
    fn overwrite(&mut self, lines: &[String]) -> Result<String, StorageError>;

    /// Whether replay must enforce strictly consecutive sequence numbers.
    fn checks_sequence(&self) -> bool {
        true
    }

    /// Releases resources. Idempotent; later calls to other methods fail with `Closed`.
    fn close(&mut self) -> Result<(), StorageError>;
}
