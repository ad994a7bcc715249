//! CLI command implementations.

pub mod compact;
pub mod dump_log;
pub mod inspect;
pub mod verify;

/// Boxed error shared by every command.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Formats a byte count for humans.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
