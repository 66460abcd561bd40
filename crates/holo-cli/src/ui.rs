//! UI utilities for Holo CLI.

use holo_core::file::format_size;
use holo_core::transfer::{Transfer, TransferState};

const BOX_WIDTH: usize = 33;
const BAR_WIDTH: usize = 20;

/// A formatted box for displaying a room id.
pub struct RoomBox<'a> {
    room: &'a str,
    hint: Option<&'a str>,
}

impl<'a> RoomBox<'a> {
    /// Create a new room box.
    #[must_use]
    pub const fn new(room: &'a str) -> Self {
        Self { room, hint: None }
    }

    /// Add a line under the room id.
    #[must_use]
    pub const fn with_hint(mut self, hint: &'a str) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Display the room box to stdout.
    pub fn display(&self) {
        let room_line = format!("Room:  {}", self.room);

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&room_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));

        if let Some(hint) = self.hint {
            println!("  │{}│", center_in_box(hint, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Print the banner shared by the long-running commands.
pub fn print_header() {
    println!();
    println!("Holo v{}", holo_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
}

/// Render a progress bar for a percentage.
#[must_use]
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// One-line summary of a transfer: direction, name, size, progress.
#[must_use]
pub fn transfer_line(transfer: &Transfer) -> String {
    let status = match transfer.state {
        TransferState::Complete => "done".to_string(),
        TransferState::Abandoned => "abandoned".to_string(),
        TransferState::Announced | TransferState::Transferring => {
            format!("{}%", transfer.progress_percent())
        }
    };

    format!(
        "{:<9} {} ({})  [{}] {:>9}",
        transfer.direction.label(),
        transfer.name,
        format_size(transfer.size),
        progress_bar(transfer.progress_percent(), BAR_WIDTH),
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use holo_core::transfer::TransferId;

    #[test]
    fn test_center_in_box() {
        let centered = center_in_box("hello", 11);
        assert_eq!(centered, "   hello   ");

        let centered = center_in_box("hi", 6);
        assert_eq!(centered, "  hi  ");
    }

    #[test]
    fn test_center_in_box_overflow() {
        assert_eq!(center_in_box("toolong", 3), "toolong");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(50, 10), "█████░░░░░");
        assert_eq!(progress_bar(100, 10), "██████████");
        assert_eq!(progress_bar(200, 4), "████");
    }

    #[test]
    fn test_transfer_line() {
        let mut transfer =
            Transfer::outgoing(TransferId::new("t"), "a.txt", 140_000, "text/plain");
        transfer.record_bytes(65_536);

        let line = transfer_line(&transfer);
        assert!(line.starts_with("sending"), "{line}");
        assert!(line.contains("a.txt (137 KB)"), "{line}");
        assert!(line.ends_with("46%"), "{line}");

        transfer.complete();
        assert!(transfer_line(&transfer).ends_with("done"));
    }

    #[test]
    fn test_transfer_line_abandoned() {
        let mut transfer = Transfer::outgoing(TransferId::new("t"), "b.bin", 10, "x/y");
        transfer.abandon();
        assert!(transfer_line(&transfer).ends_with("abandoned"));
    }
}
