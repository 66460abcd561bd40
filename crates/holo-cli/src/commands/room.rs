//! Room command implementation.

use anyhow::Result;

use holo_core::room::RoomId;

use super::RoomArgs;
use crate::ui::RoomBox;

/// Run the room command.
pub fn run(args: RoomArgs) -> Result<()> {
    let room = RoomId::generate();

    if args.json {
        let output = serde_json::json!({ "room": room.as_str() });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    RoomBox::new(room.as_str())
        .with_hint("Share it with the other side")
        .display();
    println!();
    println!("  holo receive {}", room);
    println!("  holo send {} <FILES>...", room);
    println!();

    Ok(())
}
