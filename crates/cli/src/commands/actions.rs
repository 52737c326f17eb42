//! `adbpilot actions` — Print the action catalog as sent to the model.

use adbpilot_core::action::ActionCatalog;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let advertisement = ActionCatalog::standard().advertisement();
    println!("{}", serde_json::to_string_pretty(&advertisement)?);
    Ok(())
}
