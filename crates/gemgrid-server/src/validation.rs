//! Parameter validation for game creation. The engine debug-asserts the
//! same preconditions; the transport layer is where they become client
//! errors.

use gemgrid_engine::board::{MAX_FIELD_SIZE, MIN_FIELD_SIZE};

/// Check create-game parameters: field size within limits, diamond count
/// odd (a tie must be impossible), at least 1, and not more than the
/// number of cells.
pub fn validate_create(field_size: u8, diamonds_count: u32) -> Result<(), String> {
    if !(MIN_FIELD_SIZE..=MAX_FIELD_SIZE).contains(&field_size) {
        return Err(format!(
            "fieldSize must be between {MIN_FIELD_SIZE} and {MAX_FIELD_SIZE}, got {field_size}"
        ));
    }
    if diamonds_count == 0 {
        return Err("diamondsCount must be at least 1".to_string());
    }
    if diamonds_count % 2 == 0 {
        return Err(format!("diamondsCount must be odd, got {diamonds_count}"));
    }
    let cells = (field_size as u32).pow(2);
    if diamonds_count > cells {
        return Err(format!(
            "diamondsCount {diamonds_count} exceeds the {cells} cells of a {field_size}x{field_size} board"
        ));
    }
    Ok(())
}
