//! Movement collision against solid resources.

use crate::error::CommandError;
use crate::world::GridManager;
use protocol::Vector;

/// Check that a player may stand at `dest`.
///
/// Looks at every cell that could hold a resource within `radius`, so a
/// blockade just across a cell border still stops the step.
pub fn check_step(grid: &GridManager, dest: Vector, radius: f64) -> Result<(), CommandError> {
    let reach = radius.ceil() as i32;
    for cell in grid.cells_near(dest, reach) {
        if let Some(id) = cell.obstacle_near(dest, radius) {
            return Err(CommandError::Blocked(id));
        }
    }
    Ok(())
}
