//! `hymod erofs` — Report EROFS support.

use crate::output;

/// Executes the `erofs` command.
pub fn execute() {
    output::flag("erofs", hymo_core::fs::is_erofs_supported());
}
