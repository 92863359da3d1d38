//! Game entities.
//!
//! Every physical thing in the arena is a [`Cell`] tagged with a
//! [`CellKind`]; players own an ordered set of cells.

mod cell;
mod id_list;
mod player;

pub use cell::{Cell, CellId, CellKind, OwnerId};
pub use id_list::IdList;
pub use player::Player;
