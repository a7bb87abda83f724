//! Data model shared by every stage of the import pipeline: the unit of
//! work (`ImportItem`), the routing table that classifies it
//! (`DefinitionTable`), the description of a target table
//! (`TableDescription`), and the notification emitted when an item reaches
//! a terminal state.

mod definitions;
mod error;
mod item;
mod notification;
mod provenance;
mod table;

pub use definitions::{glob_match_ci, Action, DefinitionEntry, DefinitionTable};
pub use error::ErrorKind;
pub use item::{Format, ImportItem};
pub use notification::{ImportNotification, Outcome};
pub use provenance::Provenance;
pub use table::{Disposition, TableDescription};
