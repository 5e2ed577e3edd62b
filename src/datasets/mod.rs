//! Built-in virtual datasets.
//!
//! Always-available sample relations used by tests, examples and the
//! no-table evaluation path of constant folding:
//!
//! - `$planets`: 9 rows x 20 columns
//! - `$satellites`: 177 rows x 8 columns, joins to `$planets`
//! - `$astronauts`: 357 rows x 19 columns, with an array-typed
//!   `missions` column for UNNEST
//! - `$no_table`: one row, one column; the dataset a query without a
//!   FROM clause reads

mod astronauts;
mod no_table;
mod planets;
mod satellites;

use crate::errors::{Error, Result};
use crate::morsel::Morsel;
use crate::schema::RelationSchema;

pub fn is_virtual_dataset(relation: &str) -> bool {
    relation.starts_with('$')
}

/// The schema of a virtual dataset. Column identities are minted fresh on
/// every call; the binder captures them once per scan.
pub fn schema(relation: &str) -> Result<RelationSchema> {
    match relation {
        "$planets" => Ok(planets::schema()),
        "$satellites" => Ok(satellites::schema()),
        "$astronauts" => Ok(astronauts::schema()),
        "$no_table" => Ok(no_table::schema()),
        other => Err(Error::DatasetNotFound(other.to_string())),
    }
}

/// Read a full virtual dataset as one morsel; column identities equal the
/// column names until a connector relabels them.
pub fn read(relation: &str) -> Result<Morsel> {
    match relation {
        "$planets" => planets::read(),
        "$satellites" => satellites::read(),
        "$astronauts" => astronauts::read(),
        "$no_table" => no_table::read(),
        other => Err(Error::DatasetNotFound(other.to_string())),
    }
}
