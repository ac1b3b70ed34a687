mod cursor;
mod row;

pub use cursor::ResultCursor;
pub use row::{Columns, Row};
