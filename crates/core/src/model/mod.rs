pub mod descriptor;
pub mod metric;
pub mod table;
