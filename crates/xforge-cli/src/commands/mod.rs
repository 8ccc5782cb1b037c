pub mod check;
pub mod generate;
pub mod path;
pub mod schema;
pub mod templates;
