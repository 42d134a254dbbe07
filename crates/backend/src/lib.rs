//! Dynamic relational schema engine: validated table DDL over HTTP,
//! executed transactionally against PostgreSQL or SQLite.

pub mod handlers;
pub mod routes;
pub mod schema;
pub mod shared;
