//! Wire types shared by the schema engine and its API consumers

pub mod shared;
