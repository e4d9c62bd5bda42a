//! Data transfer types shared between the geoportal backend and its clients.

pub mod model;
pub mod responses;
