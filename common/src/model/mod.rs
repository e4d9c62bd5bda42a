pub mod layer;
pub mod upload;
