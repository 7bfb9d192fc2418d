pub mod layers;
pub mod search;
pub mod select;
pub mod stats;
