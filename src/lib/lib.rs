pub mod diagnostics;
pub mod foxes;
pub mod model;
pub mod plot;
pub mod posterior;
pub mod sampler;
pub mod stats;
