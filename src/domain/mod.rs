// Domain layer: cached representations, field converters and ports.

pub mod cached;
pub mod fields;
pub mod model;
pub mod ports;
