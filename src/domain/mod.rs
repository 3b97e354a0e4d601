// Domain layer: build and launch models plus the ports (traits) the core
// engines depend on.

pub mod model;
pub mod ports;
