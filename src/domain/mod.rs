// Domain layer: action / response models and ports (interfaces) for transports and caching.

pub mod model;
pub mod ports;
