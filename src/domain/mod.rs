// Domain layer: records, status snapshots and the device port. No transport code here.

pub mod model;
pub mod ports;
