// 領域層：模型與介面，不做任何 I/O

pub mod model;
pub mod ports;
