pub mod agent;
pub mod flow;
mod lower;
pub mod naming;
pub mod ops;
pub mod primitives;
pub mod route;

pub use agent::Agent;
pub use flow::{Compose, Flow};
pub use ops::{race, until, Until};
pub use primitives::{
    capture, gate, gate_key, map_over, tap, timeout, transfer, transfer_if, transform, MapOver,
};
pub use route::{Route, Routes};
