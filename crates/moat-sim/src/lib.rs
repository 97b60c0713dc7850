pub mod disturb;
pub mod rng;
pub mod waves;

pub use disturb::{DisturbParams, DisturbSchedule};
pub use rng::SimRng;
pub use waves::{WaveField, WaveParams};
