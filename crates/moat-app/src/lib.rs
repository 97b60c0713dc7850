pub mod app;
pub mod camera;
pub mod castle;
pub mod config;
pub mod input;
pub mod report;
pub mod timer;

pub use app::{LoopStats, SceneUpdateLoop};
pub use camera::OrbitCamera;
pub use castle::{build_castle, Castle};
pub use config::{load_config, load_config_from_str, DemoConfig};
pub use input::InputState;
pub use report::RunReport;
pub use timer::GameTimer;
