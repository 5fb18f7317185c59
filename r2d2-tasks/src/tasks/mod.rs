//! The six long-run scenarios.

pub mod ball_retrieval;
pub mod conveyor_delivery;
pub mod gap_jumping;
pub mod gate_kicking;
pub mod obstacle_course;
pub mod soccer;

pub use ball_retrieval::{BallRetrieval, BallRetrievalConfig};
pub use conveyor_delivery::{ConveyorDelivery, ConveyorDeliveryConfig};
pub use gap_jumping::{GapJumping, GapJumpingConfig};
pub use gate_kicking::{GateKicking, GateKickingConfig};
pub use obstacle_course::{ObstacleCourse, ObstacleCourseConfig};
pub use soccer::{Soccer, SoccerConfig};
