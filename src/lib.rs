/*!
robokit provides addon components for reinforcement-learning robotics
simulators: joint motor controllers which translate agent action vectors
into batched motor commands, and camera sensors which render observations.

The physics engine and the renderer live behind the
[`PhysicsBackend`](backend::PhysicsBackend) trait; robokit itself only
derives action spaces, schedules gains and composes camera poses.
*/

pub mod addons;
pub mod backend;
pub mod errors;
pub mod logger;
pub mod utils;
