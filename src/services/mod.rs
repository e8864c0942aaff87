pub mod planner;
pub mod trips;
pub mod whiteboards;
