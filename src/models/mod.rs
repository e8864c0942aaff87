pub mod session;
pub mod trip;
pub mod user;
pub mod whiteboard;
