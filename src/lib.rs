pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod data;
pub mod ghost;
pub mod physics;
pub mod session;
pub mod terrain;
pub mod track;
