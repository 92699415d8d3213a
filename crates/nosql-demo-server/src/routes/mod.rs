pub mod demo;
pub mod events;
pub mod page;
