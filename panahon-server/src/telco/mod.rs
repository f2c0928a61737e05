pub mod glabs;
pub mod handlers;
