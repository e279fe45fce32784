pub mod api;
pub mod convo;
pub mod events;
pub mod models;
