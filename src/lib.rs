pub mod bitmap;
pub mod cache;
pub mod canvas;
pub mod config;
pub mod error;
pub mod events;
pub mod scan;
pub mod processing {
    pub mod layout;
}
pub mod tasks {
    pub mod display;
    pub mod loader;
    pub mod transport;
}
