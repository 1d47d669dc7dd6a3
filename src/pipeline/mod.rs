pub mod instrument;
pub mod note;
pub mod persistence;
pub mod preset;
pub mod store;
pub mod track;
pub mod transport;
