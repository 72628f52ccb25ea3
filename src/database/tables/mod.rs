pub mod historial;
pub mod meta;
pub mod usuarios;
