pub mod ad5761;
pub mod flash;
